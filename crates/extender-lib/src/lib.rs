//! Spark scheduler extender library
//!
//! This crate provides the core functionality for:
//! - Gang admission of Spark drivers with their minimum executor count
//! - Executor placement on reserved slots and elastic growth
//! - Binpacking strategies and candidate node ordering
//! - FIFO fairness across queued applications
//! - Demand tracking for unmet capacity
//! - Reservation storage migration
//! - Health checks, observability and the extender HTTP API

pub mod api;
pub mod binpack;
pub mod cache;
pub mod cluster;
pub mod error;
pub mod extender;
pub mod health;
pub mod migration;
pub mod models;
pub mod observability;
pub mod overhead;
pub mod podspec;
pub mod priority;
pub mod reservations;
pub mod resources;
pub mod retry;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{ExtenderError, ExtenderResult};
pub use extender::{
    ExtenderArgs, ExtenderFilterResult, Outcome, Placement, SchedulerExtender,
    SchedulerExtenderBuilder,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EventLogger, ExtenderMetrics};
pub use resources::Resources;
