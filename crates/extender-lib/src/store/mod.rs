//! Persistence seams for reservations, demands and migration bookkeeping
//!
//! The extender never owns the authoritative records. Reservations and
//! demands live behind these traits; the in-process caches mirror them and
//! are refreshed on resync.

mod memory;

pub use memory::InMemoryStore;

use crate::models::{ApplicationKey, Demand, Reservation, ReservationSlot};
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by the stores
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(String),

    #[error("record {0} already exists")]
    AlreadyExists(String),

    #[error("slot {slot} not found in reservation {key}")]
    SlotNotFound { key: String, slot: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected request: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Transient errors worth retrying for idempotent writes
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Authoritative storage of gang reservations
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Reservation>>;

    async fn get(&self, key: &ApplicationKey) -> StoreResult<Reservation>;

    /// Create a reservation; fails with `AlreadyExists` if the application has one
    async fn create(&self, reservation: &Reservation) -> StoreResult<()>;

    /// Replace a single slot, leaving the rest of the record untouched
    async fn patch_slot(
        &self,
        key: &ApplicationKey,
        slot_name: &str,
        slot: &ReservationSlot,
    ) -> StoreResult<()>;
}

/// Authoritative storage of unmet demands
#[async_trait]
pub trait DemandStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Demand>>;

    async fn create(&self, demand: &Demand) -> StoreResult<()>;

    async fn delete(&self, key: &ApplicationKey) -> StoreResult<()>;
}
