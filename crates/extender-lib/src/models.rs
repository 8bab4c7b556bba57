//! Core data models for the scheduler extender

use crate::resources::Resources;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the driver slot in a reservation
pub const DRIVER_SLOT: &str = "driver";

/// Identity of a Spark application: driver namespace plus application id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationKey {
    pub namespace: String,
    pub app_id: String,
}

impl ApplicationKey {
    pub fn new(namespace: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            app_id: app_id.into(),
        }
    }
}

impl fmt::Display for ApplicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.app_id)
    }
}

/// A node reserved for one pod of an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSlot {
    pub node: String,
    pub resources: Resources,
    /// Pod that claimed this slot, `None` while unbound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_pod: Option<String>,
}

impl ReservationSlot {
    pub fn unbound(node: impl Into<String>, resources: Resources) -> Self {
        Self {
            node: node.into(),
            resources,
            bound_pod: None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound_pod.is_some()
    }

    pub fn is_bound_to(&self, pod: &str) -> bool {
        self.bound_pod.as_deref() == Some(pod)
    }
}

/// Gang reservation for an application: the driver slot and its executor slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub key: ApplicationKey,
    pub driver_pod: String,
    pub driver: ReservationSlot,
    /// Executor slots keyed `executor-00001`, `executor-00002`, ...
    pub executors: BTreeMap<String, ReservationSlot>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Build a reservation with the driver bound to its pod and all executor slots unbound
    pub fn new(
        key: ApplicationKey,
        driver_pod: impl Into<String>,
        driver_node: impl Into<String>,
        driver_resources: Resources,
        executor_nodes: &[String],
        executor_resources: Resources,
    ) -> Self {
        let driver_pod = driver_pod.into();
        let executors = executor_nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                (
                    executor_slot_name(i + 1),
                    ReservationSlot::unbound(node.clone(), executor_resources),
                )
            })
            .collect();

        Self {
            key,
            driver: ReservationSlot {
                node: driver_node.into(),
                resources: driver_resources,
                bound_pod: Some(driver_pod.clone()),
            },
            driver_pod,
            executors,
            created_at: Utc::now(),
        }
    }

    pub fn driver_node(&self) -> &str {
        &self.driver.node
    }

    /// Driver slot followed by every executor slot
    pub fn slots(&self) -> impl Iterator<Item = &ReservationSlot> {
        std::iter::once(&self.driver).chain(self.executors.values())
    }

    /// Executor slot bound to `pod`, if any
    pub fn executor_slot_for(&self, pod: &str) -> Option<(&String, &ReservationSlot)> {
        self.executors.iter().find(|(_, slot)| slot.is_bound_to(pod))
    }
}

/// Slot names are padded so that map order follows slot order
pub fn executor_slot_name(index: usize) -> String {
    format!("executor-{:05}", index)
}

/// An executor placement beyond the application's reserved slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftReservation {
    pub node: String,
    pub resources: Resources,
}

/// An unmet resource request, consumed by external capacity management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    pub key: ApplicationKey,
    /// Pod whose placement failed
    pub pod_name: String,
    pub instance_group: String,
    /// Present when the whole application is waiting on capacity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_resources: Option<Resources>,
    pub executor_resources: Resources,
    pub executor_count: usize,
    pub min_executor_count: usize,
    pub max_executor_count: usize,
    pub created_at: DateTime<Utc>,
}
