//! Soft reservations for executors beyond an application's reserved slots

use crate::models::{ApplicationKey, SoftReservation};
use crate::resources::NodeGroupResources;
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct ApplicationSoftReservations {
    max_executor_count: usize,
    executors: HashMap<String, SoftReservation>,
}

/// Elastic executor placements by application and executor pod
///
/// Kept in memory only; the reservation store never sees them.
#[derive(Debug, Default)]
pub struct SoftReservationStore {
    applications: DashMap<ApplicationKey, ApplicationSoftReservations>,
}

impl SoftReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an application if it is not tracked yet
    pub fn create_application_if_absent(&self, key: &ApplicationKey, max_executor_count: usize) {
        self.applications
            .entry(key.clone())
            .or_insert_with(|| ApplicationSoftReservations {
                max_executor_count,
                executors: HashMap::new(),
            });
    }

    /// Record a soft reservation for `pod`
    ///
    /// Succeeds only while `bound_executors` plus existing soft reservations
    /// stay below the application's max executor count. The check and the
    /// insert happen under the application's entry lock.
    pub fn add_executor(
        &self,
        key: &ApplicationKey,
        pod: &str,
        reservation: SoftReservation,
        max_executor_count: usize,
        bound_executors: usize,
    ) -> bool {
        let mut entry = self
            .applications
            .entry(key.clone())
            .or_insert_with(|| ApplicationSoftReservations {
                max_executor_count,
                executors: HashMap::new(),
            });

        if entry.executors.contains_key(pod) {
            return true;
        }
        if bound_executors + entry.executors.len() >= entry.max_executor_count {
            return false;
        }
        entry.executors.insert(pod.to_string(), reservation);
        true
    }

    pub fn executor_reservation(&self, key: &ApplicationKey, pod: &str) -> Option<SoftReservation> {
        self.applications
            .get(key)
            .and_then(|app| app.executors.get(pod).cloned())
    }

    /// Soft reservations held by one application
    pub fn executor_count(&self, key: &ApplicationKey) -> usize {
        self.applications
            .get(key)
            .map(|app| app.executors.len())
            .unwrap_or(0)
    }

    pub fn max_executor_count(&self, key: &ApplicationKey) -> Option<usize> {
        self.applications.get(key).map(|app| app.max_executor_count)
    }

    /// Soft reservations across all applications
    pub fn total_executor_count(&self) -> usize {
        self.applications
            .iter()
            .map(|app| app.executors.len())
            .sum()
    }

    /// Resources held by soft reservations, by node
    pub fn used_resources(&self) -> NodeGroupResources {
        let mut usage = NodeGroupResources::new();
        for app in self.applications.iter() {
            for reservation in app.executors.values() {
                usage.add_to(&reservation.node, reservation.resources);
            }
        }
        usage
    }

    /// Drop soft reservations for which `keep` returns false; returns how many were dropped
    pub fn retain_executors(&self, keep: impl Fn(&ApplicationKey, &str) -> bool) -> usize {
        let mut removed = 0;
        for mut app in self.applications.iter_mut() {
            let key = app.key().clone();
            let before = app.executors.len();
            app.executors.retain(|pod, _| keep(&key, pod));
            removed += before - app.executors.len();
        }
        removed
    }

    /// Stop tracking applications for which `keep` returns false
    pub fn retain_applications(&self, keep: impl Fn(&ApplicationKey) -> bool) {
        self.applications.retain(|key, _| keep(key));
    }
}
