//! Local cache of gang reservations

use crate::models::{ApplicationKey, Reservation, ReservationSlot};
use dashmap::DashMap;

/// A slot claimed in the cache, with its previous state for rollback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedSlot {
    pub name: String,
    pub slot: ReservationSlot,
    pub previous: ReservationSlot,
}

/// Reservations by application
///
/// Slot claims run while the application's map entry is locked, so two
/// executors can never claim the same slot.
#[derive(Debug, Default)]
pub struct ReservationCache {
    reservations: DashMap<ApplicationKey, Reservation>,
}

impl ReservationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ApplicationKey) -> Option<Reservation> {
        self.reservations.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &ApplicationKey) -> bool {
        self.reservations.contains_key(key)
    }

    pub fn insert(&self, reservation: Reservation) {
        self.reservations.insert(reservation.key.clone(), reservation);
    }

    pub fn list(&self) -> Vec<Reservation> {
        self.reservations
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    /// Replace the cache contents with a fresh listing from the store
    pub fn replace_all(&self, reservations: Vec<Reservation>) {
        let keys: std::collections::HashSet<ApplicationKey> =
            reservations.iter().map(|rr| rr.key.clone()).collect();
        self.reservations.retain(|key, _| keys.contains(key));
        for reservation in reservations {
            self.insert(reservation);
        }
    }

    /// Claim the first slot, in `candidates` order, whose node is a
    /// candidate and which `is_free` accepts
    pub fn claim_executor_slot(
        &self,
        key: &ApplicationKey,
        pod: &str,
        candidates: &[String],
        is_free: impl Fn(&ReservationSlot) -> bool,
    ) -> Option<ClaimedSlot> {
        let mut entry = self.reservations.get_mut(key)?;
        let name = candidates.iter().find_map(|candidate| {
            entry
                .executors
                .iter()
                .find(|(_, slot)| &slot.node == candidate && is_free(slot))
                .map(|(name, _)| name.clone())
        })?;

        let slot = entry.executors.get_mut(&name)?;
        let previous = slot.clone();
        slot.bound_pod = Some(pod.to_string());
        Some(ClaimedSlot {
            name,
            slot: slot.clone(),
            previous,
        })
    }

    /// Move the first slot `is_reclaimable` accepts to `node` and bind it to `pod`
    pub fn relocate_executor_slot(
        &self,
        key: &ApplicationKey,
        pod: &str,
        node: &str,
        is_reclaimable: impl Fn(&ReservationSlot) -> bool,
    ) -> Option<ClaimedSlot> {
        let mut entry = self.reservations.get_mut(key)?;
        let (name, slot) = entry
            .executors
            .iter_mut()
            .find(|(_, slot)| is_reclaimable(slot))?;

        let previous = slot.clone();
        slot.node = node.to_string();
        slot.bound_pod = Some(pod.to_string());
        Some(ClaimedSlot {
            name: name.clone(),
            slot: slot.clone(),
            previous,
        })
    }

    /// Restore a claimed slot to its previous state
    pub fn rollback(&self, key: &ApplicationKey, claimed: &ClaimedSlot) {
        if let Some(mut entry) = self.reservations.get_mut(key) {
            if let Some(slot) = entry.executors.get_mut(&claimed.name) {
                if *slot == claimed.slot {
                    *slot = claimed.previous.clone();
                }
            }
        }
    }
}
