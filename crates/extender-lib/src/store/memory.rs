//! In-memory implementation of the store traits

use super::{DemandStore, ReservationStore, StoreError, StoreResult};
use crate::migration::{MigrationStatus, MigrationStore, CURRENT_STORAGE_VERSION};
use crate::models::{ApplicationKey, Demand, Reservation, ReservationSlot, DRIVER_SLOT};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredReservation {
    reservation: Reservation,
    resource_version: u64,
    storage_version: String,
}

/// Process-local store for reservations, demands and migration state
#[derive(Debug, Default)]
pub struct InMemoryStore {
    reservations: DashMap<ApplicationKey, StoredReservation>,
    demands: DashMap<ApplicationKey, Demand>,
    migration_status: RwLock<Option<MigrationStatus>>,
    next_version: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Insert a record written under an older storage version
    pub fn insert_with_storage_version(&self, reservation: Reservation, storage_version: &str) {
        let resource_version = self.bump();
        self.reservations.insert(
            reservation.key.clone(),
            StoredReservation {
                reservation,
                resource_version,
                storage_version: storage_version.to_string(),
            },
        );
    }

    pub fn storage_version(&self, key: &ApplicationKey) -> Option<String> {
        self.reservations
            .get(key)
            .map(|stored| stored.storage_version.clone())
    }

    pub fn resource_version(&self, key: &ApplicationKey) -> Option<u64> {
        self.reservations.get(key).map(|stored| stored.resource_version)
    }

    pub fn demand_count(&self) -> usize {
        self.demands.len()
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn list(&self) -> StoreResult<Vec<Reservation>> {
        Ok(self
            .reservations
            .iter()
            .map(|entry| entry.reservation.clone())
            .collect())
    }

    async fn get(&self, key: &ApplicationKey) -> StoreResult<Reservation> {
        self.reservations
            .get(key)
            .map(|stored| stored.reservation.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn create(&self, reservation: &Reservation) -> StoreResult<()> {
        use dashmap::mapref::entry::Entry;

        let resource_version = self.bump();
        match self.reservations.entry(reservation.key.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(reservation.key.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(StoredReservation {
                    reservation: reservation.clone(),
                    resource_version,
                    storage_version: CURRENT_STORAGE_VERSION.to_string(),
                });
                Ok(())
            }
        }
    }

    async fn patch_slot(
        &self,
        key: &ApplicationKey,
        slot_name: &str,
        slot: &ReservationSlot,
    ) -> StoreResult<()> {
        let resource_version = self.bump();
        let mut stored = self
            .reservations
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if slot_name == DRIVER_SLOT {
            if stored.reservation.driver.node != slot.node {
                return Err(StoreError::Rejected(format!(
                    "driver node of {} is immutable",
                    key
                )));
            }
            stored.reservation.driver = slot.clone();
        } else {
            stored
                .reservation
                .executors
                .insert(slot_name.to_string(), slot.clone());
        }
        stored.resource_version = resource_version;
        Ok(())
    }
}

#[async_trait]
impl DemandStore for InMemoryStore {
    async fn list(&self) -> StoreResult<Vec<Demand>> {
        Ok(self.demands.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn create(&self, demand: &Demand) -> StoreResult<()> {
        use dashmap::mapref::entry::Entry;

        match self.demands.entry(demand.key.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(demand.key.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(demand.clone());
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &ApplicationKey) -> StoreResult<()> {
        self.demands
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

#[async_trait]
impl MigrationStore for InMemoryStore {
    async fn migration_status(&self) -> StoreResult<Option<MigrationStatus>> {
        Ok(*self.migration_status.read().await)
    }

    async fn set_migration_status(&self, status: MigrationStatus) -> StoreResult<()> {
        *self.migration_status.write().await = Some(status);
        Ok(())
    }

    async fn list_keys(&self) -> StoreResult<Vec<ApplicationKey>> {
        Ok(self.reservations.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn rewrite(&self, key: &ApplicationKey) -> StoreResult<()> {
        let resource_version = self.bump();
        let mut stored = self
            .reservations
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        stored.storage_version = CURRENT_STORAGE_VERSION.to_string();
        stored.resource_version = resource_version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Resources;
    use crate::testing::reservation;

    fn sample() -> Reservation {
        reservation(
            "spark",
            "app",
            ("n1", Resources::new(1000, 100)),
            &[("n2", Resources::new(500, 50))],
        )
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let store = InMemoryStore::new();
        let rr = sample();

        ReservationStore::create(&store, &rr).await.unwrap();
        assert_eq!(
            ReservationStore::create(&store, &rr).await,
            Err(StoreError::AlreadyExists("spark/app".to_string()))
        );
        assert_eq!(ReservationStore::get(&store, &rr.key).await.unwrap(), rr);
    }

    #[tokio::test]
    async fn test_patch_slot_touches_only_that_slot() {
        let store = InMemoryStore::new();
        let rr = sample();
        ReservationStore::create(&store, &rr).await.unwrap();
        let before = store.resource_version(&rr.key).unwrap();

        let mut slot = rr.executors["executor-00001"].clone();
        slot.bound_pod = Some("exec-1".to_string());
        store.patch_slot(&rr.key, "executor-00001", &slot).await.unwrap();

        let stored = ReservationStore::get(&store, &rr.key).await.unwrap();
        assert!(stored.executors["executor-00001"].is_bound_to("exec-1"));
        assert_eq!(stored.driver, rr.driver);
        assert!(store.resource_version(&rr.key).unwrap() > before);
    }

    #[tokio::test]
    async fn test_driver_node_is_immutable() {
        let store = InMemoryStore::new();
        let rr = sample();
        ReservationStore::create(&store, &rr).await.unwrap();

        let moved = ReservationSlot::unbound("n9", rr.driver.resources);
        assert!(matches!(
            store.patch_slot(&rr.key, DRIVER_SLOT, &moved).await,
            Err(StoreError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_patch_missing_reservation() {
        let store = InMemoryStore::new();
        let rr = sample();
        let slot = rr.executors["executor-00001"].clone();
        assert!(matches!(
            store.patch_slot(&rr.key, "executor-00001", &slot).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_demand_lifecycle() {
        let store = InMemoryStore::new();
        let demand = Demand {
            key: ApplicationKey::new("spark", "app"),
            pod_name: "app-driver".to_string(),
            instance_group: "batch".to_string(),
            driver_resources: None,
            executor_resources: Resources::new(1000, 10),
            executor_count: 1,
            min_executor_count: 1,
            max_executor_count: 1,
            created_at: chrono::Utc::now(),
        };

        DemandStore::create(&store, &demand).await.unwrap();
        assert_eq!(DemandStore::list(&store).await.unwrap().len(), 1);
        assert!(DemandStore::create(&store, &demand).await.is_err());

        store.delete(&demand.key).await.unwrap();
        assert_eq!(store.demand_count(), 0);
        assert!(matches!(
            store.delete(&demand.key).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
