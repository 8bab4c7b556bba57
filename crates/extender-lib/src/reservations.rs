//! Reservation management
//!
//! Owns the reservation of every application: lookup, creation, executor
//! slot binding and soft reservations for executors beyond the reserved
//! slots. The store is authoritative; the cache mirrors it and is updated
//! optimistically on local success.

use crate::cache::{ClaimedSlot, ReservationCache, SoftReservationStore};
use crate::cluster::SparkPodLister;
use crate::models::{ApplicationKey, Reservation, ReservationSlot, SoftReservation};
use crate::observability::EventLogger;
use crate::podspec::{self, ApplicationResources};
use crate::resources::{usage_for_reservations, NodeGroupResources, Resources};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::{ReservationStore, StoreError, StoreResult};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where an executor ended up when placed beyond its unbound slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraPlacement {
    /// A claimable reserved slot was moved to the node
    RelocatedSlot(String),
    /// A soft reservation was recorded on the node
    Soft,
}

pub struct ReservationManager {
    store: Arc<dyn ReservationStore>,
    cache: ReservationCache,
    soft: SoftReservationStore,
    spark_pods: SparkPodLister,
    retry: RetryPolicy,
    events: EventLogger,
}

impl ReservationManager {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        spark_pods: SparkPodLister,
        retry: RetryPolicy,
        events: EventLogger,
    ) -> Self {
        Self {
            store,
            cache: ReservationCache::new(),
            soft: SoftReservationStore::new(),
            spark_pods,
            retry,
            events,
        }
    }

    pub fn get_reservation(&self, key: &ApplicationKey) -> Option<Reservation> {
        self.cache.get(key)
    }

    pub fn contains(&self, key: &ApplicationKey) -> bool {
        self.cache.contains(key)
    }

    pub fn reservation_count(&self) -> usize {
        self.cache.len()
    }

    pub fn soft_reservation_count(&self) -> usize {
        self.soft.total_executor_count()
    }

    /// Persist a new reservation for a placed driver
    ///
    /// If the store already holds one for the application, that one is
    /// adopted so the driver's placement stays sticky.
    pub async fn create_reservations(
        &self,
        driver: &Pod,
        resources: &ApplicationResources,
        driver_node: &str,
        executor_nodes: &[String],
    ) -> StoreResult<Reservation> {
        let key = podspec::application_key(driver)
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        let reservation = Reservation::new(
            key.clone(),
            podspec::pod_name(driver),
            driver_node,
            resources.driver_resources,
            executor_nodes,
            resources.executor_resources,
        );

        let reservation = match self.store.create(&reservation).await {
            Ok(()) => {
                self.events.log_reservation_created(&reservation);
                reservation
            }
            Err(StoreError::AlreadyExists(_)) => {
                let stored = self.store.get(&key).await?;
                warn!(
                    application = %key,
                    driver_node = %stored.driver_node(),
                    "Reservation already exists in store, adopting it"
                );
                stored
            }
            Err(e) => return Err(e),
        };

        self.cache.insert(reservation.clone());
        self.soft
            .create_application_if_absent(&key, resources.max_executor_count);
        Ok(reservation)
    }

    /// Node already holding `executor`, from a reserved slot or a soft reservation
    pub fn find_already_bound_node(&self, key: &ApplicationKey, executor: &str) -> Option<String> {
        if let Some(reservation) = self.cache.get(key) {
            if let Some((_, slot)) = reservation.executor_slot_for(executor) {
                return Some(slot.node.clone());
            }
        }
        self.soft
            .executor_reservation(key, executor)
            .map(|soft| soft.node)
    }

    /// A slot is claimable when unbound, or bound to a pod that no longer exists
    fn is_claimable(&self, key: &ApplicationKey, slot: &ReservationSlot) -> bool {
        match slot.bound_pod.as_deref() {
            None => true,
            Some(pod) => !self.spark_pods.is_live(&key.namespace, pod),
        }
    }

    /// Executor slots bound to live pods
    fn bound_live_executors(&self, key: &ApplicationKey) -> usize {
        self.cache
            .get(key)
            .map(|reservation| {
                reservation
                    .executors
                    .values()
                    .filter(|slot| slot.is_bound() && !self.is_claimable(key, slot))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Claim a reserved executor slot on the first candidate that has one
    ///
    /// Returns the chosen node, or `None` if no candidate holds a claimable slot.
    pub async fn reserve_for_executor(
        &self,
        key: &ApplicationKey,
        executor: &str,
        candidates: &[String],
    ) -> StoreResult<Option<String>> {
        let Some(claimed) = self
            .cache
            .claim_executor_slot(key, executor, candidates, |slot| self.is_claimable(key, slot))
        else {
            return Ok(None);
        };

        self.persist_claim(key, &claimed).await?;
        debug!(
            application = %key,
            executor,
            slot = %claimed.name,
            node = %claimed.slot.node,
            "Executor slot bound"
        );
        Ok(Some(claimed.slot.node))
    }

    /// Executors the application may still add
    pub fn free_executor_spots(&self, key: &ApplicationKey, max_executor_count: usize) -> usize {
        let max = self
            .soft
            .max_executor_count(key)
            .unwrap_or(max_executor_count);
        max.saturating_sub(self.bound_live_executors(key) + self.soft.executor_count(key))
    }

    /// Place an executor on `node` outside its unbound slots
    ///
    /// A claimable slot (unbound, or bound to a pod that is gone) is moved
    /// to `node`; otherwise a soft reservation is recorded. Returns `None`
    /// when the application has no free spot left.
    pub async fn reserve_for_executor_on_rescheduled_node(
        &self,
        key: &ApplicationKey,
        executor: &str,
        node: &str,
        executor_resources: Resources,
        max_executor_count: usize,
    ) -> StoreResult<Option<ExtraPlacement>> {
        if let Some(claimed) = self
            .cache
            .relocate_executor_slot(key, executor, node, |slot| self.is_claimable(key, slot))
        {
            self.persist_claim(key, &claimed).await?;
            info!(
                application = %key,
                executor,
                slot = %claimed.name,
                from = %claimed.previous.node,
                to = %node,
                "Relocated reclaimable executor slot"
            );
            return Ok(Some(ExtraPlacement::RelocatedSlot(claimed.name)));
        }

        let added = self.soft.add_executor(
            key,
            executor,
            SoftReservation {
                node: node.to_string(),
                resources: executor_resources,
            },
            max_executor_count,
            self.bound_live_executors(key),
        );
        Ok(added.then_some(ExtraPlacement::Soft))
    }

    async fn persist_claim(&self, key: &ApplicationKey, claimed: &ClaimedSlot) -> StoreResult<()> {
        let result = retry_with_backoff(self.retry, "bind executor slot", || {
            self.store.patch_slot(key, &claimed.name, &claimed.slot)
        })
        .await;

        if let Err(e) = &result {
            warn!(
                application = %key,
                slot = %claimed.name,
                error = %e,
                "Failed to persist slot binding, rolling back"
            );
            self.cache.rollback(key, claimed);
        }
        result
    }

    /// Usage of all reservations and soft reservations, by node
    pub fn used_resources(&self) -> NodeGroupResources {
        let reservations = self.cache.list();
        let mut usage = usage_for_reservations(&reservations);
        usage.add(&self.soft.used_resources());
        usage
    }

    /// Refresh reservations from the store and drop soft reservations of
    /// executors that are gone
    pub async fn resync(&self) -> StoreResult<()> {
        let reservations = self.store.list().await?;
        self.cache.replace_all(reservations);

        self.soft.retain_applications(|key| self.cache.contains(key));
        let removed = self
            .soft
            .retain_executors(|key, pod| self.spark_pods.is_live(&key.namespace, pod));
        if removed > 0 {
            debug!(removed, "Compacted soft reservations of finished executors");
        }
        Ok(())
    }
}
