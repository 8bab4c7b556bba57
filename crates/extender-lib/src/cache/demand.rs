//! Demand tracking for unmet placement requests

use crate::models::{ApplicationKey, Demand};
use crate::observability::EventLogger;
use crate::podspec::ApplicationResources;
use crate::resources::Resources;
use crate::store::{DemandStore, StoreError, StoreResult};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Most recent unmet demand per application
///
/// Writes go through to the demand store. Store failures are logged and
/// never change the scheduling decision that triggered them.
pub struct DemandTracker {
    demands: DashMap<ApplicationKey, Demand>,
    store: Arc<dyn DemandStore>,
    events: EventLogger,
}

impl DemandTracker {
    pub fn new(store: Arc<dyn DemandStore>, events: EventLogger) -> Self {
        Self {
            demands: DashMap::new(),
            store,
            events,
        }
    }

    /// Record that a whole application is waiting for capacity
    pub async fn create_for_application(
        &self,
        key: &ApplicationKey,
        pod_name: &str,
        instance_group: &str,
        resources: &ApplicationResources,
    ) {
        self.create(Demand {
            key: key.clone(),
            pod_name: pod_name.to_string(),
            instance_group: instance_group.to_string(),
            driver_resources: Some(resources.driver_resources),
            executor_resources: resources.executor_resources,
            executor_count: resources.min_executor_count,
            min_executor_count: resources.min_executor_count,
            max_executor_count: resources.max_executor_count,
            created_at: Utc::now(),
        })
        .await;
    }

    /// Record that a single executor is waiting for capacity
    pub async fn create_for_executor(
        &self,
        key: &ApplicationKey,
        pod_name: &str,
        instance_group: &str,
        executor_resources: Resources,
    ) {
        self.create(Demand {
            key: key.clone(),
            pod_name: pod_name.to_string(),
            instance_group: instance_group.to_string(),
            driver_resources: None,
            executor_resources,
            executor_count: 1,
            min_executor_count: 1,
            max_executor_count: 1,
            created_at: Utc::now(),
        })
        .await;
    }

    async fn create(&self, demand: Demand) {
        if self.demands.contains_key(&demand.key) {
            debug!(application = %demand.key, "Demand already exists, skipping");
            return;
        }

        match self.store.create(&demand).await {
            Ok(()) => {
                self.events.log_demand_created(&demand);
                self.demands.insert(demand.key.clone(), demand);
            }
            Err(StoreError::AlreadyExists(_)) => {
                debug!(application = %demand.key, "Demand already stored");
                self.demands.insert(demand.key.clone(), demand);
            }
            Err(e) => {
                warn!(application = %demand.key, error = %e, "Failed to create demand");
            }
        }
    }

    /// Clear the demand of an application, if there is one
    pub async fn remove_if_exists(&self, key: &ApplicationKey) {
        if self.demands.remove(key).is_none() {
            return;
        }

        match self.store.delete(key).await {
            Ok(()) | Err(StoreError::NotFound(_)) => self.events.log_demand_removed(key),
            Err(e) => warn!(application = %key, error = %e, "Failed to delete demand"),
        }
    }

    pub fn get(&self, key: &ApplicationKey) -> Option<Demand> {
        self.demands.get(key).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<Demand> {
        self.demands.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.demands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.demands.is_empty()
    }

    /// Refresh the cache from the demand store
    pub async fn resync(&self) -> StoreResult<()> {
        let stored = self.store.list().await?;
        let keys: std::collections::HashSet<ApplicationKey> =
            stored.iter().map(|d| d.key.clone()).collect();
        self.demands.retain(|key, _| keys.contains(key));
        for demand in stored {
            self.demands.insert(demand.key.clone(), demand);
        }
        Ok(())
    }
}
