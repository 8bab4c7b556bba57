//! Spark-aware pod queries over a `PodLister`

use super::{ClusterError, PodLister};
use crate::models::ApplicationKey;
use crate::podspec::{
    self, app_id, assigned_node, creation_timestamp, find_instance_group, is_deleting,
    is_terminated, label, pod_namespace, scheduler_name, SparkRole, SPARK_APP_ID_LABEL,
};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;

/// Queries for drivers and executors on top of the pod cache
#[derive(Clone)]
pub struct SparkPodLister {
    pods: Arc<dyn PodLister>,
    instance_group_label: String,
}

impl SparkPodLister {
    pub fn new(pods: Arc<dyn PodLister>, instance_group_label: impl Into<String>) -> Self {
        Self {
            pods,
            instance_group_label: instance_group_label.into(),
        }
    }

    /// Instance group of a pod, empty when it has none
    pub fn instance_group(&self, pod: &Pod) -> String {
        find_instance_group(pod, &self.instance_group_label).unwrap_or_default()
    }

    /// Drivers queued ahead of `driver`, oldest first
    ///
    /// A driver is queued ahead when it shares the scheduler and instance
    /// group, is neither placed, deleting nor finished, has no reservation
    /// yet and was created strictly earlier.
    pub fn list_earlier_drivers(
        &self,
        driver: &Pod,
        is_reserved: &dyn Fn(&ApplicationKey) -> bool,
    ) -> Vec<Arc<Pod>> {
        let Some(created) = creation_timestamp(driver) else {
            return Vec::new();
        };
        let scheduler = scheduler_name(driver);
        let group = self.instance_group(driver);

        let mut earlier = self.pods.list_with_predicate(&|pod| {
            SparkRole::of(pod) == Some(SparkRole::Driver)
                && scheduler_name(pod) == scheduler
                && assigned_node(pod).is_none()
                && !is_deleting(pod)
                && !is_terminated(pod)
                && creation_timestamp(pod).map(|t| t < created).unwrap_or(false)
                && self.instance_group(pod) == group
                && podspec::application_key(pod)
                    .map(|key| !is_reserved(&key))
                    .unwrap_or(false)
        });

        earlier.sort_by(|a, b| {
            creation_timestamp(a)
                .cmp(&creation_timestamp(b))
                .then_with(|| podspec::pod_name(a).cmp(podspec::pod_name(b)))
        });
        earlier
    }

    /// Driver of the application an executor belongs to
    pub fn driver_for(&self, executor: &Pod) -> Result<Arc<Pod>, ClusterError> {
        let namespace = pod_namespace(executor);
        let app = app_id(executor)
            .map_err(|_| ClusterError::DriverNotFound(podspec::pod_name(executor).to_string()))?;

        self.pods
            .list_with_predicate(&|pod| {
                pod_namespace(pod) == namespace
                    && SparkRole::of(pod) == Some(SparkRole::Driver)
                    && label(pod, SPARK_APP_ID_LABEL) == Some(app)
            })
            .into_iter()
            .next()
            .ok_or_else(|| ClusterError::DriverNotFound(format!("{}/{}", namespace, app)))
    }

    /// True if the pod is still present and has not finished
    pub fn is_live(&self, namespace: &str, name: &str) -> bool {
        self.pods
            .get(namespace, name)
            .map(|pod| !is_terminated(&pod))
            .unwrap_or(false)
    }
}
