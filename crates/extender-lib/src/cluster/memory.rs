//! Cluster state held in memory

use super::{ClusterError, NodeLister, PodLister};
use crate::podspec::{pod_name, pod_namespace};
use crate::resources::node_name;
use dashmap::DashMap;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::sync::Arc;

/// Nodes and pods kept in concurrent maps
///
/// Used by tests and by callers that feed cluster state themselves.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    nodes: DashMap<String, Arc<Node>>,
    pods: DashMap<(String, String), Arc<Pod>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_node(&self, node: Node) {
        self.nodes.insert(node_name(&node).to_string(), Arc::new(node));
    }

    pub fn remove_node(&self, name: &str) {
        self.nodes.remove(name);
    }

    pub fn upsert_pod(&self, pod: Pod) {
        let key = (pod_namespace(&pod).to_string(), pod_name(&pod).to_string());
        self.pods.insert(key, Arc::new(pod));
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.pods.remove(&(namespace.to_string(), name.to_string()));
    }
}

impl NodeLister for InMemoryCluster {
    fn list(&self) -> Vec<Arc<Node>> {
        self.nodes.iter().map(|entry| entry.value().clone()).collect()
    }

    fn get(&self, name: &str) -> Result<Arc<Node>, ClusterError> {
        self.nodes
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ClusterError::NodeNotFound(name.to_string()))
    }
}

impl PodLister for InMemoryCluster {
    fn list(&self) -> Vec<Arc<Pod>> {
        self.pods.iter().map(|entry| entry.value().clone()).collect()
    }

    fn get(&self, namespace: &str, name: &str) -> Result<Arc<Pod>, ClusterError> {
        self.pods
            .get(&(namespace.to_string(), name.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ClusterError::PodNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
