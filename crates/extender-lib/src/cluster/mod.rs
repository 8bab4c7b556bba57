//! Cluster state access
//!
//! Provides:
//! - `NodeLister` / `PodLister` traits over a local cache of cluster objects
//! - An in-memory cluster for tests and embedding
//! - A reflector-backed cache fed by the Kubernetes API
//! - Spark-specific pod queries (earlier drivers, executor to driver lookup)

mod memory;
mod reflectors;
mod spark;

pub use memory::InMemoryCluster;
pub use reflectors::KubeClusterCache;
pub use spark::SparkPodLister;

use k8s_openapi::api::core::v1::{Node, Pod};
use std::sync::Arc;
use thiserror::Error;

/// Errors reading cluster state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("node {0} not found")]
    NodeNotFound(String),

    #[error("pod {namespace}/{name} not found")]
    PodNotFound { namespace: String, name: String },

    #[error("driver for application {0} not found")]
    DriverNotFound(String),
}

/// Read access to cached nodes
pub trait NodeLister: Send + Sync {
    fn list(&self) -> Vec<Arc<Node>>;

    fn get(&self, name: &str) -> Result<Arc<Node>, ClusterError>;

    fn list_with_predicate(&self, predicate: &dyn Fn(&Node) -> bool) -> Vec<Arc<Node>> {
        self.list().into_iter().filter(|n| predicate(n)).collect()
    }
}

/// Read access to cached pods
pub trait PodLister: Send + Sync {
    fn list(&self) -> Vec<Arc<Pod>>;

    fn get(&self, namespace: &str, name: &str) -> Result<Arc<Pod>, ClusterError>;

    fn list_with_predicate(&self, predicate: &dyn Fn(&Pod) -> bool) -> Vec<Arc<Pod>> {
        self.list().into_iter().filter(|p| predicate(p)).collect()
    }
}
