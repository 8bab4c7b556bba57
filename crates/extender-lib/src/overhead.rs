//! Node overhead from pods outside the reservation system

use crate::cluster::PodLister;
use crate::podspec::{assigned_node, is_terminated, pod_requests, SPARK_ROLE_LABEL};
use crate::resources::{node_name, NodeGroupResources};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::HashSet;
use std::sync::Arc;

/// Computes per-node usage of non-Spark pods
///
/// Spark pods are accounted through their reservations, so only pods
/// without a `spark-role` label count as overhead.
#[derive(Clone)]
pub struct OverheadComputer {
    pods: Arc<dyn PodLister>,
}

impl OverheadComputer {
    pub fn new(pods: Arc<dyn PodLister>) -> Self {
        Self { pods }
    }

    /// Overhead of every node in `nodes`
    pub fn overhead(&self, nodes: &[Arc<Node>]) -> NodeGroupResources {
        let names: HashSet<&str> = nodes.iter().map(|n| node_name(n)).collect();
        let mut overhead = NodeGroupResources::new();

        for pod in self.pods.list() {
            if !counts_as_overhead(&pod) {
                continue;
            }
            if let Some(node) = assigned_node(&pod).filter(|n| names.contains(n)) {
                overhead.add_to(node, pod_requests(&pod));
            }
        }
        overhead
    }
}

fn counts_as_overhead(pod: &Pod) -> bool {
    let is_spark = pod
        .metadata
        .labels
        .as_ref()
        .map(|labels| labels.contains_key(SPARK_ROLE_LABEL))
        .unwrap_or(false);
    !is_spark && !is_terminated(pod)
}
