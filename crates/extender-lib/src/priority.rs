//! Candidate node ordering
//!
//! Nodes are first put in a host priority order, then driver and executor
//! candidate lists are each stable-sorted by an optional label-based
//! ordering taken from configuration.

use crate::resources::{NodeGroupSchedulingMetadata, NodeSchedulingMetadata, Resources};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Label whose values rank nodes, highest priority value first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPriorityOrder {
    pub name: String,
    pub descending_priority_values: Vec<String>,
}

/// Ranks nodes by the value of one label
#[derive(Debug, Clone)]
pub struct NodeOrdering {
    label: String,
    ranks: HashMap<String, usize>,
}

impl NodeOrdering {
    pub fn new(order: &LabelPriorityOrder) -> Self {
        let mut ranks = HashMap::new();
        for (rank, value) in order.descending_priority_values.iter().enumerate() {
            ranks.entry(value.clone()).or_insert(rank);
        }
        Self {
            label: order.name.clone(),
            ranks,
        }
    }

    /// Rank of a node; nodes without a listed value rank last
    fn rank(&self, metadata: Option<&NodeSchedulingMetadata>) -> usize {
        metadata
            .and_then(|m| m.labels.get(&self.label))
            .and_then(|value| self.ranks.get(value))
            .copied()
            .unwrap_or(usize::MAX)
    }

    /// Stable sort of `nodes` by rank
    pub fn sort(&self, nodes: &mut [String], metadata: &NodeGroupSchedulingMetadata) {
        nodes.sort_by_cached_key(|node| self.rank(metadata.get(node)));
    }
}

/// Orders candidate nodes for drivers and executors
#[derive(Debug, Clone, Default)]
pub struct NodePriority {
    use_experimental_host_priorities: bool,
    driver_ordering: Option<NodeOrdering>,
    executor_ordering: Option<NodeOrdering>,
}

impl NodePriority {
    pub fn new(
        use_experimental_host_priorities: bool,
        driver_order: Option<&LabelPriorityOrder>,
        executor_order: Option<&LabelPriorityOrder>,
    ) -> Self {
        Self {
            use_experimental_host_priorities,
            driver_ordering: driver_order.map(NodeOrdering::new),
            executor_ordering: executor_order.map(NodeOrdering::new),
        }
    }

    /// Every node in `metadata`, in host priority order
    pub fn nodes_in_priority_order(&self, metadata: &NodeGroupSchedulingMetadata) -> Vec<String> {
        let mut nodes: Vec<(&String, &NodeSchedulingMetadata)> = metadata.iter().collect();

        if self.use_experimental_host_priorities {
            let mut zone_available: BTreeMap<Option<&str>, Resources> = BTreeMap::new();
            for (_, m) in metadata.iter() {
                *zone_available.entry(m.zone.as_deref()).or_default() += m.available;
            }
            // least available zones first, then least available nodes, to keep
            // emptier capacity free for larger applications
            nodes.sort_by(|(a_name, a), (b_name, b)| {
                let a_zone = zone_available[&a.zone.as_deref()];
                let b_zone = zone_available[&b.zone.as_deref()];
                by_memory_then_cpu(&a_zone, &b_zone)
                    .then_with(|| a.zone.cmp(&b.zone))
                    .then_with(|| by_memory_then_cpu(&a.available, &b.available))
                    .then_with(|| a_name.cmp(b_name))
            });
        } else {
            // newest nodes first; nodes without a timestamp last
            nodes.sort_by(|(a_name, a), (b_name, b)| {
                match (a.creation_timestamp, b.creation_timestamp) {
                    (Some(a_ts), Some(b_ts)) => b_ts.cmp(&a_ts),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
                .then_with(|| a_name.cmp(b_name))
            });
        }

        nodes.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// Driver and executor candidates, each in priority order
    ///
    /// Driver candidates are the priority-ordered nodes the orchestrator
    /// offered; executor candidates are all ready, schedulable nodes.
    pub fn potential_nodes(
        &self,
        metadata: &NodeGroupSchedulingMetadata,
        candidates: &[String],
    ) -> (Vec<String>, Vec<String>) {
        let offered: HashSet<&str> = candidates.iter().map(String::as_str).collect();
        let ordered = self.nodes_in_priority_order(metadata);

        let mut driver_nodes = Vec::with_capacity(ordered.len());
        let mut executor_nodes = Vec::with_capacity(ordered.len());
        for name in ordered {
            if offered.contains(name.as_str()) {
                driver_nodes.push(name.clone());
            }
            if metadata
                .get(&name)
                .map(|m| m.ready && !m.unschedulable)
                .unwrap_or(false)
            {
                executor_nodes.push(name);
            }
        }

        if let Some(ordering) = &self.driver_ordering {
            ordering.sort(&mut driver_nodes, metadata);
        }
        if let Some(ordering) = &self.executor_ordering {
            ordering.sort(&mut executor_nodes, metadata);
        }
        (driver_nodes, executor_nodes)
    }
}

fn by_memory_then_cpu(a: &Resources, b: &Resources) -> Ordering {
    a.memory_bytes
        .cmp(&b.memory_bytes)
        .then_with(|| a.cpu_millis.cmp(&b.cpu_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::NodeGroupResources;
    use crate::testing::*;
    use k8s_openapi::api::core::v1::Node;
    use std::sync::Arc;

    fn metadata(nodes: Vec<Node>, usage: &NodeGroupResources) -> NodeGroupSchedulingMetadata {
        let nodes: Vec<Arc<Node>> = nodes.into_iter().map(Arc::new).collect();
        NodeGroupSchedulingMetadata::for_nodes(&nodes, usage)
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_default_order_is_newest_first() {
        let md = metadata(
            vec![
                node_created_at(node("old", "4", "4Gi"), 10),
                node_created_at(node("new", "4", "4Gi"), 500),
                node("unknown", "4", "4Gi"),
                node_created_at(node("also-new", "4", "4Gi"), 500),
            ],
            &NodeGroupResources::new(),
        );

        assert_eq!(
            NodePriority::default().nodes_in_priority_order(&md),
            names(&["also-new", "new", "old", "unknown"])
        );
    }

    #[test]
    fn test_experimental_order_prefers_fuller_zones_and_nodes() {
        let mut usage = NodeGroupResources::new();
        usage.add_to("a1", Resources::new(0, 3 * GIB));
        usage.add_to("b2", Resources::new(0, GIB));
        let md = metadata(
            vec![
                in_zone(node("a1", "4", "4Gi"), "zone-a"),
                in_zone(node("a2", "4", "4Gi"), "zone-a"),
                in_zone(node("b1", "4", "2Gi"), "zone-b"),
                in_zone(node("b2", "4", "4Gi"), "zone-b"),
            ],
            &usage,
        );

        // zone-a has 5Gi free, zone-b 5Gi as well; tie broken by zone name
        let priority = NodePriority::new(true, None, None);
        assert_eq!(
            priority.nodes_in_priority_order(&md),
            names(&["a1", "a2", "b1", "b2"])
        );

        let mut more = NodeGroupResources::new();
        more.add_to("b1", Resources::new(0, GIB));
        let mut md = md;
        md.subtract_usage_if_exists(&more);
        assert_eq!(
            priority.nodes_in_priority_order(&md),
            names(&["b1", "b2", "a1", "a2"])
        );
    }

    #[test]
    fn test_potential_nodes_split_driver_and_executor_candidates() {
        let mut cordoned = node_created_at(node("cordoned", "4", "4Gi"), 300);
        cordoned.spec.as_mut().unwrap().unschedulable = Some(true);
        let md = metadata(
            vec![
                node_created_at(node("n1", "4", "4Gi"), 100),
                node_created_at(node("n2", "4", "4Gi"), 200),
                cordoned,
                not_ready(node_created_at(node("sick", "4", "4Gi"), 400)),
            ],
            &NodeGroupResources::new(),
        );

        let (drivers, executors) = NodePriority::default()
            .potential_nodes(&md, &names(&["n1", "cordoned", "sick", "elsewhere"]));
        assert_eq!(drivers, names(&["sick", "cordoned", "n1"]));
        assert_eq!(executors, names(&["n2", "n1"]));
    }

    #[test]
    fn test_label_ordering_is_stable() {
        let md = metadata(
            vec![
                node_labelled(node_created_at(node("spot-new", "4", "4Gi"), 300), "lifecycle", "spot"),
                node_labelled(node_created_at(node("od", "4", "4Gi"), 200), "lifecycle", "on-demand"),
                node_labelled(node_created_at(node("spot-old", "4", "4Gi"), 100), "lifecycle", "spot"),
                node_created_at(node("unlabelled", "4", "4Gi"), 400),
            ],
            &NodeGroupResources::new(),
        );
        let order = LabelPriorityOrder {
            name: "lifecycle".to_string(),
            descending_priority_values: names(&["on-demand", "spot"]),
        };
        let all = names(&["spot-new", "od", "spot-old", "unlabelled"]);

        let priority = NodePriority::new(false, Some(&order), None);
        let (drivers, executors) = priority.potential_nodes(&md, &all);
        assert_eq!(drivers, names(&["od", "spot-new", "spot-old", "unlabelled"]));
        assert_eq!(executors, names(&["unlabelled", "spot-new", "od", "spot-old"]));
    }
}
