//! Resource accounting for nodes, reservations and placements
//!
//! Availability of a node is its allocatable capacity minus everything the
//! extender knows to be using it: reservation slots, soft reservations and
//! overhead from pods outside the reservation system.

use crate::models::Reservation;
use crate::podspec::{parse_cpu_millis, parse_memory_bytes};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::sync::Arc;
use tracing::warn;

/// Preferred zone label
pub const ZONE_LABEL: &str = "topology.kubernetes.io/zone";

/// Deprecated zone label, still set on older nodes
pub const LEGACY_ZONE_LABEL: &str = "failure-domain.beta.kubernetes.io/zone";

/// CPU and memory amounts
///
/// Signed so that an overcommitted node reports negative availability
/// instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resources {
    pub cpu_millis: i64,
    pub memory_bytes: i64,
}

impl Resources {
    pub const fn new(cpu_millis: i64, memory_bytes: i64) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
        }
    }

    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Returns true if any dimension of `self` exceeds the same dimension of `other`
    pub fn greater_than(&self, other: &Resources) -> bool {
        self.cpu_millis > other.cpu_millis || self.memory_bytes > other.memory_bytes
    }

    /// Returns true if `self` can be placed within `available`
    pub fn fits_in(&self, available: &Resources) -> bool {
        !self.greater_than(available)
    }

    /// Resources of `count` copies of this shape
    pub fn times(&self, count: usize) -> Resources {
        let count = count as i64;
        Resources::new(
            self.cpu_millis.saturating_mul(count),
            self.memory_bytes.saturating_mul(count),
        )
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources::new(
            self.cpu_millis.saturating_add(rhs.cpu_millis),
            self.memory_bytes.saturating_add(rhs.memory_bytes),
        )
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Resources) {
        *self = *self + rhs;
    }
}

impl Sub for Resources {
    type Output = Resources;

    fn sub(self, rhs: Resources) -> Resources {
        Resources::new(
            self.cpu_millis.saturating_sub(rhs.cpu_millis),
            self.memory_bytes.saturating_sub(rhs.memory_bytes),
        )
    }
}

impl SubAssign for Resources {
    fn sub_assign(&mut self, rhs: Resources) {
        *self = *self - rhs;
    }
}

/// Resources per node name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeGroupResources(HashMap<String, Resources>);

impl NodeGroupResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `resources` to the entry for `node`
    pub fn add_to(&mut self, node: &str, resources: Resources) {
        *self.0.entry(node.to_string()).or_default() += resources;
    }

    /// Merge another group into this one, node by node
    pub fn add(&mut self, other: &NodeGroupResources) {
        for (node, resources) in &other.0 {
            self.add_to(node, *resources);
        }
    }

    /// Resources recorded for `node`, zero if none
    pub fn get(&self, node: &str) -> Resources {
        self.0.get(node).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Resources)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Usage of every reservation slot, driver and executors, by node
pub fn usage_for_reservations<'a>(
    reservations: impl IntoIterator<Item = &'a Reservation>,
) -> NodeGroupResources {
    let mut usage = NodeGroupResources::new();
    for reservation in reservations {
        for slot in reservation.slots() {
            usage.add_to(&slot.node, slot.resources);
        }
    }
    usage
}

/// Usage a placement would add to the cluster
pub fn spark_resource_usage(
    driver_resources: Resources,
    executor_resources: Resources,
    driver_node: &str,
    executor_nodes: &[String],
) -> NodeGroupResources {
    let mut usage = NodeGroupResources::new();
    usage.add_to(driver_node, driver_resources);
    for node in executor_nodes {
        usage.add_to(node, executor_resources);
    }
    usage
}

/// Allocatable cpu and memory of a node
pub fn node_capacity(node: &Node) -> Resources {
    let Some(allocatable) = node.status.as_ref().and_then(|s| s.allocatable.as_ref()) else {
        return Resources::zero();
    };

    let cpu_millis = match allocatable.get("cpu").map(parse_cpu_millis) {
        Some(Ok(cpu)) => cpu,
        Some(Err(e)) => {
            warn!(node = %node_name(node), error = %e, "Invalid allocatable cpu, treating as zero");
            0
        }
        None => 0,
    };
    let memory_bytes = match allocatable.get("memory").map(parse_memory_bytes) {
        Some(Ok(memory)) => memory,
        Some(Err(e)) => {
            warn!(node = %node_name(node), error = %e, "Invalid allocatable memory, treating as zero");
            0
        }
        None => 0,
    };

    Resources::new(cpu_millis, memory_bytes)
}

pub fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or_default()
}

/// True if the node reports a `Ready` condition with status `True`
pub fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

pub fn node_is_unschedulable(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false)
}

pub fn node_zone(node: &Node) -> Option<String> {
    let labels = node.metadata.labels.as_ref()?;
    labels
        .get(ZONE_LABEL)
        .or_else(|| labels.get(LEGACY_ZONE_LABEL))
        .cloned()
}

/// Derived per-node view used for a single scheduling decision
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSchedulingMetadata {
    /// Capacity minus all known usage
    pub available: Resources,
    /// Allocatable capacity
    pub schedulable: Resources,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub zone: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub ready: bool,
    pub unschedulable: bool,
}

impl NodeSchedulingMetadata {
    pub fn from_node(node: &Node, usage: Resources) -> Self {
        let schedulable = node_capacity(node);
        Self {
            available: schedulable - usage,
            schedulable,
            creation_timestamp: node.metadata.creation_timestamp.as_ref().map(|t| t.0),
            zone: node_zone(node),
            labels: node.metadata.labels.clone().unwrap_or_default(),
            ready: node_is_ready(node),
            unschedulable: node_is_unschedulable(node),
        }
    }
}

/// Scheduling metadata for a group of nodes, by node name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGroupSchedulingMetadata(HashMap<String, NodeSchedulingMetadata>);

impl NodeGroupSchedulingMetadata {
    /// Build metadata for `nodes`, subtracting `usage` from each node's capacity
    pub fn for_nodes(nodes: &[Arc<Node>], usage: &NodeGroupResources) -> Self {
        Self(
            nodes
                .iter()
                .map(|node| {
                    let name = node_name(node).to_string();
                    let metadata = NodeSchedulingMetadata::from_node(node, usage.get(&name));
                    (name, metadata)
                })
                .collect(),
        )
    }

    pub fn get(&self, node: &str) -> Option<&NodeSchedulingMetadata> {
        self.0.get(node)
    }

    pub fn insert(&mut self, node: impl Into<String>, metadata: NodeSchedulingMetadata) {
        self.0.insert(node.into(), metadata);
    }

    pub fn node_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NodeSchedulingMetadata)> {
        self.0.iter()
    }

    /// Available resources of every node
    pub fn available(&self) -> NodeGroupResources {
        let mut available = NodeGroupResources::new();
        for (name, metadata) in &self.0 {
            available.add_to(name, metadata.available);
        }
        available
    }

    /// Subtract usage from nodes present in this group, ignoring unknown nodes
    pub fn subtract_usage_if_exists(&mut self, usage: &NodeGroupResources) {
        for (node, resources) in usage.iter() {
            if let Some(metadata) = self.0.get_mut(node) {
                metadata.available -= *resources;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Available resources for `nodes` given `usage`
pub fn available_for_nodes(nodes: &[Arc<Node>], usage: &NodeGroupResources) -> NodeGroupResources {
    let mut available = NodeGroupResources::new();
    for node in nodes {
        let name = node_name(node);
        available.add_to(name, node_capacity(node) - usage.get(name));
    }
    available
}
