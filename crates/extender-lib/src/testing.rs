//! Shared fixtures for unit tests

use crate::models::{ApplicationKey, Reservation, ReservationSlot};
use crate::podspec::*;
use crate::resources::{Resources, ZONE_LABEL};
use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::core::v1::{
    Container, Node, NodeCondition, NodeSpec, NodeStatus, Pod, PodSpec, PodStatus,
    ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::BTreeMap;

pub const GIB: i64 = 1024 * 1024 * 1024;

/// Namespace every Spark fixture pod lives in
pub const SPARK_NAMESPACE: &str = "spark";

/// Fixed point in time, `seconds` after a base instant
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

/// A ready, schedulable node with the given allocatable resources
pub fn node(name: &str, cpu: &str, memory: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::new()),
            ..Default::default()
        },
        spec: Some(NodeSpec::default()),
        status: Some(NodeStatus {
            allocatable: Some(quantities(cpu, memory)),
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

pub fn node_with_labels(name: &str, labels: &[(&str, &str)]) -> Node {
    let mut node = node(name, "8", "32Gi");
    node.metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    node
}

pub fn in_zone(mut node: Node, zone: &str) -> Node {
    node.metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(ZONE_LABEL.to_string(), zone.to_string());
    node
}

pub fn node_labelled(mut node: Node, key: &str, value: &str) -> Node {
    node.metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    node
}

pub fn node_created_at(mut node: Node, seconds: i64) -> Node {
    node.metadata.creation_timestamp = Some(Time(at(seconds)));
    node
}

pub fn not_ready(mut node: Node) -> Node {
    if let Some(status) = node.status.as_mut() {
        status.conditions = Some(vec![NodeCondition {
            type_: "Ready".to_string(),
            status: "False".to_string(),
            ..Default::default()
        }]);
    }
    node
}

fn container(cpu: &str, memory: &str) -> Container {
    Container {
        name: "main".to_string(),
        resources: Some(ResourceRequirements {
            requests: Some(quantities(cpu, memory)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A non-Spark pod, optionally bound to `node`
pub fn plain_pod(name: &str, node: Option<&str>, cpu: &str, memory: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container(cpu, memory)],
            node_name: node.map(str::to_string),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            ..Default::default()
        }),
    }
}

/// A driver whose driver and executor shape are both `cpu`/`memory`
///
/// `min == max` describes static allocation, anything else turns on
/// dynamic allocation.
pub fn driver_pod(app: &str, cpu: &str, memory: &str, min: usize, max: usize) -> Pod {
    driver_pod_with_shapes(app, (cpu, memory), (cpu, memory), min, max)
}

pub fn driver_pod_with_shapes(
    app: &str,
    driver: (&str, &str),
    executor: (&str, &str),
    min: usize,
    max: usize,
) -> Pod {
    let mut annotations = BTreeMap::from([
        (DRIVER_CPU.to_string(), driver.0.to_string()),
        (DRIVER_MEMORY.to_string(), driver.1.to_string()),
        (EXECUTOR_CPU.to_string(), executor.0.to_string()),
        (EXECUTOR_MEMORY.to_string(), executor.1.to_string()),
    ]);
    if min == max {
        annotations.insert(EXECUTOR_COUNT.to_string(), min.to_string());
    } else {
        annotations.insert(DYNAMIC_ALLOCATION_ENABLED.to_string(), "true".to_string());
        annotations.insert(DA_MIN_EXECUTOR_COUNT.to_string(), min.to_string());
        annotations.insert(DA_MAX_EXECUTOR_COUNT.to_string(), max.to_string());
    }

    Pod {
        metadata: ObjectMeta {
            name: Some(format!("{}-driver", app)),
            namespace: Some(SPARK_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([
                (SPARK_ROLE_LABEL.to_string(), "driver".to_string()),
                (SPARK_APP_ID_LABEL.to_string(), app.to_string()),
            ])),
            annotations: Some(annotations),
            creation_timestamp: Some(Time(at(0))),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container(driver.0, driver.1)],
            scheduler_name: Some("spark-scheduler".to_string()),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        }),
    }
}

pub fn executor_pod(app: &str, name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(SPARK_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([
                (SPARK_ROLE_LABEL.to_string(), "executor".to_string()),
                (SPARK_APP_ID_LABEL.to_string(), app.to_string()),
            ])),
            creation_timestamp: Some(Time(at(0))),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container("1", "1Gi")],
            scheduler_name: Some("spark-scheduler".to_string()),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        }),
    }
}

pub fn with_annotation(mut pod: Pod, key: &str, value: &str) -> Pod {
    pod.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    pod
}

pub fn created_at(mut pod: Pod, seconds: i64) -> Pod {
    pod.metadata.creation_timestamp = Some(Time(at(seconds)));
    pod
}

pub fn in_instance_group(mut pod: Pod, label: &str, group: &str) -> Pod {
    pod.spec
        .get_or_insert_with(Default::default)
        .node_selector
        .get_or_insert_with(BTreeMap::new)
        .insert(label.to_string(), group.to_string());
    pod
}

pub fn bound_to(mut pod: Pod, node: &str) -> Pod {
    pod.spec.get_or_insert_with(Default::default).node_name = Some(node.to_string());
    pod
}

pub fn with_phase(mut pod: Pod, phase: &str) -> Pod {
    pod.status.get_or_insert_with(Default::default).phase = Some(phase.to_string());
    pod
}

/// A reservation with a bound driver slot and unbound executor slots
pub fn reservation(
    namespace: &str,
    app: &str,
    driver: (&str, Resources),
    executors: &[(&str, Resources)],
) -> Reservation {
    let mut rr = Reservation::new(
        ApplicationKey::new(namespace, app),
        format!("{}-driver", app),
        driver.0,
        driver.1,
        &[],
        Resources::zero(),
    );
    for (i, (node, resources)) in executors.iter().enumerate() {
        rr.executors.insert(
            crate::models::executor_slot_name(i + 1),
            ReservationSlot::unbound(*node, *resources),
        );
    }
    rr
}
