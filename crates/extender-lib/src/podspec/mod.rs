//! Spark pod conventions
//!
//! Spark pods identify themselves through labels (`spark-role`,
//! `spark-app-id`) and drivers describe the whole application's resource
//! shape through annotations. This module reads those conventions and the
//! scheduling constraints carried in the pod spec.

mod affinity;
mod quantity;

pub use affinity::{find_instance_group, pod_matches_node_selector_and_affinity};
pub use quantity::{parse_cpu_millis, parse_memory_bytes, parse_scaled, QuantityError};

use crate::models::ApplicationKey;
use crate::resources::Resources;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SPARK_ROLE_LABEL: &str = "spark-role";
pub const SPARK_APP_ID_LABEL: &str = "spark-app-id";

pub const DRIVER_CPU: &str = "spark-driver-cpu";
pub const DRIVER_MEMORY: &str = "spark-driver-mem";
pub const EXECUTOR_CPU: &str = "spark-executor-cpu";
pub const EXECUTOR_MEMORY: &str = "spark-executor-mem";
pub const EXECUTOR_COUNT: &str = "spark-executor-count";
pub const DYNAMIC_ALLOCATION_ENABLED: &str = "spark-dynamic-allocation-enabled";
pub const DA_MIN_EXECUTOR_COUNT: &str = "spark-dynamic-allocation-min-executor-count";
pub const DA_MAX_EXECUTOR_COUNT: &str = "spark-dynamic-allocation-max-executor-count";

/// Largest executor count accepted from a driver's annotations
pub const MAX_EXECUTOR_COUNT: usize = 10_000;

/// Errors reading Spark conventions from a pod
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PodSpecError {
    #[error("pod is missing label {0}")]
    MissingLabel(&'static str),

    #[error("pod is missing annotation {0}")]
    MissingAnnotation(&'static str),

    #[error("invalid value {value:?} for annotation {annotation}: {reason}")]
    InvalidAnnotation {
        annotation: &'static str,
        value: String,
        reason: String,
    },

    #[error("minimum executor count {min} exceeds maximum {max}")]
    InvalidExecutorRange { min: usize, max: usize },
}

/// Role of a pod within a Spark application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SparkRole {
    Driver,
    Executor,
}

impl SparkRole {
    /// Classify a pod from its `spark-role` label
    pub fn of(pod: &Pod) -> Option<Self> {
        match label(pod, SPARK_ROLE_LABEL)? {
            "driver" => Some(SparkRole::Driver),
            "executor" => Some(SparkRole::Executor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SparkRole::Driver => "driver",
            SparkRole::Executor => "executor",
        }
    }
}

/// Resource shape of a whole application, parsed from its driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationResources {
    pub driver_resources: Resources,
    pub executor_resources: Resources,
    pub min_executor_count: usize,
    pub max_executor_count: usize,
}

/// Parse the application's resource shape from driver annotations
pub fn application_resources(driver: &Pod) -> Result<ApplicationResources, PodSpecError> {
    let driver_resources = Resources::new(
        cpu_annotation(driver, DRIVER_CPU)?,
        memory_annotation(driver, DRIVER_MEMORY)?,
    );
    let executor_resources = Resources::new(
        cpu_annotation(driver, EXECUTOR_CPU)?,
        memory_annotation(driver, EXECUTOR_MEMORY)?,
    );

    let dynamic_allocation = annotation(driver, DYNAMIC_ALLOCATION_ENABLED)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let (min_executor_count, max_executor_count) = if dynamic_allocation {
        (
            count_annotation(driver, DA_MIN_EXECUTOR_COUNT)?,
            count_annotation(driver, DA_MAX_EXECUTOR_COUNT)?,
        )
    } else {
        let count = count_annotation(driver, EXECUTOR_COUNT)?;
        (count, count)
    };

    if min_executor_count > max_executor_count {
        return Err(PodSpecError::InvalidExecutorRange {
            min: min_executor_count,
            max: max_executor_count,
        });
    }

    Ok(ApplicationResources {
        driver_resources,
        executor_resources,
        min_executor_count,
        max_executor_count,
    })
}

pub fn label<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata.labels.as_ref()?.get(key).map(String::as_str)
}

pub fn annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .annotations
        .as_ref()?
        .get(key)
        .map(String::as_str)
}

pub fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

pub fn pod_namespace(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or("default")
}

pub fn app_id(pod: &Pod) -> Result<&str, PodSpecError> {
    label(pod, SPARK_APP_ID_LABEL).ok_or(PodSpecError::MissingLabel(SPARK_APP_ID_LABEL))
}

/// Application key of a driver or executor pod
pub fn application_key(pod: &Pod) -> Result<ApplicationKey, PodSpecError> {
    Ok(ApplicationKey::new(pod_namespace(pod), app_id(pod)?))
}

pub fn creation_timestamp(pod: &Pod) -> Option<DateTime<Utc>> {
    pod.metadata.creation_timestamp.as_ref().map(|t| t.0)
}

pub fn scheduler_name(pod: &Pod) -> &str {
    pod.spec
        .as_ref()
        .and_then(|s| s.scheduler_name.as_deref())
        .unwrap_or("default-scheduler")
}

/// Node the pod is bound to, if any
pub fn assigned_node(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .filter(|n| !n.is_empty())
}

/// True once a pod has finished and no longer holds node resources
pub fn is_terminated(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

pub fn is_deleting(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// Requested resources of a pod: the larger of the container sum and the biggest init container
pub fn pod_requests(pod: &Pod) -> Resources {
    let Some(spec) = pod.spec.as_ref() else {
        return Resources::zero();
    };

    let containers = spec
        .containers
        .iter()
        .map(container_requests)
        .fold(Resources::zero(), |acc, r| acc + r);

    let init = spec
        .init_containers
        .iter()
        .flatten()
        .map(container_requests)
        .fold(Resources::zero(), |acc, r| {
            Resources::new(
                acc.cpu_millis.max(r.cpu_millis),
                acc.memory_bytes.max(r.memory_bytes),
            )
        });

    Resources::new(
        containers.cpu_millis.max(init.cpu_millis),
        containers.memory_bytes.max(init.memory_bytes),
    )
}

fn container_requests(container: &Container) -> Resources {
    let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref()) else {
        return Resources::zero();
    };
    Resources::new(
        requests
            .get("cpu")
            .and_then(|q| parse_cpu_millis(q).ok())
            .unwrap_or(0)
            .max(0),
        requests
            .get("memory")
            .and_then(|q| parse_memory_bytes(q).ok())
            .unwrap_or(0)
            .max(0),
    )
}

fn required_annotation<'a>(pod: &'a Pod, key: &'static str) -> Result<&'a str, PodSpecError> {
    annotation(pod, key).ok_or(PodSpecError::MissingAnnotation(key))
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> PodSpecError {
    PodSpecError::InvalidAnnotation {
        annotation: key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn quantity_annotation(
    pod: &Pod,
    key: &'static str,
    parse: fn(&Quantity) -> Result<i64, QuantityError>,
) -> Result<i64, PodSpecError> {
    let value = required_annotation(pod, key)?;
    let parsed = parse(&Quantity(value.to_string())).map_err(|e| invalid(key, value, e))?;
    if parsed < 0 {
        return Err(invalid(key, value, "must not be negative"));
    }
    Ok(parsed)
}

fn cpu_annotation(pod: &Pod, key: &'static str) -> Result<i64, PodSpecError> {
    quantity_annotation(pod, key, parse_cpu_millis)
}

fn memory_annotation(pod: &Pod, key: &'static str) -> Result<i64, PodSpecError> {
    quantity_annotation(pod, key, parse_memory_bytes)
}

fn count_annotation(pod: &Pod, key: &'static str) -> Result<usize, PodSpecError> {
    let value = required_annotation(pod, key)?;
    let count: usize = value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(key, value, e))?;
    if count > MAX_EXECUTOR_COUNT {
        return Err(invalid(
            key,
            value,
            format!("exceeds the maximum of {}", MAX_EXECUTOR_COUNT),
        ));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{driver_pod, executor_pod, plain_pod, with_annotation};

    #[test]
    fn test_role_classification() {
        assert_eq!(SparkRole::of(&driver_pod("app", "1", "1Gi", 1, 1)), Some(SparkRole::Driver));
        assert_eq!(SparkRole::of(&executor_pod("app", "exec-1")), Some(SparkRole::Executor));
        assert_eq!(SparkRole::of(&plain_pod("web", None, "1", "1Gi")), None);
    }

    #[test]
    fn test_static_allocation_resources() {
        let driver = driver_pod("app", "2", "4Gi", 3, 3);
        let resources = application_resources(&driver).unwrap();

        assert_eq!(resources.driver_resources, Resources::new(2000, 4 * 1024 * 1024 * 1024));
        assert_eq!(resources.executor_resources, Resources::new(2000, 4 * 1024 * 1024 * 1024));
        assert_eq!(resources.min_executor_count, 3);
        assert_eq!(resources.max_executor_count, 3);
    }

    #[test]
    fn test_dynamic_allocation_resources() {
        let driver = driver_pod("app", "1", "1Gi", 1, 5);
        let resources = application_resources(&driver).unwrap();
        assert_eq!(resources.min_executor_count, 1);
        assert_eq!(resources.max_executor_count, 5);
    }

    #[test]
    fn test_missing_annotation() {
        let mut driver = driver_pod("app", "1", "1Gi", 1, 1);
        driver
            .metadata
            .annotations
            .as_mut()
            .unwrap()
            .remove(EXECUTOR_CPU);
        assert_eq!(
            application_resources(&driver),
            Err(PodSpecError::MissingAnnotation(EXECUTOR_CPU))
        );
    }

    #[test]
    fn test_invalid_annotation() {
        let driver = with_annotation(driver_pod("app", "1", "1Gi", 1, 1), DRIVER_MEMORY, "lots");
        assert!(matches!(
            application_resources(&driver),
            Err(PodSpecError::InvalidAnnotation { annotation: DRIVER_MEMORY, .. })
        ));
    }

    #[test]
    fn test_negative_shapes_are_rejected() {
        let driver = with_annotation(driver_pod("app", "1", "1Gi", 1, 1), EXECUTOR_CPU, "-3");
        assert!(matches!(
            application_resources(&driver),
            Err(PodSpecError::InvalidAnnotation { annotation: EXECUTOR_CPU, .. })
        ));

        let driver = with_annotation(driver_pod("app", "1", "1Gi", 1, 1), DRIVER_MEMORY, "-1Gi");
        assert!(matches!(
            application_resources(&driver),
            Err(PodSpecError::InvalidAnnotation { annotation: DRIVER_MEMORY, .. })
        ));
    }

    #[test]
    fn test_executor_count_is_bounded() {
        let at_limit = driver_pod("app", "1", "1Gi", MAX_EXECUTOR_COUNT, MAX_EXECUTOR_COUNT);
        assert_eq!(
            application_resources(&at_limit).unwrap().max_executor_count,
            MAX_EXECUTOR_COUNT
        );

        let huge = driver_pod("app", "1", "1Gi", 1 << 45, 1 << 45);
        assert!(matches!(
            application_resources(&huge),
            Err(PodSpecError::InvalidAnnotation { annotation: EXECUTOR_COUNT, .. })
        ));

        let huge_max = driver_pod("app", "1", "1Gi", 1, 1 << 45);
        assert!(matches!(
            application_resources(&huge_max),
            Err(PodSpecError::InvalidAnnotation { annotation: DA_MAX_EXECUTOR_COUNT, .. })
        ));
    }

    #[test]
    fn test_inverted_executor_range() {
        let driver = driver_pod("app", "1", "1Gi", 4, 2);
        assert_eq!(
            application_resources(&driver),
            Err(PodSpecError::InvalidExecutorRange { min: 4, max: 2 })
        );
    }

    #[test]
    fn test_pod_requests() {
        let pod = plain_pod("web", Some("n1"), "1500m", "2Gi");
        assert_eq!(pod_requests(&pod), Resources::new(1500, 2 * 1024 * 1024 * 1024));
    }

    #[test]
    fn test_negative_container_requests_count_as_zero() {
        let pod = plain_pod("web", Some("n1"), "-2", "1Gi");
        assert_eq!(pod_requests(&pod), Resources::new(0, 1024 * 1024 * 1024));
    }

    #[test]
    fn test_application_key() {
        let executor = executor_pod("app-7", "exec-1");
        assert_eq!(application_key(&executor).unwrap(), ApplicationKey::new("spark", "app-7"));
    }
}
