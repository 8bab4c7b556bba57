//! Observability infrastructure for the scheduler extender
//!
//! Provides:
//! - Prometheus metrics (schedule latency and outcomes, reconciliation time,
//!   cross-zone placements, cache sizes)
//! - Structured JSON events with tracing

use crate::extender::Outcome;
use crate::models::{ApplicationKey, Demand, Reservation};
use crate::podspec::ApplicationResources;
use crate::resources::NodeGroupSchedulingMetadata;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

const ZONE_COUNT_BUCKETS: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0];

/// Pod roles used as metric label values
const ROLES: &[&str] = &["driver", "executor", ""];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ExtenderMetricsInner> = OnceLock::new();

struct ExtenderMetricsInner {
    schedule_duration_seconds: HistogramVec,
    schedule_outcomes: IntCounterVec,
    reconciliation_duration_seconds: Histogram,
    cross_zone_placements: IntCounter,
    placement_zone_count: Histogram,
    cached_reservations: IntGauge,
    cached_demands: IntGauge,
    soft_reservations: IntGauge,
}

impl ExtenderMetricsInner {
    fn new() -> Self {
        let inner = Self {
            schedule_duration_seconds: register_histogram_vec!(
                "spark_scheduler_schedule_duration_seconds",
                "Time spent deciding the node of a pod",
                &["role", "outcome", "instance_group"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register schedule_duration_seconds"),

            schedule_outcomes: register_int_counter_vec!(
                "spark_scheduler_schedule_outcomes_total",
                "Scheduling decisions by role and outcome",
                &["role", "outcome"]
            )
            .expect("Failed to register schedule_outcomes_total"),

            reconciliation_duration_seconds: register_histogram!(
                "spark_scheduler_reconciliation_duration_seconds",
                "Time spent reconciling caches against the stores",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register reconciliation_duration_seconds"),

            cross_zone_placements: register_int_counter!(
                "spark_scheduler_cross_zone_placements_total",
                "Applications placed across more than one zone"
            )
            .expect("Failed to register cross_zone_placements_total"),

            placement_zone_count: register_histogram!(
                "spark_scheduler_placement_zone_count",
                "Number of zones an application was placed in",
                ZONE_COUNT_BUCKETS.to_vec()
            )
            .expect("Failed to register placement_zone_count"),

            cached_reservations: register_int_gauge!(
                "spark_scheduler_cached_reservations",
                "Reservations held in the local cache"
            )
            .expect("Failed to register cached_reservations"),

            cached_demands: register_int_gauge!(
                "spark_scheduler_cached_demands",
                "Demands held in the local cache"
            )
            .expect("Failed to register cached_demands"),

            soft_reservations: register_int_gauge!(
                "spark_scheduler_soft_reservations",
                "Executors placed through soft reservations"
            )
            .expect("Failed to register soft_reservations"),
        };

        // every outcome is visible from the first scrape
        for role in ROLES {
            for outcome in Outcome::ALL {
                inner
                    .schedule_outcomes
                    .with_label_values(&[*role, outcome.as_str()]);
            }
        }
        inner
    }
}

/// Extender metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ExtenderMetrics {
    _private: (),
}

impl Default for ExtenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtenderMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExtenderMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExtenderMetricsInner {
        GLOBAL_METRICS.get_or_init(ExtenderMetricsInner::new)
    }

    /// Start timing a scheduling decision
    pub fn start_schedule_timer(&self, instance_group: &str) -> ScheduleTimer {
        ScheduleTimer {
            metrics: self.clone(),
            instance_group: instance_group.to_string(),
            started: Instant::now(),
        }
    }

    pub fn observe_reconciliation(&self, duration_secs: f64) {
        self.inner()
            .reconciliation_duration_seconds
            .observe(duration_secs);
    }

    /// Record the zones a new application landed in
    pub fn report_cross_zone(
        &self,
        driver_node: &str,
        executor_nodes: &[String],
        metadata: &NodeGroupSchedulingMetadata,
    ) {
        let zones: BTreeSet<&str> = std::iter::once(driver_node)
            .chain(executor_nodes.iter().map(String::as_str))
            .map(|node| {
                metadata
                    .get(node)
                    .and_then(|m| m.zone.as_deref())
                    .unwrap_or("unknown")
            })
            .collect();

        self.inner().placement_zone_count.observe(zones.len() as f64);
        if zones.len() > 1 {
            self.inner().cross_zone_placements.inc();
        }
    }

    /// Update cache size gauges
    pub fn set_cache_sizes(&self, reservations: usize, demands: usize, soft_reservations: usize) {
        self.inner().cached_reservations.set(reservations as i64);
        self.inner().cached_demands.set(demands as i64);
        self.inner().soft_reservations.set(soft_reservations as i64);
    }

    /// Current count of decisions with the given role and outcome
    pub fn outcome_count(&self, role: &str, outcome: Outcome) -> u64 {
        self.inner()
            .schedule_outcomes
            .with_label_values(&[role, outcome.as_str()])
            .get()
    }
}

/// Times one scheduling decision from request to outcome
pub struct ScheduleTimer {
    metrics: ExtenderMetrics,
    instance_group: String,
    started: Instant,
}

impl ScheduleTimer {
    /// Record the decision's outcome and its total latency
    pub fn mark(&self, role: &str, outcome: Outcome) {
        let inner = self.metrics.inner();
        inner
            .schedule_duration_seconds
            .with_label_values(&[role, outcome.as_str(), self.instance_group.as_str()])
            .observe(self.started.elapsed().as_secs_f64());
        inner
            .schedule_outcomes
            .with_label_values(&[role, outcome.as_str()])
            .inc();
    }

    /// Record time spent reconciling before the decision could proceed
    pub fn mark_reconciliation_finished(&self) {
        self.metrics
            .observe_reconciliation(self.started.elapsed().as_secs_f64());
    }
}

/// Structured logger for extender events
#[derive(Clone)]
pub struct EventLogger {
    instance: String,
}

impl EventLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log extender startup
    pub fn log_startup(&self, version: &str, binpack_algo: &str, fifo: bool) {
        info!(
            event = "extender_started",
            instance = %self.instance,
            version = %version,
            binpack_algo = %binpack_algo,
            fifo = fifo,
            "Spark scheduler extender started"
        );
    }

    /// Log extender shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "extender_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Spark scheduler extender shutting down"
        );
    }

    /// Log a newly admitted application
    pub fn log_application_scheduled(
        &self,
        instance_group: &str,
        app_id: &str,
        driver_pod: &str,
        resources: &ApplicationResources,
    ) {
        info!(
            event = "application_scheduled",
            instance = %self.instance,
            instance_group = %instance_group,
            app_id = %app_id,
            driver_pod = %driver_pod,
            driver_cpu_millis = resources.driver_resources.cpu_millis,
            driver_memory_bytes = resources.driver_resources.memory_bytes,
            executor_cpu_millis = resources.executor_resources.cpu_millis,
            executor_memory_bytes = resources.executor_resources.memory_bytes,
            min_executor_count = resources.min_executor_count,
            max_executor_count = resources.max_executor_count,
            "Application scheduled"
        );
    }

    pub fn log_reservation_created(&self, reservation: &Reservation) {
        info!(
            event = "reservation_created",
            instance = %self.instance,
            application = %reservation.key,
            driver_node = %reservation.driver_node(),
            executor_slots = reservation.executors.len(),
            "Reservation created"
        );
    }

    pub fn log_demand_created(&self, demand: &Demand) {
        let total = demand.total();
        info!(
            event = "demand_created",
            instance = %self.instance,
            application = %demand.key,
            pod = %demand.pod_name,
            instance_group = %demand.instance_group,
            executor_count = demand.executor_count,
            cpu_millis = total.cpu_millis,
            memory_bytes = total.memory_bytes,
            "Demand created"
        );
    }

    pub fn log_demand_removed(&self, key: &ApplicationKey) {
        info!(
            event = "demand_removed",
            instance = %self.instance,
            application = %key,
            "Demand removed"
        );
    }

    /// Log the state of the reservation storage migration
    pub fn log_migration(&self, status: &str, migrated: usize, success: bool) {
        if success {
            info!(
                event = "reservation_migration",
                instance = %self.instance,
                status = %status,
                migrated = migrated,
                "Reservation storage migration progressed"
            );
        } else {
            warn!(
                event = "reservation_migration_failed",
                instance = %self.instance,
                status = %status,
                migrated = migrated,
                "Reservation storage migration failed, will retry on next start"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::NodeSchedulingMetadata;
    use crate::resources::Resources;

    fn zone_metadata(zones: &[(&str, &str)]) -> NodeGroupSchedulingMetadata {
        let mut metadata = NodeGroupSchedulingMetadata::default();
        for (node, zone) in zones {
            metadata.insert(
                *node,
                NodeSchedulingMetadata {
                    available: Resources::zero(),
                    schedulable: Resources::zero(),
                    creation_timestamp: None,
                    zone: Some(zone.to_string()),
                    labels: Default::default(),
                    ready: true,
                    unschedulable: false,
                },
            );
        }
        metadata
    }

    #[test]
    fn test_extender_metrics_creation() {
        let metrics = ExtenderMetrics::new();

        let timer = metrics.start_schedule_timer("batch");
        timer.mark_reconciliation_finished();
        timer.mark("driver", Outcome::Success);
        metrics.set_cache_sizes(3, 1, 2);

        assert!(metrics.outcome_count("driver", Outcome::Success) >= 1);
    }

    #[test]
    fn test_cross_zone_report() {
        let metrics = ExtenderMetrics::new();
        let metadata = zone_metadata(&[("n1", "a"), ("n2", "a"), ("n3", "b")]);

        let before = GLOBAL_METRICS.get().unwrap().cross_zone_placements.get();
        metrics.report_cross_zone("n1", &["n2".to_string()], &metadata);
        metrics.report_cross_zone("n1", &["n3".to_string()], &metadata);
        let after = GLOBAL_METRICS.get().unwrap().cross_zone_placements.get();

        assert!(after >= before + 1);
    }

    #[test]
    fn test_event_logger_creation() {
        let logger = EventLogger::new("extender-0");
        assert_eq!(logger.instance, "extender-0");
    }
}
