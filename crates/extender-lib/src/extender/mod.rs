//! The scheduling decision for one pod
//!
//! `SchedulerExtender::predicate` answers the orchestrator's filter call:
//! drivers are admitted as a gang together with their minimum executor
//! count, executors claim the slots reserved for them or grow the
//! application elastically up to its maximum.

mod driver;
mod executor;
mod outcome;
mod wire;

pub use outcome::Outcome;
pub use wire::{ExtenderArgs, ExtenderFilterResult, NodeList};

use crate::binpack::{Binpacker, DistributeEvenly};
use crate::cache::DemandTracker;
use crate::cluster::{NodeLister, PodLister, SparkPodLister};
use crate::error::{ExtenderError, ExtenderResult};
use crate::health::{components, HealthRegistry};
use crate::observability::{EventLogger, ExtenderMetrics, ScheduleTimer};
use crate::overhead::OverheadComputer;
use crate::podspec::{self, SparkRole};
use crate::priority::NodePriority;
use crate::reservations::ReservationManager;
use crate::resources::NodeGroupSchedulingMetadata;
use crate::retry::RetryPolicy;
use crate::store::{DemandStore, ReservationStore};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_INSTANCE_GROUP_LABEL: &str = "instance-group";

/// Node chosen for a pod and how it was chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub node: String,
    pub outcome: Outcome,
}

impl Placement {
    fn new(node: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            node: node.into(),
            outcome,
        }
    }
}

pub struct SchedulerExtender {
    nodes: Arc<dyn NodeLister>,
    spark_pods: SparkPodLister,
    overhead: OverheadComputer,
    reservations: ReservationManager,
    demands: DemandTracker,
    binpacker: Arc<dyn Binpacker>,
    priority: NodePriority,
    fifo: bool,
    resync_interval: Duration,
    last_reconciled: Mutex<Option<Instant>>,
    health: HealthRegistry,
    metrics: ExtenderMetrics,
    events: EventLogger,
}

impl SchedulerExtender {
    pub fn builder(
        nodes: Arc<dyn NodeLister>,
        pods: Arc<dyn PodLister>,
        reservation_store: Arc<dyn ReservationStore>,
        demand_store: Arc<dyn DemandStore>,
    ) -> SchedulerExtenderBuilder {
        SchedulerExtenderBuilder {
            nodes,
            pods,
            reservation_store,
            demand_store,
            binpacker: Arc::new(DistributeEvenly),
            priority: NodePriority::default(),
            fifo: false,
            instance_group_label: DEFAULT_INSTANCE_GROUP_LABEL.to_string(),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            retry: RetryPolicy::default(),
            health: HealthRegistry::new(),
            metrics: ExtenderMetrics::new(),
            events: EventLogger::new("spark-scheduler-extender"),
        }
    }

    pub fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }

    pub fn demands(&self) -> &DemandTracker {
        &self.demands
    }

    /// Answer a filter call
    pub async fn predicate(&self, args: ExtenderArgs) -> ExtenderFilterResult {
        let candidates = args.candidate_names();
        let result = match self.schedule(&args.pod, &candidates).await {
            Ok(placement) => ExtenderFilterResult::success(placement.node),
            Err(e) => ExtenderFilterResult::fail_with_message(&candidates, &e.to_string()),
        };
        match args.nodes {
            Some(sent) if args.nodenames.is_none() => result.with_node_objects(sent),
            _ => result,
        }
    }

    /// Choose a node for `pod` among `candidates`, recording the outcome
    pub async fn schedule(&self, pod: &Pod, candidates: &[String]) -> ExtenderResult<Placement> {
        let role = SparkRole::of(pod);
        let role_label = role.map(|r| r.as_str()).unwrap_or("");
        let instance_group = self.spark_pods.instance_group(pod);
        let timer = self.metrics.start_schedule_timer(&instance_group);

        let result = self.select_node(pod, role, candidates, &timer).await;
        match &result {
            Ok(placement) => {
                info!(
                    pod = %podspec::pod_name(pod),
                    namespace = %podspec::pod_namespace(pod),
                    role = role_label,
                    node = %placement.node,
                    outcome = %placement.outcome,
                    "Pod scheduled"
                );
                if role == Some(SparkRole::Driver) && placement.outcome == Outcome::Success {
                    self.log_application_scheduled(pod, &instance_group);
                }
                timer.mark(role_label, placement.outcome);
            }
            Err(e) => {
                if e.is_internal() {
                    error!(
                        pod = %podspec::pod_name(pod),
                        namespace = %podspec::pod_namespace(pod),
                        role = role_label,
                        outcome = %e.outcome(),
                        error = %e,
                        "Failed to schedule pod"
                    );
                } else {
                    info!(
                        pod = %podspec::pod_name(pod),
                        namespace = %podspec::pod_namespace(pod),
                        role = role_label,
                        outcome = %e.outcome(),
                        reason = %e,
                        "Pod not scheduled"
                    );
                }
                timer.mark(role_label, e.outcome());
            }
        }
        result
    }

    async fn select_node(
        &self,
        pod: &Pod,
        role: Option<SparkRole>,
        candidates: &[String],
        timer: &ScheduleTimer,
    ) -> ExtenderResult<Placement> {
        let Some(role) = role else {
            return Err(ExtenderError::NonSparkPod);
        };
        self.reconcile_if_needed(timer).await?;

        match role {
            SparkRole::Driver => self.select_driver_node(pod, candidates).await,
            SparkRole::Executor => self.select_executor_node(pod, candidates).await,
        }
    }

    /// Resync caches with the stores once they are older than the interval
    ///
    /// Only one resync runs at a time; decisions arriving meanwhile use the
    /// current caches.
    async fn reconcile_if_needed(&self, timer: &ScheduleTimer) -> ExtenderResult<()> {
        let Ok(mut last_reconciled) = self.last_reconciled.try_lock() else {
            debug!("Reconciliation in flight, using current caches");
            return Ok(());
        };
        if last_reconciled.is_some_and(|at| at.elapsed() < self.resync_interval) {
            return Ok(());
        }

        if let Err(e) = self.reservations.resync().await {
            self.health
                .set_degraded(components::RESERVATION_STORE, e.to_string())
                .await;
            return Err(ExtenderError::Reconcile(e));
        }
        self.health.set_healthy(components::RESERVATION_STORE).await;

        if let Err(e) = self.demands.resync().await {
            self.health
                .set_degraded(components::DEMAND_STORE, e.to_string())
                .await;
            return Err(ExtenderError::Reconcile(e));
        }
        self.health.set_healthy(components::DEMAND_STORE).await;

        *last_reconciled = Some(Instant::now());
        self.metrics.set_cache_sizes(
            self.reservations.reservation_count(),
            self.demands.len(),
            self.reservations.soft_reservation_count(),
        );
        timer.mark_reconciliation_finished();
        Ok(())
    }

    /// Scheduling view of `nodes`: capacity minus reservations, soft
    /// reservations and non-Spark pods
    fn scheduling_metadata(&self, nodes: &[Arc<Node>]) -> NodeGroupSchedulingMetadata {
        let mut usage = self.reservations.used_resources();
        usage.add(&self.overhead.overhead(nodes));
        NodeGroupSchedulingMetadata::for_nodes(nodes, &usage)
    }

    fn log_application_scheduled(&self, driver: &Pod, instance_group: &str) {
        let (Ok(app_id), Ok(resources)) = (
            podspec::app_id(driver),
            podspec::application_resources(driver),
        ) else {
            return;
        };
        self.events.log_application_scheduled(
            instance_group,
            app_id,
            podspec::pod_name(driver),
            &resources,
        );
    }
}

pub struct SchedulerExtenderBuilder {
    nodes: Arc<dyn NodeLister>,
    pods: Arc<dyn PodLister>,
    reservation_store: Arc<dyn ReservationStore>,
    demand_store: Arc<dyn DemandStore>,
    binpacker: Arc<dyn Binpacker>,
    priority: NodePriority,
    fifo: bool,
    instance_group_label: String,
    resync_interval: Duration,
    retry: RetryPolicy,
    health: HealthRegistry,
    metrics: ExtenderMetrics,
    events: EventLogger,
}

impl SchedulerExtenderBuilder {
    pub fn binpacker(mut self, binpacker: Arc<dyn Binpacker>) -> Self {
        self.binpacker = binpacker;
        self
    }

    pub fn node_priority(mut self, priority: NodePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Require earlier drivers of the same instance group to fit first
    pub fn fifo(mut self, fifo: bool) -> Self {
        self.fifo = fifo;
        self
    }

    pub fn instance_group_label(mut self, label: impl Into<String>) -> Self {
        self.instance_group_label = label.into();
        self
    }

    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn metrics(mut self, metrics: ExtenderMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn events(mut self, events: EventLogger) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> SchedulerExtender {
        let spark_pods = SparkPodLister::new(self.pods.clone(), self.instance_group_label);
        SchedulerExtender {
            nodes: self.nodes,
            overhead: OverheadComputer::new(self.pods),
            reservations: ReservationManager::new(
                self.reservation_store,
                spark_pods.clone(),
                self.retry,
                self.events.clone(),
            ),
            demands: DemandTracker::new(self.demand_store, self.events.clone()),
            spark_pods,
            binpacker: self.binpacker,
            priority: self.priority,
            fifo: self.fifo,
            resync_interval: self.resync_interval,
            last_reconciled: Mutex::new(None),
            health: self.health,
            metrics: self.metrics,
            events: self.events,
        }
    }
}
