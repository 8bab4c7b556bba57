use super::{Outcome, Placement, SchedulerExtender};
use crate::binpack::PackingRequest;
use crate::error::{ExtenderError, ExtenderResult};
use crate::podspec::{self, application_resources, pod_matches_node_selector_and_affinity};
use crate::resources::{spark_resource_usage, NodeGroupSchedulingMetadata};
use k8s_openapi::api::core::v1::Pod;
use tracing::{info, warn};

impl SchedulerExtender {
    pub(super) async fn select_driver_node(
        &self,
        driver: &Pod,
        candidates: &[String],
    ) -> ExtenderResult<Placement> {
        let key = podspec::application_key(driver)?;

        if let Some(reservation) = self.reservations.get_reservation(&key) {
            let node = reservation.driver_node();
            if !candidates.iter().any(|c| c == node) {
                warn!(
                    application = %key,
                    node,
                    "Reserved driver node is not among the candidates, returning it anyway"
                );
            }
            return Ok(Placement::new(node, Outcome::Success));
        }

        let resources = application_resources(driver)?;
        let instance_group = self.spark_pods.instance_group(driver);
        let nodes = self
            .nodes
            .list_with_predicate(&|node| pod_matches_node_selector_and_affinity(driver, node));
        let mut metadata = self.scheduling_metadata(&nodes);
        let (driver_nodes, executor_nodes) = self.priority.potential_nodes(&metadata, candidates);

        if self.fifo
            && !self.earlier_drivers_fit(driver, &driver_nodes, &executor_nodes, &mut metadata)
        {
            self.demands
                .create_for_application(&key, podspec::pod_name(driver), &instance_group, &resources)
                .await;
            return Err(ExtenderError::EarlierDriversDoNotFit);
        }

        let request = PackingRequest {
            driver: resources.driver_resources,
            executor: resources.executor_resources,
            executor_count: resources.min_executor_count,
        };
        let Some(packing) =
            self.binpacker
                .binpack(&request, &driver_nodes, &executor_nodes, &metadata)
        else {
            self.demands
                .create_for_application(&key, podspec::pod_name(driver), &instance_group, &resources)
                .await;
            return Err(ExtenderError::ApplicationDoesNotFit);
        };

        self.demands.remove_if_exists(&key).await;
        self.metrics
            .report_cross_zone(&packing.driver_node, &packing.executor_nodes, &metadata);

        let reservation = self
            .reservations
            .create_reservations(driver, &resources, &packing.driver_node, &packing.executor_nodes)
            .await?;
        Ok(Placement::new(reservation.driver_node(), Outcome::Success))
    }

    /// Simulate placing every earlier queued driver, consuming capacity
    ///
    /// Returns false at the first earlier driver that does not fit.
    fn earlier_drivers_fit(
        &self,
        driver: &Pod,
        driver_nodes: &[String],
        executor_nodes: &[String],
        metadata: &mut NodeGroupSchedulingMetadata,
    ) -> bool {
        let earlier = self
            .spark_pods
            .list_earlier_drivers(driver, &|key| self.reservations.contains(key));

        for earlier_driver in earlier {
            let resources = match application_resources(&earlier_driver) {
                Ok(resources) => resources,
                Err(e) => {
                    warn!(
                        pod = %podspec::pod_name(&earlier_driver),
                        error = %e,
                        "Skipping earlier driver with unreadable resources"
                    );
                    continue;
                }
            };

            let request = PackingRequest {
                driver: resources.driver_resources,
                executor: resources.executor_resources,
                executor_count: resources.min_executor_count,
            };
            match self
                .binpacker
                .binpack(&request, driver_nodes, executor_nodes, metadata)
            {
                Some(packing) => {
                    metadata.subtract_usage_if_exists(&spark_resource_usage(
                        request.driver,
                        request.executor,
                        &packing.driver_node,
                        &packing.executor_nodes,
                    ));
                }
                None => {
                    info!(
                        pod = %podspec::pod_name(driver),
                        earlier_driver = %podspec::pod_name(&earlier_driver),
                        "Earlier driver does not fit, waiting in queue"
                    );
                    return false;
                }
            }
        }
        true
    }
}
