use super::{Outcome, Placement, SchedulerExtender};
use crate::error::{ExtenderError, ExtenderResult};
use crate::podspec::{self, application_resources};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::sync::Arc;
use tracing::debug;

impl SchedulerExtender {
    pub(super) async fn select_executor_node(
        &self,
        executor: &Pod,
        candidates: &[String],
    ) -> ExtenderResult<Placement> {
        let key = podspec::application_key(executor)?;
        let name = podspec::pod_name(executor);

        if let Some(node) = self.reservations.find_already_bound_node(&key, name) {
            if candidates.contains(&node) {
                return Ok(Placement::new(node, Outcome::SuccessAlreadyBound));
            }
            return Err(ExtenderError::BoundNodeNotCandidate { node });
        }

        if !self.reservations.contains(&key) {
            return Err(ExtenderError::ReservationNotFound(key.to_string()));
        }

        if let Some(node) = self
            .reservations
            .reserve_for_executor(&key, name, candidates)
            .await?
        {
            self.demands.remove_if_exists(&key).await;
            return Ok(Placement::new(node, Outcome::Success));
        }

        let driver = self.spark_pods.driver_for(executor)?;
        let resources = application_resources(&driver)?;
        let free_spots = self
            .reservations
            .free_executor_spots(&key, resources.max_executor_count);
        if free_spots == 0 {
            return Err(ExtenderError::ExecutorLimitReached);
        }

        let candidate_nodes: Vec<Arc<Node>> = candidates
            .iter()
            .filter_map(|name| self.nodes.get(name).ok())
            .collect();
        let metadata = self.scheduling_metadata(&candidate_nodes);
        let Some(node) = candidates.iter().find(|node| {
            metadata
                .get(node)
                .is_some_and(|m| resources.executor_resources.fits_in(&m.available))
        }) else {
            self.demands
                .create_for_executor(
                    &key,
                    name,
                    &self.spark_pods.instance_group(executor),
                    resources.executor_resources,
                )
                .await;
            return Err(ExtenderError::NoExecutorCapacity);
        };

        let placed = self
            .reservations
            .reserve_for_executor_on_rescheduled_node(
                &key,
                name,
                node,
                resources.executor_resources,
                resources.max_executor_count,
            )
            .await?;
        match placed {
            Some(placement) => {
                debug!(
                    application = %key,
                    executor = name,
                    node = %node,
                    ?placement,
                    "Executor placed beyond its reserved slots"
                );
                self.demands.remove_if_exists(&key).await;
                Ok(Placement::new(node.clone(), Outcome::SuccessRescheduled))
            }
            None => Err(ExtenderError::ExecutorLimitReached),
        }
    }
}

