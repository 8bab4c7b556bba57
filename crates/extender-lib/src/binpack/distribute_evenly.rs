use super::{
    pack_with, take, Available, Binpacker, PackingRequest, PackingResult, DISTRIBUTE_EVENLY,
};
use crate::resources::{NodeGroupSchedulingMetadata, Resources};

/// Places one executor per node per pass, round-robin
#[derive(Debug, Clone, Copy, Default)]
pub struct DistributeEvenly;

impl Binpacker for DistributeEvenly {
    fn name(&self) -> &'static str {
        DISTRIBUTE_EVENLY
    }

    fn binpack(
        &self,
        request: &PackingRequest,
        driver_nodes: &[String],
        executor_nodes: &[String],
        metadata: &NodeGroupSchedulingMetadata,
    ) -> Option<PackingResult> {
        pack_with(request, driver_nodes, executor_nodes, metadata, distribute_executors)
    }
}

fn distribute_executors(
    executor: Resources,
    count: usize,
    nodes: &[String],
    available: &mut Available,
) -> Option<Vec<String>> {
    let mut placed = Vec::new();
    while placed.len() < count {
        let before = placed.len();
        for node in nodes {
            if placed.len() == count {
                break;
            }
            if take(executor, node, available) {
                placed.push(node.clone());
            }
        }
        // a pass without progress means nothing else fits
        if placed.len() == before {
            return None;
        }
    }
    Some(placed)
}
