use super::{pack_with, take, Available, Binpacker, PackingRequest, PackingResult, TIGHTLY_PACK};
use crate::resources::{NodeGroupSchedulingMetadata, Resources};

/// Fills each executor node before moving to the next
#[derive(Debug, Clone, Copy, Default)]
pub struct TightlyPack;

impl Binpacker for TightlyPack {
    fn name(&self) -> &'static str {
        TIGHTLY_PACK
    }

    fn binpack(
        &self,
        request: &PackingRequest,
        driver_nodes: &[String],
        executor_nodes: &[String],
        metadata: &NodeGroupSchedulingMetadata,
    ) -> Option<PackingResult> {
        pack_with(request, driver_nodes, executor_nodes, metadata, tightly_pack_executors)
    }
}

pub(super) fn tightly_pack_executors(
    executor: Resources,
    count: usize,
    nodes: &[String],
    available: &mut Available,
) -> Option<Vec<String>> {
    let mut placed = Vec::new();
    for node in nodes {
        while placed.len() < count && take(executor, node, available) {
            placed.push(node.clone());
        }
        if placed.len() == count {
            break;
        }
    }
    (placed.len() == count).then_some(placed)
}
