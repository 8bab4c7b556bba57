use super::tightly_pack::tightly_pack_executors;
use super::{pack_with, Binpacker, PackingRequest, PackingResult, SINGLE_AZ_TIGHTLY_PACK};
use crate::resources::NodeGroupSchedulingMetadata;

/// Tightly packs the whole application into a single zone
///
/// Zones are tried in the order their first node appears among the driver
/// candidates. Nodes without a zone label form their own group.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleAzTightlyPack;

impl Binpacker for SingleAzTightlyPack {
    fn name(&self) -> &'static str {
        SINGLE_AZ_TIGHTLY_PACK
    }

    fn binpack(
        &self,
        request: &PackingRequest,
        driver_nodes: &[String],
        executor_nodes: &[String],
        metadata: &NodeGroupSchedulingMetadata,
    ) -> Option<PackingResult> {
        let zone_of = |node: &String| metadata.get(node).and_then(|m| m.zone.clone());

        let mut zones: Vec<Option<String>> = Vec::new();
        for node in driver_nodes {
            let zone = zone_of(node);
            if !zones.contains(&zone) {
                zones.push(zone);
            }
        }

        zones.into_iter().find_map(|zone| {
            let in_zone = |nodes: &[String]| -> Vec<String> {
                nodes
                    .iter()
                    .filter(|n| zone_of(*n) == zone)
                    .cloned()
                    .collect()
            };
            pack_with(
                request,
                &in_zone(driver_nodes),
                &in_zone(executor_nodes),
                metadata,
                tightly_pack_executors,
            )
        })
    }
}
