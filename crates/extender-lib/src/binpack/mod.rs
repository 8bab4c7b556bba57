//! Placement search for a driver and its executors
//!
//! A `Binpacker` looks for a driver node and `executor_count` executor
//! nodes such that every placement fits in the residual capacity of the
//! nodes. Candidates are tried in the order given. Strategies differ only
//! in how executors are spread over the executor candidates.

mod distribute_evenly;
mod single_az;
mod tightly_pack;

pub use distribute_evenly::DistributeEvenly;
pub use single_az::SingleAzTightlyPack;
pub use tightly_pack::TightlyPack;

use crate::resources::{NodeGroupSchedulingMetadata, Resources};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Shape of the application being placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackingRequest {
    pub driver: Resources,
    pub executor: Resources,
    pub executor_count: usize,
}

/// Nodes chosen for the driver and each executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingResult {
    pub driver_node: String,
    /// One entry per executor; a node repeats when it hosts several
    pub executor_nodes: Vec<String>,
}

/// Placement strategy
pub trait Binpacker: Send + Sync {
    fn name(&self) -> &'static str;

    fn binpack(
        &self,
        request: &PackingRequest,
        driver_nodes: &[String],
        executor_nodes: &[String],
        metadata: &NodeGroupSchedulingMetadata,
    ) -> Option<PackingResult>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinpackError {
    #[error("unknown binpack algorithm {0:?}")]
    UnknownAlgorithm(String),
}

pub const TIGHTLY_PACK: &str = "tightly-pack";
pub const DISTRIBUTE_EVENLY: &str = "distribute-evenly";
pub const SINGLE_AZ_TIGHTLY_PACK: &str = "single-az-tightly-pack";

/// Names accepted by `binpacker_by_name`
pub const ALGORITHMS: &[&str] = &[TIGHTLY_PACK, DISTRIBUTE_EVENLY, SINGLE_AZ_TIGHTLY_PACK];

/// Select a strategy by its configured name
pub fn binpacker_by_name(name: &str) -> Result<Arc<dyn Binpacker>, BinpackError> {
    match name {
        TIGHTLY_PACK => Ok(Arc::new(TightlyPack)),
        DISTRIBUTE_EVENLY => Ok(Arc::new(DistributeEvenly)),
        SINGLE_AZ_TIGHTLY_PACK => Ok(Arc::new(SingleAzTightlyPack)),
        other => Err(BinpackError::UnknownAlgorithm(other.to_string())),
    }
}

/// Residual capacity of the candidate nodes during one search
type Available = HashMap<String, Resources>;

fn available_for(metadata: &NodeGroupSchedulingMetadata, nodes: &[&[String]]) -> Available {
    nodes
        .iter()
        .flat_map(|group| group.iter())
        .filter_map(|name| metadata.get(name).map(|m| (name.clone(), m.available)))
        .collect()
}

/// Spreads `count` executors over `nodes`, consuming from `available`
type ExecutorDistribution = fn(Resources, usize, &[String], &mut Available) -> Option<Vec<String>>;

/// Try each driver node in order and place executors with `distribute`
fn pack_with(
    request: &PackingRequest,
    driver_nodes: &[String],
    executor_nodes: &[String],
    metadata: &NodeGroupSchedulingMetadata,
    distribute: ExecutorDistribution,
) -> Option<PackingResult> {
    let initial = available_for(metadata, &[driver_nodes, executor_nodes]);
    if executor_capacity(request.executor, executor_nodes, &initial) < request.executor_count {
        return None;
    }

    for driver_node in driver_nodes {
        let Some(driver_available) = initial.get(driver_node) else {
            continue;
        };
        if !request.driver.fits_in(driver_available) {
            continue;
        }

        let mut available = initial.clone();
        if let Some(remaining) = available.get_mut(driver_node) {
            *remaining -= request.driver;
        }

        if let Some(executors) =
            distribute(request.executor, request.executor_count, executor_nodes, &mut available)
        {
            return Some(PackingResult {
                driver_node: driver_node.clone(),
                executor_nodes: executors,
            });
        }
    }
    None
}

/// Upper bound on the executors `nodes` could host before any driver is placed
///
/// Saturates at `usize::MAX` when the executor shape is zero.
fn executor_capacity(executor: Resources, nodes: &[String], available: &Available) -> usize {
    let per_dimension = |free: i64, need: i64| -> usize {
        if need <= 0 {
            usize::MAX
        } else {
            usize::try_from(free.max(0) / need).unwrap_or(usize::MAX)
        }
    };

    let mut seen = HashSet::new();
    nodes
        .iter()
        .filter(|node| seen.insert(node.as_str()))
        .filter_map(|node| available.get(node))
        .map(|free| {
            per_dimension(free.cpu_millis, executor.cpu_millis)
                .min(per_dimension(free.memory_bytes, executor.memory_bytes))
        })
        .fold(0usize, usize::saturating_add)
}

/// Place one executor on `node` if it fits
fn take(executor: Resources, node: &str, available: &mut Available) -> bool {
    match available.get_mut(node) {
        Some(remaining) if executor.fits_in(remaining) => {
            *remaining -= executor;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests;
