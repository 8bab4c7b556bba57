use super::*;
use crate::resources::NodeGroupResources;
use crate::testing::{in_zone, node, GIB};
use k8s_openapi::api::core::v1::Node;

fn metadata(nodes: Vec<Node>) -> NodeGroupSchedulingMetadata {
    let nodes: Vec<Arc<Node>> = nodes.into_iter().map(Arc::new).collect();
    NodeGroupSchedulingMetadata::for_nodes(&nodes, &NodeGroupResources::new())
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn request(executor_count: usize) -> PackingRequest {
    PackingRequest {
        driver: Resources::new(1000, GIB),
        executor: Resources::new(1000, GIB),
        executor_count,
    }
}

#[test]
fn test_binpacker_by_name() {
    for name in ALGORITHMS {
        assert_eq!(binpacker_by_name(name).unwrap().name(), *name);
    }
    assert_eq!(
        binpacker_by_name("best-fit").err(),
        Some(BinpackError::UnknownAlgorithm("best-fit".to_string()))
    );
}

#[test]
fn test_tightly_pack_fills_first_node() {
    let md = metadata(vec![node("n1", "4", "16Gi"), node("n2", "4", "16Gi")]);
    let nodes = names(&["n1", "n2"]);

    let result = TightlyPack.binpack(&request(4), &nodes, &nodes, &md).unwrap();
    assert_eq!(result.driver_node, "n1");
    // driver takes one core of n1, leaving room for three executors
    assert_eq!(result.executor_nodes, names(&["n1", "n1", "n1", "n2"]));
}

#[test]
fn test_distribute_evenly_round_robins() {
    let md = metadata(vec![
        node("n1", "4", "16Gi"),
        node("n2", "4", "16Gi"),
        node("n3", "4", "16Gi"),
    ]);
    let nodes = names(&["n1", "n2", "n3"]);

    let result = DistributeEvenly.binpack(&request(4), &nodes, &nodes, &md).unwrap();
    assert_eq!(result.driver_node, "n1");
    assert_eq!(result.executor_nodes, names(&["n1", "n2", "n3", "n1"]));
}

#[test]
fn test_driver_moves_to_next_node_when_executors_do_not_fit() {
    // n1 only fits the driver, and executors may only use n2
    let md = metadata(vec![node("n1", "1", "1Gi"), node("n2", "2", "2Gi")]);
    let driver_nodes = names(&["n1", "n2"]);
    let executor_nodes = names(&["n2"]);

    let result = TightlyPack
        .binpack(&request(2), &driver_nodes, &executor_nodes, &md)
        .unwrap();
    assert_eq!(result.driver_node, "n1");

    // with three executors n2 cannot hold them, with or without the driver
    assert_eq!(
        TightlyPack.binpack(&request(3), &driver_nodes, &executor_nodes, &md),
        None
    );
}

#[test]
fn test_driver_capacity_is_not_reused_by_executors() {
    let md = metadata(vec![node("n1", "2", "2Gi")]);
    let nodes = names(&["n1"]);

    assert!(DistributeEvenly.binpack(&request(1), &nodes, &nodes, &md).is_some());
    assert!(DistributeEvenly.binpack(&request(2), &nodes, &nodes, &md).is_none());
}

#[test]
fn test_zero_executors_only_needs_driver_room() {
    let md = metadata(vec![node("n1", "1", "1Gi")]);
    let nodes = names(&["n1"]);

    let result = TightlyPack.binpack(&request(0), &nodes, &[], &md).unwrap();
    assert!(result.executor_nodes.is_empty());
}

#[test]
fn test_unknown_candidates_are_ignored() {
    let md = metadata(vec![node("n1", "4", "4Gi")]);
    let nodes = names(&["ghost", "n1"]);

    let result = TightlyPack.binpack(&request(1), &nodes, &nodes, &md).unwrap();
    assert_eq!(result.driver_node, "n1");
    assert_eq!(result.executor_nodes, names(&["n1"]));
}

#[test]
fn test_single_az_keeps_application_in_one_zone() {
    let md = metadata(vec![
        in_zone(node("a1", "2", "2Gi"), "zone-a"),
        in_zone(node("b1", "2", "2Gi"), "zone-b"),
        in_zone(node("b2", "2", "2Gi"), "zone-b"),
    ]);
    let nodes = names(&["a1", "b1", "b2"]);

    // plain tight packing would straddle zone-a and zone-b
    let spread = TightlyPack.binpack(&request(2), &nodes, &nodes, &md).unwrap();
    assert_eq!(spread.driver_node, "a1");
    assert_eq!(spread.executor_nodes, names(&["a1", "b1"]));

    let result = SingleAzTightlyPack
        .binpack(&request(2), &nodes, &nodes, &md)
        .unwrap();
    assert_eq!(result.driver_node, "b1");
    assert_eq!(result.executor_nodes, names(&["b1", "b2"]));
}

#[test]
fn test_single_az_fails_when_no_zone_fits() {
    let md = metadata(vec![
        in_zone(node("a1", "2", "2Gi"), "zone-a"),
        in_zone(node("b1", "2", "2Gi"), "zone-b"),
    ]);
    let nodes = names(&["a1", "b1"]);

    assert!(TightlyPack.binpack(&request(2), &nodes, &nodes, &md).is_some());
    assert!(SingleAzTightlyPack
        .binpack(&request(2), &nodes, &nodes, &md)
        .is_none());
}

#[test]
fn test_count_beyond_candidate_capacity_fails_fast() {
    let md = metadata(vec![node("n1", "4", "16Gi"), node("n2", "4", "16Gi")]);
    let nodes = names(&["n1", "n2"]);

    for name in ALGORITHMS {
        let binpacker = binpacker_by_name(name).unwrap();
        assert!(binpacker.binpack(&request(1 << 45), &nodes, &nodes, &md).is_none());
        assert!(binpacker.binpack(&request(usize::MAX), &nodes, &nodes, &md).is_none());
    }
}

#[test]
fn test_executor_capacity_bound() {
    let md = metadata(vec![node("n1", "4", "2Gi"), node("n2", "1", "8Gi")]);
    let nodes = names(&["n1", "n2", "n1"]);
    let available = available_for(&md, &[&nodes]);

    // n1 is bound by memory, n2 by cpu; repeated names count once
    assert_eq!(executor_capacity(Resources::new(1000, GIB), &nodes, &available), 3);
    assert_eq!(
        executor_capacity(Resources::zero(), &nodes, &available),
        usize::MAX
    );
}
