//! Node selector and required node affinity matching

use k8s_openapi::api::core::v1::{Node, NodeSelectorRequirement, NodeSelectorTerm, Pod};
use std::collections::BTreeMap;

/// True if `node` satisfies the pod's node selector and required node affinity
pub fn pod_matches_node_selector_and_affinity(pod: &Pod, node: &Node) -> bool {
    let empty = BTreeMap::new();
    let node_labels = node.metadata.labels.as_ref().unwrap_or(&empty);

    let Some(spec) = pod.spec.as_ref() else {
        return true;
    };

    if let Some(selector) = spec.node_selector.as_ref() {
        let matches = selector
            .iter()
            .all(|(key, value)| node_labels.get(key) == Some(value));
        if !matches {
            return false;
        }
    }

    let required = spec
        .affinity
        .as_ref()
        .and_then(|a| a.node_affinity.as_ref())
        .and_then(|na| na.required_during_scheduling_ignored_during_execution.as_ref());

    match required {
        // terms are ORed; an empty term list matches nothing
        Some(selector) => selector
            .node_selector_terms
            .iter()
            .any(|term| term_matches(term, node, node_labels)),
        None => true,
    }
}

fn term_matches(term: &NodeSelectorTerm, node: &Node, labels: &BTreeMap<String, String>) -> bool {
    let expressions = term.match_expressions.as_deref().unwrap_or_default();
    let fields = term.match_fields.as_deref().unwrap_or_default();
    if expressions.is_empty() && fields.is_empty() {
        return false;
    }

    let mut node_fields = BTreeMap::new();
    if let Some(name) = node.metadata.name.as_ref() {
        node_fields.insert("metadata.name".to_string(), name.clone());
    }

    expressions.iter().all(|r| requirement_matches(r, labels))
        && fields.iter().all(|r| requirement_matches(r, &node_fields))
}

fn requirement_matches(requirement: &NodeSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let values = requirement.values.as_deref().unwrap_or_default();
    let actual = labels.get(&requirement.key);

    match requirement.operator.as_str() {
        "In" => actual.map(|v| values.contains(v)).unwrap_or(false),
        "NotIn" => actual.map(|v| !values.contains(v)).unwrap_or(true),
        "Exists" => actual.is_some(),
        "DoesNotExist" => actual.is_none(),
        "Gt" | "Lt" => {
            let (Some(actual), Some(bound)) = (
                actual.and_then(|v| v.parse::<i64>().ok()),
                values.first().and_then(|v| v.parse::<i64>().ok()),
            ) else {
                return false;
            };
            if requirement.operator == "Gt" {
                actual > bound
            } else {
                actual < bound
            }
        }
        _ => false,
    }
}

/// Instance group of a pod, read from its node selector or a single-valued
/// `In` requirement of its required node affinity
pub fn find_instance_group(pod: &Pod, instance_group_label: &str) -> Option<String> {
    let spec = pod.spec.as_ref()?;

    if let Some(group) = spec
        .node_selector
        .as_ref()
        .and_then(|s| s.get(instance_group_label))
    {
        return Some(group.clone());
    }

    let terms = &spec
        .affinity
        .as_ref()?
        .node_affinity
        .as_ref()?
        .required_during_scheduling_ignored_during_execution
        .as_ref()?
        .node_selector_terms;

    terms
        .iter()
        .flat_map(|term| term.match_expressions.iter().flatten())
        .find(|r| r.key == instance_group_label && r.operator == "In")
        .and_then(|r| match r.values.as_deref() {
            Some([single]) => Some(single.clone()),
            _ => None,
        })
}
