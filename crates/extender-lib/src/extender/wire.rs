//! JSON contract of the kube-scheduler filter extender

use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
}

/// Filter request: the pod and the nodes it may go to
///
/// The orchestrator sends either full node objects or only their names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtenderArgs {
    pub pod: Pod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodenames: Option<Vec<String>>,
}

impl ExtenderArgs {
    /// Candidate node names, whichever form they were sent in
    pub fn candidate_names(&self) -> Vec<String> {
        if let Some(names) = &self.nodenames {
            return names.clone();
        }
        self.nodes
            .as_ref()
            .map(|list| {
                list.items
                    .iter()
                    .filter_map(|node| node.metadata.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Filter response: the chosen node, or a failure reason per candidate
///
/// The chosen node is answered in the same form the candidates were sent
/// in: `nodes` when full node objects came in, `nodenames` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtenderFilterResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodenames: Option<Vec<String>>,
    #[serde(
        rename = "failedNodes",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub failed_nodes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtenderFilterResult {
    pub fn success(node: impl Into<String>) -> Self {
        Self {
            nodenames: Some(vec![node.into()]),
            ..Default::default()
        }
    }

    /// Fail every candidate with the same message
    pub fn fail_with_message(candidates: &[String], message: &str) -> Self {
        Self {
            nodenames: Some(Vec::new()),
            failed_nodes: candidates
                .iter()
                .map(|node| (node.clone(), message.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    /// Answer with the sent node objects that passed the filter
    pub fn with_node_objects(mut self, sent: NodeList) -> Self {
        let passed = self.nodenames.clone().unwrap_or_default();
        let items = sent
            .items
            .into_iter()
            .filter(|node| {
                node.metadata
                    .name
                    .as_ref()
                    .is_some_and(|name| passed.contains(name))
            })
            .collect();
        self.nodes = Some(NodeList { items });
        self
    }

    /// A request that could not be decoded at all
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}
