//! Wire types for the scheduler-extender protocol.
//!
//! These mirror the primary scheduler's extender contract: both endpoints
//! answer `200 OK` even on failure, carrying the error in the envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::objects::{Node, Pod};

/// Request body sent by the primary scheduler to both extender endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtenderArgs {
    pub pod: Option<Pod>,
    pub nodes: Option<NodeList>,
    /// Populated instead of `nodes` when the scheduler runs with node
    /// caching; we reject that mode.
    #[serde(rename = "nodenames")]
    pub node_names: Option<Vec<String>>,
}

/// A plain node list as embedded in extender messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeList {
    pub items: Vec<Node>,
}

/// Filter verdict returned by the predicate endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtenderFilterResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,

    #[serde(rename = "failedNodes", skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_nodes: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ExtenderFilterResult {
    /// Envelope-level failure: no verdicts, only an error string.
    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            nodes: None,
            failed_nodes: BTreeMap::new(),
            error: message.into(),
        }
    }
}

/// One entry of the priority endpoint's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostPriority {
    pub host: String,
    pub score: i64,
}
