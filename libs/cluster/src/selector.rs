//! Label-selector evaluation for cluster-scoped policies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A label selector as found on policy objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelSelector {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// A single selector requirement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelSelectorRequirement {
    pub key: String,
    /// One of `In`, `NotIn`, `Exists`, `DoesNotExist`.
    pub operator: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl LabelSelector {
    /// Evaluate the selector against a label set.
    ///
    /// An empty selector matches everything, mirroring the apiserver's
    /// semantics for cluster-scoped policies.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        for (key, value) in &self.match_labels {
            if labels.get(key) != Some(value) {
                return false;
            }
        }
        for req in &self.match_expressions {
            let actual = labels.get(&req.key);
            let ok = match req.operator.as_str() {
                "In" => actual.is_some_and(|v| req.values.iter().any(|w| w == v)),
                "NotIn" => !actual.is_some_and(|v| req.values.iter().any(|w| w == v)),
                "Exists" => actual.is_some(),
                "DoesNotExist" => actual.is_none(),
                _ => false,
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Render the `matchLabels` part as an apiserver `labelSelector`
    /// query string. Expressions are evaluated client-side.
    pub fn to_query(&self) -> Option<String> {
        if self.match_labels.is_empty() {
            return None;
        }
        Some(
            self.match_labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}
