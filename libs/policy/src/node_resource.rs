//! Cluster-scoped node resource policies.
//!
//! A policy selects nodes by label and declares a template of static
//! resource expansions plus optional target load thresholds. The
//! annotator derives the desired annotation set from the template and
//! reconciles each selected node against it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use housekeeper_cluster::{LabelSelector, ObjectMeta};

use crate::annotations::{build_annotation_key, BALANCE_TARGET_PREFIX, EXPANSION_PREFIX};

/// Collection path for the policy objects.
pub const CNRP_COLLECTION_PATH: &str =
    "/apis/scheduling.crane.io/v1alpha1/clusternoderesourcepolicies";

/// How a policy's template is applied to nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    #[default]
    Annotation,
    Crd,
}

/// Expansion strategy declared by the template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionStrategy {
    #[default]
    Static,
    Auto,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaticResourceExpansion {
    /// Resource name → expansion ratio, kept as the verbatim string.
    pub ratios: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetLoadThreshold {
    /// Resource name → overload threshold percent.
    pub percents: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeResourceTemplateSpec {
    pub resource_expansion_strategy: ExpansionStrategy,
    pub static_resource_expansion: Option<StaticResourceExpansion>,
    /// Recognized but not implemented; a policy carrying only this block
    /// is ignored.
    pub auto_resource_expansion: Option<serde_json::Value>,
    pub target_load_threshold: Option<TargetLoadThreshold>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeResourceTemplate {
    pub spec: NodeResourceTemplateSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterNodeResourcePolicySpec {
    pub node_selector: LabelSelector,
    pub apply_mode: ApplyMode,
    pub template: NodeResourceTemplate,
}

/// A cluster node resource policy object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterNodeResourcePolicy {
    pub metadata: ObjectMeta,
    pub spec: ClusterNodeResourcePolicySpec,
}

/// List shape returned by the collection endpoint.
pub type NodeResourcePolicyList = housekeeper_cluster::ObjectList<ClusterNodeResourcePolicy>;

impl ClusterNodeResourcePolicy {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The desired static annotation set for nodes selected by this
    /// policy, or `None` when the template cannot be applied (auto-only
    /// or empty templates).
    pub fn desired_annotations(&self) -> Option<BTreeMap<String, String>> {
        let spec = &self.spec.template.spec;

        let static_expansion = match (&spec.resource_expansion_strategy, &spec.static_resource_expansion) {
            (ExpansionStrategy::Static, Some(expansion)) => expansion,
            (ExpansionStrategy::Static, None) => {
                warn!(policy = %self.name(), "static expansion strategy without static expansion block, ignoring");
                return None;
            }
            (ExpansionStrategy::Auto, _) => {
                warn!(policy = %self.name(), "auto resource expansion is not implemented, ignoring");
                return None;
            }
        };

        let mut desired = BTreeMap::new();
        for (resource, ratio) in &static_expansion.ratios {
            desired.insert(
                build_annotation_key(EXPANSION_PREFIX, resource),
                ratio.clone(),
            );
        }
        if let Some(thresholds) = &spec.target_load_threshold {
            for (resource, percent) in &thresholds.percents {
                desired.insert(
                    build_annotation_key(BALANCE_TARGET_PREFIX, resource),
                    percent.to_string(),
                );
            }
        }
        Some(desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_policy() -> ClusterNodeResourcePolicy {
        serde_json::from_value(serde_json::json!({
            "metadata": {"name": "housekeeper-pool"},
            "spec": {
                "nodeSelector": {"matchLabels": {"cloud.tencent.com/provider": "tencentcloud"}},
                "applyMode": "annotation",
                "template": {
                    "spec": {
                        "resourceExpansionStrategy": "static",
                        "staticResourceExpansion": {
                            "ratios": {"cpu": "2", "memory": "1.2"}
                        },
                        "targetLoadThreshold": {
                            "percents": {"cpu": 50, "memory": 60}
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn desired_set_from_static_template() {
        let desired = static_policy().desired_annotations().unwrap();
        assert_eq!(desired.get("expansion.scheduling.crane.io/cpu").unwrap(), "2");
        assert_eq!(
            desired.get("expansion.scheduling.crane.io/memory").unwrap(),
            "1.2"
        );
        assert_eq!(
            desired
                .get("balance-target.scheduling.crane.io/cpu")
                .unwrap(),
            "50"
        );
        assert_eq!(desired.len(), 4);
    }

    #[test]
    fn auto_only_policy_is_ignored() {
        let policy: ClusterNodeResourcePolicy = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "auto-pool"},
            "spec": {
                "template": {
                    "spec": {
                        "resourceExpansionStrategy": "auto",
                        "autoResourceExpansion": {"maxRatio": "3"}
                    }
                }
            }
        }))
        .unwrap();
        assert!(policy.desired_annotations().is_none());
    }

    #[test]
    fn static_without_block_is_ignored() {
        let policy: ClusterNodeResourcePolicy = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "empty"},
            "spec": {}
        }))
        .unwrap();
        assert!(policy.desired_annotations().is_none());
    }

    #[test]
    fn thresholds_are_optional() {
        let policy: ClusterNodeResourcePolicy = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "ratios-only"},
            "spec": {
                "template": {
                    "spec": {
                        "resourceExpansionStrategy": "static",
                        "staticResourceExpansion": {"ratios": {"cpu": "1.5"}}
                    }
                }
            }
        }))
        .unwrap();
        let desired = policy.desired_annotations().unwrap();
        assert_eq!(desired.len(), 1);
        assert!(desired.contains_key("expansion.scheduling.crane.io/cpu"));
    }
}
