//! Apply-scope model and the pod/node classification helpers.
//!
//! A single config map in the system namespace decides which namespaces
//! opt into load-aware scheduling. The admission mutator stamps in-scope
//! pods with the housekeeper annotation and pins them to the managed node
//! pool; the extender treats exactly those pods specially.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use housekeeper_cluster::{Node, Pod};

/// Namespace holding the apply-scope config map.
pub const SYSTEM_NAMESPACE: &str = "crane-system";
/// Name of the apply-scope config map.
pub const APPLY_SCOPE_CONFIG_MAP: &str = "crane-scheduler-apply-scope";
/// Data key: cluster-wide opt-in flag.
pub const KEY_CLUSTER_SCOPE: &str = "clusterScope";
/// Data key: JSON map of namespace → bool.
pub const KEY_NAMESPACE_SCOPE: &str = "namespaceScope";
/// Map key representing "every namespace".
pub const WILDCARD: &str = "*";

/// Annotation stamped on in-scope pods by the admission mutator.
pub const ANNOTATION_POD_SCHEDULING_SCOPE: &str = "scope.scheduling.crane.io";
/// Value of the scope annotation.
pub const SCOPE_HOUSEKEEPER: &str = "housekeeper";

/// Label marking nodes of the managed pool.
pub const LABEL_MANAGED_NODE_KEY: &str = "cloud.tencent.com/provider";
pub const LABEL_MANAGED_NODE_VALUE: &str = "tencentcloud";

/// Label opting a node into balance scoring.
pub const LABEL_DYNAMIC_SCHEDULER_KEY: &str = "enabled.dynamicscheduler.crane.io";
pub const LABEL_DYNAMIC_SCHEDULER_VALUE: &str = "true";

/// Parse the apply-scope config map data into the namespace map.
///
/// Unparseable values are skipped with a warning rather than failing the
/// whole map; `clusterScope: true` is represented as the wildcard entry.
/// Boolean values written as strings are tolerated.
pub fn parse_apply_scope(data: &BTreeMap<String, String>) -> HashMap<String, bool> {
    let mut namespaces = HashMap::new();

    let cluster_scope = data
        .get(KEY_CLUSTER_SCOPE)
        .map(|raw| {
            raw.parse::<bool>().unwrap_or_else(|_| {
                warn!(value = %raw, "unparseable clusterScope value, defaulting to false");
                false
            })
        })
        .unwrap_or(false);
    if cluster_scope {
        namespaces.insert(WILDCARD.to_string(), true);
    }

    if let Some(raw) = data.get(KEY_NAMESPACE_SCOPE) {
        match serde_json::from_str::<HashMap<String, serde_json::Value>>(raw) {
            Ok(scope) => {
                for (namespace, value) in scope {
                    let parsed = match &value {
                        serde_json::Value::Bool(b) => Some(*b),
                        serde_json::Value::String(s) => s.parse::<bool>().ok(),
                        _ => None,
                    };
                    match parsed {
                        Some(enabled) => {
                            namespaces.insert(namespace, enabled);
                        }
                        None => {
                            warn!(namespace = %namespace, value = %value, "unparseable namespaceScope entry, skipping");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "unparseable namespaceScope JSON, ignoring");
            }
        }
    }

    namespaces
}

/// True when the scope map covers `namespace`.
pub fn scope_covers(scope: &HashMap<String, bool>, namespace: &str) -> bool {
    scope.get(WILDCARD).copied().unwrap_or(false)
        || scope.get(namespace).copied().unwrap_or(false)
}

/// True when the pod was stamped by the admission mutator.
pub fn is_scoped_pod(pod: &Pod) -> bool {
    pod.annotation(ANNOTATION_POD_SCHEDULING_SCOPE) == Some(SCOPE_HOUSEKEEPER)
}

/// True when the node belongs to the managed pool.
pub fn is_managed_node(node: &Node) -> bool {
    node.has_label(LABEL_MANAGED_NODE_KEY, LABEL_MANAGED_NODE_VALUE)
}

/// True when the node opted into balance scoring.
pub fn is_dynamic_scheduler_node(node: &Node) -> bool {
    node.has_label(LABEL_DYNAMIC_SCHEDULER_KEY, LABEL_DYNAMIC_SCHEDULER_VALUE)
}

/// True when the pod belongs to a per-node daemon controller.
pub fn is_daemonset_pod(pod: &Pod) -> bool {
    pod.metadata
        .owner_references
        .iter()
        .any(|owner| owner.kind == "DaemonSet")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn cluster_scope_becomes_wildcard() {
        let scope = parse_apply_scope(&data(&[("clusterScope", "true")]));
        assert_eq!(scope.get(WILDCARD), Some(&true));
        assert!(scope_covers(&scope, "anything"));
    }

    #[test]
    fn namespace_scope_bool_and_string_forms() {
        let scope = parse_apply_scope(&data(&[(
            "namespaceScope",
            r#"{"default": true, "staging": "true", "prod": false, "weird": 3}"#,
        )]));
        assert_eq!(scope.get("default"), Some(&true));
        assert_eq!(scope.get("staging"), Some(&true));
        assert_eq!(scope.get("prod"), Some(&false));
        assert!(!scope.contains_key("weird"));
        assert!(scope_covers(&scope, "default"));
        assert!(!scope_covers(&scope, "prod"));
        assert!(!scope_covers(&scope, "absent"));
    }

    #[test]
    fn bad_cluster_scope_defaults_false() {
        let scope = parse_apply_scope(&data(&[("clusterScope", "yep")]));
        assert!(scope.is_empty());
    }

    #[test]
    fn pod_and_node_classification() {
        let pod: Pod = serde_json::from_value(serde_json::json!({
            "metadata": {
                "name": "web-1",
                "annotations": {"scope.scheduling.crane.io": "housekeeper"}
            }
        }))
        .unwrap();
        assert!(is_scoped_pod(&pod));

        let plain: Pod = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "web-2"}
        }))
        .unwrap();
        assert!(!is_scoped_pod(&plain));

        let node: Node = serde_json::from_value(serde_json::json!({
            "metadata": {
                "name": "n1",
                "labels": {
                    "cloud.tencent.com/provider": "tencentcloud",
                    "enabled.dynamicscheduler.crane.io": "true"
                }
            }
        }))
        .unwrap();
        assert!(is_managed_node(&node));
        assert!(is_dynamic_scheduler_node(&node));
    }

    #[test]
    fn daemonset_detection() {
        let pod: Pod = serde_json::from_value(serde_json::json!({
            "metadata": {
                "name": "fluentd-x",
                "ownerReferences": [{"apiVersion": "apps/v1", "kind": "DaemonSet", "name": "fluentd"}]
            }
        }))
        .unwrap();
        assert!(is_daemonset_pod(&pod));
    }
}
