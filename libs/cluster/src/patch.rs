//! JSON-patch construction for annotation reconciliation.
//!
//! Annotation keys contain `/`, which JSON pointers treat as a path
//! separator, so keys are escaped per RFC 6901 before they are embedded
//! in a patch path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single JSON-patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl PatchOp {
    pub fn add(path: String, value: String) -> Self {
        Self {
            op: "add".into(),
            path,
            value: Some(value),
        }
    }

    pub fn replace(path: String, value: String) -> Self {
        Self {
            op: "replace".into(),
            path,
            value: Some(value),
        }
    }

    pub fn remove(path: String) -> Self {
        Self {
            op: "remove".into(),
            path,
            value: None,
        }
    }
}

/// Escape a map key for use inside a JSON pointer (RFC 6901).
pub fn escape_json_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Patch path for a metadata annotation key.
pub fn annotation_patch_path(key: &str) -> String {
    format!("/metadata/annotations/{}", escape_json_pointer(key))
}

/// Diff the observed annotation set against the desired set.
///
/// Produces `add` for missing keys, `replace` for differing values and
/// `remove` for observed keys with no desired counterpart. Equal sets
/// yield an empty patch; callers skip the API call in that case.
/// Output order is deterministic (sorted by key, desired side first).
pub fn build_patch(
    observed: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> Vec<PatchOp> {
    let mut ops = Vec::new();

    for (key, want) in desired {
        match observed.get(key) {
            None => ops.push(PatchOp::add(annotation_patch_path(key), want.clone())),
            Some(have) if have != want => {
                ops.push(PatchOp::replace(annotation_patch_path(key), want.clone()))
            }
            Some(_) => {}
        }
    }

    for key in observed.keys() {
        if !desired.contains_key(key) {
            ops.push(PatchOp::remove(annotation_patch_path(key)));
        }
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anns(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn pointer_escaping() {
        assert_eq!(
            escape_json_pointer("expansion.scheduling.crane.io/cpu"),
            "expansion.scheduling.crane.io~1cpu"
        );
        assert_eq!(escape_json_pointer("a~b/c"), "a~0b~1c");
    }

    #[test]
    fn equal_sets_produce_no_ops() {
        let set = anns(&[("expansion.scheduling.crane.io/cpu", "2")]);
        assert!(build_patch(&set, &set).is_empty());
    }

    #[test]
    fn removal_of_stale_key() {
        let observed = anns(&[
            ("expansion.scheduling.crane.io/cpu", "2"),
            ("expansion.scheduling.crane.io/memory", "1.2"),
        ]);
        let desired = anns(&[("expansion.scheduling.crane.io/memory", "1.2")]);

        let ops = build_patch(&observed, &desired);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, "remove");
        assert_eq!(ops[0].path, "/metadata/annotations/expansion.scheduling.crane.io~1cpu");
    }

    #[test]
    fn add_replace_remove_together() {
        let observed = anns(&[
            ("balance-target.scheduling.crane.io/cpu", "50"),
            ("expansion.scheduling.crane.io/cpu", "2"),
        ]);
        let desired = anns(&[
            ("balance-target.scheduling.crane.io/cpu", "60"),
            ("expansion.scheduling.crane.io/memory", "1.5"),
        ]);

        let ops = build_patch(&observed, &desired);
        let verbs: Vec<&str> = ops.iter().map(|op| op.op.as_str()).collect();
        assert_eq!(verbs, vec!["replace", "add", "remove"]);
    }

    #[test]
    fn applying_patch_yields_desired() {
        let observed = anns(&[
            ("expansion.scheduling.crane.io/cpu", "2"),
            ("balance-target.scheduling.crane.io/cpu", "40"),
        ]);
        let desired = anns(&[
            ("expansion.scheduling.crane.io/cpu", "3"),
            ("expansion.scheduling.crane.io/memory", "1.1"),
        ]);

        let mut applied = observed.clone();
        for op in build_patch(&observed, &desired) {
            let key = op
                .path
                .trim_start_matches("/metadata/annotations/")
                .replace("~1", "/")
                .replace("~0", "~");
            match op.op.as_str() {
                "add" | "replace" => {
                    applied.insert(key, op.value.unwrap());
                }
                "remove" => {
                    applied.remove(&key);
                }
                other => panic!("unexpected op {other}"),
            }
        }
        assert_eq!(applied, desired);
    }
}
