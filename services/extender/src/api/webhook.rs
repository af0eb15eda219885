//! Pod-admission mutator.
//!
//! On pod creation in an in-scope namespace, stamps the housekeeper
//! scope annotation and pins the pod to the managed node pool via its
//! node selector. The decision reads the shared scope snapshot; it never
//! calls back into the cluster on the admission path. The request
//! namespace is used rather than the object's (the object may not carry
//! one yet at admission time).

use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use housekeeper_cluster::{escape_json_pointer, Pod};
use housekeeper_policy::{
    ANNOTATION_POD_SCHEDULING_SCOPE, LABEL_MANAGED_NODE_KEY, LABEL_MANAGED_NODE_VALUE,
    SCOPE_HOUSEKEEPER,
};

use crate::state::AppState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionReview {
    pub api_version: String,
    pub kind: String,
    pub request: Option<AdmissionRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionRequest {
    pub uid: String,
    pub namespace: String,
    pub object: Option<Pod>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
    /// Base64-encoded JSON patch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

/// `POST /webhook/mutate-pod`
pub async fn mutate_pod(
    State(state): State<AppState>,
    Json(review): Json<AdmissionReview>,
) -> Json<AdmissionReview> {
    let Some(request) = &review.request else {
        warn!("admission review without request");
        return Json(AdmissionReview {
            api_version: review.api_version,
            kind: review.kind,
            request: None,
            response: Some(AdmissionResponse {
                allowed: true,
                ..Default::default()
            }),
        });
    };

    let mut response = AdmissionResponse {
        uid: request.uid.clone(),
        allowed: true,
        patch_type: None,
        patch: None,
    };

    if state.scope_covers(&request.namespace) {
        if let Some(pod) = &request.object {
            let ops = mutation_ops(pod);
            if !ops.is_empty() {
                debug!(
                    namespace = %request.namespace,
                    pod = %pod.name(),
                    ops = ops.len(),
                    "stamping pod into housekeeper scope"
                );
                let raw = serde_json::to_vec(&ops).expect("patch ops serialize");
                response.patch_type = Some("JSONPatch".to_string());
                response.patch = Some(BASE64.encode(raw));
            }
        }
    }

    Json(AdmissionReview {
        api_version: review.api_version,
        kind: review.kind,
        request: None,
        response: Some(response),
    })
}

/// JSON-patch operations that stamp a pod into scope. Creates the
/// annotation/selector maps when the pod has none.
fn mutation_ops(pod: &Pod) -> Vec<serde_json::Value> {
    let mut ops = Vec::new();

    if pod.metadata.annotations.is_empty() {
        ops.push(serde_json::json!({
            "op": "add",
            "path": "/metadata/annotations",
            "value": {ANNOTATION_POD_SCHEDULING_SCOPE: SCOPE_HOUSEKEEPER}
        }));
    } else if pod.annotation(ANNOTATION_POD_SCHEDULING_SCOPE) != Some(SCOPE_HOUSEKEEPER) {
        ops.push(serde_json::json!({
            "op": "add",
            "path": format!("/metadata/annotations/{}", escape_json_pointer(ANNOTATION_POD_SCHEDULING_SCOPE)),
            "value": SCOPE_HOUSEKEEPER
        }));
    }

    if pod.spec.node_selector.is_empty() {
        ops.push(serde_json::json!({
            "op": "add",
            "path": "/spec/nodeSelector",
            "value": {LABEL_MANAGED_NODE_KEY: LABEL_MANAGED_NODE_VALUE}
        }));
    } else if pod.spec.node_selector.get(LABEL_MANAGED_NODE_KEY).map(String::as_str)
        != Some(LABEL_MANAGED_NODE_VALUE)
    {
        ops.push(serde_json::json!({
            "op": "add",
            "path": format!("/spec/nodeSelector/{}", escape_json_pointer(LABEL_MANAGED_NODE_KEY)),
            "value": LABEL_MANAGED_NODE_VALUE
        }));
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_for_bare_pod_create_both_maps() {
        let pod: Pod = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "web-1", "namespace": "default"}
        }))
        .unwrap();
        let ops = mutation_ops(&pod);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0]["path"], "/metadata/annotations");
        assert_eq!(ops[1]["path"], "/spec/nodeSelector");
    }

    #[test]
    fn ops_merge_into_existing_maps() {
        let pod: Pod = serde_json::from_value(serde_json::json!({
            "metadata": {
                "name": "web-1",
                "annotations": {"team": "infra"}
            },
            "spec": {"nodeSelector": {"disk": "ssd"}}
        }))
        .unwrap();
        let ops = mutation_ops(&pod);
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[0]["path"],
            "/metadata/annotations/scope.scheduling.crane.io"
        );
        assert_eq!(
            ops[1]["path"],
            "/spec/nodeSelector/cloud.tencent.com~1provider"
        );
    }

    #[test]
    fn already_stamped_pod_needs_nothing() {
        let pod: Pod = serde_json::from_value(serde_json::json!({
            "metadata": {
                "name": "web-1",
                "annotations": {"scope.scheduling.crane.io": "housekeeper"}
            },
            "spec": {"nodeSelector": {"cloud.tencent.com/provider": "tencentcloud"}}
        }))
        .unwrap();
        assert!(mutation_ops(&pod).is_empty());
    }
}
