//! The safe-overload filter endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::{debug, warn};

use housekeeper_cluster::{ExtenderArgs, ExtenderFilterResult, NodeList};
use housekeeper_policy::{is_daemonset_pod, is_managed_node, is_scoped_pod, is_overloaded};

use crate::state::AppState;

const REASON_OVERLOADED: &str = "node overload threshold exceeded";

/// `POST /scheduler/predicates/safe-overload`
///
/// Survivors: pods outside the housekeeper scope on unmanaged nodes,
/// daemon pods, and nodes the overload predicate clears. Failures carry
/// a per-node reason. Protocol errors answer `200` with the envelope
/// `error` set; the primary scheduler does not interpret HTTP errors.
pub async fn safe_overload(
    State(state): State<AppState>,
    body: Result<Json<ExtenderArgs>, JsonRejection>,
) -> Json<ExtenderFilterResult> {
    let args = match body {
        Ok(Json(args)) => args,
        Err(rejection) => {
            warn!(error = %rejection, "rejecting malformed predicate body");
            return Json(ExtenderFilterResult::errored(rejection.to_string()));
        }
    };

    let Some(pod) = args.pod else {
        return Json(ExtenderFilterResult::errored("no pod specified"));
    };
    let Some(nodes) = args.nodes else {
        // `nodenames` means the scheduler runs with node caching.
        return Json(ExtenderFilterResult::errored("node cache not supported"));
    };

    let mut survivors = Vec::with_capacity(nodes.items.len());
    let mut failed = std::collections::BTreeMap::new();

    for node in nodes.items {
        // Outside the managed scope the extender has no opinion.
        if !is_scoped_pod(&pod) && !is_managed_node(&node) {
            survivors.push(node);
            continue;
        }
        if is_daemonset_pod(&pod) {
            survivors.push(node);
            continue;
        }

        let annotations = node.annotations().clone();
        if is_overloaded(&pod, &node, &annotations, state.policy(), state.scoring()) {
            failed.insert(node.metadata.name.clone(), REASON_OVERLOADED.to_string());
        } else {
            survivors.push(node);
        }
    }

    debug!(
        pod = %pod.name(),
        namespace = %pod.namespace(),
        survivors = survivors.len(),
        failed = failed.len(),
        "safe-overload verdict"
    );

    Json(ExtenderFilterResult {
        nodes: Some(NodeList { items: survivors }),
        failed_nodes: failed,
        error: String::new(),
    })
}
