//! The safe-balance priority endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, warn};

use housekeeper_cluster::{ExtenderArgs, ExtenderFilterResult, HostPriority};
use housekeeper_policy::{
    is_dynamic_scheduler_node, is_managed_node, is_scoped_pod, node_score_with_hot_penalty,
};

use crate::state::AppState;

/// `POST /scheduler/priorities/safe-balance`
///
/// Scores every candidate; pods outside the housekeeper scope only get
/// real scores on managed nodes that opted into dynamic scheduling,
/// everything else scores 0. Errors ride a `200` envelope the primary
/// scheduler already understands.
pub async fn safe_balance(
    State(state): State<AppState>,
    body: Result<Json<ExtenderArgs>, JsonRejection>,
) -> Response {
    let args = match body {
        Ok(Json(args)) => args,
        Err(rejection) => {
            warn!(error = %rejection, "rejecting malformed priority body");
            return Json(ExtenderFilterResult::errored(rejection.to_string())).into_response();
        }
    };

    let Some(pod) = args.pod else {
        return Json(ExtenderFilterResult::errored("no pod specified")).into_response();
    };
    let Some(nodes) = args.nodes else {
        return Json(ExtenderFilterResult::errored("node cache not supported")).into_response();
    };

    let scoped = is_scoped_pod(&pod);
    let priorities: Vec<HostPriority> = nodes
        .items
        .iter()
        .map(|node| {
            let score = if !scoped
                && (!is_managed_node(node) || !is_dynamic_scheduler_node(node))
            {
                0
            } else {
                node_score_with_hot_penalty(&pod, node, node.annotations(), state.policy())
            };
            HostPriority {
                host: node.metadata.name.clone(),
                score,
            }
        })
        .collect();

    debug!(
        pod = %pod.name(),
        namespace = %pod.namespace(),
        nodes = priorities.len(),
        "safe-balance scores computed"
    );

    Json(priorities).into_response()
}
