//! HTTP surface of the extender.
//!
//! The scheduler endpoints follow the primary scheduler's extender
//! protocol: verdicts and errors both travel in a `200 OK` envelope.
//! Candidate node lists arrive in full on every request; there is no
//! server-side node cache.

mod health;
mod predicate;
mod priority;
mod webhook;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/api/version", get(health::version))
        .route(
            "/scheduler/predicates/safe-overload",
            post(predicate::safe_overload),
        )
        .route(
            "/scheduler/priorities/safe-balance",
            post(priority::safe_balance),
        )
        .route("/webhook/mutate-pod", post(webhook::mutate_pod))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
