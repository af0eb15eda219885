//! End-to-end scenarios through the extender router.

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::util::ServiceExt;

use housekeeper_extender::api::create_router;
use housekeeper_extender::state::AppState;
use housekeeper_policy::{
    HotValuePolicy, PolicySpec, PredicatePolicy, PriorityPolicy, ScoringConfig, SyncPolicy,
    TimestampedValue,
};

fn test_policy() -> PolicySpec {
    PolicySpec {
        sync_period: vec![
            SyncPolicy {
                name: "cpu_usage_avg_5m".into(),
                period: Duration::from_secs(300),
            },
            SyncPolicy {
                name: "mem_usage_avg_5m".into(),
                period: Duration::from_secs(300),
            },
        ],
        predicate: vec![PredicatePolicy {
            name: "cpu_usage_avg_5m".into(),
        }],
        priority: vec![
            PriorityPolicy {
                name: "cpu_usage_avg_5m".into(),
                weight: 1.0,
            },
            PriorityPolicy {
                name: "mem_usage_avg_5m".into(),
                weight: 1.0,
            },
        ],
        hot_value: vec![HotValuePolicy {
            time_range: Duration::from_secs(60),
            count: 1,
        }],
    }
}

fn test_router() -> Router {
    create_router(AppState::new(test_policy(), ScoringConfig::default()))
}

fn fresh(value: f64) -> String {
    TimestampedValue::now(value).encode()
}

fn stale(value: f64) -> String {
    TimestampedValue {
        value,
        updated_at: chrono::Local::now() - chrono::Duration::minutes(30),
    }
    .encode()
}

fn scoped_pod() -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "name": "p1",
            "namespace": "default",
            "annotations": {"scope.scheduling.crane.io": "housekeeper"}
        }
    })
}

fn plain_pod() -> serde_json::Value {
    serde_json::json!({"metadata": {"name": "p2", "namespace": "default"}})
}

/// A managed-pool node with the given balance annotations.
fn managed_node(name: &str, annotations: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "name": name,
            "labels": {
                "cloud.tencent.com/provider": "tencentcloud",
                "enabled.dynamicscheduler.crane.io": "true"
            },
            "annotations": annotations
        }
    })
}

fn unlabeled_node(name: &str) -> serde_json::Value {
    serde_json::json!({"metadata": {"name": name}})
}

async fn post_json(router: Router, path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = router
        .oneshot(
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap();
    (status, value)
}

#[tokio::test]
async fn filter_overload_keeps_cool_nodes() {
    let args = serde_json::json!({
        "pod": scoped_pod(),
        "nodes": {"items": [
            managed_node("n1", serde_json::json!({
                "balance-load.scheduling.crane.io/cpu_usage_avg_5m": fresh(30.0),
                "balance-target.scheduling.crane.io/cpu": "50"
            })),
            managed_node("n2", serde_json::json!({
                "balance-load.scheduling.crane.io/cpu_usage_avg_5m": fresh(60.0),
                "balance-target.scheduling.crane.io/cpu": "50"
            })),
            managed_node("n3", serde_json::json!({
                "balance-load.scheduling.crane.io/cpu_usage_avg_5m": fresh(95.0),
                "balance-target.scheduling.crane.io/cpu": "50"
            })),
        ]}
    });

    let (status, body) = post_json(test_router(), "/scheduler/predicates/safe-overload", args).await;
    assert_eq!(status, StatusCode::OK);

    let survivors: Vec<&str> = body["nodes"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["metadata"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(survivors, vec!["n1"]);

    let failed = body["failedNodes"].as_object().unwrap();
    assert_eq!(failed.len(), 2);
    assert!(failed.contains_key("n2"));
    assert!(failed.contains_key("n3"));
}

#[tokio::test]
async fn stale_load_value_is_skipped() {
    let args = serde_json::json!({
        "pod": scoped_pod(),
        "nodes": {"items": [
            managed_node("n1", serde_json::json!({
                "balance-load.scheduling.crane.io/cpu_usage_avg_5m": stale(95.0),
                "balance-target.scheduling.crane.io/cpu": "50"
            })),
        ]}
    });

    let (_, body) = post_json(test_router(), "/scheduler/predicates/safe-overload", args).await;
    let survivors = body["nodes"]["items"].as_array().unwrap();
    assert_eq!(survivors.len(), 1);
    assert!(body["failedNodes"].as_object().map(|m| m.is_empty()).unwrap_or(true));
}

#[tokio::test]
async fn priority_balances_toward_cool_nodes() {
    let args = serde_json::json!({
        "pod": scoped_pod(),
        "nodes": {"items": [
            managed_node("nA", serde_json::json!({
                "balance-load.scheduling.crane.io/cpu_usage_avg_5m": fresh(20.0),
                "balance-load.scheduling.crane.io/mem_usage_avg_5m": fresh(40.0)
            })),
            managed_node("nB", serde_json::json!({
                "balance-load.scheduling.crane.io/cpu_usage_avg_5m": fresh(60.0),
                "balance-load.scheduling.crane.io/mem_usage_avg_5m": fresh(60.0)
            })),
        ]}
    });

    let (status, body) = post_json(test_router(), "/scheduler/priorities/safe-balance", args).await;
    assert_eq!(status, StatusCode::OK);

    let scores: HashMap<&str, i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| (entry["host"].as_str().unwrap(), entry["score"].as_i64().unwrap()))
        .collect();
    assert_eq!(scores["nA"], 70);
    assert_eq!(scores["nB"], 50);
}

#[tokio::test]
async fn hot_spot_penalty_subtracts_from_score() {
    let args = serde_json::json!({
        "pod": scoped_pod(),
        "nodes": {"items": [
            managed_node("nA", serde_json::json!({
                "balance-load.scheduling.crane.io/cpu_usage_avg_5m": fresh(20.0),
                "balance-load.scheduling.crane.io/mem_usage_avg_5m": fresh(40.0),
                "balance-load.scheduling.crane.io/node_hot_value": fresh(5.0)
            })),
        ]}
    });

    let (_, body) = post_json(test_router(), "/scheduler/priorities/safe-balance", args).await;
    assert_eq!(body[0]["score"].as_i64().unwrap(), 65);
}

#[tokio::test]
async fn out_of_scope_pod_passes_and_scores_zero() {
    let nodes = serde_json::json!({"items": [
        unlabeled_node("n1"),
        unlabeled_node("n2"),
    ]});

    let predicate_args = serde_json::json!({"pod": plain_pod(), "nodes": nodes.clone()});
    let (_, body) = post_json(
        test_router(),
        "/scheduler/predicates/safe-overload",
        predicate_args,
    )
    .await;
    assert_eq!(body["nodes"]["items"].as_array().unwrap().len(), 2);

    let priority_args = serde_json::json!({"pod": plain_pod(), "nodes": nodes});
    let (_, body) = post_json(
        test_router(),
        "/scheduler/priorities/safe-balance",
        priority_args,
    )
    .await;
    for entry in body.as_array().unwrap() {
        assert_eq!(entry["score"].as_i64().unwrap(), 0);
    }
}

#[tokio::test]
async fn daemonset_pods_always_pass() {
    let daemon_pod = serde_json::json!({
        "metadata": {
            "name": "fluentd-x",
            "namespace": "logging",
            "annotations": {"scope.scheduling.crane.io": "housekeeper"},
            "ownerReferences": [{"apiVersion": "apps/v1", "kind": "DaemonSet", "name": "fluentd"}]
        }
    });
    let args = serde_json::json!({
        "pod": daemon_pod,
        "nodes": {"items": [
            managed_node("n1", serde_json::json!({
                "balance-load.scheduling.crane.io/cpu_usage_avg_5m": fresh(95.0),
                "balance-target.scheduling.crane.io/cpu": "50"
            })),
        ]}
    });

    let (_, body) = post_json(test_router(), "/scheduler/predicates/safe-overload", args).await;
    assert_eq!(body["nodes"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn protocol_errors_stay_http_200() {
    // Malformed JSON body.
    let response = test_router()
        .oneshot(
            Request::post("/scheduler/predicates/safe-overload")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(!body["error"].as_str().unwrap().is_empty());

    // Missing pod.
    let (status, body) = post_json(
        test_router(),
        "/scheduler/predicates/safe-overload",
        serde_json::json!({"nodes": {"items": []}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "no pod specified");

    // Node-cache mode.
    let (_, body) = post_json(
        test_router(),
        "/scheduler/priorities/safe-balance",
        serde_json::json!({"pod": plain_pod(), "nodenames": ["n1"]}),
    )
    .await;
    assert_eq!(body["error"], "node cache not supported");
}

#[tokio::test]
async fn webhook_stamps_in_scope_pods() {
    use base64::Engine as _;

    let state = AppState::new(test_policy(), ScoringConfig::default());
    state.update_scope(HashMap::from([("default".to_string(), true)]));
    let router = create_router(state);

    let review = serde_json::json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "uid-1",
            "namespace": "default",
            "object": plain_pod()
        }
    });
    let (status, body) = post_json(router, "/webhook/mutate-pod", review).await;
    assert_eq!(status, StatusCode::OK);

    let response = &body["response"];
    assert_eq!(response["uid"], "uid-1");
    assert_eq!(response["allowed"], true);
    assert_eq!(response["patchType"], "JSONPatch");

    let patch = base64::engine::general_purpose::STANDARD
        .decode(response["patch"].as_str().unwrap())
        .unwrap();
    let ops: serde_json::Value = serde_json::from_slice(&patch).unwrap();
    let paths: Vec<&str> = ops
        .as_array()
        .unwrap()
        .iter()
        .map(|op| op["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"/metadata/annotations"));
    assert!(paths.contains(&"/spec/nodeSelector"));
}

#[tokio::test]
async fn webhook_ignores_out_of_scope_namespaces() {
    let review = serde_json::json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "uid-2",
            "namespace": "kube-system",
            "object": plain_pod()
        }
    });
    let (_, body) = post_json(test_router(), "/webhook/mutate-pod", review).await;
    let response = &body["response"];
    assert_eq!(response["allowed"], true);
    assert!(response["patch"].is_null());
}
