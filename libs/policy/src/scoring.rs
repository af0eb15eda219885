//! Schedule-time scoring over node annotations.
//!
//! All reads go through the annotation codec and its active-duration
//! gate, so a stale or malformed value degrades to "metric absent": the
//! predicate skips the metric, the priority scorer zeroes the node.

use std::collections::BTreeMap;

use chrono::Local;
use tracing::{debug, warn};

use housekeeper_cluster::{Node, Pod};

use crate::annotations::{
    self, active_duration, node_hot_value, resource_target_threshold, resource_usage,
};
use crate::spec::{PolicySpec, PriorityPolicy};

/// Upper bound of a node's score, shared with the primary scheduler.
pub const MAX_NODE_SCORE: i64 = 100;

/// Behavior switches for the overload predicate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringConfig {
    /// Bug-compatible mode: report every node with at least one
    /// configured predicate metric as overloaded, regardless of
    /// thresholds (the historical `>= 0` comparison). Off by default.
    pub overload_when_any_predicate: bool,
}

/// The overload predicate: does any tracked load exceed its threshold?
///
/// Metrics with no active duration, missing/expired loads or missing
/// thresholds are skipped; a negative threshold disables the metric for
/// the node.
pub fn is_overloaded(
    pod: &Pod,
    node: &Node,
    annotations: &BTreeMap<String, String>,
    policy: &PolicySpec,
    config: ScoringConfig,
) -> bool {
    let now = Local::now();
    let mut exceeded = 0usize;

    for predicate in &policy.predicate {
        let Some(active) = active_duration(&policy.sync_period, &predicate.name) else {
            warn!(
                pod = %pod.name(),
                node = %node.name(),
                metric = %predicate.name,
                "predicate metric has no active duration, skipping"
            );
            continue;
        };

        let usage = match resource_usage(annotations, &predicate.name, active, now) {
            Ok(usage) => usage,
            Err(e) => {
                debug!(node = %node.name(), metric = %predicate.name, error = %e, "load unavailable, skipping predicate metric");
                continue;
            }
        };

        let threshold = match resource_target_threshold(annotations, &predicate.name) {
            Ok(threshold) => threshold,
            Err(e) => {
                debug!(node = %node.name(), metric = %predicate.name, error = %e, "threshold unavailable, skipping predicate metric");
                continue;
            }
        };

        if threshold < 0.0 {
            debug!(node = %node.name(), metric = %predicate.name, "negative threshold disables this metric");
            continue;
        }

        if usage > threshold {
            debug!(
                node = %node.name(),
                metric = %predicate.name,
                usage,
                threshold,
                "load exceeds target threshold"
            );
            exceeded += 1;
        }
    }

    if config.overload_when_any_predicate {
        return !policy.predicate.is_empty();
    }
    exceeded > 0
}

/// Score contribution of one priority metric.
///
/// Fails when the metric has no active duration or its load annotation
/// is missing/expired; the caller zeroes the node in that case.
fn metric_score(
    annotations: &BTreeMap<String, String>,
    priority: &PriorityPolicy,
    policy: &PolicySpec,
) -> Result<f64, annotations::AnnotationError> {
    let active = active_duration(&policy.sync_period, &priority.name).ok_or_else(|| {
        annotations::AnnotationError::Missing(format!("sync period for {}", priority.name))
    })?;
    let usage = resource_usage(annotations, &priority.name, active, Local::now())?;
    Ok((1.0 - usage) * priority.weight * MAX_NODE_SCORE as f64)
}

/// Weighted balance score minus the hot-spot penalty, clamped to
/// `[0, MAX_NODE_SCORE]`.
///
/// Zero-weight priorities contribute nothing and are excluded from
/// normalization. Any unavailable priority metric zeroes the node: a
/// node we cannot judge must not outscore the ones we can.
pub fn node_score_with_hot_penalty(
    pod: &Pod,
    node: &Node,
    annotations: &BTreeMap<String, String>,
    policy: &PolicySpec,
) -> i64 {
    if policy.priority.is_empty() {
        warn!("no priority policy configured, all nodes score 0");
        return 0;
    }

    let mut score = 0.0;
    let mut total_weight = 0.0;

    for priority in &policy.priority {
        if priority.weight == 0.0 {
            continue;
        }
        match metric_score(annotations, priority, policy) {
            Ok(contribution) => {
                score += contribution;
                total_weight += priority.weight;
            }
            Err(e) => {
                debug!(
                    pod = %pod.name(),
                    node = %node.name(),
                    metric = %priority.name,
                    error = %e,
                    "priority metric unavailable, node scores 0"
                );
                return 0;
            }
        }
    }

    if total_weight == 0.0 {
        return 0;
    }

    let weighted = (score / total_weight) as i64;
    let penalty = hot_value_penalty(annotations);
    let final_score = weighted - penalty;
    debug!(
        pod = %pod.name(),
        node = %node.name(),
        weighted,
        penalty,
        final_score,
        "balance score computed"
    );
    final_score.clamp(0, MAX_NODE_SCORE)
}

/// The node's active hot value, or 0 when absent/expired.
fn hot_value_penalty(annotations: &BTreeMap<String, String>) -> i64 {
    match node_hot_value(annotations, Local::now()) {
        Ok(value) => value as i64,
        Err(_) => 0,
    }
}
