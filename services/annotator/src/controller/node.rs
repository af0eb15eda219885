//! Metric-sync controller.
//!
//! One ticker per sync-period entry enumerates the nodes selected by any
//! cluster node resource policy and enqueues `(node, metric)` work. The
//! worker pulls the latest value from the configured data source and
//! patches the node's balance-load annotation, then refreshes the node's
//! hot value from the binding window. Writes to the same key are
//! serialized by the queue, so each annotation moves forward in time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use housekeeper_cluster::{annotation_patch_path, Node, PatchOp};
use housekeeper_policy::{
    build_annotation_key, local_time_string, BALANCE_LOAD_PREFIX, NODE_HOT_VALUE_KEY,
};
use housekeeper_policy::node_resource::{ClusterNodeResourcePolicy, CNRP_COLLECTION_PATH};

use crate::queue::{ReconcileAction, WorkQueue};

use super::Context;

/// One unit of metric-sync work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeMetricKey {
    pub node: String,
    pub metric: String,
}

pub struct NodeController {
    context: Arc<Context>,
    queue: Arc<WorkQueue<NodeMetricKey>>,
}

impl NodeController {
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            queue: WorkQueue::new(),
        }
    }

    /// Spawn per-policy tickers plus `workers` queue workers.
    pub fn start(
        self: Arc<Self>,
        workers: usize,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        for sync in &self.context.policy.sync_period {
            let controller = Arc::clone(&self);
            let metric = sync.name.clone();
            let period = sync.period;
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                info!(metric = %metric, period_secs = period.as_secs(), "metric sync ticker started");
                controller.enqueue_selected_nodes(&metric).await;
                let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => controller.enqueue_selected_nodes(&metric).await,
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
            }));
        }

        for _ in 0..workers.max(1) {
            let controller = Arc::clone(&self);
            let queue = Arc::clone(&self.queue);
            handles.push(tokio::spawn(queue.run_worker(move |key| {
                let controller = Arc::clone(&controller);
                async move { controller.sync_node_metric(key).await }
            })));
        }

        {
            let queue = Arc::clone(&self.queue);
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let _ = shutdown.changed().await;
                if *shutdown.borrow() {
                    queue.shut_down();
                }
            }));
        }

        handles
    }

    /// Union of nodes selected by any policy, enqueued for `metric`.
    async fn enqueue_selected_nodes(&self, metric: &str) {
        let policies = match self
            .context
            .cluster
            .list::<ClusterNodeResourcePolicy>(CNRP_COLLECTION_PATH)
            .await
        {
            Ok(list) => list.items,
            Err(e) => {
                warn!(error = %e, "failed to list node resource policies, skipping tick");
                return;
            }
        };

        let mut selected: std::collections::BTreeSet<String> = Default::default();
        for policy in &policies {
            let selector = &policy.spec.node_selector;
            let nodes = match self
                .context
                .cluster
                .list_nodes(selector.to_query().as_deref())
                .await
            {
                Ok(nodes) => nodes,
                Err(e) => {
                    warn!(policy = %policy.name(), error = %e, "failed to list nodes for policy");
                    continue;
                }
            };
            for node in nodes {
                if selector.matches(&node.metadata.labels) {
                    selected.insert(node.metadata.name);
                }
            }
        }

        debug!(
            metric,
            policies = policies.len(),
            nodes = selected.len(),
            "enqueueing metric sync work"
        );
        for node in selected {
            self.queue.add(NodeMetricKey {
                node,
                metric: metric.to_string(),
            });
        }
    }

    /// One reconcile pass for `(node, metric)`.
    async fn sync_node_metric(&self, key: NodeMetricKey) -> ReconcileAction {
        let node = match self.context.cluster.get_node(&key.node).await {
            Ok(node) => node,
            Err(e) if e.is_not_found() => {
                debug!(node = %key.node, "node is gone, dropping work item");
                return ReconcileAction::Forget;
            }
            Err(e) => {
                warn!(node = %key.node, error = %e, "failed to fetch node");
                return ReconcileAction::Retry;
            }
        };

        if let Err(action) = self.annotate_node_load(&node, &key.metric).await {
            return action;
        }
        if let Err(action) = self.annotate_node_hot_value(&node).await {
            return action;
        }
        ReconcileAction::Forget
    }

    async fn annotate_node_load(&self, node: &Node, metric: &str) -> Result<(), ReconcileAction> {
        let sample = match self
            .context
            .metrics
            .query_node_metric_latest(metric, node)
            .await
        {
            Ok(sample) => sample,
            Err(e) => {
                warn!(node = %node.name(), metric, error = %e, "failed to pull node metric");
                return Err(ReconcileAction::Retry);
            }
        };

        self.patch_load_annotation(node, metric, &format_metric_value(sample.value))
            .await
    }

    async fn annotate_node_hot_value(&self, node: &Node) -> Result<(), ReconcileAction> {
        let value = hot_value(
            &self.context.policy.hot_value,
            &self.context.bindings,
            node.name(),
            Utc::now(),
        );
        self.patch_load_annotation(node, NODE_HOT_VALUE_KEY, &value.to_string())
            .await
    }

    /// `add` when the key is absent, `replace` otherwise; the value gets
    /// the local timestamp suffix.
    async fn patch_load_annotation(
        &self,
        node: &Node,
        key: &str,
        value: &str,
    ) -> Result<(), ReconcileAction> {
        let annotation_key = build_annotation_key(BALANCE_LOAD_PREFIX, key);
        let path = annotation_patch_path(&annotation_key);
        let stamped = format!("{value},{}", local_time_string());

        let op = if node.annotations().contains_key(&annotation_key) {
            PatchOp::replace(path, stamped)
        } else {
            PatchOp::add(path, stamped)
        };

        match self.context.cluster.patch_node(node.name(), &[op]).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(node = %node.name(), key, error = %e, "failed to patch load annotation");
                Err(ReconcileAction::Retry)
            }
        }
    }
}

/// Each policy entry contributes `bindings within its window / count`,
/// integer division per entry. Zero counts are skipped.
fn hot_value(
    policy: &[housekeeper_policy::HotValuePolicy],
    bindings: &crate::bindings::BindingRecords,
    node: &str,
    now: chrono::DateTime<Utc>,
) -> usize {
    policy
        .iter()
        .filter(|hot| hot.count > 0)
        .map(|hot| bindings.count_since(node, hot.time_range, now) / hot.count as usize)
        .sum()
}

/// Whole numbers render without a fractional part, matching the string
/// values historical consumers expect.
fn format_metric_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}
