//! Cluster node resource policy controller.
//!
//! Reconciles each policy's template against the nodes its selector
//! matches: the desired static annotation set (expansion ratios plus
//! optional balance targets) is diffed three-way against the observed
//! same-prefix set and patched only when they differ. Successful passes
//! come back after a minute to heal drift; the patch itself is
//! idempotent, so a no-op reconcile produces no API write.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use housekeeper_cluster::build_patch;
use housekeeper_policy::annotations::static_owned_annotations;
use housekeeper_policy::node_resource::{
    ApplyMode, ClusterNodeResourcePolicy, CNRP_COLLECTION_PATH,
};

use crate::queue::{ReconcileAction, WorkQueue};

use super::Context;

const RESYNC_INTERVAL: Duration = Duration::from_secs(60);

pub struct PolicyController {
    context: Arc<Context>,
    queue: Arc<WorkQueue<String>>,
}

impl PolicyController {
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            queue: WorkQueue::new(),
        }
    }

    pub fn start(
        self: Arc<Self>,
        workers: usize,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        {
            let controller = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                info!("policy lister ticker started");
                controller.enqueue_all_policies().await;
                let mut interval = tokio::time::interval(RESYNC_INTERVAL);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => controller.enqueue_all_policies().await,
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
            handles.push(tokio::spawn(queue.run_worker(move |name| {
                let controller = Arc::clone(&controller);
                async move { controller.sync_policy(name).await }
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

    async fn enqueue_all_policies(&self) {
        match self
            .context
            .cluster
            .list::<ClusterNodeResourcePolicy>(CNRP_COLLECTION_PATH)
            .await
        {
            Ok(list) => {
                debug!(policies = list.items.len(), "enqueueing policy reconciles");
                for policy in list.items {
                    self.queue.add(policy.metadata.name);
                }
            }
            Err(e) => warn!(error = %e, "failed to list node resource policies"),
        }
    }

    async fn sync_policy(&self, name: String) -> ReconcileAction {
        let policy: ClusterNodeResourcePolicy = match self
            .context
            .cluster
            .get_json(&format!("{CNRP_COLLECTION_PATH}/{name}"))
            .await
        {
            Ok(policy) => policy,
            Err(e) if e.is_not_found() => {
                debug!(policy = %name, "policy is gone, dropping work item");
                return ReconcileAction::Forget;
            }
            Err(e) => {
                warn!(policy = %name, error = %e, "failed to fetch policy");
                return ReconcileAction::Retry;
            }
        };

        if policy.spec.apply_mode == ApplyMode::Crd {
            warn!(policy = %name, "crd apply mode is not supported");
            return ReconcileAction::Forget;
        }

        let Some(desired) = policy.desired_annotations() else {
            // Auto-only or empty templates: nothing to reconcile.
            return ReconcileAction::Forget;
        };

        let nodes = match self
            .context
            .cluster
            .list_nodes(policy.spec.node_selector.to_query().as_deref())
            .await
        {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(policy = %name, error = %e, "failed to list nodes");
                return ReconcileAction::Retry;
            }
        };

        let mut failures = 0usize;
        for node in nodes {
            if !policy.spec.node_selector.matches(&node.metadata.labels) {
                continue;
            }
            let observed = static_owned_annotations(node.annotations());
            let ops = build_patch(&observed, &desired);
            if ops.is_empty() {
                continue;
            }
            debug!(policy = %name, node = %node.name(), ops = ops.len(), "reconciling static annotations");
            if let Err(e) = self.context.cluster.patch_node(node.name(), &ops).await {
                warn!(policy = %name, node = %node.name(), error = %e, "failed to patch node");
                failures += 1;
            }
        }

        if failures > 0 {
            return ReconcileAction::Retry;
        }
        ReconcileAction::RetryAfter(RESYNC_INTERVAL)
    }
}
