//! housekeeper-cleanup
//!
//! Uninstall hook. Order matters: the annotator deployments are scaled
//! to zero and waited out first, otherwise a live controller would
//! re-patch nodes right after we strip them. Then every node loses all
//! annotations under the configured prefixes in a single JSON patch.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use housekeeper_cluster::{build_patch, ClusterClient, ClusterConfig};
use housekeeper_policy::annotations::{
    filter_by_prefixes, BALANCE_LOAD_PREFIX, BALANCE_TARGET_PREFIX, EXPANSION_PREFIX,
};

/// Per-deployment cap on the scale-to-zero wait.
const WAIT_CAP: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Parser)]
#[command(
    name = "housekeeper-cleanup",
    about = "Stop the housekeeper controllers and strip their node annotations"
)]
struct Options {
    /// Namespace of a deployment to stop; repeat per deployment, paired
    /// positionally with --deployment-to-stop.
    #[arg(long = "deployment-to-stop-namespace")]
    namespaces: Vec<String>,

    /// Deployment to scale to zero before clearing annotations.
    #[arg(long = "deployment-to-stop")]
    deployments: Vec<String>,

    /// Annotation prefix to clear from every node; defaults to the three
    /// housekeeper prefixes when omitted.
    #[arg(long = "clear-node-annotation-prefix")]
    prefixes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut options = Options::parse();
    if options.prefixes.is_empty() {
        options.prefixes = vec![
            BALANCE_LOAD_PREFIX.to_string(),
            BALANCE_TARGET_PREFIX.to_string(),
            EXPANSION_PREFIX.to_string(),
        ];
    }

    let client = ClusterClient::new(&ClusterConfig::from_env())?;
    run(&client, options).await
}

async fn run(client: &ClusterClient, options: Options) -> Result<()> {
    // Stop the controllers first so nothing re-annotates behind us.
    for (namespace, deployment) in options.namespaces.iter().zip(options.deployments.iter()) {
        info!(namespace, deployment, "scaling deployment to zero");
        let selector = match client.scale_deployment(namespace, deployment, 0).await {
            Ok(selector) => selector,
            Err(e) => {
                warn!(namespace, deployment, error = %e, "failed to scale deployment, continuing");
                continue;
            }
        };
        if let Err(e) = wait_for_pods_gone(client, namespace, &selector).await {
            warn!(namespace, deployment, error = %e, "deployment pods did not drain, continuing");
        }
    }

    // One patch per node, covering every configured prefix.
    let prefixes: Vec<&str> = options.prefixes.iter().map(String::as_str).collect();
    let desired = BTreeMap::new();
    let mut failures = 0usize;

    for node in client.list_nodes(None).await? {
        let observed = filter_by_prefixes(node.annotations(), &prefixes);
        let ops = build_patch(&observed, &desired);
        if ops.is_empty() {
            continue;
        }
        match client.patch_node(node.name(), &ops).await {
            Ok(()) => info!(node = %node.name(), cleared = ops.len(), "cleared node annotations"),
            Err(e) => {
                warn!(node = %node.name(), error = %e, "failed to clear node annotations");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("failed to clear annotations on {failures} node(s)");
    }
    info!("cleanup complete");
    Ok(())
}

/// Poll until the selector matches no pods; sleeps double from one
/// second up to thirty, bounded overall by [`WAIT_CAP`].
async fn wait_for_pods_gone(client: &ClusterClient, namespace: &str, selector: &str) -> Result<()> {
    if selector.is_empty() {
        return Ok(());
    }
    let started = Instant::now();
    let mut delay = Duration::from_secs(1);
    loop {
        if started.elapsed() > WAIT_CAP {
            bail!("timed out waiting for pods matching {selector} to disappear");
        }
        match client.list_pods(namespace, Some(selector)).await {
            Ok(pods) if pods.is_empty() => return Ok(()),
            Ok(pods) => {
                info!(namespace, remaining = pods.len(), "waiting for pods to drain");
            }
            Err(e) => warn!(namespace, error = %e, "failed to list pods while draining"),
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(30));
    }
}
