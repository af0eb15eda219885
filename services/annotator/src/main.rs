//! housekeeper-annotator
//!
//! Long-running controller that keeps node annotations eventually
//! consistent with the scheduling policy and the cluster node resource
//! policies:
//!
//! - metric-sync loop: balance-load and hot-value annotations
//! - policy loop: static expansion and balance-target annotations
//! - event loop: binding records feeding the hot value
//!
//! The write path is gated by a leader lease; losing it is fatal and the
//! supervising orchestrator restarts the process.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod bindings;
mod config;
mod controller;
mod queue;

use housekeeper_cluster::{ClusterClient, ClusterConfig, LeaderElector, LeaseConfig};
use housekeeper_datasource::{provider_from_config, NodeMetricsClient};
use housekeeper_policy::annotations::ensure_local_timezone;
use housekeeper_policy::PolicySpec;

use bindings::BindingRecords;
use config::Config;
use controller::{Context, EventController, NodeController, PolicyController};

#[tokio::main]
async fn main() -> Result<()> {
    ensure_local_timezone();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting housekeeper annotator");

    let config = Config::from_env()?;
    let policy = PolicySpec::load(&config.policy_path)
        .with_context(|| format!("loading policy from {}", config.policy_path))?;
    info!(
        policy_path = %config.policy_path,
        sync_metrics = policy.sync_period.len(),
        workers = config.concurrent_syncs,
        "configuration loaded"
    );

    let cluster = ClusterClient::new(&ClusterConfig::from_env())?;
    let source = provider_from_config(&config.datasource, &cluster)?;
    let metrics = NodeMetricsClient::new(source, &config.cluster_id);

    let bindings = Arc::new(BindingRecords::new(
        config.binding_heap_size,
        policy.max_hot_value_time_range(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    spawn_signal_handler(shutdown_tx.clone());

    // Hold the lease before writing anything.
    let identity = format!(
        "{}-{}",
        std::env::var("HOSTNAME").unwrap_or_else(|_| "annotator".to_string()),
        std::process::id()
    );
    let elector = Arc::new(LeaderElector::new(
        cluster.clone(),
        LeaseConfig::new(&config.lease_namespace, &config.lease_name, &identity),
    ));
    elector.acquire().await?;
    {
        let elector = Arc::clone(&elector);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { elector.run(shutdown).await });
    }

    let context = Arc::new(Context {
        cluster,
        metrics,
        policy,
        bindings: Arc::clone(&bindings),
    });

    let mut handles = Vec::new();

    let node_controller = Arc::new(NodeController::new(Arc::clone(&context)));
    handles.extend(node_controller.start(config.concurrent_syncs, shutdown_rx.clone()));

    let policy_controller = Arc::new(PolicyController::new(Arc::clone(&context)));
    handles.extend(policy_controller.start(config.concurrent_syncs, shutdown_rx.clone()));

    let event_controller = Arc::new(EventController::new(Arc::clone(&context)));
    handles.push(event_controller.start(shutdown_rx.clone()));

    {
        let bindings = Arc::clone(&bindings);
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { bindings.run_gc(shutdown).await }));
    }

    info!("annotator controllers running");
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "controller task failed");
        }
    }

    info!("annotator stopped");
    Ok(())
}

fn spawn_signal_handler(shutdown: tokio::sync::watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("installing SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received, draining workers");
        let _ = shutdown.send(true);
    });
}
