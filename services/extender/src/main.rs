//! housekeeper-extender
//!
//! HTTP scheduler extender advising the primary scheduler:
//!
//! - `POST /scheduler/predicates/safe-overload` filters overloaded nodes
//! - `POST /scheduler/priorities/safe-balance` scores the survivors
//! - `POST /webhook/mutate-pod` stamps in-scope pods at admission
//!
//! Verdicts come from node annotations maintained by the annotator; the
//! extender itself holds no metric state and tolerates stale annotations
//! through their active-duration gate.

use std::future::IntoFuture;

use anyhow::{Context as _, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use housekeeper_cluster::{ClusterClient, ClusterConfig};
use housekeeper_extender::{api, config::Config, scope::ScopeController, state::AppState};
use housekeeper_policy::annotations::ensure_local_timezone;
use housekeeper_policy::PolicySpec;

const SHUTDOWN_DRAIN: std::time::Duration = std::time::Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    ensure_local_timezone();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting housekeeper extender");

    let config = Config::from_env()?;
    let policy = PolicySpec::load(&config.policy_path)
        .with_context(|| format!("loading policy from {}", config.policy_path))?;
    info!(
        policy_path = %config.policy_path,
        predicates = policy.predicate.len(),
        priorities = policy.priority.len(),
        "configuration loaded"
    );

    let state = AppState::new(policy, config.scoring);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    let cluster = ClusterClient::new(&ClusterConfig::from_env())?;
    let scope_controller = ScopeController::new(cluster, state.clone());
    {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { scope_controller.run(shutdown).await });
    }

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "listening for scheduler callbacks");

    let mut shutdown = shutdown_rx.clone();
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .into_future();

    // Bound the drain: in-flight requests get ten seconds, then the
    // process exits regardless.
    tokio::select! {
        result = serve => result?,
        _ = wait_then_drain(shutdown_rx) => {
            info!("graceful-shutdown window elapsed, closing server");
        }
    }

    info!("extender stopped");
    Ok(())
}

async fn wait_then_drain(mut shutdown: tokio::sync::watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            // Signal channel is gone; never force a close.
            std::future::pending::<()>().await;
        }
    }
    tokio::time::sleep(SHUTDOWN_DRAIN).await;
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
        info!("shutdown signal received");
        let _ = shutdown.send(true);
    });
}
