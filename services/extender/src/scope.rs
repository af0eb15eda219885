//! Apply-scope controller.
//!
//! Keeps the in-memory scope snapshot in sync with the apply-scope
//! config map. Polls with backoff on failure; deletion of the config map
//! resets the snapshot to empty (nothing in scope). The snapshot lives
//! inside [`AppState`], mutex-protected; there is no ambient global.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use housekeeper_cluster::ClusterClient;
use housekeeper_policy::{parse_apply_scope, APPLY_SCOPE_CONFIG_MAP, SYSTEM_NAMESPACE};

use crate::state::AppState;

const SYNC_INTERVAL: Duration = Duration::from_secs(30);
const ERROR_BACKOFF: Duration = Duration::from_secs(10);

pub struct ScopeController {
    cluster: ClusterClient,
    state: AppState,
}

impl ScopeController {
    pub fn new(cluster: ClusterClient, state: AppState) -> Self {
        Self { cluster, state }
    }

    /// Run the sync loop until shutdown.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            config_map = APPLY_SCOPE_CONFIG_MAP,
            namespace = SYSTEM_NAMESPACE,
            "apply-scope controller started"
        );
        loop {
            let delay = match self.sync_once().await {
                Ok(()) => SYNC_INTERVAL,
                Err(()) => ERROR_BACKOFF,
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("apply-scope controller shutting down");
                        return;
                    }
                }
            }
        }
    }

    async fn sync_once(&self) -> Result<(), ()> {
        match self
            .cluster
            .get_config_map(SYSTEM_NAMESPACE, APPLY_SCOPE_CONFIG_MAP)
            .await
        {
            Ok(config_map) => {
                let namespaces = parse_apply_scope(&config_map.data);
                debug!(entries = namespaces.len(), "apply-scope snapshot updated");
                self.state.update_scope(namespaces);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("apply-scope config map absent, clearing snapshot");
                self.state.update_scope(HashMap::new());
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to sync apply-scope config map");
                Err(())
            }
        }
    }
}
