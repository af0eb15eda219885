//! Lease-based leader election.
//!
//! A single coordination lease gates the annotator's write path. Losing
//! the lease after having held it is fatal: the process panics and the
//! supervising orchestrator restarts it, which is cheaper and safer than
//! trying to unwind half-finished controllers in place.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::ClusterClient;
use crate::error::ClusterError;

/// Leader-election timing knobs.
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    pub namespace: String,
    pub name: String,
    /// Identity written into the lease (pod name + a suffix, typically).
    pub identity: String,
    pub lease_duration: Duration,
    pub renew_deadline: Duration,
    pub retry_period: Duration,
}

impl LeaseConfig {
    pub fn new(namespace: &str, name: &str, identity: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            identity: identity.to_string(),
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LeaseSpec {
    holder_identity: Option<String>,
    lease_duration_seconds: Option<i64>,
    acquire_time: Option<DateTime<Utc>>,
    renew_time: Option<DateTime<Utc>>,
    lease_transitions: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Lease {
    metadata: crate::objects::ObjectMeta,
    spec: LeaseSpec,
}

/// Acquires and renews a coordination lease.
pub struct LeaderElector {
    client: ClusterClient,
    config: LeaseConfig,
}

impl LeaderElector {
    pub fn new(client: ClusterClient, config: LeaseConfig) -> Self {
        Self { client, config }
    }

    fn lease_path(&self) -> String {
        format!(
            "/apis/coordination.k8s.io/v1/namespaces/{}/leases/{}",
            self.config.namespace, self.config.name
        )
    }

    /// Block until the lease is held by this process.
    pub async fn acquire(&self) -> Result<(), ClusterError> {
        loop {
            match self.try_acquire().await {
                Ok(true) => {
                    info!(
                        lease = %self.config.name,
                        identity = %self.config.identity,
                        "acquired leader lease"
                    );
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "lease acquire attempt failed, retrying");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.config.retry_period).await;
        }
    }

    async fn try_acquire(&self) -> Result<bool, ClusterError> {
        let existing: Result<Lease, _> = self.client.get_json(&self.lease_path()).await;
        match existing {
            Ok(lease) => {
                let holder = lease.spec.holder_identity.clone().unwrap_or_default();
                if holder == self.config.identity || is_expired(&lease.spec, Utc::now()) {
                    self.write_lease(Some(lease)).await?;
                    return Ok(true);
                }
                Ok(false)
            }
            Err(e) if e.is_not_found() => {
                self.write_lease(None).await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn write_lease(&self, existing: Option<Lease>) -> Result<(), ClusterError> {
        let now = Utc::now();
        let transitions = existing
            .as_ref()
            .and_then(|l| l.spec.lease_transitions)
            .unwrap_or(0);
        let changed_holder = existing
            .as_ref()
            .and_then(|l| l.spec.holder_identity.as_deref())
            != Some(self.config.identity.as_str());

        let spec = LeaseSpec {
            holder_identity: Some(self.config.identity.clone()),
            lease_duration_seconds: Some(self.config.lease_duration.as_secs() as i64),
            acquire_time: Some(now),
            renew_time: Some(now),
            lease_transitions: Some(transitions + i64::from(changed_holder)),
        };

        match existing {
            Some(mut lease) => {
                lease.spec = spec;
                let body = serde_json::json!({"spec": lease.spec});
                self.client
                    .merge_patch(&self.lease_path(), &body)
                    .await
            }
            None => {
                let lease = Lease {
                    metadata: crate::objects::ObjectMeta {
                        name: self.config.name.clone(),
                        namespace: self.config.namespace.clone(),
                        ..Default::default()
                    },
                    spec,
                };
                let path = format!(
                    "/apis/coordination.k8s.io/v1/namespaces/{}/leases",
                    self.config.namespace
                );
                self.client.post_json(&path, &lease).await
            }
        }
    }

    /// Renew forever; panics on leader loss.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.retry_period);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.renew().await {
                        Ok(()) => {}
                        Err(e) if e.is_transient() => {
                            warn!(error = %e, "lease renew failed, will retry");
                        }
                        Err(e) => {
                            panic!("lost leader lease {}: {e}", self.config.name);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("leader elector shutting down");
                        return;
                    }
                }
            }
        }
    }

    async fn renew(&self) -> Result<(), ClusterError> {
        let lease: Lease = self.client.get_json(&self.lease_path()).await?;
        let holder = lease.spec.holder_identity.clone().unwrap_or_default();
        if holder != self.config.identity {
            return Err(ClusterError::Api {
                status: 409,
                message: format!("lease held by {holder}"),
            });
        }
        self.write_lease(Some(lease)).await
    }
}

/// A lease is expired when its renew time plus duration is in the past.
fn is_expired(spec: &LeaseSpec, now: DateTime<Utc>) -> bool {
    let Some(renew) = spec.renew_time else {
        return true;
    };
    let duration = spec.lease_duration_seconds.unwrap_or(15);
    renew + chrono::Duration::seconds(duration) < now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_renew_time_counts_as_expired() {
        let spec = LeaseSpec::default();
        assert!(is_expired(&spec, Utc::now()));
    }

    #[test]
    fn fresh_lease_not_expired() {
        let spec = LeaseSpec {
            renew_time: Some(Utc::now()),
            lease_duration_seconds: Some(15),
            ..Default::default()
        };
        assert!(!is_expired(&spec, Utc::now()));
    }

    #[test]
    fn stale_lease_expired() {
        let spec = LeaseSpec {
            renew_time: Some(Utc::now() - chrono::Duration::seconds(60)),
            lease_duration_seconds: Some(15),
            ..Default::default()
        };
        assert!(is_expired(&spec, Utc::now()));
    }
}
