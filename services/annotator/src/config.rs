//! Annotator configuration, loaded from the environment.

use anyhow::{Context, Result};

use housekeeper_datasource::{CloudMonitorConfig, DataSourceConfig, MetricServerConfig, PromConfig};
use housekeeper_metricquery::MetricSource;
use housekeeper_policy::SYSTEM_NAMESPACE;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the scheduling policy file.
    pub policy_path: String,

    /// Capacity of the binding-record window.
    pub binding_heap_size: usize,

    /// Worker threads per controller queue.
    pub concurrent_syncs: usize,

    /// Which metrics backend to use.
    pub datasource: DataSourceConfig,

    /// Cluster id folded into metric namers (cloud monitor needs it).
    pub cluster_id: String,

    /// Leader-election lease name; held in the system namespace.
    pub lease_name: String,
    pub lease_namespace: String,

    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let policy_path = std::env::var("HOUSEKEEPER_POLICY_FILE")
            .unwrap_or_else(|_| "/etc/housekeeper/policy.yaml".to_string());

        let binding_heap_size = std::env::var("HOUSEKEEPER_BINDING_HEAP_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1024);

        let concurrent_syncs = std::env::var("HOUSEKEEPER_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);

        let cluster_id = std::env::var("HOUSEKEEPER_CLUSTER_ID").unwrap_or_default();

        let source: MetricSource = std::env::var("HOUSEKEEPER_DATASOURCE")
            .unwrap_or_else(|_| "prom".to_string())
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let datasource = match source {
            MetricSource::Prom => {
                let mut prom = PromConfig::default();
                if let Ok(address) = std::env::var("HOUSEKEEPER_PROM_ADDRESS") {
                    prom.address = address;
                }
                if let Some(timeout) = std::env::var("HOUSEKEEPER_PROM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                {
                    prom.timeout_secs = timeout;
                }
                DataSourceConfig::Prom(prom)
            }
            MetricSource::MetricServer => DataSourceConfig::MetricServer(MetricServerConfig::default()),
            MetricSource::CloudMonitor => {
                let path = std::env::var("HOUSEKEEPER_CLOUD_CONFIG")
                    .unwrap_or_else(|_| "/etc/housekeeper/qmonitor.json".to_string());
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading cloud monitor config {path}"))?;
                let mut monitor: CloudMonitorConfig = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing cloud monitor config {path}"))?;
                monitor.fill_defaults();
                if monitor.cluster_id.is_empty() {
                    monitor.cluster_id = cluster_id.clone();
                }
                DataSourceConfig::CloudMonitor(monitor)
            }
        };

        let lease_name = std::env::var("HOUSEKEEPER_LEASE_NAME")
            .unwrap_or_else(|_| "housekeeper-annotator".to_string());
        let lease_namespace = std::env::var("HOUSEKEEPER_LEASE_NAMESPACE")
            .unwrap_or_else(|_| SYSTEM_NAMESPACE.to_string());

        let log_level = std::env::var("HOUSEKEEPER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            policy_path,
            binding_heap_size,
            concurrent_syncs,
            datasource,
            cluster_id,
            lease_name,
            lease_namespace,
            log_level,
        })
    }
}
