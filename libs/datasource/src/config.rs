//! Data-source selection and per-source connection parameters.
//!
//! The `datasource` config field picks exactly one variant; unknown
//! variants fail at startup instead of at first query.

use serde::{Deserialize, Serialize};

/// Tagged union of per-source configuration blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataSourceConfig {
    Prom(PromConfig),
    MetricServer(MetricServerConfig),
    #[serde(rename = "qmonitor")]
    CloudMonitor(CloudMonitorConfig),
}

/// Prometheus connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PromConfig {
    /// Base URL of the Prometheus HTTP API.
    pub address: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum concurrent outbound queries.
    pub max_in_flight: usize,
    /// Hard cap on points per returned series.
    pub max_points_per_series: usize,
}

impl Default for PromConfig {
    fn default() -> Self {
        Self {
            address: "http://prometheus-server".to_string(),
            timeout_secs: 3 * 60,
            max_in_flight: 10,
            max_points_per_series: 11000,
        }
    }
}

/// Metrics-server parameters; requests ride the cluster API client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricServerConfig {}

/// Cloud-monitor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CloudMonitorConfig {
    pub cluster_id: String,
    pub app_id: String,
    /// Static credentials; empty when the metadata service is used.
    pub secret_id: String,
    pub secret_key: String,
    pub region: String,
    pub domain_suffix: String,
    pub scheme: String,
    pub default_timeout_seconds: u64,
    pub default_limit: u64,
    pub default_language: String,
    pub debug: bool,
    /// Maximum concurrent outbound queries.
    pub max_in_flight: usize,
}

impl Default for CloudMonitorConfig {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            app_id: String::new(),
            secret_id: String::new(),
            secret_key: String::new(),
            region: String::new(),
            domain_suffix: "tencentcloudapi.com".to_string(),
            scheme: "https".to_string(),
            default_timeout_seconds: 15,
            default_limit: 100,
            default_language: "zh-CN".to_string(),
            debug: false,
            max_in_flight: 10,
        }
    }
}

impl CloudMonitorConfig {
    /// Backfill zero/empty fields with the documented defaults.
    pub fn fill_defaults(&mut self) {
        let defaults = Self::default();
        if self.default_timeout_seconds == 0 {
            self.default_timeout_seconds = defaults.default_timeout_seconds;
        }
        if self.default_language.is_empty() {
            self.default_language = defaults.default_language;
        }
        if self.default_limit == 0 {
            self.default_limit = defaults.default_limit;
        }
        if self.domain_suffix.is_empty() {
            self.domain_suffix = defaults.domain_suffix;
        }
        if self.scheme.is_empty() {
            self.scheme = defaults.scheme;
        }
        if self.max_in_flight == 0 {
            self.max_in_flight = defaults.max_in_flight;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_selection() {
        let raw = serde_json::json!({"type": "prom", "address": "http://prom:9090"});
        let config: DataSourceConfig = serde_json::from_value(raw).unwrap();
        match config {
            DataSourceConfig::Prom(prom) => {
                assert_eq!(prom.address, "http://prom:9090");
                assert_eq!(prom.timeout_secs, 180);
            }
            other => panic!("wrong variant {other:?}"),
        }
    }

    #[test]
    fn qmonitor_alias() {
        let raw = serde_json::json!({"type": "qmonitor", "clusterId": "cls-1"});
        let config: DataSourceConfig = serde_json::from_value(raw).unwrap();
        assert!(matches!(config, DataSourceConfig::CloudMonitor(_)));
    }

    #[test]
    fn unknown_variant_rejected() {
        let raw = serde_json::json!({"type": "graphite"});
        assert!(serde_json::from_value::<DataSourceConfig>(raw).is_err());
    }

    #[test]
    fn cloud_monitor_fill_defaults() {
        let mut config = CloudMonitorConfig {
            default_timeout_seconds: 0,
            domain_suffix: String::new(),
            ..Default::default()
        };
        config.fill_defaults();
        assert_eq!(config.default_timeout_seconds, 15);
        assert_eq!(config.domain_suffix, "tencentcloudapi.com");
        assert_eq!(config.scheme, "https");
    }
}
