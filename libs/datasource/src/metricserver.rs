//! Metrics-server adapter (realtime only).
//!
//! Resource metrics ride the `metrics.k8s.io` API; metric names
//! containing `cpu` select the CPU quantity, everything else selects
//! memory. Names outside the resource family resolve through the custom
//! metrics API. History queries are unsupported by this source.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use housekeeper_cluster::ClusterClient;
use housekeeper_metricquery::{
    register_builder, Metric, MetricServerQuery, MetricSource, MetricType, Query, QueryBuilder,
    TimeSeries, LABEL_NODE, LABEL_POD_NAME,
};

use crate::error::DataSourceError;
use crate::{prune_series, DataSource};

pub struct MetricServerProvider {
    cluster: ClusterClient,
}

impl MetricServerProvider {
    pub fn new(cluster: ClusterClient) -> Self {
        register_builder(MetricSource::MetricServer, |metric| {
            Box::new(PassthroughBuilder {
                metric: metric.clone(),
            })
        });
        Self { cluster }
    }

    fn is_resource_metric(name: &str) -> bool {
        name.contains("cpu") || name.contains("mem")
    }

    async fn node_metrics(&self, metric: &Metric) -> Result<Vec<TimeSeries>, DataSourceError> {
        let node = metric.node.as_ref().expect("validated");
        if Self::is_resource_metric(&metric.name) {
            let usage: NodeMetrics = self
                .cluster
                .get_json(&format!("/apis/metrics.k8s.io/v1beta1/nodes/{}", node.name))
                .await
                .map_err(to_source_error)?;
            let quantity = usage.pick(&metric.name)?;
            let mut series = TimeSeries::new().with_label(LABEL_NODE, &node.name);
            series.push_sample(usage.timestamp.timestamp(), quantity);
            Ok(prune_series(vec![series]))
        } else {
            let list: MetricValueList = self
                .cluster
                .get_json(&format!(
                    "/apis/custom.metrics.k8s.io/v1beta1/nodes/{}/{}",
                    node.name, metric.name
                ))
                .await
                .map_err(to_source_error)?;
            Ok(prune_series(list.into_time_series(LABEL_NODE, &node.name)))
        }
    }

    async fn pod_metrics(&self, metric: &Metric) -> Result<Vec<TimeSeries>, DataSourceError> {
        let pod = metric.pod.as_ref().expect("validated");
        if Self::is_resource_metric(&metric.name) {
            let usage: PodMetrics = self
                .cluster
                .get_json(&format!(
                    "/apis/metrics.k8s.io/v1beta1/namespaces/{}/pods/{}",
                    pod.namespace, pod.name
                ))
                .await
                .map_err(to_source_error)?;
            let total: f64 = usage
                .containers
                .iter()
                .map(|c| c.pick(&metric.name).unwrap_or(0.0))
                .sum();
            let mut series = TimeSeries::new().with_label(LABEL_POD_NAME, &pod.name);
            series.push_sample(usage.timestamp.timestamp(), total);
            Ok(prune_series(vec![series]))
        } else {
            let list: MetricValueList = self
                .cluster
                .get_json(&format!(
                    "/apis/custom.metrics.k8s.io/v1beta1/namespaces/{}/pods/{}/{}",
                    pod.namespace, pod.name, metric.name
                ))
                .await
                .map_err(to_source_error)?;
            Ok(prune_series(list.into_time_series(LABEL_POD_NAME, &pod.name)))
        }
    }
}

#[async_trait]
impl DataSource for MetricServerProvider {
    async fn query_time_series(
        &self,
        _metric: &Metric,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _step: Duration,
    ) -> Result<Vec<TimeSeries>, DataSourceError> {
        Err(DataSourceError::Unsupported {
            metric_source: MetricSource::MetricServer,
            capability: "history queries",
        })
    }

    async fn query_latest_time_series(
        &self,
        metric: &Metric,
    ) -> Result<Vec<TimeSeries>, DataSourceError> {
        metric.validate()?;
        debug!(metric = %metric.name, metric_type = %metric.metric_type, "metrics-server realtime query");
        match metric.metric_type {
            MetricType::Node => self.node_metrics(metric).await,
            MetricType::Pod => self.pod_metrics(metric).await,
            _ => Err(DataSourceError::Unsupported {
                metric_source: MetricSource::MetricServer,
                capability: "workload/container/promql metrics",
            }),
        }
    }
}

fn to_source_error(err: housekeeper_cluster::ClusterError) -> DataSourceError {
    match err {
        housekeeper_cluster::ClusterError::Api { status, message } => {
            DataSourceError::Upstream { status, message }
        }
        other => DataSourceError::Parse(other.to_string()),
    }
}

struct PassthroughBuilder {
    metric: Metric,
}

impl QueryBuilder for PassthroughBuilder {
    fn build_query(&self) -> Result<Query, housekeeper_metricquery::MetricError> {
        self.metric.validate()?;
        Ok(Query::MetricServer(MetricServerQuery {
            metric: self.metric.clone(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct NodeMetrics {
    timestamp: DateTime<Utc>,
    usage: BTreeMap<String, String>,
}

impl NodeMetrics {
    fn pick(&self, metric_name: &str) -> Result<f64, DataSourceError> {
        let resource = if metric_name.contains("cpu") { "cpu" } else { "memory" };
        let raw = self
            .usage
            .get(resource)
            .ok_or_else(|| DataSourceError::NoData(resource.to_string()))?;
        parse_quantity(raw)
    }
}

#[derive(Debug, Deserialize)]
struct PodMetrics {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    containers: Vec<ContainerMetrics>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetrics {
    #[serde(default)]
    usage: BTreeMap<String, String>,
}

impl ContainerMetrics {
    fn pick(&self, metric_name: &str) -> Result<f64, DataSourceError> {
        let resource = if metric_name.contains("cpu") { "cpu" } else { "memory" };
        let raw = self
            .usage
            .get(resource)
            .ok_or_else(|| DataSourceError::NoData(resource.to_string()))?;
        parse_quantity(raw)
    }
}

/// Custom-metrics API response.
#[derive(Debug, Deserialize)]
struct MetricValueList {
    #[serde(default)]
    items: Vec<MetricValue>,
}

#[derive(Debug, Deserialize)]
struct MetricValue {
    timestamp: DateTime<Utc>,
    value: String,
}

impl MetricValueList {
    fn into_time_series(self, label: &str, entity: &str) -> Vec<TimeSeries> {
        let mut series = TimeSeries::new().with_label(label, entity);
        for item in self.items {
            if let Ok(value) = parse_quantity(&item.value) {
                series.push_sample(item.timestamp.timestamp(), value);
            }
        }
        vec![series]
    }
}

/// Parse a Kubernetes resource quantity into a float.
///
/// Handles the binary (`Ki`, `Mi`, ...) and decimal (`k`, `M`, ...)
/// suffixes plus the milli suffix used for CPU.
pub fn parse_quantity(raw: &str) -> Result<f64, DataSourceError> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| DataSourceError::Parse(format!("bad quantity {raw:?}")))?;

    let multiplier: f64 = match suffix {
        "" => 1.0,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        other => {
            return Err(DataSourceError::Parse(format!(
                "unknown quantity suffix {other:?} in {raw:?}"
            )))
        }
    };
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity("250m").unwrap(), 0.25);
        assert_eq!(parse_quantity("2").unwrap(), 2.0);
        assert_eq!(parse_quantity("1536Mi").unwrap(), 1536.0 * 1024.0 * 1024.0);
        assert_eq!(parse_quantity("4Ki").unwrap(), 4096.0);
        assert_eq!(parse_quantity("1k").unwrap(), 1000.0);
        assert!(parse_quantity("12x").is_err());
        assert!(parse_quantity("").is_err());
    }

    #[test]
    fn node_metrics_pick_by_substring() {
        let usage: NodeMetrics = serde_json::from_value(serde_json::json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "usage": {"cpu": "1500m", "memory": "2048Ki"}
        }))
        .unwrap();
        assert_eq!(usage.pick("cpu_usage_avg_5m").unwrap(), 1.5);
        assert_eq!(usage.pick("mem_usage_avg_5m").unwrap(), 2048.0 * 1024.0);
    }
}
