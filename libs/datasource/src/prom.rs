//! Prometheus adapter.
//!
//! The builder renders PromQL from the metric namer: node utilization
//! names map onto node-exporter expressions (or same-named recording
//! rules), pod/container resource names onto cAdvisor series, and promql
//! metrics pass their expression through untouched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::debug;

use housekeeper_metricquery::{
    builder_for, register_builder, Metric, MetricError, MetricSource, MetricType, PromQuery,
    Query, QueryBuilder, TimeSeries,
};

use crate::config::PromConfig;
use crate::error::DataSourceError;
use crate::names;
use crate::{prune_series, DataSource};

pub struct PromProvider {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    permits: Arc<Semaphore>,
    max_points_per_series: usize,
}

impl PromProvider {
    pub fn new(config: &PromConfig) -> Result<Self, DataSourceError> {
        register_builder(MetricSource::Prom, |metric| {
            Box::new(PromQueryBuilder {
                metric: metric.clone(),
            })
        });

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.address.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            max_points_per_series: config.max_points_per_series,
        })
    }

    fn render_query(metric: &Metric) -> Result<String, DataSourceError> {
        match builder_for(MetricSource::Prom, metric)?.build_query()? {
            Query::Prom(PromQuery { query }) => Ok(query),
            other => Err(DataSourceError::Parse(format!(
                "prom builder produced a non-prom query: {other:?}"
            ))),
        }
    }

    async fn fetch(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<TimeSeries>, DataSourceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("semaphore closed");

        let url = format!("{}{}", self.base_url, path);
        let request = self.http.get(&url).query(params).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| DataSourceError::Timeout {
                metric_source: MetricSource::Prom,
                timeout_secs: self.timeout.as_secs(),
            })??;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DataSourceError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: PromResponse = response
            .json()
            .await
            .map_err(|e| DataSourceError::Parse(e.to_string()))?;
        if body.status != "success" {
            return Err(DataSourceError::Upstream {
                status: 200,
                message: body.error.unwrap_or_else(|| "query failed".to_string()),
            });
        }

        let mut series = body
            .data
            .map(|data| data.into_time_series())
            .unwrap_or_default();
        for s in &mut series {
            if s.samples.len() > self.max_points_per_series {
                let excess = s.samples.len() - self.max_points_per_series;
                s.samples.drain(..excess);
            }
        }
        Ok(prune_series(series))
    }
}

#[async_trait]
impl DataSource for PromProvider {
    async fn query_time_series(
        &self,
        metric: &Metric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<TimeSeries>, DataSourceError> {
        let query = Self::render_query(metric)?;
        debug!(%query, %start, %end, step_secs = step.as_secs(), "prom range query");
        self.fetch(
            "/api/v1/query_range",
            &[
                ("query", query),
                ("start", start.timestamp().to_string()),
                ("end", end.timestamp().to_string()),
                ("step", format!("{}s", step.as_secs().max(1))),
            ],
        )
        .await
    }

    async fn query_latest_time_series(
        &self,
        metric: &Metric,
    ) -> Result<Vec<TimeSeries>, DataSourceError> {
        let query = Self::render_query(metric)?;
        debug!(%query, "prom instant query");
        self.fetch("/api/v1/query", &[("query", query)]).await
    }
}

struct PromQueryBuilder {
    metric: Metric,
}

impl QueryBuilder for PromQueryBuilder {
    fn build_query(&self) -> Result<Query, MetricError> {
        self.metric.validate()?;
        let query = match self.metric.metric_type {
            MetricType::PromQl => self
                .metric
                .promql
                .as_ref()
                .map(|p| p.query_expr.clone())
                .unwrap_or_default(),
            MetricType::Node => {
                let node = self.metric.node.as_ref().map(|n| n.name.as_str()).unwrap_or_default();
                node_query(&self.metric.name, node)
            }
            MetricType::Pod => {
                let pod = self.metric.pod.as_ref().expect("validated");
                entity_resource_query(&self.metric.name, &pod.namespace, &format!("pod=\"{}\"", pod.name))
            }
            MetricType::Container => {
                let container = self.metric.container.as_ref().expect("validated");
                entity_resource_query(
                    &self.metric.name,
                    &container.namespace,
                    &format!(
                        "pod=~\"{}-.*\",container=\"{}\"",
                        container.workload_name, container.container_name
                    ),
                )
            }
            MetricType::Workload => {
                let workload = self.metric.workload.as_ref().expect("validated");
                entity_resource_query(
                    &self.metric.name,
                    &workload.namespace,
                    &format!("pod=~\"{}-.*\"", workload.name),
                )
            }
        };
        Ok(Query::Prom(PromQuery { query }))
    }
}

fn instance_matcher(node: &str) -> String {
    format!("instance=~\"^{node}.*\"")
}

/// PromQL for the well-known node utilization metrics; anything else is
/// assumed to be a recording rule of the same name.
fn node_query(metric_name: &str, node: &str) -> String {
    let instance = instance_matcher(node);
    let cpu_avg_5m = format!(
        "100 - (avg by (instance) (irate(node_cpu_seconds_total{{mode=\"idle\",{instance}}}[5m])) * 100)"
    );
    let mem_used = format!(
        "(1 - node_memory_MemAvailable_bytes{{{instance}}} / node_memory_MemTotal_bytes{{{instance}}}) * 100"
    );
    match metric_name {
        names::METRIC_CPU_USAGE_PERCENT | names::METRIC_CPU_USAGE_AVG_5M => cpu_avg_5m,
        names::METRIC_CPU_USAGE_MAX_AVG_1H => format!("max_over_time(({cpu_avg_5m})[1h:5m])"),
        names::METRIC_CPU_USAGE_MAX_AVG_1D => format!("max_over_time(({cpu_avg_5m})[1d:5m])"),
        names::METRIC_MEM_USAGE_PERCENT => mem_used,
        names::METRIC_MEM_USAGE_AVG_5M => format!("avg_over_time(({mem_used})[5m:30s])"),
        names::METRIC_MEM_USAGE_MAX_AVG_1H => format!("max_over_time(({mem_used})[1h:5m])"),
        names::METRIC_MEM_USAGE_MAX_AVG_1D => format!("max_over_time(({mem_used})[1d:5m])"),
        other => format!("{other}{{{instance}}}"),
    }
}

/// cAdvisor series for pod/container/workload cpu and memory.
fn entity_resource_query(metric_name: &str, namespace: &str, matcher: &str) -> String {
    if metric_name.contains("cpu") {
        format!(
            "sum(irate(container_cpu_usage_seconds_total{{namespace=\"{namespace}\",{matcher}}}[5m]))"
        )
    } else {
        format!(
            "sum(container_memory_working_set_bytes{{namespace=\"{namespace}\",{matcher}}})"
        )
    }
}

#[derive(Debug, Deserialize)]
struct PromResponse {
    status: String,
    #[serde(default)]
    data: Option<PromData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromData {
    #[serde(default)]
    result: Vec<PromResult>,
}

#[derive(Debug, Deserialize)]
struct PromResult {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    /// Instant vector: `[ts, "value"]`.
    #[serde(default)]
    value: Option<(f64, String)>,
    /// Range matrix: `[[ts, "value"], ...]`.
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl PromData {
    fn into_time_series(self) -> Vec<TimeSeries> {
        self.result
            .into_iter()
            .map(|result| {
                let mut series = TimeSeries::new();
                for (name, value) in result.metric {
                    series = series.with_label(&name, &value);
                }
                let pairs = match result.value {
                    Some(single) => vec![single],
                    None => result.values,
                };
                for (ts, raw) in pairs {
                    // Absent values surface as unparseable strings; drop
                    // the sample, not the query.
                    if let Ok(value) = raw.parse::<f64>() {
                        series.push_sample(ts as i64, value);
                    }
                }
                series
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use housekeeper_metricquery::{node_metric, promql_metric};

    #[test]
    fn node_cpu_template() {
        let query = node_query(names::METRIC_CPU_USAGE_AVG_5M, "node-1");
        assert!(query.contains("node_cpu_seconds_total"));
        assert!(query.contains("instance=~\"^node-1.*\""));
    }

    #[test]
    fn unknown_node_metric_falls_back_to_recording_rule() {
        let query = node_query("disk_io_util", "node-1");
        assert_eq!(query, "disk_io_util{instance=~\"^node-1.*\"}");
    }

    #[test]
    fn promql_passthrough() {
        let metric = promql_metric("", "up_ratio", "sum(up) / count(up)");
        let builder = PromQueryBuilder { metric };
        let Query::Prom(prom) = builder.build_query().unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(prom.query, "sum(up) / count(up)");
    }

    #[test]
    fn builder_registration_through_provider() {
        let provider = PromProvider::new(&PromConfig::default()).unwrap();
        drop(provider);
        let metric = node_metric("", "node-1", "", "", names::METRIC_MEM_USAGE_AVG_5M);
        let query = PromProvider::render_query(&metric).unwrap();
        assert!(query.contains("node_memory_MemAvailable_bytes"));
    }

    #[test]
    fn response_parsing_drops_bad_samples() {
        let raw = serde_json::json!({
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [
                    {
                        "metric": {"instance": "node-1"},
                        "values": [[1700000000.0, "30"], [1700000060.0, "NaN"], [1700000120.0, "31.5"]]
                    },
                    {
                        "metric": {"instance": "node-2"},
                        "values": [[1700000000.0, "NaN"]]
                    }
                ]
            }
        });
        let response: PromResponse = serde_json::from_value(raw).unwrap();
        let series = prune_series(response.data.unwrap().into_time_series());
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].samples.len(), 2);
        assert_eq!(series[0].samples[1].value, 31.5);
    }
}
