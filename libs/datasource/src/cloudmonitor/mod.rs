//! Cloud-monitor adapter.
//!
//! The upstream monitor exposes pre-aggregated series addressed by a
//! metric id plus dimension conditions. The adapter's job is the part
//! the upstream gets wrong or leaves to the caller:
//!
//! - required-dimension checks per entity type, rejected before any
//!   upstream request
//! - rewriting `(start, end, step)` for the long-window node metrics to
//!   the metric's native aggregation window, requesting exactly two
//!   windows
//! - scaling memory-family values from MiB to bytes
//! - dropping points whose value is absent even though a timestamp is
//!   present

mod credential;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;

use housekeeper_metricquery::{
    builder_for, register_builder, CloudMonitorQuery, Label, Metric, MetricSource, MetricType,
    Operator, Query, QueryBuilder, QueryCondition, TimeSeries, LABEL_CLUSTER_ID,
    LABEL_CONTAINER_NAME, LABEL_NAMESPACE, LABEL_NODE, LABEL_NODE_ROLE, LABEL_POD_NAME,
    LABEL_WORKLOAD_NAME,
};

use crate::config::CloudMonitorConfig;
use crate::error::DataSourceError;
use crate::names;
use crate::{prune_series, DataSource};

pub use credential::{Credential, NormCredential};

const DEFAULT_STEP: Duration = Duration::from_secs(60);

// Upstream metric ids.
const M_NODE_CPU_USAGE: &str = "k8s_node_cpu_usage";
const M_NODE_MEM_USAGE: &str = "k8s_node_mem_usage";
const M_NODE_CPU_USAGE_AVG_5M: &str = "k8s_node_cpu_usage_avg_5m";
const M_NODE_MEM_USAGE_AVG_5M: &str = "k8s_node_mem_usage_avg_5m";
const M_NODE_CPU_USAGE_MAX_AVG_1H: &str = "k8s_node_cpu_usage_max_avg_1h";
const M_NODE_MEM_USAGE_MAX_AVG_1H: &str = "k8s_node_mem_usage_max_avg_1h";
const M_NODE_CPU_USAGE_MAX_AVG_1D: &str = "k8s_node_cpu_usage_max_avg_1d";
const M_NODE_MEM_USAGE_MAX_AVG_1D: &str = "k8s_node_mem_usage_max_avg_1d";
const M_POD_CPU_CORE_USED: &str = "k8s_pod_cpu_core_used";
const M_POD_MEM_USAGE_BYTES: &str = "k8s_pod_mem_usage_bytes";
const M_CONTAINER_CPU_CORE_USED: &str = "k8s_container_cpu_core_used";
const M_CONTAINER_MEM_USAGE_BYTES: &str = "k8s_container_mem_usage_bytes";
const M_WORKLOAD_CPU_CORE_USED: &str = "k8s_workload_cpu_core_used";
const M_WORKLOAD_MEM_USAGE_BYTES: &str = "k8s_workload_mem_usage_bytes";
const M_WORKLOAD_REPLICAS: &str = "k8s_workload_replicas";

/// Metrics the upstream reports in MiB; scaled to bytes on the way out.
fn is_memory_family(metric_id: &str) -> bool {
    matches!(
        metric_id,
        M_POD_MEM_USAGE_BYTES
            | M_CONTAINER_MEM_USAGE_BYTES
            | M_WORKLOAD_MEM_USAGE_BYTES
    )
}

/// The upstream monitor API, abstracted for testing; the real transport
/// lives behind this trait.
#[async_trait]
pub trait MonitorApi: Send + Sync {
    async fn describe_statistic_data(
        &self,
        param: &GetDataParam,
    ) -> Result<GetDataResult, DataSourceError>;
}

/// Upstream request shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetDataParam {
    pub module: String,
    pub namespace: String,
    pub metric_names: Vec<String>,
    pub conditions: Vec<GetDataCondition>,
    pub start_time: String,
    pub end_time: String,
    pub period: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetDataCondition {
    pub key: String,
    pub operator: String,
    pub value: Vec<String>,
}

/// Upstream response shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GetDataResult {
    pub data: Vec<MetricData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MetricData {
    pub metric_name: String,
    pub points: Vec<MetricPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MetricPoint {
    pub dimensions: Vec<Dimension>,
    pub values: Vec<PointValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PointValue {
    pub timestamp: Option<i64>,
    pub value: Option<f64>,
}

/// Reqwest-backed monitor transport.
pub struct HttpMonitorApi {
    http: reqwest::Client,
    endpoint: String,
    region: String,
    credential: Arc<NormCredential>,
    timeout: Duration,
}

#[async_trait]
impl MonitorApi for HttpMonitorApi {
    async fn describe_statistic_data(
        &self,
        param: &GetDataParam,
    ) -> Result<GetDataResult, DataSourceError> {
        let credential = self.credential.credential().await?;
        let request = self
            .http
            .post(&self.endpoint)
            .header("X-TC-Action", "DescribeStatisticData")
            .header("X-TC-Region", &self.region)
            .header("X-TC-Token", &credential.token)
            .header("X-TC-SecretId", &credential.secret_id)
            .json(param)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| DataSourceError::Timeout {
                metric_source: MetricSource::CloudMonitor,
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
        response
            .json::<MonitorEnvelope>()
            .await
            .map(|envelope| envelope.response)
            .map_err(|e| DataSourceError::Parse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct MonitorEnvelope {
    #[serde(rename = "Response", default)]
    response: GetDataResult,
}

pub struct CloudMonitorProvider {
    api: Arc<dyn MonitorApi>,
    permits: Arc<Semaphore>,
    step: Duration,
}

impl CloudMonitorProvider {
    pub fn new(config: &CloudMonitorConfig) -> Self {
        let mut config = config.clone();
        config.fill_defaults();

        let credential = Arc::new(NormCredential::new(
            &config.cluster_id,
            &config.app_id,
            Duration::from_secs(3600),
        ));
        if !config.secret_id.is_empty() {
            credential.set_static(
                Credential {
                    secret_id: config.secret_id.clone(),
                    secret_key: config.secret_key.clone(),
                    token: String::new(),
                },
                None,
            );
        }

        let api = Arc::new(HttpMonitorApi {
            http: reqwest::Client::new(),
            endpoint: format!("{}://monitor.{}", config.scheme, config.domain_suffix),
            region: config.region.clone(),
            credential,
            timeout: Duration::from_secs(config.default_timeout_seconds),
        });
        Self::with_api(api, &config)
    }

    /// Construct over an arbitrary transport (tests use a mock).
    pub fn with_api(api: Arc<dyn MonitorApi>, config: &CloudMonitorConfig) -> Self {
        register_builder(MetricSource::CloudMonitor, |metric| {
            Box::new(PassthroughBuilder {
                metric: metric.clone(),
            })
        });
        Self {
            api,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            step: DEFAULT_STEP,
        }
    }

    async fn query(
        &self,
        metric: &Metric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<TimeSeries>, DataSourceError> {
        let rendered = match builder_for(MetricSource::CloudMonitor, metric)?.build_query()? {
            Query::CloudMonitor(CloudMonitorQuery { metric }) => metric,
            other => {
                return Err(DataSourceError::Parse(format!(
                    "cloud monitor builder produced {other:?}"
                )))
            }
        };

        let (metric_id, conditions) = translate(&rendered)?;
        let (start, end, step) = match rendered.metric_type {
            MetricType::Node => rewrite_node_window(&rendered.name, start, end, step),
            _ => (start, end, step),
        };

        let param = GetDataParam {
            module: "monitor".to_string(),
            namespace: "QCE/TKE2".to_string(),
            metric_names: vec![metric_id.to_string()],
            conditions: conditions.iter().map(GetDataCondition::from).collect(),
            start_time: start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            end_time: end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            period: step.as_secs(),
        };

        let _permit = self.permits.acquire().await.expect("semaphore closed");
        debug!(metric = metric_id, period = param.period, "cloud monitor query");
        let result = self.api.describe_statistic_data(&param).await?;
        Ok(prune_series(convert(metric_id, result)))
    }
}

#[async_trait]
impl DataSource for CloudMonitorProvider {
    async fn query_time_series(
        &self,
        metric: &Metric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<TimeSeries>, DataSourceError> {
        self.query(metric, start, end, step).await
    }

    async fn query_latest_time_series(
        &self,
        metric: &Metric,
    ) -> Result<Vec<TimeSeries>, DataSourceError> {
        let end = Utc::now();
        let start = end - chrono::Duration::from_std(self.step).expect("step fits");
        self.query(metric, start, end, self.step).await
    }
}

struct PassthroughBuilder {
    metric: Metric,
}

impl QueryBuilder for PassthroughBuilder {
    fn build_query(&self) -> Result<Query, housekeeper_metricquery::MetricError> {
        self.metric.validate()?;
        Ok(Query::CloudMonitor(CloudMonitorQuery {
            metric: self.metric.clone(),
        }))
    }
}

// Upstream dimension names.
const DIM_CLUSTER_ID: &str = "tke_cluster_instance_id";
const DIM_NODE: &str = "node";
const DIM_NODE_ROLE: &str = "node_role";
const DIM_NAMESPACE: &str = "namespace";
const DIM_WORKLOAD_NAME: &str = "workload_name";
const DIM_CONTAINER_NAME: &str = "container_name";
const DIM_POD_NAME: &str = "pod_name";

/// Map a metric namer onto an upstream metric id plus conditions,
/// enforcing the required-dimension rules before anything leaves the
/// process.
fn translate(metric: &Metric) -> Result<(&'static str, Vec<QueryCondition>), DataSourceError> {
    let cluster_id = metric
        .selector_value(LABEL_CLUSTER_ID)
        .ok_or_else(|| DataSourceError::MissingLabel(LABEL_CLUSTER_ID.to_string()))?
        .to_string();

    match metric.metric_type {
        MetricType::Node => {
            let mut conditions = vec![condition(DIM_CLUSTER_ID, &cluster_id)];
            if let Some(role) = metric.selector_value(LABEL_NODE_ROLE) {
                conditions.push(condition(DIM_NODE_ROLE, role));
            }
            if let Some(node) = metric.selector_value(LABEL_NODE) {
                conditions.push(condition(DIM_NODE, node));
            }
            let id = match metric.name.as_str() {
                names::METRIC_CPU_USAGE_PERCENT => M_NODE_CPU_USAGE,
                names::METRIC_MEM_USAGE_PERCENT => M_NODE_MEM_USAGE,
                names::METRIC_CPU_USAGE_AVG_5M => M_NODE_CPU_USAGE_AVG_5M,
                names::METRIC_MEM_USAGE_AVG_5M => M_NODE_MEM_USAGE_AVG_5M,
                names::METRIC_CPU_USAGE_MAX_AVG_1H => M_NODE_CPU_USAGE_MAX_AVG_1H,
                names::METRIC_MEM_USAGE_MAX_AVG_1H => M_NODE_MEM_USAGE_MAX_AVG_1H,
                names::METRIC_CPU_USAGE_MAX_AVG_1D => M_NODE_CPU_USAGE_MAX_AVG_1D,
                names::METRIC_MEM_USAGE_MAX_AVG_1D => M_NODE_MEM_USAGE_MAX_AVG_1D,
                other => return Err(unsupported(other)),
            };
            Ok((id, conditions))
        }
        MetricType::Pod => {
            let pod = metric
                .selector_value(LABEL_POD_NAME)
                .ok_or_else(|| DataSourceError::MissingLabel(LABEL_POD_NAME.to_string()))?;
            let mut conditions = vec![
                condition(DIM_CLUSTER_ID, &cluster_id),
                condition(DIM_POD_NAME, pod),
            ];
            if let Some(namespace) = metric.selector_value(LABEL_NAMESPACE) {
                conditions.push(condition(DIM_NAMESPACE, namespace));
            }
            // Pod series need a narrowing dimension or the upstream fans
            // out to the whole cluster.
            let narrowed = metric.selector_value(LABEL_NODE).is_some()
                || metric.selector_value(LABEL_WORKLOAD_NAME).is_some();
            if let Some(node) = metric.selector_value(LABEL_NODE) {
                conditions.push(condition(DIM_NODE, node));
            }
            if let Some(workload) = metric.selector_value(LABEL_WORKLOAD_NAME) {
                conditions.push(condition(DIM_WORKLOAD_NAME, workload));
            }
            if !narrowed {
                return Err(DataSourceError::MissingLabel(format!(
                    "one of {LABEL_NODE}, {LABEL_WORKLOAD_NAME}"
                )));
            }
            let id = match pick_resource(&metric.name)? {
                Resource::Cpu => M_POD_CPU_CORE_USED,
                Resource::Memory => M_POD_MEM_USAGE_BYTES,
            };
            Ok((id, conditions))
        }
        MetricType::Container => {
            let required = [
                (LABEL_NAMESPACE, DIM_NAMESPACE),
                (LABEL_WORKLOAD_NAME, DIM_WORKLOAD_NAME),
                (LABEL_CONTAINER_NAME, DIM_CONTAINER_NAME),
            ];
            let mut conditions = vec![condition(DIM_CLUSTER_ID, &cluster_id)];
            let mut missing = BTreeSet::new();
            for (label, dim) in required {
                match metric.selector_value(label) {
                    Some(value) => conditions.push(condition(dim, value)),
                    None => {
                        missing.insert(label);
                    }
                }
            }
            if !missing.is_empty() {
                return Err(DataSourceError::MissingLabel(
                    missing.into_iter().collect::<Vec<_>>().join(", "),
                ));
            }
            let id = match pick_resource(&metric.name)? {
                Resource::Cpu => M_CONTAINER_CPU_CORE_USED,
                Resource::Memory => M_CONTAINER_MEM_USAGE_BYTES,
            };
            Ok((id, conditions))
        }
        MetricType::Workload => {
            let required = [
                (LABEL_NAMESPACE, DIM_NAMESPACE),
                (LABEL_WORKLOAD_NAME, DIM_WORKLOAD_NAME),
            ];
            let mut conditions = vec![condition(DIM_CLUSTER_ID, &cluster_id)];
            let mut missing = BTreeSet::new();
            for (label, dim) in required {
                match metric.selector_value(label) {
                    Some(value) => conditions.push(condition(dim, value)),
                    None => {
                        missing.insert(label);
                    }
                }
            }
            if !missing.is_empty() {
                return Err(DataSourceError::MissingLabel(
                    missing.into_iter().collect::<Vec<_>>().join(", "),
                ));
            }
            let id = if metric.name == names::METRIC_WORKLOAD_REPLICAS {
                M_WORKLOAD_REPLICAS
            } else {
                match pick_resource(&metric.name)? {
                    Resource::Cpu => M_WORKLOAD_CPU_CORE_USED,
                    Resource::Memory => M_WORKLOAD_MEM_USAGE_BYTES,
                }
            };
            Ok((id, conditions))
        }
        MetricType::PromQl => Err(DataSourceError::Unsupported {
            metric_source: MetricSource::CloudMonitor,
            capability: "promql metrics",
        }),
    }
}

enum Resource {
    Cpu,
    Memory,
}

fn pick_resource(metric_name: &str) -> Result<Resource, DataSourceError> {
    let lowered = metric_name.to_lowercase();
    if lowered == "cpu" || lowered.contains("cpu") {
        Ok(Resource::Cpu)
    } else if lowered == "memory" || lowered.contains("mem") {
        Ok(Resource::Memory)
    } else {
        Err(unsupported(metric_name))
    }
}

fn unsupported(name: &str) -> DataSourceError {
    DataSourceError::Metric(housekeeper_metricquery::MetricError::UnsupportedMetric {
        metric_source: MetricSource::CloudMonitor,
        name: name.to_string(),
    })
}

fn condition(key: &str, value: &str) -> QueryCondition {
    QueryCondition::equal(key, value)
}

impl From<&QueryCondition> for GetDataCondition {
    fn from(cond: &QueryCondition) -> Self {
        let operator = match cond.operator {
            Operator::Equal => "=",
            Operator::In => "in",
        };
        Self {
            key: cond.key.clone(),
            operator: operator.to_string(),
            value: cond.values.clone(),
        }
    }
}

/// The long-window node metrics are only aggregated at their native
/// window upstream; requesting any other step returns garbage. Rewrite
/// to the native window and ask for exactly two of them.
pub fn rewrite_node_window(
    metric_name: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
) -> (DateTime<Utc>, DateTime<Utc>, Duration) {
    let native = match metric_name {
        names::METRIC_CPU_USAGE_AVG_5M | names::METRIC_MEM_USAGE_AVG_5M => {
            Duration::from_secs(300)
        }
        names::METRIC_CPU_USAGE_MAX_AVG_1H | names::METRIC_MEM_USAGE_MAX_AVG_1H => {
            Duration::from_secs(3600)
        }
        names::METRIC_CPU_USAGE_MAX_AVG_1D | names::METRIC_MEM_USAGE_MAX_AVG_1D => {
            Duration::from_secs(86400)
        }
        _ => return (start, end, step),
    };
    let native_chrono = chrono::Duration::from_std(native).expect("window fits");
    (end - native_chrono * 2, end, native)
}

fn convert(metric_id: &str, result: GetDataResult) -> Vec<TimeSeries> {
    let scale = if is_memory_family(metric_id) { 1024.0 } else { 1.0 };
    let Some(data) = result.data.into_iter().next() else {
        return Vec::new();
    };

    data.points
        .into_iter()
        .filter_map(|point| {
            let mut series = TimeSeries::new();
            series.labels = point
                .dimensions
                .into_iter()
                .map(|d| Label {
                    name: d.name,
                    value: d.value,
                })
                .collect();
            for value in point.values {
                // Some points carry a timestamp but no value; skip them.
                if let (Some(ts), Some(v)) = (value.timestamp, value.value) {
                    series.push_sample(ts, v * scale);
                }
            }
            if series.samples.is_empty() {
                None
            } else {
                Some(series)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use housekeeper_metricquery::{container_metric, node_metric, pod_metric};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockApi {
        calls: AtomicUsize,
        result: GetDataResult,
    }

    #[async_trait]
    impl MonitorApi for MockApi {
        async fn describe_statistic_data(
            &self,
            _param: &GetDataParam,
        ) -> Result<GetDataResult, DataSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    #[tokio::test]
    async fn missing_label_never_reaches_upstream() {
        let api = Arc::new(MockApi::default());
        let provider = CloudMonitorProvider::with_api(api.clone(), &CloudMonitorConfig::default());

        let metric = node_metric("", "n1", "", "", names::METRIC_CPU_USAGE_AVG_5M);
        let err = provider.query_latest_time_series(&metric).await.unwrap_err();

        assert!(matches!(err, DataSourceError::MissingLabel(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn latest_query_round_trips_through_transport() {
        let result: GetDataResult = serde_json::from_value(serde_json::json!({
            "Data": [{
                "MetricName": M_NODE_CPU_USAGE_AVG_5M,
                "Points": [{
                    "Dimensions": [{"Name": "node", "Value": "n1"}],
                    "Values": [{"Timestamp": 1700000000, "Value": 37.0}]
                }]
            }]
        }))
        .unwrap();
        let api = Arc::new(MockApi {
            calls: AtomicUsize::new(0),
            result,
        });
        let provider = CloudMonitorProvider::with_api(api.clone(), &CloudMonitorConfig::default());

        let metric = node_metric("cls-1", "n1", "", "", names::METRIC_CPU_USAGE_AVG_5M);
        let series = provider.query_latest_time_series(&metric).await.unwrap();

        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].samples[0].value, 37.0);
    }

    #[test]
    fn node_requires_cluster_id() {
        let metric = node_metric("", "node-1", "", "", names::METRIC_CPU_USAGE_AVG_5M);
        let err = translate(&metric).unwrap_err();
        assert!(matches!(err, DataSourceError::MissingLabel(_)));
    }

    #[test]
    fn node_conditions_and_id() {
        let metric = node_metric("cls-1", "node-1", "", "", names::METRIC_MEM_USAGE_AVG_5M);
        let (id, conditions) = translate(&metric).unwrap();
        assert_eq!(id, M_NODE_MEM_USAGE_AVG_5M);
        assert!(conditions
            .iter()
            .any(|c| c.key == DIM_CLUSTER_ID && c.values == vec!["cls-1".to_string()]));
        assert!(conditions.iter().any(|c| c.key == DIM_NODE));
    }

    #[test]
    fn pod_requires_narrowing_dimension() {
        let metric = pod_metric("cls-1", "default", "web-1", "cpu");
        let err = translate(&metric).unwrap_err();
        assert!(matches!(err, DataSourceError::MissingLabel(_)));

        let mut narrowed = pod_metric("cls-1", "default", "web-1", "cpu");
        narrowed
            .pod
            .as_mut()
            .unwrap()
            .selector
            .insert(LABEL_NODE.to_string(), "node-1".to_string());
        assert!(translate(&narrowed).is_ok());
    }

    #[test]
    fn container_requires_full_identity() {
        let metric = container_metric("cls-1", "default", "", "app", "memory");
        let err = translate(&metric).unwrap_err();
        let DataSourceError::MissingLabel(missing) = err else {
            panic!("wrong error");
        };
        assert!(missing.contains(LABEL_WORKLOAD_NAME));
    }

    #[test]
    fn window_rewrite_two_native_windows() {
        let end = Utc::now();
        let start = end - chrono::Duration::hours(12);
        let (s, e, step) = rewrite_node_window(
            names::METRIC_CPU_USAGE_MAX_AVG_1H,
            start,
            end,
            Duration::from_secs(60),
        );
        assert_eq!(step, Duration::from_secs(3600));
        assert_eq!(e, end);
        assert_eq!((e - s).num_seconds(), 2 * 3600);

        // Short-window metrics keep the caller's range untouched.
        let (s2, _, step2) =
            rewrite_node_window(names::METRIC_CPU_USAGE_PERCENT, start, end, Duration::from_secs(60));
        assert_eq!(step2, Duration::from_secs(60));
        assert_eq!(s2, start);
    }

    #[test]
    fn convert_drops_valueless_points_and_scales_memory() {
        let result: GetDataResult = serde_json::from_value(serde_json::json!({
            "Data": [{
                "MetricName": M_POD_MEM_USAGE_BYTES,
                "Points": [
                    {
                        "Dimensions": [{"Name": "pod_name", "Value": "web-1"}],
                        "Values": [
                            {"Timestamp": 1700000000},
                            {"Timestamp": 1700000060, "Value": 20.0},
                            {"Timestamp": 1700000120}
                        ]
                    },
                    {
                        "Dimensions": [{"Name": "pod_name", "Value": "web-2"}],
                        "Values": [{"Timestamp": 1700000000}]
                    }
                ]
            }]
        }))
        .unwrap();

        let series = convert(M_POD_MEM_USAGE_BYTES, result);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].samples.len(), 1);
        assert_eq!(series[0].samples[0].value, 20.0 * 1024.0);
    }

    #[test]
    fn convert_leaves_percent_metrics_unscaled() {
        let result: GetDataResult = serde_json::from_value(serde_json::json!({
            "Data": [{
                "MetricName": M_NODE_CPU_USAGE_AVG_5M,
                "Points": [{
                    "Dimensions": [{"Name": "node", "Value": "n1"}],
                    "Values": [{"Timestamp": 1700000000, "Value": 42.5}]
                }]
            }]
        }))
        .unwrap();
        let series = convert(M_NODE_CPU_USAGE_AVG_5M, result);
        assert_eq!(series[0].samples[0].value, 42.5);
    }
}
