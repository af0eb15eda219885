//! Metric names with entity context.
//!
//! A metric is addressed by its type plus a type-specific info block.
//! Well-known label keys bridge the naming differences between data
//! sources; namer constructors fold entity identifiers into the label
//! selector so that sources which filter by label see them uniformly.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MetricError;

// Abstract intermediate label names; each source maps these onto its own
// dimension naming.
pub const LABEL_CLUSTER_ID: &str = "cluster_id";
pub const LABEL_NAMESPACE: &str = "namespace";
pub const LABEL_NODE: &str = "node";
pub const LABEL_NODE_IP: &str = "node_ip";
pub const LABEL_NODE_ROLE: &str = "node_role";
pub const LABEL_POD_NAME: &str = "pod_name";
pub const LABEL_WORKLOAD_NAME: &str = "workload_name";
pub const LABEL_CONTAINER_NAME: &str = "container_name";

/// Label set used as an entity selector.
pub type Labels = BTreeMap<String, String>;

/// Where a query is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    Prom,
    MetricServer,
    #[serde(rename = "qmonitor")]
    CloudMonitor,
}

impl fmt::Display for MetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prom => "prom",
            Self::MetricServer => "metricserver",
            Self::CloudMonitor => "qmonitor",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for MetricSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prom" | "prometheus" => Ok(Self::Prom),
            "metricserver" => Ok(Self::MetricServer),
            "qmonitor" | "qcloudmonitor" => Ok(Self::CloudMonitor),
            other => Err(format!("unknown data source {other:?}")),
        }
    }
}

/// The entity class a metric is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Workload,
    Pod,
    Container,
    Node,
    #[serde(rename = "promql")]
    PromQl,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Workload => "workload",
            Self::Pod => "pod",
            Self::Container => "container",
            Self::Node => "node",
            Self::PromQl => "promql",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadInfo {
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub api_version: String,
    pub selector: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodInfo {
    pub namespace: String,
    pub name: String,
    pub selector: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub namespace: String,
    pub workload_name: String,
    pub container_name: String,
    pub selector: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub ip: String,
    pub selector: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromQlInfo {
    pub query_expr: String,
    pub namespace: String,
    pub selector: Labels,
}

/// A metric name with its entity context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric_type: MetricType,
    /// e.g. `cpu`, `memory`, `cpu_usage_avg_5m`, or an arbitrary name for
    /// promql metrics.
    pub name: String,
    pub workload: Option<WorkloadInfo>,
    pub pod: Option<PodInfo>,
    pub container: Option<ContainerInfo>,
    pub node: Option<NodeInfo>,
    pub promql: Option<PromQlInfo>,
}

impl Metric {
    /// Check that the info block matching the declared type is present.
    pub fn validate(&self) -> Result<(), MetricError> {
        match self.metric_type {
            MetricType::Workload => match &self.workload {
                Some(info) if !info.selector.is_empty() => Ok(()),
                _ => Err(MetricError::MissingEntity(MetricType::Workload)),
            },
            MetricType::Pod if self.pod.is_none() => {
                Err(MetricError::MissingEntity(MetricType::Pod))
            }
            MetricType::Container if self.container.is_none() => {
                Err(MetricError::MissingEntity(MetricType::Container))
            }
            MetricType::Node if self.node.is_none() => {
                Err(MetricError::MissingEntity(MetricType::Node))
            }
            MetricType::PromQl if self.promql.is_none() => {
                Err(MetricError::MissingEntity(MetricType::PromQl))
            }
            _ => Ok(()),
        }
    }

    /// Deterministic canonical key for caching and logging.
    pub fn build_unique_key(&self) -> Result<String, MetricError> {
        self.validate()?;
        let key = match self.metric_type {
            MetricType::Workload => {
                let w = self.workload.as_ref().unwrap();
                join_key(&[
                    "workload",
                    &self.name.to_lowercase(),
                    &w.kind,
                    &w.api_version,
                    &w.namespace,
                    &w.name,
                    &selector_string(&w.selector),
                ])
            }
            MetricType::Pod => {
                let p = self.pod.as_ref().unwrap();
                join_key(&[
                    "pod",
                    &self.name.to_lowercase(),
                    &p.namespace,
                    &p.name,
                    &selector_string(&p.selector),
                ])
            }
            MetricType::Container => {
                let c = self.container.as_ref().unwrap();
                join_key(&[
                    "container",
                    &self.name.to_lowercase(),
                    &c.namespace,
                    &c.workload_name,
                    &c.container_name,
                    &selector_string(&c.selector),
                ])
            }
            MetricType::Node => {
                let n = self.node.as_ref().unwrap();
                join_key(&[
                    "node",
                    &self.name.to_lowercase(),
                    &n.name,
                    &n.ip,
                    &selector_string(&n.selector),
                ])
            }
            MetricType::PromQl => {
                let p = self.promql.as_ref().unwrap();
                join_key(&[
                    "promql",
                    &p.namespace,
                    &self.name.to_lowercase(),
                    &p.query_expr,
                    &selector_string(&p.selector),
                ])
            }
        };
        Ok(key)
    }

    /// Exact-match lookup in the entity selector.
    pub fn selector_value(&self, label: &str) -> Option<&str> {
        let selector = match self.metric_type {
            MetricType::Workload => self.workload.as_ref().map(|i| &i.selector),
            MetricType::Pod => self.pod.as_ref().map(|i| &i.selector),
            MetricType::Container => self.container.as_ref().map(|i| &i.selector),
            MetricType::Node => self.node.as_ref().map(|i| &i.selector),
            MetricType::PromQl => self.promql.as_ref().map(|i| &i.selector),
        };
        selector.and_then(|s| s.get(label)).map(String::as_str)
    }
}

fn join_key(parts: &[&str]) -> String {
    parts.join("-")
}

fn selector_string(selector: &Labels) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn insert_if_set(labels: &mut Labels, key: &str, value: &str) {
    if !value.is_empty() {
        labels.insert(key.to_string(), value.to_string());
    }
}

/// Namer for a node metric.
pub fn node_metric(
    cluster_id: &str,
    node_name: &str,
    node_ip: &str,
    node_role: &str,
    metric_name: &str,
) -> Metric {
    let mut selector = Labels::new();
    insert_if_set(&mut selector, LABEL_CLUSTER_ID, cluster_id);
    insert_if_set(&mut selector, LABEL_NODE, node_name);
    insert_if_set(&mut selector, LABEL_NODE_IP, node_ip);
    insert_if_set(&mut selector, LABEL_NODE_ROLE, node_role);

    Metric {
        metric_type: MetricType::Node,
        name: metric_name.to_string(),
        node: Some(NodeInfo {
            name: node_name.to_string(),
            ip: node_ip.to_string(),
            selector,
        }),
        workload: None,
        pod: None,
        container: None,
        promql: None,
    }
}

/// Namer for a workload metric.
pub fn workload_metric(
    cluster_id: &str,
    namespace: &str,
    kind: &str,
    api_version: &str,
    name: &str,
    metric_name: &str,
) -> Metric {
    let mut selector = Labels::new();
    insert_if_set(&mut selector, LABEL_CLUSTER_ID, cluster_id);
    insert_if_set(&mut selector, LABEL_NAMESPACE, namespace);
    insert_if_set(&mut selector, LABEL_WORKLOAD_NAME, name);

    Metric {
        metric_type: MetricType::Workload,
        name: metric_name.to_string(),
        workload: Some(WorkloadInfo {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            api_version: api_version.to_string(),
            selector,
        }),
        pod: None,
        container: None,
        node: None,
        promql: None,
    }
}

/// Namer for a container metric.
pub fn container_metric(
    cluster_id: &str,
    namespace: &str,
    workload_name: &str,
    container_name: &str,
    metric_name: &str,
) -> Metric {
    let mut selector = Labels::new();
    insert_if_set(&mut selector, LABEL_CLUSTER_ID, cluster_id);
    insert_if_set(&mut selector, LABEL_NAMESPACE, namespace);
    insert_if_set(&mut selector, LABEL_WORKLOAD_NAME, workload_name);
    insert_if_set(&mut selector, LABEL_CONTAINER_NAME, container_name);

    Metric {
        metric_type: MetricType::Container,
        name: metric_name.to_string(),
        container: Some(ContainerInfo {
            namespace: namespace.to_string(),
            workload_name: workload_name.to_string(),
            container_name: container_name.to_string(),
            selector,
        }),
        workload: None,
        pod: None,
        node: None,
        promql: None,
    }
}

/// Namer for a pod metric.
pub fn pod_metric(cluster_id: &str, namespace: &str, name: &str, metric_name: &str) -> Metric {
    let mut selector = Labels::new();
    insert_if_set(&mut selector, LABEL_CLUSTER_ID, cluster_id);
    insert_if_set(&mut selector, LABEL_NAMESPACE, namespace);
    insert_if_set(&mut selector, LABEL_POD_NAME, name);

    Metric {
        metric_type: MetricType::Pod,
        name: metric_name.to_string(),
        pod: Some(PodInfo {
            namespace: namespace.to_string(),
            name: name.to_string(),
            selector,
        }),
        workload: None,
        container: None,
        node: None,
        promql: None,
    }
}

/// Namer for a raw promql expression.
pub fn promql_metric(namespace: &str, metric_name: &str, query_expr: &str) -> Metric {
    Metric {
        metric_type: MetricType::PromQl,
        name: metric_name.to_string(),
        promql: Some(PromQlInfo {
            query_expr: query_expr.to_string(),
            namespace: namespace.to_string(),
            selector: Labels::new(),
        }),
        workload: None,
        pod: None,
        container: None,
        node: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_namer_folds_labels() {
        let metric = node_metric("cls-1", "node-1", "10.0.0.5", "", "cpu_usage_avg_5m");
        assert_eq!(metric.selector_value(LABEL_CLUSTER_ID), Some("cls-1"));
        assert_eq!(metric.selector_value(LABEL_NODE), Some("node-1"));
        assert_eq!(metric.selector_value(LABEL_NODE_ROLE), None);
        assert!(metric.validate().is_ok());
    }

    #[test]
    fn unique_key_is_deterministic() {
        let a = node_metric("cls-1", "node-1", "", "", "Cpu_Usage_Avg_5m");
        let b = node_metric("cls-1", "node-1", "", "", "cpu_usage_avg_5m");
        assert_eq!(a.build_unique_key().unwrap(), b.build_unique_key().unwrap());
        assert!(a
            .build_unique_key()
            .unwrap()
            .starts_with("node-cpu_usage_avg_5m-node-1"));
    }

    #[test]
    fn workload_requires_selector() {
        let mut metric = workload_metric("", "default", "Deployment", "apps/v1", "web", "cpu");
        // cluster id empty but namespace+name folded in, selector non-empty
        assert!(metric.validate().is_ok());

        metric.workload.as_mut().unwrap().selector.clear();
        assert_eq!(
            metric.validate(),
            Err(MetricError::MissingEntity(MetricType::Workload))
        );
    }

    #[test]
    fn missing_block_is_rejected() {
        let metric = Metric {
            metric_type: MetricType::Node,
            name: "cpu".into(),
            workload: None,
            pod: None,
            container: None,
            node: None,
            promql: None,
        };
        assert_eq!(
            metric.validate(),
            Err(MetricError::MissingEntity(MetricType::Node))
        );
        assert!(metric.build_unique_key().is_err());
    }
}
