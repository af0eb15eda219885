//! # housekeeper-metricquery
//!
//! Uniform addressing of `{node, pod, container, workload, promql}`
//! metrics across heterogeneous data sources. A [`Metric`] names what to
//! measure and on which entity; a per-source query builder (registered by
//! the data-source adapters at construction) turns it into a
//! source-native [`Query`]. The common time-series shape all adapters
//! return lives here too.

mod builder;
mod error;
mod metric;
mod timeseries;

pub use builder::{builder_for, register_builder, BuilderFactory, Query, QueryBuilder};
pub use builder::{CloudMonitorQuery, MetricServerQuery, PromQuery};
pub use error::MetricError;
pub use metric::{
    container_metric, node_metric, pod_metric, promql_metric, workload_metric, ContainerInfo,
    Labels, Metric, MetricSource, MetricType, NodeInfo, PodInfo, PromQlInfo, WorkloadInfo,
};
pub use metric::{
    LABEL_CLUSTER_ID, LABEL_CONTAINER_NAME, LABEL_NAMESPACE, LABEL_NODE, LABEL_NODE_IP,
    LABEL_NODE_ROLE, LABEL_POD_NAME, LABEL_WORKLOAD_NAME,
};
pub use timeseries::{Label, Operator, QueryCondition, Sample, TimeSeries};
