//! # housekeeper-datasource
//!
//! Data-source adapters behind one interface:
//!
//! - [`PromProvider`]: Prometheus; history and realtime
//! - [`MetricServerProvider`]: resource/custom metrics APIs; realtime only
//! - [`CloudMonitorProvider`]: the cloud monitor; history and realtime
//!
//! Adapters translate a metric namer into a source-native query through
//! the builder registry, bound every request with a configured timeout
//! and a concurrency cap, and normalize responses into the common
//! time-series shape. Samples without a value are dropped; series whose
//! samples all drop are dropped.

mod client;
mod cloudmonitor;
mod config;
mod error;
mod metricserver;
pub mod names;
mod prom;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use housekeeper_metricquery::{Metric, TimeSeries};

pub use client::NodeMetricsClient;
pub use cloudmonitor::{
    CloudMonitorProvider, Credential, GetDataCondition, GetDataParam, GetDataResult, MonitorApi,
    NormCredential,
};
pub use config::{CloudMonitorConfig, DataSourceConfig, MetricServerConfig, PromConfig};
pub use error::DataSourceError;
pub use metricserver::{parse_quantity, MetricServerProvider};
pub use prom::PromProvider;

/// A metrics backend. History-incapable sources return
/// [`DataSourceError::Unsupported`] from [`DataSource::query_time_series`].
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Query a time range at the given step.
    async fn query_time_series(
        &self,
        metric: &Metric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<TimeSeries>, DataSourceError>;

    /// Query the most recent values.
    async fn query_latest_time_series(
        &self,
        metric: &Metric,
    ) -> Result<Vec<TimeSeries>, DataSourceError>;
}

/// Build the configured provider.
pub fn provider_from_config(
    config: &DataSourceConfig,
    cluster: &housekeeper_cluster::ClusterClient,
) -> Result<std::sync::Arc<dyn DataSource>, DataSourceError> {
    match config {
        DataSourceConfig::Prom(prom) => Ok(std::sync::Arc::new(PromProvider::new(prom)?)),
        DataSourceConfig::MetricServer(_) => Ok(std::sync::Arc::new(MetricServerProvider::new(
            cluster.clone(),
        ))),
        DataSourceConfig::CloudMonitor(monitor) => {
            Ok(std::sync::Arc::new(CloudMonitorProvider::new(monitor)))
        }
    }
}

/// Drop valueless samples, then drop empty series.
pub(crate) fn prune_series(series: Vec<TimeSeries>) -> Vec<TimeSeries> {
    series
        .into_iter()
        .filter_map(|mut s| {
            s.samples.retain(|sample| sample.value.is_finite());
            if s.samples.is_empty() {
                None
            } else {
                Some(s)
            }
        })
        .collect()
}
