//! Query-builder registry.
//!
//! Each data-source adapter registers a builder factory for its source at
//! construction time. Asking for a builder of an unregistered source is a
//! configuration error surfaced as [`MetricError::UnsupportedSource`].

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::error::MetricError;
use crate::metric::{Metric, MetricSource};

/// A source-native query, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Prom(PromQuery),
    MetricServer(MetricServerQuery),
    CloudMonitor(CloudMonitorQuery),
}

/// A rendered PromQL expression.
#[derive(Debug, Clone, PartialEq)]
pub struct PromQuery {
    pub query: String,
}

/// Metrics-server queries carry the metric through; the adapter resolves
/// the endpoint from the entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricServerQuery {
    pub metric: Metric,
}

/// Cloud-monitor queries carry the metric; conditions are derived by the
/// adapter from the selector.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudMonitorQuery {
    pub metric: Metric,
}

/// Translates a metric into a source-native query.
pub trait QueryBuilder: Send + Sync {
    fn build_query(&self) -> Result<Query, MetricError>;
}

/// Factory signature registered per source.
pub type BuilderFactory = fn(&Metric) -> Box<dyn QueryBuilder>;

fn registry() -> &'static RwLock<HashMap<MetricSource, BuilderFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<MetricSource, BuilderFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register (or overwrite) the builder factory for a source.
pub fn register_builder(source: MetricSource, factory: BuilderFactory) {
    registry()
        .write()
        .expect("builder registry poisoned")
        .insert(source, factory);
}

/// Construct a builder for `metric` targeting `source`.
pub fn builder_for(source: MetricSource, metric: &Metric) -> Result<Box<dyn QueryBuilder>, MetricError> {
    let factory = registry()
        .read()
        .expect("builder registry poisoned")
        .get(&source)
        .copied()
        .ok_or(MetricError::UnsupportedSource(source))?;
    Ok(factory(metric))
}
