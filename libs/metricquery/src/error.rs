use thiserror::Error;

use crate::metric::{MetricSource, MetricType};

/// Errors raised while validating or translating a metric name.
#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    /// The info block for the declared metric type is absent, or (for
    /// workloads) the selector is empty.
    #[error("metric type {0}, but no matching entity info provided")]
    MissingEntity(MetricType),

    /// No query builder is registered for the requested source.
    #[error("no query builder registered for source {0}")]
    UnsupportedSource(MetricSource),

    /// The source cannot express this metric.
    #[error("metric {name} not supported by source {metric_source}")]
    UnsupportedMetric { metric_source: MetricSource, name: String },
}
