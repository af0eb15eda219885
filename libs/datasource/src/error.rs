use thiserror::Error;

use housekeeper_metricquery::{MetricError, MetricSource};

/// Errors surfaced by the data-source adapters.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The per-request timeout elapsed; callers may retry.
    #[error("{metric_source} query timed out after {timeout_secs}s")]
    Timeout {
        metric_source: MetricSource,
        timeout_secs: u64,
    },

    /// A required entity label is absent; checked before any upstream
    /// request is made.
    #[error("missing required label(s): {0}")]
    MissingLabel(String),

    /// The source does not implement the requested capability.
    #[error("{metric_source} does not support {capability}")]
    Unsupported {
        metric_source: MetricSource,
        capability: &'static str,
    },

    /// Metric validation or translation failed.
    #[error(transparent)]
    Metric(#[from] MetricError),

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered with an error.
    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Response body could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),

    /// Credential acquisition or refresh failed.
    #[error("credential error: {0}")]
    Credential(String),

    /// The query succeeded but returned no usable samples.
    #[error("no data for {0}")]
    NoData(String),
}

impl DataSourceError {
    /// True for conditions worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Transport(_)
                | Self::Upstream { status: 500..=599, .. }
                | Self::Credential(_)
        )
    }
}
