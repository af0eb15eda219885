use thiserror::Error;

/// Errors surfaced by the cluster REST client.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Transport-level failure (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API server answered with a non-success status.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Client-side configuration problem.
    #[error("config error: {0}")]
    Config(String),
}

impl ClusterError {
    /// True when the server reported 404 for the target object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// True for conditions that are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_detection() {
        let err = ClusterError::Api {
            status: 404,
            message: "nodes \"gone\" not found".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_detection() {
        let err = ClusterError::Api {
            status: 503,
            message: "etcdserver: leader changed".into(),
        };
        assert!(err.is_transient());

        let err = ClusterError::Api {
            status: 409,
            message: "conflict".into(),
        };
        assert!(!err.is_transient());
    }
}
