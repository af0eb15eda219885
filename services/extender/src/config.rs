//! Extender configuration, loaded from the environment.

use std::net::SocketAddr;

use anyhow::Result;

use housekeeper_policy::ScoringConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds.
    pub listen_addr: SocketAddr,

    /// Path of the scheduling policy file.
    pub policy_path: String,

    /// Directory holding the webhook serving certificate; TLS is
    /// terminated in front of the process, the path is recorded for the
    /// deployment tooling.
    pub webhook_cert_dir: String,

    pub scoring: ScoringConfig,

    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("HOUSEKEEPER_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8890".to_string())
            .parse()?;

        let policy_path = std::env::var("HOUSEKEEPER_POLICY_FILE")
            .unwrap_or_else(|_| "/etc/housekeeper/policy.yaml".to_string());

        let webhook_cert_dir = std::env::var("HOUSEKEEPER_WEBHOOK_CERT_DIR")
            .unwrap_or_else(|_| "/etc/housekeeper/certs".to_string());

        let scoring = ScoringConfig {
            overload_when_any_predicate: std::env::var("HOUSEKEEPER_OVERLOAD_WHEN_ANY_PREDICATE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        };

        let log_level = std::env::var("HOUSEKEEPER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            listen_addr,
            policy_path,
            webhook_cert_dir,
            scoring,
            log_level,
        })
    }
}
