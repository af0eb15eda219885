//! Temporary credentials from the metadata service.
//!
//! Credentials live behind a mutex and are refreshed once the remaining
//! lifetime drops below half of the issued duration. A background task
//! keeps them warm so query paths rarely pay the refresh round trip.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DataSourceError;

const DEFAULT_NORM_URL: &str = "http://169.254.0.40:80/norm/api";
const INTERFACE_ASSUME_CREDENTIAL: &str = "NORM.AssumeTkeCredential";

/// A usable credential triple.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credential {
    pub secret_id: String,
    pub secret_key: String,
    pub token: String,
}

#[derive(Debug, Clone, Default)]
struct CachedCredential {
    credential: Credential,
    expires_at: Option<DateTime<Utc>>,
}

/// Metadata-service-backed credential provider.
pub struct NormCredential {
    http: reqwest::Client,
    norm_url: String,
    cluster_id: String,
    app_id: String,
    lifetime: Duration,
    cached: Mutex<CachedCredential>,
}

impl NormCredential {
    /// `QCLOUD_NORM_URL` overrides the metadata-service endpoint.
    pub fn new(cluster_id: &str, app_id: &str, lifetime: Duration) -> Self {
        let norm_url =
            std::env::var("QCLOUD_NORM_URL").unwrap_or_else(|_| DEFAULT_NORM_URL.to_string());
        Self {
            http: reqwest::Client::new(),
            norm_url,
            cluster_id: cluster_id.to_string(),
            app_id: app_id.to_string(),
            lifetime,
            cached: Mutex::new(CachedCredential::default()),
        }
    }

    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        let cached = self.cached.lock().expect("credential lock poisoned");
        match cached.expires_at {
            None => true,
            Some(expires_at) => {
                let margin = chrono::Duration::from_std(self.lifetime / 2)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30));
                now + margin >= expires_at
            }
        }
    }

    /// Current credential, refreshing first when it is about to expire.
    pub async fn credential(&self) -> Result<Credential, DataSourceError> {
        if self.needs_refresh(Utc::now()) {
            self.refresh().await?;
        }
        Ok(self
            .cached
            .lock()
            .expect("credential lock poisoned")
            .credential
            .clone())
    }

    async fn refresh(&self) -> Result<(), DataSourceError> {
        let request = NormRequest {
            event_id: Utc::now().timestamp_subsec_micros(),
            timestamp: Utc::now().timestamp(),
            caller: "housekeeper".to_string(),
            callee: "NORM".to_string(),
            version: "1".to_string(),
            password: "cloudprovider".to_string(),
            interface: NormInterface {
                interface_name: INTERFACE_ASSUME_CREDENTIAL.to_string(),
                para: NormPara {
                    cluster_id: self.cluster_id.clone(),
                    app_id: self.app_id.clone(),
                    duration: self.lifetime.as_secs(),
                },
            },
        };

        let response = self
            .http
            .post(&self.norm_url)
            .timeout(Duration::from_secs(10))
            .json(&request)
            .send()
            .await
            .map_err(|e| DataSourceError::Credential(e.to_string()))?;
        let body: NormResponse = response
            .json()
            .await
            .map_err(|e| DataSourceError::Credential(e.to_string()))?;

        if body.return_value != 0 {
            return Err(DataSourceError::Credential(format!(
                "metadata service returned {}: {}",
                body.return_value, body.return_msg
            )));
        }
        let data = body
            .return_data
            .ok_or_else(|| DataSourceError::Credential("empty credential payload".into()))?;

        let mut cached = self.cached.lock().expect("credential lock poisoned");
        cached.credential = Credential {
            secret_id: data.credentials.tmp_secret_id,
            secret_key: data.credentials.tmp_secret_key,
            token: data.credentials.session_token,
        };
        cached.expires_at = DateTime::from_timestamp(data.expired_time, 0);
        debug!(expires_at = ?cached.expires_at, "credential refreshed");
        Ok(())
    }

    /// Background refresh loop; failures are retried on the next tick.
    pub async fn run_refresh(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.needs_refresh(Utc::now()) {
                        if let Err(e) = self.refresh().await {
                            warn!(error = %e, "credential refresh failed, will retry");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Seed a static credential (tests and fixed-key configurations).
    pub fn set_static(&self, credential: Credential, expires_at: Option<DateTime<Utc>>) {
        let mut cached = self.cached.lock().expect("credential lock poisoned");
        cached.credential = credential;
        cached.expires_at = expires_at;
    }
}

#[derive(Debug, Serialize)]
struct NormRequest {
    #[serde(rename = "eventId")]
    event_id: u32,
    timestamp: i64,
    caller: String,
    callee: String,
    version: String,
    password: String,
    interface: NormInterface,
}

#[derive(Debug, Serialize)]
struct NormInterface {
    #[serde(rename = "interfaceName")]
    interface_name: String,
    para: NormPara,
}

#[derive(Debug, Serialize)]
struct NormPara {
    #[serde(rename = "clusterId")]
    cluster_id: String,
    #[serde(rename = "appId")]
    app_id: String,
    duration: u64,
}

#[derive(Debug, Deserialize)]
struct NormResponse {
    #[serde(rename = "returnValue", default)]
    return_value: i64,
    #[serde(rename = "returnMsg", default)]
    return_msg: String,
    #[serde(rename = "returnData", default)]
    return_data: Option<CredentialData>,
}

#[derive(Debug, Deserialize)]
struct CredentialData {
    credentials: TempCredentials,
    #[serde(rename = "expiredTime", default)]
    expired_time: i64,
}

#[derive(Debug, Deserialize)]
struct TempCredentials {
    #[serde(rename = "TmpSecretId", default)]
    tmp_secret_id: String,
    #[serde(rename = "TmpSecretKey", default)]
    tmp_secret_key: String,
    #[serde(rename = "SessionToken", default)]
    session_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_window_is_half_lifetime() {
        let provider = NormCredential::new("cls-1", "1251", Duration::from_secs(3600));
        let now = Utc::now();

        // Nothing cached yet.
        assert!(provider.needs_refresh(now));

        // Far from expiry: no refresh.
        provider.set_static(Credential::default(), Some(now + chrono::Duration::seconds(3000)));
        assert!(!provider.needs_refresh(now));

        // Inside the half-lifetime margin: refresh.
        provider.set_static(Credential::default(), Some(now + chrono::Duration::seconds(1200)));
        assert!(provider.needs_refresh(now));
    }

    #[test]
    fn norm_response_decodes() {
        let raw = serde_json::json!({
            "returnValue": 0,
            "returnMsg": "ok",
            "returnData": {
                "credentials": {
                    "TmpSecretId": "id",
                    "TmpSecretKey": "key",
                    "SessionToken": "tok"
                },
                "expiredTime": 1700003600
            }
        });
        let response: NormResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.return_value, 0);
        assert_eq!(response.return_data.unwrap().credentials.tmp_secret_id, "id");
    }
}
