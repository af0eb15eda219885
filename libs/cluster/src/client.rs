//! Thin REST client for the orchestrator API.
//!
//! In-cluster service-account credentials are picked up automatically;
//! `HOUSEKEEPER_API_SERVER` and the token/CA paths can be overridden for
//! out-of-cluster runs.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClusterError;
use crate::objects::{ConfigMap, Event, EventList, ListMeta, Node, Pod};
use crate::patch::PatchOp;

const DEFAULT_API_SERVER: &str = "https://kubernetes.default.svc";
const DEFAULT_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const DEFAULT_CA_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Connection parameters for the API server.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub api_server: String,
    pub token_file: String,
    pub ca_file: String,
    pub request_timeout: Duration,
    /// Skip server certificate verification (local development only).
    pub insecure_skip_tls_verify: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_server: DEFAULT_API_SERVER.to_string(),
            token_file: DEFAULT_TOKEN_FILE.to_string(),
            ca_file: DEFAULT_CA_FILE.to_string(),
            request_timeout: Duration::from_secs(30),
            insecure_skip_tls_verify: false,
        }
    }
}

impl ClusterConfig {
    /// Load connection parameters from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_server: std::env::var("HOUSEKEEPER_API_SERVER").unwrap_or(defaults.api_server),
            token_file: std::env::var("HOUSEKEEPER_TOKEN_FILE").unwrap_or(defaults.token_file),
            ca_file: std::env::var("HOUSEKEEPER_CA_FILE").unwrap_or(defaults.ca_file),
            request_timeout: std::env::var("HOUSEKEEPER_API_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            insecure_skip_tls_verify: std::env::var("HOUSEKEEPER_INSECURE_TLS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

/// Generic list envelope for typed object lists.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, bound = "T: DeserializeOwned + Default")]
pub struct ObjectList<T> {
    pub metadata: ListMeta,
    pub items: Vec<T>,
}

impl<T> Default for ObjectList<T> {
    fn default() -> Self {
        Self {
            metadata: ListMeta::default(),
            items: Vec::new(),
        }
    }
}

/// REST client over the orchestrator API.
#[derive(Clone)]
pub struct ClusterClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ClusterClient {
    pub fn new(config: &ClusterConfig) -> Result<Self, ClusterError> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);

        if config.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Ok(pem) = std::fs::read(&config.ca_file) {
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| ClusterError::Config(format!("bad CA bundle: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let token = std::fs::read_to_string(&config.token_file)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let http = builder
            .build()
            .map_err(|e| ClusterError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_server.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn check<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClusterError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClusterError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// GET an arbitrary API path and decode the response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClusterError> {
        debug!(path, "cluster api get");
        let response = self.request(reqwest::Method::GET, path).send().await?;
        Self::check(response).await
    }

    /// List objects under an arbitrary collection path.
    pub async fn list<T>(&self, path: &str) -> Result<ObjectList<T>, ClusterError>
    where
        T: DeserializeOwned + Default,
    {
        self.get_json(path).await
    }

    pub async fn list_nodes(&self, label_selector: Option<&str>) -> Result<Vec<Node>, ClusterError> {
        let path = match label_selector {
            Some(sel) => format!("/api/v1/nodes?labelSelector={}", urlencode(sel)),
            None => "/api/v1/nodes".to_string(),
        };
        Ok(self.list::<Node>(&path).await?.items)
    }

    pub async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        self.get_json(&format!("/api/v1/nodes/{name}")).await
    }

    /// Apply a JSON patch to a node's metadata.
    pub async fn patch_node(&self, name: &str, ops: &[PatchOp]) -> Result<(), ClusterError> {
        debug!(node = name, ops = ops.len(), "patching node annotations");
        let response = self
            .request(reqwest::Method::PATCH, &format!("/api/v1/nodes/{name}"))
            .header(reqwest::header::CONTENT_TYPE, "application/json-patch+json")
            .json(ops)
            .send()
            .await?;
        Self::check::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ConfigMap, ClusterError> {
        self.get_json(&format!("/api/v1/namespaces/{namespace}/configmaps/{name}"))
            .await
    }

    /// List events matching a field selector, resuming from a cursor.
    ///
    /// The returned list's `metadata.resource_version` is the cursor for
    /// the next call.
    pub async fn list_events(
        &self,
        field_selector: &str,
        resource_version: Option<&str>,
    ) -> Result<EventList, ClusterError> {
        let mut path = format!("/api/v1/events?fieldSelector={}", urlencode(field_selector));
        if let Some(rv) = resource_version {
            path.push_str(&format!("&resourceVersion={rv}"));
        }
        let list: ObjectList<Event> = self.list(&path).await?;
        Ok(EventList {
            metadata: list.metadata,
            items: list.items,
        })
    }

    pub async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError> {
        let mut path = format!("/api/v1/namespaces/{namespace}/pods");
        if let Some(sel) = label_selector {
            path.push_str(&format!("?labelSelector={}", urlencode(sel)));
        }
        Ok(self.list::<Pod>(&path).await?.items)
    }

    /// POST a typed object to a collection path.
    pub async fn post_json<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ClusterError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await?;
        Self::check::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Apply a strategic/merge patch to an object path.
    pub async fn merge_patch<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ClusterError> {
        let response = self
            .request(reqwest::Method::PATCH, path)
            .header(reqwest::header::CONTENT_TYPE, "application/merge-patch+json")
            .json(body)
            .send()
            .await?;
        Self::check::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Scale a deployment through the scale subresource and return the
    /// pod selector recorded in its status.
    pub async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<String, ClusterError> {
        let path = format!("/apis/apps/v1/namespaces/{namespace}/deployments/{name}/scale");
        let body = serde_json::json!({"spec": {"replicas": replicas}});
        let response = self
            .request(reqwest::Method::PATCH, &path)
            .header(reqwest::header::CONTENT_TYPE, "application/merge-patch+json")
            .json(&body)
            .send()
            .await?;
        let scale: serde_json::Value = Self::check(response).await?;
        Ok(scale["status"]["selector"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_selectors() {
        assert_eq!(urlencode("a=b,c=d"), "a%3Db%2Cc%3Dd");
        assert_eq!(urlencode("reason=Scheduled"), "reason%3DScheduled");
        assert_eq!(urlencode("plain-key_1.2~x"), "plain-key_1.2~x");
    }

    #[test]
    fn config_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.api_server, DEFAULT_API_SERVER);
        assert!(!config.insecure_skip_tls_verify);
    }
}
