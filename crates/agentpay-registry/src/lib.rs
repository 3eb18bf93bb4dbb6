//! AgentPay Registry - peer resolution and A2A delivery
//!
//! Two concerns at one seam:
//!
//! - **Resolve**: `POST {registry}/resolve` maps an agent identifier to its
//!   registry document (`agent_id`, `agent_url`, capability card). A 404 is
//!   "peer does not exist" and is not an error; any other failure is a
//!   transport error so callers can tell an absent peer from an unreachable
//!   registry.
//! - **Deliver**: `POST {agent_url}/handle_external_message` carries a JSON
//!   payload to the peer. Single attempt, bounded timeout, no retry.
//!
//! The [`PeerDirectory`] trait is the injection point for the settlement
//! engine; [`RegistryClient`] is the HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use agentpay_types::EngineConfig;

/// Errors from registry and delivery calls
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Registry unreachable or timed out; distinct from "peer not found"
    #[error("Registry transport error: {0}")]
    Transport(String),

    /// Registry answered with an unexpected status
    #[error("Registry returned status {status}")]
    Status { status: u16 },

    /// 2xx response that does not carry the required fields
    #[error("Malformed registry document: {0}")]
    Malformed(String),

    /// Peer resolved but exposes no usable endpoint
    #[error("Peer {agent_id} has no reachable endpoint")]
    NoEndpoint { agent_id: String },

    /// The HTTP exchange with the peer itself failed
    #[error("Delivery to {agent_id} failed: {message}")]
    Delivery { agent_id: String, message: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// A resolved peer: identity, endpoint, and the full registry document
/// (retained for capability assessment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub agent_id: String,
    pub agent_url: Option<String>,
    pub document: Value,
}

impl PeerInfo {
    /// Parse a 2xx registry response body
    pub fn from_document(document: Value) -> Result<Self> {
        let agent_id = document
            .get("agent_id")
            .and_then(Value::as_str)
            .ok_or_else(|| RegistryError::Malformed("missing agent_id".to_string()))?
            .to_string();
        let agent_url = document
            .get("agent_url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(Self {
            agent_id,
            agent_url,
            document,
        })
    }
}

/// Seam between the settlement engine and the network: resolve peers and
/// deliver payloads to them.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// `Ok(None)` means the peer does not exist; transport failures are `Err`
    async fn resolve(&self, identifier: &str) -> Result<Option<PeerInfo>>;

    /// Deliver a payload to the peer's external-message endpoint and return
    /// its JSON response. Fail-fast: one attempt, no retry.
    async fn deliver(&self, receiver_id: &str, payload: &Value) -> Result<Value>;
}

/// HTTP implementation of [`PeerDirectory`]
pub struct RegistryClient {
    client: reqwest::Client,
    registry_url: String,
    agent_id: String,
    resolve_timeout: Duration,
    deliver_timeout: Duration,
}

impl RegistryClient {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry_url: config.registry_url.clone(),
            agent_id: config.agent_id.clone(),
            resolve_timeout: Duration::from_secs(config.resolve_timeout_secs),
            deliver_timeout: Duration::from_secs(config.deliver_timeout_secs),
        }
    }
}

#[async_trait]
impl PeerDirectory for RegistryClient {
    async fn resolve(&self, identifier: &str) -> Result<Option<PeerInfo>> {
        let url = join_url(&self.registry_url, "resolve");
        debug!(identifier, %url, "resolving peer");

        let response = self
            .client
            .post(&url)
            .json(&json!({ "agent_id": identifier }))
            .timeout(self.resolve_timeout)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RegistryError::Status {
                status: response.status().as_u16(),
            });
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;
        PeerInfo::from_document(document).map(Some)
    }

    async fn deliver(&self, receiver_id: &str, payload: &Value) -> Result<Value> {
        let info = self
            .resolve(receiver_id)
            .await?
            .ok_or_else(|| RegistryError::NoEndpoint {
                agent_id: receiver_id.to_string(),
            })?;
        let agent_url = info.agent_url.ok_or_else(|| RegistryError::NoEndpoint {
            agent_id: receiver_id.to_string(),
        })?;

        let endpoint = join_url(&agent_url, "handle_external_message");
        debug!(receiver_id, %endpoint, "delivering A2A payload");

        let response = self
            .client
            .post(&endpoint)
            .json(&json!({ "from": self.agent_id, "message": payload }))
            .timeout(self.deliver_timeout)
            .send()
            .await
            .map_err(|e| RegistryError::Delivery {
                agent_id: receiver_id.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RegistryError::Delivery {
                agent_id: receiver_id.to_string(),
                message: format!("status {}", response.status().as_u16()),
            });
        }

        response.json().await.map_err(|e| RegistryError::Delivery {
            agent_id: receiver_id.to_string(),
            message: e.to_string(),
        })
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_trailing_slash() {
        assert_eq!(join_url("http://a/", "resolve"), "http://a/resolve");
        assert_eq!(join_url("http://a", "resolve"), "http://a/resolve");
    }

    #[test]
    fn peer_info_requires_agent_id() {
        let err = PeerInfo::from_document(json!({"agent_url": "http://x"})).unwrap_err();
        assert!(matches!(err, RegistryError::Malformed(_)));
    }

    #[test]
    fn peer_info_treats_empty_url_as_absent() {
        let info =
            PeerInfo::from_document(json!({"agent_id": "peer-1", "agent_url": ""})).unwrap();
        assert_eq!(info.agent_id, "peer-1");
        assert!(info.agent_url.is_none());
    }

    #[test]
    fn peer_info_keeps_full_document() {
        let doc = json!({
            "agent_id": "peer-1",
            "agent_url": "http://peer",
            "card": {"economy": {"pricing": {}}}
        });
        let info = PeerInfo::from_document(doc.clone()).unwrap();
        assert_eq!(info.document, doc);
        assert_eq!(info.agent_url.as_deref(), Some("http://peer"));
    }

    #[tokio::test]
    async fn unreachable_registry_is_a_transport_error() {
        let config = EngineConfig {
            // Reserved TEST-NET address: nothing listens here
            registry_url: "http://192.0.2.1:9".to_string(),
            resolve_timeout_secs: 1,
            ..Default::default()
        };
        let client = RegistryClient::new(&config);
        let err = client.resolve("peer-1").await.unwrap_err();
        assert!(matches!(err, RegistryError::Transport(_)));
    }
}
