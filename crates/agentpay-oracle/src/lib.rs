//! AgentPay Oracle - can this peer accept a points payment?
//!
//! Given a peer's published capability document, the oracle decides whether
//! the peer can be paid. Two strategies, picked by configuration:
//!
//! - [`HeuristicOracle`]: pricing structure under `economy`, or a capability
//!   listing that mentions the points-payment or x402 protocol
//! - [`ClassifierOracle`]: asks the Anthropic Messages API for a literal
//!   `true`/`false` decision, falling back to an economy/capability presence
//!   check when the call fails or the answer is ambiguous
//!
//! The oracle never raises to its caller: it always resolves to a boolean,
//! trading a small chance of a wrong accept/reject for negotiation liveness.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use agentpay_types::EngineConfig;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Failures of a classification call. Never surfaced to the oracle's caller;
/// they downgrade to the presence fallback.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle network error: {0}")]
    Network(String),

    #[error("Oracle returned status {status}")]
    Status { status: u16 },

    #[error("Malformed oracle response: {0}")]
    Malformed(String),
}

/// Decides whether a peer can accept payment. Infallible by contract.
#[async_trait]
pub trait CapabilityOracle: Send + Sync {
    async fn can_accept_payment(&self, document: &Value) -> bool;
}

/// Pick the classifier when an API key is configured, the heuristic otherwise
pub fn oracle_from_config(config: &EngineConfig) -> Arc<dyn CapabilityOracle> {
    match &config.anthropic_api_key {
        Some(key) if !key.is_empty() => Arc::new(ClassifierOracle::new(
            key.clone(),
            Duration::from_secs(config.oracle_timeout_secs),
        )),
        _ => Arc::new(HeuristicOracle),
    }
}

/// Some registries wrap the capability card under a `card` field
fn unwrap_card(document: &Value) -> &Value {
    match document.get("card") {
        Some(card) if card.is_object() => card,
        _ => document,
    }
}

/// True iff the card exposes a pricing object under `economy`, or its
/// capability listing textually mentions the points-payment or x402 protocol
fn heuristic_accepts(card: &Value) -> bool {
    let has_pricing = card
        .get("economy")
        .and_then(|e| e.get("pricing"))
        .map(Value::is_object)
        .unwrap_or(false);

    let caps_text = card
        .get("capabilities")
        .map(|c| c.to_string())
        .unwrap_or_default();
    let has_capability = caps_text.contains("payments.points") || caps_text.contains("x402");

    has_pricing || has_capability
}

/// Weaker fallback used when the classifier call fails: any non-empty
/// `economy` or `capabilities` section counts as acceptance
fn presence_fallback(card: &Value) -> bool {
    let non_empty = |v: &Value| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Object(m) => !m.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
    };
    card.get("economy").map(non_empty).unwrap_or(false)
        || card.get("capabilities").map(non_empty).unwrap_or(false)
}

/// The decision token must be "true" XOR "false"; both or neither is
/// ambiguous and yields no decision
fn parse_decision(text: &str) -> Option<bool> {
    let t = text.to_lowercase();
    match (t.contains("true"), t.contains("false")) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

/// Heuristic-only oracle, used when no API credential is configured
pub struct HeuristicOracle;

#[async_trait]
impl CapabilityOracle for HeuristicOracle {
    async fn can_accept_payment(&self, document: &Value) -> bool {
        heuristic_accepts(unwrap_card(document))
    }
}

/// LLM-backed oracle over the Anthropic Messages API
pub struct ClassifierOracle {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

impl ClassifierOracle {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: ANTHROPIC_API_URL.to_string(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            timeout,
        }
    }

    /// Point the classifier at a different endpoint (proxies, test servers)
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    async fn classify(&self, card: &Value) -> Result<String, OracleError> {
        let prompt = format!(
            "Check if an AI agent can accept payment from its AgentFacts JSON. \
             Return only 'true' or 'false'.\n\nAgentFacts: {}",
            card
        );
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 20,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Status {
                status: response.status().as_u16(),
            });
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        Ok(body
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<String>())
    }
}

#[async_trait]
impl CapabilityOracle for ClassifierOracle {
    async fn can_accept_payment(&self, document: &Value) -> bool {
        let card = unwrap_card(document);
        match self.classify(card).await {
            Ok(text) => match parse_decision(&text) {
                Some(decision) => decision,
                None => {
                    warn!(text = %text, "ambiguous oracle answer, using presence fallback");
                    presence_fallback(card)
                }
            },
            Err(e) => {
                warn!(error = %e, "oracle call failed, using presence fallback");
                presence_fallback(card)
            }
        }
    }
}
