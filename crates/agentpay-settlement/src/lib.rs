//! AgentPay Settlement - the quote-and-charge engine
//!
//! End-to-end negotiation of a points payment for answering a question:
//!
//! ```text
//! ResolvingPeer -> CheckingCapability -> CheckingIdempotency
//!     -> {Repeat | Charging} -> Delivering -> Done
//! ```
//!
//! with early exits `PeerNotFound`, `PeerCannotAcceptPayment`, and
//! `InsufficientPoints`. Business outcomes are values, never errors; `Err` is
//! reserved for registry transport faults and storage faults.
//!
//! # Commit-before-confirm
//!
//! The charge (debit, credit, transaction record) commits before the quote is
//! delivered to the peer, and a delivery failure is captured into the result
//! rather than rolling the charge back. `Charged` with an embedded delivery
//! error therefore means "billed, peer notification uncertain". The debit and
//! credit are two unconditional overwrites, not one atomic update, and the
//! interaction marker is written before the balance check: an
//! insufficient-funds attempt still marks the question as billed. Both
//! inconsistencies are accepted trades for a lock-free single-writer store.

pub mod pricing;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use agentpay_facts::{FactStore, FactsError};
use agentpay_oracle::CapabilityOracle;
use agentpay_registry::{PeerDirectory, RegistryError};
use agentpay_types::{
    question_hash, question_key, EngineConfig, InteractionMarker, TransactionRecord,
};
use agentpay_wallet::{WalletError, WalletLedger};

pub use pricing::{decide_points, MAX_POINTS, MIN_POINTS};

/// Faults that abort a negotiation outright. Business-rule failures are not
/// here; they are [`QuoteOutcome`] variants.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Storage error: {0}")]
    Storage(#[from] FactsError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, SettlementError>;

/// What happened when the quote was pushed to the peer.
///
/// Serializes as the raw peer response, or `{"error": ...}` when the exchange
/// failed — the failure is captured, never raised.
///
/// Untagged, with `Failed` tried first: a peer response whose entire body is
/// `{"error": <string>}` is indistinguishable from a captured failure and
/// deserializes as `Failed`. The engine only serializes; deserialization
/// exists for consumers of the wire form, which inherit that ambiguity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeliveryOutcome {
    Failed { error: String },
    Delivered(Value),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered(_))
    }
}

/// Structured result of one negotiation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QuoteOutcome {
    /// The registry has no peer under the given identifier
    PeerNotFound,
    /// The peer resolved but cannot accept a points payment
    PeerCannotAcceptPayment { peer_agent: String },
    /// The payer's balance does not cover the computed price
    InsufficientPoints { required: u64, available: u64 },
    /// This exact question was already billed; a zero-point quote was sent
    Repeat { delivery: DeliveryOutcome },
    /// Payment committed and quote dispatched
    Charged {
        points: u64,
        txn_id: String,
        delivery: DeliveryOutcome,
    },
}

impl QuoteOutcome {
    /// True for the outcomes reported as `ok` on the wire: the negotiation
    /// ran to completion, whether or not a charge was applied
    pub fn ok(&self) -> bool {
        matches!(self, QuoteOutcome::Repeat { .. } | QuoteOutcome::Charged { .. })
    }

    pub fn charged(&self) -> bool {
        matches!(self, QuoteOutcome::Charged { .. })
    }

    /// Points billed by this run (0 for repeats and failures)
    pub fn points(&self) -> u64 {
        match self {
            QuoteOutcome::Charged { points, .. } => *points,
            _ => 0,
        }
    }
}

/// The quote-and-charge orchestrator
pub struct QuoteEngine {
    facts: Arc<FactStore>,
    ledger: WalletLedger,
    directory: Arc<dyn PeerDirectory>,
    oracle: Arc<dyn CapabilityOracle>,
    agent_id: String,
}

impl QuoteEngine {
    pub fn new(
        facts: Arc<FactStore>,
        directory: Arc<dyn PeerDirectory>,
        oracle: Arc<dyn CapabilityOracle>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ledger: WalletLedger::new(facts.clone()),
            facts,
            directory,
            oracle,
            agent_id: config.agent_id.clone(),
        }
    }

    /// Negotiate and settle a points payment for `question` asked by
    /// `username`, quoting the peer behind `peer_identifier`.
    ///
    /// At most three outbound calls (resolve, classify, deliver), each with a
    /// bounded timeout and no retry. Concurrent runs for the same payer or
    /// question race; callers serialize per owner if they need stronger
    /// guarantees.
    pub async fn quote_and_charge(
        &self,
        username: &str,
        peer_identifier: &str,
        question: &str,
        use_x402: bool,
    ) -> Result<QuoteOutcome> {
        // 1. Resolve the peer. Absent is a business outcome; an unreachable
        // registry propagates as an error.
        let peer = match self.directory.resolve(peer_identifier).await? {
            Some(peer) => peer,
            None => {
                info!(peer_identifier, "peer not found");
                return Ok(QuoteOutcome::PeerNotFound);
            }
        };

        // 2. Capability gate, before any wallet access.
        if !self.oracle.can_accept_payment(&peer.document).await {
            info!(peer_agent = %peer.agent_id, "peer cannot accept payment");
            return Ok(QuoteOutcome::PeerCannotAcceptPayment {
                peer_agent: peer.agent_id,
            });
        }

        // 3. Idempotency: the marker's existence means this exact question
        // from this user has already been billed.
        let marker_key = question_key(username, question);
        let seen = self.facts.get(&self.agent_id, &marker_key).await?.is_some();

        if seen {
            let payload = json!({ "type": "quote", "points": 0, "reason": "repeat_question" });
            let delivery = self.deliver_captured(&peer.agent_id, &payload).await;
            return Ok(QuoteOutcome::Repeat { delivery });
        }

        // 4. Mark the question billed before the balance check; an
        // insufficient-funds exit below leaves the marker behind.
        let marker = InteractionMarker::new(username, question);
        self.facts
            .set(&self.agent_id, &marker_key, serde_json::to_value(&marker).map_err(FactsError::from)?)
            .await?;

        let points = decide_points(question, false);

        // 5. Balance floor: never debit below zero.
        let available = self.ledger.balance(username).await?;
        if available < points {
            info!(username, required = points, available, "insufficient points");
            return Ok(QuoteOutcome::InsufficientPoints {
                required: points,
                available,
            });
        }

        // 6. Debit payer, credit self. Two overwrites, not atomic.
        self.ledger.set_balance(username, available - points).await?;
        let own_balance = self.ledger.balance(&self.agent_id).await?;
        self.ledger
            .set_balance(&self.agent_id, own_balance + points)
            .await?;

        // 7. Transaction id: time plus a deterministic participant hash.
        let txn_id = format!(
            "txn_{}_{}",
            Utc::now().timestamp(),
            question_hash(&format!("{}{}", username, question))
        );
        let txn = TransactionRecord::new(
            &txn_id,
            username,
            &self.agent_id,
            points,
            question,
            &peer.agent_id,
        );
        self.ledger.record_transaction(&txn).await?;
        info!(txn_id = %txn_id, username, points, peer_agent = %peer.agent_id, "charge committed");

        // 8. Dispatch the quote. The charge above is already committed and is
        // not rolled back if the peer is unreachable.
        let payload = json!({
            "type": if use_x402 { "x402.quote" } else { "price_quote" },
            "amount_points": points,
            "currency": "POINTS",
            "question": question,
        });
        let delivery = self.deliver_captured(&peer.agent_id, &payload).await;

        Ok(QuoteOutcome::Charged {
            points,
            txn_id,
            delivery,
        })
    }

    async fn deliver_captured(&self, receiver_id: &str, payload: &Value) -> DeliveryOutcome {
        match self.directory.deliver(receiver_id, payload).await {
            Ok(response) => DeliveryOutcome::Delivered(response),
            Err(e) => {
                warn!(receiver_id, error = %e, "quote delivery failed; charge state unchanged");
                DeliveryOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
