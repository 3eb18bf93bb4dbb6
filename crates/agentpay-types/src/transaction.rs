//! Wallet state, transaction records, and interaction markers
//!
//! These are the typed shapes of the JSON values stored inside fact records.
//! Field names mirror the on-disk/wire document layout (`txnId`, `observedAt`),
//! so serializing one of these produces exactly the persisted value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::FACTS_TYPE;

fn facts_type() -> String {
    FACTS_TYPE.to_string()
}

/// An owner's point balance.
///
/// Exactly one wallet record exists per owner at any time; it is overwritten
/// on every balance change, never appended. Created implicitly on the first
/// debit or credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletState {
    #[serde(rename = "@type", default = "facts_type")]
    pub schema: String,
    pub category: String,
    pub owner: String,
    pub balance: u64,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

impl WalletState {
    pub fn new(owner: impl Into<String>, balance: u64) -> Self {
        Self {
            schema: facts_type(),
            category: "wallet".to_string(),
            owner: owner.into(),
            balance,
            observed_at: Utc::now(),
        }
    }
}

/// Immutable evidence of a completed points transfer.
///
/// Append-only: each charge creates exactly one new transaction record and it
/// is never mutated afterwards. Transactions are never used to re-derive
/// balances; balances and the transaction log are maintained independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(rename = "@type", default = "facts_type")]
    pub schema: String,
    pub category: String,
    #[serde(rename = "txnId")]
    pub txn_id: String,
    pub from: String,
    pub to: String,
    pub points: u64,
    pub question: String,
    pub peer_agent: String,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        txn_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        points: u64,
        question: impl Into<String>,
        peer_agent: impl Into<String>,
    ) -> Self {
        Self {
            schema: facts_type(),
            category: "transaction".to_string(),
            txn_id: txn_id.into(),
            from: from.into(),
            to: to.into(),
            points,
            question: question.into(),
            peer_agent: peer_agent.into(),
            observed_at: Utc::now(),
        }
    }
}

/// Idempotency marker for a billed `(user, question)` pair.
///
/// Its mere existence under `q:<user>:<hash>` means the exact question has
/// already been billed for that user; the value is informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionMarker {
    #[serde(rename = "@type", default = "facts_type")]
    pub schema: String,
    pub category: String,
    pub user: String,
    pub question: String,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

impl InteractionMarker {
    pub fn new(user: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            schema: facts_type(),
            category: "interaction".to_string(),
            user: user.into(),
            question: question.into(),
            observed_at: Utc::now(),
        }
    }
}
