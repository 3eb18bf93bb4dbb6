//! Fact records and record keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Schema tag carried inside every stored record value
pub const FACTS_TYPE: &str = "AgentFacts";

/// A single keyed document owned by an agent.
///
/// Uniquely identified by `(owner_id, key)`. The value is an opaque JSON
/// document; the store does not interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    /// Agent that owns this record
    pub owner_id: String,
    /// Record key within the owner's namespace
    pub key: String,
    /// Opaque JSON value
    pub value: serde_json::Value,
    /// When the record was last written
    pub observed_at: DateTime<Utc>,
}

impl FactRecord {
    /// Create a record stamped with the current time
    pub fn new(owner_id: impl Into<String>, key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            owner_id: owner_id.into(),
            key: key.into(),
            value,
            observed_at: Utc::now(),
        }
    }

    /// Composite key used by the file backend: `<owner>:<key>`
    pub fn composite_key(&self) -> String {
        composite_key(&self.owner_id, &self.key)
    }
}

/// Composite `<owner>:<key>` string keying the file backend's top-level map
pub fn composite_key(owner_id: &str, key: &str) -> String {
    format!("{}:{}", owner_id, key)
}

/// Key of an owner's wallet record: `wallet:<owner>`
pub fn wallet_key(owner: &str) -> String {
    format!("wallet:{}", owner)
}

/// Key of a transaction record: `txn:<id>`
pub fn txn_key(txn_id: &str) -> String {
    format!("txn:{}", txn_id)
}

/// Key of the idempotency marker for a `(user, question)` pair:
/// `q:<user>:<hash(question)>`
pub fn question_key(user: &str, question: &str) -> String {
    format!("q:{}:{}", user, question_hash(question))
}

/// First 16 hex characters of the SHA-256 of the input.
///
/// Repeat detection is by exact-string hash, not semantic similarity.
pub fn question_hash(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_hash_is_stable_and_short() {
        let a = question_hash("what is a matrix?");
        let b = question_hash("what is a matrix?");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn question_hash_distinguishes_exact_strings() {
        assert_ne!(question_hash("hello"), question_hash("hello "));
    }

    #[test]
    fn key_builders() {
        assert_eq!(wallet_key("alice"), "wallet:alice");
        assert_eq!(txn_key("txn_1"), "txn:txn_1");
        let qk = question_key("alice", "hi");
        assert!(qk.starts_with("q:alice:"));
        assert_eq!(qk.len(), "q:alice:".len() + 16);
    }
}
