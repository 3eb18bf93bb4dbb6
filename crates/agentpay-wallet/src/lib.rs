//! AgentPay Wallet - point balances and transaction records
//!
//! Built entirely on the fact store's get/set primitives:
//!
//! - a wallet is one record (`wallet:<owner>`), overwritten on every update
//! - a transaction is one append-only record (`txn:<id>`) owned by the
//!   receiving agent
//!
//! Balances and the transaction log are maintained independently: transaction
//! records are evidence, never re-derived into balances. A crash between a
//! balance write and the transaction append can therefore leave the two out
//! of sync; that window is accepted by design.
//!
//! There is no locking primitive here. Concurrent charges against the same
//! owner race; the engine relies on a single-writer-per-process assumption.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use agentpay_facts::{FactStore, FactsError};
use agentpay_types::{txn_key, wallet_key, TransactionRecord, WalletState};

/// Errors from ledger operations
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Storage error: {0}")]
    Storage(#[from] FactsError),

    #[error("Malformed wallet record for {owner}: {message}")]
    MalformedWallet { owner: String, message: String },
}

pub type Result<T> = std::result::Result<T, WalletError>;

/// Balance reads/writes and transaction appends over a fact store
#[derive(Clone)]
pub struct WalletLedger {
    facts: Arc<FactStore>,
}

impl WalletLedger {
    pub fn new(facts: Arc<FactStore>) -> Self {
        Self { facts }
    }

    /// Current balance of `owner`; 0 when no wallet record exists yet
    pub async fn balance(&self, owner: &str) -> Result<u64> {
        let record = self.facts.get(owner, &wallet_key(owner)).await?;
        match record {
            None => Ok(0),
            Some(record) => {
                let wallet: WalletState = serde_json::from_value(record.value).map_err(|e| {
                    WalletError::MalformedWallet {
                        owner: owner.to_string(),
                        message: e.to_string(),
                    }
                })?;
                Ok(wallet.balance)
            }
        }
    }

    /// Overwrite `owner`'s wallet with a new balance.
    ///
    /// Unconditional write with a fresh `observedAt`; the caller is
    /// responsible for having read the prior balance in the same logical
    /// operation.
    pub async fn set_balance(&self, owner: &str, balance: u64) -> Result<()> {
        let wallet = WalletState::new(owner, balance);
        debug!(owner, balance, "writing wallet record");
        self.facts
            .set(owner, &wallet_key(owner), serde_json::to_value(&wallet)?)
            .await?;
        Ok(())
    }

    /// Append one transaction record, owned by the receiving agent.
    ///
    /// The caller guarantees `txn_id` uniqueness; an id collision would
    /// silently overwrite under last-write-wins.
    pub async fn record_transaction(&self, txn: &TransactionRecord) -> Result<()> {
        debug!(txn_id = %txn.txn_id, points = txn.points, "recording transaction");
        self.facts
            .set(&txn.to, &txn_key(&txn.txn_id), serde_json::to_value(txn)?)
            .await?;
        Ok(())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::Storage(FactsError::Serialization(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_in(dir: &tempfile::TempDir) -> WalletLedger {
        let store = FactStore::local(dir.path().join("facts.json"));
        WalletLedger::new(Arc::new(store))
    }

    #[tokio::test]
    async fn absent_wallet_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        assert_eq!(ledger.balance("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_balance_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);

        ledger.set_balance("alice", 10).await.unwrap();
        assert_eq!(ledger.balance("alice").await.unwrap(), 10);

        ledger.set_balance("alice", 4).await.unwrap();
        assert_eq!(ledger.balance("alice").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn transaction_record_lands_under_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FactStore::local(dir.path().join("facts.json")));
        let ledger = WalletLedger::new(store.clone());

        let txn = TransactionRecord::new("txn_1", "alice", "self-agent", 6, "why?", "peer-1");
        ledger.record_transaction(&txn).await.unwrap();

        let stored = store
            .get("self-agent", &txn_key("txn_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value["points"], 6);
        assert_eq!(stored.value["from"], "alice");
    }

    #[tokio::test]
    async fn malformed_wallet_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FactStore::local(dir.path().join("facts.json")));
        let ledger = WalletLedger::new(store.clone());

        store
            .set("alice", &wallet_key("alice"), serde_json::json!({"balance": "ten"}))
            .await
            .unwrap();
        assert!(matches!(
            ledger.balance("alice").await,
            Err(WalletError::MalformedWallet { .. })
        ));
    }
}
