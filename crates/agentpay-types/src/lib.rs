//! AgentPay Types - Canonical domain types for agent-to-agent points settlement
//!
//! This crate contains the foundational types for AgentPay with zero dependencies
//! on other agentpay crates:
//!
//! - Fact records: the keyed documents persisted by the fact store
//! - Wallet state, transaction records, and interaction markers
//! - Record key builders and the question hash
//! - Engine configuration read from the environment
//!
//! # Record model
//!
//! Every persisted document is a [`FactRecord`] uniquely identified by
//! `(owner_id, key)`. The store is last-write-wins: setting the same key
//! overwrites the previous record, and records are never deleted in normal
//! operation. Wallets are single overwritten records; transactions and
//! interaction markers are append-only.

pub mod config;
pub mod record;
pub mod transaction;

pub use config::*;
pub use record::*;
pub use transaction::*;
