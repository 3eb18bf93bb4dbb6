//! Durable SQL backend
//!
//! One table, named by the configured logical database name, keyed by
//! `(owner_id, key)` with the JSON value and timestamp as text columns.
//! Connectivity is probed at construction with a bounded acquire timeout and
//! a ping query; failures there surface to the factory, which falls back to
//! the file backend.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use agentpay_types::FactRecord;

use crate::{FactBackend, FactsError, Result};

const PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// SQL database backend over a sqlx SQLite pool
pub struct SqliteBackend {
    pool: SqlitePool,
    table: String,
}

impl SqliteBackend {
    /// Open the database, ping it, and ensure the facts table exists.
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        validate_table_name(table)?;

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Single connection: the store is single-writer by design, and SQLite
        // in-memory databases are per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(PROBE_TIMEOUT)
            .connect_with(options)
            .await?;

        // Connectivity probe before committing to this backend
        sqlx::query("SELECT 1").execute(&pool).await?;

        let backend = Self {
            pool,
            table: table.to_string(),
        };
        backend.ensure_schema().await?;
        Ok(backend)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                owner_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                observed_at TEXT NOT NULL,
                PRIMARY KEY (owner_id, key)
            )",
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    fn record_from_row(owner_id: &str, row: &sqlx::sqlite::SqliteRow) -> Result<FactRecord> {
        let key: String = row.get("key");
        let value: String = row.get("value");
        let observed_at: String = row.get("observed_at");
        Ok(FactRecord {
            owner_id: owner_id.to_string(),
            key,
            value: serde_json::from_str(&value)?,
            observed_at: DateTime::parse_from_rfc3339(&observed_at)?.with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl FactBackend for SqliteBackend {
    async fn set(&self, record: FactRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (owner_id, key, value, observed_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (owner_id, key)
             DO UPDATE SET value = excluded.value, observed_at = excluded.observed_at",
            self.table
        );
        sqlx::query(&sql)
            .bind(&record.owner_id)
            .bind(&record.key)
            .bind(serde_json::to_string(&record.value)?)
            .bind(record.observed_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, owner_id: &str, key: &str) -> Result<Option<FactRecord>> {
        let sql = format!(
            "SELECT key, value, observed_at FROM {} WHERE owner_id = ?1 AND key = ?2",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(owner_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::record_from_row(owner_id, &r)).transpose()
    }

    async fn list(&self, owner_id: &str) -> Result<HashMap<String, FactRecord>> {
        let sql = format!(
            "SELECT key, value, observed_at FROM {} WHERE owner_id = ?1",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                let record = Self::record_from_row(owner_id, r)?;
                Ok((record.key.clone(), record))
            })
            .collect()
    }
}

/// The table name comes from configuration, not user input, but it is
/// interpolated into SQL and must stay a plain identifier.
fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(FactsError::InvalidTableName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_backend() -> SqliteBackend {
        SqliteBackend::connect("sqlite::memory:", "agent_registry")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let backend = memory_backend().await;
        let record = FactRecord::new("alice", "wallet:alice", json!({"balance": 10}));
        backend.set(record.clone()).await.unwrap();

        let loaded = backend.get("alice", "wallet:alice").await.unwrap().unwrap();
        assert_eq!(loaded.value, record.value);
        assert_eq!(loaded.key, "wallet:alice");
        assert_eq!(loaded.owner_id, "alice");
    }

    #[tokio::test]
    async fn get_absent_is_none() {
        let backend = memory_backend().await;
        assert!(backend.get("alice", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_is_last_write_wins() {
        let backend = memory_backend().await;
        backend
            .set(FactRecord::new("alice", "k", json!({"v": 1})))
            .await
            .unwrap();
        backend
            .set(FactRecord::new("alice", "k", json!({"v": 2})))
            .await
            .unwrap();

        let loaded = backend.get("alice", "k").await.unwrap().unwrap();
        assert_eq!(loaded.value, json!({"v": 2}));
        assert_eq!(backend.list("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner() {
        let backend = memory_backend().await;
        backend
            .set(FactRecord::new("alice", "txn:t1", json!(1)))
            .await
            .unwrap();
        backend
            .set(FactRecord::new("bob", "txn:t2", json!(2)))
            .await
            .unwrap();

        let listed = backend.list("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed.contains_key("txn:t1"));
    }

    #[tokio::test]
    async fn rejects_non_identifier_table_names() {
        let result = SqliteBackend::connect("sqlite::memory:", "facts; DROP TABLE x").await;
        assert!(matches!(result, Err(FactsError::InvalidTableName(_))));
    }
}
