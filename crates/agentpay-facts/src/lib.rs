//! AgentPay Facts - keyed durable record storage for agents
//!
//! The fact store holds every record an agent owns: wallets, transactions,
//! and interaction markers. Two interchangeable backends:
//!
//! - **Durable**: a SQL database reached through `DATABASE_URL`, probed at
//!   construction with a bounded-time ping
//! - **LocalFile**: a single JSON document, loaded whole and rewritten whole
//!   on every mutation
//!
//! Backend choice is fixed when the store is constructed and invisible to
//! callers afterwards; both obey the same contracts. An unreachable database
//! downgrades to the file backend with a logged warning; callers can observe
//! the degraded mode through [`FactStore::backend_kind`].

pub mod file;
pub mod sqlite;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use agentpay_types::{EngineConfig, FactRecord};

pub use file::FileBackend;
pub use sqlite::SqliteBackend;

/// Errors from fact store operations
#[derive(Debug, Error)]
pub enum FactsError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error on facts file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp in stored record: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("Invalid facts table name: {0}")]
    InvalidTableName(String),
}

pub type Result<T> = std::result::Result<T, FactsError>;

/// Storage backend contract.
///
/// Upsert semantics: `set` on an existing `(owner, key)` overwrites the
/// previous record (last-write-wins, no versioning). Records are never
/// deleted in normal operation.
#[async_trait]
pub trait FactBackend: Send + Sync {
    async fn set(&self, record: FactRecord) -> Result<()>;

    async fn get(&self, owner_id: &str, key: &str) -> Result<Option<FactRecord>>;

    /// All records owned by `owner_id`, keyed by record key
    async fn list(&self, owner_id: &str) -> Result<HashMap<String, FactRecord>>;
}

/// Which backend a store ended up with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// SQL database backend
    Durable,
    /// Whole-file JSON backend
    LocalFile,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Durable => write!(f, "durable"),
            BackendKind::LocalFile => write!(f, "local-file"),
        }
    }
}

/// The fact store: one backend, selected at construction
pub struct FactStore {
    backend: Box<dyn FactBackend>,
    kind: BackendKind,
}

impl FactStore {
    /// Connect using the configured database when possible, otherwise the
    /// local file.
    ///
    /// A database connectivity failure is not fatal: the store downgrades to
    /// the file backend and keeps working. The downgrade is logged and
    /// visible via [`backend_kind`](Self::backend_kind).
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        if let Some(url) = &config.database_url {
            match SqliteBackend::connect(url, &config.db_name).await {
                Ok(backend) => {
                    info!(
                        url = %config.database_url_masked().unwrap_or_default(),
                        table = %config.db_name,
                        "fact store using durable database backend"
                    );
                    return Ok(Self {
                        backend: Box::new(backend),
                        kind: BackendKind::Durable,
                    });
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        path = %config.facts_path.display(),
                        "database unreachable, fact store degraded to local file backend"
                    );
                }
            }
        }
        Ok(Self::local(config.facts_path.clone()))
    }

    /// A store over the local file backend only
    pub fn local(path: std::path::PathBuf) -> Self {
        Self {
            backend: Box::new(FileBackend::new(path)),
            kind: BackendKind::LocalFile,
        }
    }

    /// Backend this store was constructed with; `LocalFile` where a database
    /// URL was configured means the store is running degraded.
    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// Upsert a record under `(owner_id, key)`
    pub async fn set(&self, owner_id: &str, key: &str, value: serde_json::Value) -> Result<()> {
        self.backend.set(FactRecord::new(owner_id, key, value)).await
    }

    /// Latest record under `(owner_id, key)`, if any
    pub async fn get(&self, owner_id: &str, key: &str) -> Result<Option<FactRecord>> {
        self.backend.get(owner_id, key).await
    }

    /// All records owned by `owner_id`, keyed by record key
    pub async fn list(&self, owner_id: &str) -> Result<HashMap<String, FactRecord>> {
        self.backend.list(owner_id).await
    }
}
