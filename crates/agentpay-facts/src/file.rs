//! Whole-file JSON backend
//!
//! On-disk layout: a single JSON object mapping `"<owner>:<key>"` to the full
//! record document. Every `set` loads the whole document, mutates it in
//! memory, and rewrites the file (read-modify-write, not append).

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use agentpay_types::{composite_key, FactRecord};

use crate::{FactBackend, Result};

/// Local JSON file backend
pub struct FileBackend {
    path: PathBuf,
    // Serializes load-modify-save cycles within this process. Cross-process
    // writers are outside the model (single-writer-per-process assumption).
    lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Load the full record map.
    ///
    /// A missing file is an empty store. An unreadable or corrupt file is
    /// also treated as empty, with a warning: callers must not depend on
    /// `get`/`list` before the first successful `set` on a corrupted file.
    async fn load(&self) -> HashMap<String, FactRecord> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "corrupt facts file, treating store as empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable facts file, treating store as empty");
                HashMap::new()
            }
        }
    }

    async fn save(&self, data: &HashMap<String, FactRecord>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl FactBackend for FileBackend {
    async fn set(&self, record: FactRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await;
        data.insert(record.composite_key(), record);
        self.save(&data).await
    }

    async fn get(&self, owner_id: &str, key: &str) -> Result<Option<FactRecord>> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await;
        Ok(data.remove(&composite_key(owner_id, key)))
    }

    async fn list(&self, owner_id: &str) -> Result<HashMap<String, FactRecord>> {
        let _guard = self.lock.lock().await;
        let prefix = format!("{}:", owner_id);
        Ok(self
            .load()
            .await
            .into_iter()
            .filter_map(|(composite, record)| {
                composite
                    .strip_prefix(&prefix)
                    .map(|key| (key.to_string(), record))
            })
            .collect())
    }
}
