//! Queue persistence backends
//!
//! [`JsonQueueStore`] keeps the retry queue in a versioned JSON document so
//! undelivered posts survive restarts. Writes go to a sibling temp file that
//! is renamed over the target, so a crash mid-write leaves the previous
//! document intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tern_core::QueueStore;
use tern_domain::constants::QUEUE_PERSISTENCE_VERSION;
use tern_domain::{QueueSnapshot, Result, TernError};
use tracing::{debug, info};

use crate::errors::InfraError;

#[derive(Serialize)]
struct QueueDocumentRef<'a> {
    version: u32,
    #[serde(flatten)]
    snapshot: &'a QueueSnapshot,
}

#[derive(Deserialize)]
struct QueueDocument {
    version: u32,
    #[serde(flatten)]
    snapshot: QueueSnapshot,
}

/// File-backed [`QueueStore`].
#[derive(Debug)]
pub struct JsonQueueStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: tokio::sync::Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl QueueStore for JsonQueueStore {
    async fn load(&self) -> Result<QueueSnapshot> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "queue_store.missing_file");
                return Ok(QueueSnapshot::default());
            }
            Err(err) => return Err(InfraError::from(err).into()),
        };

        let document: QueueDocument =
            serde_json::from_slice(&bytes).map_err(|err| TernError::from(InfraError::from(err)))?;
        if document.version != QUEUE_PERSISTENCE_VERSION {
            return Err(TernError::Storage(format!(
                "unsupported queue file version {} (expected {QUEUE_PERSISTENCE_VERSION})",
                document.version
            )));
        }

        info!(
            path = %self.path.display(),
            pending = document.snapshot.pending.len(),
            failed = document.snapshot.failed.len(),
            "queue_store.loaded"
        );
        Ok(document.snapshot)
    }

    async fn save(&self, snapshot: &QueueSnapshot) -> Result<()> {
        let document = QueueDocumentRef { version: QUEUE_PERSISTENCE_VERSION, snapshot };
        let bytes =
            serde_json::to_vec_pretty(&document).map_err(|err| TernError::from(InfraError::from(err)))?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(InfraError::from)?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await.map_err(InfraError::from)?;
        tokio::fs::rename(&temp, &self.path).await.map_err(InfraError::from)?;

        debug!(
            path = %self.path.display(),
            pending = snapshot.pending.len(),
            failed = snapshot.failed.len(),
            "queue_store.saved"
        );
        Ok(())
    }
}

/// In-memory [`QueueStore`] used when no persistence path is configured.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    snapshot: parking_lot::Mutex<QueueSnapshot>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load(&self) -> Result<QueueSnapshot> {
        Ok(self.snapshot.lock().clone())
    }

    async fn save(&self, snapshot: &QueueSnapshot) -> Result<()> {
        *self.snapshot.lock() = snapshot.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_file_sits_next_to_target() {
        let store = JsonQueueStore::new("/var/lib/tern/queue.json");
        assert_eq!(store.temp_path(), PathBuf::from("/var/lib/tern/queue.json.tmp"));
    }

    #[tokio::test]
    async fn memory_store_round_trips_latest_snapshot() {
        let store = MemoryQueueStore::new();
        assert_eq!(store.load().await.unwrap(), QueueSnapshot::default());

        store.save(&QueueSnapshot::default()).await.unwrap();
        assert!(store.load().await.unwrap().pending.is_empty());
    }
}
