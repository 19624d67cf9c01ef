//! File-backed history store, one JSON document per session.
//!
//! Storage location: `<dir>/chat_hist_<session-id>.json`, where `<dir>`
//! defaults to the system temp directory. Session ids are validated UUIDs,
//! so they are safe to embed in file names.
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! concurrent reader never observes a half-written record.

use async_trait::async_trait;
use chatbridge_core::error::StoreError;
use chatbridge_core::memory::HistoryStore;
use chatbridge_core::message::{History, SessionId, SessionRecord};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::expiry_after;

pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("chat_hist_{}.json", session_id.as_str()))
    }

    async fn remove_quietly(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove stale history file");
            }
        }
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.path_for(session_id);
        let content = match tokio::fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let record: SessionRecord = match serde_json::from_slice(&content) {
            Ok(r) => r,
            Err(e) => {
                let err = StoreError::Corrupt(format!("{}: {e}", path.display()));
                warn!(error = %err, "Discarding history file");
                Self::remove_quietly(&path).await;
                return Ok(None);
            }
        };

        if record.is_expired(Utc::now()) || &record.session_id != session_id {
            debug!(session = %session_id, "History file expired");
            Self::remove_quietly(&path).await;
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn save(
        &self,
        session_id: &SessionId,
        history: History,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let record = SessionRecord {
            session_id: session_id.clone(),
            history,
            expires_at: expiry_after(Utc::now(), ttl),
        };
        let json = serde_json::to_vec(&record)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize history: {e}")))?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Storage(format!("Failed to create history directory: {e}"))
        })?;

        // One temp file per write: concurrent saves of a session must not share it.
        let path = self.path_for(session_id);
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write history file: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to move history file: {e}")))?;

        debug!(session = %session_id, messages = record.history.len(), "History saved to file");
        Ok(())
    }
}
