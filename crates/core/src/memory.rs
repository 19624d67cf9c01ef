//! History store trait: bounded-TTL persistence of session histories.
//!
//! The engine only relies on `load`/`save` with a time-to-live; whether the
//! backing store is a process-local map, files on disk or something else is
//! an implementation detail. Concurrent saves for the same session are
//! last-writer-wins.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;
use crate::message::{History, SessionId, SessionRecord};

/// Key-value store of session histories with expiry.
///
/// Implementations: in-memory, file-backed, layered (memory in front of file).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Load a live record. Expired records are dropped and reported as absent.
    async fn load(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// Replace the session's history; it lives for `ttl` from now.
    async fn save(
        &self,
        session_id: &SessionId,
        history: History,
        ttl: Duration,
    ) -> Result<(), StoreError>;
}
