//! In-memory history store, process-local, lost on restart.

use async_trait::async_trait;
use chatbridge_core::error::StoreError;
use chatbridge_core::memory::HistoryStore;
use chatbridge_core::message::{History, SessionId, SessionRecord};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::expiry_after;

/// A store that keeps session records in a map.
/// Also used as the fast layer of [`crate::LayeredHistoryStore`].
pub struct InMemoryHistoryStore {
    records: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record as-is, keeping its expiry. Every other expired
    /// record is swept out on the way, so sessions that never return do not
    /// accumulate.
    pub(crate) async fn put(&self, record: SessionRecord) {
        let now = Utc::now();
        let mut records = self.records.write().await;
        records.retain(|_, r| !r.is_expired(now));
        records.insert(record.session_id.clone(), record);
    }

    /// Number of records currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let now = Utc::now();
        {
            let records = self.records.read().await;
            match records.get(session_id) {
                None => return Ok(None),
                Some(record) if !record.is_expired(now) => return Ok(Some(record.clone())),
                Some(_) => {}
            }
        }

        // Expired: evict under the write lock, re-checking in case a save raced us.
        let mut records = self.records.write().await;
        if records.get(session_id).is_some_and(|r| r.is_expired(now)) {
            records.remove(session_id);
        }
        Ok(None)
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
        self.put(record).await;
        Ok(())
    }
}
