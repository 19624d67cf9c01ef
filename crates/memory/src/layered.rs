//! Layered history store: an in-memory cache in front of the file store.
//!
//! Loads hit memory first; a file hit re-warms the memory layer with the
//! record's original expiry. Saves write through to both layers.

use async_trait::async_trait;
use chatbridge_core::error::StoreError;
use chatbridge_core::memory::HistoryStore;
use chatbridge_core::message::{History, SessionId, SessionRecord};
use std::time::Duration;
use tracing::debug;

use crate::{FileHistoryStore, InMemoryHistoryStore};

pub struct LayeredHistoryStore {
    fast: InMemoryHistoryStore,
    durable: FileHistoryStore,
}

impl LayeredHistoryStore {
    pub fn new(durable: FileHistoryStore) -> Self {
        Self {
            fast: InMemoryHistoryStore::new(),
            durable,
        }
    }
}

#[async_trait]
impl HistoryStore for LayeredHistoryStore {
    fn name(&self) -> &str {
        "layered"
    }

    async fn load(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        if let Some(record) = self.fast.load(session_id).await? {
            return Ok(Some(record));
        }

        let record = self.durable.load(session_id).await?;
        if let Some(record) = &record {
            debug!(session = %session_id, "Re-warming memory layer from file");
            self.fast.put(record.clone()).await;
        }
        Ok(record)
    }

    async fn save(
        &self,
        session_id: &SessionId,
        history: History,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.fast.save(session_id, history.clone(), ttl).await?;
        self.durable.save(session_id, history, ttl).await
    }
}
