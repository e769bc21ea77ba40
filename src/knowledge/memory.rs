//! Process-local record store.

use crate::knowledge::store::{CasOutcome, KnowledgeStore, StoreError};
use crate::knowledge::types::{KnowledgeRecord, ProcessingStatus, StatusUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Record store held in memory; the write lock makes compare-and-set atomic.
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    records: RwLock<HashMap<Uuid, KnowledgeRecord>>,
}

impl InMemoryKnowledgeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored record, in no particular order.
    pub async fn snapshot(&self) -> Vec<KnowledgeRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn create(&self, record: &KnowledgeRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<KnowledgeRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ProcessingStatus,
        update: &StatusUpdate,
    ) -> Result<CasOutcome, StoreError> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&id) else {
            return Ok(CasOutcome::Missing);
        };
        if record.processing_status != expected {
            return Ok(CasOutcome::Conflict(record.processing_status));
        }
        record.apply(update, OffsetDateTime::now_utc());
        Ok(CasOutcome::Applied(record.clone()))
    }
}
