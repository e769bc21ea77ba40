//! Persistence seam for knowledge records.

use crate::knowledge::types::{KnowledgeRecord, ProcessingStatus, StatusUpdate};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by record store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver failure.
    #[error("Knowledge store query failed: {0}")]
    Database(#[from] sqlx::Error),
    /// Filesystem failure while preparing the database location.
    #[error("Knowledge store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A record with the same identifier already exists.
    #[error("Knowledge record {0} already exists")]
    Duplicate(Uuid),
    /// A stored row could not be mapped back into a record.
    #[error("Corrupt knowledge row: {0}")]
    Corrupt(String),
}

/// Result of a conditional status update.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The record matched the expected status and was updated.
    Applied(KnowledgeRecord),
    /// The record exists but its status differed from the expected one.
    Conflict(ProcessingStatus),
    /// No record with the given identifier exists.
    Missing,
}

/// Create, read, and conditionally update knowledge records.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Persist a new record.
    async fn create(&self, record: &KnowledgeRecord) -> Result<(), StoreError>;

    /// Fetch a record by identifier.
    async fn get(&self, id: Uuid) -> Result<Option<KnowledgeRecord>, StoreError>;

    /// Atomically apply `update` only when the record's status equals `expected`.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ProcessingStatus,
        update: &StatusUpdate,
    ) -> Result<CasOutcome, StoreError>;
}
