//! Applies inbound status events to knowledge records.
//!
//! Every event resolves to either a [`HandleOutcome`], meaning the message can be acknowledged,
//! or a [`HandleError`], meaning information would be lost and the message must be redelivered.

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::events::{FailureEvent, ProcessingEvent, SuccessEvent};
use crate::index::{IndexBatch, IndexWriteError, IndexWriter};
use crate::knowledge::{
    CasOutcome, IllegalTransition, KnowledgeRecord, KnowledgeStore, Outcome, ProcessingStatus,
    StatusUpdate, StoreError, Transition, transition,
};
use crate::metrics::PipelineMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Error code recorded when the artifact disagrees with the reported chunk count.
pub const CHUNK_COUNT_MISMATCH: &str = "CHUNK_COUNT_MISMATCH";

/// An inbound event referenced content with no matching record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No knowledge record matches content id `{0}`")]
pub struct UnknownContentId(pub String);

/// Errors that leave a message on the queue for redelivery.
#[derive(Debug, Error)]
pub enum HandleError {
    /// Record store could not be read or updated.
    #[error("Knowledge store unavailable: {0}")]
    Store(#[from] StoreError),
    /// Artifact could not be fetched.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    /// Chunks could not be written to the index.
    #[error("Index write failed: {0}")]
    Index(#[from] IndexWriteError),
}

/// Acknowledgeable result of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// Chunks were indexed and the record moved to SUCCESS.
    Succeeded {
        /// Chunks written to the index.
        chunks: usize,
    },
    /// The record moved to FAILED.
    Failed {
        /// Error code recorded on the record.
        code: Option<String>,
    },
    /// The record was already in the requested terminal state.
    Duplicate(ProcessingStatus),
    /// The event asked to flip a terminal record to the other terminal state.
    Anomaly(IllegalTransition),
    /// No record matches the event's content id.
    Unknown(UnknownContentId),
    /// A request event arrived on the status queue.
    Misrouted,
}

/// Per-key async mutexes, dropped again once nobody holds or awaits them.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().await.entry(key).or_default().clone();
        lock.lock_owned().await
    }

    async fn release(&self, key: Uuid) {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(&key)
            && Arc::strong_count(lock) == 1
        {
            locks.remove(&key);
        }
    }
}

/// Routes decoded events through the state machine and its side effects.
pub struct StatusHandler {
    store: Arc<dyn KnowledgeStore>,
    artifacts: Arc<dyn ArtifactStore>,
    index: Arc<dyn IndexWriter>,
    metrics: Arc<PipelineMetrics>,
    locks: KeyedLocks,
}

impl StatusHandler {
    /// Build a handler over the given collaborators.
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        artifacts: Arc<dyn ArtifactStore>,
        index: Arc<dyn IndexWriter>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            artifacts,
            index,
            metrics,
            locks: KeyedLocks::default(),
        }
    }

    /// Handle one decoded event. Events for the same content are processed one at a time.
    pub async fn handle(&self, event: ProcessingEvent) -> Result<HandleOutcome, HandleError> {
        let event_id = event.event_id().to_string();
        let content_id = event.content_id().to_string();
        if let ProcessingEvent::Request(_) = event {
            tracing::warn!(event_id = %event_id, content_id = %content_id, "Request event received on status queue; dropping");
            return Ok(HandleOutcome::Misrouted);
        }

        let Ok(id) = Uuid::parse_str(&content_id) else {
            return Ok(self.unknown(&event_id, content_id));
        };

        let guard = self.locks.acquire(id).await;
        let result = match &event {
            ProcessingEvent::Success(success) => self.on_success(id, success).await,
            ProcessingEvent::Failure(failure) => self.on_failure(id, failure).await,
            ProcessingEvent::Request(_) => Ok(HandleOutcome::Misrouted),
        };
        drop(guard);
        self.locks.release(id).await;
        result
    }

    async fn on_success(&self, id: Uuid, event: &SuccessEvent) -> Result<HandleOutcome, HandleError> {
        let record = match self.current(id, &event.event_id, Outcome::Success).await? {
            Ok(record) => record,
            Err(settled) => return Ok(settled),
        };

        let (bucket, key) = (&event.s3_bucket_name, &event.s3_key);
        let chunks = self.artifacts.fetch(bucket, key).await?;
        if chunks.len() != event.chunk_count {
            tracing::warn!(
                content_id = %id,
                event_id = %event.event_id,
                expected = event.chunk_count,
                actual = chunks.len(),
                "Artifact chunk count does not match success event"
            );
            let update = StatusUpdate::failed(
                format!(
                    "Expected {} chunks but artifact contained {}",
                    event.chunk_count,
                    chunks.len()
                ),
                Some(CHUNK_COUNT_MISMATCH.to_string()),
            );
            let cas = self
                .store
                .compare_and_set_status(id, ProcessingStatus::Processing, &update)
                .await?;
            self.reclaim(bucket, key).await;
            return Ok(self.settle(id, &event.event_id, cas, Outcome::Failure, 0));
        }

        let batch = IndexBatch {
            content_id: id.to_string(),
            project_id: record.project_id,
            chunks,
        };
        let expected = batch.chunks.len();
        let written = self.index.write(&batch).await?;
        if written != expected {
            return Err(IndexWriteError::CountMismatch { expected, written }.into());
        }
        self.reclaim(bucket, key).await;

        let cas = self
            .store
            .compare_and_set_status(id, ProcessingStatus::Processing, &StatusUpdate::Succeeded)
            .await?;
        Ok(self.settle(id, &event.event_id, cas, Outcome::Success, written))
    }

    async fn on_failure(&self, id: Uuid, event: &FailureEvent) -> Result<HandleOutcome, HandleError> {
        if let Err(settled) = self.current(id, &event.event_id, Outcome::Failure).await? {
            return Ok(settled);
        }

        tracing::info!(
            content_id = %id,
            event_id = %event.event_id,
            error_code = event.error_code.as_deref().unwrap_or_default(),
            failed_step = event.failed_step.as_deref().unwrap_or_default(),
            retry_count = event.retry_count.unwrap_or_default(),
            "Worker reported processing failure"
        );
        let update = StatusUpdate::failed(event.details(), event.error_code.clone());
        let cas = self
            .store
            .compare_and_set_status(id, ProcessingStatus::Processing, &update)
            .await?;
        Ok(self.settle(id, &event.event_id, cas, Outcome::Failure, 0))
    }

    /// Load the record and decide whether `outcome` still has work to do.
    async fn current(
        &self,
        id: Uuid,
        event_id: &str,
        outcome: Outcome,
    ) -> Result<Result<KnowledgeRecord, HandleOutcome>, HandleError> {
        let Some(record) = self.store.get(id).await? else {
            return Ok(Err(self.unknown(event_id, id.to_string())));
        };
        Ok(match transition(record.processing_status, outcome) {
            Ok(Transition::Advance(_)) => Ok(record),
            Ok(Transition::AlreadyApplied(status)) => Err(self.duplicate(id, event_id, status)),
            Err(illegal) => Err(self.anomaly(id, event_id, illegal)),
        })
    }

    /// Map the result of the terminal CAS onto an outcome.
    fn settle(
        &self,
        id: Uuid,
        event_id: &str,
        cas: CasOutcome,
        outcome: Outcome,
        chunks: usize,
    ) -> HandleOutcome {
        match cas {
            CasOutcome::Applied(record) => match record.processing_status {
                ProcessingStatus::Success => {
                    self.metrics.record_success(chunks as u64);
                    tracing::info!(content_id = %id, event_id, chunks, "Knowledge processing succeeded");
                    HandleOutcome::Succeeded { chunks }
                }
                _ => {
                    self.metrics.record_failure();
                    tracing::info!(content_id = %id, event_id, error_code = ?record.error_code, "Knowledge processing failed");
                    HandleOutcome::Failed {
                        code: record.error_code,
                    }
                }
            },
            // Another consumer settled the record between our read and the update.
            CasOutcome::Conflict(status) => match transition(status, outcome) {
                Ok(Transition::AlreadyApplied(status)) | Ok(Transition::Advance(status)) => {
                    self.duplicate(id, event_id, status)
                }
                Err(illegal) => self.anomaly(id, event_id, illegal),
            },
            CasOutcome::Missing => self.unknown(event_id, id.to_string()),
        }
    }

    async fn reclaim(&self, bucket: &str, key: &str) {
        if let Err(err) = self.artifacts.delete(bucket, key).await {
            tracing::warn!(bucket, key, error = %err, "Failed to delete consumed artifact");
        }
    }

    fn unknown(&self, event_id: &str, content_id: String) -> HandleOutcome {
        self.metrics.record_unknown_content();
        tracing::warn!(event_id, content_id = %content_id, "Status event for unknown content; dropping");
        HandleOutcome::Unknown(UnknownContentId(content_id))
    }

    fn duplicate(&self, id: Uuid, event_id: &str, status: ProcessingStatus) -> HandleOutcome {
        self.metrics.record_duplicate();
        tracing::info!(content_id = %id, event_id, status = %status, "Record already terminal; skipping event");
        HandleOutcome::Duplicate(status)
    }

    fn anomaly(&self, id: Uuid, event_id: &str, illegal: IllegalTransition) -> HandleOutcome {
        self.metrics.record_anomaly();
        tracing::error!(content_id = %id, event_id, error = %illegal, "Rejected status event for terminal record");
        HandleOutcome::Anomaly(illegal)
    }
}
