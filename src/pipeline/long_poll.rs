//! Poll-with-deadline primitive used by the status endpoint.

use crate::config::LongPollSettings;
use crate::knowledge::{KnowledgeRecord, KnowledgeStore, ProcessingStatus, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// The record store could not be read while waiting.
#[derive(Debug, Error)]
#[error("Processing status check failed: {0}")]
pub struct StatusCheckError(#[from] pub StoreError);

/// Reasons a long poll ends without a resolution.
#[derive(Debug, Error)]
pub enum LongPollError {
    /// No record with this id exists in the requested project.
    #[error("Knowledge {0} not found")]
    NotFound(Uuid),
    /// Reading the record failed.
    #[error(transparent)]
    StatusCheck(#[from] StatusCheckError),
}

/// How a long poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    /// The record was terminal on the first read.
    AlreadyTerminal,
    /// The record became terminal while waiting.
    Resolved,
    /// The deadline passed while the record was still PROCESSING.
    TimedOut,
}

/// Record state returned from a long poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// How the wait ended.
    pub kind: ResolutionKind,
    /// Record as last read.
    pub record: KnowledgeRecord,
}

impl Resolution {
    /// Caller-facing message describing the result.
    pub fn message(&self) -> &'static str {
        match (self.kind, self.record.processing_status) {
            (ResolutionKind::TimedOut, _) => "Processing status check timeout",
            (ResolutionKind::AlreadyTerminal, _) => "Knowledge processing status retrieved",
            (ResolutionKind::Resolved, ProcessingStatus::Failed) => "Knowledge processing failed",
            (ResolutionKind::Resolved, _) => "Knowledge processing completed successfully",
        }
    }

    /// Whether the wait ended on the deadline.
    pub fn timed_out(&self) -> bool {
        self.kind == ResolutionKind::TimedOut
    }
}

/// Waits for records to leave PROCESSING by re-reading the store on a fixed cadence.
pub struct LongPollCoordinator {
    store: Arc<dyn KnowledgeStore>,
    settings: LongPollSettings,
}

impl LongPollCoordinator {
    /// Build a coordinator reading from `store`.
    pub fn new(store: Arc<dyn KnowledgeStore>, settings: LongPollSettings) -> Self {
        Self { store, settings }
    }

    /// Effective wait for a requested one: the default when absent, never above the ceiling.
    pub fn clamp_wait(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.settings.default_timeout)
            .min(self.settings.max_timeout)
    }

    /// Wait until the record is terminal or `max_wait` elapses.
    ///
    /// Returns within `[max_wait, max_wait + interval)` on timeout. Dropping the future stops
    /// the wait.
    pub async fn await_resolution(
        &self,
        project_id: &str,
        id: Uuid,
        max_wait: Option<Duration>,
    ) -> Result<Resolution, LongPollError> {
        let wait = self.clamp_wait(max_wait);
        let deadline = Instant::now() + wait;

        let mut record = self.read(project_id, id).await?;
        if record.processing_status.is_terminal() {
            return Ok(Resolution {
                kind: ResolutionKind::AlreadyTerminal,
                record,
            });
        }

        tracing::debug!(content_id = %id, wait_ms = wait.as_millis() as u64, "Waiting for processing status");
        loop {
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(content_id = %id, "Processing status wait timed out");
                return Ok(Resolution {
                    kind: ResolutionKind::TimedOut,
                    record,
                });
            }
            tokio::time::sleep(self.settings.interval.min(deadline - now)).await;

            record = self.read(project_id, id).await?;
            if record.processing_status.is_terminal() {
                return Ok(Resolution {
                    kind: ResolutionKind::Resolved,
                    record,
                });
            }
        }
    }

    async fn read(&self, project_id: &str, id: Uuid) -> Result<KnowledgeRecord, LongPollError> {
        match self.store.get(id).await {
            Ok(Some(record)) if record.project_id == project_id => Ok(record),
            Ok(_) => Err(LongPollError::NotFound(id)),
            Err(err) => {
                tracing::error!(content_id = %id, error = %err, "Processing status check failed");
                Err(StatusCheckError(err).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{
        CasOutcome, ContentSource, ContentType, InMemoryKnowledgeStore, NewKnowledge, StatusUpdate,
    };
    use async_trait::async_trait;

    async fn processing_record(store: &InMemoryKnowledgeStore) -> KnowledgeRecord {
        let record = KnowledgeRecord::new(NewKnowledge {
            project_id: "p-1".into(),
            name: "example.org".into(),
            content_type: ContentType::Web,
            mime_type: Some("text/html".into()),
            size: None,
            source: ContentSource::Web("https://example.org".into()),
        });
        store.create(&record).await.expect("create");
        record
    }

    fn coordinator(store: Arc<dyn KnowledgeStore>) -> LongPollCoordinator {
        LongPollCoordinator::new(store, LongPollSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_one_interval_of_the_deadline() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let record = processing_record(&store).await;
        let coordinator = coordinator(store);

        let started = Instant::now();
        let resolution = coordinator
            .await_resolution("p-1", record.id, Some(Duration::from_millis(500)))
            .await
            .expect("resolution");
        let elapsed = started.elapsed();

        assert!(resolution.timed_out());
        assert_eq!(resolution.record.processing_status, ProcessingStatus::Processing);
        assert_eq!(resolution.message(), "Processing status check timeout");
        assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn final_sleep_is_trimmed_to_the_deadline() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let record = processing_record(&store).await;
        let coordinator = coordinator(store);

        let started = Instant::now();
        coordinator
            .await_resolution("p-1", record.id, Some(Duration::from_millis(700)))
            .await
            .expect("resolution");
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_on_the_first_poll_after_completion() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let record = processing_record(&store).await;
        let coordinator = coordinator(store.clone());

        let writer = store.clone();
        let id = record.id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(900)).await;
            let outcome = writer
                .compare_and_set_status(id, ProcessingStatus::Processing, &StatusUpdate::Succeeded)
                .await
                .expect("cas");
            assert!(matches!(outcome, CasOutcome::Applied(_)));
        });

        let started = Instant::now();
        let resolution = coordinator
            .await_resolution("p-1", record.id, Some(Duration::from_millis(3000)))
            .await
            .expect("resolution");
        let elapsed = started.elapsed();

        assert_eq!(resolution.kind, ResolutionKind::Resolved);
        assert_eq!(resolution.record.processing_status, ProcessingStatus::Success);
        assert_eq!(resolution.message(), "Knowledge processing completed successfully");
        assert!(elapsed >= Duration::from_millis(1000) && elapsed < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn terminal_records_return_immediately() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let record = processing_record(&store).await;
        store
            .compare_and_set_status(
                record.id,
                ProcessingStatus::Processing,
                &StatusUpdate::failed("unreadable file", None),
            )
            .await
            .expect("cas");

        let resolution = coordinator(store)
            .await_resolution("p-1", record.id, None)
            .await
            .expect("resolution");
        assert_eq!(resolution.kind, ResolutionKind::AlreadyTerminal);
        assert_eq!(resolution.message(), "Knowledge processing status retrieved");
    }

    #[tokio::test]
    async fn other_projects_see_not_found() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let record = processing_record(&store).await;
        let err = coordinator(store)
            .await_resolution("p-2", record.id, Some(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, LongPollError::NotFound(id) if id == record.id));
    }

    #[test]
    fn requested_waits_are_clamped() {
        let coordinator = coordinator(Arc::new(InMemoryKnowledgeStore::new()));
        assert_eq!(coordinator.clamp_wait(None), Duration::from_millis(20_000));
        assert_eq!(
            coordinator.clamp_wait(Some(Duration::from_secs(120))),
            Duration::from_millis(30_000)
        );
        assert_eq!(coordinator.clamp_wait(Some(Duration::ZERO)), Duration::ZERO);
    }

    struct BrokenStore;

    #[async_trait]
    impl KnowledgeStore for BrokenStore {
        async fn create(&self, _record: &KnowledgeRecord) -> Result<(), StoreError> {
            Err(StoreError::Corrupt("offline".into()))
        }

        async fn get(&self, _id: Uuid) -> Result<Option<KnowledgeRecord>, StoreError> {
            Err(StoreError::Corrupt("offline".into()))
        }

        async fn compare_and_set_status(
            &self,
            _id: Uuid,
            _expected: ProcessingStatus,
            _update: &StatusUpdate,
        ) -> Result<CasOutcome, StoreError> {
            Err(StoreError::Corrupt("offline".into()))
        }
    }

    #[tokio::test]
    async fn store_failures_are_status_check_errors() {
        let err = coordinator(Arc::new(BrokenStore))
            .await_resolution("p-1", Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LongPollError::StatusCheck(_)));
    }
}
