//! Request-side operations exposed to the HTTP layer.

use crate::knowledge::{ContentSource, KnowledgeRecord, KnowledgeStore, ProcessingStatus, StoreError};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::long_poll::{LongPollCoordinator, LongPollError, Resolution, StatusCheckError};
use crate::pipeline::publisher::{PublishError, PublishReceipt, RequestPublisher};
use crate::pipeline::submission::{FileSubmission, SubmissionError, WebSubmission};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by [`KnowledgeApi`] operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Submission failed validation.
    #[error(transparent)]
    Invalid(#[from] SubmissionError),
    /// No record with this id exists in the project.
    #[error("Knowledge {0} not found")]
    NotFound(Uuid),
    /// The record is no longer PROCESSING.
    #[error("Knowledge {id} is already {status}")]
    Conflict {
        /// Record identifier.
        id: Uuid,
        /// Status the record holds.
        status: ProcessingStatus,
    },
    /// Record store failed.
    #[error("Knowledge store unavailable: {0}")]
    Store(#[from] StoreError),
    /// Record was created but its request could not be published; it stays PROCESSING.
    #[error("Failed to publish processing request for {id}: {source}")]
    Publish {
        /// Record left in PROCESSING.
        id: Uuid,
        /// Publisher error.
        #[source]
        source: PublishError,
    },
    /// Status read failed during a long poll.
    #[error(transparent)]
    StatusCheck(#[from] StatusCheckError),
}

impl From<LongPollError> for ServiceError {
    fn from(err: LongPollError) -> Self {
        match err {
            LongPollError::NotFound(id) => Self::NotFound(id),
            LongPollError::StatusCheck(inner) => Self::StatusCheck(inner),
        }
    }
}

/// A record together with the request event announcing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    /// Record as persisted.
    pub record: KnowledgeRecord,
    /// Queue acknowledgement of the request event.
    pub receipt: PublishReceipt,
}

/// Operations served over HTTP.
#[async_trait]
pub trait KnowledgeApi: Send + Sync {
    /// Register an uploaded file and request its processing.
    async fn submit_file(
        &self,
        project_id: &str,
        submission: FileSubmission,
    ) -> Result<Submitted, ServiceError>;

    /// Register a web URL and request its processing.
    async fn submit_web(
        &self,
        project_id: &str,
        submission: WebSubmission,
    ) -> Result<Submitted, ServiceError>;

    /// Fetch a record.
    async fn get(&self, project_id: &str, id: Uuid) -> Result<KnowledgeRecord, ServiceError>;

    /// Publish a new request for a record still in PROCESSING.
    async fn resend(
        &self,
        project_id: &str,
        id: Uuid,
        user_id: Option<String>,
    ) -> Result<Submitted, ServiceError>;

    /// Long-poll a record until it resolves or the wait elapses.
    async fn await_status(
        &self,
        project_id: &str,
        id: Uuid,
        max_wait: Option<Duration>,
    ) -> Result<Resolution, ServiceError>;

    /// Current pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Default [`KnowledgeApi`] implementation over the record store and outbound queue.
pub struct KnowledgeService {
    store: Arc<dyn KnowledgeStore>,
    publisher: RequestPublisher,
    long_poll: LongPollCoordinator,
    metrics: Arc<PipelineMetrics>,
}

impl KnowledgeService {
    /// Compose the service from its collaborators.
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        publisher: RequestPublisher,
        long_poll: LongPollCoordinator,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            publisher,
            long_poll,
            metrics,
        }
    }

    async fn create_and_publish(
        &self,
        record: KnowledgeRecord,
        location: ContentSource,
        user_id: Option<&str>,
    ) -> Result<Submitted, ServiceError> {
        self.store.create(&record).await?;
        tracing::info!(
            content_id = %record.id,
            project_id = %record.project_id,
            content_type = record.content_type.as_str(),
            "Knowledge record created"
        );
        self.publish(record, &location, user_id).await
    }

    async fn publish(
        &self,
        record: KnowledgeRecord,
        location: &ContentSource,
        user_id: Option<&str>,
    ) -> Result<Submitted, ServiceError> {
        match self.publisher.publish(&record, location, user_id).await {
            Ok(receipt) => Ok(Submitted { record, receipt }),
            Err(source) => Err(ServiceError::Publish {
                id: record.id,
                source,
            }),
        }
    }

    async fn scoped(&self, project_id: &str, id: Uuid) -> Result<KnowledgeRecord, ServiceError> {
        match self.store.get(id).await? {
            Some(record) if record.project_id == project_id => Ok(record),
            _ => Err(ServiceError::NotFound(id)),
        }
    }
}

#[async_trait]
impl KnowledgeApi for KnowledgeService {
    async fn submit_file(
        &self,
        project_id: &str,
        submission: FileSubmission,
    ) -> Result<Submitted, ServiceError> {
        let new = submission.prepare(project_id)?;
        let location = new.source.clone();
        let record = KnowledgeRecord::new(new);
        self.create_and_publish(record, location, submission.user_id.as_deref())
            .await
    }

    async fn submit_web(
        &self,
        project_id: &str,
        submission: WebSubmission,
    ) -> Result<Submitted, ServiceError> {
        let new = submission.prepare(project_id)?;
        let location = new.source.clone();
        let record = KnowledgeRecord::new(new);
        self.create_and_publish(record, location, submission.user_id.as_deref())
            .await
    }

    async fn get(&self, project_id: &str, id: Uuid) -> Result<KnowledgeRecord, ServiceError> {
        self.scoped(project_id, id).await
    }

    async fn resend(
        &self,
        project_id: &str,
        id: Uuid,
        user_id: Option<String>,
    ) -> Result<Submitted, ServiceError> {
        let record = self.scoped(project_id, id).await?;
        if record.processing_status.is_terminal() {
            return Err(ServiceError::Conflict {
                id,
                status: record.processing_status,
            });
        }
        let location = ContentSource::parse(&record.source).ok_or_else(|| {
            SubmissionError::InvalidLocation(format!("stored source `{}` is not resendable", record.source))
        })?;
        tracing::info!(content_id = %id, "Resending processing request");
        self.publish(record, &location, user_id.as_deref()).await
    }

    async fn await_status(
        &self,
        project_id: &str,
        id: Uuid,
        max_wait: Option<Duration>,
    ) -> Result<Resolution, ServiceError> {
        Ok(self.long_poll.await_resolution(project_id, id, max_wait).await?)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
