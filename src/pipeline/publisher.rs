//! Outbound request publishing with bounded exponential backoff.

use crate::config::PublishSettings;
use crate::events::{ProcessingEvent, RequestEvent, encode_event};
use crate::knowledge::{ContentSource, KnowledgeRecord};
use crate::metrics::PipelineMetrics;
use crate::queue::{QueueError, QueueSender};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors returned when a request event could not be enqueued.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Event could not be serialized.
    #[error("Failed to serialize request event: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Queue refused the message with a non-retryable error.
    #[error("Queue rejected request event: {0}")]
    Rejected(#[source] QueueError),
    /// Every attempt failed with a transient error.
    #[error("Publishing gave up after {attempts} attempts: {source}")]
    Exhausted {
        /// Attempts made, the first send included.
        attempts: u32,
        /// Error returned by the final attempt.
        #[source]
        source: QueueError,
    },
}

/// Delay schedule applied between publish attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
}

impl BackoffPolicy {
    /// Delays slept before each retry, in order.
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_retries)
            .map(|retry| {
                self.base_delay
                    .saturating_mul(self.multiplier.saturating_pow(retry))
            })
            .collect()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        PublishSettings::default().into()
    }
}

impl From<PublishSettings> for BackoffPolicy {
    fn from(settings: PublishSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.base_delay,
            multiplier: settings.multiplier,
        }
    }
}

/// Acknowledgement returned after a request event was enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Identifier of the published event.
    pub event_id: String,
    /// Identifier the queue assigned to the message.
    pub message_id: String,
    /// Attempts it took, the first send included.
    pub attempts: u32,
}

/// Build the request event announcing `record` to the worker.
pub fn build_request_event(
    record: &KnowledgeRecord,
    location: &ContentSource,
    user_id: Option<&str>,
) -> RequestEvent {
    let (s3_bucket, s3_key, web_url) = match location {
        ContentSource::Object { bucket, key } => (Some(bucket.clone()), Some(key.clone()), None),
        ContentSource::Web(url) => (None, None, Some(url.clone())),
    };
    RequestEvent {
        event_id: Uuid::new_v4().to_string(),
        timestamp: OffsetDateTime::now_utc(),
        content_id: record.id.to_string(),
        content_type: record.content_type.into(),
        name: record.name.clone(),
        mime_type: record.mime_type.clone(),
        file_size: record.size,
        s3_bucket,
        s3_key,
        web_url,
        project_id: record.project_id.clone(),
        user_id: user_id.map(str::to_string),
    }
}

/// Publishes processing requests to the outbound queue.
pub struct RequestPublisher {
    queue: Arc<dyn QueueSender>,
    policy: BackoffPolicy,
    metrics: Arc<PipelineMetrics>,
}

impl RequestPublisher {
    /// Build a publisher sending to `queue` with the given retry schedule.
    pub fn new(queue: Arc<dyn QueueSender>, policy: BackoffPolicy, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            queue,
            policy,
            metrics,
        }
    }

    /// Enqueue a request event for `record`.
    ///
    /// Transient queue failures are retried along the backoff schedule. The record itself is never
    /// touched, so a failed publish leaves it in PROCESSING.
    pub async fn publish(
        &self,
        record: &KnowledgeRecord,
        location: &ContentSource,
        user_id: Option<&str>,
    ) -> Result<PublishReceipt, PublishError> {
        let event = build_request_event(record, location, user_id);
        let event_id = event.event_id.clone();
        let body = encode_event(&ProcessingEvent::Request(event)).inspect_err(|_| {
            self.metrics.record_publish_failure();
        })?;

        let delays = self.policy.delays();
        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            let err = match self.queue.send(&body).await {
                Ok(message_id) => {
                    self.metrics.record_published();
                    tracing::info!(
                        content_id = %record.id,
                        event_id = %event_id,
                        message_id = %message_id,
                        attempt = attempts,
                        "Published processing request"
                    );
                    return Ok(PublishReceipt {
                        event_id,
                        message_id,
                        attempts,
                    });
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                self.metrics.record_publish_failure();
                tracing::error!(content_id = %record.id, event_id = %event_id, error = %err, "Processing request rejected");
                return Err(PublishError::Rejected(err));
            }

            let Some(delay) = delays.get(attempts as usize - 1).copied() else {
                self.metrics.record_publish_failure();
                tracing::error!(
                    content_id = %record.id,
                    event_id = %event_id,
                    attempts,
                    error = %err,
                    "Processing request publish exhausted retries"
                );
                return Err(PublishError::Exhausted {
                    attempts,
                    source: err,
                });
            };

            tracing::warn!(
                content_id = %record.id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient publish failure; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
