//! Receive-decode-dispatch loop over the status queue.

use crate::config::ConsumerSettings;
use crate::events::decode_event;
use crate::metrics::PipelineMetrics;
use crate::pipeline::handler::StatusHandler;
use crate::queue::{QueueMessage, QueueReceiver, ReceiveRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Pause after a failed receive call before trying again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What happened to a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The message was handled and deleted from the queue.
    Acknowledged,
    /// The message was left on the queue for redelivery.
    Retained,
}

/// Long-running listener on the status queue.
#[derive(Clone)]
pub struct StatusConsumer {
    queue: Arc<dyn QueueReceiver>,
    handler: Arc<StatusHandler>,
    settings: ConsumerSettings,
    metrics: Arc<PipelineMetrics>,
}

impl StatusConsumer {
    /// Build a consumer pulling from `queue` and dispatching to `handler`.
    pub fn new(
        queue: Arc<dyn QueueReceiver>,
        handler: Arc<StatusHandler>,
        settings: ConsumerSettings,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            queue,
            handler,
            settings,
            metrics,
        }
    }

    /// Receive and dispatch messages until `shutdown` is cancelled, then drain in-flight handlers.
    pub async fn run(&self, shutdown: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let request = ReceiveRequest {
            max_messages: self.settings.max_messages.clamp(1, 10),
            wait: self.settings.wait_time,
            visibility_timeout: self.settings.visibility_timeout,
        };
        tracing::info!(
            concurrency = self.settings.concurrency,
            max_messages = request.max_messages,
            wait_secs = request.wait.as_secs(),
            "Status consumer started"
        );

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.queue.receive(request) => received,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to receive status messages");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => continue,
                    }
                }
            };

            for message in messages {
                let Ok(permit) = permits.clone().acquire_owned().await else {
                    break;
                };
                let consumer = self.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    consumer.process(&message).await
                });
            }

            while let Some(finished) = tasks.try_join_next() {
                if let Err(err) = finished {
                    tracing::error!(error = %err, "Status handler task panicked");
                }
            }
        }

        tracing::info!(in_flight = tasks.len(), "Status consumer stopping; draining handlers");
        while let Some(finished) = tasks.join_next().await {
            if let Err(err) = finished {
                tracing::error!(error = %err, "Status handler task panicked");
            }
        }
        tracing::info!("Status consumer stopped");
    }

    /// Decode, dispatch, and acknowledge a single delivery.
    pub async fn process(&self, message: &QueueMessage) -> Disposition {
        self.metrics.record_received();
        let event = match decode_event(&message.body) {
            Ok(event) => event,
            Err(err) => {
                self.metrics.record_decode_failure();
                self.metrics.record_retained();
                tracing::warn!(
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    error = %err,
                    "Undecodable status message left for redelivery"
                );
                return Disposition::Retained;
            }
        };

        let event_id = event.event_id().to_string();
        let content_id = event.content_id().to_string();
        match self.handler.handle(event).await {
            Ok(outcome) => {
                tracing::debug!(event_id = %event_id, content_id = %content_id, outcome = ?outcome, "Status event handled");
                self.acknowledge(message).await;
                Disposition::Acknowledged
            }
            Err(err) => {
                self.metrics.record_retained();
                tracing::warn!(
                    event_id = %event_id,
                    content_id = %content_id,
                    receive_count = message.receive_count,
                    error = %err,
                    "Status event left for redelivery"
                );
                Disposition::Retained
            }
        }
    }

    async fn acknowledge(&self, message: &QueueMessage) {
        if let Err(err) = self.queue.delete(&message.receipt_handle).await {
            // Redelivery is harmless: the record is terminal and the replay is skipped.
            tracing::warn!(message_id = %message.message_id, receipt = %message.receipt_handle, error = %err, "Failed to acknowledge status message");
        }
    }
}
