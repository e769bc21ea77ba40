//! Message queue seam used for the request and status channels.

pub mod memory;
pub mod sqs;

pub use memory::MemoryQueue;
pub use sqs::SqsQueue;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// HTTP layer failed before receiving a response.
    #[error("Queue HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The queue service answered with a non-success status.
    #[error("Queue rejected request ({status}): {body}")]
    Rejected {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Error body returned by the service.
        body: String,
    },
    /// The service answered with a body this client could not read.
    #[error("Malformed queue response: {0}")]
    MalformedResponse(String),
    /// Configured endpoint could not be parsed.
    #[error("Invalid queue endpoint: {0}")]
    InvalidEndpoint(String),
    /// Request body could not be serialized.
    #[error("Failed to serialize queue request: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Rejected { status, body } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || body.contains("Throttl")
                    || body.contains("RequestThrottled")
            }
            Self::MalformedResponse(_) | Self::InvalidEndpoint(_) | Self::Serialization(_) => false,
        }
    }
}

/// A message handed out by a receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Identifier assigned by the queue at send time.
    pub message_id: String,
    /// Handle that acknowledges this particular delivery.
    pub receipt_handle: String,
    /// Raw message body.
    pub body: String,
    /// How many times the message has been delivered, this delivery included.
    pub receive_count: u32,
}

/// Parameters of a single receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Upper bound on returned messages.
    pub max_messages: usize,
    /// How long to wait for a message before returning empty.
    pub wait: Duration,
    /// How long delivered messages stay hidden before redelivery.
    pub visibility_timeout: Duration,
}

/// Sending half of a queue.
#[async_trait]
pub trait QueueSender: Send + Sync {
    /// Enqueue `body`, returning the queue-assigned message id.
    async fn send(&self, body: &str) -> Result<String, QueueError>;
}

/// Receiving half of a queue with explicit acknowledgement.
#[async_trait]
pub trait QueueReceiver: Send + Sync {
    /// Long-poll for messages.
    async fn receive(&self, request: ReceiveRequest) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge a delivery so it is not redelivered.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(status: StatusCode, body: &str) -> QueueError {
        QueueError::Rejected {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(rejected(StatusCode::INTERNAL_SERVER_ERROR, "").is_transient());
        assert!(rejected(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(
            rejected(
                StatusCode::BAD_REQUEST,
                r#"{"__type":"com.amazonaws.sqs#ThrottlingException"}"#
            )
            .is_transient()
        );
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(
            !rejected(
                StatusCode::BAD_REQUEST,
                r#"{"__type":"com.amazonaws.sqs#QueueDoesNotExist"}"#
            )
            .is_transient()
        );
        assert!(!QueueError::MalformedResponse("x".into()).is_transient());
    }
}
