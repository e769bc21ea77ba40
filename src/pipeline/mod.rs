//! The ingestion pipeline: request publishing, status consumption, and status long-polling.

pub mod consumer;
pub mod handler;
pub mod long_poll;
pub mod publisher;
pub mod service;
pub mod submission;

pub use consumer::{Disposition, StatusConsumer};
pub use handler::{
    CHUNK_COUNT_MISMATCH, HandleError, HandleOutcome, StatusHandler, UnknownContentId,
};
pub use long_poll::{
    LongPollCoordinator, LongPollError, Resolution, ResolutionKind, StatusCheckError,
};
pub use publisher::{BackoffPolicy, PublishError, PublishReceipt, RequestPublisher};
pub use service::{KnowledgeApi, KnowledgeService, ServiceError, Submitted};
pub use submission::{FileSubmission, SubmissionError, WebSubmission, classify_mime};
