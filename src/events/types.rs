//! Wire types for processing events exchanged with the extraction worker.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Discriminator of outbound processing requests.
pub const REQUEST_EVENT_TYPE: &str = "content.process.request";
/// Discriminator of successful processing reports.
pub const SUCCESS_EVENT_TYPE: &str = "content.process.success";
/// Discriminator of failed processing reports.
pub const FAILURE_EVENT_TYPE: &str = "content.process.failed";

/// Content classification as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Office documents, PDFs, and plain text.
    Document,
    /// Raster and vector images.
    Image,
    /// Web pages referenced by URL.
    Web,
}

/// Closed set of events flowing through the processing queues, tagged by `eventType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum ProcessingEvent {
    /// Ask the worker to process a piece of content.
    #[serde(rename = "content.process.request")]
    Request(RequestEvent),
    /// Worker finished and left chunks in the object store.
    #[serde(rename = "content.process.success")]
    Success(SuccessEvent),
    /// Worker gave up on the content.
    #[serde(rename = "content.process.failed")]
    Failure(FailureEvent),
}

impl ProcessingEvent {
    /// Wire discriminator of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Request(_) => REQUEST_EVENT_TYPE,
            Self::Success(_) => SUCCESS_EVENT_TYPE,
            Self::Failure(_) => FAILURE_EVENT_TYPE,
        }
    }

    /// Identifier of the knowledge record the event refers to.
    pub fn content_id(&self) -> &str {
        match self {
            Self::Request(event) => &event.content_id,
            Self::Success(event) => &event.content_id,
            Self::Failure(event) => &event.content_id,
        }
    }

    /// Unique identifier of this event instance.
    pub fn event_id(&self) -> &str {
        match self {
            Self::Request(event) => &event.event_id,
            Self::Success(event) => &event.event_id,
            Self::Failure(event) => &event.event_id,
        }
    }
}

/// Outbound request asking the worker to extract and embed content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    /// Fresh identifier for this event.
    pub event_id: String,
    /// Creation time of the event.
    #[serde(with = "super::timestamp")]
    pub timestamp: OffsetDateTime,
    /// Knowledge record identifier.
    pub content_id: String,
    /// Content classification.
    pub content_type: ContentKind,
    /// Display name of the content.
    pub name: String,
    /// MIME type of uploaded files.
    pub mime_type: Option<String>,
    /// Size of uploaded files in bytes.
    pub file_size: Option<u64>,
    /// Bucket holding the uploaded file.
    pub s3_bucket: Option<String>,
    /// Object key of the uploaded file.
    pub s3_key: Option<String>,
    /// URL of web content.
    pub web_url: Option<String>,
    /// Owning project.
    pub project_id: String,
    /// Submitting user.
    pub user_id: Option<String>,
}

/// Inbound report that extraction succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEvent {
    /// Identifier assigned by the worker.
    #[serde(default)]
    pub event_id: String,
    /// Time the worker emitted the event.
    #[serde(default, with = "super::timestamp::option")]
    pub timestamp: Option<OffsetDateTime>,
    /// Knowledge record identifier.
    pub content_id: String,
    /// Content classification echoed back by the worker.
    #[serde(default)]
    pub content_type: Option<ContentKind>,
    /// Free-form completion note.
    #[serde(default)]
    pub message: Option<String>,
    /// Worker-side processing duration.
    #[serde(default)]
    pub processing_time_ms: Option<u64>,
    /// Number of chunks written to the artifact.
    pub chunk_count: usize,
    /// Bucket holding the artifact.
    pub s3_bucket_name: String,
    /// Object key of the artifact.
    pub s3_key: String,
}

/// Inbound report that extraction failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEvent {
    /// Identifier assigned by the worker.
    #[serde(default)]
    pub event_id: String,
    /// Time the worker emitted the event.
    #[serde(default, with = "super::timestamp::option")]
    pub timestamp: Option<OffsetDateTime>,
    /// Knowledge record identifier.
    pub content_id: String,
    /// Content classification echoed back by the worker.
    #[serde(default)]
    pub content_type: Option<ContentKind>,
    /// Human-readable failure reason.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Machine-readable failure code.
    #[serde(default)]
    pub error_code: Option<String>,
    /// Worker stack trace, if captured.
    #[serde(default)]
    pub stack_trace: Option<String>,
    /// Attempts the worker made before giving up.
    #[serde(default)]
    pub retry_count: Option<u32>,
    /// Worker pipeline step that failed.
    #[serde(default)]
    pub failed_step: Option<String>,
}

impl FailureEvent {
    /// Text recorded on the knowledge record for this failure.
    pub fn details(&self) -> String {
        self.error_message
            .as_deref()
            .or(self.error_code.as_deref())
            .filter(|text| !text.trim().is_empty())
            .unwrap_or("Processing failed")
            .to_string()
    }
}
