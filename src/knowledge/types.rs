//! Knowledge record model and its public projection.

use crate::events::{ContentKind, timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum number of characters persisted in `error_details`.
pub const MAX_ERROR_DETAILS_CHARS: usize = 1000;

/// Lifecycle state of a knowledge record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    /// Waiting on the external worker.
    Processing,
    /// Chunks were indexed.
    Success,
    /// The worker reported a failure.
    Failed,
}

impl ProcessingStatus {
    /// Stored representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the status can no longer change.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(Self::Processing),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown processing status `{other}`")),
        }
    }
}

/// Classification of ingested content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    /// Raster and vector images.
    Image,
    /// Office documents, PDFs, and plain text.
    Document,
    /// Web pages referenced by URL.
    Web,
}

impl ContentType {
    /// Stored representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Document => "DOCUMENT",
            Self::Web => "WEB",
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMAGE" => Ok(Self::Image),
            "DOCUMENT" => Ok(Self::Document),
            "WEB" => Ok(Self::Web),
            other => Err(format!("unknown content type `{other}`")),
        }
    }
}

impl From<ContentType> for ContentKind {
    fn from(value: ContentType) -> Self {
        match value {
            ContentType::Image => ContentKind::Image,
            ContentType::Document => ContentKind::Document,
            ContentType::Web => ContentKind::Web,
        }
    }
}

/// Where the original content lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Uploaded file held in the object store.
    Object {
        /// Bucket holding the file.
        bucket: String,
        /// Object key of the file.
        key: String,
    },
    /// Web page addressed by URL.
    Web(String),
}

impl ContentSource {
    /// Render the source as the URI stored on the record.
    pub fn to_uri(&self) -> String {
        match self {
            Self::Object { bucket, key } => format!("s3://{bucket}/{key}"),
            Self::Web(url) => url.clone(),
        }
    }

    /// Parse a stored source URI.
    pub fn parse(uri: &str) -> Option<Self> {
        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, key) = rest.split_once('/')?;
            if bucket.is_empty() || key.is_empty() {
                return None;
            }
            return Some(Self::Object {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Some(Self::Web(uri.to_string()));
        }
        None
    }
}

/// Fields supplied when registering new content.
#[derive(Debug, Clone)]
pub struct NewKnowledge {
    /// Owning project.
    pub project_id: String,
    /// Display name.
    pub name: String,
    /// Content classification.
    pub content_type: ContentType,
    /// MIME type, when known.
    pub mime_type: Option<String>,
    /// Size in bytes, when known.
    pub size: Option<u64>,
    /// Location of the original content.
    pub source: ContentSource,
}

/// A tracked unit of ingested content.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeRecord {
    /// Immutable record identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: String,
    /// Display name.
    pub name: String,
    /// Content classification.
    pub content_type: ContentType,
    /// MIME type, when known.
    pub mime_type: Option<String>,
    /// Size in bytes, when known.
    pub size: Option<u64>,
    /// Source URI (`s3://bucket/key` or the web URL).
    pub source: String,
    /// Current lifecycle state.
    pub processing_status: ProcessingStatus,
    /// Failure reason; only set while FAILED.
    pub error_details: Option<String>,
    /// Failure code reported by the worker; only set while FAILED.
    pub error_code: Option<String>,
    /// Creation time.
    pub created_at: OffsetDateTime,
    /// Time of the last status change.
    pub updated_at: OffsetDateTime,
}

impl KnowledgeRecord {
    /// Build a fresh PROCESSING record.
    pub fn new(new: NewKnowledge) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            project_id: new.project_id,
            name: new.name,
            content_type: new.content_type,
            mime_type: new.mime_type,
            size: new.size,
            source: new.source.to_uri(),
            processing_status: ProcessingStatus::Processing,
            error_details: None,
            error_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a terminal update in place.
    pub fn apply(&mut self, update: &StatusUpdate, at: OffsetDateTime) {
        self.processing_status = update.status();
        match update {
            StatusUpdate::Succeeded => {
                self.error_details = None;
                self.error_code = None;
            }
            StatusUpdate::Failed { details, code } => {
                self.error_details = Some(details.clone());
                self.error_code = code.clone();
            }
        }
        self.updated_at = at;
    }
}

/// Terminal change requested for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Move to SUCCESS and clear error fields.
    Succeeded,
    /// Move to FAILED with the given reason.
    Failed {
        /// Failure reason, already truncated.
        details: String,
        /// Failure code, when reported.
        code: Option<String>,
    },
}

impl StatusUpdate {
    /// Build a failure update, truncating the reason to the persisted limit.
    pub fn failed(details: impl Into<String>, code: Option<String>) -> Self {
        let details: String = details.into();
        let details = match details.char_indices().nth(MAX_ERROR_DETAILS_CHARS) {
            Some((cut, _)) => details[..cut].to_string(),
            None => details,
        };
        Self::Failed { details, code }
    }

    /// Status the record ends up in.
    pub fn status(&self) -> ProcessingStatus {
        match self {
            Self::Succeeded => ProcessingStatus::Success,
            Self::Failed { .. } => ProcessingStatus::Failed,
        }
    }
}

/// JSON projection of a record returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeView {
    /// Record identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: String,
    /// Display name.
    pub name: String,
    /// Content classification.
    pub content_type: ContentType,
    /// MIME type, when known.
    pub mime_type: Option<String>,
    /// Size in bytes, when known.
    pub size: Option<u64>,
    /// Source URI.
    pub source: String,
    /// Current lifecycle state.
    pub processing_status: ProcessingStatus,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    /// Failure code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Creation time (RFC 3339).
    #[serde(with = "timestamp")]
    pub created_at: OffsetDateTime,
    /// Time of the last status change (RFC 3339).
    #[serde(with = "timestamp")]
    pub updated_at: OffsetDateTime,
}

impl From<&KnowledgeRecord> for KnowledgeView {
    fn from(record: &KnowledgeRecord) -> Self {
        Self {
            id: record.id,
            project_id: record.project_id.clone(),
            name: record.name.clone(),
            content_type: record.content_type,
            mime_type: record.mime_type.clone(),
            size: record.size,
            source: record.source.clone(),
            processing_status: record.processing_status,
            error_details: record.error_details.clone(),
            error_code: record.error_code.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KnowledgeRecord {
        KnowledgeRecord::new(NewKnowledge {
            project_id: "p-1".into(),
            name: "report.pdf".into(),
            content_type: ContentType::Document,
            mime_type: Some("application/pdf".into()),
            size: Some(2048),
            source: ContentSource::Object {
                bucket: "uploads".into(),
                key: "documents/report.pdf".into(),
            },
        })
    }

    #[test]
    fn new_records_start_processing() {
        let record = sample();
        assert_eq!(record.processing_status, ProcessingStatus::Processing);
        assert_eq!(record.source, "s3://uploads/documents/report.pdf");
        assert!(record.error_details.is_none());
    }

    #[test]
    fn success_clears_error_fields() {
        let mut record = sample();
        record.error_details = Some("stale".into());
        record.apply(&StatusUpdate::Succeeded, OffsetDateTime::now_utc());
        assert_eq!(record.processing_status, ProcessingStatus::Success);
        assert!(record.error_details.is_none());
    }

    #[test]
    fn failure_details_are_truncated() {
        let update = StatusUpdate::failed("é".repeat(1500), Some("X".into()));
        let StatusUpdate::Failed { details, .. } = update else {
            panic!("expected failure update");
        };
        assert_eq!(details.chars().count(), MAX_ERROR_DETAILS_CHARS);
    }

    #[test]
    fn source_uris_round_trip() {
        let object = ContentSource::parse("s3://bucket/a/b.pdf").expect("object source");
        assert_eq!(
            object,
            ContentSource::Object {
                bucket: "bucket".into(),
                key: "a/b.pdf".into()
            }
        );
        assert_eq!(
            ContentSource::parse("https://example.org/x"),
            Some(ContentSource::Web("https://example.org/x".into()))
        );
        assert_eq!(ContentSource::parse("s3://bucket-only"), None);
        assert_eq!(ContentSource::parse("ftp://host/file"), None);
    }

    #[test]
    fn view_serializes_camel_case() {
        let view = KnowledgeView::from(&sample());
        let json = serde_json::to_value(&view).expect("json");
        assert_eq!(json["processingStatus"], "PROCESSING");
        assert_eq!(json["contentType"], "DOCUMENT");
        assert_eq!(json["projectId"], "p-1");
        assert!(json.get("errorDetails").is_none());
    }
}
