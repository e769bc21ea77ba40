//! Validation of new content before a record is created.

use crate::knowledge::{ContentSource, ContentType, NewKnowledge};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

/// Name recorded for uploads submitted without one.
pub const UNKNOWN_FILE_NAME: &str = "unknown_file";
/// Name recorded for web content whose URL has no host.
pub const UNKNOWN_WEB_NAME: &str = "web_resource";
/// MIME type recorded for web content.
pub const WEB_MIME_TYPE: &str = "text/html";

const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "application/rtf",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// Submission problems detected before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    /// MIME type is neither an image nor a supported document.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),
    /// Web URL failed to parse or uses a scheme other than http(s).
    #[error("Invalid web URL: {0}")]
    InvalidUrl(String),
    /// Object store location is incomplete.
    #[error("Invalid object location: {0}")]
    InvalidLocation(String),
}

/// A file already uploaded to the object store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSubmission {
    /// Original file name.
    #[serde(default)]
    pub name: Option<String>,
    /// MIME type reported by the uploader.
    pub mime_type: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Bucket holding the upload.
    pub bucket: String,
    /// Object key of the upload.
    pub key: String,
    /// Submitting user.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// A web page to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSubmission {
    /// Page URL.
    pub url: String,
    /// Submitting user.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Classify a MIME type, ignoring parameters and case.
pub fn classify_mime(mime_type: &str) -> Option<ContentType> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence.starts_with("image/") && essence.len() > "image/".len() {
        Some(ContentType::Image)
    } else if DOCUMENT_MIME_TYPES.contains(&essence.as_str()) {
        Some(ContentType::Document)
    } else {
        None
    }
}

impl FileSubmission {
    /// Validate the upload and describe the record to create.
    pub fn prepare(&self, project_id: &str) -> Result<NewKnowledge, SubmissionError> {
        let content_type = classify_mime(&self.mime_type)
            .ok_or_else(|| SubmissionError::UnsupportedContentType(self.mime_type.clone()))?;
        if self.bucket.trim().is_empty() || self.key.trim().is_empty() {
            return Err(SubmissionError::InvalidLocation(
                "bucket and key are required".into(),
            ));
        }
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_FILE_NAME);
        Ok(NewKnowledge {
            project_id: project_id.to_string(),
            name: name.to_string(),
            content_type,
            mime_type: Some(self.mime_type.clone()),
            size: self.size,
            source: ContentSource::Object {
                bucket: self.bucket.clone(),
                key: self.key.clone(),
            },
        })
    }
}

impl WebSubmission {
    /// Validate the URL and describe the record to create.
    pub fn prepare(&self, project_id: &str) -> Result<NewKnowledge, SubmissionError> {
        let url = Url::parse(self.url.trim())
            .map_err(|err| SubmissionError::InvalidUrl(format!("{}: {err}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SubmissionError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                self.url
            )));
        }
        let name = url
            .host_str()
            .filter(|host| !host.is_empty())
            .unwrap_or(UNKNOWN_WEB_NAME)
            .to_string();
        Ok(NewKnowledge {
            project_id: project_id.to_string(),
            name,
            content_type: ContentType::Web,
            mime_type: Some(WEB_MIME_TYPE.to_string()),
            size: None,
            source: ContentSource::Web(url.to_string()),
        })
    }
}
