//! Object store access for extraction artifacts.
//!
//! The worker leaves a JSON array of chunk documents in the object store and references it
//! from its success event. Artifacts are read once, indexed, and then deleted.

pub mod memory;
pub mod s3;

pub use memory::MemoryArtifactStore;
pub use s3::S3ArtifactStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while reading or reclaiming artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// No object exists at the referenced location.
    #[error("Artifact s3://{bucket}/{key} not found")]
    NotFound {
        /// Bucket that was read.
        bucket: String,
        /// Key that was read.
        key: String,
    },
    /// The object could not be read.
    #[error("Failed to read artifact s3://{bucket}/{key}: {reason}")]
    Read {
        /// Bucket that was read.
        bucket: String,
        /// Key that was read.
        key: String,
        /// Transport or status detail.
        reason: String,
    },
    /// The object is not a JSON array of chunks.
    #[error("Artifact s3://{bucket}/{key} is not a chunk array: {reason}")]
    Decode {
        /// Bucket that was read.
        bucket: String,
        /// Key that was read.
        key: String,
        /// Parser detail.
        reason: String,
    },
    /// The object could not be deleted.
    #[error("Failed to delete artifact s3://{bucket}/{key}: {reason}")]
    Delete {
        /// Bucket that was targeted.
        bucket: String,
        /// Key that was targeted.
        key: String,
        /// Transport or status detail.
        reason: String,
    },
}

/// One extracted chunk as written by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChunk")]
pub struct ArtifactChunk {
    /// Worker-assigned chunk identifier, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Chunk text.
    pub text: String,
    /// Free-form metadata; carries at least `contentId`.
    pub metadata: Map<String, Value>,
}

/// Chunk documents are written with either `text` or the older `content` field.
#[derive(Deserialize)]
struct RawChunk {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl TryFrom<RawChunk> for ArtifactChunk {
    type Error = String;

    fn try_from(raw: RawChunk) -> Result<Self, Self::Error> {
        let text = raw
            .text
            .or(raw.content)
            .ok_or_else(|| "chunk has neither `text` nor `content`".to_string())?;
        let id = raw.id.and_then(|id| match id {
            Value::String(text) => Some(text),
            Value::Null => None,
            other => Some(other.to_string()),
        });
        Ok(Self {
            id,
            text,
            metadata: raw.metadata.unwrap_or_default(),
        })
    }
}

impl ArtifactChunk {
    /// `contentId` recorded in the chunk metadata.
    pub fn content_id(&self) -> Option<&str> {
        self.metadata.get("contentId").and_then(Value::as_str)
    }
}

/// Parse an artifact body into chunks.
pub fn decode_chunks(bucket: &str, key: &str, bytes: &[u8]) -> Result<Vec<ArtifactChunk>, ArtifactError> {
    serde_json::from_slice(bytes).map_err(|err| ArtifactError::Decode {
        bucket: bucket.to_string(),
        key: key.to_string(),
        reason: err.to_string(),
    })
}

/// Fetch-and-delete access to extraction artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Read and decode the artifact at `bucket`/`key`.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<ArtifactChunk>, ArtifactError>;

    /// Remove the artifact at `bucket`/`key`.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ArtifactError>;
}
