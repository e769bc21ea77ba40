//! Helpers for constructing and hashing Qdrant payloads.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Identity of the knowledge record a chunk belongs to.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOrigin<'a> {
    /// Knowledge record identifier.
    pub content_id: &'a str,
    /// Owning project.
    pub project_id: &'a str,
}

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(
    origin: ChunkOrigin<'_>,
    chunk_index: usize,
    text: &str,
    timestamp_rfc3339: &str,
    metadata: &Map<String, Value>,
) -> Value {
    let mut payload = Map::new();
    payload.insert("content_id".into(), Value::String(origin.content_id.to_string()));
    payload.insert("project_id".into(), Value::String(origin.project_id.to_string()));
    payload.insert("chunk_index".into(), Value::from(chunk_index));
    payload.insert("chunk_hash".into(), Value::String(compute_chunk_hash(text)));
    payload.insert("timestamp".into(), Value::String(timestamp_rfc3339.to_string()));
    payload.insert("text".into(), Value::String(text.to_string()));
    if !metadata.is_empty() {
        payload.insert("metadata".into(), Value::Object(metadata.clone()));
    }
    Value::Object(payload)
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Stable point id for the `chunk_index`-th chunk of a record, so replays overwrite.
pub fn point_id(content_id: &str, chunk_index: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{content_id}:{chunk_index}").as_bytes(),
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: ChunkOrigin<'static> = ChunkOrigin {
        content_id: "k-1",
        project_id: "p-1",
    };

    #[test]
    fn chunk_hash_is_stable() {
        let h1 = compute_chunk_hash("Hello world");
        assert_eq!(h1, compute_chunk_hash("Hello world"));
        assert_ne!(h1, compute_chunk_hash("Hello world!"));
    }

    #[test]
    fn point_ids_are_deterministic_per_chunk() {
        assert_eq!(point_id("k-1", 0), point_id("k-1", 0));
        assert_ne!(point_id("k-1", 0), point_id("k-1", 1));
        assert_ne!(point_id("k-1", 0), point_id("k-2", 0));
        assert!(Uuid::parse_str(&point_id("k-1", 3)).is_ok());
    }

    #[test]
    fn payload_carries_origin_and_metadata() {
        let mut metadata = Map::new();
        metadata.insert("contentId".into(), Value::String("k-1".into()));
        metadata.insert("page".into(), Value::from(4));

        let payload = build_payload(ORIGIN, 2, "sample", "2025-01-01T00:00:00Z", &metadata);
        assert_eq!(payload["content_id"], "k-1");
        assert_eq!(payload["project_id"], "p-1");
        assert_eq!(payload["chunk_index"], 2);
        assert_eq!(payload["text"], "sample");
        assert_eq!(payload["metadata"]["page"], 4);
        assert_eq!(payload["chunk_hash"], compute_chunk_hash("sample"));
    }

    #[test]
    fn empty_metadata_is_omitted() {
        let payload = build_payload(ORIGIN, 0, "x", "2025-01-01T00:00:00Z", &Map::new());
        assert!(payload.get("metadata").is_none());
    }
}
