//! Write side of the vector index.
//!
//! Extracted chunks are embedded and upserted under deterministic point ids, so replaying the
//! same batch overwrites the points it wrote before instead of duplicating them.

use crate::artifacts::ArtifactChunk;
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::events::timestamp::format_rfc3339;
use crate::qdrant::payload::build_payload;
use crate::qdrant::{ChunkOrigin, PointUpsert, QdrantError, QdrantService, point_id};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::OnceCell;

/// Errors raised while writing a batch to the index.
#[derive(Debug, Error)]
pub enum IndexWriteError {
    /// Embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store rejected the write.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Fewer or more vectors came back than chunks were sent.
    #[error("Embedding count mismatch: expected {expected}, received {received}")]
    EmbeddingCount {
        /// Chunks sent for embedding.
        expected: usize,
        /// Vectors returned.
        received: usize,
    },
    /// The writer reported a different number of written chunks than it was given.
    #[error("Index wrote {written} chunks, expected {expected}")]
    CountMismatch {
        /// Chunks handed to the writer.
        expected: usize,
        /// Chunks the writer reported.
        written: usize,
    },
}

/// Chunks of a single knowledge record ready to be indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBatch {
    /// Knowledge record the chunks belong to.
    pub content_id: String,
    /// Owning project of the record.
    pub project_id: String,
    /// Extracted chunks in artifact order.
    pub chunks: Vec<ArtifactChunk>,
}

/// Makes extracted chunks searchable.
#[async_trait]
pub trait IndexWriter: Send + Sync {
    /// Write `batch`, returning how many chunks were written.
    async fn write(&self, batch: &IndexBatch) -> Result<usize, IndexWriteError>;
}

/// Index writer that embeds chunks and upserts them into a Qdrant collection.
pub struct QdrantIndexWriter {
    qdrant: QdrantService,
    embedder: Arc<dyn EmbeddingClient>,
    collection: String,
    prepared: OnceCell<()>,
}

impl QdrantIndexWriter {
    /// Build a writer targeting `collection`.
    pub fn new(
        qdrant: QdrantService,
        embedder: Arc<dyn EmbeddingClient>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            qdrant,
            embedder,
            collection: collection.into(),
            prepared: OnceCell::new(),
        }
    }

    async fn ensure_collection(&self) -> Result<(), QdrantError> {
        self.prepared
            .get_or_try_init(|| async {
                self.qdrant
                    .create_collection_if_not_exists(&self.collection, self.embedder.dimension() as u64)
                    .await?;
                self.qdrant.ensure_payload_indexes(&self.collection).await
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl IndexWriter for QdrantIndexWriter {
    async fn write(&self, batch: &IndexBatch) -> Result<usize, IndexWriteError> {
        if batch.chunks.is_empty() {
            return Ok(0);
        }
        self.ensure_collection().await?;

        let texts: Vec<String> = batch.chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.generate_embeddings(texts).await?;
        if vectors.len() != batch.chunks.len() {
            return Err(IndexWriteError::EmbeddingCount {
                expected: batch.chunks.len(),
                received: vectors.len(),
            });
        }

        let origin = ChunkOrigin {
            content_id: &batch.content_id,
            project_id: &batch.project_id,
        };
        let timestamp = format_rfc3339(OffsetDateTime::now_utc());
        let points = batch
            .chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (chunk, vector))| PointUpsert {
                id: point_id(&batch.content_id, index),
                vector,
                payload: build_payload(origin, index, &chunk.text, &timestamp, &chunk.metadata),
            })
            .collect();

        let written = self.qdrant.upsert_points(&self.collection, points).await?;
        tracing::info!(
            content_id = %batch.content_id,
            collection = %self.collection,
            chunks = written,
            "Indexed chunks"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use httpmock::{Method::GET, Method::PUT, MockServer};
    use serde_json::{Map, Value};

    fn chunk(text: &str) -> ArtifactChunk {
        let mut metadata = Map::new();
        metadata.insert("contentId".into(), Value::String("k-1".into()));
        ArtifactChunk {
            id: None,
            text: text.to_string(),
            metadata,
        }
    }

    fn writer(server: &MockServer) -> QdrantIndexWriter {
        let qdrant = QdrantService::new(reqwest::Client::new(), &server.base_url(), None)
            .expect("qdrant");
        QdrantIndexWriter::new(qdrant, Arc::new(HashEmbeddingClient::new(4)), "knowledge")
    }

    #[tokio::test]
    async fn writes_points_with_deterministic_ids() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/knowledge");
                then.status(200).json_body(serde_json::json!({ "result": {} }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/knowledge/index");
                then.status(200).json_body(serde_json::json!({ "result": {} }));
            })
            .await;
        let first_id = point_id("k-1", 0);
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/knowledge/points")
                    .body_contains(first_id.as_str())
                    .body_contains("\"project_id\":\"p-1\"");
                then.status(200).json_body(serde_json::json!({ "result": {} }));
            })
            .await;

        let writer = writer(&server);
        let batch = IndexBatch {
            content_id: "k-1".into(),
            project_id: "p-1".into(),
            chunks: vec![chunk("alpha"), chunk("beta")],
        };
        assert_eq!(writer.write(&batch).await.expect("write"), 2);
        assert_eq!(writer.write(&batch).await.expect("replay"), 2);

        exists.assert_hits(1);
        upsert.assert_hits(2);
    }

    #[tokio::test]
    async fn empty_batches_skip_the_network() {
        let server = MockServer::start_async().await;
        let batch = IndexBatch {
            content_id: "k-1".into(),
            project_id: "p-1".into(),
            chunks: Vec::new(),
        };
        assert_eq!(writer(&server).write(&batch).await.expect("write"), 0);
    }

    #[tokio::test]
    async fn upsert_rejection_surfaces_as_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/knowledge");
                then.status(200).json_body(serde_json::json!({ "result": {} }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/knowledge/index");
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/knowledge/points");
                then.status(503).body("overloaded");
            })
            .await;

        let batch = IndexBatch {
            content_id: "k-1".into(),
            project_id: "p-1".into(),
            chunks: vec![chunk("alpha")],
        };
        let err = writer(&server).write(&batch).await.unwrap_err();
        assert!(matches!(err, IndexWriteError::Qdrant(QdrantError::UnexpectedStatus { .. })));
    }
}
