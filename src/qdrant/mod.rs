//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use payload::{ChunkOrigin, compute_chunk_hash, point_id};
pub use types::{PointUpsert, QdrantError};
