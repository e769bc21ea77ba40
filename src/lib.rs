#![deny(missing_docs)]

//! Core library for the Kontext knowledge-ingestion pipeline.

/// HTTP routing and REST handlers.
pub mod api;
/// Pipeline assembly from configuration or supplied backends.
pub mod app;
/// Extraction artifact access in the object store.
pub mod artifacts;
/// AWS request signing shared by the queue and object store adapters.
pub mod aws;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Processing event schema and codec.
pub mod events;
/// Vector index write path.
pub mod index;
/// Knowledge records, their stores, and status transitions.
pub mod knowledge;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline counters.
pub mod metrics;
/// Request publishing, status consumption, and long-polling.
pub mod pipeline;
/// Qdrant vector store integration.
pub mod qdrant;
/// Message queue seam and backends.
pub mod queue;
