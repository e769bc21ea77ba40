//! Assembly of the pipeline from configuration or from caller-supplied backends.

use crate::artifacts::{ArtifactStore, S3ArtifactStore};
use crate::aws::AwsCredentials;
use crate::config::{Config, ConsumerSettings, LongPollSettings, PublishSettings};
use crate::embedding::get_embedding_client;
use crate::index::{IndexWriter, QdrantIndexWriter};
use crate::knowledge::{KnowledgeStore, SqliteKnowledgeStore};
use crate::metrics::PipelineMetrics;
use crate::pipeline::{
    KnowledgeService, LongPollCoordinator, RequestPublisher, StatusConsumer, StatusHandler,
};
use crate::qdrant::QdrantService;
use crate::queue::{QueueReceiver, QueueSender, SqsQueue};
use anyhow::Context;
use std::sync::Arc;

/// Backends the pipeline runs against.
pub struct Backends {
    /// Knowledge record store.
    pub store: Arc<dyn KnowledgeStore>,
    /// Extraction artifact store.
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Vector index writer.
    pub index: Arc<dyn IndexWriter>,
    /// Outbound request queue.
    pub requests: Arc<dyn QueueSender>,
    /// Inbound status queue.
    pub statuses: Arc<dyn QueueReceiver>,
}

/// Tuning applied to the assembled pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    /// Status consumer settings.
    pub consumer: ConsumerSettings,
    /// Publish retry settings.
    pub publish: PublishSettings,
    /// Long-poll settings.
    pub long_poll: LongPollSettings,
}

/// A wired pipeline: the request-side service plus the status consumer.
pub struct Pipeline {
    /// Service backing the HTTP routes.
    pub service: Arc<KnowledgeService>,
    /// Consumer to run on its own task.
    pub consumer: StatusConsumer,
    /// Counters shared by both halves.
    pub metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Wire the pipeline over arbitrary backends.
    pub fn assemble(backends: Backends, settings: Settings) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let handler = Arc::new(StatusHandler::new(
            backends.store.clone(),
            backends.artifacts,
            backends.index,
            metrics.clone(),
        ));
        let consumer = StatusConsumer::new(
            backends.statuses,
            handler,
            settings.consumer,
            metrics.clone(),
        );
        let publisher = RequestPublisher::new(
            backends.requests,
            settings.publish.into(),
            metrics.clone(),
        );
        let long_poll = LongPollCoordinator::new(backends.store.clone(), settings.long_poll);
        let service = Arc::new(KnowledgeService::new(
            backends.store,
            publisher,
            long_poll,
            metrics.clone(),
        ));
        Self {
            service,
            consumer,
            metrics,
        }
    }

    /// Wire the pipeline against SQS, S3, SQLite, and Qdrant as configured.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kontext-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let credentials = AwsCredentials::from_env().context("Failed to load AWS credentials")?;

        let requests = SqsQueue::from_settings(
            client.clone(),
            credentials.clone(),
            &config.aws_region,
            config.sqs_endpoint.as_deref(),
            config.process_queue_url.clone(),
        )
        .context("Failed to configure request queue")?;
        let statuses = SqsQueue::from_settings(
            client.clone(),
            credentials.clone(),
            &config.aws_region,
            config.sqs_endpoint.as_deref(),
            config.status_queue_url.clone(),
        )
        .context("Failed to configure status queue")?;
        let artifacts = S3ArtifactStore::new(
            client.clone(),
            credentials,
            config.aws_region.clone(),
            config.s3_endpoint.clone(),
        );

        let store = SqliteKnowledgeStore::connect(&config.knowledge_db_url)
            .await
            .context("Failed to open knowledge store")?;

        let qdrant = QdrantService::new(
            client.clone(),
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
        )
        .context("Failed to configure Qdrant client")?;
        let embedder = get_embedding_client(config, client);
        let index = QdrantIndexWriter::new(qdrant, embedder, config.qdrant_collection_name.clone());

        tracing::info!(
            region = %config.aws_region,
            collection = %config.qdrant_collection_name,
            "Pipeline backends configured"
        );
        Ok(Self::assemble(
            Backends {
                store: Arc::new(store),
                artifacts: Arc::new(artifacts),
                index: Arc::new(index),
                requests: Arc::new(requests),
                statuses: Arc::new(statuses),
            },
            Settings {
                consumer: config.consumer,
                publish: config.publish,
                long_poll: config.long_poll,
            },
        ))
    }
}
