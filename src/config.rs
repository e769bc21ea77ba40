use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Queue that receives outbound processing requests.
    pub process_queue_url: String,
    /// Queue the external worker reports status events on.
    pub status_queue_url: String,
    /// AWS region used when signing queue and object store requests.
    pub aws_region: String,
    /// Optional override for the queue API endpoint.
    pub sqs_endpoint: Option<String>,
    /// Optional path-style object store endpoint (MinIO, LocalStack).
    pub s3_endpoint: Option<String>,
    /// Connection string for the knowledge record store.
    pub knowledge_db_url: String,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection receiving indexed chunks.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime when that provider is selected.
    pub ollama_url: String,
    /// Status consumer tuning.
    pub consumer: ConsumerSettings,
    /// Request publisher retry tuning.
    pub publish: PublishSettings,
    /// Long-poll tuning.
    pub long_poll: LongPollSettings,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the index writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Deterministic byte-hashing encoder, no external service.
    Hash,
    /// Local Ollama runtime.
    Ollama,
}

/// Tuning knobs for the status consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Long-poll wait applied to each receive call.
    pub wait_time: Duration,
    /// Maximum number of messages requested per receive.
    pub max_messages: usize,
    /// Upper bound on concurrently handled messages.
    pub concurrency: usize,
    /// Visibility timeout requested for received messages.
    pub visibility_timeout: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(20),
            max_messages: 10,
            concurrency: 4,
            visibility_timeout: Duration::from_secs(60),
        }
    }
}

/// Retry schedule applied when publishing processing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishSettings {
    /// Retries attempted after the initial send.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied to each subsequent delay.
    pub multiplier: u32,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2,
        }
    }
}

/// Poll cadence and bounds for status long-polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongPollSettings {
    /// Sleep between consecutive status reads.
    pub interval: Duration,
    /// Wait applied when the caller does not request one.
    pub default_timeout: Duration,
    /// Server-enforced ceiling on any requested wait.
    pub max_timeout: Duration,
}

impl Default for LongPollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            default_timeout: Duration::from_millis(20_000),
            max_timeout: Duration::from_millis(30_000),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let consumer_defaults = ConsumerSettings::default();
        let publish_defaults = PublishSettings::default();
        let poll_defaults = LongPollSettings::default();

        let max_messages = parse_optional("CONSUMER_MAX_MESSAGES")?
            .unwrap_or(consumer_defaults.max_messages);
        if max_messages == 0 || max_messages > 10 {
            return Err(ConfigError::InvalidValue("CONSUMER_MAX_MESSAGES".into()));
        }
        let concurrency =
            parse_optional("CONSUMER_CONCURRENCY")?.unwrap_or(consumer_defaults.concurrency);
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue("CONSUMER_CONCURRENCY".into()));
        }

        let long_poll = LongPollSettings {
            interval: parse_optional("LONG_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(poll_defaults.interval),
            default_timeout: parse_optional("LONG_POLL_DEFAULT_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(poll_defaults.default_timeout),
            max_timeout: parse_optional("LONG_POLL_MAX_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(poll_defaults.max_timeout),
        };
        if long_poll.interval.is_zero() {
            return Err(ConfigError::InvalidValue("LONG_POLL_INTERVAL_MS".into()));
        }

        Ok(Self {
            process_queue_url: load_env("PROCESS_QUEUE_URL")?,
            status_queue_url: load_env("STATUS_QUEUE_URL")?,
            aws_region: load_env_optional("AWS_REGION").unwrap_or_else(|| "us-east-1".into()),
            sqs_endpoint: load_env_optional("SQS_ENDPOINT"),
            s3_endpoint: load_env_optional("S3_ENDPOINT"),
            knowledge_db_url: load_env_optional("KNOWLEDGE_DB_URL")
                .unwrap_or_else(|| "sqlite://data/knowledge.db".into()),
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::Hash),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "nomic-embed-text".into()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?.unwrap_or(768),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| "http://127.0.0.1:11434".into()),
            consumer: ConsumerSettings {
                wait_time: parse_optional("CONSUMER_WAIT_TIME_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(consumer_defaults.wait_time),
                max_messages,
                concurrency,
                visibility_timeout: parse_optional("CONSUMER_VISIBILITY_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(consumer_defaults.visibility_timeout),
            },
            publish: PublishSettings {
                max_retries: parse_optional("PUBLISH_MAX_RETRIES")?
                    .unwrap_or(publish_defaults.max_retries),
                base_delay: parse_optional("PUBLISH_BASE_DELAY_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(publish_defaults.base_delay),
                multiplier: parse_optional("PUBLISH_BACKOFF_MULTIPLIER")?
                    .unwrap_or(publish_defaults.multiplier),
            },
            long_poll,
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        process_queue = %config.process_queue_url,
        status_queue = %config.status_queue_url,
        region = %config.aws_region,
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
