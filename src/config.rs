//! Environment-driven service configuration.
//!
//! All tunables are injected here and passed down as explicit parameters; no
//! component reads the environment on its own.

use std::time::Duration;

use clap::Parser;

/// Command-line/environment configuration for the paperchat server.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "paperchat-server",
    about = "Multi-tenant RAG backend for PDF question answering"
)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "PAPERCHAT_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Secret used to sign HS256 access tokens
    #[arg(long, env = "PAPERCHAT_JWT_SECRET")]
    pub jwt_secret: String,

    /// Seconds before issued access tokens expire
    #[arg(long, env = "PAPERCHAT_JWT_EXPIRES_SECS", default_value_t = 86_400)]
    pub jwt_expires_secs: u64,

    /// OpenAI API key used for embeddings, captions, and chat
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: String,

    /// Base URL for OpenAI-compatible endpoints
    #[arg(
        long,
        env = "PAPERCHAT_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Embedding model identifier
    #[arg(
        long,
        env = "PAPERCHAT_EMBED_MODEL",
        default_value = "text-embedding-3-small"
    )]
    pub embed_model: String,

    /// Embedding dimension override (matches the vector collection)
    #[arg(long, env = "PAPERCHAT_EMBED_DIMENSIONS", default_value_t = 1000)]
    pub embed_dimensions: usize,

    /// Max inputs per embedding request
    #[arg(long, env = "PAPERCHAT_EMBED_BATCH", default_value_t = 32)]
    pub embed_batch_size: usize,

    /// Seconds before embedding requests time out
    #[arg(long, env = "PAPERCHAT_EMBED_TIMEOUT_SECS", default_value_t = 30)]
    pub embed_timeout_secs: u64,

    /// Chat model used for captions and grounded answers
    #[arg(long, env = "PAPERCHAT_CHAT_MODEL", default_value = "gpt-4o-mini")]
    pub chat_model: String,

    /// Seconds before chat/caption requests time out
    #[arg(long, env = "PAPERCHAT_CHAT_TIMEOUT_SECS", default_value_t = 60)]
    pub chat_timeout_secs: u64,

    /// Retry attempts for transient upstream errors
    #[arg(long, env = "PAPERCHAT_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: usize,

    /// Output-token budget for image captions
    #[arg(long, env = "PAPERCHAT_CAPTION_MAX_TOKENS", default_value_t = 200)]
    pub caption_max_tokens: usize,

    /// Concurrent caption requests per ingestion
    #[arg(long, env = "PAPERCHAT_CAPTION_CONCURRENCY", default_value_t = 4)]
    pub caption_concurrency: usize,

    /// Max output tokens for grounded answers
    #[arg(long, env = "PAPERCHAT_ANSWER_MAX_TOKENS", default_value_t = 1000)]
    pub answer_max_tokens: usize,

    /// Target window size for text chunks, in characters
    #[arg(long, env = "PAPERCHAT_CHUNK_SIZE", default_value_t = 1000)]
    pub chunk_size: usize,

    /// Overlap between adjacent chunks, in characters
    #[arg(long, env = "PAPERCHAT_CHUNK_OVERLAP", default_value_t = 150)]
    pub chunk_overlap: usize,

    /// Chunks returned per retrieval
    #[arg(long, env = "PAPERCHAT_TOP_K", default_value_t = 5)]
    pub top_k: usize,

    /// Most recent messages included as conversation history
    #[arg(long, env = "PAPERCHAT_HISTORY_LIMIT", default_value_t = 10)]
    pub history_limit: usize,

    /// Astra Data API endpoint (empty = in-memory backend)
    #[arg(long, env = "ASTRA_DB_API_ENDPOINT", default_value = "")]
    pub astra_endpoint: String,

    /// Astra Data API application token
    #[arg(long, env = "ASTRA_DB_APPLICATION_TOKEN", default_value = "")]
    pub astra_token: String,

    /// Astra keyspace holding the collections
    #[arg(long, env = "ASTRA_DB_KEYSPACE", default_value = "default_keyspace")]
    pub astra_keyspace: String,

    /// Collection for user records
    #[arg(long, env = "PAPERCHAT_COLLECTION_USERS", default_value = "users")]
    pub collection_users: String,

    /// Collection for session records
    #[arg(
        long,
        env = "PAPERCHAT_COLLECTION_SESSIONS",
        default_value = "sessions"
    )]
    pub collection_sessions: String,

    /// Collection for document metadata records
    #[arg(
        long,
        env = "PAPERCHAT_COLLECTION_DOCUMENTS",
        default_value = "documents"
    )]
    pub collection_documents: String,

    /// Vector collection for embedding records
    #[arg(
        long,
        env = "PAPERCHAT_COLLECTION_EMBEDDINGS",
        default_value = "embeddings"
    )]
    pub collection_embeddings: String,

    /// Collection for conversation messages
    #[arg(
        long,
        env = "PAPERCHAT_COLLECTION_MESSAGES",
        default_value = "messages"
    )]
    pub collection_messages: String,

    /// S3 bucket for uploaded PDFs (empty = in-memory object store)
    #[arg(long, env = "PAPERCHAT_S3_BUCKET", default_value = "")]
    pub s3_bucket: String,

    /// S3 region for the PDF bucket
    #[arg(long, env = "PAPERCHAT_S3_REGION", default_value = "us-east-1")]
    pub s3_region: String,

    /// AWS access key id (falls back to the ambient credential chain)
    #[arg(long, env = "AWS_ACCESS_KEY_ID", default_value = "")]
    pub aws_access_key_id: String,

    /// AWS secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", default_value = "")]
    pub aws_secret_access_key: String,
}

impl ServerConfig {
    /// Timeout applied to embedding requests.
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs.max(1))
    }

    /// Timeout applied to caption and chat requests.
    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs.max(1))
    }

    /// JWT lifetime.
    pub fn jwt_ttl(&self) -> Duration {
        Duration::from_secs(self.jwt_expires_secs.max(1))
    }
}
