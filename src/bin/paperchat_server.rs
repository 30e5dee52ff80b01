use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use paperchat::auth::JwtAuth;
use paperchat::config::ServerConfig;
use paperchat::ingest::IngestPipeline;
use paperchat::llm::{Captioner, ChatModel, Embedder, OpenAiChat, OpenAiEmbedder};
use paperchat::objects::PdfObjectStore;
use paperchat::responder::Responder;
use paperchat::retrieve::Retriever;
use paperchat::server::{router, AppState};
use paperchat::store::astra::AstraCollections;
use paperchat::store::{AstraClient, DataStore, MemoryStore, MemoryVectorStore, VectorStore};
use paperchat::Chunker;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();

    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
        &config.openai_api_key,
        &config.openai_base_url,
        config.embed_model.clone(),
        Some(config.embed_dimensions),
        config.embed_timeout(),
        config.max_retries,
        config.embed_batch_size,
    )?);
    let chat = Arc::new(OpenAiChat::new(
        &config.openai_api_key,
        &config.openai_base_url,
        config.chat_model.clone(),
        config.chat_timeout(),
        config.max_retries,
        config.caption_max_tokens,
        config.answer_max_tokens,
    )?);
    let captioner: Arc<dyn Captioner> = chat.clone();
    let chat_model: Arc<dyn ChatModel> = chat;

    let (store, vectors): (Arc<dyn DataStore>, Arc<dyn VectorStore>) =
        if config.astra_endpoint.trim().is_empty() {
            tracing::warn!("no Astra endpoint configured; using in-memory storage");
            (
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryVectorStore::new()),
            )
        } else {
            let client = Arc::new(AstraClient::new(
                config.astra_endpoint.clone(),
                config.astra_token.clone(),
                config.astra_keyspace.clone(),
                AstraCollections {
                    users: config.collection_users.clone(),
                    sessions: config.collection_sessions.clone(),
                    documents: config.collection_documents.clone(),
                    embeddings: config.collection_embeddings.clone(),
                    messages: config.collection_messages.clone(),
                },
                config.embed_timeout(),
                config.max_retries,
            )?);
            client
                .ensure_collections(config.embed_dimensions)
                .await
                .context("failed to prepare Astra collections")?;
            (client.clone(), client)
        };

    let objects = if config.s3_bucket.trim().is_empty() {
        tracing::warn!("no S3 bucket configured; using in-memory object store");
        Arc::new(PdfObjectStore::in_memory())
    } else {
        Arc::new(PdfObjectStore::s3(
            &config.s3_bucket,
            &config.s3_region,
            &config.aws_access_key_id,
            &config.aws_secret_access_key,
        )?)
    };

    let state = AppState {
        auth: Arc::new(JwtAuth::new(&config.jwt_secret, config.jwt_ttl())),
        store: Arc::clone(&store),
        ingest: Arc::new(IngestPipeline::new(
            Chunker::new(config.chunk_size, config.chunk_overlap),
            Arc::clone(&embedder),
            captioner,
            Arc::clone(&vectors),
            Arc::clone(&store),
            objects,
            config.caption_concurrency,
        )),
        retriever: Arc::new(Retriever::new(embedder, vectors, config.top_k)),
        responder: Arc::new(Responder::new(chat_model, store, config.history_limit)),
    };
    let app = router(state);

    let addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind))?;
    tracing::info!(%addr, "paperchat listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server shutdown")?;
    Ok(())
}
