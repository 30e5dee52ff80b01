#![warn(missing_docs)]
//! Core library for the paperchat RAG backend.

pub mod auth;
pub mod chunker;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod objects;
pub mod pdf;
pub mod responder;
pub mod retrieve;
pub mod server;
pub mod store;

pub use auth::{AuthUser, JwtAuth};
pub use chunker::Chunker;
pub use config::ServerConfig;
pub use error::ApiError;
pub use ingest::{IngestOutcome, IngestPipeline};
pub use models::{
    ChunkMetadata, ChunkSource, DocumentRecord, EmbeddingRecord, MessageRecord, Role,
    ScoredRecord, SessionRecord, UserRecord,
};
pub use responder::{RagReply, Responder, SourceInfo};
pub use retrieve::Retriever;
pub use server::{router, AppState};
pub use store::{DataStore, SearchFilter, VectorStore};
