//! Storage seams: document records in a managed database, embeddings in a
//! vector collection.
//!
//! Both traits are deliberately narrow so the concrete backend can be swapped
//! without touching pipeline logic. The memory backend serves dev mode and the
//! test suite; the Astra backend talks to the managed Data API.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    DocumentRecord, EmbeddingRecord, MessageRecord, ScoredRecord, SessionRecord, UserRecord,
};

pub mod astra;
pub mod memory;

pub use astra::AstraClient;
pub use memory::{MemoryStore, MemoryVectorStore};

/// Mandatory tenant scope applied to every similarity search. Using a struct
/// rather than an optional filter map makes an unscoped query unrepresentable.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    /// Authenticated caller.
    pub user_id: String,
    /// Session the caller owns.
    pub session_id: String,
}

/// Vector collection operations used by the pipeline.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persists a batch of embedding records as one logical insert.
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<()>;

    /// Similarity search restricted to the filter's user and session.
    ///
    /// Ordering among equal-similarity results follows the backend's native
    /// ordering: consistent within one query, not globally ordered across
    /// calls (providers may return approximate nearest neighbors).
    async fn query(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>>;
}

/// Record collections for users, sessions, documents, and messages.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Inserts a user record.
    async fn create_user(&self, user: &UserRecord) -> Result<()>;

    /// Looks up a user by login email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Inserts a session record.
    async fn create_session(&self, session: &SessionRecord) -> Result<()>;

    /// Lists sessions owned by the user.
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>>;

    /// Fetches a session only when it is owned by the user.
    async fn find_session(&self, session_id: &str, user_id: &str)
        -> Result<Option<SessionRecord>>;

    /// Inserts a document metadata record.
    async fn create_document(&self, document: &DocumentRecord) -> Result<()>;

    /// Appends a conversation message.
    async fn create_message(&self, message: &MessageRecord) -> Result<()>;

    /// Lists a session's messages, oldest first, scoped to the owner.
    async fn list_messages(&self, session_id: &str, user_id: &str) -> Result<Vec<MessageRecord>>;
}
