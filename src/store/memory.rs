//! In-memory storage backends.
//!
//! Back dev mode when no managed database is configured, and the test suite.
//! Cosine similarity stands in for the managed vector search.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{
    DocumentRecord, EmbeddingRecord, MessageRecord, ScoredRecord, SessionRecord, UserRecord,
};
use crate::store::{DataStore, SearchFilter, VectorStore};

/// In-memory record collections.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<Vec<UserRecord>>,
    sessions: RwLock<Vec<SessionRecord>>,
    documents: RwLock<Vec<DocumentRecord>>,
    messages: RwLock<Vec<MessageRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Document records currently held; used by tests to check the
    /// embeddings-before-document ordering.
    pub async fn documents(&self) -> Vec<DocumentRecord> {
        self.documents.read().await.clone()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn create_user(&self, user: &UserRecord) -> Result<()> {
        self.users.write().await.push(user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn create_session(&self, session: &SessionRecord) -> Result<()> {
        self.sessions.write().await.push(session.clone());
        Ok(())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<SessionRecord>> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .find(|session| session.session_id == session_id && session.user_id == user_id)
            .cloned())
    }

    async fn create_document(&self, document: &DocumentRecord) -> Result<()> {
        self.documents.write().await.push(document.clone());
        Ok(())
    }

    async fn create_message(&self, message: &MessageRecord) -> Result<()> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, session_id: &str, user_id: &str) -> Result<Vec<MessageRecord>> {
        let mut messages: Vec<MessageRecord> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|message| message.session_id == session_id && message.user_id == user_id)
            .cloned()
            .collect();
        messages.sort_by_key(|message| message.created_at);
        Ok(messages)
    }
}

/// In-memory vector collection with cosine-similarity search.
#[derive(Default)]
pub struct MemoryVectorStore {
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl MemoryVectorStore {
    /// Creates an empty vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records; used by tests to check metadata propagation.
    pub async fn records(&self) -> Vec<EmbeddingRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<()> {
        self.records.write().await.extend_from_slice(records);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let mut scored: Vec<ScoredRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|record| {
                record.metadata.user_id == filter.user_id
                    && record.metadata.session_id == filter.session_id
            })
            .map(|record| ScoredRecord {
                similarity: Some(cosine(vector, &record.embedding)),
                record: record.clone(),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, ChunkSource};

    fn record(user: &str, session: &str, content: &str, embedding: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: crate::models::new_id(),
            content: content.to_string(),
            embedding,
            metadata: ChunkMetadata {
                user_id: user.to_string(),
                session_id: session.to_string(),
                document_id: "d-1".to_string(),
                source: ChunkSource::PdfText,
                page: 1,
                file_name: "a.pdf".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn query_is_scoped_to_user_and_session() {
        let store = MemoryVectorStore::new();
        store
            .upsert(&[
                record("u-a", "s-1", "alpha", vec![1.0, 0.0]),
                record("u-b", "s-2", "beta", vec![1.0, 0.0]),
            ])
            .await
            .expect("upsert");

        let hits = store
            .query(
                &[1.0, 0.0],
                &SearchFilter {
                    user_id: "u-a".to_string(),
                    session_id: "s-1".to_string(),
                },
                5,
            )
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.metadata.user_id, "u-a");
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let store = MemoryVectorStore::new();
        store
            .upsert(&[
                record("u", "s", "close", vec![1.0, 0.1]),
                record("u", "s", "far", vec![0.0, 1.0]),
            ])
            .await
            .expect("upsert");

        let filter = SearchFilter {
            user_id: "u".to_string(),
            session_id: "s".to_string(),
        };
        let hits = store.query(&[1.0, 0.0], &filter, 1).await.expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.content, "close");
    }
}
