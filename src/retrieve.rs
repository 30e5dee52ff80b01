//! Query-time retrieval: embed, filtered similarity search, top-K.

use std::sync::Arc;

use crate::error::ApiError;
use crate::llm::Embedder;
use crate::models::ScoredRecord;
use crate::store::{SearchFilter, VectorStore};

/// Embeds a query and runs a tenant-scoped similarity search.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    top_k: usize,
}

impl Retriever {
    /// Wires the retriever to its collaborators.
    pub fn new(embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self {
            embedder,
            vectors,
            top_k: top_k.max(1),
        }
    }

    /// Returns the top-K records most similar to the query, restricted to the
    /// caller's user and session. The filter is mandatory by construction;
    /// there is no unscoped variant.
    pub async fn retrieve(
        &self,
        query: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<ScoredRecord>, ApiError> {
        let query_text = query.to_string();
        let embeddings = self
            .embedder
            .embed_batch(std::slice::from_ref(&query_text))
            .await
            .map_err(ApiError::upstream)?;
        let vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::upstream(anyhow::anyhow!("provider returned no embedding")))?;

        let filter = SearchFilter {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        };
        let hits = self
            .vectors
            .query(&vector, &filter, self.top_k)
            .await
            .map_err(ApiError::upstream)?;
        tracing::debug!(
            session_id,
            hits = hits.len(),
            top_k = self.top_k,
            "retrieved context"
        );
        Ok(hits)
    }
}
