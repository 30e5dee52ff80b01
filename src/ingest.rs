//! Chunk & embed pipeline: turns an uploaded PDF into searchable embedding
//! records, then a visible Document record.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures_util::stream::{self, StreamExt, TryStreamExt};

use crate::chunker::Chunker;
use crate::error::ApiError;
use crate::llm::{Captioner, Embedder};
use crate::models::{new_id, ChunkMetadata, ChunkSource, DocumentRecord, EmbeddingRecord};
use crate::objects::PdfObjectStore;
use crate::pdf::{self, ExtractedDocument};
use crate::store::{DataStore, VectorStore};

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The document metadata record, written after its embeddings.
    pub document: DocumentRecord,
    /// Number of embedding records persisted.
    pub chunks_indexed: usize,
}

struct Candidate {
    content: String,
    source: ChunkSource,
    page: u32,
}

/// Orchestrates extraction, chunking, captioning, embedding, and persistence
/// for one uploaded document.
pub struct IngestPipeline {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    captioner: Arc<dyn Captioner>,
    vectors: Arc<dyn VectorStore>,
    store: Arc<dyn DataStore>,
    objects: Arc<PdfObjectStore>,
    caption_concurrency: usize,
}

impl IngestPipeline {
    /// Wires the pipeline to its collaborators.
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        captioner: Arc<dyn Captioner>,
        vectors: Arc<dyn VectorStore>,
        store: Arc<dyn DataStore>,
        objects: Arc<PdfObjectStore>,
        caption_concurrency: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            captioner,
            vectors,
            store,
            objects,
            caption_concurrency: caption_concurrency.max(1),
        }
    }

    /// Ingests one uploaded PDF for the owning user/session.
    ///
    /// Fail-fast: any caption, embedding, or persistence failure aborts the
    /// whole ingestion. The Document record is written only after every
    /// embedding has been persisted, so a visible document is always fully
    /// searchable.
    pub async fn ingest_upload(
        &self,
        pdf_bytes: Bytes,
        user_id: &str,
        session_id: &str,
        file_name: &str,
    ) -> Result<IngestOutcome, ApiError> {
        let extracted = pdf::extract(&pdf_bytes)
            .map_err(|err| ApiError::DocumentParse(err.to_string()))?;

        let document_id = new_id();
        let object_key = PdfObjectStore::object_key(user_id, session_id, &document_id);
        self.objects
            .put_pdf(&object_key, pdf_bytes)
            .await
            .map_err(ApiError::upstream)?;

        let candidates = self.collect_candidates(&extracted).await?;
        let records = self
            .embed_candidates(candidates, user_id, session_id, &document_id, file_name)
            .await?;

        if !records.is_empty() {
            self.vectors
                .upsert(&records)
                .await
                .map_err(ApiError::upstream)?;
        }

        // Embeddings are committed; only now may the document become visible.
        let document = DocumentRecord {
            document_id,
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            file_name: file_name.to_string(),
            object_key,
            uploaded_at: Utc::now(),
            pages: extracted.pages,
        };
        self.store
            .create_document(&document)
            .await
            .map_err(ApiError::upstream)?;

        tracing::info!(
            document_id = %document.document_id,
            pages = extracted.pages,
            chunks = records.len(),
            "ingested document"
        );
        Ok(IngestOutcome {
            document,
            chunks_indexed: records.len(),
        })
    }

    /// Text windows plus image captions, captions fetched with bounded
    /// fan-out and joined before anything is persisted.
    async fn collect_candidates(
        &self,
        extracted: &ExtractedDocument,
    ) -> Result<Vec<Candidate>, ApiError> {
        let mut candidates = Vec::new();
        for page_text in &extracted.text {
            for window in self.chunker.split(&page_text.text) {
                candidates.push(Candidate {
                    content: window,
                    source: ChunkSource::PdfText,
                    page: page_text.page,
                });
            }
        }

        let captions: Vec<(u32, String)> = stream::iter(extracted.images.iter().cloned())
            .map(|image| {
                let captioner = Arc::clone(&self.captioner);
                async move {
                    captioner
                        .caption(&image.data, image.mime)
                        .await
                        .map(|caption| (image.page, caption))
                }
            })
            .buffered(self.caption_concurrency)
            .try_collect()
            .await
            .map_err(ApiError::upstream)?;

        for (page, caption) in captions {
            if caption.trim().is_empty() {
                continue;
            }
            candidates.push(Candidate {
                content: caption,
                source: ChunkSource::ImageCaption,
                page,
            });
        }
        Ok(candidates)
    }

    /// Embeds candidate texts through the provider's batch API and tags each
    /// record with the owner metadata supplied at upload time.
    async fn embed_candidates(
        &self,
        candidates: Vec<Candidate>,
        user_id: &str,
        session_id: &str,
        document_id: &str,
        file_name: &str,
    ) -> Result<Vec<EmbeddingRecord>, ApiError> {
        let mut records = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(self.embedder.batch_size()) {
            let inputs: Vec<String> = batch
                .iter()
                .map(|candidate| candidate.content.clone())
                .collect();
            let vectors = self
                .embedder
                .embed_batch(&inputs)
                .await
                .map_err(ApiError::upstream)?;
            for (candidate, embedding) in batch.iter().zip(vectors) {
                records.push(EmbeddingRecord {
                    id: new_id(),
                    content: candidate.content.clone(),
                    embedding,
                    metadata: ChunkMetadata {
                        user_id: user_id.to_string(),
                        session_id: session_id.to_string(),
                        document_id: document_id.to_string(),
                        source: candidate.source,
                        page: candidate.page,
                        file_name: file_name.to_string(),
                    },
                });
            }
        }
        Ok(records)
    }
}
