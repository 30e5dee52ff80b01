//! Grounded answer generation and conversation persistence.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::error::ApiError;
use crate::llm::{ChatModel, ChatTurn};
use crate::models::{new_id, ChunkSource, MessageRecord, Role, ScoredRecord};
use crate::store::DataStore;

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions based on \
the provided context from uploaded documents.\n\n\
Instructions:\n\
1. Use only the information provided in the context to answer questions\n\
2. If the context doesn't contain enough information to answer the question, say so clearly\n\
3. When referencing information, mention the source document and page number when possible\n\
4. Be concise but thorough in your responses\n\
5. If the question is not related to the provided context, politely redirect to \
document-related queries\n\n\
Always ground your responses in the provided context and cite your sources.";

/// Citation handed back to the caller alongside the reply.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    /// Originating document.
    pub document_id: String,
    /// Original upload file name.
    pub file_name: String,
    /// 1-based page number.
    pub page: u32,
    /// pdf_text or image_caption.
    pub source: ChunkSource,
}

/// A generated reply plus the deduplicated sources that grounded it.
#[derive(Debug, Clone)]
pub struct RagReply {
    /// Assistant answer text.
    pub reply: String,
    /// Sources cited in prompt order, deduplicated.
    pub sources: Vec<SourceInfo>,
}

/// Assembles the prompt, calls the chat model, and persists the turn.
pub struct Responder {
    chat: Arc<dyn ChatModel>,
    store: Arc<dyn DataStore>,
    history_limit: usize,
}

impl Responder {
    /// Wires the responder to its collaborators. `history_limit` is the
    /// number of most recent persisted messages included as context.
    pub fn new(chat: Arc<dyn ChatModel>, store: Arc<dyn DataStore>, history_limit: usize) -> Self {
        Self {
            chat,
            store,
            history_limit,
        }
    }

    /// Generates a grounded reply and appends the user and assistant turns to
    /// the session log, user turn first.
    ///
    /// Messages are persisted only after generation succeeds: a failed call
    /// leaves the log untouched, so a client retry cannot duplicate the user
    /// message.
    pub async fn respond(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
        retrieved: &[ScoredRecord],
    ) -> Result<RagReply, ApiError> {
        let history = self
            .store
            .list_messages(session_id, user_id)
            .await
            .map_err(ApiError::upstream)?;

        let mut turns = vec![ChatTurn::new(Role::System, SYSTEM_PROMPT)];
        let skip = history.len().saturating_sub(self.history_limit);
        for past in history.into_iter().skip(skip) {
            if matches!(past.role, Role::User | Role::Assistant) {
                turns.push(ChatTurn::new(past.role, past.content));
            }
        }
        turns.push(ChatTurn::new(
            Role::User,
            format!(
                "Context from uploaded documents:\n{}\n\nQuestion: {}",
                render_context(retrieved),
                message
            ),
        ));

        let reply = self
            .chat
            .complete(&turns)
            .await
            .map_err(ApiError::upstream)?;

        let user_turn = MessageRecord {
            message_id: new_id(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            role: Role::User,
            content: message.to_string(),
            created_at: Utc::now(),
        };
        self.store
            .create_message(&user_turn)
            .await
            .map_err(ApiError::upstream)?;
        let assistant_turn = MessageRecord {
            message_id: new_id(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            role: Role::Assistant,
            content: reply.clone(),
            created_at: Utc::now(),
        };
        self.store
            .create_message(&assistant_turn)
            .await
            .map_err(ApiError::upstream)?;

        Ok(RagReply {
            reply,
            sources: extract_sources(retrieved),
        })
    }
}

/// Deterministic numbered context blocks, each with its citation line.
fn render_context(retrieved: &[ScoredRecord]) -> String {
    if retrieved.is_empty() {
        return "No relevant information found in the uploaded documents.".to_string();
    }
    retrieved
        .iter()
        .enumerate()
        .map(|(idx, hit)| {
            let meta = &hit.record.metadata;
            format!(
                "{}. {}\n[Source: {}, Page {}, {}]",
                idx + 1,
                hit.record.content,
                meta.file_name,
                meta.page,
                meta.source.as_str()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Citations deduplicated on (documentId, page, source), prompt order kept.
fn extract_sources(retrieved: &[ScoredRecord]) -> Vec<SourceInfo> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for hit in retrieved {
        let meta = &hit.record.metadata;
        let key = (
            meta.document_id.clone(),
            meta.page,
            meta.source.as_str(),
        );
        if seen.insert(key) {
            sources.push(SourceInfo {
                document_id: meta.document_id.clone(),
                file_name: meta.file_name.clone(),
                page: meta.page,
                source: meta.source,
            });
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, EmbeddingRecord};

    fn hit(document_id: &str, page: u32, source: ChunkSource, content: &str) -> ScoredRecord {
        ScoredRecord {
            record: EmbeddingRecord {
                id: new_id(),
                content: content.to_string(),
                embedding: vec![0.0],
                metadata: ChunkMetadata {
                    user_id: "u".to_string(),
                    session_id: "s".to_string(),
                    document_id: document_id.to_string(),
                    source,
                    page,
                    file_name: "invoice.pdf".to_string(),
                },
            },
            similarity: Some(0.9),
        }
    }

    #[test]
    fn context_includes_citations() {
        let rendered = render_context(&[hit("d-1", 2, ChunkSource::PdfText, "total is 42")]);
        assert!(rendered.contains("1. total is 42"));
        assert!(rendered.contains("[Source: invoice.pdf, Page 2, pdf_text]"));
    }

    #[test]
    fn empty_context_has_fallback_text() {
        assert!(render_context(&[]).contains("No relevant information"));
    }

    #[test]
    fn sources_are_deduplicated() {
        let hits = vec![
            hit("d-1", 2, ChunkSource::PdfText, "a"),
            hit("d-1", 2, ChunkSource::PdfText, "b"),
            hit("d-1", 2, ChunkSource::ImageCaption, "c"),
        ];
        let sources = extract_sources(&hits);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source, ChunkSource::PdfText);
        assert_eq!(sources[1].source, ChunkSource::ImageCaption);
    }
}
