//! Persisted record types shared across pipeline stages and storage backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered account. Created once at registration, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Stable user identifier.
    pub user_id: String,
    /// Unique login email.
    pub email: String,
    /// Bcrypt hash of the password.
    pub password_hash: String,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

/// Chat session owned by one user; scopes documents and messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Stable session identifier.
    pub session_id: String,
    /// Owning user.
    pub user_id: String,
    /// Display name chosen at creation.
    pub name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Metadata record for an uploaded PDF. Written only after the document's
/// embeddings have been persisted, so a visible record implies searchable
/// content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Stable document identifier.
    pub document_id: String,
    /// Owning user.
    pub user_id: String,
    /// Owning session.
    pub session_id: String,
    /// Original upload file name.
    pub file_name: String,
    /// Key of the PDF binary in the object store.
    pub object_key: String,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
    /// Page count reported by the document processor.
    pub pages: u32,
}

/// Origin of an embedded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkSource {
    /// Text window extracted from a PDF page.
    #[serde(rename = "pdf_text")]
    PdfText,
    /// Caption generated for an embedded image.
    #[serde(rename = "image_caption")]
    ImageCaption,
}

impl ChunkSource {
    /// Wire/citation name for this source kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkSource::PdfText => "pdf_text",
            ChunkSource::ImageCaption => "image_caption",
        }
    }
}

/// Ownership and provenance metadata attached to every embedding record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    /// Owning user.
    pub user_id: String,
    /// Owning session.
    pub session_id: String,
    /// Originating document.
    pub document_id: String,
    /// Whether the content came from page text or an image caption.
    pub source: ChunkSource,
    /// 1-based page number the content came from.
    pub page: u32,
    /// Original upload file name, used for citations.
    pub file_name: String,
}

/// One embedded chunk or caption, ready for the vector store. Never mutated
/// after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRecord {
    /// Stable record identifier.
    pub id: String,
    /// Text submitted to the embedding model.
    pub content: String,
    /// Model embedding vector.
    pub embedding: Vec<f32>,
    /// Ownership and provenance.
    pub metadata: ChunkMetadata,
}

/// An embedding record returned from a similarity search.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// The stored record.
    pub record: EmbeddingRecord,
    /// Provider-reported similarity, when available.
    pub similarity: Option<f32>,
}

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user turn.
    User,
    /// Model reply.
    Assistant,
    /// Fixed instruction.
    System,
}

impl Role {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One turn in a session's append-only conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Stable message identifier.
    pub message_id: String,
    /// Owning user.
    pub user_id: String,
    /// Owning session.
    pub session_id: String,
    /// Conversation role.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Append timestamp; list endpoints sort ascending on this.
    pub created_at: DateTime<Utc>,
}

/// Generates a fresh v4 UUID string for record identifiers.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
