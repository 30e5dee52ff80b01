//! External model clients: embeddings, image captions, grounded chat.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Role;

pub mod openai;

pub use openai::{OpenAiChat, OpenAiEmbedder};

/// One turn handed to the chat model.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Speaker role.
    pub role: Role,
    /// Turn text.
    pub content: String,
}

impl ChatTurn {
    /// Convenience constructor.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Converts text to fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Max inputs accepted per call.
    fn batch_size(&self) -> usize;

    /// Embeds a batch of inputs, one vector per input, in order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Produces a short description of an image.
#[async_trait]
pub trait Captioner: Send + Sync {
    /// Captions one image given its payload and media type.
    async fn caption(&self, image: &[u8], mime: &str) -> Result<String>;
}

/// Produces an answer from a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Completes the conversation with one assistant turn.
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String>;
}
