//! OpenAI-compatible embedding and chat-completion clients.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::{Captioner, ChatModel, ChatTurn, Embedder};

const CAPTION_PROMPT: &str = "Describe this image briefly and factually in 2-4 lines. \
Focus on the main visual elements, objects, text, charts, diagrams, or any important \
content that would be useful for document search and retrieval.";

fn build_client(api_key: &str, timeout: Duration) -> Result<reqwest::Client> {
    anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .context("failed to build OpenAI HTTP client")
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

async fn post_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    endpoint: &str,
    body: &Value,
    max_retries: usize,
    what: &str,
) -> Result<T> {
    let mut attempt = 0usize;
    loop {
        let response = client.post(endpoint).json(body).send().await;
        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return resp
                        .json::<T>()
                        .await
                        .with_context(|| format!("failed to parse {what} response"));
                }
                let text = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if should_retry(status) && attempt + 1 < max_retries {
                    attempt += 1;
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                bail!("{what} request failed ({}): {}", status, text);
            }
            Err(err) => {
                if (err.is_timeout() || err.is_connect() || err.is_request())
                    && attempt + 1 < max_retries
                {
                    attempt += 1;
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                return Err(err.into());
            }
        }
    }
}

/// Async embeddings client for OpenAI-compatible endpoints.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Builds a new embeddings client.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        max_retries: usize,
        batch_size: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        Ok(Self {
            client: build_client(api_key, timeout)?,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
            max_retries: max_retries.max(1),
            batch_size: batch_size.max(1),
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        anyhow::ensure!(
            inputs.len() <= self.batch_size,
            "batch of {} exceeds configured max {}",
            inputs.len(),
            self.batch_size
        );
        let mut body = json!({
            "model": self.model,
            "input": inputs,
            "encoding_format": "float",
        });
        if let Some(dimensions) = self.dimensions {
            body["dimensions"] = json!(dimensions);
        }
        let mut parsed: EmbeddingResponse = post_json(
            &self.client,
            &self.endpoint,
            &body,
            self.max_retries,
            "embedding",
        )
        .await?;
        parsed.data.sort_by_key(|entry| entry.index);
        anyhow::ensure!(
            parsed.data.len() == inputs.len(),
            "provider returned {} embeddings for {} inputs",
            parsed.data.len(),
            inputs.len()
        );
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

/// Chat-completion client used for both image captions and grounded answers.
pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_retries: usize,
    caption_max_tokens: usize,
    answer_max_tokens: usize,
}

impl OpenAiChat {
    /// Builds a new chat client.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        timeout: Duration,
        max_retries: usize,
        caption_max_tokens: usize,
        answer_max_tokens: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing chat model name");
        Ok(Self {
            client: build_client(api_key, timeout)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
            max_retries: max_retries.max(1),
            caption_max_tokens: caption_max_tokens.max(1),
            answer_max_tokens: answer_max_tokens.max(1),
        })
    }

    async fn completion(&self, messages: Value, max_tokens: usize) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": 0.1,
        });
        let parsed: ChatResponse = post_json(
            &self.client,
            &self.endpoint,
            &body,
            self.max_retries,
            "chat completion",
        )
        .await?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no choices"))?;
        Ok(answer.trim().to_string())
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

#[async_trait]
impl Captioner for OpenAiChat {
    async fn caption(&self, image: &[u8], mime: &str) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let messages = json!([{
            "role": "user",
            "content": [
                { "type": "text", "text": CAPTION_PROMPT },
                {
                    "type": "image_url",
                    "image_url": { "url": format!("data:{mime};base64,{encoded}") }
                }
            ]
        }]);
        self.completion(messages, self.caption_max_tokens).await
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
        let messages: Vec<WireMessage<'_>> = turns
            .iter()
            .map(|turn| WireMessage {
                role: turn.role.as_str(),
                content: &turn.content,
            })
            .collect();
        self.completion(serde_json::to_value(messages)?, self.answer_max_tokens)
            .await
    }
}
