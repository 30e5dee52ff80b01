//! Astra Data API client.
//!
//! Speaks the JSON document API: one POST per command against a collection
//! URL, authenticated with an application token. Embedding records live in a
//! vector-enabled collection and are searched with a `$vector` sort; all other
//! records are plain documents.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::models::{
    DocumentRecord, EmbeddingRecord, MessageRecord, ScoredRecord, SessionRecord, UserRecord,
};
use crate::store::{DataStore, SearchFilter, VectorStore};

/// Collection names used by the service.
#[derive(Debug, Clone)]
pub struct AstraCollections {
    /// User records.
    pub users: String,
    /// Session records.
    pub sessions: String,
    /// Document metadata records.
    pub documents: String,
    /// Vector-enabled embedding records.
    pub embeddings: String,
    /// Conversation messages.
    pub messages: String,
}

/// Async client for the Astra Data API.
pub struct AstraClient {
    client: reqwest::Client,
    keyspace_url: String,
    collections: AstraCollections,
    max_retries: usize,
}

impl AstraClient {
    /// Builds a client for one keyspace.
    pub fn new(
        endpoint: String,
        token: String,
        keyspace: String,
        collections: AstraCollections,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "Astra endpoint must be an http(s) URL"
        );
        anyhow::ensure!(!token.trim().is_empty(), "missing Astra application token");
        anyhow::ensure!(!keyspace.trim().is_empty(), "keyspace name is required");
        let mut headers = HeaderMap::new();
        headers.insert(
            "Token",
            HeaderValue::from_str(token.trim()).context("invalid Astra application token")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Astra HTTP client")?;
        let keyspace_url = format!(
            "{}/api/json/v1/{}",
            endpoint.trim_end_matches('/'),
            keyspace.trim()
        );
        Ok(Self {
            client,
            keyspace_url,
            collections,
            max_retries: max_retries.max(1),
        })
    }

    /// Creates the collections if they do not exist. The embeddings collection
    /// is vector-enabled with the given dimension.
    pub async fn ensure_collections(&self, dimension: usize) -> Result<()> {
        anyhow::ensure!(dimension > 0, "embedding dimension must be positive");
        let plain = [
            &self.collections.users,
            &self.collections.sessions,
            &self.collections.documents,
            &self.collections.messages,
        ];
        for name in plain {
            self.create_collection(json!({ "name": name })).await?;
        }
        self.create_collection(json!({
            "name": self.collections.embeddings,
            "options": {
                "vector": { "dimension": dimension, "metric": "dot_product" }
            }
        }))
        .await?;
        Ok(())
    }

    async fn create_collection(&self, spec: Value) -> Result<()> {
        let response = self
            .post_with_retry(&self.keyspace_url, &json!({ "createCollection": spec }))
            .await?;
        if let Some(message) = first_error(&response) {
            if message.to_lowercase().contains("exist") {
                return Ok(());
            }
            bail!("createCollection failed: {message}");
        }
        Ok(())
    }

    async fn command(&self, collection: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}", self.keyspace_url, collection);
        let response = self.post_with_retry(&url, &body).await?;
        if let Some(message) = first_error(&response) {
            bail!("Astra command against {collection} failed: {message}");
        }
        Ok(response)
    }

    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<Value> {
        let mut attempt = 0usize;
        loop {
            let response = self.client.post(url).json(body).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<Value>()
                            .await
                            .context("failed to parse Astra response");
                    }
                    let text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    bail!("Astra request failed ({}): {}", status, text);
                }
                Err(err) => {
                    if (err.is_timeout() || err.is_connect() || err.is_request())
                        && attempt + 1 < self.max_retries
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

    async fn insert_one<T: serde::Serialize>(&self, collection: &str, record: &T) -> Result<()> {
        let document = serde_json::to_value(record)?;
        self.command(collection, json!({ "insertOne": { "document": document } }))
            .await?;
        Ok(())
    }

    async fn find_docs(&self, collection: &str, find: Value) -> Result<Vec<Value>> {
        let response = self.command(collection, json!({ "find": find })).await?;
        let docs = response
            .pointer("/data/documents")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(docs)
    }
}

fn first_error(response: &Value) -> Option<String> {
    response
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .map(|err| {
            err.get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string()
        })
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

fn parse_docs<T: serde::de::DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>> {
    docs.into_iter()
        .map(|doc| serde_json::from_value(doc).context("unexpected document shape"))
        .collect()
}

#[async_trait]
impl DataStore for AstraClient {
    async fn create_user(&self, user: &UserRecord) -> Result<()> {
        self.insert_one(&self.collections.users, user).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let docs = self
            .find_docs(
                &self.collections.users,
                json!({ "filter": { "email": email }, "options": { "limit": 1 } }),
            )
            .await?;
        Ok(parse_docs(docs)?.into_iter().next())
    }

    async fn create_session(&self, session: &SessionRecord) -> Result<()> {
        self.insert_one(&self.collections.sessions, session).await
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        let docs = self
            .find_docs(
                &self.collections.sessions,
                json!({ "filter": { "userId": user_id } }),
            )
            .await?;
        parse_docs(docs)
    }

    async fn find_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<SessionRecord>> {
        let docs = self
            .find_docs(
                &self.collections.sessions,
                json!({
                    "filter": { "sessionId": session_id, "userId": user_id },
                    "options": { "limit": 1 }
                }),
            )
            .await?;
        Ok(parse_docs(docs)?.into_iter().next())
    }

    async fn create_document(&self, document: &DocumentRecord) -> Result<()> {
        self.insert_one(&self.collections.documents, document).await
    }

    async fn create_message(&self, message: &MessageRecord) -> Result<()> {
        self.insert_one(&self.collections.messages, message).await
    }

    async fn list_messages(&self, session_id: &str, user_id: &str) -> Result<Vec<MessageRecord>> {
        let docs = self
            .find_docs(
                &self.collections.messages,
                json!({
                    "filter": { "sessionId": session_id, "userId": user_id },
                    "sort": { "createdAt": 1 }
                }),
            )
            .await?;
        parse_docs(docs)
    }
}

#[async_trait]
impl VectorStore for AstraClient {
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let documents: Vec<Value> = records
            .iter()
            .map(|record| {
                json!({
                    "_id": &record.id,
                    "content": &record.content,
                    "metadata": &record.metadata,
                    "$vector": &record.embedding,
                })
            })
            .collect();
        self.command(
            &self.collections.embeddings,
            json!({ "insertMany": { "documents": documents, "options": { "ordered": false } } }),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let docs = self
            .find_docs(
                &self.collections.embeddings,
                json!({
                    "filter": {
                        "$and": [
                            { "metadata.userId": &filter.user_id },
                            { "metadata.sessionId": &filter.session_id }
                        ]
                    },
                    "sort": { "$vector": vector },
                    "options": { "limit": top_k, "includeSimilarity": true }
                }),
            )
            .await?;
        docs.into_iter()
            .map(|doc| {
                let id = doc
                    .get("_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("embedding document missing _id"))?
                    .to_string();
                let content = doc
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let metadata = serde_json::from_value(
                    doc.get("metadata").cloned().unwrap_or(Value::Null),
                )
                .context("embedding document has malformed metadata")?;
                let embedding = doc
                    .get("$vector")
                    .and_then(Value::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(Value::as_f64)
                            .map(|v| v as f32)
                            .collect()
                    })
                    .unwrap_or_default();
                let similarity = doc
                    .get("$similarity")
                    .and_then(Value::as_f64)
                    .map(|v| v as f32);
                Ok(ScoredRecord {
                    record: EmbeddingRecord {
                        id,
                        content,
                        embedding,
                        metadata,
                    },
                    similarity,
                })
            })
            .collect()
    }
}
