//! Object storage for uploaded PDF binaries.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};

/// Stores uploaded PDFs under tenant-scoped keys.
pub struct PdfObjectStore {
    store: Arc<dyn ObjectStore>,
}

impl PdfObjectStore {
    /// S3-backed store for production.
    pub fn s3(
        bucket: &str,
        region: &str,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<Self> {
        anyhow::ensure!(!bucket.trim().is_empty(), "bucket name is required");
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket.trim())
            .with_region(region.trim());
        if !access_key_id.trim().is_empty() {
            builder = builder
                .with_access_key_id(access_key_id.trim())
                .with_secret_access_key(secret_access_key.trim());
        }
        let store = builder.build().context("failed to build S3 object store")?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// In-memory store for dev mode and tests.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
        }
    }

    /// Key layout: `{userId}/{sessionId}/{documentId}.pdf`.
    pub fn object_key(user_id: &str, session_id: &str, document_id: &str) -> String {
        format!("{user_id}/{session_id}/{document_id}.pdf")
    }

    /// Uploads a PDF binary.
    pub async fn put_pdf(&self, key: &str, bytes: Bytes) -> Result<()> {
        self.store
            .put(&ObjectPath::from(key), PutPayload::from(bytes))
            .await
            .with_context(|| format!("failed to store object {key}"))?;
        Ok(())
    }

    /// Fetches a previously stored PDF binary.
    pub async fn get_pdf(&self, key: &str) -> Result<Bytes> {
        let result = self
            .store
            .get(&ObjectPath::from(key))
            .await
            .with_context(|| format!("failed to fetch object {key}"))?;
        result
            .bytes()
            .await
            .with_context(|| format!("failed to read object {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = PdfObjectStore::in_memory();
        let key = PdfObjectStore::object_key("u-1", "s-1", "d-1");
        store
            .put_pdf(&key, Bytes::from_static(b"%PDF-1.5 fake"))
            .await
            .expect("put");
        let bytes = store.get_pdf(&key).await.expect("get");
        assert_eq!(&bytes[..], b"%PDF-1.5 fake");
    }
}
