//! End-to-end pipeline tests over the in-memory backends with deterministic
//! fake model clients.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use paperchat::auth;
use paperchat::chunker::Chunker;
use paperchat::ingest::IngestPipeline;
use paperchat::llm::{Captioner, ChatModel, ChatTurn, Embedder};
use paperchat::models::{ChunkSource, Role};
use paperchat::objects::PdfObjectStore;
use paperchat::responder::Responder;
use paperchat::retrieve::Retriever;
use paperchat::store::{DataStore, MemoryStore, MemoryVectorStore};

/// Deterministic bag-of-words embedder: shared tokens produce similar
/// vectors, which is enough for ranking assertions.
struct FakeEmbedder;

const DIMS: usize = 32;

#[async_trait]
impl Embedder for FakeEmbedder {
    fn batch_size(&self) -> usize {
        4
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs
            .iter()
            .map(|input| {
                let mut vector = vec![0.0f32; DIMS];
                for token in input
                    .split(|ch: char| !ch.is_alphanumeric())
                    .filter(|token| !token.is_empty())
                {
                    let mut hasher = DefaultHasher::new();
                    token.to_lowercase().hash(&mut hasher);
                    vector[(hasher.finish() % DIMS as u64) as usize] += 1.0;
                }
                vector
            })
            .collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn batch_size(&self) -> usize {
        4
    }

    async fn embed_batch(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding provider unavailable")
    }
}

struct FakeCaptioner;

#[async_trait]
impl Captioner for FakeCaptioner {
    async fn caption(&self, _image: &[u8], _mime: &str) -> Result<String> {
        Ok("bar chart of quarterly revenue".to_string())
    }
}

struct FakeChat;

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
        let context_len = turns.last().map(|turn| turn.content.len()).unwrap_or(0);
        Ok(format!("grounded answer over {context_len} context bytes"))
    }
}

struct FailingChat;

#[async_trait]
impl ChatModel for FailingChat {
    async fn complete(&self, _turns: &[ChatTurn]) -> Result<String> {
        bail!("generation provider unavailable")
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    vectors: Arc<MemoryVectorStore>,
    pipeline: IngestPipeline,
    retriever: Retriever,
}

fn harness_with_embedder(embedder: Arc<dyn Embedder>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let vectors = Arc::new(MemoryVectorStore::new());
    let pipeline = IngestPipeline::new(
        Chunker::new(200, 40),
        Arc::clone(&embedder),
        Arc::new(FakeCaptioner),
        vectors.clone(),
        store.clone(),
        Arc::new(PdfObjectStore::in_memory()),
        2,
    );
    let retriever = Retriever::new(embedder, vectors.clone(), 5);
    Harness {
        store,
        vectors,
        pipeline,
        retriever,
    }
}

fn harness() -> Harness {
    harness_with_embedder(Arc::new(FakeEmbedder))
}

/// Minimal one-or-more-page PDF with one text line per page.
fn pdf_with_pages(lines: &[&str]) -> Bytes {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids = Vec::new();
    for line in lines {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id =
            doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode")));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("save");
    Bytes::from(buf)
}

/// Single page whose only content is one embedded JPEG image.
fn image_only_pdf() -> Bytes {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9],
    ));
    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im1" => image_id },
    });
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        b"q 10 0 0 10 0 0 cm /Im1 Do Q".to_vec(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("save");
    Bytes::from(buf)
}

#[tokio::test]
async fn ingest_tags_every_record_with_owner_metadata() {
    let harness = harness();
    let pdf = pdf_with_pages(&[
        "the invoice total amount is 42 dollars",
        "payment is due within thirty days of receipt",
    ]);
    let outcome = harness
        .pipeline
        .ingest_upload(pdf, "u-a", "s-1", "invoice.pdf")
        .await
        .expect("ingest");

    assert_eq!(outcome.document.pages, 2);
    let records = harness.vectors.records().await;
    assert_eq!(records.len(), outcome.chunks_indexed);
    assert!(!records.is_empty());
    for record in &records {
        assert_eq!(record.metadata.user_id, "u-a");
        assert_eq!(record.metadata.session_id, "s-1");
        assert_eq!(record.metadata.document_id, outcome.document.document_id);
        assert_eq!(record.metadata.file_name, "invoice.pdf");
        assert_eq!(record.metadata.source, ChunkSource::PdfText);
    }

    let documents = harness.store.documents().await;
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].document_id, outcome.document.document_id);
}

#[tokio::test]
async fn failed_embedding_leaves_no_visible_document() {
    let harness = harness_with_embedder(Arc::new(FailingEmbedder));
    let pdf = pdf_with_pages(&["some text that will fail to embed"]);
    let result = harness
        .pipeline
        .ingest_upload(pdf, "u-a", "s-1", "doomed.pdf")
        .await;
    assert!(result.is_err());
    assert!(harness.store.documents().await.is_empty());
    assert!(harness.vectors.records().await.is_empty());
}

#[tokio::test]
async fn non_pdf_upload_is_rejected_without_persistence() {
    let harness = harness();
    let result = harness
        .pipeline
        .ingest_upload(Bytes::from_static(b"plain text"), "u-a", "s-1", "x.pdf")
        .await;
    assert!(result.is_err());
    assert!(harness.store.documents().await.is_empty());
}

#[tokio::test]
async fn image_only_pdf_yields_caption_records() {
    let harness = harness();
    let outcome = harness
        .pipeline
        .ingest_upload(image_only_pdf(), "u-a", "s-1", "scan.pdf")
        .await
        .expect("ingest");

    assert_eq!(outcome.document.pages, 1);
    let records = harness.vectors.records().await;
    assert!(records
        .iter()
        .all(|record| record.metadata.source == ChunkSource::ImageCaption));
    assert_eq!(records.len(), 1);
    assert!(records[0].content.contains("quarterly revenue"));
}

#[tokio::test]
async fn round_trip_retrieves_verbatim_text() {
    let harness = harness();
    harness
        .pipeline
        .ingest_upload(
            pdf_with_pages(&[
                "the invoice total amount is 42 dollars",
                "bananas are a yellow fruit grown in warm climates",
            ]),
            "u-a",
            "s-1",
            "invoice.pdf",
        )
        .await
        .expect("ingest");

    let hits = harness
        .retriever
        .retrieve("what is the total amount", "u-a", "s-1")
        .await
        .expect("retrieve");
    assert!(!hits.is_empty());
    assert!(hits[0].record.content.contains("total amount is 42"));
}

#[tokio::test]
async fn retrieval_never_crosses_tenants() {
    let harness = harness();
    harness
        .pipeline
        .ingest_upload(
            pdf_with_pages(&["alpha secret quarterly numbers"]),
            "u-a",
            "s-1",
            "a.pdf",
        )
        .await
        .expect("ingest a");
    harness
        .pipeline
        .ingest_upload(
            pdf_with_pages(&["beta meeting notes about quarterly numbers"]),
            "u-b",
            "s-2",
            "b.pdf",
        )
        .await
        .expect("ingest b");

    // B probing A's session id gets nothing.
    let stolen = harness
        .retriever
        .retrieve("quarterly numbers", "u-b", "s-1")
        .await
        .expect("retrieve");
    assert!(stolen.is_empty());

    // B's own session only ever returns B's records.
    let own = harness
        .retriever
        .retrieve("quarterly numbers", "u-b", "s-2")
        .await
        .expect("retrieve");
    assert!(!own.is_empty());
    for hit in &own {
        assert_eq!(hit.record.metadata.user_id, "u-b");
        assert_eq!(hit.record.metadata.session_id, "s-2");
    }
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let store = MemoryStore::new();
    auth::register(&store, "dup@example.com", "a strong password")
        .await
        .expect("first registration");
    let err = auth::register(&store, "dup@example.com", "a strong password")
        .await
        .unwrap_err();
    assert!(matches!(err, paperchat::ApiError::Conflict(_)));
}

#[tokio::test]
async fn failed_generation_persists_no_messages() {
    let store = Arc::new(MemoryStore::new());
    let responder = Responder::new(Arc::new(FailingChat), store.clone(), 10);
    let result = responder.respond("u-a", "s-1", "hello?", &[]).await;
    assert!(result.is_err());
    assert!(store.list_messages("s-1", "u-a").await.expect("list").is_empty());
}

#[tokio::test]
async fn successful_generation_persists_user_then_assistant() {
    let store = Arc::new(MemoryStore::new());
    let responder = Responder::new(Arc::new(FakeChat), store.clone(), 10);
    let reply = responder
        .respond("u-a", "s-1", "what is the total?", &[])
        .await
        .expect("respond");
    assert!(!reply.reply.is_empty());

    let messages = store.list_messages("s-1", "u-a").await.expect("list");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "what is the total?");
    assert_eq!(messages[1].role, Role::Assistant);
}
