//! End-to-end pipeline tests over the in-memory store with fake
//! embedding and completion collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use textbook_tutor::config::RetrievalConfig;
use textbook_tutor::embedding::EmbeddingProvider;
use textbook_tutor::error::QueryError;
use textbook_tutor::generate::CompletionClient;
use textbook_tutor::models::{Document, Passage, QueryRequest};
use textbook_tutor::query::QueryOrchestrator;
use textbook_tutor::store::memory::InMemoryStore;

// ============ Fakes ============

/// Returns a fixed vector and counts how often it was asked.
struct FakeEmbeddings {
    vector: Vec<f32>,
    calls: AtomicUsize,
}

impl FakeEmbeddings {
    fn new(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddings {
    fn model_name(&self) -> &str {
        "fake-embeddings"
    }

    fn dims(&self) -> usize {
        self.vector.len()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }
}

/// Always fails, for testing fatal embedding errors.
struct BrokenEmbeddings;

#[async_trait]
impl EmbeddingProvider for BrokenEmbeddings {
    fn model_name(&self) -> &str {
        "broken"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, QueryError> {
        Err(QueryError::EmbeddingUnavailable(anyhow::anyhow!(
            "quota exceeded"
        )))
    }
}

/// Returns a canned answer and records the prompts it was given.
struct FakeCompletion {
    reply: String,
    calls: AtomicUsize,
    last_user_prompt: Mutex<Option<String>>,
}

impl FakeCompletion {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            last_user_prompt: Mutex::new(None),
        })
    }
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_user_prompt.lock().unwrap() = Some(user_prompt.to_string());
        Ok(self.reply.clone())
    }
}

// ============ Fixtures ============

const QUERY_VEC: [f32; 3] = [1.0, 0.0, 0.0];

/// Unit vector whose cosine similarity to `QUERY_VEC` is exactly `sim`,
/// so its distance is `1 - sim`.
fn vec_with_similarity(sim: f32) -> Vec<f32> {
    vec![sim, (1.0 - sim * sim).sqrt(), 0.0]
}

fn passage(id: i64, document_id: i64, page: i64, content: &str, sim: f32) -> Passage {
    Passage {
        id,
        document_id,
        content: content.to_string(),
        page_number: page,
        chunk_index: id,
        embedding: vec_with_similarity(sim),
        created_at: Utc::now(),
    }
}

/// Document 7, owned by user 3, processed, with three passages at
/// distances 0.12, 0.48, and 0.61 from the query vector.
fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.insert_document(Document {
        id: 7,
        owner_id: 3,
        title: "Thermodynamics".to_string(),
        processed: true,
    });
    store.insert_passage(passage(1, 7, 12, "Heat flows from hot to cold.", 0.88));
    store.insert_passage(passage(2, 7, 30, "Entropy never decreases.", 0.52));
    store.insert_passage(passage(3, 7, 55, "Carnot engines are ideal.", 0.39));
    store
}

fn orchestrator(
    store: Arc<InMemoryStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionClient>,
) -> QueryOrchestrator {
    QueryOrchestrator::new(store, embeddings, completion, RetrievalConfig::default())
}

fn request(question: &str, document_id: i64, top_k: Option<i64>) -> QueryRequest {
    QueryRequest {
        question: question.to_string(),
        document_id,
        top_k,
    }
}

// ============ Validation ordering ============

#[tokio::test]
async fn non_owner_is_denied_before_any_upstream_call() {
    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("unused");
    let orch = orchestrator(seeded_store(), embeddings.clone(), completion.clone());

    let err = orch
        .query(&request("What is entropy?", 7, None), 5)
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::PermissionDenied(7)));
    assert_eq!(embeddings.calls.load(Ordering::SeqCst), 0);
    assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unprocessed_document_is_rejected_before_any_upstream_call() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_document(Document {
        id: 9,
        owner_id: 3,
        title: "Draft Notes".to_string(),
        processed: false,
    });

    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("unused");
    let orch = orchestrator(store, embeddings.clone(), completion.clone());

    let err = orch
        .query(&request("Anything?", 9, None), 3)
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::NotReady(9)));
    assert_eq!(embeddings.calls.load(Ordering::SeqCst), 0);
    assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_document_is_not_found() {
    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("unused");
    let orch = orchestrator(seeded_store(), embeddings, completion);

    let err = orch
        .query(&request("What is entropy?", 404, None), 3)
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::NotFound(404)));
}

#[tokio::test]
async fn non_positive_top_k_is_rejected() {
    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("unused");
    let orch = orchestrator(seeded_store(), embeddings, completion);

    for k in [0, -3] {
        let err = orch
            .query(&request("What is entropy?", 7, Some(k)), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)), "k = {}", k);
    }
}

#[tokio::test]
async fn blank_question_is_rejected() {
    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("unused");
    let orch = orchestrator(seeded_store(), embeddings.clone(), completion);

    let err = orch.query(&request("   ", 7, None), 3).await.unwrap_err();

    assert!(matches!(err, QueryError::InvalidArgument(_)));
    assert_eq!(embeddings.calls.load(Ordering::SeqCst), 0);
}

// ============ Pipeline behavior ============

#[tokio::test]
async fn relevance_filter_keeps_only_passages_below_threshold() {
    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("Heat moves spontaneously toward colder bodies.");
    let orch = orchestrator(seeded_store(), embeddings, completion);

    let response = orch
        .query(&request("Why does heat flow?", 7, None), 3)
        .await
        .unwrap();

    // Distances 0.12 and 0.48 pass the 0.5 threshold; 0.61 is dropped.
    assert_eq!(response.sources.len(), 2);
    assert_eq!(response.sources[0].page_number, 12);
    assert_eq!(response.sources[1].page_number, 30);
    assert!((response.sources[0].similarity - 0.88).abs() < 1e-3);
    assert!((response.sources[1].similarity - 0.52).abs() < 1e-3);
    assert_eq!(response.question, "Why does heat flow?");
    assert!(response.time_taken_ms >= 0.0);
}

#[tokio::test]
async fn every_surviving_source_has_similarity_above_half() {
    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("answer");
    let orch = orchestrator(seeded_store(), embeddings, completion);

    let response = orch
        .query(&request("What is entropy?", 7, None), 3)
        .await
        .unwrap();

    for source in &response.sources {
        assert!(source.similarity > 0.5, "similarity {}", source.similarity);
    }
}

#[tokio::test]
async fn empty_passage_collection_still_generates_an_answer() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_document(Document {
        id: 9,
        owner_id: 5,
        title: "Blank Book".to_string(),
        processed: true,
    });

    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("This topic isn't covered in this textbook.");
    let orch = orchestrator(store, embeddings, completion.clone());

    let response = orch
        .query(&request("What is quantum gravity?", 9, None), 5)
        .await
        .unwrap();

    assert!(response.sources.is_empty());
    assert!(!response.answer.is_empty());
    assert_eq!(completion.calls.load(Ordering::SeqCst), 1);

    // The model still received the question, with no context block.
    let prompt = completion.last_user_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("What is quantum gravity?"));
}

#[tokio::test]
async fn context_block_reaches_the_completion_service() {
    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("answer");
    let orch = orchestrator(seeded_store(), embeddings, completion.clone());

    orch.query(&request("Why does heat flow?", 7, None), 3)
        .await
        .unwrap();

    let prompt = completion.last_user_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("[Page 12]"));
    assert!(prompt.contains("Heat flows from hot to cold."));
    // Below-threshold passages still participate in generation.
    assert!(prompt.contains("[Page 55]"));
}

#[tokio::test]
async fn top_k_caps_retrieval() {
    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("answer");
    let orch = orchestrator(seeded_store(), embeddings, completion.clone());

    let response = orch
        .query(&request("Why does heat flow?", 7, Some(1)), 3)
        .await
        .unwrap();

    // Only the nearest passage was retrieved, so only it can be cited.
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].page_number, 12);

    let prompt = completion.last_user_prompt.lock().unwrap().clone().unwrap();
    assert!(!prompt.contains("[Page 30]"));
}

#[tokio::test]
async fn default_top_k_applies_when_unspecified() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_document(Document {
        id: 7,
        owner_id: 3,
        title: "Thermodynamics".to_string(),
        processed: true,
    });
    // Seven near-identical passages; the default k of 5 bounds retrieval.
    for i in 0..7 {
        store.insert_passage(passage(i, 7, 100 + i, "State function.", 0.9));
    }

    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("answer");
    let orch = orchestrator(store, embeddings, completion);

    let response = orch
        .query(&request("What is a state function?", 7, None), 3)
        .await
        .unwrap();

    assert_eq!(response.sources.len(), 5);
}

#[tokio::test]
async fn long_passage_content_is_truncated_in_citations() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_document(Document {
        id: 7,
        owner_id: 3,
        title: "Thermodynamics".to_string(),
        processed: true,
    });
    let long_content = "t".repeat(250);
    store.insert_passage(passage(1, 7, 12, &long_content, 0.9));

    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("answer");
    let orch = orchestrator(store, embeddings, completion.clone());

    let response = orch
        .query(&request("What is heat?", 7, None), 3)
        .await
        .unwrap();

    let cited = &response.sources[0].content;
    assert_eq!(cited.chars().count(), 203);
    assert!(cited.ends_with("..."));
    assert_eq!(&cited[..200], &long_content[..200]);

    // The generation context got the full text, not the preview.
    let prompt = completion.last_user_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains(&long_content));
}

#[tokio::test]
async fn short_passage_content_is_cited_unmodified() {
    let embeddings = FakeEmbeddings::new(QUERY_VEC.to_vec());
    let completion = FakeCompletion::new("answer");
    let orch = orchestrator(seeded_store(), embeddings, completion);

    let response = orch
        .query(&request("Why does heat flow?", 7, None), 3)
        .await
        .unwrap();

    assert_eq!(response.sources[0].content, "Heat flows from hot to cold.");
}

// ============ Failure propagation ============

#[tokio::test]
async fn embedding_failure_is_fatal_and_generation_never_runs() {
    let completion = FakeCompletion::new("unused");
    let orch = orchestrator(seeded_store(), Arc::new(BrokenEmbeddings), completion.clone());

    let err = orch
        .query(&request("What is entropy?", 7, None), 3)
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::EmbeddingUnavailable(_)));
    assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
}
