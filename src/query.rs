//! The query pipeline.
//!
//! [`QueryOrchestrator`] coordinates one request through its stages:
//! validate → embed → retrieve → assemble → generate → filter → complete.
//! Each stage needs the previous stage's output, so a single query runs
//! sequentially; concurrency exists only across distinct queries. The
//! orchestrator holds nothing but `Arc` references to its collaborators
//! and no state survives a call, so no locks are needed.
//!
//! Validation runs before any upstream call: a request the caller is not
//! allowed to make never costs an embedding or a search. Any stage
//! failure aborts the request; partial results are never returned.

use std::sync::Arc;
use std::time::Instant;

use sqlx::SqlitePool;

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{EmbeddingProvider, OpenAIEmbeddings};
use crate::error::QueryError;
use crate::generate::{AnswerGenerator, CompletionClient, OpenAIChatClient};
use crate::models::{QueryRequest, QueryResponse, RankedPassage, SourceCitation};
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

/// Stateless coordinator for query requests.
pub struct QueryOrchestrator {
    store: Arc<dyn Store>,
    embeddings: Arc<dyn EmbeddingProvider>,
    generator: AnswerGenerator,
    retrieval: RetrievalConfig,
}

impl QueryOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        embeddings: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionClient>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            generator: AnswerGenerator::new(completion),
            retrieval,
        }
    }

    /// Assemble the production pipeline: SQLite store plus OpenAI
    /// embedding and completion clients, wired from config.
    pub fn from_config(config: &Config, pool: SqlitePool) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStore::new(pool));
        let embeddings = Arc::new(OpenAIEmbeddings::new(&config.embedding)?);
        let completion = Arc::new(OpenAIChatClient::new(&config.generation)?);
        Ok(Self::new(
            store,
            embeddings,
            completion,
            config.retrieval.clone(),
        ))
    }

    /// Run one query on behalf of `user_id`.
    ///
    /// Returns the generated answer plus citations for every retrieved
    /// passage that passed the relevance filter, with wall-clock timing
    /// across the whole pipeline.
    pub async fn query(
        &self,
        req: &QueryRequest,
        user_id: i64,
    ) -> Result<QueryResponse, QueryError> {
        let started = Instant::now();

        // Validate
        if req.question.trim().is_empty() {
            return Err(QueryError::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }

        let top_k = match req.top_k {
            Some(k) if k < 1 => {
                return Err(QueryError::InvalidArgument(format!(
                    "top_k must be positive, got {}",
                    k
                )));
            }
            Some(k) => k,
            None => self.retrieval.default_top_k,
        };

        let document = self
            .store
            .get_document(req.document_id)
            .await?
            .ok_or(QueryError::NotFound(req.document_id))?;

        if document.owner_id != user_id {
            return Err(QueryError::PermissionDenied(document.id));
        }

        if !document.processed {
            return Err(QueryError::NotReady(document.id));
        }

        // Embed
        let query_vec = self.embeddings.embed(&req.question).await?;

        // Retrieve. An empty result set is not an error; the model can
        // still answer from general knowledge or say the topic is uncovered.
        let ranked = self
            .store
            .nearest_passages(document.id, &query_vec, top_k)
            .await?;

        // Assemble
        let context_block = crate::context::assemble_context(&ranked);

        // Generate
        let answer = self
            .generator
            .generate(&req.question, &context_block, &document.title)
            .await?;

        // Filter. Passages at or beyond the threshold were used for
        // generation but are not attributable, so they are dropped from
        // the response entirely.
        let sources = filter_sources(&ranked, &self.retrieval);

        Ok(QueryResponse {
            answer,
            sources,
            question: req.question.clone(),
            time_taken_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

/// Keep passages strictly below the relevance threshold and map them to
/// citations with bounded previews and `similarity = 1 - distance`.
fn filter_sources(ranked: &[RankedPassage], retrieval: &RetrievalConfig) -> Vec<SourceCitation> {
    ranked
        .iter()
        .filter(|r| r.distance < retrieval.relevance_threshold)
        .map(|r| SourceCitation {
            page_number: r.passage.page_number,
            content: truncate_content(&r.passage.content, retrieval.source_preview_chars),
            similarity: 1.0 - r.distance,
        })
        .collect()
}

/// Bound a preview to `max_chars` characters, appending an ellipsis
/// marker when anything was cut. Counts characters, not bytes, so
/// multi-byte content never splits mid-character.
fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut preview: String = content.chars().take(max_chars).collect();
    preview.push_str("...");
    preview
}
