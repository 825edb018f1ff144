//! Core data models used throughout the query pipeline.
//!
//! [`Document`] and [`Passage`] mirror what the ingestion subsystem writes;
//! this crate only ever reads them. [`RankedPassage`], [`SourceCitation`],
//! and [`QueryResponse`] exist for the duration of a single query and are
//! never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded textbook, as recorded by the ingestion subsystem.
///
/// Queries are only permitted once `processed` is true; until then the
/// passage collection may be incomplete.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub processed: bool,
}

/// A chunk of a document's text, stored with its embedding vector.
///
/// `chunk_index` is unique within a document and gives the passage's
/// position in reading order. All embeddings in the collection share one
/// dimensionality, fixed at ingestion time.
#[derive(Debug, Clone)]
pub struct Passage {
    pub id: i64,
    pub document_id: i64,
    pub content: String,
    pub page_number: i64,
    pub chunk_index: i64,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// A passage paired with its distance to the query vector.
///
/// Distance is non-negative; 0 means identical, larger means less similar.
#[derive(Debug, Clone)]
pub struct RankedPassage {
    pub passage: Passage,
    pub distance: f64,
}

/// A citation surfaced to the caller for one relevant passage.
///
/// `content` is a bounded preview of the passage text and `similarity`
/// is `1 - distance`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCitation {
    pub page_number: i64,
    pub content: String,
    pub similarity: f64,
}

/// A single query request against one document.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    /// The student's free-text question.
    pub question: String,
    /// The document to query, which must belong to the requesting user.
    pub document_id: i64,
    /// How many passages to retrieve. Defaults to
    /// `retrieval.default_top_k` when omitted; an explicit non-positive
    /// value is rejected.
    #[serde(default)]
    pub top_k: Option<i64>,
}

/// The caller-facing result of one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub question: String,
    pub time_taken_ms: f64,
}
