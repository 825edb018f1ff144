//! Storage abstraction for the query pipeline.
//!
//! The [`Store`] trait covers the two read paths a query needs: document
//! lookup for validation and scoped nearest-passage search. Keeping both
//! behind one trait means the ranking metric and the backend are swappable
//! without touching orchestration logic.
//!
//! Implementations must be `Send + Sync` so queries can run concurrently;
//! the store itself holds no per-query state.

pub mod memory;
pub mod sqlite;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::QueryError;
use crate::models::{Document, Passage, RankedPassage};

/// Read-only view of the document and passage collections.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_document`](Store::get_document) | Load a document for validation |
/// | [`nearest_passages`](Store::nearest_passages) | Rank a document's passages by distance to a query vector |
#[async_trait]
pub trait Store: Send + Sync {
    /// Load a document by identifier. `Ok(None)` means no such document;
    /// a backend failure is [`QueryError::SearchUnavailable`].
    async fn get_document(&self, id: i64) -> Result<Option<Document>, QueryError>;

    /// Return up to `k` passages of `document_id` ranked ascending by
    /// cosine distance to `query_vec`, ties broken by `chunk_index`.
    ///
    /// A document with no passages yields an empty vector, not an error.
    /// The query vector's dimensionality must match the stored vectors';
    /// a mismatch is reported as [`QueryError::SearchUnavailable`] rather
    /// than silently mis-ranking.
    async fn nearest_passages(
        &self,
        document_id: i64,
        query_vec: &[f32],
        k: i64,
    ) -> Result<Vec<RankedPassage>, QueryError>;
}

/// Rank passages ascending by cosine distance to the query vector,
/// breaking ties by `chunk_index`, and keep the `k` nearest.
///
/// Shared by every [`Store`] backend so ordering and tie-breaking stay
/// identical regardless of where the vectors came from.
pub(crate) fn rank_by_distance(
    passages: Vec<Passage>,
    query_vec: &[f32],
    k: i64,
) -> Result<Vec<RankedPassage>, QueryError> {
    let mut ranked = Vec::with_capacity(passages.len());

    for passage in passages {
        if passage.embedding.len() != query_vec.len() {
            return Err(QueryError::SearchUnavailable(anyhow!(
                "stored vector for passage {} has {} dims, query has {}",
                passage.id,
                passage.embedding.len(),
                query_vec.len()
            )));
        }
        let distance = cosine_distance(query_vec, &passage.embedding);
        ranked.push(RankedPassage { passage, distance });
    }

    ranked.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.passage.chunk_index.cmp(&b.passage.chunk_index))
    });
    ranked.truncate(k.max(0) as usize);

    Ok(ranked)
}
