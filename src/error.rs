//! Error taxonomy for the query pipeline.
//!
//! Every stage of the pipeline fails fast with a [`QueryError`] that names
//! the failing stage and carries the upstream cause. The orchestrator
//! never retries internally; retry/backoff belongs to the collaborator
//! clients (the embedding transport retries rate limits, for example) or
//! to an outer caller.
//!
//! The variants split into three groups:
//!
//! - **Client errors**: bad input or a request the caller is not allowed
//!   to make. [`InvalidArgument`](QueryError::InvalidArgument),
//!   [`NotFound`](QueryError::NotFound),
//!   [`PermissionDenied`](QueryError::PermissionDenied),
//!   [`NotReady`](QueryError::NotReady) (retryable later, once ingestion
//!   finishes).
//! - **Upstream failures**: a dependency broke mid-pipeline.
//!   [`EmbeddingUnavailable`](QueryError::EmbeddingUnavailable),
//!   [`SearchUnavailable`](QueryError::SearchUnavailable),
//!   [`GenerationUnavailable`](QueryError::GenerationUnavailable).
//! - **[`Cancelled`](QueryError::Cancelled)**: the caller's own timeout or
//!   cancellation signal aborted the request.
//!
//! No partial query result is ever produced alongside an error.

use thiserror::Error;

/// Failure modes of a single query request.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The caller supplied a malformed request (empty question,
    /// non-positive result count).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No document exists with the requested identifier.
    #[error("document {0} not found")]
    NotFound(i64),

    /// The document exists but belongs to a different user.
    #[error("permission denied: document {0} belongs to another user")]
    PermissionDenied(i64),

    /// The document has been uploaded but ingestion has not marked it
    /// processed yet. The caller may retry later.
    #[error("document {0} has not finished processing")]
    NotReady(i64),

    /// The text-to-vector service failed or returned malformed output.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(anyhow::Error),

    /// The passage store or its similarity search backend failed.
    #[error("similarity search unavailable: {0}")]
    SearchUnavailable(anyhow::Error),

    /// The completion service failed or returned zero completions.
    #[error("answer generation unavailable: {0}")]
    GenerationUnavailable(anyhow::Error),

    /// The caller aborted the request while an external call was in flight.
    #[error("query cancelled by the caller")]
    Cancelled,
}

impl QueryError {
    /// Whether this error was caused by the caller's input rather than an
    /// upstream dependency. Client errors map to 4xx at the HTTP boundary.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidArgument(_)
                | QueryError::NotFound(_)
                | QueryError::PermissionDenied(_)
                | QueryError::NotReady(_)
        )
    }

    /// Machine-readable code for the JSON error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidArgument(_) => "invalid_argument",
            QueryError::NotFound(_) => "not_found",
            QueryError::PermissionDenied(_) => "permission_denied",
            QueryError::NotReady(_) => "not_ready",
            QueryError::EmbeddingUnavailable(_) => "embedding_unavailable",
            QueryError::SearchUnavailable(_) => "search_unavailable",
            QueryError::GenerationUnavailable(_) => "generation_unavailable",
            QueryError::Cancelled => "cancelled",
        }
    }
}
