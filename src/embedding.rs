//! Embedding provider abstraction and the OpenAI implementation.
//!
//! The [`EmbeddingProvider`] trait maps free text to a fixed-length vector.
//! It is the leaf dependency of the pipeline and knows nothing about
//! documents or retrieval. Query vectors must come from the same model and
//! dimensionality that ingestion used, so the provider validates every
//! response against its configured dimensionality and rejects mismatches
//! instead of truncating or padding.
//!
//! Also provides the vector utilities shared with the passage store:
//! - [`cosine_distance`] — `1 - cosine similarity`, the ranking metric
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes for
//!   SQLite BLOB storage
//! - [`blob_to_vec`] — decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! Retries live in this transport, never in the orchestrator:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::anyhow;
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::QueryError;

/// Maps text to a fixed-length numeric vector.
///
/// Callers may cache results externally; the provider itself does not.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// The vector dimensionality every embed call must produce.
    fn dims(&self) -> usize;

    /// Embed a single query text.
    ///
    /// Fails with [`QueryError::EmbeddingUnavailable`] if the upstream
    /// service errors, or if it returns a vector with the wrong
    /// dimensionality or NaN components.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, QueryError>;
}

/// Embedding provider backed by the OpenAI embeddings API.
///
/// Calls `POST /v1/embeddings` with the configured model. The API key is
/// read from `OPENAI_API_KEY` at construction time so a missing key fails
/// at startup rather than on the first query.
pub struct OpenAIEmbeddings {
    model: String,
    dims: usize,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            api_key,
            client,
        })
    }

    async fn request_embedding(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embedding_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(anyhow!("OpenAI API error {}: {}", status, body_text));
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Embedding failed after retries")))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, QueryError> {
        let vector = self
            .request_embedding(text)
            .await
            .map_err(QueryError::EmbeddingUnavailable)?;

        validate_vector(&vector, self.dims).map_err(QueryError::EmbeddingUnavailable)?;

        Ok(vector)
    }
}

/// Extract the first `data[].embedding` array from an embeddings response.
fn parse_embedding_response(json: &serde_json::Value) -> anyhow::Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid embeddings response: missing data[0].embedding"))?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid embeddings response: non-numeric component"))
        })
        .collect()
}

/// Reject vectors that could not have come from the ingestion-time model:
/// wrong dimensionality or NaN components. A silent truncate/pad here
/// would corrupt every distance downstream.
fn validate_vector(vector: &[f32], expected_dims: usize) -> anyhow::Result<()> {
    if vector.len() != expected_dims {
        anyhow::bail!(
            "embedding dimensionality mismatch: got {}, expected {}",
            vector.len(),
            expected_dims
        );
    }
    if vector.iter().any(|v| v.is_nan()) {
        anyhow::bail!("embedding contains NaN components");
    }
    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes — the format ingestion writes into the
/// `passages.embedding` column.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values from
/// the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine distance between two vectors of equal length.
///
/// `0.0` = identical direction, `1.0` = orthogonal, `2.0` = opposite.
/// Zero vectors rank as maximally dissimilar among non-negative
/// similarities (distance `1.0`). Callers are responsible for checking
/// lengths first; mismatched lengths also yield `1.0` rather than a
/// partial dot product.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b) as f64
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
