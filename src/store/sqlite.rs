//! SQLite-backed [`Store`] over the tables the ingestion subsystem writes.
//!
//! Similarity search loads the scoped document's vectors and computes
//! cosine distance in Rust, the same way ingestion indexed them. Passage
//! counts per document are bounded by textbook size, so a scoped scan
//! stays cheap without a dedicated vector extension.

use anyhow::Error as AnyError;
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{Row, SqlitePool};

use crate::embedding::blob_to_vec;
use crate::error::QueryError;
use crate::models::{Document, Passage, RankedPassage};

use super::{rank_by_distance, Store};

/// Store reading from the shared SQLite database.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_document(&self, id: i64) -> Result<Option<Document>, QueryError> {
        let row = sqlx::query("SELECT id, owner_id, title, processed FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueryError::SearchUnavailable(AnyError::from(e)))?;

        Ok(row.map(|row| Document {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            title: row.get("title"),
            processed: row.get::<i64, _>("processed") != 0,
        }))
    }

    async fn nearest_passages(
        &self,
        document_id: i64,
        query_vec: &[f32],
        k: i64,
    ) -> Result<Vec<RankedPassage>, QueryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, content, page_number, chunk_index, embedding, created_at
            FROM passages
            WHERE document_id = ?
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueryError::SearchUnavailable(AnyError::from(e)))?;

        let passages: Vec<Passage> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let created_ts: i64 = row.get("created_at");
                Passage {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    content: row.get("content"),
                    page_number: row.get("page_number"),
                    chunk_index: row.get("chunk_index"),
                    embedding: blob_to_vec(&blob),
                    created_at: DateTime::from_timestamp(created_ts, 0).unwrap_or_default(),
                }
            })
            .collect();

        rank_by_distance(passages, query_vec, k)
    }
}
