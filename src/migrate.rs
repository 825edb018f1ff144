use anyhow::Result;
use sqlx::SqlitePool;

/// Create the `documents` and `passages` tables if they do not exist.
///
/// The ingestion subsystem owns these tables and normally creates them;
/// running the migrations here keeps `tutor init` self-sufficient for
/// local development and tests. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embeddings are little-endian f32 BLOBs; every row carries the same
    // dimensionality, fixed at ingestion time.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passages (
            id INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            page_number INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_passages_document_id ON passages(document_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner_id ON documents(owner_id)")
        .execute(pool)
        .await?;

    Ok(())
}
