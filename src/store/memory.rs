//! In-memory [`Store`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Search is the same brute-force cosine ranking the SQLite store uses.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::QueryError;
use crate::models::{Document, Passage, RankedPassage};

use super::{rank_by_distance, Store};

/// In-memory store, seeded directly by tests.
pub struct InMemoryStore {
    docs: RwLock<HashMap<i64, Document>>,
    passages: RwLock<Vec<Passage>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            passages: RwLock::new(Vec::new()),
        }
    }

    pub fn insert_document(&self, doc: Document) {
        self.docs.write().unwrap().insert(doc.id, doc);
    }

    pub fn insert_passage(&self, passage: Passage) {
        self.passages.write().unwrap().push(passage);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_document(&self, id: i64) -> Result<Option<Document>, QueryError> {
        Ok(self.docs.read().unwrap().get(&id).cloned())
    }

    async fn nearest_passages(
        &self,
        document_id: i64,
        query_vec: &[f32],
        k: i64,
    ) -> Result<Vec<RankedPassage>, QueryError> {
        let passages: Vec<Passage> = self
            .passages
            .read()
            .unwrap()
            .iter()
            .filter(|p| p.document_id == document_id)
            .cloned()
            .collect();

        rank_by_distance(passages, query_vec, k)
    }
}
