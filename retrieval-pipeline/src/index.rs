use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::scoring::cosine_similarity;

/// One embedded chunk of a document, positioned by its order in the
/// extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A scored retrieval hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub index: usize,
    pub text: String,
    pub score: f32,
}

/// In-memory vector index keyed by document id. Inserting a document
/// atomically replaces any previous chunks for that id; readers either see
/// the old set or the new set, never a mix.
#[derive(Default)]
pub struct VectorIndex {
    documents: RwLock<HashMap<String, Arc<Vec<IndexedChunk>>>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the chunks for `document_id`, replacing any existing entry.
    pub fn insert(&self, document_id: &str, chunks: Vec<IndexedChunk>) {
        let entry = Arc::new(chunks);
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        documents.insert(document_id.to_owned(), entry);
    }

    /// The `top_k` chunks of `document_id` most similar to `query`, scored
    /// by cosine similarity, best first. Ties break on chunk position so
    /// results are deterministic. Unknown documents yield an empty list.
    pub fn query(&self, document_id: &str, query: &[f32], top_k: usize) -> Vec<ScoredChunk> {
        let chunks = {
            let documents = self
                .documents
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match documents.get(document_id) {
                Some(entry) => Arc::clone(entry),
                None => return Vec::new(),
            }
        };

        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .map(|chunk| ScoredChunk {
                index: chunk.index,
                text: chunk.text.clone(),
                score: cosine_similarity(query, &chunk.embedding),
            })
            .collect();

        scored.sort_unstable_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.index.cmp(&b.index))
        });
        scored.truncate(top_k);
        scored
    }

    pub fn remove(&self, document_id: &str) -> bool {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        documents.remove(document_id).is_some()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(document_id)
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
