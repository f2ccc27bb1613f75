//! In-memory vector index with cosine similarity search.
//!
//! Stores photo embeddings and returns every entry above a similarity
//! threshold, best match first.

use std::collections::HashMap;

use crate::semantic::embeddings::similarity;

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Photo ID
    pub id: String,
    /// The embedding vector
    pub embedding: Vec<f32>,
}

/// In-memory vector index for semantic search.
///
/// Entries keep the position of their first insertion, which is the
/// tie-breaker for equal scores.
pub struct VectorIndex {
    entries: Vec<VectorEntry>,
    /// Photo ID -> position in `entries`
    positions: HashMap<String, usize>,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// Search result from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Photo ID
    pub id: String,
    /// Cosine similarity score
    pub score: f32,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            dimensions,
        }
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or overwrite an entry.
    ///
    /// Re-inserting an id replaces its vector in place, the size is unchanged.
    pub fn insert(&mut self, id: &str, embedding: Vec<f32>) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(IndexError::NonFiniteVector);
        }

        match self.positions.get(id) {
            Some(&idx) => self.entries[idx].embedding = embedding,
            None => {
                self.positions.insert(id.to_string(), self.entries.len());
                self.entries.push(VectorEntry {
                    id: id.to_string(),
                    embedding,
                });
            }
        }

        Ok(())
    }

    /// Get an entry by photo ID.
    pub fn get(&self, id: &str) -> Option<&VectorEntry> {
        self.positions.get(id).map(|&idx| &self.entries[idx])
    }

    /// Check if an entry exists for the given ID.
    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Search for similar vectors.
    ///
    /// Returns every entry scoring strictly above `threshold`, sorted by score
    /// (highest first). No limit is applied.
    pub fn search(&self, query: &[f32], threshold: f32) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let score = similarity(query, &entry.embedding);
                if score > threshold {
                    Some(SearchResult {
                        id: entry.id.clone(),
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        // stable: equal scores keep insertion order
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        results
    }

    /// Same as `search()` but returns ids only.
    pub fn ids_above(&self, query: &[f32], threshold: f32) -> Vec<String> {
        self.search(query, threshold)
            .into_iter()
            .map(|r| r.id)
            .collect()
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store a vector with non-finite components")]
    NonFiniteVector,
}
