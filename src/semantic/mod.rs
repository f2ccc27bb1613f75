//! Semantic search infrastructure for photo embeddings.
//!
//! # Architecture
//!
//! - `embeddings`: Deterministic hash embeddings
//! - `index`: In-memory vector index with cosine similarity search
//! - `external`: Optional external vector database with in-memory fallback
//! - `personalization`: Query history vector that biases searches
//! - `service`: High-level semantic search service

pub mod embeddings;
pub mod external;
mod index;
mod personalization;
mod service;

pub use embeddings::{embed, similarity, Embedder, HashEmbedder};
pub use external::{FallbackIndex, QdrantDb, VectorDb, VectorDbError};
pub use index::{IndexError, SearchResult, VectorIndex};
pub use personalization::PersonalizationTracker;
pub use service::{IndexReport, SemanticSearchService};

/// Length of every embedding vector.
pub const EMBEDDING_DIMENSION: usize = 64;

/// Default similarity threshold for semantic search
pub const DEFAULT_THRESHOLD: f32 = 0.25;
