//! External vector database backends.
//!
//! The in-process [`VectorIndex`] always holds every vector. An external
//! database, when configured, mirrors the upserts and answers queries until
//! it fails once, after which the in-process index takes over for the rest
//! of the session.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::{
    config::{AiConfig, VectorDbKind},
    semantic::{
        index::{IndexError, VectorIndex},
        EMBEDDING_DIMENSION,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum VectorDbError {
    #[error("vector db request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vector db returned an unexpected response: {0}")]
    Unexpected(String),
}

pub trait VectorDb: Send + Sync {
    fn upsert(&mut self, id: &str, vector: &[f32]) -> Result<(), VectorDbError>;

    /// Ids scoring strictly above `threshold`, best first.
    fn query(&self, vector: &[f32], threshold: f32) -> Result<Vec<String>, VectorDbError>;

    fn name(&self) -> &'static str;
}

/// Points requested per search call.
const SEARCH_PAGE_SIZE: usize = 64;

/// Stable 64-bit FNV-1a, used to derive numeric point ids.
pub fn fnv1a(input: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    input
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

/// Qdrant over its REST API.
pub struct QdrantDb {
    client: reqwest::blocking::Client,
    base_url: String,
    collection: String,
    dimensions: usize,
    collection_ready: bool,
    known_ids: HashSet<String>,
}

#[derive(Deserialize)]
struct QdrantSearchResponse {
    result: Vec<QdrantScoredPoint>,
}

#[derive(Deserialize)]
struct QdrantScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<QdrantPayload>,
}

#[derive(Deserialize)]
struct QdrantPayload {
    photo_id: String,
}

impl QdrantDb {
    pub fn new(
        base_url: &str,
        collection: &str,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, VectorDbError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.strip_suffix('/').unwrap_or(base_url).to_string(),
            collection: collection.to_string(),
            dimensions,
            collection_ready: false,
            known_ids: HashSet::new(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn ensure_collection(&mut self) -> Result<(), VectorDbError> {
        if self.collection_ready {
            return Ok(());
        }

        let resp = self.client.get(self.collection_url()).send()?;
        if resp.status() == StatusCode::NOT_FOUND {
            log::info!("qdrant: creating collection {:?}", self.collection);
            let resp = self
                .client
                .put(self.collection_url())
                .json(&json!({
                    "vectors": { "size": self.dimensions, "distance": "Cosine" }
                }))
                .send()?;

            if !resp.status().is_success() {
                return Err(VectorDbError::Unexpected(format!(
                    "create collection: {}",
                    resp.status()
                )));
            }
        } else if !resp.status().is_success() {
            return Err(VectorDbError::Unexpected(format!(
                "get collection: {}",
                resp.status()
            )));
        }

        self.collection_ready = true;
        Ok(())
    }
}

impl VectorDb for QdrantDb {
    fn upsert(&mut self, id: &str, vector: &[f32]) -> Result<(), VectorDbError> {
        self.ensure_collection()?;

        let resp = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({
                "points": [{
                    "id": fnv1a(id),
                    "vector": vector,
                    "payload": { "photo_id": id },
                }]
            }))
            .send()?;

        if !resp.status().is_success() {
            return Err(VectorDbError::Unexpected(format!(
                "upsert {id}: {}",
                resp.status()
            )));
        }

        self.known_ids.insert(id.to_string());
        Ok(())
    }

    fn query(&self, vector: &[f32], threshold: f32) -> Result<Vec<String>, VectorDbError> {
        if self.known_ids.is_empty() {
            return Ok(vec![]);
        }

        // the collection is shared with earlier runs and other owners
        let mut ids = Vec::new();
        let mut offset = 0;

        loop {
            let resp = self
                .client
                .post(format!("{}/points/search", self.collection_url()))
                .json(&json!({
                    "vector": vector,
                    "limit": SEARCH_PAGE_SIZE,
                    "offset": offset,
                    "score_threshold": threshold,
                    "with_payload": true,
                }))
                .send()?;

            if !resp.status().is_success() {
                return Err(VectorDbError::Unexpected(format!("search: {}", resp.status())));
            }

            let body: QdrantSearchResponse = resp.json()?;
            let page_len = body.result.len();

            // qdrant's score_threshold is inclusive
            ids.extend(
                body.result
                    .into_iter()
                    .filter(|point| point.score > threshold)
                    .filter_map(|point| point.payload.map(|p| p.photo_id))
                    .filter(|id| self.known_ids.contains(id)),
            );

            if page_len < SEARCH_PAGE_SIZE {
                break;
            }
            offset += SEARCH_PAGE_SIZE;
        }

        Ok(ids)
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}

/// In-process index with an optional external mirror.
pub struct FallbackIndex {
    local: VectorIndex,
    external: Option<Box<dyn VectorDb>>,
    degraded: AtomicBool,
}

impl FallbackIndex {
    pub fn in_memory(dimensions: usize) -> Self {
        Self {
            local: VectorIndex::new(dimensions),
            external: None,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn with_external(dimensions: usize, external: Box<dyn VectorDb>) -> Self {
        Self {
            local: VectorIndex::new(dimensions),
            external: Some(external),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &AiConfig) -> Self {
        match config.vector_db {
            VectorDbKind::InMemory => Self::in_memory(EMBEDDING_DIMENSION),
            VectorDbKind::Qdrant => {
                let timeout = Duration::from_secs(config.request_timeout_secs);
                match QdrantDb::new(
                    &config.vector_db_url,
                    &config.vector_db_collection,
                    EMBEDDING_DIMENSION,
                    timeout,
                ) {
                    Ok(db) => {
                        log::info!("using qdrant at {}", config.vector_db_url);
                        Self::with_external(EMBEDDING_DIMENSION, Box::new(db))
                    }
                    Err(err) => {
                        log::warn!("qdrant client unavailable, using in-memory index: {err}");
                        Self::in_memory(EMBEDDING_DIMENSION)
                    }
                }
            }
            other => {
                log::warn!("vector db {other:?} has no client, using in-memory index");
                Self::in_memory(EMBEDDING_DIMENSION)
            }
        }
    }

    pub fn local(&self) -> &VectorIndex {
        &self.local
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Name of the backend currently answering queries.
    pub fn backend_name(&self) -> &'static str {
        match &self.external {
            Some(db) if !self.is_degraded() => db.name(),
            _ => "in_memory",
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn degrade(&self, name: &str, err: &VectorDbError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            log::warn!("{name} failed, falling back to in-memory index: {err}");
        }
    }

    pub fn upsert(&mut self, id: &str, vector: Vec<f32>) -> Result<(), IndexError> {
        let is_zero = vector.iter().all(|x| *x == 0.0);
        self.local.insert(id, vector)?;

        if self.is_degraded() || is_zero {
            return Ok(());
        }

        if let Some(db) = self.external.as_mut() {
            let vector = match self.local.get(id) {
                Some(entry) => entry.embedding.clone(),
                None => return Ok(()),
            };
            if let Err(err) = db.upsert(id, &vector) {
                let name = db.name();
                self.degrade(name, &err);
            }
        }

        Ok(())
    }

    pub fn query(&self, vector: &[f32], threshold: f32) -> Vec<String> {
        if let Some(db) = self.external.as_ref() {
            if !self.is_degraded() {
                match db.query(vector, threshold) {
                    Ok(ids) => return ids,
                    Err(err) => self.degrade(db.name(), &err),
                }
            }
        }

        self.local.ids_above(vector, threshold)
    }
}
