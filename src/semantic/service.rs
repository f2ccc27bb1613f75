//! Semantic search service for photo similarity search.
//!
//! Bundles the embedder, the vector index and the personalization context
//! into one owned value. Nothing here is global: every session builds its
//! own service.

use crate::{
    config::Config,
    photos::{Photo, PhotoStore},
    semantic::{
        embeddings::{Embedder, HashEmbedder},
        external::FallbackIndex,
        index::IndexError,
        personalization::PersonalizationTracker,
        DEFAULT_THRESHOLD, EMBEDDING_DIMENSION,
    },
};

/// Outcome of one indexing pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub failed: usize,
}

pub struct SemanticSearchService {
    embedder: Box<dyn Embedder>,
    index: FallbackIndex,
    personalization: PersonalizationTracker,
    threshold: f32,
}

impl Default for SemanticSearchService {
    fn default() -> Self {
        Self::new(
            Box::new(HashEmbedder),
            FallbackIndex::in_memory(EMBEDDING_DIMENSION),
            DEFAULT_THRESHOLD,
        )
    }
}

impl SemanticSearchService {
    pub fn new(embedder: Box<dyn Embedder>, index: FallbackIndex, threshold: f32) -> Self {
        let dimensions = embedder.dimensions();
        Self {
            embedder,
            index,
            personalization: PersonalizationTracker::new(dimensions),
            threshold,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Box::new(HashEmbedder),
            FallbackIndex::from_config(&config.ai),
            config.search.similarity_threshold,
        )
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        self.embedder.embed(text)
    }

    /// Embeds a photo's searchable text and stores the vector.
    pub fn index_photo(&mut self, photo: &Photo) -> Result<Vec<f32>, IndexError> {
        let embedding = self.embedder.embed(&photo.search_text());
        self.index.upsert(&photo.id, embedding.clone())?;
        Ok(embedding)
    }

    /// Indexes every photo in the store that has no embedding yet.
    ///
    /// A photo that fails to index is logged and left unindexed, the rest of
    /// the batch continues.
    pub fn index_batch(&mut self, store: &mut PhotoStore) -> IndexReport {
        let mut report = IndexReport::default();

        for id in store.unindexed() {
            let Some(photo) = store.get(&id) else {
                continue;
            };

            let embedding = match self.index_photo(photo) {
                Ok(embedding) => embedding,
                Err(err) => {
                    log::error!("failed to index {id}: {err}");
                    report.failed += 1;
                    continue;
                }
            };

            match store.attach_embedding(&id, embedding) {
                Ok(true) => report.indexed += 1,
                Ok(false) => {}
                Err(err) => {
                    log::error!("failed to attach embedding to {id}: {err}");
                    report.failed += 1;
                }
            }
        }

        if report.indexed > 0 || report.failed > 0 {
            log::info!(
                "indexed {} photos ({} failed), {} vectors in {}",
                report.indexed,
                report.failed,
                self.index.len(),
                self.index.backend_name()
            );
        }

        report
    }

    /// Photo ids above the similarity threshold, best first.
    ///
    /// The query vector is biased by the personalization context.
    pub fn search(&self, query: &str) -> Vec<String> {
        let raw = self.embedder.embed(query);
        let biased = self.personalization.bias(&raw);
        self.index.query(&biased, self.threshold)
    }

    /// Feeds a query into the personalization context.
    pub fn learn(&mut self, query: &str) {
        self.personalization.learn(self.embedder.as_ref(), query);
    }

    pub fn indexed_count(&self) -> usize {
        self.index.len()
    }

    pub fn personalization(&self) -> &PersonalizationTracker {
        &self.personalization
    }

    pub fn backend_name(&self) -> &'static str {
        self.index.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        photos::{tests::photo, PhotoSource},
        semantic::embeddings::embed,
    };

    /// Embedder producing the wrong dimensionality for one keyword.
    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn embed(&self, text: &str) -> Vec<f32> {
            if text.contains("broken") {
                vec![1.0; 3]
            } else {
                embed(text)
            }
        }

        fn dimensions(&self) -> usize {
            EMBEDDING_DIMENSION
        }
    }

    fn store() -> PhotoStore {
        let mut store = PhotoStore::new();
        store.add(photo("p1", "Pets", PhotoSource::Cloud)).unwrap();
        store.add(photo("p2", "Food", PhotoSource::Cloud)).unwrap();
        store
    }

    #[test]
    fn test_index_batch_attaches_identical_vectors() {
        let mut store = store();
        let mut service = SemanticSearchService::default();

        let report = service.index_batch(&mut store);
        assert_eq!(report, IndexReport { indexed: 2, failed: 0 });
        assert_eq!(service.indexed_count(), 2);
        assert!(store.unindexed().is_empty());

        let photo = store.get("p1").unwrap();
        assert_eq!(photo.embedding.as_ref().unwrap(), &embed(&photo.search_text()));

        // second pass has nothing to do
        assert_eq!(service.index_batch(&mut store), IndexReport::default());
    }

    #[test]
    fn test_index_batch_continues_after_failure() {
        let mut store = store();
        let mut broken = photo("p3", "Pets", PhotoSource::Local);
        broken.name = "broken.jpg".to_string();
        store.add(broken).unwrap();

        let mut service = SemanticSearchService::new(
            Box::new(BrokenEmbedder),
            FallbackIndex::in_memory(EMBEDDING_DIMENSION),
            DEFAULT_THRESHOLD,
        );

        let report = service.index_batch(&mut store);
        assert_eq!(report, IndexReport { indexed: 2, failed: 1 });
        assert_eq!(store.unindexed(), vec!["p3".to_string()]);
        assert_eq!(service.indexed_count(), 2);
    }

    #[test]
    fn test_search_without_history_matches_plain_index() {
        let mut store = store();
        let mut service = SemanticSearchService::default();
        service.index_batch(&mut store);

        for query in ["pets", "food", "dog"] {
            let results = service.search(query);
            let q = embed(query);
            for id in &results {
                let stored = store.get(id).unwrap().embedding.clone().unwrap();
                assert!(crate::semantic::similarity(&q, &stored) > DEFAULT_THRESHOLD);
            }
        }
    }

    #[test]
    fn test_learn_updates_context() {
        let mut service = SemanticSearchService::default();
        assert!(service.personalization().context().iter().all(|x| *x == 0.0));

        service.learn("beach");
        let expected = embed("beach");
        for (a, b) in service.personalization().context().iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
