//! Session-scoped taste vector learned from past queries.

use crate::semantic::{
    embeddings::{blend, Embedder},
    EMBEDDING_DIMENSION,
};

/// Share of a new query in the running context.
const DEFAULT_LEARN_WEIGHT: f32 = 0.1;
/// Share of the context in the effective query.
const DEFAULT_BIAS_WEIGHT: f32 = 0.2;

pub struct PersonalizationTracker {
    context: Vec<f32>,
    learn_weight: f32,
    bias_weight: f32,
}

impl Default for PersonalizationTracker {
    fn default() -> Self {
        Self::new(EMBEDDING_DIMENSION)
    }
}

impl PersonalizationTracker {
    pub fn new(dimensions: usize) -> Self {
        Self::with_weights(dimensions, DEFAULT_LEARN_WEIGHT, DEFAULT_BIAS_WEIGHT)
    }

    pub fn with_weights(dimensions: usize, learn_weight: f32, bias_weight: f32) -> Self {
        Self {
            context: vec![0.0; dimensions],
            learn_weight: learn_weight.clamp(0.0, 1.0),
            bias_weight: bias_weight.clamp(0.0, 1.0),
        }
    }

    pub fn context(&self) -> &[f32] {
        &self.context
    }

    /// `context = normalize(context * 0.9 + embed(text) * 0.1)`
    pub fn learn(&mut self, embedder: &dyn Embedder, text: &str) {
        let experience = embedder.embed(text);
        self.context = blend(&self.context, &experience, self.learn_weight);
    }

    /// `normalize(raw * 0.8 + context * 0.2)`
    pub fn bias(&self, raw: &[f32]) -> Vec<f32> {
        blend(raw, &self.context, self.bias_weight)
    }

    pub fn reset(&mut self) {
        self.context.iter_mut().for_each(|x| *x = 0.0);
    }
}
