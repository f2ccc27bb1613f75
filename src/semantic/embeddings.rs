//! Deterministic text embeddings.
//!
//! A model-free stand-in for a real embedding model: every token is hashed
//! and the hash bits vote on the vector positions. The output only depends on
//! the input text, so the same text yields a bit-identical vector in every
//! process.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::semantic::EMBEDDING_DIMENSION;

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("punctuation pattern is valid"));

/// Contribution of a set hash bit.
const BIT_SET_WEIGHT: f32 = 1.0;
/// Contribution of a cleared hash bit.
const BIT_CLEAR_WEIGHT: f32 = -0.5;

/// Something that turns text into a fixed-size vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dimensions(&self) -> usize;
}

/// Hash-based embedder producing unit-norm vectors of `EMBEDDING_DIMENSION`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        embed(text)
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

/// Lowercases, strips punctuation and splits on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    PUNCTUATION
        .replace_all(&lowered, "")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// 32-bit rolling hash (`h * 31 + unit`) over UTF-16 code units.
fn rolling_hash(token: &str) -> i32 {
    token
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// splitmix64 finalizer, spreads the 32-bit hash over all 64 positions.
fn spread(hash: i32) -> u64 {
    let mut z = (hash as u32 as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Embeds `text` into a unit-norm vector. Text without tokens yields the
/// zero vector.
pub fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIMENSION];

    for token in tokenize(text) {
        let bits = spread(rolling_hash(&token));
        for (i, value) in vector.iter_mut().enumerate() {
            if (bits >> (i % 64)) & 1 == 1 {
                *value += BIT_SET_WEIGHT;
            } else {
                *value += BIT_CLEAR_WEIGHT;
            }
        }
    }

    normalize(vector)
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scales to unit length. A zero vector is returned unchanged.
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let magnitude = l2_norm(&v);
    if magnitude == 0.0 {
        return v;
    }
    v.iter_mut().for_each(|x| *x /= magnitude);
    v
}

/// Dot product. Equals cosine similarity for unit-norm inputs.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `normalize(a * (1 - weight) + b * weight)`
pub fn blend(a: &[f32], b: &[f32], weight: f32) -> Vec<f32> {
    let mixed = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| x * (1.0 - weight) + y * weight)
        .collect();
    normalize(mixed)
}
