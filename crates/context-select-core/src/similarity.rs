//! Vector similarity and query embedding seams.
//!
//! The pipeline treats fragment embeddings as opaque beyond distance
//! computation. [`Similarity`] maps a (query, fragment) vector pair to a
//! score in `[0, 1]`; [`QueryEmbedder`] turns query text into a vector.
//! Concrete embedders (OpenAI, local models) live in the application crate.

use anyhow::Result;
use async_trait::async_trait;

/// Similarity between a query vector and a fragment vector, in `[0, 1]`.
pub trait Similarity: Send + Sync {
    fn similarity(&self, query: &[f32], fragment: &[f32]) -> f64;
}

/// Cosine similarity with negative values clamped to `0.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineSimilarity;

impl Similarity for CosineSimilarity {
    fn similarity(&self, query: &[f32], fragment: &[f32]) -> f64 {
        (cosine_similarity(query, fragment) as f64).clamp(0.0, 1.0)
    }
}

/// Embeds query text for vector scoring.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    /// Returns `Ok(None)` when embedding is not configured.
    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>>;
}

#[async_trait]
impl<T: QueryEmbedder + ?Sized> QueryEmbedder for Box<T> {
    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>> {
        (**self).embed_query(text).await
    }
}

/// An embedder that never produces a vector; scoring becomes keyword-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEmbedder;

#[async_trait]
impl QueryEmbedder for NoEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }
}

/// Encode a float vector as little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode bytes produced by [`vec_to_blob`]. Trailing partial words are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_decodes_little_endian() {
        let blob = [0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x00, 0xc0];
        assert_eq!(blob_to_vec(&blob), vec![1.0, -2.0]);
        assert_eq!(vec_to_blob(&[1.0, -2.0]), blob.to_vec());
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_mismatched() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_clamped_similarity_stays_in_unit_range() {
        let sim = CosineSimilarity;
        assert_eq!(sim.similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        let s = sim.similarity(&[1.0, 1.0], &[1.0, 0.0]);
        assert!(s > 0.0 && s <= 1.0);
    }
}
