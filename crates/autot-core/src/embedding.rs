//! Embedding capability trait and vector similarity.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements.
//! Concrete providers (OpenAI, Ollama, fastembed) live in the `autot` app
//! crate; tests substitute deterministic embedders.
//!
//! The same model must be used for every store and every query, otherwise
//! similarities are meaningless. Stores record [`Embedder::model_name`] and
//! reject a mismatch on load.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// External text → vector capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    ///
    /// Failures are reported as [`Error::Embedding`].
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let vectors = embedder.embed(&[text.to_string()]).await?;
    let vector = vectors
        .into_iter()
        .next()
        .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))?;
    check_vector(&vector, embedder.dims())?;
    Ok(vector)
}

/// Check a vector against the store dimensionality and for finite components.
pub fn check_vector(vector: &[f32], dims: usize) -> Result<()> {
    if vector.len() != dims {
        return Err(Error::Embedding(format!(
            "embedding has {} dimensions, expected {}",
            vector.len(),
            dims
        )));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(Error::Embedding(
            "embedding contains non-finite components".to_string(),
        ));
    }
    Ok(())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `None` when the similarity is undefined: different lengths, empty
/// vectors, or either vector has zero norm.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_finite() {
        Some(sim as f32)
    } else {
        None
    }
}
