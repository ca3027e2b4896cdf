//! Embedding providers
//!
//! Stores only see the narrow [`EmbeddingProvider`] capability: turn text into
//! a vector and compare two vectors. Concrete providers (local ONNX models,
//! OpenAI-compatible endpoints, the deterministic hash provider) are resolved
//! per tenant through the [`ProviderRegistry`].

mod hash;
mod local;
mod openai;
mod registry;

pub use hash::HashEmbeddingProvider;
pub use local::FastEmbedProvider;
pub use openai::OpenAiEmbeddingProvider;
pub use registry::{FASTEMBED_PROVIDER, HASH_PROVIDER, OPENAI_PROVIDER, ProviderRegistry};

use async_trait::async_trait;

use crate::error::{CrewMemError, Result};

/// Text-to-vector capability used by every store.
///
/// Failures are terminal for the calling operation; implementations do not retry.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier used in logs, e.g. `fastembed/multilingual-e5-small`
    fn name(&self) -> String;

    /// Number of values in every vector this provider returns
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

/// Cosine similarity; 0 for empty or mismatched vectors and zero norms
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Embed `text` and verify the vector fits the store's fixed-width column
pub async fn embed_checked(
    provider: &dyn EmbeddingProvider,
    text: &str,
    dimension: usize,
) -> Result<Vec<f32>> {
    let vector = provider.embed(text).await?;
    if vector.len() != dimension {
        return Err(CrewMemError::Embedding(format!(
            "{} returned {} values, store expects {dimension}",
            provider.name(),
            vector.len()
        )));
    }
    Ok(vector)
}
