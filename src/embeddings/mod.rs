// Embeddings module
// Hosted model client, sentence chunking and vector math

pub mod chunking;
pub mod openai;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

use crate::{Result, StorefrontError};

pub use chunking::{chunk_count, generate_chunks};
pub use openai::OpenAiClient;

pub type Vector = Vec<f32>;

/// Anything that can turn text into fixed-dimension vectors.
///
/// Implementations block on network I/O; async callers go through
/// [`embed_one_blocking`] and [`embed_many_blocking`].
pub trait Embedder: Send + Sync {
    /// Embed a single string. Literal `\n` sequences are replaced with spaces first.
    fn embed_one(&self, text: &str) -> Result<Vector>;

    /// Embed a batch in one round trip. `output[i]` belongs to `texts[i]`; the
    /// texts are sent unmodified and the whole batch fails together.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vector>>;

    fn model_name(&self) -> &str;
}

/// Replace literal backslash-n sequences (two characters) with a space.
#[inline]
pub fn normalize_query_text(text: &str) -> String {
    text.replace("\\n", " ")
}

/// Run [`Embedder::embed_one`] on the blocking pool
#[inline]
pub async fn embed_one_blocking(embedder: &Arc<dyn Embedder>, text: &str) -> Result<Vector> {
    let embedder = Arc::clone(embedder);
    let text = text.to_string();
    tokio::task::spawn_blocking(move || embedder.embed_one(&text))
        .await
        .map_err(|e| StorefrontError::EmbeddingService(format!("embedding task failed: {}", e)))?
}

/// Run [`Embedder::embed_many`] on the blocking pool
#[inline]
pub async fn embed_many_blocking(
    embedder: &Arc<dyn Embedder>,
    texts: Vec<String>,
) -> Result<Vec<Vector>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let embedder = Arc::clone(embedder);
    tokio::task::spawn_blocking(move || embedder.embed_many(&texts))
        .await
        .map_err(|e| StorefrontError::EmbeddingService(format!("embedding task failed: {}", e)))?
}

/// Cosine similarity, i.e. `1 - cosine_distance`. Zero-norm inputs score 0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}
