// Embeddings module
// Text-to-vector backends and the normalization shared by index build and query

#[cfg(test)]
mod tests;

pub mod ollama;

pub use ollama::OllamaClient;

use crate::{LookupError, Result};

/// A text-to-vector function.
///
/// Implementations must be deterministic for a given model version: the
/// index is only meaningful when queries are embedded by the same function
/// that embedded the corpus.
pub trait Embedder: Send + Sync {
    /// Number of components in every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Embed `texts`, returning exactly one vector per input, in order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| LookupError::Embedding("Embedder returned no vector".to_string()))
    }
}

/// Scale `vector` to unit L2 length in place.
///
/// A zero vector is left untouched; it scores 0 against everything.
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Embed `texts` and return unit-length vectors of the embedder's dimension.
///
/// Both the index builder and the retriever go through here so that build
/// and query vectors always live in the same space.
#[inline]
pub fn embed_normalized(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let mut vectors = embedder.embed_batch(texts)?;

    if vectors.len() != texts.len() {
        return Err(LookupError::Embedding(format!(
            "Expected {} embeddings, received {}",
            texts.len(),
            vectors.len()
        )));
    }

    let dimension = embedder.dimension();
    for (position, vector) in vectors.iter_mut().enumerate() {
        if vector.len() != dimension {
            return Err(LookupError::Embedding(format!(
                "Embedding {} has {} dimensions, expected {}",
                position,
                vector.len(),
                dimension
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(LookupError::Embedding(format!(
                "Embedding {} contains non-finite values",
                position
            )));
        }
        normalize(vector);
    }

    Ok(vectors)
}

/// Embed a single query with the same normalization used at build time
#[inline]
pub fn embed_query(embedder: &dyn Embedder, query: &str) -> Result<Vec<f32>> {
    embed_normalized(embedder, &[query.to_string()])?
        .pop()
        .ok_or_else(|| LookupError::Embedding("Embedder returned no vector".to_string()))
}
