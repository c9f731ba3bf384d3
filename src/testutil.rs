//! Deterministic embedders for exercising the index and retriever without a
//! model server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embeddings::Embedder;
use crate::{LookupError, Result};

/// Bag-of-words embedder over a fixed vocabulary.
///
/// Component `i` counts occurrences of `vocabulary[i]` in the lowercased
/// text. Texts sharing the same vocabulary words embed identically; texts
/// with no vocabulary words embed to the zero vector.
#[derive(Debug, Clone)]
pub struct KeywordEmbedder {
    vocabulary: Vec<String>,
    calls: std::sync::Arc<AtomicUsize>,
}

impl KeywordEmbedder {
    #[inline]
    pub fn new<I, S>(vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vocabulary: vocabulary
                .into_iter()
                .map(|w| w.into().to_lowercase())
                .collect(),
            calls: std::sync::Arc::default(),
        }
    }

    /// Number of `embed_batch` calls made so far
    #[inline]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let mut vector = vec![0.0; self.vocabulary.len()];
        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if let Some(slot) = self.vocabulary.iter().position(|w| w == token) {
                vector[slot] += 1.0;
            }
        }
        vector
    }
}

impl Embedder for KeywordEmbedder {
    fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Embedder that looks texts up in a table and returns a fixed vector for
/// anything it does not know.
#[derive(Debug, Clone)]
pub struct TableEmbedder {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

impl TableEmbedder {
    #[inline]
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            dimension: fallback.len(),
            table: HashMap::new(),
            fallback,
        }
    }

    #[inline]
    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.table.insert(text.into(), vector);
        self
    }
}

impl Embedder for TableEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| self.table.get(t).unwrap_or(&self.fallback).clone())
            .collect())
    }
}

/// Embedder whose backend is always unreachable
#[derive(Debug, Clone, Copy)]
pub struct FailingEmbedder {
    pub dimension: usize,
}

impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(LookupError::Embedding(
            "embedding backend unreachable".to_string(),
        ))
    }
}
