//! Query-time retrieval over a loaded corpus/index pair.
//!
//! A [`Retriever`] is an explicitly constructed service context: it owns the
//! embedder, the corpus store, the index and the retrieval policy. Nothing
//! is process-global, so several retrievers over different corpora can live
//! side by side. Cloning is cheap and every query is read-only, so clones
//! can serve concurrent requests without locking.


use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::{LookupError, Result};
use crate::config::RetrievalConfig;
use crate::corpus::{CorpusEntry, CorpusStore};
use crate::embeddings::{Embedder, embed_query};
use crate::index::{FlatIndex, Neighbor};
use crate::indexer::{ArtifactPaths, consistency};

/// A ranked match, produced fresh per query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub question: String,
    pub answer: String,
    pub category: String,
    pub relevance_score: f32,
    /// 1-based position among the returned results
    pub rank: usize,
}

/// Canonical form of a free-text question: surrounding whitespace removed
/// and lowercased, so every entry point scores the same text
#[inline]
pub fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Result count and minimum score for multi-result searches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub limit: usize,
    pub threshold: f32,
}

impl SearchOptions {
    #[inline]
    pub fn new(limit: usize, threshold: f32) -> Self {
        Self { limit, threshold }
    }

    /// Defaults for whole-corpus searches
    #[inline]
    pub fn search_defaults(config: &RetrievalConfig) -> Self {
        Self::new(config.search_limit, config.search_threshold)
    }

    /// Defaults for category-scoped searches
    #[inline]
    pub fn category_defaults(config: &RetrievalConfig) -> Self {
        Self::new(config.category_limit, config.search_threshold)
    }
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<CorpusStore>,
    index: Arc<FlatIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Wrap a corpus/index pair, refusing it unless the two are consistent
    /// and the embedder produces vectors of the index dimension
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: CorpusStore,
        index: FlatIndex,
        config: RetrievalConfig,
    ) -> Result<Self> {
        consistency::validate(&store, &index)?;

        if embedder.dimension() != index.dimension() {
            return Err(LookupError::Index(format!(
                "Embedder produces {} dimensions but the index was built with {}; rebuild the index",
                embedder.dimension(),
                index.dimension()
            )));
        }

        Ok(Self {
            embedder,
            store: Arc::new(store),
            index: Arc::new(index),
            config,
        })
    }

    /// Load and validate the persisted pair
    #[inline]
    pub fn from_artifacts(
        embedder: Arc<dyn Embedder>,
        paths: &ArtifactPaths,
        config: RetrievalConfig,
    ) -> Result<Self> {
        let (store, index) = paths.load()?;
        Self::new(embedder, store, index, config)
    }

    #[inline]
    pub fn store(&self) -> &CorpusStore {
        &self.store
    }

    #[inline]
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    #[inline]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    #[inline]
    pub fn fallback_message(&self) -> &str {
        &self.config.fallback_message
    }

    /// Single-best mode with the configured answer threshold
    #[inline]
    pub fn answer(&self, query: &str) -> Result<String> {
        self.answer_with_threshold(query, self.config.answer_threshold)
    }

    /// Single-best mode.
    ///
    /// Always yields exactly one string: the best entry's answer when it
    /// scores at least `threshold`, otherwise the fallback message. Only
    /// embedding or index failures are errors.
    #[inline]
    pub fn answer_with_threshold(&self, query: &str, threshold: f32) -> Result<String> {
        let best = self
            .search_with(query, &self.index, SearchOptions::new(1, threshold), |p| {
                self.store.get(p)
            })?
            .into_iter()
            .next();

        Ok(match best {
            Some(result) => {
                debug!(
                    "Answering with score {:.3} (threshold {:.3})",
                    result.relevance_score, threshold
                );
                result.answer
            }
            None => {
                debug!("No match at threshold {:.3}, using fallback", threshold);
                self.config.fallback_message.clone()
            }
        })
    }

    /// Multi-result mode: up to `options.limit` results scoring at least
    /// `options.threshold`, best first. An empty list is a valid outcome.
    #[inline]
    pub fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<SearchResult>> {
        self.search_with(query, &self.index, options, |p| self.store.get(p))
    }

    /// Multi-result mode restricted to one category.
    ///
    /// Searches a transient index over the stored vectors of that category,
    /// so the corpus is not re-embedded. An unknown category yields no
    /// results.
    #[inline]
    pub fn search_in_category(
        &self,
        query: &str,
        category: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let positions: Vec<usize> = self.store.in_category(category).map(|(p, _)| p).collect();

        if positions.is_empty() {
            debug!("No entries in category '{}'", category);
            return Ok(Vec::new());
        }

        let subset = self.index.subset(&positions)?;
        self.search_with(query, &subset, options, |p| {
            positions.get(p).and_then(|&position| self.store.get(position))
        })
    }

    /// Entries of one category in corpus order
    #[inline]
    pub fn browse_category<'a>(&'a self, category: &'a str) -> Vec<&'a CorpusEntry> {
        self.store.in_category(category).map(|(_, e)| e).collect()
    }

    /// Entry count per category, sorted by name
    #[inline]
    pub fn categories(&self) -> BTreeMap<String, usize> {
        self.store.categories()
    }

    fn search_with<'a, F>(
        &'a self,
        query: &str,
        index: &FlatIndex,
        options: SearchOptions,
        resolve: F,
    ) -> Result<Vec<SearchResult>>
    where
        F: Fn(usize) -> Option<&'a CorpusEntry>,
    {
        if index.is_empty() || options.limit == 0 {
            return Ok(Vec::new());
        }

        let query_vector = embed_query(self.embedder.as_ref(), query)?;
        let neighbors = index.search(&query_vector, options.limit)?;

        Ok(rank_results(&neighbors, options.threshold, resolve))
    }
}

/// Apply the threshold and the range check to candidates already ordered
/// by descending score, then number the survivors from 1.
fn rank_results<'a, F>(neighbors: &[Neighbor], threshold: f32, resolve: F) -> Vec<SearchResult>
where
    F: Fn(usize) -> Option<&'a CorpusEntry>,
{
    neighbors
        .iter()
        .filter_map(|neighbor| {
            let score = neighbor.score.clamp(-1.0, 1.0);
            if score.is_nan() || score < threshold {
                return None;
            }
            let Some(entry) = resolve(neighbor.position) else {
                debug!(
                    "Discarding candidate at position {} outside the corpus",
                    neighbor.position
                );
                return None;
            };
            Some((entry, score))
        })
        .enumerate()
        .map(|(i, (entry, score))| SearchResult {
            question: entry.question.clone(),
            answer: entry.answer.clone(),
            category: entry.category.clone(),
            relevance_score: score,
            rank: i + 1,
        })
        .collect()
}
