// Indexer module
// Offline build of the corpus snapshot and vector index, and loading of the persisted pair

pub mod consistency;


use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use console::user_attended_stderr;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::corpus::{CorpusRecord, CorpusStore, ParsedCorpus, SkippedRecord};
use crate::embeddings::{Embedder, embed_normalized};
use crate::index::FlatIndex;
use crate::{LookupError, Result};

pub use consistency::{ConsistencyReport, validate};

const DEFAULT_BUILD_BATCH_SIZE: usize = 64;

/// Embeds a corpus and produces a matching corpus store and index
pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    batch_size: usize,
    show_progress: bool,
}

/// Output of a build: the pair plus an operator summary
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub store: CorpusStore,
    pub index: FlatIndex,
    pub summary: BuildSummary,
}

/// Statistics about a build, for operator visibility only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub total: usize,
    pub skipped: Vec<SkippedRecord>,
    /// Entries per category, present when any record named a category
    pub categories: Option<BTreeMap<String, usize>>,
}

/// Locations of the persisted index and corpus snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub corpus: PathBuf,
}

impl<'a> IndexBuilder<'a> {
    #[inline]
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_BUILD_BATCH_SIZE,
            show_progress: false,
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Show a progress bar on stderr when a user is watching
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Build from parsed records, carrying any skipped lines into the summary
    #[inline]
    pub fn build_parsed(&self, parsed: ParsedCorpus) -> Result<BuiltIndex> {
        let mut built = self.build(parsed.records)?;
        built.summary.skipped = parsed.skipped;
        Ok(built)
    }

    /// Embed every record and build the pair in corpus order.
    ///
    /// An empty corpus yields an empty, valid pair.
    #[inline]
    pub fn build(&self, records: Vec<CorpusRecord>) -> Result<BuiltIndex> {
        info!("Building index for {} corpus records", records.len());

        let has_categories = records.iter().any(CorpusRecord::has_explicit_category);
        let entries: Vec<_> = records.into_iter().map(CorpusRecord::into_entry).collect();
        let texts: Vec<String> = entries.iter().map(|e| e.embedding_text()).collect();

        let bar = if self.show_progress && user_attended_stderr() {
            ProgressBar::new(texts.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = embed_normalized(self.embedder, batch)?;
            vectors.extend(embedded);
            bar.inc(batch.len() as u64);
        }
        bar.finish_and_clear();

        let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
        let mut index = FlatIndex::new(self.embedder.dimension());
        index.add_batch(&ids, &vectors)?;

        let store = CorpusStore::new(entries);
        debug_assert_eq!(store.len(), index.len());

        let summary = BuildSummary {
            total: store.len(),
            skipped: Vec::new(),
            categories: has_categories.then(|| store.categories()),
        };

        info!(
            "Built index with {} vectors of dimension {}",
            index.len(),
            index.dimension()
        );

        Ok(BuiltIndex {
            store,
            index,
            summary,
        })
    }
}

impl BuiltIndex {
    #[inline]
    pub fn persist(&self, paths: &ArtifactPaths) -> Result<()> {
        paths.persist(&self.store, &self.index)
    }
}

impl fmt::Display for BuildSummary {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Indexed {} Q&A pairs", self.total)?;

        if !self.skipped.is_empty() {
            write!(
                f,
                "\nSkipped {} malformed records (lines {})",
                self.skipped.len(),
                self.skipped.iter().map(|s| s.line).join(", ")
            )?;
        }

        if let Some(categories) = &self.categories {
            write!(f, "\n\nCategory breakdown:")?;
            for (category, count) in categories {
                write!(f, "\n  - {}: {} items", category, count)?;
            }
        }

        Ok(())
    }
}

impl ArtifactPaths {
    #[inline]
    pub fn new(index: impl Into<PathBuf>, corpus: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            corpus: corpus.into(),
        }
    }

    /// Whether both artifacts are present
    #[inline]
    pub fn exists(&self) -> bool {
        self.index.is_file() && self.corpus.is_file()
    }

    /// Write the pair next to its final location, then move both into place.
    ///
    /// Readers never observe a partially written file. A reader racing the
    /// two renames can see one new and one old artifact; the id check in
    /// [`ArtifactPaths::load`] rejects that combination.
    #[inline]
    pub fn persist(&self, store: &CorpusStore, index: &FlatIndex) -> Result<()> {
        if store.len() != index.len() {
            return Err(LookupError::Consistency(format!(
                "Refusing to persist {} entries with {} vectors",
                store.len(),
                index.len()
            )));
        }

        for path in [&self.index, &self.corpus] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let index_tmp = staging_path(&self.index);
        let corpus_tmp = staging_path(&self.corpus);

        let committed = index
            .save(&index_tmp)
            .and_then(|()| store.save(&corpus_tmp))
            .and_then(|()| fs::rename(&corpus_tmp, &self.corpus).map_err(LookupError::from))
            .and_then(|()| fs::rename(&index_tmp, &self.index).map_err(LookupError::from));
        if let Err(e) = committed {
            remove_staging(&index_tmp);
            remove_staging(&corpus_tmp);
            return Err(e);
        }

        info!(
            "Persisted {} entries to {} and {}",
            store.len(),
            self.index.display(),
            self.corpus.display()
        );
        Ok(())
    }

    /// Load the pair and refuse it unless the corpus and index agree entry
    /// for entry
    #[inline]
    pub fn load(&self) -> Result<(CorpusStore, FlatIndex)> {
        debug!(
            "Loading index from {} and corpus from {}",
            self.index.display(),
            self.corpus.display()
        );

        let index = FlatIndex::load(&self.index)?;
        let store = CorpusStore::load(&self.corpus)?;
        consistency::validate(&store, &index)?;

        Ok((store, index))
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn remove_staging(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove staging file {}: {}", path.display(), e);
        }
    }
}
