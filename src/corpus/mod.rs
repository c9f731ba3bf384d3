//! Corpus ingestion and the persisted corpus snapshot.
//!
//! Raw line-delimited records are resolved into [`CorpusEntry`] values
//! exactly once, at ingestion: every entry gets a stable id and its
//! category default applied. Everything downstream works with resolved
//! entries only.


use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{LookupError, Result};

/// Category assigned to records that do not carry one
pub const DEFAULT_CATEGORY: &str = "General";

/// A corpus record as authored in the input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A resolved, immutable corpus entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    pub category: String,
}

/// How [`parse_jsonl`] treats malformed records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// The first malformed record aborts the whole parse
    #[default]
    Strict,
    /// Malformed records are logged, skipped and counted
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedCorpus {
    pub records: Vec<CorpusRecord>,
    pub skipped: Vec<SkippedRecord>,
}

impl CorpusRecord {
    #[inline]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            category: None,
        }
    }

    #[inline]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Whether the record names a non-empty category of its own
    #[inline]
    pub fn has_explicit_category(&self) -> bool {
        self.category.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    /// Resolve into an entry with a fresh id and the category default applied
    #[inline]
    pub fn into_entry(self) -> CorpusEntry {
        let category = match self.category {
            Some(category) if !category.trim().is_empty() => category,
            _ => DEFAULT_CATEGORY.to_string(),
        };

        CorpusEntry {
            id: Uuid::new_v4(),
            question: self.question,
            answer: self.answer,
            category,
        }
    }
}

impl CorpusEntry {
    /// The text embedded for this entry: question and answer joined by a space.
    ///
    /// Including the answer lets queries phrased in answer vocabulary match.
    #[inline]
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.question, self.answer)
    }
}

/// Parse line-delimited JSON corpus records.
///
/// Blank lines are ignored. Line numbers in errors are 1-based.
#[inline]
pub fn parse_jsonl<R: BufRead>(reader: R, mode: ParseMode) -> Result<ParsedCorpus> {
    let mut parsed = ParsedCorpus::default();

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<CorpusRecord>(trimmed) {
            Ok(record) => parsed.records.push(record),
            Err(e) => match mode {
                ParseMode::Strict => {
                    return Err(LookupError::Corpus {
                        line: line_number,
                        message: e.to_string(),
                    });
                }
                ParseMode::Lenient => {
                    warn!("Skipping corpus line {}: {}", line_number, e);
                    parsed.skipped.push(SkippedRecord {
                        line: line_number,
                        reason: e.to_string(),
                    });
                }
            },
        }
    }

    debug!(
        "Parsed {} corpus records ({} skipped)",
        parsed.records.len(),
        parsed.skipped.len()
    );
    Ok(parsed)
}

/// Read and parse a line-delimited JSON corpus file
#[inline]
pub fn read_jsonl_file<P: AsRef<Path>>(path: P, mode: ParseMode) -> Result<ParsedCorpus> {
    let file = File::open(path.as_ref())?;
    parse_jsonl(BufReader::new(file), mode)
}

/// Ordered corpus entries backing a similarity index.
///
/// Position `i` here is vector `i` in the index built alongside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusStore {
    entries: Vec<CorpusEntry>,
}

impl CorpusStore {
    #[inline]
    pub fn new(entries: Vec<CorpusEntry>) -> Self {
        Self { entries }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, position: usize) -> Option<&CorpusEntry> {
        self.entries.get(position)
    }

    #[inline]
    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// Entry count per category, sorted by category name
    #[inline]
    pub fn categories(&self) -> BTreeMap<String, usize> {
        self.entries
            .iter()
            .map(|e| e.category.clone())
            .counts()
            .into_iter()
            .collect()
    }

    /// Entries of one category with their corpus positions, in corpus order
    #[inline]
    pub fn in_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = (usize, &'a CorpusEntry)> + 'a {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.category == category)
    }

    /// Write the snapshot as one JSON entry per line
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);

        for entry in &self.entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }

        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Load a snapshot written by [`CorpusStore::save`]
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut entries = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let entry: CorpusEntry =
                serde_json::from_str(&line).map_err(|e| LookupError::Corpus {
                    line: index + 1,
                    message: format!("Invalid corpus snapshot entry: {}", e),
                })?;
            entries.push(entry);
        }

        debug!(
            "Loaded {} corpus entries from {}",
            entries.len(),
            path.as_ref().display()
        );
        Ok(Self { entries })
    }
}

impl FromIterator<CorpusEntry> for CorpusStore {
    #[inline]
    fn from_iter<I: IntoIterator<Item = CorpusEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
