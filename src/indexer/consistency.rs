// Corpus/index consistency validation
// Ensures the corpus snapshot and the vector index describe the same entries in the same order


use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::corpus::CorpusStore;
use crate::index::FlatIndex;
use crate::{LookupError, Result};

/// Consistency check results between a corpus snapshot and its index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of entries in the corpus snapshot
    pub corpus_entries: usize,
    /// Number of vectors in the index
    pub index_vectors: usize,
    /// Entry ids that exist in the corpus but have no vector
    pub missing_in_index: Vec<Uuid>,
    /// Vector ids that have no corpus entry
    pub orphaned_in_index: Vec<Uuid>,
    /// Positions where the corpus entry and the vector disagree on the id
    pub misaligned_positions: Vec<usize>,
    /// Overall consistency status
    pub is_consistent: bool,
}

impl ConsistencyReport {
    /// Compare the corpus and index position by position and as id sets
    #[inline]
    pub fn check(store: &CorpusStore, index: &FlatIndex) -> Self {
        debug!(
            "Checking consistency of {} corpus entries against {} vectors",
            store.len(),
            index.len()
        );

        let corpus_ids: HashSet<Uuid> = store.ids().collect();
        let index_ids: HashSet<Uuid> = index.ids().iter().copied().collect();

        let missing_in_index: Vec<Uuid> = store
            .ids()
            .filter(|id| !index_ids.contains(id))
            .collect();

        let orphaned_in_index: Vec<Uuid> = index
            .ids()
            .iter()
            .copied()
            .filter(|id| !corpus_ids.contains(id))
            .collect();

        let misaligned_positions: Vec<usize> = store
            .ids()
            .zip(index.ids().iter())
            .enumerate()
            .filter_map(|(position, (corpus_id, index_id))| {
                (corpus_id != *index_id).then_some(position)
            })
            .collect();

        let is_consistent = store.len() == index.len()
            && missing_in_index.is_empty()
            && orphaned_in_index.is_empty()
            && misaligned_positions.is_empty();

        Self {
            corpus_entries: store.len(),
            index_vectors: index.len(),
            missing_in_index,
            orphaned_in_index,
            misaligned_positions,
            is_consistent,
        }
    }

    /// Get the total number of issues found
    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_in_index.len()
            + self.orphaned_in_index.len()
            + self.misaligned_positions.len()
            + usize::from(self.corpus_entries != self.index_vectors)
    }

    /// Get a human-readable summary
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Index is consistent: {} entries, {} vectors",
                self.corpus_entries, self.index_vectors
            )
        } else {
            format!(
                "Index inconsistencies found: {} entries vs {} vectors, {} missing in index, {} orphaned in index, {} misaligned positions",
                self.corpus_entries,
                self.index_vectors,
                self.missing_in_index.len(),
                self.orphaned_in_index.len(),
                self.misaligned_positions.len()
            )
        }
    }

    fn log_issues(&self) {
        for id in self.missing_in_index.iter().take(10) {
            warn!("Corpus entry {} has no vector", id);
        }
        for id in self.orphaned_in_index.iter().take(10) {
            warn!("Vector {} has no corpus entry", id);
        }
        for position in self.misaligned_positions.iter().take(10) {
            warn!("Corpus and index disagree at position {}", position);
        }
    }
}

/// Check the pair and fail unless it is fully consistent.
///
/// A pair that fails here must never be served: every answer would be
/// joined to the wrong entry.
#[inline]
pub fn validate(store: &CorpusStore, index: &FlatIndex) -> Result<ConsistencyReport> {
    let report = ConsistencyReport::check(store, index);

    if report.is_consistent {
        info!("{}", report.summary());
        Ok(report)
    } else {
        warn!("{}", report.summary());
        report.log_issues();
        Err(LookupError::Consistency(report.summary()))
    }
}
