//! Candidate Aggregation
//!
//! Merges candidate sets from every recall source into one deduplicated
//! list and drops anything the user has already interacted with.
//!
//! Source scores are discarded here: they are not comparable across
//! sources, the reranker produces the only score that matters.

use std::collections::HashSet;
use tracing::debug;

use crate::models::CandidateSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedCandidates {
    /// Deduplicated candidates, first-seen order across the input sets.
    pub candidates: Vec<String>,
    /// Union members that were removed because they are in the seed sequence.
    pub consumed: Vec<String>,
}

impl AggregatedCandidates {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

pub struct CandidateAggregator;

impl CandidateAggregator {
    /// Union of all sets minus the recent-item sequence, in a single pass.
    ///
    /// Empty output is a valid result, not an error.
    pub fn aggregate(sets: &[CandidateSet], recent_items: &[String]) -> AggregatedCandidates {
        let recent: HashSet<&str> = recent_items.iter().map(String::as_str).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut result = AggregatedCandidates::default();

        for item_id in sets.iter().flat_map(|set| set.item_ids()) {
            if !seen.insert(item_id.as_str()) {
                continue;
            }

            if recent.contains(item_id.as_str()) {
                result.consumed.push(item_id.clone());
            } else {
                result.candidates.push(item_id.clone());
            }
        }

        debug!(
            union = seen.len(),
            consumed = result.consumed.len(),
            candidates = result.candidates.len(),
            "Aggregated candidate sets"
        );

        result
    }
}
