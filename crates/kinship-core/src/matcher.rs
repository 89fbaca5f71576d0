//! Best-match selection over an index snapshot.
//!
//! The score of a group is the number of attribute tokens it shares with the
//! candidate. A group qualifies once its score reaches the threshold
//! (inclusive). Among qualifying groups the highest score wins; on equal
//! scores the group seen first in snapshot order is kept.

use crate::attributes::AttributeSet;
use crate::index::Snapshot;
use crate::model::GroupId;

/// Default minimum overlap for a match.
pub const DEFAULT_MATCH_THRESHOLD: usize = 3;

/// Pure matching function with a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMatcher {
    threshold: usize,
}

impl Default for GroupMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl GroupMatcher {
    /// Create a matcher. A threshold of 0 is raised to 1: a group sharing
    /// nothing with the candidate never matches.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether a score is high enough to match.
    pub fn qualifies(&self, score: usize) -> bool {
        score >= self.threshold
    }

    /// Find the best-scoring qualifying group, or `None` when no group
    /// reaches the threshold.
    ///
    /// A later group displaces the running best only with a strictly greater
    /// score, so ties go to the earliest group in the snapshot.
    pub fn find_best(&self, candidate: &AttributeSet, snapshot: &Snapshot) -> Option<GroupId> {
        let mut best: Option<(GroupId, usize)> = None;
        for (id, attrs) in snapshot.iter() {
            let score = candidate.intersection_size(attrs);
            if !self.qualifies(score) {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((id, score)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Score of every group in snapshot order.
    pub fn score_all(&self, candidate: &AttributeSet, snapshot: &Snapshot) -> Vec<(GroupId, usize)> {
        snapshot
            .iter()
            .map(|(id, attrs)| (id, candidate.intersection_size(attrs)))
            .collect()
    }
}
