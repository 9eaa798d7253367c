use super::fallback::Fallback;
use crate::model::WorkItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The canonical lifecycle timestamps of one work item.
///
/// Computed once by [`FactsExtractor`](super::FactsExtractor) from a
/// snapshot row and never mutated afterward. Metric calculators consume
/// this record; the snapshot it came from is guaranteed to still contain
/// `work_item_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facts {
    pub work_item_id: WorkItemId,
    pub created: Fallback<DateTime<Utc>>,
    pub first_commit: Fallback<DateTime<Utc>>,
    pub last_commit_before_first_review: Fallback<DateTime<Utc>>,
    pub last_commit: Fallback<DateTime<Utc>>,
    pub merged: Fallback<DateTime<Utc>>,
    pub first_comment_on_first_review: Fallback<DateTime<Utc>>,
    pub first_review_request: Fallback<DateTime<Utc>>,
    pub last_review: Fallback<DateTime<Utc>>,
    pub approved: Fallback<DateTime<Utc>>,
    pub first_checks_passed: Fallback<DateTime<Utc>>,
    pub last_checks_passed: Fallback<DateTime<Utc>>,
    pub released: Fallback<DateTime<Utc>>,
    pub closed: Fallback<DateTime<Utc>>,
    /// Lines added plus lines removed.
    pub change_size: u64,
    /// The matching release lost this item's commits to a force push.
    pub force_push_dropped: bool,
}

impl Facts {
    /// When work observably began: the earlier of creation and the first
    /// commit.
    #[must_use]
    pub fn work_began(&self) -> Option<DateTime<Utc>> {
        Fallback::min([self.created.clone(), self.first_commit.clone()]).best()
    }

    /// The maximum timestamp contained in the record.
    #[must_use]
    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        Fallback::max([
            self.created.clone(),
            self.first_commit.clone(),
            self.last_commit_before_first_review.clone(),
            self.last_commit.clone(),
            self.merged.clone(),
            self.first_comment_on_first_review.clone(),
            self.first_review_request.clone(),
            self.last_review.clone(),
            self.approved.clone(),
            self.first_checks_passed.clone(),
            self.last_checks_passed.clone(),
            self.released.clone(),
            self.closed.clone(),
        ])
        .best()
    }
}
