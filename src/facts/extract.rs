use super::fallback::Fallback;
use super::record::Facts;
use crate::config::BotRegistry;
use crate::model::{ReviewState, UserId, WorkItemId, WorkItemView};
use chrono::{DateTime, Utc};
use core::fmt::{Display, Formatter, Result as FmtResult};
use std::collections::BTreeMap;
use strum::Display as StrumDisplay;

const LOG_TARGET: &str = "     facts";

/// Why a work item's record is internally inconsistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum ImpossibleReason {
    LastCommitAfterClose,
    CreatedAfterClose,
    MergedAfterRelease,
}

/// A work item whose derived timestamps violate ordering invariants.
///
/// Extraction rejects such items individually; the batch continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpossibleWorkItem {
    pub id: WorkItemId,
    pub reason: ImpossibleReason,
}

impl Display for ImpossibleWorkItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "work item {} is internally inconsistent: {}", self.id, self.reason)
    }
}

impl core::error::Error for ImpossibleWorkItem {}

/// Derives [`Facts`] from one work item's joined sub-tables.
///
/// Pure and deterministic: no I/O, no shared state across items. The
/// layered resolution below must run in order — later layers revise earlier
/// values (e.g. a force push detected at the first-review boundary lowers
/// `first_commit`), and metric calculators depend on the exact tie-breaks.
#[derive(Debug, Clone, Copy)]
pub struct FactsExtractor<'a> {
    bots: &'a BotRegistry,
}

impl<'a> FactsExtractor<'a> {
    #[must_use]
    pub const fn new(bots: &'a BotRegistry) -> Self {
        Self { bots }
    }

    fn is_external(&self, user: Option<&UserId>, author: Option<&UserId>) -> bool {
        user.is_some_and(|user| Some(user) != author && !self.bots.is_bot(user))
    }

    /// Compute the lifecycle record for one work item.
    pub fn extract(&self, view: &WorkItemView<'_>) -> Result<Facts, ImpossibleWorkItem> {
        let item = view.item;
        let author = item.author.as_ref();

        let created = Fallback::from_value(item.created_at);
        let merged = Fallback::from_value(item.merged_at);
        // A merge closes the item even when the closure event itself is missing.
        let closed = Fallback::with_backup(item.closed_at, merged.clone());
        let closed_bound = closed.best();

        let mut first_commit = Fallback::from_value(view.commits.iter().filter_map(|c| c.authored_at).min());
        let mut last_commit = Fallback::from_value(view.commits.iter().filter_map(|c| c.committed_at).max());

        // External comment times per source, unbounded; the per-step bounds
        // against `closed` differ below (inclusive vs exclusive).
        let ext_review_comments: Vec<DateTime<Utc>> = view
            .review_comments
            .iter()
            .filter(|c| self.is_external(c.user.as_ref(), author))
            .filter_map(|c| c.created_at)
            .collect();
        let ext_reviews: Vec<DateTime<Utc>> = view
            .reviews
            .iter()
            .filter(|r| self.is_external(r.user.as_ref(), author))
            .filter_map(|r| r.submitted_at)
            .collect();
        let ext_comments: Vec<DateTime<Utc>> = view
            .comments
            .iter()
            .filter(|c| self.is_external(c.user.as_ref(), author))
            .filter_map(|c| c.created_at)
            .collect();

        let at_or_before_close = |ts: &&DateTime<Utc>| closed_bound.is_none_or(|cl| **ts <= cl);
        let first_comment = ext_review_comments
            .iter()
            .filter(at_or_before_close)
            .chain(ext_reviews.iter().filter(at_or_before_close))
            .chain(ext_comments.iter().filter(at_or_before_close))
            .min()
            .copied();
        let first_comment_on_first_review = Fallback::with_backup(first_comment, merged.clone());

        // The commit wall the first reviewer saw. Commits found *after* this
        // boundary rewrite history (force pushes), so they revise the commit
        // extremes computed above.
        let (last_commit_before_first_review, first_review_request_backup) =
            if let Some(fc) = first_comment_on_first_review.best() {
                let wall = view
                    .commits
                    .iter()
                    .filter_map(|c| c.committed_at)
                    .filter(|ts| *ts <= fc)
                    .max();
                let wall = Fallback::with_backup(wall, first_comment_on_first_review.clone());
                first_commit = Fallback::min([first_commit.clone(), wall.clone()]);
                last_commit = Fallback::max([last_commit.clone(), first_commit.clone()]);
                let backup = Fallback::min([
                    Fallback::max([created.clone(), wall.clone()]),
                    first_comment_on_first_review.clone(),
                ]);
                (wall, Some(backup))
            } else {
                (Fallback::absent(), None)
            };

        let requested = view.review_requests.iter().filter_map(|r| r.created_at).min();
        let mut first_review_request = match (&first_review_request_backup, requested) {
            (Some(backup), Some(req)) if first_comment_on_first_review.best().is_some_and(|fc| req > fc) => {
                // A review cannot be requested after a review already arrived.
                Fallback::from_value(backup.best())
            }
            (Some(backup), _) => Fallback::with_backup(requested, backup.clone()),
            (None, _) => Fallback::from_value(requested),
        };
        // Nor can it precede the last commit a reviewer could have seen.
        if last_commit_before_first_review.value().is_some()
            && let (Some(wall), Some(req)) = (last_commit_before_first_review.best(), first_review_request.best())
            && wall > req
        {
            first_review_request = Fallback::with_backup(last_commit_before_first_review.value(), first_review_request);
        }

        let last_review = if let Some(cl) = closed_bound {
            let submitted = view.reviews.iter().filter_map(|r| r.submitted_at).filter(|ts| *ts <= cl).max();
            let commented = ext_review_comments
                .iter()
                .chain(ext_comments.iter())
                .filter(|ts| **ts < cl)
                .max()
                .copied();
            Fallback::with_backup(submitted, Fallback::from_value(commented))
        } else {
            let submitted = view.reviews.iter().filter_map(|r| r.submitted_at).max();
            let commented = ext_review_comments.iter().chain(ext_comments.iter()).max().copied();
            Fallback::with_backup(submitted, Fallback::from_value(commented))
        };

        let approved = Fallback::from_value(self.approval_time(view, merged.best(), closed_bound));

        let released = match view.release {
            Some(release) if !release.force_push_dropped => Fallback::from_value(release.published_at),
            _ => Fallback::absent(),
        };
        let force_push_dropped = view.release.is_some_and(|release| release.force_push_dropped);

        let reject = |reason: ImpossibleReason| ImpossibleWorkItem {
            id: item.id.clone(),
            reason,
        };
        if let (Some(lc), Some(cl)) = (last_commit.best(), closed.best())
            && lc > cl
        {
            return Err(reject(ImpossibleReason::LastCommitAfterClose));
        }
        if let (Some(cr), Some(cl)) = (created.best(), closed.best())
            && cr > cl
        {
            return Err(reject(ImpossibleReason::CreatedAfterClose));
        }
        if let (Some(m), Some(r)) = (merged.best(), released.best())
            && m > r
        {
            return Err(reject(ImpossibleReason::MergedAfterRelease));
        }

        Ok(Facts {
            work_item_id: item.id.clone(),
            created,
            first_commit,
            last_commit_before_first_review,
            last_commit,
            merged,
            first_comment_on_first_review,
            first_review_request,
            last_review,
            approved,
            first_checks_passed: Fallback::absent(),
            last_checks_passed: Fallback::absent(),
            released,
            closed,
            change_size: item.additions + item.deletions,
            force_push_dropped,
        })
    }

    /// When the item became approved: each reviewer's most recent
    /// non-commented review decides their standing verdict; any standing
    /// "changes requested" suppresses approval entirely.
    fn approval_time(
        &self,
        view: &WorkItemView<'_>,
        merged: Option<DateTime<Utc>>,
        closed: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let mut standing: BTreeMap<&UserId, (DateTime<Utc>, ReviewState)> = BTreeMap::new();
        for review in &view.reviews {
            let Some(user) = review.user.as_ref() else { continue };
            let Some(ts) = review.submitted_at else { continue };
            if review.state == ReviewState::Commented {
                continue;
            }
            if merged.is_some_and(|m| ts > m) {
                continue;
            }
            match standing.get(user) {
                Some((existing, _)) if *existing >= ts => {}
                _ => {
                    let _ = standing.insert(user, (ts, review.state));
                }
            }
        }

        if standing.values().any(|(_, state)| *state == ReviewState::ChangesRequested) {
            // merged over standing objections
            return None;
        }
        let approved = standing
            .values()
            .filter(|(_, state)| *state == ReviewState::Approved)
            .map(|(ts, _)| *ts)
            .max()?;
        Some(closed.map_or(approved, |cl| approved.min(cl)))
    }

    /// Extract facts for every item in id order, dropping impossible records.
    pub fn extract_all<'v>(
        &self,
        views: impl IntoIterator<Item = WorkItemView<'v>>,
    ) -> (Vec<Facts>, Vec<ImpossibleWorkItem>) {
        let mut facts = Vec::new();
        let mut rejected = Vec::new();
        for view in views {
            match self.extract(&view) {
                Ok(f) => facts.push(f),
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "Dropping impossible record: {e}");
                    rejected.push(e);
                }
            }
        }
        (facts, rejected)
    }
}
