//! The drop-set computations over an assembled snapshot.
//!
//! Every function is pure and synchronous: it inspects the snapshot tables
//! and returns the set of work-item ids that fail its predicate. Callers
//! union the sets and cascade-remove once.

use super::issue::IssueFilter;
use super::label::LabelFilter;
use super::participants::{Participants, Role};
use crate::model::{Snapshot, WorkItemId};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

const LOG_TARGET: &str = "   filters";

fn within(ts: Option<DateTime<Utc>>, cutoff: Option<DateTime<Utc>>) -> bool {
    match (ts, cutoff) {
        (Some(ts), Some(cutoff)) => ts <= cutoff,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Ids of items with no participant in any of the requested roles.
///
/// Reviewer matching skips self-reviews (reviewer identity equal to the
/// item's author). `cutoff`, when set, bounds each role's event timestamp.
/// An empty filter drops nothing.
#[must_use]
pub fn dropped_by_participants(
    snapshot: &Snapshot,
    participants: &Participants,
    cutoff: Option<DateTime<Utc>>,
) -> BTreeSet<WorkItemId> {
    if participants.is_empty() {
        return BTreeSet::new();
    }

    let mut keep: BTreeSet<WorkItemId> = BTreeSet::new();
    for (id, item) in &snapshot.items {
        let matched = participants.iter().any(|(role, users)| match role {
            Role::Author => item.author.as_ref().is_some_and(|author| users.contains(author)),
            Role::Merger => {
                item.merged_by.as_ref().is_some_and(|merger| users.contains(merger)) && within(item.merged_at, cutoff)
            }
            Role::Releaser => snapshot.releases.get(id).is_some_and(|release| {
                release.published_by.as_ref().is_some_and(|user| users.contains(user))
                    && within(release.published_at, cutoff)
            }),
            Role::Reviewer => snapshot.reviews.rows_for(id).any(|review| {
                review.user.as_ref().is_some_and(|user| users.contains(user) && Some(user) != item.author.as_ref())
                    && within(review.submitted_at, cutoff)
            }),
            Role::Commenter => snapshot
                .comments
                .rows_for(id)
                .any(|comment| comment.user.as_ref().is_some_and(|user| users.contains(user)) && within(comment.created_at, cutoff)),
            Role::CommitAuthor => snapshot
                .commits
                .rows_for(id)
                .any(|commit| commit.author.as_ref().is_some_and(|user| users.contains(user)) && within(commit.authored_at, cutoff)),
            Role::CommitCommitter => snapshot.commits.rows_for(id).any(|commit| {
                commit.committer.as_ref().is_some_and(|user| users.contains(user)) && within(commit.committed_at, cutoff)
            }),
        });
        if matched {
            let _ = keep.insert(id.clone());
        }
    }

    snapshot.items.keys().filter(|id| !keep.contains(*id)).cloned().collect()
}

/// Ids of items whose label set fails the filter. An empty filter drops
/// nothing.
#[must_use]
pub fn dropped_by_labels(snapshot: &Snapshot, filter: &LabelFilter) -> BTreeSet<WorkItemId> {
    if filter.is_empty() {
        return BTreeSet::new();
    }
    snapshot
        .items
        .keys()
        .filter(|id| {
            let labels: BTreeSet<String> = snapshot.labels.rows_for(id).map(|row| row.name.to_lowercase()).collect();
            !filter.passes(&labels)
        })
        .cloned()
        .collect()
}

/// Ids of items with no linked issue satisfying the filter. An empty filter
/// drops nothing.
#[must_use]
pub fn dropped_by_issues(snapshot: &Snapshot, filter: &IssueFilter) -> BTreeSet<WorkItemId> {
    if filter.is_empty() {
        return BTreeSet::new();
    }
    snapshot
        .items
        .keys()
        .filter(|id| !snapshot.issues.rows_for(id).any(|issue| filter.matches(issue)))
        .cloned()
        .collect()
}

/// Ids of items with no lifecycle event inside `[time_from, time_to]`.
///
/// Events: creation, closure, review, review request, comment (either
/// kind), commit, release.
#[must_use]
pub fn dropped_by_inactivity(
    snapshot: &Snapshot,
    time_from: DateTime<Utc>,
    time_to: DateTime<Utc>,
) -> BTreeSet<WorkItemId> {
    let in_window = |ts: Option<DateTime<Utc>>| ts.is_some_and(|ts| ts >= time_from && ts <= time_to);

    snapshot
        .items
        .iter()
        .filter(|(id, item)| {
            let active = in_window(item.created_at)
                || in_window(item.closed_at)
                || snapshot.reviews.rows_for(id).any(|r| in_window(r.submitted_at))
                || snapshot.review_requests.rows_for(id).any(|r| in_window(r.created_at))
                || snapshot.review_comments.rows_for(id).any(|c| in_window(c.created_at))
                || snapshot.comments.rows_for(id).any(|c| in_window(c.created_at))
                || snapshot
                    .commits
                    .rows_for(id)
                    .any(|c| in_window(c.authored_at) || in_window(c.committed_at))
                || snapshot.releases.get(id).is_some_and(|r| in_window(r.published_at));
            !active
        })
        .map(|(id, _)| id.clone())
        .collect()
}

/// Apply the participant, label, and issue filters in one cascade pass.
pub fn apply(
    snapshot: &mut Snapshot,
    participants: &Participants,
    labels: &LabelFilter,
    issues: &IssueFilter,
    cutoff: Option<DateTime<Utc>>,
) {
    let mut drop = dropped_by_participants(snapshot, participants, cutoff);
    drop.append(&mut dropped_by_labels(snapshot, labels));
    drop.append(&mut dropped_by_issues(snapshot, issues));
    if !drop.is_empty() {
        log::debug!(target: LOG_TARGET, "Dropping {} of {} work items", drop.len(), snapshot.items.len());
        snapshot.remove_items(&drop);
    }
}
