use super::rows::{
    Commit, IssueComment, IssueLink, LabelRow, ReleaseRow, Review, ReviewComment, ReviewRequest, Truncate, WorkItem,
    WorkItemId,
};
use super::table::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One internally consistent "as of time T" view over a repository set.
///
/// The work-item table is the root; every sub-entity table's first index
/// level is a subset of it, and removing a work item cascades through all
/// of them. After [`truncate`](Self::truncate) no timestamp in any table
/// exceeds the horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time_from: DateTime<Utc>,
    pub time_to: DateTime<Utc>,
    pub items: BTreeMap<WorkItemId, WorkItem>,
    pub reviews: Table<Review>,
    pub review_comments: Table<ReviewComment>,
    pub review_requests: Table<ReviewRequest>,
    pub comments: Table<IssueComment>,
    pub commits: Table<Commit>,
    pub releases: BTreeMap<WorkItemId, ReleaseRow>,
    pub issues: Table<IssueLink>,
    pub labels: Table<LabelRow>,
}

/// One work item joined with all of its sub-entity rows.
#[derive(Debug, Clone)]
pub struct WorkItemView<'a> {
    pub item: &'a WorkItem,
    pub reviews: Vec<&'a Review>,
    pub review_comments: Vec<&'a ReviewComment>,
    pub review_requests: Vec<&'a ReviewRequest>,
    pub comments: Vec<&'a IssueComment>,
    pub commits: Vec<&'a Commit>,
    pub release: Option<&'a ReleaseRow>,
    pub issues: Vec<&'a IssueLink>,
    pub labels: Vec<&'a LabelRow>,
}

impl Snapshot {
    /// An empty snapshot over the given window.
    #[must_use]
    pub fn empty(time_from: DateTime<Utc>, time_to: DateTime<Utc>) -> Self {
        Self {
            time_from,
            time_to,
            items: BTreeMap::new(),
            reviews: Table::new(),
            review_comments: Table::new(),
            review_requests: Table::new(),
            comments: Table::new(),
            commits: Table::new(),
            releases: BTreeMap::new(),
            issues: Table::new(),
            labels: Table::new(),
        }
    }

    /// The ids of every work item in the root table.
    #[must_use]
    pub fn item_ids(&self) -> BTreeSet<WorkItemId> {
        self.items.keys().cloned().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Null every timestamp in every table that exceeds `horizon`.
    pub fn truncate(&mut self, horizon: DateTime<Utc>) {
        for item in self.items.values_mut() {
            item.truncate(horizon);
        }
        self.reviews.truncate(horizon);
        self.review_comments.truncate(horizon);
        self.review_requests.truncate(horizon);
        self.comments.truncate(horizon);
        self.commits.truncate(horizon);
        for release in self.releases.values_mut() {
            release.truncate(horizon);
        }
        self.issues.truncate(horizon);
        self.labels.truncate(horizon);
    }

    /// Cascade-remove the given work items from every table.
    pub fn remove_items(&mut self, drop: &BTreeSet<WorkItemId>) {
        if drop.is_empty() {
            return;
        }
        self.items.retain(|id, _| !drop.contains(id));
        self.releases.retain(|id, _| !drop.contains(id));
        self.reviews.retain_items(|id| !drop.contains(id));
        self.review_comments.retain_items(|id| !drop.contains(id));
        self.review_requests.retain_items(|id| !drop.contains(id));
        self.comments.retain_items(|id| !drop.contains(id));
        self.commits.retain_items(|id| !drop.contains(id));
        self.issues.retain_items(|id| !drop.contains(id));
        self.labels.retain_items(|id| !drop.contains(id));
    }

    /// Keep only the work items that satisfy `keep`, cascading through every
    /// table.
    pub fn retain_items(&mut self, mut keep: impl FnMut(&WorkItem) -> bool) {
        let drop: BTreeSet<WorkItemId> = self
            .items
            .values()
            .filter(|item| !keep(item))
            .map(|item| item.id.clone())
            .collect();
        self.remove_items(&drop);
    }

    /// Drop sub-entity rows whose work item is no longer in the root table.
    ///
    /// Restores the index-subset invariant after the root table was pruned
    /// by a source that did not see the sub-tables.
    pub fn prune_orphans(&mut self) {
        let ids: BTreeSet<WorkItemId> = self.items.keys().cloned().collect();
        self.releases.retain(|id, _| ids.contains(id));
        self.reviews.retain_items(|id| ids.contains(id));
        self.review_comments.retain_items(|id| ids.contains(id));
        self.review_requests.retain_items(|id| ids.contains(id));
        self.comments.retain_items(|id| ids.contains(id));
        self.commits.retain_items(|id| ids.contains(id));
        self.issues.retain_items(|id| ids.contains(id));
        self.labels.retain_items(|id| ids.contains(id));
    }

    /// Join one work item with its sub-entity rows.
    #[must_use]
    pub fn view(&self, id: &WorkItemId) -> Option<WorkItemView<'_>> {
        self.items.get(id).map(|item| WorkItemView {
            item,
            reviews: self.reviews.rows_for(id).collect(),
            review_comments: self.review_comments.rows_for(id).collect(),
            review_requests: self.review_requests.rows_for(id).collect(),
            comments: self.comments.rows_for(id).collect(),
            commits: self.commits.rows_for(id).collect(),
            release: self.releases.get(id),
            issues: self.issues.rows_for(id).collect(),
            labels: self.labels.rows_for(id).collect(),
        })
    }

    /// Iterate over the joined per-item views in id order.
    pub fn iter(&self) -> impl Iterator<Item = WorkItemView<'_>> {
        self.items.keys().filter_map(|id| self.view(id))
    }
}
