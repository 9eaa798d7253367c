use crate::Result;
use crate::config::ReleasePolicy;
use crate::filters::IssueFilter;
use crate::model::{
    Commit, IssueComment, IssueLink, LabelRow, ReleaseRow, Review, ReviewComment, ReviewRequest, SubEntityId, UserId,
    WorkItem, WorkItemId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Capability flag of the backing store.
///
/// A feature-limited backend cannot evaluate the issue filter inside the
/// work-item query; the filter engine then applies it in memory. The choice
/// affects only the query strategy, never the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Full,
    Limited,
}

/// The direct work-item query.
///
/// `blacklist` is excluded by the store itself so blacklisted items never
/// incur fetch cost. Hidden work items are excluded by contract. An empty
/// `authors` set means everybody; `issues` is only populated for
/// [`Dialect::Full`] stores.
#[derive(Debug, Clone)]
pub struct WorkItemQuery {
    pub repositories: BTreeSet<Arc<str>>,
    pub time_from: DateTime<Utc>,
    pub time_to: DateTime<Utc>,
    pub authors: BTreeSet<UserId>,
    pub blacklist: BTreeSet<WorkItemId>,
    pub issues: Option<IssueFilter>,
}

/// Read-only relational access to the upstream metadata store.
///
/// All queries are ranged by repository set, time window, and identity
/// sets; sub-entity queries are bounded by the work-item id set and an
/// optional `created_before` horizon. The release policy is opaque here:
/// implementations interpret it, the assembly pipeline only passes it
/// through.
pub trait MetadataStore {
    fn dialect(&self) -> Dialect {
        Dialect::Full
    }

    /// Work items matching the direct query.
    fn work_items(&self, query: &WorkItemQuery) -> impl Future<Output = Result<Vec<WorkItem>>>;

    /// Work items whose matched release was published inside the window.
    fn released_work_items(
        &self,
        repositories: &BTreeSet<Arc<str>>,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
        policy: &ReleasePolicy,
        blacklist: &BTreeSet<WorkItemId>,
    ) -> impl Future<Output = Result<Vec<WorkItem>>>;

    /// Work items merged before the window's end but not yet released by it.
    fn merged_unreleased_work_items(
        &self,
        repositories: &BTreeSet<Arc<str>>,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
        policy: &ReleasePolicy,
        blacklist: &BTreeSet<WorkItemId>,
    ) -> impl Future<Output = Result<Vec<WorkItem>>>;

    fn reviews(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<(WorkItemId, SubEntityId, Review)>>>;

    fn review_comments(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<(WorkItemId, SubEntityId, ReviewComment)>>>;

    fn review_requests(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<(WorkItemId, SubEntityId, ReviewRequest)>>>;

    fn issue_comments(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<(WorkItemId, SubEntityId, IssueComment)>>>;

    fn commits(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<(WorkItemId, SubEntityId, Commit)>>>;

    /// The release each merged item first shipped in, bounded by `horizon`.
    fn releases(
        &self,
        ids: &BTreeSet<WorkItemId>,
        horizon: DateTime<Utc>,
        policy: &ReleasePolicy,
    ) -> impl Future<Output = Result<Vec<(WorkItemId, ReleaseRow)>>>;

    fn labels(&self, ids: &BTreeSet<WorkItemId>) -> impl Future<Output = Result<Vec<(WorkItemId, SubEntityId, LabelRow)>>>;

    fn issue_links(
        &self,
        ids: &BTreeSet<WorkItemId>,
    ) -> impl Future<Output = Result<Vec<(WorkItemId, SubEntityId, IssueLink)>>>;
}
