use chrono::{DateTime, Utc};
use core::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display as StrumDisplay, EnumString};

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<Arc<str>>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

id_type! {
    /// Stable node id of a work item, the first index level of every table.
    WorkItemId
}
id_type! {
    /// Own id of a sub-entity row (review, comment, commit, ...).
    SubEntityId
}
id_type! {
    /// Identity of a user account in the metadata store.
    UserId
}

/// Nulls every timestamp field that exceeds `horizon`.
///
/// Each implementation spells out its fields; there is deliberately no
/// reflective "all datetime columns" pass.
pub trait Truncate {
    fn truncate(&mut self, horizon: DateTime<Utc>);
}

fn clip(field: &mut Option<DateTime<Utc>>, horizon: DateTime<Utc>) {
    if field.is_some_and(|ts| ts > horizon) {
        *field = None;
    }
}

/// A work item (pull request), the root of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub repository: Arc<str>,
    pub number: u64,
    pub author: Option<UserId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merged_by: Option<UserId>,
    pub additions: u64,
    pub deletions: u64,
    pub hidden: bool,
}

impl Truncate for WorkItem {
    fn truncate(&mut self, horizon: DateTime<Utc>) {
        clip(&mut self.created_at, horizon);
        clip(&mut self.updated_at, horizon);
        clip(&mut self.closed_at, horizon);
        clip(&mut self.merged_at, horizon);
    }
}

/// The resolution a review arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
}

/// A submitted review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub submitted_at: Option<DateTime<Utc>>,
    pub user: Option<UserId>,
    pub state: ReviewState,
}

impl Truncate for Review {
    fn truncate(&mut self, horizon: DateTime<Utc>) {
        clip(&mut self.submitted_at, horizon);
    }
}

/// A comment attached to a review thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub created_at: Option<DateTime<Utc>>,
    pub user: Option<UserId>,
}

impl Truncate for ReviewComment {
    fn truncate(&mut self, horizon: DateTime<Utc>) {
        clip(&mut self.created_at, horizon);
    }
}

/// A request for somebody to review the work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub created_at: Option<DateTime<Utc>>,
}

impl Truncate for ReviewRequest {
    fn truncate(&mut self, horizon: DateTime<Utc>) {
        clip(&mut self.created_at, horizon);
    }
}

/// A plain comment on the work item's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    pub created_at: Option<DateTime<Utc>>,
    pub user: Option<UserId>,
}

impl Truncate for IssueComment {
    fn truncate(&mut self, horizon: DateTime<Utc>) {
        clip(&mut self.created_at, horizon);
    }
}

/// A commit belonging to the work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub authored_at: Option<DateTime<Utc>>,
    pub committed_at: Option<DateTime<Utc>>,
    pub author: Option<UserId>,
    pub committer: Option<UserId>,
}

impl Truncate for Commit {
    fn truncate(&mut self, horizon: DateTime<Utc>) {
        clip(&mut self.authored_at, horizon);
        clip(&mut self.committed_at, horizon);
    }
}

/// The release a merged work item first shipped in, one row per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRow {
    pub published_at: Option<DateTime<Utc>>,
    pub published_by: Option<UserId>,
    pub url: Option<String>,
    /// The matched release no longer contains the item's commits because a
    /// force push rewrote history.
    pub force_push_dropped: bool,
}

impl Truncate for ReleaseRow {
    fn truncate(&mut self, horizon: DateTime<Utc>) {
        clip(&mut self.published_at, horizon);
    }
}

/// A link from the work item to an issue-tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLink {
    pub issue_key: Arc<str>,
    pub labels: Vec<Arc<str>>,
    pub components: Vec<Arc<str>>,
    pub epic_key: Option<Arc<str>>,
    pub issue_type: Option<Arc<str>>,
}

impl Truncate for IssueLink {
    fn truncate(&mut self, _horizon: DateTime<Utc>) {}
}

/// A label carried by the work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRow {
    pub name: Arc<str>,
}

impl Truncate for LabelRow {
    fn truncate(&mut self, _horizon: DateTime<Utc>) {}
}
