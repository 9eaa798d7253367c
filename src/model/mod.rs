//! Snapshot tables and row types
//!
//! A [`Snapshot`] is a bundle of tables describing every work item in a
//! repository set together with its linked sub-entities, internally
//! consistent "as of" the snapshot's horizon. Rows are plain serde structs;
//! sub-entity tables are keyed by `(work item id, sub-entity id)` so that
//! per-item selection and cascade removal stay cheap.
//!
//! [`Truncate`] implementations enumerate each row type's timestamp fields
//! explicitly; truncating a snapshot nulls everything past the horizon so
//! that no future information can leak into past computations.

mod rows;
mod snapshot;
mod table;

pub use rows::{
    Commit, IssueComment, IssueLink, LabelRow, ReleaseRow, Review, ReviewComment, ReviewRequest, ReviewState,
    SubEntityId, Truncate, UserId, WorkItem, WorkItemId,
};
pub use snapshot::{Snapshot, WorkItemView};
pub use table::Table;
