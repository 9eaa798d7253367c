//! Snapshot assembly
//!
//! The fan-out/fan-in pipeline that turns a repository set, a time window,
//! and a release policy into one internally consistent [`Snapshot`]. Item
//! queries and sub-entity fetches run concurrently, heaviest first, and any
//! failure aborts the whole assembly — partial snapshots are never
//! returned.
//!
//! Assembled snapshots are memoized through the cache layer at date-bucket
//! granularity; a cached snapshot built under coarser filters serves
//! narrower requests by pruning instead of re-fetching.
//!
//! [`Snapshot`]: crate::model::Snapshot

mod assembler;
mod store;
mod window;

pub use assembler::{AssemblyRequest, assemble};
pub use store::{Dialect, MetadataStore, WorkItemQuery};
pub use window::coarsen_window;
