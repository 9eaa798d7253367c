//! Lifecycle timestamp extraction
//!
//! For each work item in a pruned snapshot, [`FactsExtractor`] derives the
//! canonical lifecycle record — when work began, when it was first and last
//! reviewed, approved, merged, released — using layered fallback rules over
//! the item's sub-tables. The computation is pure, deterministic, and
//! per-item; internally inconsistent records are rejected as
//! [`ImpossibleWorkItem`] rather than aborting the batch.

mod extract;
mod fallback;
mod record;

pub use extract::{FactsExtractor, ImpossibleReason, ImpossibleWorkItem};
pub use fallback::Fallback;
pub use record::Facts;
