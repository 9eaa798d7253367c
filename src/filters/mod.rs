//! Pruning an assembled snapshot by participant, label, and issue criteria
//!
//! The engine is pure, synchronous set algebra: each predicate computes the
//! set of work-item ids to drop, and dropping cascades through every
//! sub-entity table via the shared first index level.
//!
//! The filter descriptors ([`LabelFilter`], [`IssueFilter`],
//! [`Participants`]) also carry the *compatibility* relation used by the
//! snapshot cache: a snapshot assembled under a coarser filter can serve a
//! narrower request by pruning instead of re-fetching.

pub mod engine;
mod issue;
mod label;
mod participants;

pub use issue::IssueFilter;
pub use label::LabelFilter;
pub use participants::{Participants, Role};
