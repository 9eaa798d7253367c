//! Core library for pr-loom
//!
//! pr-loom reconstructs the historical lifecycle of software-development
//! work items (pull requests and their reviews, comments, commits, labels,
//! and releases) as of an arbitrary point in time, and exposes that
//! reconstruction for metric computation.
//!
//! # Module Organization
//!
//! - [`cache`]: Memoized-fetch protocol over an external object cache
//! - [`model`]: Snapshot tables and row types
//! - [`assembly`]: Fan-out/fan-in snapshot assembly against the metadata store
//! - [`filters`]: Set-algebra pruning by participants, labels, and issue traits
//! - [`facts`]: Lifecycle timestamp extraction per work item
//! - [`config`]: External configuration (cache TTLs, bots, release policy)

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod assembly;
pub mod cache;
pub mod config;
pub mod facts;
pub mod filters;
mod miner;
pub mod model;

pub use miner::Miner;
