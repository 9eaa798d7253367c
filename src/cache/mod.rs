//! Memoized fetching against an external key/value object cache
//!
//! This module turns expensive, multi-source fetch operations into
//! cache-backed ones. The pieces:
//!
//! - [`CacheKey`]: deterministic, fixed-length, content-hashed keys safe for
//!   any backing store's key constraints
//! - [`ObjectCache`]: the get/set/touch boundary to the external store, with
//!   [`MemoryCache`] as the in-process implementation
//! - [`Codec`]: pluggable payload serialization, defaulting to [`Json`]
//! - [`Memo`]: the memoization protocol itself, including the postprocess
//!   hook that lets callers narrow or reject a cached value based on the
//!   current call's arguments
//!
//! Caching here is strictly a performance optimization: every cache or
//! codec failure is logged and degrades to a live fetch, never propagated.

mod codec;
mod key;
mod memo;
mod store;

pub use codec::{Codec, Json};
pub use key::CacheKey;
pub use memo::{Memo, Postprocess};
pub use store::{MemoryCache, ObjectCache};
