//! Resolution of path specification chains into open handles.
//!
//! - [`Resolver`]: normalizes mounts, consults the caches, dispatches to helpers
//! - [`HelperRegistry`] / [`ResolverHelper`]: per-format open routines
//! - [`ObjectCache`]: reference-counted, LRU-bounded handle cache

#[cfg(feature = "batch")]
mod batch;
mod cache;
mod helper;
mod resolve;

pub use cache::{CacheStats, Cached, ObjectCache};
pub use helper::{FactoryFn, HelperRegistry, ResolverHelper};
pub use resolve::{global, Resolver};
