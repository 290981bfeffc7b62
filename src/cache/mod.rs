//! Generic tagged caching layer between callers and the network.
//!
//! This module provides a resource-agnostic caching mechanism that:
//! - Caches query results as JSON under an (endpoint, key) pair
//! - Files each result under the tags it provides
//! - Resets every entry whose tags a mutation invalidates
//! - Deduplicates concurrent fetches of the same key
//! - Notifies subscribers of every state transition

mod layer;
mod storage;
mod tags;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, MemoryStorage, NoopStorage};
pub use tags::{ResourceKind, Tag};
pub use traits::{CacheKey, CacheResult, CacheSource};
