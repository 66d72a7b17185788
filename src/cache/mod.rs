//! Named cache store for offline support.
//!
//! A store holds named partitions, each mapping a request identity
//! (method + origin-relative URL) to the last response stored for it.
//! There is no eviction: whole partitions are dropped when the worker
//! version that owns them is replaced.

mod storage;
mod traits;

pub use storage::{MemoryStore, SqliteStore};
pub use traits::{CacheStore, CachedResponse, RequestKey, StoredResponse};
