//! Core traits and types for the cache store.

use axum::http::Method;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use sha2::{Digest, Sha256};

/// Identity of a cached request: method plus origin-relative URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  /// Path and query, e.g. `/api/rooms?floor=2`
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &Method, url: impl Into<String>) -> Self {
    Self {
      method: method.as_str().to_string(),
      url: url.into(),
    }
  }

  /// Shorthand for a `GET` key, used for pre-cached paths and fallback pages.
  pub fn get(url: impl Into<String>) -> Self {
    Self::new(&Method::GET, url)
  }

  /// Stable, fixed-length hash used as the storage key.
  pub fn cache_hash(&self) -> String {
    let input = format!("{} {}", self.method, self.url);

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A response snapshot as held in a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Bytes,
}

/// A stored response together with when it was written.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: StoredResponse,
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache store backends.
///
/// A store holds any number of named partitions. Writing into a partition
/// that does not exist yet creates it.
pub trait CacheStore: Send + Sync {
  /// Create the partition if it does not exist.
  fn open(&self, partition: &str) -> Result<()>;

  /// Names of all existing partitions, oldest first.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Delete a partition and everything in it. Returns whether it existed.
  fn delete_partition(&self, partition: &str) -> Result<bool>;

  /// Look up a request in one partition.
  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Look up a request across all partitions, oldest partition first.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store (or overwrite) a single response.
  fn put(&self, partition: &str, key: &RequestKey, response: &StoredResponse) -> Result<()>;

  /// Store a batch of responses atomically: either all are written or none.
  fn put_all(&self, partition: &str, entries: &[(RequestKey, StoredResponse)]) -> Result<()>;
}
