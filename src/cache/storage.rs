//! Cache store implementations: SQLite on disk and an in-memory map.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use super::traits::{CacheStore, CachedResponse, RequestKey, StoredResponse};

/// SQLite-based cache store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open the store at an explicit path, creating parent directories.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database. Contents vanish with the store.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("pms-gateway").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named partitions; rowid gives creation order
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One response snapshot per (partition, request)
CREATE TABLE IF NOT EXISTS entries (
    partition TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, request_hash),
    FOREIGN KEY (partition) REFERENCES partitions(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_hash ON entries(request_hash);
"#;

fn ensure_partition(conn: &Connection, partition: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
      params![partition],
    )
    .map_err(|e| eyre!("Failed to create partition {}: {}", partition, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  partition: &str,
  key: &RequestKey,
  response: &StoredResponse,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries (partition, request_hash, method, url, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        partition,
        key.cache_hash(),
        key.method,
        key.url,
        response.status,
        headers,
        response.body.as_ref()
      ],
    )
    .map_err(|e| eyre!("Failed to store {} in {}: {}", key, partition, e))?;

  Ok(())
}

type EntryRow = (u16, String, Vec<u8>, String);

fn row_to_cached(row: EntryRow) -> Result<CachedResponse> {
  let (status, headers, body, cached_at) = row;
  let headers: Vec<(String, String)> =
    serde_json::from_str(&headers).map_err(|e| eyre!("Failed to parse cached headers: {}", e))?;

  Ok(CachedResponse {
    response: StoredResponse {
      status,
      headers,
      body: Bytes::from(body),
    },
    cached_at: parse_datetime(&cached_at)?,
  })
}

impl CacheStore for SqliteStore {
  fn open(&self, partition: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_partition(&conn, partition)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition name: {}", e))?;

    Ok(names)
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let conn = self.lock()?;

    let deleted = conn
      .execute("DELETE FROM partitions WHERE name = ?", params![partition])
      .map_err(|e| eyre!("Failed to delete partition {}: {}", partition, e))?;

    Ok(deleted > 0)
  }

  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<EntryRow> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE partition = ? AND request_hash = ?",
        params![partition, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    row.map(row_to_cached).transpose()
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<EntryRow> = conn
      .query_row(
        "SELECT e.status, e.headers, e.body, e.cached_at FROM entries e
         INNER JOIN partitions p ON p.name = e.partition
         WHERE e.request_hash = ?
         ORDER BY p.rowid
         LIMIT 1",
        params![key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    row.map(row_to_cached).transpose()
  }

  fn put(&self, partition: &str, key: &RequestKey, response: &StoredResponse) -> Result<()> {
    let conn = self.lock()?;
    ensure_partition(&conn, partition)?;
    insert_entry(&conn, partition, key, response)
  }

  fn put_all(&self, partition: &str, entries: &[(RequestKey, StoredResponse)]) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_partition(&tx, partition)?;
    for (key, response) in entries {
      insert_entry(&tx, partition, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

// Vec keeps partitions in creation order
type Partitions = Vec<(String, HashMap<RequestKey, CachedResponse>)>;

/// Cache store kept entirely in process memory.
///
/// Used with `--ephemeral` and as the test double for the gateway.
#[derive(Default)]
pub struct MemoryStore {
  partitions: RwLock<Partitions>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Partitions>> {
    self
      .partitions
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Partitions>> {
    self
      .partitions
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn partition_mut<'a>(
  partitions: &'a mut Partitions,
  name: &str,
) -> &'a mut HashMap<RequestKey, CachedResponse> {
  let idx = match partitions.iter().position(|(n, _)| n == name) {
    Some(idx) => idx,
    None => {
      partitions.push((name.to_string(), HashMap::new()));
      partitions.len() - 1
    }
  };
  &mut partitions[idx].1
}

impl CacheStore for MemoryStore {
  fn open(&self, partition: &str) -> Result<()> {
    let mut partitions = self.write()?;
    partition_mut(&mut partitions, partition);
    Ok(())
  }

  fn partitions(&self) -> Result<Vec<String>> {
    Ok(self.read()?.iter().map(|(n, _)| n.clone()).collect())
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let mut partitions = self.write()?;
    let before = partitions.len();
    partitions.retain(|(n, _)| n != partition);
    Ok(partitions.len() != before)
  }

  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    Ok(
      self
        .read()?
        .iter()
        .find(|(n, _)| n == partition)
        .and_then(|(_, entries)| entries.get(key).cloned()),
    )
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    Ok(
      self
        .read()?
        .iter()
        .find_map(|(_, entries)| entries.get(key).cloned()),
    )
  }

  fn put(&self, partition: &str, key: &RequestKey, response: &StoredResponse) -> Result<()> {
    let mut partitions = self.write()?;
    partition_mut(&mut partitions, partition).insert(
      key.clone(),
      CachedResponse {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn put_all(&self, partition: &str, entries: &[(RequestKey, StoredResponse)]) -> Result<()> {
    // Single write guard, nothing can fail midway
    let mut partitions = self.write()?;
    let target = partition_mut(&mut partitions, partition);
    let now = Utc::now();
    for (key, response) in entries {
      target.insert(
        key.clone(),
        CachedResponse {
          response: response.clone(),
          cached_at: now,
        },
      );
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(body: &'static str) -> StoredResponse {
    StoredResponse {
      status: 200,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: Bytes::from_static(body.as_bytes()),
    }
  }

  fn stores() -> Vec<Box<dyn CacheStore>> {
    vec![
      Box::new(SqliteStore::open_in_memory().unwrap()),
      Box::new(MemoryStore::new()),
    ]
  }

  #[test]
  fn test_put_then_get() {
    for store in stores() {
      let key = RequestKey::get("/api/rooms");
      store.put("api-v1", &key, &response("[1]")).unwrap();

      let cached = store.get("api-v1", &key).unwrap().unwrap();
      assert_eq!(cached.response, response("[1]"));
      assert!(store.get("static-v1", &key).unwrap().is_none());
    }
  }

  #[test]
  fn test_put_overwrites() {
    for store in stores() {
      let key = RequestKey::get("/api/rooms");
      store.put("api-v1", &key, &response("old")).unwrap();
      store.put("api-v1", &key, &response("new")).unwrap();

      let cached = store.get("api-v1", &key).unwrap().unwrap();
      assert_eq!(cached.response.body, Bytes::from_static(b"new"));
    }
  }

  #[test]
  fn test_method_is_part_of_key() {
    for store in stores() {
      let get = RequestKey::get("/api/rooms");
      let post = RequestKey::new(&axum::http::Method::POST, "/api/rooms");
      store.put("api-v1", &get, &response("get")).unwrap();

      assert!(store.get("api-v1", &post).unwrap().is_none());
    }
  }

  #[test]
  fn test_partitions_in_creation_order() {
    for store in stores() {
      store.open("b").unwrap();
      store.open("a").unwrap();
      store.open("b").unwrap();
      assert_eq!(store.partitions().unwrap(), vec!["b", "a"]);
    }
  }

  #[test]
  fn test_delete_partition_drops_entries() {
    for store in stores() {
      let key = RequestKey::get("/");
      store.put("static-v0", &key, &response("old")).unwrap();

      assert!(store.delete_partition("static-v0").unwrap());
      assert!(!store.delete_partition("static-v0").unwrap());
      assert!(store.match_any(&key).unwrap().is_none());
      assert!(store.partitions().unwrap().is_empty());
    }
  }

  #[test]
  fn test_match_any_prefers_oldest_partition() {
    for store in stores() {
      let key = RequestKey::get("/offline.html");
      store.put("static-v1", &key, &response("static")).unwrap();
      store.put("api-v1", &key, &response("api")).unwrap();

      let cached = store.match_any(&key).unwrap().unwrap();
      assert_eq!(cached.response.body, Bytes::from_static(b"static"));
    }
  }

  #[test]
  fn test_put_all_writes_every_entry() {
    for store in stores() {
      let entries = vec![
        (RequestKey::get("/"), response("root")),
        (RequestKey::get("/manifest.json"), response("{}")),
      ];
      store.put_all("static-v1", &entries).unwrap();

      for (key, expected) in &entries {
        let cached = store.get("static-v1", key).unwrap().unwrap();
        assert_eq!(&cached.response, expected);
      }
    }
  }

  #[test]
  fn test_sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    let key = RequestKey::get("/api/guests");

    {
      let store = SqliteStore::open_at(&path).unwrap();
      store.put("api-v1", &key, &response("[]")).unwrap();
    }

    let store = SqliteStore::open_at(&path).unwrap();
    assert!(store.get("api-v1", &key).unwrap().is_some());
    assert_eq!(store.partitions().unwrap(), vec!["api-v1"]);
  }
}
