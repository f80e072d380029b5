//! SQLite persistence for cache generations.
//!
//! Generations outlive the worker process; this store is the on-disk copy
//! that [`CacheStorage`](crate::CacheStorage) writes through to and reloads
//! from on startup.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{Cache, CacheEntry};
use crate::{Result, WorkerError};

/// Database schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// On-disk cache generations.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| WorkerError::Storage(format!("Failed to open cache database: {}", e)))?;
        info!(path = %path.display(), "Opened cache database");
        Self::init(conn)
    }

    #[cfg(test)]
    fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .optional()?
            .unwrap_or(0);
        if version < SCHEMA_VERSION {
            create_schema_v1(&conn)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| WorkerError::Storage("cache database lock poisoned".to_string()))?;
        f(&mut conn)
    }

    /// Load every generation, oldest first.
    pub fn load(&self) -> Result<Vec<Cache>> {
        self.with_conn(|conn| {
            let mut caches: Vec<Cache> = {
                let mut stmt = conn.prepare("SELECT name FROM cache_generations ORDER BY id")?;
                let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
                names
                    .collect::<rusqlite::Result<Vec<_>>>()?
                    .into_iter()
                    .map(|name| Cache::new(&name))
                    .collect()
            };

            let mut stmt = conn.prepare(
                "SELECT generation, key, method, url, status, headers, body, cached_at
                 FROM cache_entries ORDER BY generation, cached_at",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u16>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Vec<u8>>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })?;

            for row in rows {
                let (generation, key, method, url, status, headers, body, cached_at) = row?;
                let headers: Vec<(String, Vec<u8>)> = serde_json::from_str(&headers)?;
                let entry = CacheEntry {
                    url,
                    method,
                    status,
                    headers,
                    body,
                    cached_at,
                };
                if let Some(cache) = caches.iter_mut().find(|c| c.name() == generation) {
                    cache.insert(key, entry);
                }
            }

            debug!(generations = caches.len(), "Loaded cache generations");
            Ok(caches)
        })
    }

    pub fn create_generation(&self, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO cache_generations (name, created_at) VALUES (?, ?)",
                params![name, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    /// Upsert entries into a generation in one transaction.
    pub fn put_entries(&self, generation: &str, entries: &[(String, CacheEntry)]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO cache_generations (name, created_at) VALUES (?, ?)",
                params![generation, Utc::now().timestamp_millis()],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO cache_entries
                     (generation, key, method, url, status, headers, body, cached_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )?;
                for (key, entry) in entries {
                    stmt.execute(params![
                        generation,
                        key,
                        entry.method,
                        entry.url,
                        entry.status,
                        serde_json::to_string(&entry.headers)?,
                        entry.body,
                        entry.cached_at,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Drop a whole generation.
    pub fn delete_generation(&self, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM cache_entries WHERE generation = ?", [name])?;
            tx.execute("DELETE FROM cache_generations WHERE name = ?", [name])?;
            tx.commit()?;
            Ok(())
        })
    }
}

fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS cache_generations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cache_entries (
            generation TEXT NOT NULL REFERENCES cache_generations(name) ON DELETE CASCADE,
            key TEXT NOT NULL,
            method TEXT NOT NULL,
            url TEXT NOT NULL,
            status INTEGER NOT NULL,
            headers TEXT NOT NULL,
            body BLOB NOT NULL,
            cached_at INTEGER NOT NULL,
            PRIMARY KEY (generation, key)
        );

        PRAGMA user_version = 1;
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), b"text/html".to_vec())],
            body: b"<html></html>".to_vec(),
            cached_at: 1,
        }
    }

    #[test]
    fn test_put_and_load() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_generation("static-v1").unwrap();
        store
            .put_entries(
                "dynamic-v1",
                &[("GET https://a.test/x".to_string(), entry("https://a.test/x"))],
            )
            .unwrap();

        let caches = store.load().unwrap();
        let names: Vec<_> = caches.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["static-v1", "dynamic-v1"]);
        assert_eq!(caches[1].len(), 1);

        let loaded = caches[1].get("GET https://a.test/x").unwrap();
        assert_eq!(
            loaded.headers,
            vec![("content-type".to_string(), b"text/html".to_vec())]
        );
        assert_eq!(loaded.body, b"<html></html>");
    }

    #[test]
    fn test_put_replaces_same_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        let key = "GET https://a.test/x".to_string();
        store.put_entries("d", &[(key.clone(), entry("https://a.test/x"))]).unwrap();
        let mut newer = entry("https://a.test/x");
        newer.body = b"v2".to_vec();
        store.put_entries("d", &[(key.clone(), newer)]).unwrap();

        let caches = store.load().unwrap();
        assert_eq!(caches[0].len(), 1);
        assert_eq!(caches[0].get(&key).unwrap().body, b"v2");
    }

    #[test]
    fn test_delete_generation() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put_entries("old", &[("k".to_string(), entry("https://a.test/x"))])
            .unwrap();
        store.create_generation("new").unwrap();
        store.delete_generation("old").unwrap();

        let caches = store.load().unwrap();
        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].name(), "new");
    }

    #[test]
    fn test_reopen_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caches.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .put_entries("static-v1", &[("k".to_string(), entry("https://a.test/"))])
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let caches = store.load().unwrap();
        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].len(), 1);
    }
}
