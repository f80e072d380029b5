//! Cache generations.
//!
//! A generation is an independent namespace of request key → captured
//! response. Generations are only ever created or dropped whole; there is no
//! per-entry expiry and no size cap.

use chrono::Utc;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

use crate::config::WorkerConfig;
use crate::net::{Request, Response, ResponseType};
use crate::persist::SqliteStore;
use crate::{Result, WorkerError};

// ==================== Entries ====================

/// A captured request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers in arrival order, repeats kept, values as raw bytes.
    pub headers: Vec<(String, Vec<u8>)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Capture time (ms since epoch).
    pub cached_at: i64,
}

impl CacheEntry {
    /// Snapshot `response` as the answer to `request`. Only GET is storable.
    pub fn capture(request: &Request, response: &Response) -> Result<Self> {
        if !request.is_get() {
            return Err(WorkerError::Cache(format!(
                "{} requests cannot be cached: {}",
                request.method, request.url
            )));
        }

        let headers = response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        Ok(Self {
            url: request.url.to_string(),
            method: request.method.to_string(),
            status: response.status,
            headers,
            body: response.body.to_vec(),
            cached_at: Utc::now().timestamp_millis(),
        })
    }

    /// Rebuild a response served from cache.
    pub fn to_response(&self) -> Result<Response> {
        let url = Url::parse(&self.url)?;
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(value),
            ) {
                headers.append(name, value);
            }
        }
        Ok(Response {
            url,
            status: self.status,
            headers,
            body: self.body.clone().into(),
            response_type: ResponseType::Basic,
            from_cache: true,
        })
    }
}

// ==================== Cache ====================

/// One cache generation.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    name: String,
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up by request; non-GET never matches.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        if !request.is_get() {
            return None;
        }
        self.entries.get(&request.cache_key())
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    pub fn delete(&mut self, request: &Request) -> bool {
        self.entries.remove(&request.cache_key()).is_some()
    }

    /// Request keys.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// All generations present on the device, in creation order.
///
/// Individual writes are serialized by the lock; concurrent writers to the
/// same key resolve last-write-wins.
pub struct CacheStorage {
    generations: RwLock<Vec<Cache>>,
    store: Option<Arc<SqliteStore>>,
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStorage {
    /// In-memory storage.
    pub fn new() -> Self {
        Self {
            generations: RwLock::new(Vec::new()),
            store: None,
        }
    }

    /// Storage backed by a SQLite file; existing generations are reloaded.
    pub fn open_persistent(path: &Path) -> Result<Self> {
        let store = SqliteStore::open(path)?;
        let generations = store.load()?;
        debug!(
            path = %path.display(),
            generations = generations.len(),
            "Restored cache generations"
        );
        Ok(Self {
            generations: RwLock::new(generations),
            store: Some(Arc::new(store)),
        })
    }

    /// Storage as described by `config.persistence`.
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        match config.persistence {
            Some(ref path) => Self::open_persistent(path),
            None => Ok(Self::new()),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    async fn write_through<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&SqliteStore) -> Result<()> + Send + 'static,
    {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| WorkerError::Storage(e.to_string()))?
    }

    /// Open a generation, creating it if absent.
    pub async fn open(&self, name: &str) -> Result<()> {
        let mut generations = self.generations.write().await;
        if generations.iter().any(|c| c.name() == name) {
            return Ok(());
        }
        let owned = name.to_string();
        self.write_through(move |store| store.create_generation(&owned))
            .await?;
        generations.push(Cache::new(name));
        debug!(generation = name, "Created cache generation");
        Ok(())
    }

    pub async fn has(&self, name: &str) -> bool {
        self.generations.read().await.iter().any(|c| c.name() == name)
    }

    /// Generation names, oldest first.
    pub async fn keys(&self) -> Vec<String> {
        self.generations
            .read()
            .await
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Number of entries in a generation.
    pub async fn len(&self, name: &str) -> Option<usize> {
        self.generations
            .read()
            .await
            .iter()
            .find(|c| c.name() == name)
            .map(Cache::len)
    }

    /// Drop a whole generation.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let mut generations = self.generations.write().await;
        let Some(index) = generations.iter().position(|c| c.name() == name) else {
            return Ok(false);
        };
        let owned = name.to_string();
        self.write_through(move |store| store.delete_generation(&owned))
            .await?;
        generations.remove(index);
        Ok(true)
    }

    /// Drop every generation not named in `keep`, under a single write lock.
    ///
    /// Returns the names that were dropped.
    pub async fn retain(&self, keep: &[&str]) -> Result<Vec<String>> {
        let mut generations = self.generations.write().await;
        let doomed: Vec<String> = generations
            .iter()
            .map(|c| c.name().to_string())
            .filter(|name| !keep.contains(&name.as_str()))
            .collect();
        if doomed.is_empty() {
            return Ok(doomed);
        }

        let names = doomed.clone();
        self.write_through(move |store| {
            names
                .iter()
                .try_for_each(|name| store.delete_generation(name))
        })
        .await?;

        generations.retain(|c| keep.contains(&c.name()));
        Ok(doomed)
    }

    /// Store one response in `name`, creating the generation if needed.
    pub async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        self.put_all(name, &[(request.clone(), response.clone())])
            .await
            .map(|_| ())
    }

    /// Store several responses atomically: either all are committed or none.
    pub async fn put_all(&self, name: &str, pairs: &[(Request, Response)]) -> Result<usize> {
        let captured = pairs
            .iter()
            .map(|(req, res)| -> Result<(String, CacheEntry)> {
                Ok((req.cache_key(), CacheEntry::capture(req, res)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut generations = self.generations.write().await;
        let owned = name.to_string();
        let batch = captured.clone();
        self.write_through(move |store| store.put_entries(&owned, &batch))
            .await?;

        let index = match generations.iter().position(|c| c.name() == name) {
            Some(index) => index,
            None => {
                generations.push(Cache::new(name));
                generations.len() - 1
            }
        };
        let count = captured.len();
        for (key, entry) in captured {
            trace!(generation = name, key = %key, "Cached response");
            generations[index].insert(key, entry);
        }
        Ok(count)
    }

    /// First match across all generations, oldest generation first.
    pub async fn match_request(&self, request: &Request) -> Option<Response> {
        let generations = self.generations.read().await;
        let entry = generations.iter().find_map(|c| c.match_request(request))?;
        entry.to_response().ok()
    }

    /// Match within a single generation.
    pub async fn match_in(&self, name: &str, request: &Request) -> Option<Response> {
        let generations = self.generations.read().await;
        let entry = generations
            .iter()
            .find(|c| c.name() == name)?
            .match_request(request)?;
        entry.to_response().ok()
    }
}
