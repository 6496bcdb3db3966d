//! Durable key/value stores for the scan pipeline.
//!
//! Two stores share the same persistence mechanics:
//! - [`CacheStore`]: key -> [`Outcome`] memoization, both variants kept
//! - [`ResultStore`]: key -> payload, `Found` outcomes only
//!
//! Both are loaded once at startup (a missing or corrupt file starts empty),
//! mutated concurrently behind a mutex, and flushed wholesale. Flushes are
//! single-flight per store and write a snapshot taken under the map lock, so
//! the file always reflects one consistent state. Writes go through a temp
//! file and a rename.

use crate::error::ScanError;
use crate::probe::is_valid_payload;
use crate::types::{Outcome, Payload, ResultSet};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWriteExt;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Persisted key -> outcome memoization table.
///
/// Entries are never pruned; they accumulate across runs.
#[derive(Debug)]
pub struct CacheStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, Outcome>>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl CacheStore {
    /// A cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// An empty cache bound to `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::in_memory()
        }
    }

    /// Load the cache from `path`.
    ///
    /// A missing or unparsable file yields an empty cache bound to `path`.
    /// Individual entries that don't decode, are `Unresolved`, or are `Found`
    /// with an invalid payload are dropped.
    pub async fn load<P: Into<PathBuf>>(path: P) -> Self {
        let store = Self::new(path);
        let Some(path) = store.path.as_deref() else {
            return store;
        };
        let Some(raw) = read_json_object(path).await else {
            return store;
        };

        let total = raw.len();
        let mut entries = BTreeMap::new();
        for (key, value) in raw {
            match serde_json::from_value::<Outcome>(value) {
                Ok(Outcome::Found(payload)) if is_valid_payload(&payload) => {
                    entries.insert(key, Outcome::Found(payload));
                }
                Ok(Outcome::NotFound) => {
                    entries.insert(key, Outcome::NotFound);
                }
                _ => {}
            }
        }

        let dropped = total - entries.len();
        if dropped > 0 {
            tracing::warn!(path = %path.display(), dropped, "dropped unusable cache entries");
        }
        tracing::info!(path = %path.display(), entries = entries.len(), "loaded cache");

        *lock(&store.entries) = entries;
        store
    }

    pub fn get(&self, key: &str) -> Option<Outcome> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Record an outcome. `Unresolved` is refused and `false` returned.
    pub fn set(&self, key: &str, outcome: Outcome) -> bool {
        if !outcome.is_cacheable() {
            return false;
        }
        lock(&self.entries).insert(key.to_string(), outcome);
        true
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the whole cache to its file. No-op for in-memory caches.
    pub async fn flush(&self) -> Result<(), ScanError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;

        let (bytes, count) = {
            let entries = lock(&self.entries);
            let bytes = serde_json::to_vec(&*entries)
                .map_err(|e| ScanError::persistence(path.display().to_string(), e.to_string()))?;
            (bytes, entries.len())
        };

        write_atomic(path, &bytes).await?;
        tracing::info!(path = %path.display(), entries = count, "flushed cache");
        Ok(())
    }
}

/// Accumulated `Found` payloads, keyed by domain.
///
/// Write-accumulate only: the pipeline inserts into it and checkpoints it,
/// but never reads it back mid-run.
#[derive(Debug)]
pub struct ResultStore {
    path: Option<PathBuf>,
    results: Mutex<ResultSet>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl ResultStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            results: Mutex::new(ResultSet::new()),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::in_memory()
        }
    }

    /// Load prior results from `path`. Absence or parse failure starts empty.
    pub async fn load<P: Into<PathBuf>>(path: P) -> Self {
        let store = Self::new(path);
        let Some(path) = store.path.as_deref() else {
            return store;
        };
        let Some(raw) = read_json_object(path).await else {
            return store;
        };

        let total = raw.len();
        let results: ResultSet = raw
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Object(payload) if is_valid_payload(&payload) => Some((key, payload)),
                _ => None,
            })
            .collect();

        if results.len() < total {
            tracing::warn!(
                path = %path.display(),
                dropped = total - results.len(),
                "dropped invalid prior results"
            );
        }
        tracing::info!(path = %path.display(), results = results.len(), "loaded prior results");

        *lock(&store.results) = results;
        store
    }

    pub fn insert(&self, key: &str, payload: Payload) {
        lock(&self.results).insert(key.to_string(), payload);
    }

    pub fn len(&self) -> usize {
        lock(&self.results).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current result set.
    pub fn snapshot(&self) -> ResultSet {
        lock(&self.results).clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Overwrite the results file with the current set.
    pub async fn flush(&self) -> Result<(), ScanError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;

        let (bytes, count) = {
            let results = lock(&self.results);
            let bytes = serde_json::to_vec_pretty(&*results)
                .map_err(|e| ScanError::persistence(path.display().to_string(), e.to_string()))?;
            (bytes, results.len())
        };

        write_atomic(path, &bytes).await?;
        tracing::info!(path = %path.display(), results = count, "flushed results");
        Ok(())
    }
}

/// Read a file holding a JSON object. `None` if absent or not an object.
async fn read_json_object(path: &Path) -> Option<serde_json::Map<String, Value>> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read store, starting empty");
            return None;
        }
    };

    match serde_json::from_slice::<Value>(&content) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "store is not a JSON object, starting empty");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not parse store, starting empty");
            None
        }
    }
}

/// Write `data` to `path` through a sibling temp file and a rename.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ScanError> {
    let to_err = |e: std::io::Error| {
        let err = ScanError::from(e);
        if err.is_resource_exhaustion() {
            err
        } else {
            ScanError::persistence(path.display().to_string(), err.to_string())
        }
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(to_err)?;
        }
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("store");
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = tokio::fs::File::create(&temp_path).await.map_err(to_err)?;
    file.write_all(data).await.map_err(to_err)?;
    file.sync_all().await.map_err(to_err)?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await.map_err(to_err)
}
