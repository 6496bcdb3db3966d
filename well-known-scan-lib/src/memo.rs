//! Memoizing wrapper around a [`Prober`].
//!
//! A cache hit short-circuits the network call. A miss probes, records the
//! outcome (negative results included) and returns it. Concurrent misses for
//! the same key share a single probe.

use crate::error::ScanError;
use crate::probe::Prober;
use crate::store::CacheStore;
use crate::types::Outcome;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

type InflightMap = Mutex<HashMap<String, Arc<OnceCell<Outcome>>>>;

/// Resolves keys through a [`CacheStore`] before falling back to a prober.
pub struct MemoizedProber<P> {
    prober: P,
    store: Arc<CacheStore>,
    inflight: InflightMap,
    cache_hits: AtomicU64,
    probes: AtomicU64,
    shared: AtomicU64,
}

impl<P: Prober> MemoizedProber<P> {
    pub fn new(prober: P, store: Arc<CacheStore>) -> Self {
        Self {
            prober,
            store,
            inflight: Mutex::new(HashMap::new()),
            cache_hits: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            shared: AtomicU64::new(0),
        }
    }

    /// Resolve `key`, probing only if no outcome is cached.
    ///
    /// The outcome is stored before this returns. Errors are not cached.
    pub async fn resolve(&self, key: &str) -> Result<Outcome, ScanError> {
        if let Some(outcome) = self.store.get(key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(outcome);
        }

        let cell = self.inflight_cell(key);
        let _guard = InflightGuard {
            map: &self.inflight,
            key,
            cell: cell.clone(),
        };

        let initialized_here = AtomicBool::new(false);
        let outcome = cell
            .get_or_try_init(|| async {
                initialized_here.store(true, Ordering::Relaxed);

                // Another resolution may have finished between the first
                // lookup and claiming the cell.
                if let Some(outcome) = self.store.get(key) {
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(outcome);
                }

                self.probes.fetch_add(1, Ordering::Relaxed);
                let outcome = self.prober.probe(key).await?;
                if !self.store.set(key, outcome.clone()) {
                    tracing::debug!(key, "outcome not cached");
                }
                Ok::<_, ScanError>(outcome)
            })
            .await?;

        if !initialized_here.load(Ordering::Relaxed) {
            self.shared.fetch_add(1, Ordering::Relaxed);
        }

        Ok(outcome.clone())
    }

    fn inflight_cell(&self, key: &str) -> Arc<OnceCell<Outcome>> {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Resolutions answered from the cache.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Resolutions that invoked the prober.
    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    /// Resolutions that piggy-backed on a concurrent probe of the same key.
    pub fn shared(&self) -> u64 {
        self.shared.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }
}

/// Removes a key's in-flight cell once its owner is done, even on error or
/// unwind. Leaves a newer cell for the same key alone.
struct InflightGuard<'a> {
    map: &'a InflightMap,
    key: &'a str,
    cell: Arc<OnceCell<Outcome>>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if map
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.cell))
        {
            map.remove(self.key);
        }
    }
}
