//! Count-based checkpointing of the result set and cache.

use crate::error::ScanError;
use crate::store::{CacheStore, ResultStore};
use std::sync::Arc;

/// How often each store is flushed, in processed keys. Zero disables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    pub results_every: u64,
    pub cache_every: u64,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            results_every: 100,
            cache_every: 2500,
        }
    }
}

/// Flushes the stores on a processed-count cadence, at the end of a run, and
/// on demand after a per-key failure.
///
/// The two stores flush independently; there is no cross-store atomicity.
pub struct CheckpointWriter {
    results: Arc<ResultStore>,
    cache: Arc<CacheStore>,
    policy: CheckpointPolicy,
}

impl CheckpointWriter {
    pub fn new(results: Arc<ResultStore>, cache: Arc<CacheStore>, policy: CheckpointPolicy) -> Self {
        Self {
            results,
            cache,
            policy,
        }
    }

    /// Called with the processed count right after a key settles.
    ///
    /// `processed` is the post-increment count, so every value is seen once
    /// and the Nth completed key triggers the Nth-multiple flush. Failures
    /// are logged; the run goes on.
    pub async fn maybe_checkpoint(&self, processed: u64) {
        if processed == 0 {
            return;
        }

        if is_due(processed, self.policy.results_every) {
            if let Err(e) = self.results.flush().await {
                tracing::error!(processed, error = %e, "results checkpoint failed");
            }
        }

        if is_due(processed, self.policy.cache_every) {
            if let Err(e) = self.cache.flush().await {
                tracing::error!(processed, error = %e, "cache checkpoint failed");
            }
        }
    }

    /// Flush both stores, attempting each even if the other fails.
    ///
    /// Returns the first error encountered.
    pub async fn flush_all(&self) -> Result<(), ScanError> {
        let results = self.results.flush().await;
        let cache = self.cache.flush().await;

        if let Err(e) = &results {
            tracing::error!(error = %e, "results flush failed");
        }
        if let Err(e) = &cache {
            tracing::error!(error = %e, "cache flush failed");
        }

        results.and(cache)
    }

    pub fn policy(&self) -> CheckpointPolicy {
        self.policy
    }
}

fn is_due(processed: u64, every: u64) -> bool {
    every != 0 && processed % every == 0
}
