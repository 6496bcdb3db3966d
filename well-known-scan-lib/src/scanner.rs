//! Run coordinator.
//!
//! A [`Scanner`] wires the stores, the memoizing prober, the checkpoint
//! writer and the worker pool together for one pass over a candidate list.

use crate::checkpoint::{CheckpointPolicy, CheckpointWriter};
use crate::concurrent::{CancelHandle, ConcurrentProcessor, Progress};
use crate::error::ScanError;
use crate::input::read_candidates;
use crate::memo::MemoizedProber;
use crate::probe::{HttpProber, Prober};
use crate::store::{CacheStore, ResultStore};
use crate::types::{RunReport, ScanConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Discovers well-known documents across a list of domains.
///
/// Prior results and cached outcomes are loaded from the configured paths at
/// the start of every run, so re-running over the same input only probes the
/// keys that were never resolved.
///
/// # Example
///
/// ```rust,no_run
/// use well_known_scan_lib::{ScanConfig, Scanner};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let scanner = Scanner::new(ScanConfig::default())?;
///     let report = scanner.run(&["openai.com".to_string()]).await?;
///     println!("found {} plugins", report.results.len());
///     Ok(())
/// }
/// ```
pub struct Scanner<P = HttpProber> {
    config: ScanConfig,
    prober: Arc<P>,
    progress: Arc<Progress>,
    cancel: CancelHandle,
}

impl Scanner<HttpProber> {
    /// Create a scanner probing over HTTP.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        let prober = HttpProber::with_config(&config)?;
        Ok(Self::with_prober(config, prober))
    }
}

impl<P: Prober> Scanner<P> {
    /// Create a scanner around any prober.
    pub fn with_prober(config: ScanConfig, prober: P) -> Self {
        Self {
            config,
            prober: Arc::new(prober),
            progress: Arc::new(Progress::new()),
            cancel: CancelHandle::new(),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Live counters for the current run.
    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Handle that stops dispatch of further keys. Once cancelled, later
    /// runs on this scanner dispatch nothing.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Resolve every key and persist what was learned.
    ///
    /// Both stores are flushed when the pool finishes, whether or not it
    /// returned an error.
    ///
    /// # Errors
    ///
    /// Returns `ScanError::ResourceExhausted` if the pool stopped early, or
    /// `ScanError::Persistence` if the final flush failed.
    pub async fn run(&self, keys: &[String]) -> Result<RunReport, ScanError> {
        let started = Instant::now();

        let results = Arc::new(ResultStore::load(self.config.results_path.clone()).await);
        let cache = Arc::new(CacheStore::load(self.config.cache_path.clone()).await);
        tracing::info!(
            prior_results = results.len(),
            cached = cache.len(),
            "loaded stores"
        );

        let resolver = MemoizedProber::new(self.prober.clone(), cache.clone());
        let checkpoints = CheckpointWriter::new(
            results.clone(),
            cache.clone(),
            CheckpointPolicy {
                results_every: self.config.results_every,
                cache_every: self.config.cache_every,
            },
        );
        let processor = ConcurrentProcessor::new(self.config.concurrency)
            .with_progress(self.progress.clone())
            .with_cancel_handle(self.cancel.clone());

        let scanned = processor.run(keys, &resolver, &results, &checkpoints).await;
        let flushed = checkpoints.flush_all().await;

        let summary = scanned?;
        flushed?;

        let report = RunReport {
            summary,
            results: results.snapshot(),
            cache_hits: resolver.cache_hits(),
            probes: resolver.probes(),
            cache_entries: cache.len(),
            elapsed: started.elapsed(),
        };

        tracing::info!(
            plugins = report.results.len(),
            probes = report.probes,
            cache_hits = report.cache_hits,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );

        Ok(report)
    }

    /// Read candidates from a CSV file using the configured column and limit,
    /// then run over them.
    pub async fn run_file<Q: AsRef<Path>>(&self, path: Q) -> Result<RunReport, ScanError> {
        let candidates = read_candidates(path, self.config.column, self.config.limit)?;
        self.run(&candidates.keys).await
    }
}
