//! Core data types for well-known document discovery.
//!
//! This module defines the main data structures used throughout the library:
//! probe outcomes, the result set, run configuration and run reports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// A validated well-known document body.
///
/// Beyond the two required fields the schema is open-ended, so the body is
/// kept as a JSON object rather than a fixed struct.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Domain -> payload, holding only `Found` outcomes.
pub type ResultSet = BTreeMap<String, Payload>;

/// Default location of the document on each candidate host.
pub const DEFAULT_URL_TEMPLATE: &str = "https://{domain}/.well-known/ai-plugin.json";

/// Placeholder replaced by the key when building probe URLs.
pub const DOMAIN_PLACEHOLDER: &str = "{domain}";

/// Resolved classification for a key.
///
/// Serialized form (cache file):
/// `{"status":"found","payload":{..}}` or `{"status":"not_found"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum Outcome {
    /// Document present and valid
    Found(Payload),

    /// Document absent, marked 404, or failing validation
    NotFound,

    /// No usable answer yet. Never written to the cache.
    Unresolved,
}

impl Outcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Outcome::Found(_))
    }

    /// Whether this outcome may be stored in the cache.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Outcome::Unresolved)
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Outcome::Found(payload) => Some(payload),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Found(_) => write!(f, "found"),
            Outcome::NotFound => write!(f, "not found"),
            Outcome::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// Configuration options for a scan run.
///
/// Defaults: 64 workers, 3 attempts of 10
/// seconds each, results checkpointed every 100 keys and the cache every 2500.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum number of concurrently in-flight resolutions
    /// Default: 64, Range: 1-1024
    pub concurrency: usize,

    /// Wall-clock budget of a single HTTP attempt
    /// Default: 10 seconds
    pub attempt_timeout: Duration,

    /// Total attempts per probe, first try included
    /// Default: 3
    pub max_attempts: u32,

    /// Base delay before a retry, doubled on each further attempt
    /// Default: 250ms
    pub retry_backoff: Duration,

    /// URL template, `{domain}` is replaced by the key
    pub url_template: String,

    /// Flush the result set every N processed keys (0 disables)
    pub results_every: u64,

    /// Flush the cache every N processed keys (0 disables)
    pub cache_every: u64,

    /// Where the result set is loaded from and flushed to
    pub results_path: PathBuf,

    /// Where the cache is loaded from and flushed to
    pub cache_path: PathBuf,

    /// Cache exhausted transient failures as `NotFound`.
    /// When false they stay `Unresolved` and are retried by the next run.
    /// Default: true
    pub cache_transient_failures: bool,

    /// Zero-based CSV field holding the domain
    /// Default: 1
    pub column: usize,

    /// Only scan the first N candidates
    pub limit: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 64,
            attempt_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            results_every: 100,
            cache_every: 2500,
            results_path: PathBuf::from("ai-plugins.json"),
            cache_path: PathBuf::from("well-known-ai-plugins-by-domain.cache.json"),
            cache_transient_failures: true,
            column: 1,
            limit: None,
        }
    }
}

impl ScanConfig {
    /// Set worker count. Capped at 1024 to keep descriptor usage sane.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, 1024);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_url_template<S: Into<String>>(mut self, template: S) -> Self {
        self.url_template = template.into();
        self
    }

    pub fn with_checkpoint_intervals(mut self, results_every: u64, cache_every: u64) -> Self {
        self.results_every = results_every;
        self.cache_every = cache_every;
        self
    }

    pub fn with_results_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.results_path = path.into();
        self
    }

    pub fn with_cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_path = path.into();
        self
    }

    pub fn with_cache_transient_failures(mut self, enabled: bool) -> Self {
        self.cache_transient_failures = enabled;
        self
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = column;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// Counters collected by the worker pool for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Keys handed to a worker
    pub dispatched: u64,
    /// Keys whose resolution settled (success or isolated failure)
    pub completed: u64,
    /// Keys that resolved to `Found` during this run
    pub found: u64,
    /// Keys whose resolution failed and was isolated
    pub failed: u64,
    /// Whether dispatch stopped before the input was exhausted
    pub cancelled: bool,
}

/// Everything a caller needs after a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: ScanSummary,
    /// Final result set, prior results included
    pub results: ResultSet,
    /// Resolutions answered from the cache
    pub cache_hits: u64,
    /// Resolutions that went to the network
    pub probes: u64,
    /// Cache size at the end of the run
    pub cache_entries: usize,
    pub elapsed: Duration,
}
