//! # Well-Known Scan Library
//!
//! Discovers `/.well-known/ai-plugin.json` documents across large domain
//! lists with bounded concurrency, a persistent memoizing cache and periodic
//! checkpoints, so an interrupted run can be resumed without re-probing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use well_known_scan_lib::{ScanConfig, Scanner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig::default().with_concurrency(32);
//!     let scanner = Scanner::new(config)?;
//!     let report = scanner.run_file("top-1m.csv").await?;
//!
//!     println!("found {} plugins", report.results.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Retrying probe**: per-attempt timeout, exponential backoff, document validation
//! - **Memoization**: negative outcomes cached too, concurrent misses deduplicated
//! - **Checkpoints**: results and cache flushed atomically on a processed-key cadence
//! - **Failure isolation**: one bad domain never stops the run

pub use checkpoint::{CheckpointPolicy, CheckpointWriter};
pub use concurrent::{
    CancelHandle, ConcurrentProcessor, Progress, ProgressSnapshot, DEFAULT_CONCURRENCY,
};
pub use config::{
    apply_env_config, apply_file_config, load_env_config, merge_configs, validate_concurrency,
    validate_scan_config, validate_url_template, ConfigManager, EnvConfig, FileConfig,
    PathsConfig, ScanDefaults,
};
pub use error::ScanError;
pub use input::{parse_candidates, read_candidates, CandidateList};
pub use memo::MemoizedProber;
pub use probe::{classify_body, is_valid_payload, validate_document, HttpProber, Prober};
pub use scanner::Scanner;
pub use store::{CacheStore, ResultStore};
pub use types::{
    Outcome, Payload, ResultSet, RunReport, ScanConfig, ScanSummary, DEFAULT_URL_TEMPLATE,
    DOMAIN_PLACEHOLDER,
};
pub use utils::{build_probe_url, parse_duration_string, validate_key};

mod checkpoint;
mod concurrent;
mod config;
mod error;
mod input;
mod memo;
mod probe;
mod scanner;
mod store;
mod types;
mod utils;

pub type Result<T> = std::result::Result<T, ScanError>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
