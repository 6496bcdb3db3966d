//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `WKS_*`
//! environment variables, and merging them into a [`ScanConfig`] with proper
//! precedence rules (CLI > env > local file > home file > XDG file > defaults).

use crate::error::ScanError;
use crate::types::{ScanConfig, DOMAIN_PLACEHOLDER};
use crate::utils::parse_duration_string;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration loaded from TOML files.
///
/// ```toml
/// [scan]
/// concurrency = 64
/// timeout = "10s"
/// max_attempts = 3
///
/// [paths]
/// results = "ai-plugins.json"
/// cache = "well-known-ai-plugins-by-domain.cache.json"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// Pipeline tuning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanDefaults>,

    /// Store and input locations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<PathsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ScanDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Per-attempt timeout (as string, e.g., "10s", "500ms")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Base retry delay (as string, e.g., "250ms")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_every: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_every: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_transient_failures: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<PathBuf>,
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to emit warnings for config issues
    pub verbose: bool,
}

impl ConfigManager {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, ScanError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScanError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            ScanError::config(format!("Failed to parse TOML configuration: {}", e))
        })?;

        validate_file_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// Broken files are reported (when verbose) and skipped.
    pub fn discover_and_load(&self) -> FileConfig {
        let mut merged = FileConfig::default();
        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    tracing::debug!(path = %path.display(), "loaded config file");
                    merged = merge_configs(merged, config);
                }
                Err(e) => {
                    if self.verbose {
                        eprintln!("⚠️  Ignoring {}: {}", path.display(), e);
                    }
                    tracing::warn!(path = %path.display(), error = %e, "ignoring config file");
                }
            }
        }

        merged
    }

    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./well-known-scan.toml", "./.well-known-scan.toml"]
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let path = Path::new(&home).join(".well-known-scan.toml");
        path.exists().then_some(path)
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("well-known-scan").join("config.toml");
        path.exists().then_some(path)
    }
}

/// Merge two configurations. Values from `higher` win.
pub fn merge_configs(lower: FileConfig, higher: FileConfig) -> FileConfig {
    FileConfig {
        scan: match (lower.scan, higher.scan) {
            (Some(lo), Some(hi)) => Some(ScanDefaults {
                concurrency: hi.concurrency.or(lo.concurrency),
                timeout: hi.timeout.or(lo.timeout),
                max_attempts: hi.max_attempts.or(lo.max_attempts),
                retry_backoff: hi.retry_backoff.or(lo.retry_backoff),
                url_template: hi.url_template.or(lo.url_template),
                results_every: hi.results_every.or(lo.results_every),
                cache_every: hi.cache_every.or(lo.cache_every),
                cache_transient_failures: hi
                    .cache_transient_failures
                    .or(lo.cache_transient_failures),
                column: hi.column.or(lo.column),
                limit: hi.limit.or(lo.limit),
            }),
            (lo, hi) => hi.or(lo),
        },
        paths: match (lower.paths, higher.paths) {
            (Some(lo), Some(hi)) => Some(PathsConfig {
                results: hi.results.or(lo.results),
                cache: hi.cache.or(lo.cache),
            }),
            (lo, hi) => hi.or(lo),
        },
    }
}

fn validate_file_config(config: &FileConfig) -> Result<(), ScanError> {
    let Some(scan) = &config.scan else {
        return Ok(());
    };

    if let Some(concurrency) = scan.concurrency {
        validate_concurrency(concurrency)?;
    }
    if scan.max_attempts == Some(0) {
        return Err(ScanError::config("max_attempts must be at least 1"));
    }
    for value in [&scan.timeout, &scan.retry_backoff].into_iter().flatten() {
        if parse_duration_string(value).is_none() {
            return Err(ScanError::config(format!(
                "Invalid duration '{}'. Use format like '500ms', '10s', '2m'",
                value
            )));
        }
    }
    if let Some(template) = &scan.url_template {
        validate_url_template(template)?;
    }

    Ok(())
}

pub fn validate_concurrency(concurrency: usize) -> Result<(), ScanError> {
    if concurrency == 0 || concurrency > 1024 {
        return Err(ScanError::config("Concurrency must be between 1 and 1024"));
    }
    Ok(())
}

pub fn validate_url_template(template: &str) -> Result<(), ScanError> {
    if !template.contains(DOMAIN_PLACEHOLDER) {
        return Err(ScanError::config(format!(
            "URL template '{}' must contain {}",
            template, DOMAIN_PLACEHOLDER
        )));
    }
    Ok(())
}

/// Fold a file configuration into `config`. Unset fields are left alone.
pub fn apply_file_config(mut config: ScanConfig, file: &FileConfig) -> ScanConfig {
    if let Some(scan) = &file.scan {
        if let Some(concurrency) = scan.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(timeout) = scan.timeout.as_deref().and_then(parse_duration_string) {
            config.attempt_timeout = timeout;
        }
        if let Some(attempts) = scan.max_attempts {
            config = config.with_max_attempts(attempts);
        }
        if let Some(backoff) = scan.retry_backoff.as_deref().and_then(parse_duration_string) {
            config.retry_backoff = backoff;
        }
        if let Some(template) = &scan.url_template {
            config.url_template = template.clone();
        }
        if let Some(every) = scan.results_every {
            config.results_every = every;
        }
        if let Some(every) = scan.cache_every {
            config.cache_every = every;
        }
        if let Some(enabled) = scan.cache_transient_failures {
            config.cache_transient_failures = enabled;
        }
        if let Some(column) = scan.column {
            config.column = column;
        }
        if scan.limit.is_some() {
            config.limit = scan.limit;
        }
    }

    if let Some(paths) = &file.paths {
        if let Some(results) = &paths.results {
            config.results_path = results.clone();
        }
        if let Some(cache) = &paths.cache {
            config.cache_path = cache.clone();
        }
    }

    config
}

/// Configuration values read from `WKS_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub concurrency: Option<usize>,
    pub timeout: Option<String>,
    pub max_attempts: Option<u32>,
    pub limit: Option<usize>,
    pub results_path: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    pub url_template: Option<String>,
}

/// Load configuration from environment variables.
///
/// Invalid values are reported (when verbose) and ignored.
pub fn load_env_config(verbose: bool) -> EnvConfig {
    env_config_from(|name| env::var(name).ok(), verbose)
}

fn env_config_from<F>(lookup: F, verbose: bool) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();
    let warn = |name: &str, value: &str, expected: &str| {
        if verbose {
            eprintln!("⚠️ Invalid {}='{}', {}", name, value, expected);
        }
        tracing::warn!(name, value, "ignoring invalid environment value");
    };

    if let Some(val) = lookup("WKS_CONCURRENCY") {
        match val.parse::<usize>() {
            Ok(c) if validate_concurrency(c).is_ok() => env_config.concurrency = Some(c),
            _ => warn("WKS_CONCURRENCY", &val, "must be 1-1024"),
        }
    }

    if let Some(val) = lookup("WKS_TIMEOUT") {
        if parse_duration_string(&val).is_some() {
            env_config.timeout = Some(val);
        } else {
            warn("WKS_TIMEOUT", &val, "use format like '10s', '500ms'");
        }
    }

    if let Some(val) = lookup("WKS_MAX_ATTEMPTS") {
        match val.parse::<u32>() {
            Ok(n) if n > 0 => env_config.max_attempts = Some(n),
            _ => warn("WKS_MAX_ATTEMPTS", &val, "must be a positive integer"),
        }
    }

    if let Some(val) = lookup("WKS_LIMIT") {
        match val.parse::<usize>() {
            Ok(n) => env_config.limit = Some(n),
            Err(_) => warn("WKS_LIMIT", &val, "must be a non-negative integer"),
        }
    }

    if let Some(val) = lookup("WKS_RESULTS_PATH").filter(|v| !v.trim().is_empty()) {
        env_config.results_path = Some(PathBuf::from(val));
    }

    if let Some(val) = lookup("WKS_CACHE_PATH").filter(|v| !v.trim().is_empty()) {
        env_config.cache_path = Some(PathBuf::from(val));
    }

    if let Some(val) = lookup("WKS_URL_TEMPLATE") {
        if validate_url_template(&val).is_ok() {
            env_config.url_template = Some(val);
        } else {
            warn("WKS_URL_TEMPLATE", &val, "must contain {domain}");
        }
    }

    env_config
}

/// Fold environment values into `config`.
pub fn apply_env_config(mut config: ScanConfig, env_config: &EnvConfig) -> ScanConfig {
    if let Some(concurrency) = env_config.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(timeout) = env_config.timeout.as_deref().and_then(parse_duration_string) {
        config.attempt_timeout = timeout;
    }
    if let Some(attempts) = env_config.max_attempts {
        config = config.with_max_attempts(attempts);
    }
    if env_config.limit.is_some() {
        config.limit = env_config.limit;
    }
    if let Some(path) = &env_config.results_path {
        config.results_path = path.clone();
    }
    if let Some(path) = &env_config.cache_path {
        config.cache_path = path.clone();
    }
    if let Some(template) = &env_config.url_template {
        config.url_template = template.clone();
    }
    config
}

/// Final sanity check of a fully merged configuration.
pub fn validate_scan_config(config: &ScanConfig) -> Result<(), ScanError> {
    validate_concurrency(config.concurrency)?;
    validate_url_template(&config.url_template)?;
    if config.max_attempts == 0 {
        return Err(ScanError::config("max_attempts must be at least 1"));
    }
    if config.attempt_timeout.is_zero() {
        return Err(ScanError::config("timeout must be greater than zero"));
    }
    if config.results_path == config.cache_path {
        return Err(ScanError::config(format!(
            "results and cache must be different files, both are {}",
            config.results_path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("well-known-scan.toml");
        fs::write(
            &path,
            r#"
[scan]
concurrency = 32
timeout = "5s"
url_template = "https://{domain}/.well-known/ai-plugin.json"

[paths]
results = "out/plugins.json"
"#,
        )
        .unwrap();

        let config = ConfigManager::new(false).load_file(&path).unwrap();
        let scan = config.scan.as_ref().unwrap();
        assert_eq!(scan.concurrency, Some(32));
        assert_eq!(scan.timeout.as_deref(), Some("5s"));
        assert_eq!(
            config.paths.as_ref().unwrap().results,
            Some(PathBuf::from("out/plugins.json"))
        );

        let merged = apply_file_config(ScanConfig::default(), &config);
        assert_eq!(merged.concurrency, 32);
        assert_eq!(merged.attempt_timeout, Duration::from_secs(5));
        assert_eq!(merged.results_path, PathBuf::from("out/plugins.json"));
        assert_eq!(merged.max_attempts, 3);
    }

    #[test]
    fn test_invalid_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::new(false);

        let cases = [
            "[scan]\nconcurrency = 0\n",
            "[scan]\ntimeout = \"soon\"\n",
            "[scan]\nurl_template = \"https://example.com/doc.json\"\n",
            "[scan]\nmax_attempts = 0\n",
            "not toml at all [",
        ];
        for (i, content) in cases.iter().enumerate() {
            let path = dir.path().join(format!("bad{}.toml", i));
            fs::write(&path, content).unwrap();
            assert!(
                matches!(manager.load_file(&path), Err(ScanError::Config { .. })),
                "case {} should fail",
                i
            );
        }

        assert!(manager.load_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_merge_precedence() {
        let lower = FileConfig {
            scan: Some(ScanDefaults {
                concurrency: Some(10),
                timeout: Some("3s".into()),
                ..Default::default()
            }),
            paths: Some(PathsConfig {
                results: Some("low.json".into()),
                cache: Some("low-cache.json".into()),
            }),
        };
        let higher = FileConfig {
            scan: Some(ScanDefaults {
                concurrency: Some(20),
                ..Default::default()
            }),
            paths: Some(PathsConfig {
                results: Some("high.json".into()),
                cache: None,
            }),
        };

        let merged = merge_configs(lower, higher);
        let scan = merged.scan.unwrap();
        assert_eq!(scan.concurrency, Some(20));
        assert_eq!(scan.timeout.as_deref(), Some("3s"));
        let paths = merged.paths.unwrap();
        assert_eq!(paths.results, Some(PathBuf::from("high.json")));
        assert_eq!(paths.cache, Some(PathBuf::from("low-cache.json")));
    }

    #[test]
    fn test_env_config_parsing() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("WKS_CONCURRENCY", "16"),
            ("WKS_TIMEOUT", "2s"),
            ("WKS_MAX_ATTEMPTS", "0"),
            ("WKS_LIMIT", "1000"),
            ("WKS_URL_TEMPLATE", "https://nowhere/doc.json"),
            ("WKS_CACHE_PATH", "c.json"),
        ]);
        let env_config = env_config_from(|name| vars.get(name).map(|v| v.to_string()), false);

        assert_eq!(env_config.concurrency, Some(16));
        assert_eq!(env_config.timeout.as_deref(), Some("2s"));
        assert_eq!(env_config.max_attempts, None);
        assert_eq!(env_config.limit, Some(1000));
        assert_eq!(env_config.url_template, None);
        assert_eq!(env_config.cache_path, Some(PathBuf::from("c.json")));

        let config = apply_env_config(ScanConfig::default(), &env_config);
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.attempt_timeout, Duration::from_secs(2));
        assert_eq!(config.limit, Some(1000));
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_validate_scan_config() {
        assert!(validate_scan_config(&ScanConfig::default()).is_ok());
        let bad = ScanConfig::default().with_url_template("https://x/doc.json");
        assert!(validate_scan_config(&bad).is_err());
        let bad = ScanConfig::default().with_attempt_timeout(Duration::ZERO);
        assert!(validate_scan_config(&bad).is_err());
    }

    #[test]
    fn test_shared_store_path_rejected() {
        let config = ScanConfig::default()
            .with_results_path("scan.json")
            .with_cache_path("scan.json");
        let err = validate_scan_config(&config).unwrap_err();
        assert!(matches!(err, ScanError::Config { .. }));
        assert!(err.to_string().contains("scan.json"));

        let config = config.with_cache_path("scan.cache.json");
        assert!(validate_scan_config(&config).is_ok());
    }
}
