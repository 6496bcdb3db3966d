//! Well-Known Scan CLI Application
//!
//! Reads a ranked domain list and probes each domain for a
//! `/.well-known/ai-plugin.json` manifest, writing every valid one found to a
//! JSON results file. Re-running over the same list resumes from the cache.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use console::Term;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use well_known_scan_lib::{
    apply_env_config, apply_file_config, load_env_config, parse_duration_string,
    read_candidates, validate_concurrency, validate_scan_config, CancelHandle, ConfigManager,
    ScanConfig, Scanner,
};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for well-known-scan
#[derive(Parser, Debug)]
#[command(name = "well-known-scan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Discover /.well-known/ai-plugin.json manifests across a domain list")]
#[command(
    long_about = "Discover /.well-known/ai-plugin.json manifests across a ranked domain list.\n\nProbes run concurrently with retries. Every outcome is cached, so an interrupted or repeated run only probes domains it has not seen before."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// CSV file of candidate domains (rank,domain per row, no header)
    #[arg(value_name = "INPUT", help_heading = "Input")]
    pub input: PathBuf,

    /// Only scan the first N domains
    #[arg(long = "limit", value_name = "N", help_heading = "Input")]
    pub limit: Option<usize>,

    /// Zero-based CSV column holding the domain (default: 1)
    #[arg(long = "column", value_name = "INDEX", help_heading = "Input")]
    pub column: Option<usize>,

    /// Max concurrent probes (default: 64, max: 1024)
    #[arg(
        short = 'c',
        long = "concurrency",
        value_name = "N",
        help_heading = "Performance"
    )]
    pub concurrency: Option<usize>,

    /// Per-attempt timeout, e.g. 10s, 500ms (default: 10s)
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Performance")]
    pub timeout: Option<String>,

    /// Attempts per domain, first try included (default: 3)
    #[arg(long = "attempts", value_name = "N", help_heading = "Performance")]
    pub attempts: Option<u32>,

    /// URL to probe, {domain} is replaced by each candidate
    #[arg(long = "url-template", value_name = "TEMPLATE", help_heading = "Probe")]
    pub url_template: Option<String>,

    /// Do not cache domains whose probes kept failing; retry them next run
    #[arg(long = "no-cache-transient", help_heading = "Probe")]
    pub no_cache_transient: bool,

    /// Results file (default: ai-plugins.json)
    #[arg(long = "results", value_name = "FILE", help_heading = "Storage")]
    pub results: Option<PathBuf>,

    /// Cache file (default: well-known-ai-plugins-by-domain.cache.json)
    #[arg(long = "cache", value_name = "FILE", help_heading = "Storage")]
    pub cache: Option<PathBuf>,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// Only print the final line
    #[arg(short = 'q', long = "quiet", help_heading = "Configuration", conflicts_with_all = ["verbose", "debug"])]
    pub quiet: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,

    /// Show per-attempt debug logging
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args);

    if let Err(e) = run_scan(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Logs go to stderr so stdout only carries the report.
fn init_logging(args: &Args) {
    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let filter = if args.debug || args.verbose {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_scan(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;

    let candidates = read_candidates(&args.input, config.column, config.limit)?;
    let scanner = Scanner::new(config.clone())?;

    if !args.quiet {
        ui::print_header(candidates.keys.len(), candidates.skipped, &config);
    }

    let cancel = scanner.cancel_handle();
    let quiet = args.quiet;
    tokio::spawn(async move {
        let mut interrupts = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            interrupts += 1;
            match on_interrupt(interrupts, &cancel) {
                Interrupt::Drain => {
                    if !quiet {
                        eprintln!(
                            "\nInterrupted, finishing in-flight domains... (Ctrl-C again to abort)"
                        );
                    }
                }
                Interrupt::Abort => {
                    eprintln!("\nAborted, unsaved progress since the last checkpoint is lost");
                    process::exit(130);
                }
            }
        }
    });

    let progress_line = (!args.quiet && Term::stderr().is_term())
        .then(|| ui::ProgressLine::start(scanner.progress()));

    let outcome = scanner.run(&candidates.keys).await;

    if let Some(line) = progress_line {
        line.stop().await;
    }

    let report = outcome?;
    if args.quiet {
        println!("found {} plugins", report.results.len());
    } else {
        ui::print_summary(&report, &config);
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Stop dispatching and let in-flight domains finish
    Drain,
    /// Exit without the final flush
    Abort,
}

/// The first Ctrl-C drains the run, any later one aborts the process.
fn on_interrupt(count: usize, cancel: &CancelHandle) -> Interrupt {
    if count <= 1 {
        cancel.cancel();
        Interrupt::Drain
    } else {
        Interrupt::Abort
    }
}

/// Build the scan configuration: defaults < config file < `WKS_*` env < CLI.
fn build_config(args: &Args) -> Result<ScanConfig, Box<dyn std::error::Error>> {
    let mut config = ScanConfig::default();
    let config_manager = ConfigManager::new(args.verbose);

    if let Some(explicit_config_path) = &args.config {
        if args.verbose {
            eprintln!(
                "🔧 Using explicit config file (CLI --config): {}",
                explicit_config_path.display()
            );
        }

        let file_config = config_manager
            .load_file(explicit_config_path)
            .map_err(|e| {
                format!(
                    "Failed to load config file '{}': {}",
                    explicit_config_path.display(),
                    e
                )
            })?;

        config = apply_file_config(config, &file_config);
    } else if let Ok(env_config_path) = std::env::var("WKS_CONFIG") {
        if args.verbose {
            eprintln!(
                "🔧 Using explicit config file (WKS_CONFIG env var): {}",
                env_config_path
            );
        }

        let file_config = config_manager
            .load_file(&env_config_path)
            .map_err(|e| format!("Failed to load config file '{}': {}", env_config_path, e))?;

        config = apply_file_config(config, &file_config);
    } else {
        config = apply_file_config(config, &config_manager.discover_and_load());
    }

    config = apply_env_config(config, &load_env_config(args.verbose));
    config = apply_cli_args_to_config(config, args)?;

    validate_scan_config(&config)?;
    tracing::debug!(?config, "effective configuration");

    Ok(config)
}

fn apply_cli_args_to_config(
    mut config: ScanConfig,
    args: &Args,
) -> Result<ScanConfig, Box<dyn std::error::Error>> {
    if let Some(concurrency) = args.concurrency {
        validate_concurrency(concurrency)?;
        config = config.with_concurrency(concurrency);
    }

    if let Some(timeout) = &args.timeout {
        let timeout = parse_duration_string(timeout).ok_or_else(|| {
            format!(
                "Invalid timeout '{}'. Use format like '500ms', '10s', '2m'",
                timeout
            )
        })?;
        config = config.with_attempt_timeout(timeout);
    }

    if let Some(attempts) = args.attempts {
        if attempts == 0 {
            return Err("--attempts must be at least 1".into());
        }
        config = config.with_max_attempts(attempts);
    }

    if let Some(template) = &args.url_template {
        config = config.with_url_template(template.clone());
    }
    if args.no_cache_transient {
        config = config.with_cache_transient_failures(false);
    }
    if let Some(path) = &args.results {
        config = config.with_results_path(path.clone());
    }
    if let Some(path) = &args.cache {
        config = config.with_cache_path(path.clone());
    }
    if let Some(column) = args.column {
        config = config.with_column(column);
    }
    if args.limit.is_some() {
        config = config.with_limit(args.limit);
    }

    Ok(config)
}
