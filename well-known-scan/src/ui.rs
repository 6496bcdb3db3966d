//! Terminal display for well-known-scan.
//!
//! Header and summary go to stdout; the live progress line goes to stderr and
//! is only drawn on a terminal. Uses only the `console` crate.

use console::{style, Term};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use well_known_scan_lib::{Progress, ProgressSnapshot, RunReport, ScanConfig};

// ── Progress line ────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// A spinner with live scan counters, redrawn on stderr.
pub struct ProgressLine {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl ProgressLine {
    pub fn start(progress: Arc<Progress>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let term = Term::stderr();
            let started = Instant::now();
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let line = format_progress(&progress.snapshot(), started.elapsed());
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), line));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    /// Stop redrawing and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

fn format_progress(snapshot: &ProgressSnapshot, elapsed: Duration) -> String {
    let rate = if elapsed.as_secs_f64() > 0.0 {
        snapshot.completed as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    format!(
        "{}/{} scanned  {}  {} found  {}  {} failed  {}  {:.0}/s",
        snapshot.completed,
        snapshot.total,
        style("|").dim(),
        style(snapshot.found).green(),
        style("|").dim(),
        snapshot.failed,
        style("|").dim(),
        rate,
    )
}

// ── Header ───────────────────────────────────────────────────────────────────

pub fn print_header(domain_count: usize, skipped: usize, config: &ScanConfig) {
    println!(
        "{} {} {}",
        style("well-known-scan").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "· Scanning {} domain{}",
            domain_count,
            plural(domain_count)
        ))
        .dim(),
    );

    let mut meta_parts = vec![
        format!("Concurrency: {}", config.concurrency),
        format!(
            "Timeout: {}s x {}",
            config.attempt_timeout.as_secs_f64(),
            config.max_attempts
        ),
        format!("Results: {}", config.results_path.display()),
    ];
    if skipped > 0 {
        meta_parts.push(format!("Skipped rows: {}", skipped));
    }

    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Summary ──────────────────────────────────────────────────────────────────

pub fn print_summary(report: &RunReport, config: &ScanConfig) {
    let summary = &report.summary;

    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} domain{} in {:.1}s  {}  {} probed  {}  {} cached  {}  {}",
        style(summary.completed).bold(),
        plural(summary.completed as usize),
        report.elapsed.as_secs_f64(),
        style("|").dim(),
        report.probes,
        style("|").dim(),
        report.cache_hits,
        style("|").dim(),
        style(format!("{} failed", summary.failed)).yellow(),
    );

    if summary.cancelled {
        println!(
            "  {}",
            style(format!(
                "Stopped after {} domain{}, re-run to resume",
                summary.dispatched,
                plural(summary.dispatched as usize)
            ))
            .yellow()
        );
    }

    println!(
        "  {} → {}",
        style(format!("found {} plugins", report.results.len()))
            .green()
            .bold(),
        config.results_path.display()
    );
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
