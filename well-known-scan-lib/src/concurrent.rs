//! Bounded worker pool for key resolution.
//!
//! Keys are dispatched in input order to at most N concurrently running
//! resolutions, all multiplexed on the calling task. Completion order is
//! unconstrained. Each key's failure is isolated: it is logged, triggers a
//! best-effort checkpoint, and the pool moves on. Resource exhaustion is the
//! exception: dispatch stops, in-flight keys settle, and the error is
//! returned.

use crate::checkpoint::CheckpointWriter;
use crate::error::ScanError;
use crate::memo::MemoizedProber;
use crate::probe::Prober;
use crate::store::ResultStore;
use crate::types::{Outcome, ScanSummary};
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Default number of in-flight resolutions.
pub const DEFAULT_CONCURRENCY: usize = 64;

/// Live run counters, shared with whoever reports progress.
#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicU64,
    highest_started: AtomicU64,
    completed: AtomicU64,
    found: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`Progress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: u64,
    /// Highest dispatched index + 1; monotonic
    pub started: u64,
    pub completed: u64,
    pub found: u64,
    pub failed: u64,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            started: self.highest_started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            found: self.found.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn reset(&self, total: usize) {
        self.total.store(total as u64, Ordering::Relaxed);
        self.highest_started.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.found.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }

    fn mark_started(&self, index: usize) {
        self.highest_started
            .fetch_max(index as u64 + 1, Ordering::Relaxed);
    }
}

/// Cooperative stop signal checked before each dispatch.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Manages concurrent key resolution.
pub struct ConcurrentProcessor {
    max_concurrency: usize,
    progress: Arc<Progress>,
    cancel: CancelHandle,
}

impl ConcurrentProcessor {
    /// Create a processor running at most `max_concurrency` keys at once.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            progress: Arc::new(Progress::new()),
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Resolve every key, accumulating `Found` payloads into `results`.
    ///
    /// Returns once all dispatched keys have settled. Only resource
    /// exhaustion is returned as an error; any other per-key failure is
    /// counted in [`ScanSummary::failed`].
    pub async fn run<P: Prober>(
        &self,
        keys: &[String],
        resolver: &MemoizedProber<P>,
        results: &ResultStore,
        checkpoints: &CheckpointWriter,
    ) -> Result<ScanSummary, ScanError> {
        let progress = self.progress.as_ref();
        let cancel = &self.cancel;
        let processed = &AtomicU64::new(0);
        let fatal_slot: Mutex<Option<ScanError>> = Mutex::new(None);
        let fatal = &fatal_slot;

        progress.reset(keys.len());
        tracing::info!(
            keys = keys.len(),
            concurrency = self.max_concurrency,
            "starting scan"
        );

        futures::stream::iter(keys.iter().enumerate())
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(move |(index, key)| async move {
                progress.mark_started(index);

                let resolved = AssertUnwindSafe(resolver.resolve(key))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(ScanError::internal(format!(
                            "panic while resolving: {}",
                            panic_message(panic.as_ref())
                        )))
                    });

                match resolved {
                    Ok(Outcome::Found(payload)) => {
                        tracing::info!(key = key.as_str(), "found well-known document");
                        results.insert(key, payload);
                        progress.found.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        progress.failed.fetch_add(1, Ordering::Relaxed);
                        if e.is_resource_exhaustion() {
                            tracing::error!(key = key.as_str(), error = %e, "resource exhaustion, stopping dispatch");
                            cancel.cancel();
                            fatal
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .get_or_insert(e);
                        } else {
                            tracing::error!(key = key.as_str(), error = %e, "caught error while resolving key");
                        }
                        if let Err(flush_err) = checkpoints.flush_all().await {
                            tracing::error!(error = %flush_err, "could not save after error");
                        }
                    }
                }

                let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
                progress.completed.fetch_add(1, Ordering::Relaxed);
                checkpoints.maybe_checkpoint(count).await;
            })
            .buffer_unordered(self.max_concurrency)
            .for_each(|()| futures::future::ready(()))
            .await;

        let snapshot = progress.snapshot();
        let summary = ScanSummary {
            dispatched: snapshot.started,
            completed: processed.load(Ordering::Relaxed),
            found: snapshot.found,
            failed: snapshot.failed,
            cancelled: cancel.is_cancelled() && snapshot.started < keys.len() as u64,
        };

        tracing::info!(
            completed = summary.completed,
            found = summary.found,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "scan finished"
        );

        let fatal_error = fatal.lock().unwrap_or_else(PoisonError::into_inner).take();
        match fatal_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

impl Default for ConcurrentProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
