//! Logging setup and fetcher counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber, honouring `RUST_LOG`.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Counters for the fetch worker
#[derive(Debug, Default)]
pub struct FetchMetrics {
    refreshes_ok: AtomicU64,
    refreshes_failed: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_rejected: AtomicU64,
    buffer_growths: AtomicU64,
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_ok(&self) {
        self.refreshes_ok.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "refreshes_ok", "Metric incremented");
    }

    pub fn refresh_failed(&self) {
        self.refreshes_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "refreshes_failed", "Metric incremented");
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "jobs_completed", "Metric incremented");
    }

    pub fn job_rejected(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "jobs_rejected", "Metric incremented");
    }

    pub fn buffer_grown(&self) {
        self.buffer_growths.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "buffer_growths", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            refreshes_ok: self.refreshes_ok.load(Ordering::Relaxed),
            refreshes_failed: self.refreshes_failed.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
            buffer_growths: self.buffer_growths.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub refreshes_ok: u64,
    pub refreshes_failed: u64,
    pub jobs_completed: u64,
    pub jobs_rejected: u64,
    pub buffer_growths: u64,
}
