//! Fetch worker
//!
//! A single task that owns the download buffer and performs every network
//! transfer, periodic refreshes and one-shot jobs alike. Each tick it runs
//! at most one step:
//!
//! 1. Link down: no traffic; a pending job is failed so its caller hears back
//! 2. Startup quiet period: no traffic until it has elapsed
//! 3. Throttle: a minimum gap between the end of one download and the next
//! 4. A queued job runs before any periodic refresh
//! 5. Otherwise the most overdue registered resource is refreshed

pub mod http;
mod runner;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::buffer::DownloadBuffer;
use crate::certs::CertificateResolver;
use crate::error::{FetchError, RequestError};
use crate::link::LinkStatus;
use crate::observability::FetchMetrics;
use crate::persist::CapacityStore;
use crate::queue::Job;
use crate::registry::ResourceRegistry;
use crate::retry::RetryPolicy;

pub use http::{HttpConfig, HttpRequest, ReqwestTransport, ResponseMeta, Transport};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub tick: Duration,
    pub startup_delay: Duration,
    pub download_gap: Duration,
    pub retry: RetryPolicy,
    pub initial_capacity: usize,
    pub max_capacity: usize,
    pub growth_block: usize,
    pub max_growth_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(500),
            startup_delay: Duration::from_secs(5),
            download_gap: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            initial_capacity: 64 * 1024,
            max_capacity: 2 * 1024 * 1024,
            growth_block: 128 * 1024,
            max_growth_attempts: 3,
        }
    }
}

/// Collaborators the worker talks to.
#[derive(Clone)]
pub struct WorkerDeps {
    pub transport: Arc<dyn Transport>,
    pub resolver: CertificateResolver,
    pub link: Arc<dyn LinkStatus>,
    pub capacity_store: Arc<dyn CapacityStore>,
    pub metrics: Arc<FetchMetrics>,
}

/// What a single step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    LinkDown,
    QuietPeriod,
    Throttled,
    Idle,
    RanJob,
    Refreshed { host: String },
    /// The due resource stayed locked past the timeout; nothing was fetched.
    Skipped { host: String },
}

pub struct Worker {
    config: WorkerConfig,
    registry: Arc<ResourceRegistry>,
    jobs: mpsc::Receiver<Job>,
    /// Job taken off the queue but held back by the throttle; runs first.
    deferred: Option<Job>,
    transport: Arc<dyn Transport>,
    resolver: CertificateResolver,
    link: Arc<dyn LinkStatus>,
    capacity_store: Arc<dyn CapacityStore>,
    metrics: Arc<FetchMetrics>,
    buffer: DownloadBuffer,
    started: Instant,
    last_download: Option<Instant>,
}

impl Worker {
    /// Allocate the download buffer, pre-sized from the persisted capacity
    /// when that is larger than the configured one.
    pub fn new(
        config: WorkerConfig,
        registry: Arc<ResourceRegistry>,
        jobs: mpsc::Receiver<Job>,
        deps: WorkerDeps,
    ) -> Result<Self, FetchError> {
        let persisted = deps.capacity_store.load().unwrap_or(0);
        let capacity = config.initial_capacity.max(persisted);
        let buffer = DownloadBuffer::with_capacity(capacity, config.max_capacity)?;
        info!(
            capacity = buffer.capacity(),
            persisted, "Download buffer allocated"
        );

        Ok(Self {
            config,
            registry,
            jobs,
            deferred: None,
            transport: deps.transport,
            resolver: deps.resolver,
            link: deps.link,
            capacity_store: deps.capacity_store,
            metrics: deps.metrics,
            buffer,
            started: Instant::now(),
            last_download: None,
        })
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Run one scheduling step.
    pub async fn step(&mut self) -> StepOutcome {
        let now = Instant::now();

        if !self.link.is_up() {
            if let Some(job) = self.next_job() {
                self.metrics.job_rejected();
                job.fail(RequestError::LinkDown);
            }
            return StepOutcome::LinkDown;
        }

        if now.duration_since(self.started) < self.config.startup_delay {
            return StepOutcome::QuietPeriod;
        }

        let throttled = self
            .last_download
            .is_some_and(|at| now.duration_since(at) < self.config.download_gap);

        if let Some(job) = self.next_job() {
            if throttled {
                self.deferred = Some(job);
                return StepOutcome::Throttled;
            }
            self.perform_job(job).await;
            self.last_download = Some(Instant::now());
            return StepOutcome::RanJob;
        }

        let Some(resource) = self.registry.next_due(&self.config.retry, now) else {
            return StepOutcome::Idle;
        };
        if throttled {
            return StepOutcome::Throttled;
        }

        let host = resource.host().to_string();
        if !self.perform_update(&resource).await {
            return StepOutcome::Skipped { host };
        }
        self.last_download = Some(Instant::now());
        StepOutcome::Refreshed { host }
    }

    /// Tick until shutdown is signalled. A step in progress always finishes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_ms = self.config.tick.as_millis() as u64,
            startup_delay_secs = self.config.startup_delay.as_secs(),
            "Fetch worker started"
        );
        self.started = Instant::now();

        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.step().await;
                    debug!(?outcome, "Worker step");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.drain();
        info!("Fetch worker stopped");
    }

    /// Start the worker on the current runtime.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown, rx) = watch::channel(false);
        let join = tokio::spawn(self.run(rx));
        WorkerHandle { shutdown, join }
    }

    fn next_job(&mut self) -> Option<Job> {
        self.deferred.take().or_else(|| self.jobs.try_recv().ok())
    }

    /// Fail whatever is still queued so every callback runs once.
    fn drain(&mut self) {
        self.jobs.close();
        while let Some(job) = self.next_job() {
            self.metrics.job_rejected();
            job.fail(RequestError::WorkerStopped);
        }
    }
}

pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal shutdown and wait for the worker to finish its current step.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Fetch worker task failed");
        }
    }
}
