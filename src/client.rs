//! `WebClient`: the handle display modules hold
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use panelfetch::client::WebClientBuilder;
//!
//! let (client, worker) = WebClientBuilder::new().spawn()?;
//! client.register_resource("https://api.example.com/forecast", 30, None)?;
//!
//! // Later, from a render tick:
//! client.access_resource("https://api.example.com/forecast", |view| {
//!     if let Some(text) = view.text() {
//!         println!("{} bytes, stale: {}", text.len(), view.is_stale);
//!     }
//! });
//! # worker.shutdown().await;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::certs::{AnchorStore, CertificateResolver, DirAnchorStore};
use crate::config::Config;
use crate::error::{FetchError, RequestError};
use crate::link::{LinkFlag, LinkStatus};
use crate::observability::{FetchMetrics, MetricsSnapshot};
use crate::persist::{CapacityStore, TomlCapacityStore};
use crate::queue::{Job, JobBroker, JobCallback, JobOutcome, JobRequest, OwnedReply};
use crate::registry::{
    HeaderList, RegisterOutcome, Registration, RegistryError, ResourceRegistry, ResourceStatus,
    ResourceView,
};
use crate::worker::{HttpConfig, ReqwestTransport, Transport, Worker, WorkerConfig, WorkerDeps, WorkerHandle};

pub struct WebClientBuilder {
    worker: WorkerConfig,
    http: HttpConfig,
    queue_capacity: usize,
    enqueue_timeout: Duration,
    lock_timeout: Duration,
    cert_dir: PathBuf,
    allow_insecure: bool,
    state_path: PathBuf,
    transport: Option<Arc<dyn Transport>>,
    anchor_store: Option<Arc<dyn AnchorStore>>,
    link: Option<Arc<dyn LinkStatus>>,
    capacity_store: Option<Arc<dyn CapacityStore>>,
}

impl Default for WebClientBuilder {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            http: HttpConfig::default(),
            queue_capacity: 10,
            enqueue_timeout: Duration::from_millis(100),
            lock_timeout: Duration::from_secs(1),
            cert_dir: PathBuf::from("/certs"),
            allow_insecure: true,
            state_path: PathBuf::from("data/panelfetch-state.toml"),
            transport: None,
            anchor_store: None,
            link: None,
            capacity_store: None,
        }
    }
}

impl WebClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded with every setting from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker: config.worker_config(),
            http: config.http_config(),
            queue_capacity: config.worker.queue_capacity,
            enqueue_timeout: Duration::from_millis(config.worker.enqueue_timeout_ms),
            lock_timeout: Duration::from_millis(config.worker.lock_timeout_ms),
            cert_dir: config.tls.cert_dir.clone(),
            allow_insecure: config.tls.allow_insecure,
            state_path: config.buffer.state_path.clone(),
            ..Self::default()
        }
    }

    pub fn worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker = config;
        self
    }

    pub fn http_config(mut self, config: HttpConfig) -> Self {
        self.http = config;
        self
    }

    pub fn queue(mut self, capacity: usize, enqueue_timeout: Duration) -> Self {
        self.queue_capacity = capacity;
        self.enqueue_timeout = enqueue_timeout;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn cert_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cert_dir = dir.into();
        self
    }

    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn anchor_store(mut self, store: Arc<dyn AnchorStore>) -> Self {
        self.anchor_store = Some(store);
        self
    }

    pub fn link(mut self, link: Arc<dyn LinkStatus>) -> Self {
        self.link = Some(link);
        self
    }

    pub fn capacity_store(mut self, store: Arc<dyn CapacityStore>) -> Self {
        self.capacity_store = Some(store);
        self
    }

    /// Wire everything up without starting the worker.
    pub fn build(self) -> Result<(WebClient, Worker), FetchError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.http)?),
        };
        let anchor_store = self
            .anchor_store
            .unwrap_or_else(|| Arc::new(DirAnchorStore::new(self.cert_dir)));
        let link = self.link.unwrap_or_else(|| Arc::new(LinkFlag::default()));
        let capacity_store = self
            .capacity_store
            .unwrap_or_else(|| Arc::new(TomlCapacityStore::new(self.state_path)));
        let metrics = Arc::new(FetchMetrics::new());

        let registry = Arc::new(ResourceRegistry::new(self.lock_timeout));
        let (broker, jobs) = JobBroker::new(
            self.queue_capacity,
            self.enqueue_timeout,
            link.clone(),
            metrics.clone(),
        );

        let worker = Worker::new(
            self.worker,
            registry.clone(),
            jobs,
            WorkerDeps {
                transport,
                resolver: CertificateResolver::new(anchor_store, self.allow_insecure),
                link,
                capacity_store,
                metrics: metrics.clone(),
            },
        )?;

        let client = WebClient {
            registry,
            broker: Arc::new(broker),
            metrics,
        };
        Ok((client, worker))
    }

    /// Build and start the worker on the current tokio runtime.
    pub fn spawn(self) -> Result<(WebClient, WorkerHandle), FetchError> {
        let (client, worker) = self.build()?;
        Ok((client, worker.spawn()))
    }
}

/// Cheap to clone; every clone talks to the same registry and worker.
#[derive(Clone)]
pub struct WebClient {
    registry: Arc<ResourceRegistry>,
    broker: Arc<JobBroker>,
    metrics: Arc<FetchMetrics>,
}

impl WebClient {
    /// Declare a recurring resource. Registering a second URL on the same
    /// host repoints the existing entry.
    pub fn register_resource(
        &self,
        url: &str,
        interval_minutes: u32,
        fallback_anchor: Option<Bytes>,
    ) -> Result<RegisterOutcome, RegistryError> {
        let mut registration = Registration::every_minutes(url, interval_minutes);
        registration.fallback_anchor = fallback_anchor;
        self.registry.register(registration)
    }

    pub fn register_resource_with_headers(
        &self,
        url: &str,
        interval_minutes: u32,
        headers: HeaderList,
        fallback_anchor: Option<Bytes>,
    ) -> Result<RegisterOutcome, RegistryError> {
        let mut registration = Registration::every_minutes(url, interval_minutes);
        registration.headers = headers;
        registration.fallback_anchor = fallback_anchor;
        self.registry.register(registration)
    }

    pub fn register(&self, registration: Registration) -> Result<RegisterOutcome, RegistryError> {
        self.registry.register(registration)
    }

    /// Read the cached payload for `url`. `None` when not registered or the
    /// resource lock was busy past the timeout.
    pub fn access_resource<R>(&self, url: &str, f: impl FnOnce(ResourceView<'_>) -> R) -> Option<R> {
        self.registry.access(url, f)
    }

    pub fn update_resource_certificate_by_host(&self, host: &str, filename: &str) -> usize {
        self.registry.update_certificate_by_host(host, filename)
    }

    pub fn update_resource_url(&self, old_url: &str, new_url: &str) -> Result<(), RegistryError> {
        self.registry.update_url(old_url, new_url)
    }

    pub fn resource_statuses(&self) -> Vec<ResourceStatus> {
        self.registry.statuses()
    }

    pub fn registry(&self) -> Arc<ResourceRegistry> {
        self.registry.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn pending_jobs(&self) -> usize {
        self.broker.pending()
    }

    /// One-shot GET; `callback` gets the body of a 2xx reply, `None` otherwise.
    pub async fn get_request<F>(&self, url: &str, callback: F) -> Result<(), RequestError>
    where
        F: FnOnce(Option<&[u8]>) + Send + 'static,
    {
        self.submit(JobRequest::get(url), JobCallback::raw(callback)).await
    }

    /// One-shot GET with custom headers; `callback` sees status and body.
    pub async fn get_request_detailed<F>(
        &self,
        url: &str,
        headers: HeaderList,
        callback: F,
    ) -> Result<(), RequestError>
    where
        F: FnOnce(JobOutcome<'_>) + Send + 'static,
    {
        let mut request = JobRequest::get(url);
        request.headers = headers;
        self.submit(request, JobCallback::detailed(callback)).await
    }

    pub async fn post_request<F>(
        &self,
        url: &str,
        body: impl Into<Bytes>,
        content_type: &str,
        callback: F,
    ) -> Result<(), RequestError>
    where
        F: FnOnce(Option<&[u8]>) + Send + 'static,
    {
        self.submit(JobRequest::post(url, body, content_type), JobCallback::raw(callback))
            .await
    }

    pub async fn post_request_detailed<F>(
        &self,
        url: &str,
        body: impl Into<Bytes>,
        content_type: &str,
        callback: F,
    ) -> Result<(), RequestError>
    where
        F: FnOnce(JobOutcome<'_>) + Send + 'static,
    {
        self.submit(
            JobRequest::post(url, body, content_type),
            JobCallback::detailed(callback),
        )
        .await
    }

    /// Queue a job. On `Err` the callback has already run with that error.
    pub async fn submit(&self, request: JobRequest, callback: JobCallback) -> Result<(), RequestError> {
        self.broker.submit(Job::new(request, callback)).await
    }

    /// Run a one-shot request and await its reply.
    pub async fn fetch(&self, request: JobRequest) -> Result<OwnedReply, RequestError> {
        let (tx, rx) = oneshot::channel();
        let callback = JobCallback::detailed(move |outcome| {
            let _ = tx.send(outcome.map(|reply| reply.to_owned_reply()));
        });
        // A refused job has already reported through the channel.
        let _ = self.submit(request, callback).await;
        rx.await.unwrap_or(Err(RequestError::WorkerStopped))
    }
}
