#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use panelfetch::buffer::BufferSink;
use panelfetch::certs::{AnchorOrigin, AnchorStore, TrustAnchor};
use panelfetch::error::FetchError;
use panelfetch::link::LinkFlag;
use panelfetch::persist::{CapacityStore, CapacityStoreError};
use panelfetch::queue::Method;
use panelfetch::worker::{HttpRequest, ResponseMeta, Transport, Worker, WorkerConfig};
use panelfetch::{WebClient, WebClientBuilder};

/// What the mock answers for one request.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply {
        status: u16,
        body: Vec<u8>,
        announce_length: bool,
    },
    ConnectFailure,
    Timeout,
}

impl Scripted {
    pub fn ok(body: &[u8]) -> Self {
        Scripted::Reply {
            status: 200,
            body: body.to_vec(),
            announce_length: true,
        }
    }

    pub fn status(status: u16, body: &[u8]) -> Self {
        Scripted::Reply {
            status,
            body: body.to_vec(),
            announce_length: true,
        }
    }

    /// A chunked reply without Content-Length.
    pub fn chunked(body: &[u8]) -> Self {
        Scripted::Reply {
            status: 200,
            body: body.to_vec(),
            announce_length: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeenAnchor {
    Plain,
    Insecure,
    File(String),
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub anchor: SeenAnchor,
    pub capacity: usize,
    pub at: Instant,
}

/// Transport double. Each URL has a script; the last entry repeats.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<Call>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, url: &str, replies: impl IntoIterator<Item = Scripted>) {
        self.scripts
            .lock()
            .insert(url.to_string(), replies.into_iter().collect());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, url: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.url == url).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> Scripted {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Scripted::status(404, b"not scripted"),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        request: &HttpRequest<'_>,
        anchor: Option<&TrustAnchor>,
        sink: &mut BufferSink<'_>,
    ) -> Result<ResponseMeta, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.calls.lock().push(Call {
            method: request.method,
            url: request.url.to_string(),
            headers: request.headers.to_vec(),
            body: request.body.map(|b| b.to_vec()),
            anchor: match anchor {
                None => SeenAnchor::Plain,
                Some(TrustAnchor::Insecure) => SeenAnchor::Insecure,
                Some(TrustAnchor::Pem {
                    origin: AnchorOrigin::File(name),
                    ..
                }) => SeenAnchor::File(name.clone()),
                Some(TrustAnchor::Pem {
                    origin: AnchorOrigin::Fallback,
                    ..
                }) => SeenAnchor::Fallback,
            },
            capacity: sink.capacity(),
            at: Instant::now(),
        });

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.next_reply(request.url) {
            Scripted::Reply {
                status,
                body,
                announce_length,
            } => {
                sink.write(&body);
                Ok(ResponseMeta {
                    status,
                    content_length: announce_length.then_some(body.len() as u64),
                })
            }
            Scripted::ConnectFailure => Err(FetchError::Connect("connection refused".into())),
            Scripted::Timeout => Err(FetchError::Timeout),
        }
    }
}

#[derive(Default)]
pub struct MemoryCapacityStore {
    saved: Mutex<Vec<usize>>,
    initial: Option<usize>,
}

impl MemoryCapacityStore {
    pub fn with_initial(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            saved: Mutex::new(Vec::new()),
            initial: Some(capacity),
        })
    }

    pub fn saved(&self) -> Vec<usize> {
        self.saved.lock().clone()
    }
}

impl CapacityStore for MemoryCapacityStore {
    fn load(&self) -> Option<usize> {
        self.saved.lock().last().copied().or(self.initial)
    }

    fn save(&self, capacity: usize) -> Result<(), CapacityStoreError> {
        self.saved.lock().push(capacity);
        Ok(())
    }
}

/// Anchor files held in memory.
#[derive(Default)]
pub struct MemoryAnchorStore {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryAnchorStore {
    pub fn with_files(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            files: names
                .iter()
                .map(|name| (name.to_string(), format!("PEM for {}", name).into_bytes()))
                .collect(),
        })
    }
}

impl AnchorStore for MemoryAnchorStore {
    fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

/// A resource lock held by a plain thread until [`HeldLock::release`].
pub struct HeldLock {
    release: std::sync::mpsc::Sender<()>,
    thread: std::thread::JoinHandle<()>,
}

impl HeldLock {
    /// Let go of the lock and wait until it is actually free.
    pub fn release(self) {
        drop(self.release);
        self.thread.join().unwrap();
    }
}

pub fn hold_resource_lock(client: &WebClient, url: &'static str) -> HeldLock {
    let (held_tx, held_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let client = client.clone();
    let thread = std::thread::spawn(move || {
        client.access_resource(url, |_| {
            held_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
    });
    held_rx.recv().unwrap();
    HeldLock {
        release: release_tx,
        thread,
    }
}

/// Worker settings for tests: no quiet period, short gap.
pub fn quick_config() -> WorkerConfig {
    WorkerConfig {
        tick: Duration::from_millis(100),
        startup_delay: Duration::ZERO,
        download_gap: Duration::ZERO,
        initial_capacity: 4096,
        growth_block: 4096,
        max_capacity: 64 * 1024,
        ..WorkerConfig::default()
    }
}

pub struct Harness {
    pub client: WebClient,
    pub worker: Worker,
    pub transport: Arc<MockTransport>,
    pub link: Arc<LinkFlag>,
    pub capacity_store: Arc<MemoryCapacityStore>,
}

pub fn harness(config: WorkerConfig) -> Harness {
    harness_with(config, MemoryAnchorStore::with_files(&[]), MemoryCapacityStore::default().into())
}

pub fn harness_with(
    config: WorkerConfig,
    anchors: Arc<MemoryAnchorStore>,
    capacity_store: Arc<MemoryCapacityStore>,
) -> Harness {
    build_harness(config, anchors, capacity_store, Duration::from_millis(50))
}

/// Harness with a longer per-resource lock timeout, for tests that hold a
/// lock from another thread.
pub fn harness_with_lock_timeout(config: WorkerConfig, lock_timeout: Duration) -> Harness {
    build_harness(
        config,
        MemoryAnchorStore::with_files(&[]),
        MemoryCapacityStore::default().into(),
        lock_timeout,
    )
}

fn build_harness(
    config: WorkerConfig,
    anchors: Arc<MemoryAnchorStore>,
    capacity_store: Arc<MemoryCapacityStore>,
    lock_timeout: Duration,
) -> Harness {
    let transport = MockTransport::new();
    let link = Arc::new(LinkFlag::default());
    let (client, worker) = WebClientBuilder::new()
        .worker_config(config)
        .transport(transport.clone())
        .anchor_store(anchors)
        .link(link.clone())
        .capacity_store(capacity_store.clone())
        .queue(4, Duration::from_millis(10))
        .lock_timeout(lock_timeout)
        .build()
        .unwrap();

    Harness {
        client,
        worker,
        transport,
        link,
        capacity_store,
    }
}
