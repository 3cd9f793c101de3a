use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub buffer: BufferSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub tls: TlsSettings,
    #[serde(default)]
    pub status: StatusSettings,
    /// Resources registered by `panelfetch run`
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Scheduling of the fetch worker and its job queue
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSettings {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Quiet period after start before any network traffic
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
    /// Minimum gap between two downloads
    #[serde(default = "default_download_gap_ms")]
    pub download_gap_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
    /// Bound on waiting for a resource lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            startup_delay_secs: default_startup_delay_secs(),
            download_gap_ms: default_download_gap_ms(),
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_tick_ms() -> u64 {
    500
}

fn default_startup_delay_secs() -> u64 {
    5
}

fn default_download_gap_ms() -> u64 {
    2000
}

fn default_queue_capacity() -> usize {
    10
}

fn default_enqueue_timeout_ms() -> u64 {
    100
}

fn default_lock_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval_secs(),
            max_failures: default_max_failures(),
        }
    }
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_max_failures() -> u32 {
    3
}

/// Download buffer sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferSettings {
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: ByteSize,
    #[serde(default = "default_growth_block")]
    pub growth_block: ByteSize,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: ByteSize,
    #[serde(default = "default_max_growth_attempts")]
    pub max_growth_attempts: u32,
    /// Where a grown capacity is remembered across restarts
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            growth_block: default_growth_block(),
            max_capacity: default_max_capacity(),
            max_growth_attempts: default_max_growth_attempts(),
            state_path: default_state_path(),
        }
    }
}

fn default_initial_capacity() -> ByteSize {
    ByteSize::kib(64)
}

fn default_growth_block() -> ByteSize {
    ByteSize::kib(128)
}

fn default_max_capacity() -> ByteSize {
    ByteSize::mib(2)
}

fn default_max_growth_attempts() -> u32 {
    3
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/panelfetch-state.toml")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: None,
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// Trust anchor lookup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsSettings {
    /// Directory holding `<domain>.pem` files
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,
    /// Connect without verification when no anchor is found
    #[serde(default = "default_allow_insecure")]
    pub allow_insecure: bool,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            cert_dir: default_cert_dir(),
            allow_insecure: default_allow_insecure(),
        }
    }
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("/certs")
}

fn default_allow_insecure() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusSettings {
    #[serde(default = "default_status_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_status_bind_addr(),
        }
    }
}

fn default_status_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

/// A resource declared in the config file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceConfig {
    pub url: String,
    pub interval_minutes: u32,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// PEM file used when no anchor matches the host
    pub fallback_anchor: Option<PathBuf>,
}
