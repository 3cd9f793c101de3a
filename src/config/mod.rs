//! Configuration management for panelfetch
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use panelfetch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Status server listening on: {}", config.status.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `PANELFETCH__<section>__<key>`
//!
//! Examples:
//! - `PANELFETCH__WORKER__STARTUP_DELAY_SECS=0`
//! - `PANELFETCH__TLS__CERT_DIR=/etc/panelfetch/certs`
//! - `PANELFETCH__BUFFER__MAX_CAPACITY=4MB`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/panelfetch.toml`.
//! This can be overridden using the `PANELFETCH_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    BufferSettings, Config, HttpSettings, ResourceConfig, RetrySettings, StatusSettings,
    TlsSettings, WorkerSettings,
};
pub use validation::ValidationError;

use bytes::Bytes;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::registry::Registration;
use crate::retry::RetryPolicy;
use crate::worker::{HttpConfig, WorkerConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to read fallback anchor {path}: {source}")]
    AnchorFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`PANELFETCH__*`)
    /// 2. TOML file (default: `config/panelfetch.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            tick: Duration::from_millis(self.worker.tick_ms),
            startup_delay: Duration::from_secs(self.worker.startup_delay_secs),
            download_gap: Duration::from_millis(self.worker.download_gap_ms),
            retry: RetryPolicy {
                retry_interval: Duration::from_secs(self.retry.retry_interval_secs),
                max_failures: self.retry.max_failures,
            },
            initial_capacity: self.buffer.initial_capacity.as_usize(),
            max_capacity: self.buffer.max_capacity.as_usize(),
            growth_block: self.buffer.growth_block.as_usize(),
            max_growth_attempts: self.buffer.max_growth_attempts,
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        let mut http = HttpConfig {
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.http.request_timeout_secs),
            ..HttpConfig::default()
        };
        if let Some(agent) = &self.http.user_agent {
            http.user_agent = agent.clone();
        }
        http
    }

    /// Turn the `[[resources]]` list into registrations, reading fallback
    /// anchors from disk.
    pub fn registrations(&self) -> Result<Vec<Registration>, ConfigError> {
        self.resources
            .iter()
            .map(|resource| {
                let mut registration =
                    Registration::every_minutes(&resource.url, resource.interval_minutes);
                registration.headers = resource
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if let Some(path) = &resource.fallback_anchor {
                    let pem = std::fs::read(path).map_err(|source| ConfigError::AnchorFile {
                        path: path.clone(),
                        source,
                    })?;
                    registration.fallback_anchor = Some(Bytes::from(pem));
                }
                Ok(registration)
            })
            .collect()
    }
}
