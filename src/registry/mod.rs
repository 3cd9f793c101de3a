//! Registry of managed resources, deduplicated by hostname
//!
//! Each entry carries its own lock, so readers of one resource never wait
//! on a refresh of another. The registry-wide lock only guards the list
//! itself and is never held across a callback or a fetch.

mod resource;

pub use resource::{HeaderList, ManagedResource, ResourceStatus, ResourceView};
pub(crate) use resource::FetchPlan;

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::certs::AnchorResolution;
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid resource URL: {0}")]
    InvalidUrl(String),

    #[error("refresh interval must be positive")]
    ZeroInterval,

    #[error("no resource registered for {0}")]
    NotFound(String),

    #[error("new URL host '{found}' does not match resource host '{expected}'")]
    HostMismatch { expected: String, found: String },

    #[error("timed out waiting for lock on {0}")]
    LockTimeout(String),
}

/// Canonical identity of a URL: lowercased host without port.
pub fn host_of(url: &str) -> Result<String, RegistryError> {
    let parsed = Url::parse(url).map_err(|e| RegistryError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(RegistryError::InvalidUrl(format!("unsupported scheme '{}'", other))),
    }
    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| RegistryError::InvalidUrl(format!("{}: missing host", url)))
}

/// Declaration of a recurring resource.
#[derive(Debug, Clone)]
pub struct Registration {
    pub url: String,
    pub interval: Duration,
    pub fallback_anchor: Option<Bytes>,
    pub headers: HeaderList,
}

impl Registration {
    pub fn new(url: impl Into<String>, interval: Duration) -> Self {
        Self {
            url: url.into(),
            interval,
            fallback_anchor: None,
            headers: Vec::new(),
        }
    }

    pub fn every_minutes(url: impl Into<String>, minutes: u32) -> Self {
        Self::new(url, Duration::from_secs(u64::from(minutes) * 60))
    }

    pub fn fallback_anchor(mut self, pem: impl Into<Bytes>) -> Self {
        self.fallback_anchor = Some(pem.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    UrlUpdated,
    Unchanged,
}

pub struct ResourceRegistry {
    resources: RwLock<Vec<Arc<ManagedResource>>>,
    lock_timeout: Duration,
}

impl ResourceRegistry {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            resources: RwLock::new(Vec::new()),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }

    /// Register a resource, or repoint the existing entry for the same host.
    pub fn register(&self, registration: Registration) -> Result<RegisterOutcome, RegistryError> {
        if registration.interval.is_zero() {
            return Err(RegistryError::ZeroInterval);
        }
        let host = host_of(&registration.url)?;

        // Write lock for the check-then-insert so two registrations of one
        // host cannot both create an entry. It is released before waiting on
        // the entry's own lock.
        let existing = {
            let mut resources = self.resources.write();
            let found = resources.iter().find(|r| r.host() == host).cloned();
            match found {
                Some(existing) => existing,
                None => {
                    info!(
                        host = %host,
                        url = %registration.url,
                        interval_secs = registration.interval.as_secs(),
                        "Resource registered"
                    );
                    resources.push(Arc::new(ManagedResource::new(
                        host,
                        registration.url,
                        registration.interval,
                        registration.fallback_anchor,
                        registration.headers,
                    )));
                    return Ok(RegisterOutcome::Created);
                }
            }
        };

        let mut state = existing
            .lock(self.lock_timeout)
            .ok_or_else(|| RegistryError::LockTimeout(host.clone()))?;
        if state.url == registration.url {
            return Ok(RegisterOutcome::Unchanged);
        }
        info!(host = %host, old = %state.url, new = %registration.url, "Resource URL updated");
        state.url = registration.url;
        Ok(RegisterOutcome::UrlUpdated)
    }

    /// Run `f` against the cached payload for `url`'s host.
    ///
    /// Returns `None` when nothing is registered for the host or its lock
    /// could not be taken within the timeout.
    pub fn access<R>(&self, url: &str, f: impl FnOnce(ResourceView<'_>) -> R) -> Option<R> {
        let host = host_of(url).ok()?;
        let resource = self.get_by_host(&host)?;
        let result = resource.view(self.lock_timeout, f);
        if result.is_none() {
            warn!(host = %host, "Timed out waiting for resource lock");
        }
        result
    }

    /// Point every resource whose URL contains `host` at a new anchor file.
    pub fn update_certificate_by_host(&self, host: &str, filename: &str) -> usize {
        let mut updated = 0;
        for resource in self.snapshot() {
            let Some(mut state) = resource.lock(self.lock_timeout) else {
                warn!(host = resource.host(), "Timed out waiting for resource lock, anchor not updated");
                continue;
            };
            if state.url.contains(host) {
                state.anchor = AnchorResolution::File(filename.to_string());
                updated += 1;
                info!(url = %state.url, host, file = filename, "Trust anchor updated");
            }
        }
        updated
    }

    /// Repoint a resource to another URL on the same host, keeping its cache.
    pub fn update_url(&self, old_url: &str, new_url: &str) -> Result<(), RegistryError> {
        let old_host = host_of(old_url).map_err(|_| RegistryError::NotFound(old_url.to_string()))?;
        let new_host = host_of(new_url)?;
        let resource = self
            .get_by_host(&old_host)
            .ok_or_else(|| RegistryError::NotFound(old_url.to_string()))?;
        let mut state = resource
            .lock(self.lock_timeout)
            .ok_or_else(|| RegistryError::LockTimeout(old_host.clone()))?;
        if state.url != old_url {
            return Err(RegistryError::NotFound(old_url.to_string()));
        }
        if old_host != new_host {
            return Err(RegistryError::HostMismatch {
                expected: old_host,
                found: new_host,
            });
        }
        debug!(old = old_url, new = new_url, "Resource repointed");
        state.url = new_url.to_string();
        Ok(())
    }

    pub fn statuses(&self) -> Vec<ResourceStatus> {
        self.snapshot()
            .iter()
            .filter_map(|r| r.status(self.lock_timeout))
            .collect()
    }

    pub fn get_by_host(&self, host: &str) -> Option<Arc<ManagedResource>> {
        self.resources
            .read()
            .iter()
            .find(|r| r.host() == host)
            .cloned()
    }

    pub fn status_of(&self, host: &str) -> Option<ResourceStatus> {
        self.get_by_host(&host.to_ascii_lowercase())?
            .status(self.lock_timeout)
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<ManagedResource>> {
        self.resources.read().clone()
    }

    /// The due resource attempted longest ago; never-attempted ones first,
    /// ties broken by registration order. Resources whose lock is held right
    /// now are passed over until a later tick.
    pub(crate) fn next_due(&self, policy: &RetryPolicy, now: Instant) -> Option<Arc<ManagedResource>> {
        let mut best: Option<(Option<Instant>, Arc<ManagedResource>)> = None;
        for resource in self.snapshot() {
            let Some(last_attempt) = resource.due_since(policy, now, Duration::ZERO) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((best_attempt, _)) => last_attempt < *best_attempt,
            };
            if better {
                best = Some((last_attempt, resource));
            }
        }
        best.map(|(_, resource)| resource)
    }
}
