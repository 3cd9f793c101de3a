use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::certs::AnchorResolution;
use crate::error::FetchError;
use crate::retry::{RetryPhase, RetryPolicy, RetryState};

pub type HeaderList = Vec<(String, String)>;

/// A periodically refreshed payload, identified by its hostname.
#[derive(Debug)]
pub struct ManagedResource {
    host: String,
    interval: Duration,
    fallback_anchor: Option<Bytes>,
    headers: HeaderList,
    state: Mutex<ResourceState>,
}

/// Everything behind the resource lock.
#[derive(Debug)]
pub(crate) struct ResourceState {
    pub url: String,
    pub anchor: AnchorResolution,
    pub data: Bytes,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<Instant>,
    pub retry: RetryState,
    pub stale: bool,
}

/// Borrowed view handed to `access_resource` callbacks.
#[derive(Debug, Clone, Copy)]
pub struct ResourceView<'a> {
    pub data: &'a [u8],
    pub last_update: Option<DateTime<Utc>>,
    pub is_stale: bool,
}

impl ResourceView<'_> {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(self.data).ok()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub host: String,
    pub url: String,
    pub interval_secs: u64,
    pub size: usize,
    pub stale: bool,
    pub failures: u32,
    pub retry_mode: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub anchor: Option<String>,
}

/// What the worker needs to run one refresh, copied out under the lock.
#[derive(Debug, Clone)]
pub(crate) struct FetchPlan {
    pub url: String,
    pub anchor: AnchorResolution,
}

impl ManagedResource {
    pub(crate) fn new(
        host: String,
        url: String,
        interval: Duration,
        fallback_anchor: Option<Bytes>,
        headers: HeaderList,
    ) -> Self {
        Self {
            host,
            interval,
            fallback_anchor,
            headers,
            state: Mutex::new(ResourceState {
                url,
                anchor: AnchorResolution::Unresolved,
                data: Bytes::new(),
                last_success: None,
                last_attempt: None,
                retry: RetryState::default(),
                stale: true,
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn fallback_anchor(&self) -> Option<&Bytes> {
        self.fallback_anchor.as_ref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub(crate) fn lock(&self, timeout: Duration) -> Option<MutexGuard<'_, ResourceState>> {
        self.state.try_lock_for(timeout)
    }

    pub(crate) fn view<R>(&self, timeout: Duration, f: impl FnOnce(ResourceView<'_>) -> R) -> Option<R> {
        let state = self.lock(timeout)?;
        Some(f(ResourceView {
            data: &state.data,
            last_update: state.last_success,
            is_stale: state.stale,
        }))
    }

    pub(crate) fn status(&self, timeout: Duration) -> Option<ResourceStatus> {
        let state = self.lock(timeout)?;
        Some(ResourceStatus {
            host: self.host.clone(),
            url: state.url.clone(),
            interval_secs: self.interval.as_secs(),
            size: state.data.len(),
            stale: state.stale,
            failures: state.retry.failures(),
            retry_mode: state.retry.in_retry_mode(),
            last_update: state.last_success,
            anchor: state.anchor.file_name().map(str::to_string),
        })
    }

    /// `Some(last_attempt)` when due at `now`.
    pub(crate) fn due_since(
        &self,
        policy: &RetryPolicy,
        now: Instant,
        timeout: Duration,
    ) -> Option<Option<Instant>> {
        let state = self.lock(timeout)?;
        state
            .retry
            .is_due(state.last_attempt, self.interval, policy, now)
            .then_some(state.last_attempt)
    }

    /// Stamp the attempt and copy out what the fetch needs.
    pub(crate) fn begin_attempt(&self, now: Instant, timeout: Duration) -> Result<FetchPlan, FetchError> {
        let mut state = self.lock(timeout).ok_or(FetchError::LockTimeout)?;
        state.last_attempt = Some(now);
        Ok(FetchPlan {
            url: state.url.clone(),
            anchor: state.anchor.clone(),
        })
    }

    /// Keep a freshly resolved anchor unless an explicit update landed meanwhile.
    pub(crate) fn store_resolution(&self, resolution: AnchorResolution, timeout: Duration) {
        if let Some(mut state) = self.lock(timeout) {
            if state.anchor == AnchorResolution::Unresolved {
                state.anchor = resolution;
            }
        }
    }

    pub(crate) fn commit_success(&self, payload: Bytes, timeout: Duration) -> Result<(), FetchError> {
        let mut state = self.lock(timeout).ok_or(FetchError::LockTimeout)?;
        state.data = payload;
        state.last_success = Some(Utc::now());
        state.stale = false;
        state.retry.record_success();
        Ok(())
    }

    pub(crate) fn commit_failure(
        &self,
        policy: &RetryPolicy,
        timeout: Duration,
    ) -> Result<RetryPhase, FetchError> {
        let mut state = self.lock(timeout).ok_or(FetchError::LockTimeout)?;
        state.stale = true;
        Ok(state.retry.record_failure(policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn resource() -> ManagedResource {
        ManagedResource::new(
            "api.test".into(),
            "https://api.test/data".into(),
            Duration::from_secs(600),
            None,
            Vec::new(),
        )
    }

    #[test]
    fn test_new_resource_is_stale_and_empty() {
        let res = resource();
        let (size, stale, last) = res
            .view(TIMEOUT, |v| (v.size(), v.is_stale, v.last_update))
            .unwrap();
        assert_eq!(size, 0);
        assert!(stale);
        assert!(last.is_none());
    }

    #[test]
    fn test_failure_keeps_previous_payload() {
        let res = resource();
        let policy = RetryPolicy::default();

        res.commit_success(Bytes::from_static(b"OK"), TIMEOUT).unwrap();
        assert_eq!(res.commit_failure(&policy, TIMEOUT).unwrap(), RetryPhase::Retrying { failures: 1 });

        let (text, stale) = res
            .view(TIMEOUT, |v| (v.text().map(str::to_string), v.is_stale))
            .unwrap();
        assert_eq!(text.as_deref(), Some("OK"));
        assert!(stale);
    }

    #[test]
    fn test_view_times_out_while_locked() {
        let res = resource();
        let _guard = res.lock(TIMEOUT).unwrap();
        assert!(res.view(Duration::from_millis(10), |v| v.size()).is_none());
    }

    #[test]
    fn test_explicit_anchor_is_not_overwritten() {
        let res = resource();
        res.lock(TIMEOUT).unwrap().anchor = AnchorResolution::File("manual.pem".into());
        res.store_resolution(AnchorResolution::NoMatch, TIMEOUT);
        assert_eq!(res.status(TIMEOUT).unwrap().anchor.as_deref(), Some("manual.pem"));
    }
}
