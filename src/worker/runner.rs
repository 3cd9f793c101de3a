//! Execution of periodic refreshes and one-shot jobs

use bytes::Bytes;
use reqwest::Url;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::Worker;
use super::http::HttpRequest;
use crate::buffer::next_capacity;
use crate::certs::TrustAnchor;
use crate::error::{FetchError, RequestError};
use crate::queue::{HttpReply, Job};
use crate::registry::{FetchPlan, ManagedResource};
use crate::retry::RetryPhase;

/// Copy a finished download out of the shared buffer into an exactly-sized
/// allocation the resource can own.
fn copy_payload(data: &[u8]) -> Result<Bytes, FetchError> {
    let mut owned = Vec::new();
    owned
        .try_reserve_exact(data.len())
        .map_err(|_| FetchError::AllocationFailure {
            requested: data.len(),
        })?;
    owned.extend_from_slice(data);
    Ok(Bytes::from(owned))
}

fn is_https(url: &str) -> Result<bool, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
    Ok(parsed.scheme() == "https")
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

impl Worker {
    /// Returns false when the resource lock could not be taken and no
    /// download was attempted.
    pub(super) async fn perform_update(&mut self, resource: &ManagedResource) -> bool {
        let timeout = self.registry.lock_timeout();
        let plan = match resource.begin_attempt(Instant::now(), timeout) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(host = resource.host(), error = %e, "Skipping refresh");
                return false;
            }
        };

        info!(url = %plan.url, "Refreshing resource");
        let url = plan.url.clone();
        let committed = match self.download_resource(resource, plan).await {
            Ok(payload) => {
                let size = payload.len();
                resource
                    .commit_success(payload, timeout)
                    .map(|()| size)
            }
            Err(e) => Err(e),
        };

        match committed {
            Ok(size) => {
                self.metrics.refresh_ok();
                info!(url = %url, size, "Resource updated");
            }
            Err(e) => self.record_failure(resource, &url, e),
        }
        true
    }

    /// Fetch into the shared buffer, growing it on overflow, and return an
    /// owned copy of the body.
    async fn download_resource(
        &mut self,
        resource: &ManagedResource,
        plan: FetchPlan,
    ) -> Result<Bytes, FetchError> {
        let anchor = self.anchor_for_resource(resource, &plan)?;
        let request = HttpRequest::get(&plan.url, resource.headers());
        let mut growths = 0;

        loop {
            let mut sink = self.buffer.sink();
            let meta = self
                .transport
                .execute(&request, anchor.as_ref(), &mut sink)
                .await?;

            if !is_success(meta.status) {
                return Err(FetchError::HttpStatus(meta.status));
            }
            if !sink.is_overflowed() {
                return copy_payload(sink.as_slice());
            }

            let capacity = sink.capacity();
            if growths >= self.config.max_growth_attempts {
                return Err(FetchError::BufferOverflow { capacity });
            }
            self.grow_buffer(meta.content_length)?;
            growths += 1;
        }
    }

    fn grow_buffer(&mut self, announced: Option<u64>) -> Result<(), FetchError> {
        let current = self.buffer.capacity();
        let needed = announced.and_then(|n| usize::try_from(n).ok());
        let wanted = next_capacity(current, self.config.growth_block, needed);
        let target = wanted.min(self.buffer.max_capacity());
        if target <= current {
            return Err(FetchError::AllocationFailure { requested: wanted });
        }

        info!(from = current, to = target, "Download buffer overflow, growing");
        self.buffer.grow_to(target)?;
        self.metrics.buffer_grown();

        if let Err(e) = self.capacity_store.save(target) {
            warn!(capacity = target, error = %e, "Could not persist buffer capacity");
        }
        Ok(())
    }

    fn anchor_for_resource(
        &self,
        resource: &ManagedResource,
        plan: &FetchPlan,
    ) -> Result<Option<TrustAnchor>, FetchError> {
        if !is_https(&plan.url)? {
            return Ok(None);
        }

        let mut resolution = plan.anchor.clone();
        let anchor = self
            .resolver
            .anchor_for(resource.host(), &mut resolution, resource.fallback_anchor());
        if resolution != plan.anchor {
            resource.store_resolution(resolution, self.registry.lock_timeout());
        }
        anchor.map(Some)
    }

    fn record_failure(&self, resource: &ManagedResource, url: &str, e: FetchError) {
        self.metrics.refresh_failed();
        let policy = &self.config.retry;

        match resource.commit_failure(policy, self.registry.lock_timeout()) {
            Ok(RetryPhase::GivenUp) => error!(
                url,
                error = %e,
                max_failures = policy.max_failures,
                "Refresh failed, giving up until next regular interval"
            ),
            Ok(RetryPhase::Retrying { failures }) => warn!(
                url,
                error = %e,
                failures,
                max_failures = policy.max_failures,
                retry_in_secs = policy.retry_interval.as_secs(),
                "Refresh failed, retrying"
            ),
            Ok(RetryPhase::Fresh) => {}
            Err(lock_err) => warn!(url, error = %e, %lock_err, "Refresh failed and could not be recorded"),
        }
    }

    pub(super) async fn perform_job(&mut self, job: Job) {
        let method = job.request.method;
        info!(id = %job.id, %method, url = %job.request.url, "Running job");

        let anchor = match self.anchor_for_job(&job.request.url) {
            Ok(anchor) => anchor,
            Err(e) => {
                warn!(id = %job.id, error = %e, "Job failed before connecting");
                self.metrics.job_completed();
                job.fail(e.into());
                return;
            }
        };

        let request = HttpRequest {
            method,
            url: &job.request.url,
            headers: &job.request.headers,
            body: Some(&job.request.body).filter(|b| !b.is_empty()),
            content_type: job.request.content_type.as_deref(),
        };

        let mut sink = self.buffer.sink();
        let result = self
            .transport
            .execute(&request, anchor.as_ref(), &mut sink)
            .await;
        self.metrics.job_completed();

        match result {
            Err(e) => {
                warn!(id = %job.id, error = %e, "Job failed");
                job.fail(RequestError::from(e));
            }
            Ok(_) if sink.is_overflowed() => {
                // Jobs are transient; only periodic refreshes grow the buffer.
                warn!(id = %job.id, capacity = sink.capacity(), "Job response exceeds download buffer");
                job.fail(RequestError::BufferOverflow);
            }
            Ok(meta) => {
                if !is_success(meta.status) {
                    warn!(id = %job.id, status = meta.status, "Job returned error status");
                }
                job.complete(Ok(HttpReply {
                    status: meta.status,
                    body: sink.as_slice(),
                }));
            }
        }
    }

    fn anchor_for_job(&self, url: &str) -> Result<Option<TrustAnchor>, FetchError> {
        if !is_https(url)? {
            return Ok(None);
        }
        let host = crate::registry::host_of(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        self.resolver.anchor_for_job(&host).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_payload_is_exact() {
        let payload = copy_payload(b"OK").unwrap();
        assert_eq!(&payload[..], b"OK");
        assert_eq!(payload.len(), 2);
    }

    #[test]
    fn test_is_https() {
        assert!(is_https("https://example.com/").unwrap());
        assert!(!is_https("http://example.com/").unwrap());
        assert!(matches!(is_https("::nope"), Err(FetchError::InvalidUrl(_))));
    }
}
