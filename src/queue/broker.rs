use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tracing::{debug, warn};

use super::job::Job;
use crate::error::RequestError;
use crate::link::LinkStatus;
use crate::observability::FetchMetrics;

/// Hands one-shot jobs to the fetch worker.
///
/// Flow:
/// 1. Caller builds a `Job` (request + callback)
/// 2. Broker refuses it right away if the link is known to be down
/// 3. Otherwise it waits at most `enqueue_timeout` for a queue slot
/// 4. Any refusal runs the job's callback before returning
///
/// The broker never holds a job after returning: it is either in the
/// channel or its callback has already run.
pub struct JobBroker {
    sender: mpsc::Sender<Job>,
    link: Arc<dyn LinkStatus>,
    enqueue_timeout: Duration,
    metrics: Arc<FetchMetrics>,
}

impl JobBroker {
    /// Returns the broker and the receiving end the worker drains.
    pub fn new(
        capacity: usize,
        enqueue_timeout: Duration,
        link: Arc<dyn LinkStatus>,
        metrics: Arc<FetchMetrics>,
    ) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let broker = Self {
            sender,
            link,
            enqueue_timeout,
            metrics,
        };
        (broker, receiver)
    }

    /// Queue a job, waiting briefly for room.
    ///
    /// On `Err` the job's callback has already been invoked with the same error.
    pub async fn submit(&self, job: Job) -> Result<(), RequestError> {
        let Some(job) = self.check_link(job) else {
            return Err(RequestError::LinkDown);
        };

        let id = job.id;
        match self.sender.send_timeout(job, self.enqueue_timeout).await {
            Ok(()) => {
                debug!(%id, "Job queued");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(job)) => Err(self.reject(job, RequestError::QueueFull)),
            Err(SendTimeoutError::Closed(job)) => Err(self.reject(job, RequestError::WorkerStopped)),
        }
    }

    /// Queue a job without waiting, for callers outside the async runtime.
    pub fn try_submit(&self, job: Job) -> Result<(), RequestError> {
        let Some(job) = self.check_link(job) else {
            return Err(RequestError::LinkDown);
        };

        match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => Err(self.reject(job, RequestError::QueueFull)),
            Err(TrySendError::Closed(job)) => Err(self.reject(job, RequestError::WorkerStopped)),
        }
    }

    /// Jobs waiting for the worker.
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn check_link(&self, job: Job) -> Option<Job> {
        if self.link.is_up() {
            return Some(job);
        }
        self.reject(job, RequestError::LinkDown);
        None
    }

    fn reject(&self, job: Job, error: RequestError) -> RequestError {
        warn!(
            id = %job.id,
            method = %job.request.method,
            url = %job.request.url,
            error = %error,
            "Job rejected"
        );
        self.metrics.job_rejected();
        job.fail(error.clone());
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkFlag;
    use crate::queue::{JobCallback, JobRequest};
    use std::sync::Mutex;

    fn recording_job(log: &Arc<Mutex<Vec<Option<i32>>>>) -> Job {
        let log = log.clone();
        Job::new(
            JobRequest::get("https://api.test/"),
            JobCallback::detailed(move |outcome| {
                log.lock().unwrap().push(outcome.err().map(|e| e.code()));
            }),
        )
    }

    fn broker(capacity: usize, up: bool) -> (JobBroker, mpsc::Receiver<Job>, Arc<FetchMetrics>) {
        let metrics = Arc::new(FetchMetrics::new());
        let (broker, rx) = JobBroker::new(
            capacity,
            Duration::from_millis(100),
            Arc::new(LinkFlag::new(up)),
            metrics.clone(),
        );
        (broker, rx, metrics)
    }

    #[tokio::test]
    async fn test_link_down_fails_immediately_without_enqueue() {
        let (broker, mut rx, metrics) = broker(4, false);
        let log = Arc::new(Mutex::new(Vec::new()));

        assert_eq!(broker.submit(recording_job(&log)).await, Err(RequestError::LinkDown));
        assert_eq!(broker.submit(recording_job(&log)).await, Err(RequestError::LinkDown));

        assert_eq!(log.lock().unwrap().as_slice(), &[Some(-7), Some(-7)]);
        assert_eq!(broker.pending(), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.snapshot().jobs_rejected, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_rejects_after_timeout() {
        let (broker, _rx, _metrics) = broker(1, true);
        let log = Arc::new(Mutex::new(Vec::new()));

        broker.submit(recording_job(&log)).await.unwrap();
        assert_eq!(broker.submit(recording_job(&log)).await, Err(RequestError::QueueFull));

        // Only the rejected job has reported; the queued one is still pending.
        assert_eq!(log.lock().unwrap().as_slice(), &[Some(-12)]);
        assert_eq!(broker.pending(), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_reports_worker_stopped() {
        let (broker, rx, _metrics) = broker(2, true);
        drop(rx);
        let log = Arc::new(Mutex::new(Vec::new()));

        assert_eq!(broker.submit(recording_job(&log)).await, Err(RequestError::WorkerStopped));
        assert_eq!(log.lock().unwrap().as_slice(), &[Some(-13)]);
    }

    #[test]
    fn test_try_submit_without_runtime() {
        let (broker, mut rx, _metrics) = broker(1, true);
        let log = Arc::new(Mutex::new(Vec::new()));

        broker.try_submit(recording_job(&log)).unwrap();
        assert_eq!(broker.try_submit(recording_job(&log)), Err(RequestError::QueueFull));
        assert!(rx.try_recv().is_ok());
        assert_eq!(log.lock().unwrap().as_slice(), &[Some(-12)]);
    }
}
