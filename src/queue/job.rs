use bytes::Bytes;
use std::fmt;
use uuid::Uuid;

use crate::error::RequestError;
use crate::registry::HeaderList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request half of a one-shot job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub method: Method,
    pub url: String,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub headers: HeaderList,
}

impl JobRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: Bytes::new(),
            content_type: None,
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: body.into(),
            content_type: Some(content_type.into()),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status and body of a completed request, borrowed from the download buffer.
#[derive(Debug, Clone, Copy)]
pub struct HttpReply<'a> {
    pub status: u16,
    pub body: &'a [u8],
}

impl HttpReply<'_> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(self.body).ok()
    }

    pub fn to_owned_reply(&self) -> OwnedReply {
        OwnedReply {
            status: self.status,
            body: Bytes::copy_from_slice(self.body),
        }
    }
}

/// Reply that outlives the worker's buffer, used by `WebClient::fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedReply {
    pub status: u16,
    pub body: Bytes,
}

pub type JobOutcome<'a> = Result<HttpReply<'a>, RequestError>;

type RawCallback = Box<dyn FnOnce(Option<&[u8]>) + Send>;
type DetailedCallback = Box<dyn FnOnce(JobOutcome<'_>) + Send>;

/// How a job reports back. Exactly one of these runs, exactly once.
pub enum JobCallback {
    /// Body on a 2xx reply, `None` for everything else.
    Raw(RawCallback),
    /// Status and body for any reply, or the reason there was none.
    Detailed(DetailedCallback),
}

impl JobCallback {
    pub fn raw<F>(f: F) -> Self
    where
        F: FnOnce(Option<&[u8]>) + Send + 'static,
    {
        JobCallback::Raw(Box::new(f))
    }

    pub fn detailed<F>(f: F) -> Self
    where
        F: FnOnce(JobOutcome<'_>) + Send + 'static,
    {
        JobCallback::Detailed(Box::new(f))
    }
}

impl fmt::Debug for JobCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobCallback::Raw(_) => f.write_str("JobCallback::Raw"),
            JobCallback::Detailed(_) => f.write_str("JobCallback::Detailed"),
        }
    }
}

/// A one-shot request owned by the queue until the worker completes it.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub request: JobRequest,
    callback: JobCallback,
}

impl Job {
    pub fn new(request: JobRequest, callback: JobCallback) -> Self {
        Self {
            id: Uuid::now_v7(),
            request,
            callback,
        }
    }

    /// Deliver the outcome. Consumes the job, so the callback cannot run twice.
    pub fn complete(self, outcome: JobOutcome<'_>) {
        match self.callback {
            JobCallback::Raw(callback) => match outcome {
                Ok(reply) if reply.is_success() => callback(Some(reply.body)),
                _ => callback(None),
            },
            JobCallback::Detailed(callback) => callback(outcome),
        }
    }

    pub fn fail(self, error: RequestError) {
        self.complete(Err(error));
    }
}
