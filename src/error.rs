use thiserror::Error;

/// Failure of a single download attempt inside the worker.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("response exceeded download buffer of {capacity} bytes")]
    BufferOverflow { capacity: usize },

    #[error("could not allocate {requested} bytes")]
    AllocationFailure { requested: usize },

    #[error("request timed out")]
    Timeout,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("resource lock not acquired in time")]
    LockTimeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outcome delivered to one-shot callers that did not get a reply.
///
/// Every variant maps to a distinct negative sentinel so callers that only
/// keep an integer status can still tell them apart from HTTP codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("No link")]
    LinkDown,

    #[error("Queue full")]
    QueueFull,

    #[error("Worker stopped")]
    WorkerStopped,

    #[error("Buffer overflow")]
    BufferOverflow,

    #[error("Allocation failed")]
    AllocationFailure,

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("TLS failed: {0}")]
    Tls(String),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl RequestError {
    pub fn code(&self) -> i32 {
        match self {
            RequestError::Connect(_) => -1,
            RequestError::Tls(_) => -2,
            RequestError::Timeout => -3,
            RequestError::InvalidUrl(_) => -4,
            RequestError::LinkDown => -7,
            RequestError::Transport(_) => -10,
            RequestError::AllocationFailure => -11,
            RequestError::QueueFull => -12,
            RequestError::WorkerStopped => -13,
            RequestError::BufferOverflow => -20,
        }
    }
}

impl From<FetchError> for RequestError {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::Connect(msg) => RequestError::Connect(msg),
            FetchError::Tls(msg) => RequestError::Tls(msg),
            FetchError::BufferOverflow { .. } => RequestError::BufferOverflow,
            FetchError::AllocationFailure { .. } => RequestError::AllocationFailure,
            FetchError::Timeout => RequestError::Timeout,
            FetchError::InvalidUrl(msg) => RequestError::InvalidUrl(msg),
            // One-shot jobs never take a resource lock and report status codes
            // through the reply, so these only surface as generic transport errors.
            other @ (FetchError::HttpStatus(_)
            | FetchError::LockTimeout
            | FetchError::Transport(_)) => RequestError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_codes_are_distinct_and_negative() {
        let all = [
            RequestError::LinkDown,
            RequestError::QueueFull,
            RequestError::WorkerStopped,
            RequestError::BufferOverflow,
            RequestError::AllocationFailure,
            RequestError::Connect(String::new()),
            RequestError::Tls(String::new()),
            RequestError::Timeout,
            RequestError::InvalidUrl(String::new()),
            RequestError::Transport(String::new()),
        ];
        let mut codes: Vec<i32> = all.iter().map(RequestError::code).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_messages() {
        assert_eq!(RequestError::LinkDown.to_string(), "No link");
        assert_eq!(RequestError::QueueFull.to_string(), "Queue full");
    }

    #[test]
    fn test_fetch_error_conversion() {
        let err: RequestError = FetchError::BufferOverflow { capacity: 10 }.into();
        assert_eq!(err, RequestError::BufferOverflow);
        let err: RequestError = FetchError::Connect("refused".into()).into();
        assert_eq!(err.code(), -1);
    }
}
