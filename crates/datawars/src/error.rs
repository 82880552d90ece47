use thiserror::Error;

/// Failures talking to the Datawars API.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The per-request deadline elapsed.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection-level failure (DNS, TLS, reset, ...).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-2xx status.
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The body could not be decoded into records.
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("http client setup failed: {0}")]
    Client(String),
}

impl SourceError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Timeout { .. } | SourceError::Transport { .. } => true,
            SourceError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout {
                url: url.to_string(),
            }
        } else {
            SourceError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}
