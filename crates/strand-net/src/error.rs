use thiserror::Error;
use url::Url;

pub type NetResult<T> = Result<T, NetError>;

/// Centralized error type for strand-net.
#[derive(Debug, Error)]
pub enum NetError {
    /// Connection-level failure (reset, refused, aborted mid-body).
    #[error("connection error: {0}")]
    Connection(String),

    /// Connect or read timeout.
    #[error("timeout")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: Url },

    /// Request could not be built or sent for a non-network reason.
    #[error("request failed: {0}")]
    Request(String),

    /// Fetch was cancelled while in flight or while backing off.
    #[error("cancelled")]
    Cancelled,
}

impl NetError {
    /// Whether a retry may succeed.
    ///
    /// Only connection-level faults and timeouts are transient; status
    /// errors (401, 404, even 5xx) and malformed requests are terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout)
    }
}

impl From<reqwest::Error> for NetError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        if e.is_connect() || e.is_body() || e.is_decode() {
            // Alternate formatting includes the full source chain
            // (e.g. "error sending request ...: connection reset by peer").
            return Self::Connection(format!("{e:#}"));
        }
        Self::Request(format!("{e:#}"))
    }
}
