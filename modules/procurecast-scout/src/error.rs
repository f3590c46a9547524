use thiserror::Error;

use procurecast_store::StoreError;

pub type ScoutResult<T> = std::result::Result<T, ScoutError>;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("timed out after {secs}s fetching {url}")]
    Timeout { url: String, secs: u64 },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("browser returned an empty DOM for {0}")]
    EmptyDom(String),

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid selector {0:?}")]
    Selector(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ScoutError {
    /// Worth another attempt after backing off: timeouts, rate limiting,
    /// server-side failures and dropped connections.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::EmptyDom(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Browser(msg) => {
                msg.contains("Cannot fork") || msg.contains("Resource temporarily unavailable")
            }
            _ => false,
        }
    }
}
