use std::time::Duration;
use thiserror::Error;

/// Setup and input errors. These fail fast, before any page is fetched.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid concurrency {0}: at least one worker is required")]
    InvalidConcurrency(usize),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Failure to fetch a single page. Always recovered by the caller: the page
/// gets no node, and links pointing at it stay dangling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timed out after {timeout:?} fetching {url}")]
    Timeout { url: String, timeout: Duration },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Not an HTML page: {url} ({content_type})")]
    NotHtml { url: String, content_type: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Malformed response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("Fetch worker aborted before reporting {url}")]
    Aborted { url: String },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else if err.is_decode() || err.is_body() {
            FetchError::Malformed {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Short machine-friendly label, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::Timeout { .. } => "timeout",
            FetchError::Status { .. } => "status",
            FetchError::NotHtml { .. } => "not_html",
            FetchError::Network { .. } => "network",
            FetchError::Malformed { .. } => "malformed",
            FetchError::Aborted { .. } => "aborted",
        }
    }
}
