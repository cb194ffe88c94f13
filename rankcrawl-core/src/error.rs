use rankcrawl_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    /// Bad input caught before any fetching starts.
    #[error(transparent)]
    Input(#[from] ScanError),

    #[error("Link graph is frozen; {0} rejected")]
    GraphFrozen(String),

    #[error("Invalid damping factor {0}: must be within [0, 1)")]
    InvalidDampingFactor(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
