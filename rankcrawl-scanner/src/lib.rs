pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod pool;
pub mod result;

pub use error::{FetchError, ScanError};
pub use fetcher::{HttpFetcher, PageFetcher};
pub use pool::{FetchOutcome, FetchPool, ProgressCallback};
pub use result::PageRecord;
