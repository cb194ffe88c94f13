pub mod crawl;
pub mod error;
pub mod graph;
pub mod rank;
pub mod report;
pub mod visited;

pub use crawl::{CrawlOptions, CrawlOutcome, CrawlScope, CrawlState, Crawler, StopReason};
pub use error::{CrawlError, Result};
pub use graph::{GraphEdge, GraphNode, GraphSnapshot, LinkGraph};
pub use rank::{RankEngine, RankOptions, RankOutcome};
pub use report::{RankedSnapshot, ReportFormat};
pub use visited::VisitedSet;
