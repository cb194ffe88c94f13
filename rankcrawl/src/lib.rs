// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    CrawlSettings, build_crawl_options, extract_url_path, parse_start_url, resolve_output_path,
};

// Re-export crawl functionality from rankcrawl-core
pub use rankcrawl_core::crawl::{CrawlOptions, CrawlProgressCallback, CrawlScope, execute_crawl};
pub use rankcrawl_core::report::{ReportFormat, generate_rank_report};
