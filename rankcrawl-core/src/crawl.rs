use crate::error::Result;
use crate::graph::LinkGraph;
use crate::visited::VisitedSet;
use rankcrawl_scanner::normalize::{host_of, normalize_url, same_host};
use rankcrawl_scanner::pool::DEFAULT_FETCH_TIMEOUT;
use rankcrawl_scanner::{FetchError, FetchPool, PageFetcher, PageRecord, ProgressCallback, ScanError};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Options for configuring a crawl operation
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub start_url: String,
    pub max_duration: Duration,
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    /// Most URLs admitted per batch, capped at `concurrency`. `None` means one
    /// URL per worker.
    pub batch_size: Option<usize>,
    pub scope: CrawlScope,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            start_url: String::new(),
            max_duration: Duration::from_secs(30),
            concurrency: 10,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            batch_size: None,
            scope: CrawlScope::AnyHost,
        }
    }
}

/// Which discovered links may be scheduled for fetching.
///
/// Out-of-scope links are still recorded as edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrawlScope {
    #[default]
    AnyHost,
    /// Only the start URL's host and its subdomains
    SameHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    Deadline,
    FrontierExhausted,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Deadline,
    FrontierExhausted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Deadline => "deadline",
            StopReason::FrontierExhausted => "frontier_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub url: String,
    pub error: FetchError,
}

/// Snapshot of crawl progress, reported after every batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrawlProgress {
    pub batch: usize,
    pub fetched: usize,
    pub failed: usize,
    pub nodes: usize,
    pub edges: usize,
    pub frontier: usize,
    pub elapsed: Duration,
}

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(CrawlProgress) + Send + Sync>;

/// Everything a finished crawl produced. The graph is frozen.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub start_url: String,
    pub graph: LinkGraph,
    pub failures: Vec<FetchFailure>,
    pub stop_reason: StopReason,
    pub batches: usize,
    pub fetched: usize,
    pub elapsed: Duration,
}

/// Time-boxed, breadth-wise crawler.
///
/// Each round admits a bounded batch from the frontier through the
/// [`VisitedSet`], fetches it on a [`FetchPool`], and folds the results into
/// the [`LinkGraph`] before the next batch is formed. The deadline is checked
/// between batches only. A batch never holds more URLs than there are
/// workers, so a crawl overshoots by at most one fetch timeout.
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    fetch_timeout: Duration,
    batch_size: Option<usize>,
    scope: CrawlScope,
    state: CrawlState,
    progress_callback: Option<CrawlProgressCallback>,
    fetch_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            batch_size: None,
            scope: CrawlScope::AnyHost,
            state: CrawlState::Idle,
            progress_callback: None,
            fetch_callback: None,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Values above the crawl's concurrency are capped to it.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_scope(mut self, scope: CrawlScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_progress_callback(mut self, callback: CrawlProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Called with `(worker_id, url)` right before each fetch.
    pub fn with_fetch_callback(mut self, callback: ProgressCallback) -> Self {
        self.fetch_callback = Some(callback);
        self
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    fn transition(&mut self, next: CrawlState) {
        debug!("Crawler state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Crawl outward from `start_url` until `max_duration` elapses or there is
    /// nothing left to fetch.
    ///
    /// Only bad input is an error. Failed fetches are collected in
    /// [`CrawlOutcome::failures`], and a crawl whose start page fails simply
    /// returns an empty graph.
    pub async fn crawl(
        &mut self,
        start_url: &str,
        max_duration: Duration,
        concurrency: usize,
    ) -> Result<CrawlOutcome> {
        if concurrency == 0 {
            return Err(ScanError::InvalidConcurrency(concurrency).into());
        }
        let start_url = normalize_url(start_url)?;
        let base_host = host_of(&start_url).unwrap_or_default();

        let started = Instant::now();
        // `None` only for durations too large to represent; treat as no deadline.
        let deadline = started.checked_add(max_duration);
        // A batch larger than the pool would run several fetch rounds between
        // deadline checks.
        let batch_limit = self.batch_size.unwrap_or(concurrency).clamp(1, concurrency);

        let graph = LinkGraph::new();
        let visited = VisitedSet::new();
        let mut pool = FetchPool::new(self.fetcher.clone()).with_timeout(self.fetch_timeout);
        if let Some(ref callback) = self.fetch_callback {
            pool = pool.with_progress_callback(callback.clone());
        }

        let mut frontier: VecDeque<String> = VecDeque::from([start_url.clone()]);
        let mut pending: HashSet<String> = HashSet::from([start_url.clone()]);
        let mut failures = Vec::new();
        let mut batches = 0;
        let mut fetched = 0;

        info!(
            "Starting crawl of {} for {:?} with {} workers",
            start_url, max_duration, concurrency
        );
        self.transition(CrawlState::Running);

        let stop_reason = loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break StopReason::Deadline;
            }
            if frontier.is_empty() {
                break StopReason::FrontierExhausted;
            }

            let mut batch = Vec::with_capacity(batch_limit);
            while batch.len() < batch_limit {
                let Some(url) = frontier.pop_front() else {
                    break;
                };
                pending.remove(&url);
                if visited.mark_seen(&url) {
                    batch.push(url);
                }
            }
            if batch.is_empty() {
                continue;
            }

            batches += 1;
            debug!("Batch {}: fetching {} URLs", batches, batch.len());
            let outcomes = pool.run_batch(batch, concurrency).await?;

            for (url, result) in outcomes {
                match result {
                    Ok(page) => {
                        fetched += 1;
                        let links = incorporate(&graph, &url, page)?;
                        for link in links {
                            let in_scope = match self.scope {
                                CrawlScope::AnyHost => true,
                                CrawlScope::SameHost => same_host(&link, &base_host),
                            };
                            if in_scope && !visited.has(&link) && pending.insert(link.clone()) {
                                frontier.push_back(link);
                            }
                        }
                    }
                    Err(error) => failures.push(FetchFailure { url, error }),
                }
            }

            let progress = CrawlProgress {
                batch: batches,
                fetched,
                failed: failures.len(),
                nodes: graph.node_count(),
                edges: graph.edge_count(),
                frontier: frontier.len(),
                elapsed: started.elapsed(),
            };
            debug!("Batch {} done: {:?}", batches, progress);
            if let Some(ref callback) = self.progress_callback {
                callback(progress);
            }
        };

        self.transition(match stop_reason {
            StopReason::Deadline => CrawlState::Deadline,
            StopReason::FrontierExhausted => CrawlState::FrontierExhausted,
        });
        graph.freeze();
        self.transition(CrawlState::Done);

        let elapsed = started.elapsed();
        info!(
            "Crawl complete ({}). {} pages, {} links, {} failures in {} batches over {:?}",
            stop_reason.as_str(),
            graph.node_count(),
            graph.edge_count(),
            failures.len(),
            batches,
            elapsed
        );

        Ok(CrawlOutcome {
            start_url,
            graph,
            failures,
            stop_reason,
            batches,
            fetched,
            elapsed,
        })
    }
}

/// Add the page's node and its outgoing edges, returning the normalized
/// link targets in page order.
fn incorporate(graph: &LinkGraph, url: &str, page: PageRecord) -> Result<Vec<String>> {
    let title = Some(page.title).filter(|t| !t.is_empty());
    graph.upsert_node(url, title, page.description)?;

    let mut links = Vec::with_capacity(page.outbound_links.len());
    for raw in page.outbound_links {
        let Ok(link) = normalize_url(&raw) else {
            debug!("Dropping unusable link {} on {}", raw, url);
            continue;
        };
        if graph.add_edge(url, &link)? {
            links.push(link);
        }
    }
    Ok(links)
}

/// Execute a crawl with the given options
pub async fn execute_crawl(
    options: CrawlOptions,
    fetcher: Arc<dyn PageFetcher>,
    progress_callback: Option<CrawlProgressCallback>,
    fetch_callback: Option<ProgressCallback>,
) -> Result<CrawlOutcome> {
    let CrawlOptions {
        start_url,
        max_duration,
        concurrency,
        fetch_timeout,
        batch_size,
        scope,
    } = options;

    let mut crawler = Crawler::new(fetcher)
        .with_fetch_timeout(fetch_timeout)
        .with_scope(scope);
    if let Some(batch_size) = batch_size {
        crawler = crawler.with_batch_size(batch_size);
    }
    if let Some(callback) = progress_callback {
        crawler = crawler.with_progress_callback(callback);
    }
    if let Some(callback) = fetch_callback {
        crawler = crawler.with_fetch_callback(callback);
    }

    crawler.crawl(&start_url, max_duration, concurrency).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoFetcher;

    #[async_trait]
    impl PageFetcher for EchoFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> std::result::Result<PageRecord, FetchError> {
            Ok(PageRecord::new(url)
                .with_title("")
                .with_links([url.to_string(), "not a url".to_string(), "http://B.com/x/".to_string()]))
        }
    }

    #[test]
    fn test_incorporate_normalizes_and_skips_bad_links() {
        let graph = LinkGraph::new();
        let page = PageRecord::new("http://a.com/")
            .with_links(["http://a.com/b#frag", "::bad::", "http://a.com/b", "http://a.com/c/"]);

        let links = incorporate(&graph, "http://a.com/", page).unwrap();

        assert_eq!(links, vec!["http://a.com/b", "http://a.com/c"]);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.node("http://a.com/").unwrap().title, None);
    }

    #[tokio::test]
    async fn test_state_machine_ends_in_done() {
        let mut crawler = Crawler::new(Arc::new(EchoFetcher));
        assert_eq!(crawler.state(), CrawlState::Idle);

        let outcome = crawler
            .crawl("http://a.com/", Duration::from_secs(5), 2)
            .await
            .unwrap();

        assert_eq!(crawler.state(), CrawlState::Done);
        assert_eq!(outcome.stop_reason, StopReason::FrontierExhausted);
        assert!(outcome.graph.is_frozen());
        // a.com links to itself and b.com/x; b.com/x only to itself
        assert_eq!(outcome.graph.node_count(), 2);
        assert_eq!(outcome.graph.edge_count(), 3);
    }
}
