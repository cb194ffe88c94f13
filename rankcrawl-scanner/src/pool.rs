use crate::error::{FetchError, Result, ScanError};
use crate::fetcher::PageFetcher;
use crate::result::PageRecord;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// One input URL paired with what happened when it was fetched.
pub type FetchOutcome = (String, std::result::Result<PageRecord, FetchError>);

/// Default per-fetch timeout handed to the fetcher.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fans a batch of URLs out to a bounded set of worker tasks and collects
/// exactly one outcome per input.
///
/// Workers live only for the duration of [`FetchPool::run_batch`]; nothing is
/// kept running between batches.
pub struct FetchPool {
    fetcher: Arc<dyn PageFetcher>,
    timeout: Duration,
    progress_callback: Option<ProgressCallback>,
}

impl FetchPool {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            timeout: DEFAULT_FETCH_TIMEOUT,
            progress_callback: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Fetch every URL in `urls` with at most `concurrency` fetches in flight.
    ///
    /// Outcomes come back in input order. A failed fetch is reported in its
    /// slot and never aborts the rest of the batch. A fetch that panics is
    /// reported as [`FetchError::Aborted`] and the worker moves on to the next
    /// URL.
    pub async fn run_batch(&self, urls: Vec<String>, concurrency: usize) -> Result<Vec<FetchOutcome>> {
        if concurrency == 0 {
            return Err(ScanError::InvalidConcurrency(concurrency));
        }
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let total = urls.len();
        let workers = concurrency.min(total);
        debug!("Running batch of {} URLs on {} workers", total, workers);

        let queue: Arc<Mutex<VecDeque<(usize, String)>>> =
            Arc::new(Mutex::new(urls.iter().cloned().enumerate().collect()));
        let slots: Arc<Mutex<Vec<Option<FetchOutcome>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));

        // Every worker is joined below before run_batch returns.
        let mut worker_set = JoinSet::new();

        for worker_id in 0..workers {
            let fetcher = self.fetcher.clone();
            let progress_cb = self.progress_callback.clone();
            let queue = queue.clone();
            let slots = slots.clone();
            let timeout = self.timeout;

            worker_set.spawn(async move {
                loop {
                    let next = { queue.lock().await.pop_front() };
                    let Some((index, url)) = next else {
                        break;
                    };

                    if let Some(ref callback) = progress_cb {
                        callback(worker_id, url.clone());
                    }

                    // Run the fetch as its own task so a panic costs only this URL.
                    let fetch = {
                        let fetcher = fetcher.clone();
                        let url = url.clone();
                        tokio::spawn(async move { fetcher.fetch(&url, timeout).await })
                    };
                    let result = match fetch.await {
                        Ok(result) => result,
                        Err(e) => {
                            warn!("Fetch task for {} failed: {}", url, e);
                            Err(FetchError::Aborted { url: url.clone() })
                        }
                    };
                    if let Err(ref e) = result {
                        warn!("Fetch error for {}: {}", url, e);
                    }

                    slots.lock().await[index] = Some((url, result));
                }
                debug!("Fetch worker {} finished", worker_id);
            });
        }

        while let Some(joined) = worker_set.join_next().await {
            if let Err(e) = joined {
                warn!("Fetch worker task failed: {}", e);
            }
        }

        let filled = std::mem::take(&mut *slots.lock().await);
        let outcomes = filled
            .into_iter()
            .zip(urls)
            .map(|(slot, url)| slot.unwrap_or_else(|| (url.clone(), Err(FetchError::Aborted { url }))))
            .collect();

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Succeeds for every URL except those listed as failing.
    struct ScriptedFetcher {
        failing: HashSet<String>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(failing: &[&str], delay: Duration) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> std::result::Result<PageRecord, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.failing.contains(url) {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 500,
                })
            } else {
                Ok(PageRecord::new(url).with_title("ok"))
            }
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl PageFetcher for PanickingFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> std::result::Result<PageRecord, FetchError> {
            if url.ends_with("/boom") {
                panic!("fetcher blew up");
            }
            Ok(PageRecord::new(url))
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://example.com/{}", i)).collect()
    }

    #[tokio::test]
    async fn test_one_failure_does_not_fail_the_batch() {
        let fetcher = Arc::new(ScriptedFetcher::new(&["http://example.com/bad"], Duration::ZERO));
        let pool = FetchPool::new(fetcher);

        let batch = vec![
            "http://example.com/good1".to_string(),
            "http://example.com/bad".to_string(),
            "http://example.com/good2".to_string(),
        ];
        let outcomes = pool.run_batch(batch, 1).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        let failed: Vec<_> = outcomes.iter().filter(|(_, r)| r.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "http://example.com/bad");
        assert!(matches!(failed[0].1, Err(FetchError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_every_input_is_represented_once() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[], Duration::from_millis(1)));
        let pool = FetchPool::new(fetcher.clone());

        let input = urls(25);
        let outcomes = pool.run_batch(input.clone(), 4).await.unwrap();

        let returned: Vec<String> = outcomes.iter().map(|(u, _)| u.clone()).collect();
        assert_eq!(returned, input);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 25);
    }

    #[tokio::test]
    async fn test_concurrency_is_an_upper_bound() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[], Duration::from_millis(20)));
        let pool = FetchPool::new(fetcher.clone());

        pool.run_batch(urls(12), 3).await.unwrap();

        let max = fetcher.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "saw {} concurrent fetches", max);
        assert!(max > 1, "expected parallel fetches, saw {}", max);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let pool = FetchPool::new(Arc::new(ScriptedFetcher::new(&[], Duration::ZERO)));
        let result = pool.run_batch(urls(2), 0).await;
        assert!(matches!(result, Err(ScanError::InvalidConcurrency(0))));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = FetchPool::new(Arc::new(ScriptedFetcher::new(&[], Duration::ZERO)));
        let outcomes = pool.run_batch(Vec::new(), 4).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_fetch_only_fails_its_own_url() {
        let pool = FetchPool::new(Arc::new(PanickingFetcher));

        let batch = vec![
            "http://example.com/boom".to_string(),
            "http://example.com/a".to_string(),
            "http://example.com/b".to_string(),
        ];
        let outcomes = pool.run_batch(batch, 1).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[0].1,
            Err(FetchError::Aborted {
                url: "http://example.com/boom".to_string()
            })
        );
        // The same worker carries on with the URLs queued behind the panic.
        assert_eq!(outcomes[1].1, Ok(PageRecord::new("http://example.com/a")));
        assert_eq!(outcomes[2].1, Ok(PageRecord::new("http://example.com/b")));
    }

    #[tokio::test]
    async fn test_panicking_fetch_in_parallel_batch() {
        let pool = FetchPool::new(Arc::new(PanickingFetcher));

        let mut batch = urls(6);
        batch.insert(2, "http://example.com/boom".to_string());
        let outcomes = pool.run_batch(batch, 3).await.unwrap();

        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(u, _)| u.as_str())
            .collect();
        assert_eq!(failed, vec!["http://example.com/boom"]);
        assert_eq!(outcomes.len(), 7);
    }

    #[tokio::test]
    async fn test_progress_callback_sees_every_url() {
        let seen: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let pool = FetchPool::new(Arc::new(ScriptedFetcher::new(&[], Duration::ZERO)))
            .with_progress_callback(Arc::new(move |_worker_id: usize, url: String| {
                seen_clone.lock().unwrap().push(url);
            }));

        pool.run_batch(urls(5), 2).await.unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        let mut expected = urls(5);
        expected.sort();
        assert_eq!(seen, expected);
    }
}
