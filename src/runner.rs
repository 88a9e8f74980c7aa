//! Drives every registered provider through fetch → parse → reap → metrics,
//! one `tokio::spawn`ed task per provider, joined with
//! `futures::future::join_all` — the same one-task-per-independent-unit
//! shape the teacher uses for its background health-check tick, generalized
//! from a single repeating task to N concurrent one-shot runs.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::error::CoreError;
use crate::fetch::Fetcher;
use crate::metrics::MetricsCollector;
use crate::provider::Provider;
use crate::repository::Repository;

/// Executes every registered provider concurrently and reports the first
/// provider-level error encountered, if any. Other providers still run to
/// completion — a failure in one never cancels its siblings.
pub struct Runner {
    providers: Vec<Arc<Mutex<Box<dyn Provider>>>>,
    repository: Arc<dyn Repository>,
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn ResponseCache>,
    metrics: MetricsCollector,
    batch_size: usize,
}

impl Runner {
    pub fn new(
        providers: Vec<Box<dyn Provider>>,
        repository: Arc<dyn Repository>,
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<dyn ResponseCache>,
        metrics: MetricsCollector,
        batch_size: usize,
    ) -> Self {
        Self {
            providers: providers.into_iter().map(|p| Arc::new(Mutex::new(p))).collect(),
            repository,
            fetcher,
            cache,
            metrics,
            batch_size,
        }
    }

    /// Runs every provider once, concurrently, under a shared cancellation
    /// token. Returns the first provider-level error encountered, if any;
    /// every other provider still runs to completion regardless.
    pub async fn process(&self, cancel: &CancellationToken) -> Result<(), CoreError> {
        let handles: Vec<_> = self
            .providers
            .iter()
            .cloned()
            .map(|provider| {
                let repository = self.repository.clone();
                let fetcher = self.fetcher.clone();
                let cache = self.cache.clone();
                let metrics = self.metrics.clone();
                let batch_size = self.batch_size;
                let cancel = cancel.clone();
                tokio::spawn(run_one(provider, repository, fetcher, cache, metrics, batch_size, cancel))
            })
            .collect();

        let results = join_all(handles).await;
        results
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|e| Err(CoreError::FetchFailed {
                source: "runner".to_string(),
                message: format!("provider task panicked: {e}"),
            })))
            .find_map(|r| r.err())
            .map_or(Ok(()), Err)
    }
}

async fn run_one(
    provider: Arc<Mutex<Box<dyn Provider>>>,
    repository: Arc<dyn Repository>,
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn ResponseCache>,
    metrics: MetricsCollector,
    batch_size: usize,
    cancel: CancellationToken,
) -> Result<(), CoreError> {
    let run_id = Uuid::new_v4().to_string();
    let mut provider = provider.lock().await;
    provider.set_process_id(run_id);

    let name = provider.name().to_string();
    let source_url = provider.source_url().to_string();
    metrics.set_sync_running(&name);
    let started = Instant::now();

    let outcome = run_provider_body(&mut **provider, &source_url, repository.as_ref(), fetcher.as_ref(), cache.as_ref(), &metrics, batch_size, &cancel).await;

    match &outcome {
        Ok(()) => metrics.set_sync_success(&name, started.elapsed()),
        Err(e) => metrics.set_sync_failed(&name, &e.to_string(), started.elapsed()),
    }
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn run_provider_body(
    provider: &mut dyn Provider,
    source_url: &str,
    repository: &dyn Repository,
    fetcher: &dyn Fetcher,
    cache: &dyn ResponseCache,
    metrics: &MetricsCollector,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<(), CoreError> {
    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }

    let body = match cache.get(source_url).await {
        Some(cached) => {
            // A replayed body carries the run id of the run that first
            // fetched it; re-assign it so the rows this parse writes keep
            // their original lineage instead of looking like a brand new run.
            provider.set_process_id(cached.run_id);
            cached.body
        }
        None => {
            let fetched = provider.fetch(fetcher).await?;
            cache.put(source_url, provider.process_id(), &fetched).await?;
            fetched
        }
    };

    provider.parse(&body, repository, metrics, batch_size, cancel).await?;

    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }

    repository
        .remove_older_insertions(provider.name(), provider.process_id(), cancel)
        .await?;

    cache.on_success(source_url).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NullResponseCache;
    use crate::fetch::MockFetcher;
    use crate::repository::tests::test_pool;
    use crate::repository::SqlRepository;
    use std::time::Duration;

    struct DelayedProvider {
        name: &'static str,
        source_url: String,
        process_id: String,
        fetch_delay: Duration,
        parse_delay: Duration,
        body: Vec<u8>,
    }

    #[async_trait::async_trait]
    impl Provider for DelayedProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn source_url(&self) -> &str {
            &self.source_url
        }
        fn category(&self) -> Option<&str> {
            None
        }
        fn set_process_id(&mut self, process_id: String) {
            self.process_id = process_id;
        }
        fn process_id(&self) -> &str {
            &self.process_id
        }

        async fn fetch(&self, fetcher: &dyn Fetcher) -> Result<Vec<u8>, CoreError> {
            tokio::time::sleep(self.fetch_delay).await;
            fetcher.fetch(&self.source_url).await
        }

        async fn parse(
            &self,
            _body: &[u8],
            repository: &dyn Repository,
            metrics: &MetricsCollector,
            batch_size: usize,
            cancel: &CancellationToken,
        ) -> Result<(), CoreError> {
            tokio::time::sleep(self.parse_delay).await;
            crate::provider::parse_lines(
                &self.body,
                self.name,
                &self.process_id,
                None,
                repository,
                metrics,
                batch_size,
                cancel,
            )
            .await
        }
    }

    fn make_runner(providers: Vec<Box<dyn Provider>>, fetcher: Arc<dyn Fetcher>, repository: Arc<dyn Repository>, metrics: MetricsCollector) -> Runner {
        let cache: Arc<dyn ResponseCache> = Arc::new(NullResponseCache);
        Runner::new(providers, repository, fetcher, cache, metrics, 1000)
    }

    #[tokio::test]
    async fn providers_run_concurrently_not_sequentially() {
        let repository: Arc<dyn Repository> = Arc::new(SqlRepository::new(test_pool().await));
        let fetcher: Arc<dyn Fetcher> = Arc::new(MockFetcher::new(Vec::new(), Duration::from_millis(0)));
        let metrics = MetricsCollector::new();

        let providers: Vec<Box<dyn Provider>> = vec![
            Box::new(DelayedProvider {
                name: "SLOW_A",
                source_url: "https://a.example/feed.txt".to_string(),
                process_id: String::new(),
                fetch_delay: Duration::from_millis(100),
                parse_delay: Duration::from_millis(50),
                body: b"a.example.com\n".to_vec(),
            }),
            Box::new(DelayedProvider {
                name: "SLOW_B",
                source_url: "https://b.example/feed.txt".to_string(),
                process_id: String::new(),
                fetch_delay: Duration::from_millis(150),
                parse_delay: Duration::from_millis(75),
                body: b"b.example.com\n".to_vec(),
            }),
        ];

        let runner = make_runner(providers, fetcher, repository, metrics);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        runner.process(&cancel).await.unwrap();
        let elapsed = start.elapsed();

        assert!(
            elapsed < Duration::from_millis(375),
            "expected concurrent execution well under 375ms, took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn a_failing_provider_does_not_block_others() {
        let repository: Arc<dyn Repository> = Arc::new(SqlRepository::new(test_pool().await));
        let fetcher: Arc<dyn Fetcher> = Arc::new(MockFetcher::failing(Duration::from_millis(1)));
        let metrics = MetricsCollector::new();

        let providers: Vec<Box<dyn Provider>> = vec![Box::new(DelayedProvider {
            name: "BROKEN",
            source_url: "https://broken.example/feed.txt".to_string(),
            process_id: String::new(),
            fetch_delay: Duration::from_millis(1),
            parse_delay: Duration::from_millis(0),
            body: Vec::new(),
        })];

        let runner = make_runner(providers, fetcher, repository, metrics.clone());
        let cancel = CancellationToken::new();
        let result = runner.process(&cancel).await;

        assert!(result.is_err());
        assert_eq!(metrics.get("BROKEN").status, crate::metrics::SyncStatus::Failed);
    }

    #[tokio::test]
    async fn replayed_cache_hit_reassigns_provider_lineage() {
        use crate::cache::FileResponseCache;

        let repository: Arc<dyn Repository> = Arc::new(SqlRepository::new(test_pool().await));
        let dir = tempfile::tempdir().unwrap();
        let cache: Arc<dyn ResponseCache> = Arc::new(FileResponseCache::new(
            dir.path(),
            Duration::from_secs(3600),
            &crate::config::Config::default(),
        ));
        cache
            .put("https://a.example/feed.txt", "historical-run", b"a.example.com\n")
            .await
            .unwrap();

        let fetcher: Arc<dyn Fetcher> = Arc::new(MockFetcher::new(Vec::new(), Duration::from_millis(0)));
        let metrics = MetricsCollector::new();
        let providers: Vec<Box<dyn Provider>> = vec![Box::new(DelayedProvider {
            name: "FEED_A",
            source_url: "https://a.example/feed.txt".to_string(),
            process_id: String::new(),
            fetch_delay: Duration::from_millis(0),
            parse_delay: Duration::from_millis(0),
            body: b"ignored-because-cache-hits-first\n".to_vec(),
        })];

        let runner = Runner::new(providers, repository.clone(), fetcher, cache, metrics, 1000);
        let cancel = CancellationToken::new();
        runner.process(&cancel).await.unwrap();

        let rows = repository.get_entries_by_source("FEED_A", &cancel).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].process_id, "historical-run");
    }
}
