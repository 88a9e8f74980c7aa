use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use blacklist_engine::cache::{FileResponseCache, ResponseCache};
use blacklist_engine::config::Config;
use blacklist_engine::fetch::{Fetcher, ReqwestFetcher};
use blacklist_engine::metrics::MetricsCollector;
use blacklist_engine::provider::built_in_providers;
use blacklist_engine::repository::{Repository, SqlRepository};
use blacklist_engine::runner::Runner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = Config::from_env();
    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    if database_url == "sqlite::memory:" {
        tracing::warn!("DATABASE_URL is unset; running against a throwaway in-memory SQLite database.");
    }
    if cfg.allowed_domains.is_empty() {
        tracing::warn!("ALLOWED_DOMAINS is empty; the fetcher will allow any host.");
    }

    let repository = SqlRepository::connect(&database_url).await?;
    let repository: Arc<dyn Repository> = Arc::new(repository);

    let fetcher: Arc<dyn Fetcher> = Arc::new(ReqwestFetcher::new(&cfg));

    let cache_root = env::var("CACHE_DIR").unwrap_or_else(|_| "./cache".to_string());
    let cache: Arc<dyn ResponseCache> = Arc::new(FileResponseCache::new(cache_root, Duration::from_secs(3600), &cfg));

    let metrics = MetricsCollector::new();
    let runner = Runner::new(
        built_in_providers(),
        repository,
        fetcher,
        cache,
        metrics,
        cfg.batch_size,
    );

    let cancel = CancellationToken::new();
    tracing::info!("starting blacklist ingestion run");
    match runner.process(&cancel).await {
        Ok(()) => tracing::info!("blacklist ingestion run completed"),
        Err(e) => tracing::warn!(error = %e, "blacklist ingestion run completed with at least one provider error"),
    }

    Ok(())
}
