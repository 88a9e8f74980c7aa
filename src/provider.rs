//! The `Provider` abstraction and the built-in feed providers.
//!
//! Parsing follows the same row-at-a-time, batch-flush shape as the
//! teacher's module pipeline: read one unit at a time, accumulate into a
//! buffer, flush the buffer, keep going until the stream is exhausted.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::entry_builder::build_entry;
use crate::error::CoreError;
use crate::fetch::Fetcher;
use crate::metrics::MetricsCollector;
use crate::model::Entry;
use crate::repository::Repository;

/// One blacklist feed: knows how to fetch its own body and turn it into
/// persisted [`Entry`] rows.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    fn source_url(&self) -> &str;
    fn category(&self) -> Option<&str>;
    fn set_process_id(&mut self, process_id: String);
    fn process_id(&self) -> &str;

    async fn fetch(&self, fetcher: &dyn Fetcher) -> Result<Vec<u8>, CoreError> {
        fetcher.fetch(self.source_url()).await
    }

    /// Parses `body` line by line, batching entries through `repository`.
    async fn parse(
        &self,
        body: &[u8],
        repository: &dyn Repository,
        metrics: &MetricsCollector,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError>;
}

/// Shared line-oriented parse loop used by every built-in provider: trim,
/// skip blanks/comments, build an Entry, batch to `batch_size`, flush with
/// a final partial flush at EOF. A per-line decomposition failure is
/// counted and skipped; a batch-save failure aborts the run.
pub async fn parse_lines(
    body: &[u8],
    name: &str,
    process_id: &str,
    category: Option<&str>,
    repository: &dyn Repository,
    metrics: &MetricsCollector,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<(), CoreError> {
    let text = String::from_utf8_lossy(body);
    let mut batch: Vec<Entry> = Vec::with_capacity(batch_size.max(1));
    let mut processed: u64 = 0;

    for line in text.lines() {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        match build_entry(line, name, process_id, category) {
            Ok(Some(entry)) => {
                batch.push(entry);
                processed += 1;
            }
            Ok(None) => continue,
            Err(_) => {
                metrics.increment_import_errors(name);
                continue;
            }
        }

        if batch.len() >= batch_size.max(1) {
            let flushed = batch.len() as u64;
            let to_save = std::mem::take(&mut batch);
            repository.batch_save_entries(to_save, cancel).await?;
            metrics.increment_inserted_count(name, flushed);
        }
    }

    if !batch.is_empty() {
        let flushed = batch.len() as u64;
        repository.batch_save_entries(batch, cancel).await?;
        metrics.increment_inserted_count(name, flushed);
    }

    metrics.set_total_processed(name, processed);
    Ok(())
}

/// Optional worker-pool variant of [`parse_lines`], parametrized by
/// `Config::parser_workers` / `Config::parser_batch_size`.
///
/// Entry construction (URL decomposition, PSL lookups) is CPU-bound and
/// parallelizes across `workers` tasks, each owning a disjoint slice of the
/// feed's lines. The batches they build are funneled through a single
/// channel to one writer task that calls `batch_save_entries` strictly
/// sequentially, preserving §5's "`BatchSaveEntries` calls are strictly
/// sequential" rule within one provider run — only the CPU-bound half of
/// the pipeline fans out, never the writes.
pub async fn parse_lines_parallel(
    body: &[u8],
    name: &str,
    process_id: &str,
    category: Option<&str>,
    repository: Arc<dyn Repository>,
    metrics: MetricsCollector,
    workers: usize,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<(), CoreError> {
    let workers = workers.max(1);
    let batch_size = batch_size.max(1);
    let text: Arc<str> = Arc::from(String::from_utf8_lossy(body).into_owned());
    let total_lines = text.lines().count();

    if total_lines == 0 {
        metrics.set_total_processed(name, 0);
        return Ok(());
    }

    let chunk_len = (total_lines + workers - 1) / workers;
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<Entry>>(workers);
    let local_cancel = CancellationToken::new();

    let mut worker_handles = Vec::with_capacity(workers);
    for w in 0..workers {
        let start = w * chunk_len;
        if start >= total_lines {
            break;
        }
        let end = (start + chunk_len).min(total_lines);

        let text = Arc::clone(&text);
        let tx = tx.clone();
        let metrics = metrics.clone();
        let name = name.to_string();
        let process_id = process_id.to_string();
        let category = category.map(str::to_string);
        let cancel = cancel.clone();
        let local_cancel = local_cancel.clone();

        worker_handles.push(tokio::spawn(async move {
            let mut batch: Vec<Entry> = Vec::with_capacity(batch_size);
            let mut processed = 0u64;
            for line in text.lines().skip(start).take(end - start) {
                if cancel.is_cancelled() || local_cancel.is_cancelled() {
                    return Err(CoreError::Cancelled);
                }
                match build_entry(line, &name, &process_id, category.as_deref()) {
                    Ok(Some(entry)) => {
                        batch.push(entry);
                        processed += 1;
                    }
                    Ok(None) => {}
                    Err(_) => metrics.increment_import_errors(&name),
                }
                if batch.len() >= batch_size && tx.send(std::mem::take(&mut batch)).await.is_err() {
                    return Err(CoreError::Cancelled);
                }
            }
            if !batch.is_empty() && tx.send(batch).await.is_err() {
                return Err(CoreError::Cancelled);
            }
            Ok(processed)
        }));
    }
    drop(tx);

    let writer_repository = Arc::clone(&repository);
    let writer_metrics = metrics.clone();
    let writer_name = name.to_string();
    let writer_cancel = cancel.clone();
    let writer_local_cancel = local_cancel.clone();
    let writer = tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            if writer_cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            let inserted = batch.len() as u64;
            if let Err(e) = writer_repository.batch_save_entries(batch, &writer_cancel).await {
                writer_local_cancel.cancel();
                return Err(e);
            }
            writer_metrics.increment_inserted_count(&writer_name, inserted);
        }
        Ok(())
    });

    let mut total_processed = 0u64;
    let mut worker_error = None;
    for handle in worker_handles {
        match handle.await {
            Ok(Ok(n)) => total_processed += n,
            Ok(Err(e)) => {
                if worker_error.is_none() {
                    worker_error = Some(e);
                }
            }
            Err(join_err) => {
                if worker_error.is_none() {
                    worker_error = Some(CoreError::ParseLineFailed(join_err.to_string()));
                }
            }
        }
    }

    let writer_result = writer
        .await
        .map_err(|e| CoreError::BatchSaveFailed { entry_id: String::new(), message: e.to_string() })?;

    metrics.set_total_processed(name, total_processed);

    writer_result?;
    if let Some(e) = worker_error {
        return Err(e);
    }
    Ok(())
}

macro_rules! built_in_provider {
    ($struct_name:ident, $name:literal, $source_url:literal, $category:expr) => {
        pub struct $struct_name {
            process_id: String,
        }

        impl $struct_name {
            pub fn new() -> Self {
                Self {
                    process_id: String::new(),
                }
            }
        }

        impl Default for $struct_name {
            fn default() -> Self {
                Self::new()
            }
        }

        #[async_trait]
        impl Provider for $struct_name {
            fn name(&self) -> &str {
                $name
            }

            fn source_url(&self) -> &str {
                $source_url
            }

            fn category(&self) -> Option<&str> {
                $category
            }

            fn set_process_id(&mut self, process_id: String) {
                self.process_id = process_id;
            }

            fn process_id(&self) -> &str {
                &self.process_id
            }

            async fn parse(
                &self,
                body: &[u8],
                repository: &dyn Repository,
                metrics: &MetricsCollector,
                batch_size: usize,
                cancel: &CancellationToken,
            ) -> Result<(), CoreError> {
                parse_lines(
                    body,
                    self.name(),
                    self.process_id(),
                    self.category(),
                    repository,
                    metrics,
                    batch_size,
                    cancel,
                )
                .await
            }
        }
    };
}

built_in_provider!(OisdBigProvider, "OISD_BIG", "https://big.oisd.nl/domainswild2", None);
built_in_provider!(
    OisdNsfwProvider,
    "OISD_NSFW",
    "https://nsfw.oisd.nl/domainswild2",
    Some("nsfw")
);
built_in_provider!(OpenPhishProvider, "OPENPHISH", "https://openphish.com/feed.txt", None);
built_in_provider!(
    UrlhausProvider,
    "URLHAUS",
    "https://urlhaus.abuse.ch/downloads/text/",
    None
);

/// Builds the four conformance-tested built-in providers.
pub fn built_in_providers() -> Vec<Box<dyn Provider>> {
    vec![
        Box::new(OisdBigProvider::new()),
        Box::new(OisdNsfwProvider::new()),
        Box::new(OpenPhishProvider::new()),
        Box::new(UrlhausProvider::new()),
    ]
}
