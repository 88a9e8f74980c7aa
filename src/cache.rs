//! On-disk response cache for provider feed bodies.
//!
//! Grounded on the teacher's object-store cleanup tick: a TTL/cutoff pass
//! that can run in dry-run mode, moved onto a blocking thread since it's
//! plain filesystem I/O.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::config::{Config, Environment};
use crate::error::CoreError;

/// A replayed feed body, paired with the run identifier that originally
/// produced it.
///
/// The runner re-assigns `run_id` to the provider before parsing, so rows
/// written from a replayed body carry the same lineage they would have on
/// the run that first fetched them, instead of a fresh identifier that
/// would make every row look stale on the next live run's
/// `RemoveOlderInsertions` sweep.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub body: Vec<u8>,
    pub run_id: String,
}

/// Caches and replays provider feed bodies so a short-lived upstream outage
/// doesn't force a provider run to be skipped entirely.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, source_url: &str) -> Option<CachedResponse>;
    async fn put(&self, source_url: &str, run_id: &str, body: &[u8]) -> Result<(), CoreError>;
    /// Called after a provider run completes successfully; a cache may use
    /// this to purge the entry it just served, per its own retention policy.
    async fn on_success(&self, source_url: &str);
}

#[derive(Debug, Default, Clone)]
pub struct CleanupStats {
    pub files_examined: u64,
    pub files_deleted: u64,
    pub bytes_deleted: u64,
}

/// File-backed [`ResponseCache`]. Entries are keyed by a hash of the source
/// URL and expire after `ttl`. Cached bodies are purged immediately after a
/// successful run only in [`Environment::Production`] — development runs
/// keep bodies around so repeated local runs don't re-fetch upstream feeds.
pub struct FileResponseCache {
    root: PathBuf,
    ttl: Duration,
    purge_on_success: bool,
}

impl FileResponseCache {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration, config: &Config) -> Self {
        Self {
            root: root.into(),
            ttl,
            purge_on_success: matches!(config.environment, Environment::Production),
        }
    }

    fn key_hash(&self, source_url: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        source_url.hash(&mut hasher);
        hasher.finish()
    }

    fn body_path_for(&self, source_url: &str) -> PathBuf {
        self.root.join(format!("{:016x}.cache", self.key_hash(source_url)))
    }

    fn run_id_path_for(&self, source_url: &str) -> PathBuf {
        self.root.join(format!("{:016x}.runid", self.key_hash(source_url)))
    }

    async fn remove_quietly(&self, path: PathBuf) {
        let _ = tokio::task::spawn_blocking(move || std::fs::remove_file(&path)).await;
    }

    /// Sweeps expired entries. Returns counts without deleting when
    /// `dry_run` is set, matching the teacher's cleanup-tick contract.
    pub async fn cleanup(&self, dry_run: bool) -> Result<CleanupStats, CoreError> {
        let root = self.root.clone();
        let ttl = self.ttl;
        tokio::task::spawn_blocking(move || cleanup_blocking(&root, ttl, dry_run))
            .await
            .map_err(|e| CoreError::FetchFailed {
                source: "cache".to_string(),
                message: e.to_string(),
            })?
    }
}

fn cleanup_blocking(root: &Path, ttl: Duration, dry_run: bool) -> Result<CleanupStats, CoreError> {
    let mut stats = CleanupStats::default();
    if !root.exists() {
        return Ok(stats);
    }

    let cutoff = SystemTime::now().checked_sub(ttl).unwrap_or(SystemTime::UNIX_EPOCH);

    for entry in std::fs::read_dir(root).map_err(|e| io_err(root, e))? {
        let entry = entry.map_err(|e| io_err(root, e))?;
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        stats.files_examined += 1;
        let modified = meta.modified().unwrap_or_else(|_| SystemTime::now());
        if modified < cutoff {
            let len = meta.len();
            if dry_run || std::fs::remove_file(&path).is_ok() {
                stats.files_deleted += 1;
                stats.bytes_deleted += len;
            }
        }
    }
    Ok(stats)
}

fn io_err(path: &Path, e: std::io::Error) -> CoreError {
    CoreError::FetchFailed {
        source: path.display().to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl ResponseCache for FileResponseCache {
    async fn get(&self, source_url: &str) -> Option<CachedResponse> {
        let body_path = self.body_path_for(source_url);
        let run_id_path = self.run_id_path_for(source_url);
        let ttl = self.ttl;
        tokio::task::spawn_blocking(move || {
            let meta = std::fs::metadata(&body_path).ok()?;
            let modified = meta.modified().ok()?;
            if modified.elapsed().unwrap_or(Duration::MAX) > ttl {
                return None;
            }
            let body = std::fs::read(&body_path).ok()?;
            let run_id = std::fs::read_to_string(&run_id_path).ok()?;
            Some(CachedResponse { body, run_id })
        })
        .await
        .ok()
        .flatten()
    }

    async fn put(&self, source_url: &str, run_id: &str, body: &[u8]) -> Result<(), CoreError> {
        let body_path = self.body_path_for(source_url);
        let run_id_path = self.run_id_path_for(source_url);
        let body = body.to_vec();
        let run_id = run_id.to_string();
        if let Some(parent) = body_path.parent() {
            let parent = parent.to_path_buf();
            let parent_for_error = parent.clone();
            tokio::task::spawn_blocking(move || std::fs::create_dir_all(&parent))
                .await
                .map_err(|e| CoreError::FetchFailed {
                    source: "cache".to_string(),
                    message: e.to_string(),
                })?
                .map_err(|e| io_err(&parent_for_error, e))?;
        }
        let body_path_for_error = body_path.clone();
        tokio::task::spawn_blocking(move || std::fs::write(&body_path, body))
            .await
            .map_err(|e| CoreError::FetchFailed {
                source: "cache".to_string(),
                message: e.to_string(),
            })?
            .map_err(|e| io_err(&body_path_for_error, e))?;

        let run_id_path_for_error = run_id_path.clone();
        tokio::task::spawn_blocking(move || std::fs::write(&run_id_path, run_id))
            .await
            .map_err(|e| CoreError::FetchFailed {
                source: "cache".to_string(),
                message: e.to_string(),
            })?
            .map_err(|e| io_err(&run_id_path_for_error, e))
    }

    async fn on_success(&self, source_url: &str) {
        if self.purge_on_success {
            tracing::debug!(source_url, "purging cached response after successful run");
            self.remove_quietly(self.body_path_for(source_url)).await;
            self.remove_quietly(self.run_id_path_for(source_url)).await;
        }
    }
}

/// No-op cache, usable when a caller doesn't want fetch-body caching at all.
#[derive(Default)]
pub struct NullResponseCache;

#[async_trait]
impl ResponseCache for NullResponseCache {
    async fn get(&self, _source_url: &str) -> Option<CachedResponse> {
        None
    }

    async fn put(&self, _source_url: &str, _run_id: &str, _body: &[u8]) -> Result<(), CoreError> {
        Ok(())
    }

    async fn on_success(&self, _source_url: &str) {}
}
