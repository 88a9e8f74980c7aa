//! Per-source run metrics, shared across concurrently running providers.
//!
//! Shaped on the `ManagedBlacklist<T>` pattern: state lives behind a single
//! `Arc<RwLock<_>>` so every clone of a [`MetricsCollector`] observes the
//! same counters, and accessors never panic on an unknown source — a
//! provider that hasn't run yet simply reads as all-zero/Idle.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Lifecycle state of a single provider's most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct SourceMetrics {
    pub status: SyncStatus,
    pub inserted_count: u64,
    pub import_errors: u64,
    pub total_processed: u64,
    pub last_duration: Option<std::time::Duration>,
    pub last_error: Option<String>,
}

#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<RwLock<HashMap<String, SourceMetrics>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<F>(&self, source: &str, f: F)
    where
        F: FnOnce(&mut SourceMetrics),
    {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(guard.entry(source.to_string()).or_default());
    }

    pub fn set_sync_running(&self, source: &str) {
        self.with_entry(source, |m| m.status = SyncStatus::Running);
    }

    pub fn set_sync_success(&self, source: &str, duration: std::time::Duration) {
        self.with_entry(source, |m| {
            m.status = SyncStatus::Success;
            m.last_duration = Some(duration);
            m.last_error = None;
        });
    }

    pub fn set_sync_failed(&self, source: &str, err: &str, duration: std::time::Duration) {
        self.with_entry(source, |m| {
            m.status = SyncStatus::Failed;
            m.last_duration = Some(duration);
            m.last_error = Some(err.to_string());
        });
    }

    pub fn increment_inserted_count(&self, source: &str, by: u64) {
        self.with_entry(source, |m| m.inserted_count += by);
    }

    pub fn increment_import_errors(&self, source: &str) {
        self.with_entry(source, |m| m.import_errors += 1);
    }

    pub fn set_total_processed(&self, source: &str, total: u64) {
        self.with_entry(source, |m| m.total_processed = total);
    }

    /// Snapshot for a single source. Never fails: an unknown source reads
    /// back as a fresh, all-zero, `Idle` [`SourceMetrics`].
    pub fn get(&self, source: &str) -> SourceMetrics {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.get(source).cloned().unwrap_or_default()
    }

    /// Snapshot of every source observed so far.
    pub fn snapshot(&self) -> HashMap<String, SourceMetrics> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }
}
