//! The blacklist repository: batched UPSERT, soft deletion, cross-run
//! stale-entry reclamation, and the four-facet `QueryLink` lookup.
//!
//! Built on `sqlx::Any` rather than pinning to Postgres, so the exact query
//! text the teacher's ingest flow uses (`ON CONFLICT ... DO UPDATE SET`)
//! runs unmodified against an in-memory SQLite pool in tests and a real
//! Postgres pool in production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{Entry, Hit, MatchType};
use crate::url::normalize_url;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blacklist_entries (
    id TEXT PRIMARY KEY,
    process_id TEXT NOT NULL,
    scheme TEXT NOT NULL,
    host TEXT NOT NULL,
    domain TEXT NOT NULL,
    sub_domains TEXT NOT NULL,
    path TEXT NOT NULL,
    raw_query TEXT NOT NULL,
    source_url TEXT NOT NULL,
    source TEXT NOT NULL,
    category TEXT NOT NULL,
    confidence REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    UNIQUE(source_url, source)
);
"#;

const INDICES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_blacklist_entries_host ON blacklist_entries(host);",
    "CREATE INDEX IF NOT EXISTS idx_blacklist_entries_domain ON blacklist_entries(domain);",
    "CREATE INDEX IF NOT EXISTS idx_blacklist_entries_path ON blacklist_entries(path);",
    "CREATE INDEX IF NOT EXISTS idx_blacklist_entries_source ON blacklist_entries(source);",
    "CREATE INDEX IF NOT EXISTS idx_blacklist_entries_category ON blacklist_entries(category);",
];

/// Public repository contract. Every operation takes a cancellation token
/// alongside `&self`, per the concurrency model.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_all_entries(&self, cancel: &CancellationToken) -> Result<Vec<Entry>, CoreError>;
    async fn get_entry_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Entry, CoreError>;
    async fn get_entries_by_ids(&self, ids: &[String], cancel: &CancellationToken) -> Result<Vec<Entry>, CoreError>;
    async fn get_entries_by_source(&self, source: &str, cancel: &CancellationToken) -> Result<Vec<Entry>, CoreError>;
    async fn get_entries_by_category(&self, category: &str, cancel: &CancellationToken) -> Result<Vec<Entry>, CoreError>;
    async fn save_entry(&self, entry: Entry, cancel: &CancellationToken) -> Result<(), CoreError>;
    async fn batch_save_entries(&self, entries: Vec<Entry>, cancel: &CancellationToken) -> Result<(), CoreError>;
    async fn clear_all_entries(&self, cancel: &CancellationToken) -> Result<(), CoreError>;
    async fn soft_delete_entry_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<(), CoreError>;
    async fn remove_older_insertions(&self, source: &str, run_id: &str, cancel: &CancellationToken) -> Result<(), CoreError>;
    async fn query_link(&self, raw: &str, cancel: &CancellationToken) -> Result<Vec<Hit>, CoreError>;
}

/// `sqlx::Any`-backed [`Repository`] implementation.
pub struct SqlRepository {
    pool: AnyPool,
}

impl SqlRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and ensures the schema exists. Works
    /// against any backend `sqlx::Any` supports (Postgres in production,
    /// SQLite for tests and local runs).
    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        sqlx::any::install_default_drivers();
        // An in-memory SQLite URL hands each pooled connection its own
        // throwaway database, so a pool size above 1 would silently scatter
        // rows across connections that can never see each other's writes.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 10 };
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let repository = Self::new(pool);
        repository.migrate().await?;
        Ok(repository)
    }

    async fn migrate(&self) -> Result<(), CoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        for statement in INDICES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn row_to_entry(row: &sqlx::any::AnyRow) -> Result<Entry, CoreError> {
        let sub_domains_raw: String = row.try_get("sub_domains")?;
        let sub_domains = if sub_domains_raw.is_empty() {
            Vec::new()
        } else {
            sub_domains_raw.split(',').map(str::to_string).collect()
        };

        let deleted_at: Option<String> = row.try_get("deleted_at")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Entry {
            id: row.try_get("id")?,
            process_id: row.try_get("process_id")?,
            scheme: row.try_get("scheme")?,
            host: row.try_get("host")?,
            domain: row.try_get("domain")?,
            sub_domains,
            path: row.try_get("path")?,
            raw_query: row.try_get("raw_query")?,
            source_url: row.try_get("source_url")?,
            source: row.try_get("source")?,
            category: row.try_get("category")?,
            confidence: row.try_get("confidence")?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            deleted_at: deleted_at.map(|s| parse_timestamp(&s)).transpose()?,
        })
    }

    async fn upsert_one(
        &self,
        executor: &mut sqlx::Transaction<'_, sqlx::Any>,
        entry: &Entry,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO blacklist_entries \
             (id, process_id, scheme, host, domain, sub_domains, path, raw_query, \
              source_url, source, category, confidence, created_at, updated_at, deleted_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL) \
             ON CONFLICT (source_url, source) DO UPDATE SET \
               process_id = excluded.process_id, \
               scheme = excluded.scheme, \
               host = excluded.host, \
               domain = excluded.domain, \
               sub_domains = excluded.sub_domains, \
               path = excluded.path, \
               raw_query = excluded.raw_query, \
               category = excluded.category, \
               confidence = excluded.confidence, \
               updated_at = excluded.updated_at, \
               deleted_at = NULL \
             WHERE excluded.updated_at > blacklist_entries.updated_at",
        )
        .bind(entry.id.clone())
        .bind(entry.process_id.clone())
        .bind(entry.scheme.clone())
        .bind(entry.host.clone())
        .bind(entry.domain.clone())
        .bind(entry.sub_domains.join(","))
        .bind(entry.path.clone())
        .bind(entry.raw_query.clone())
        .bind(entry.source_url.clone())
        .bind(entry.source.clone())
        .bind(entry.category.clone())
        .bind(entry.confidence)
        .bind(format_timestamp(entry.created_at))
        .bind(format_timestamp(entry.updated_at))
        .execute(&mut *executor)
        .await
        .map_err(|e| CoreError::BatchSaveFailed {
            entry_id: entry.id.clone(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Database(sqlx::Error::Decode(Box::new(e))))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(", ")
}

#[async_trait]
impl Repository for SqlRepository {
    async fn get_all_entries(&self, cancel: &CancellationToken) -> Result<Vec<Entry>, CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let rows = sqlx::query("SELECT * FROM blacklist_entries WHERE deleted_at IS NULL")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn get_entry_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Entry, CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let row = sqlx::query("SELECT * FROM blacklist_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        Self::row_to_entry(&row)
    }

    async fn get_entries_by_ids(&self, ids: &[String], cancel: &CancellationToken) -> Result<Vec<Entry>, CoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let query = format!(
            "SELECT * FROM blacklist_entries WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut q = sqlx::query(&query);
        for id in ids {
            q = q.bind(id.clone());
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn get_entries_by_source(&self, source: &str, cancel: &CancellationToken) -> Result<Vec<Entry>, CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let rows = sqlx::query("SELECT * FROM blacklist_entries WHERE source = ? AND deleted_at IS NULL")
            .bind(source)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn get_entries_by_category(&self, category: &str, cancel: &CancellationToken) -> Result<Vec<Entry>, CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let rows = sqlx::query("SELECT * FROM blacklist_entries WHERE category = ? AND deleted_at IS NULL")
            .bind(category)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn save_entry(&self, entry: Entry, cancel: &CancellationToken) -> Result<(), CoreError> {
        self.batch_save_entries(vec![entry], cancel).await
    }

    async fn batch_save_entries(&self, entries: Vec<Entry>, cancel: &CancellationToken) -> Result<(), CoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let mut tx = self.pool.begin().await?;
        for entry in &entries {
            if cancel.is_cancelled() {
                tx.rollback().await?;
                return Err(CoreError::Cancelled);
            }
            if let Err(e) = self.upsert_one(&mut tx, entry).await {
                tx.rollback().await?;
                return Err(e);
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear_all_entries(&self, cancel: &CancellationToken) -> Result<(), CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        sqlx::query("UPDATE blacklist_entries SET deleted_at = ? WHERE deleted_at IS NULL")
            .bind(format_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn soft_delete_entry_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<(), CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        sqlx::query("UPDATE blacklist_entries SET deleted_at = ? WHERE id = ?")
            .bind(format_timestamp(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_older_insertions(&self, source: &str, run_id: &str, cancel: &CancellationToken) -> Result<(), CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        sqlx::query(
            "UPDATE blacklist_entries SET deleted_at = ? \
             WHERE source = ? AND process_id != ? AND deleted_at IS NULL",
        )
        .bind(format_timestamp(Utc::now()))
        .bind(source)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_link(&self, raw: &str, cancel: &CancellationToken) -> Result<Vec<Hit>, CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let normalized = normalize_url(raw);
        let parts = crate::url::set_url(raw)?;
        let mut hits = Vec::new();

        let exact_rows = sqlx::query("SELECT id FROM blacklist_entries WHERE source_url = ? AND deleted_at IS NULL")
            .bind(&normalized)
            .fetch_all(&self.pool)
            .await?;
        for row in &exact_rows {
            let id: String = row.try_get("id")?;
            hits.push(Hit::new(id, MatchType::ExactUrl, normalized.clone()));
        }

        let host_rows = sqlx::query("SELECT id FROM blacklist_entries WHERE host = ? AND deleted_at IS NULL")
            .bind(&parts.host)
            .fetch_all(&self.pool)
            .await?;
        for row in &host_rows {
            let id: String = row.try_get("id")?;
            hits.push(Hit::new(id, MatchType::Host, parts.host.clone()));
        }

        let domain_rows = sqlx::query("SELECT id FROM blacklist_entries WHERE domain = ? AND deleted_at IS NULL")
            .bind(&parts.domain)
            .fetch_all(&self.pool)
            .await?;
        for row in &domain_rows {
            let id: String = row.try_get("id")?;
            hits.push(Hit::new(id, MatchType::Domain, parts.domain.clone()));
        }

        if !parts.path.is_empty() && parts.path != "/" {
            let path_rows = sqlx::query("SELECT id FROM blacklist_entries WHERE path = ? AND deleted_at IS NULL")
                .bind(&parts.path)
                .fetch_all(&self.pool)
                .await?;
            for row in &path_rows {
                let id: String = row.try_get("id")?;
                hits.push(Hit::new(id, MatchType::Path, parts.path.clone()));
            }
        }

        Ok(hits)
    }
}
