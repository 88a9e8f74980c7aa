//! Turns a raw feed line into a persisted-shape [`Entry`].

use chrono::Utc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::Entry;
use crate::url;

/// Builds an [`Entry`] from one line of a provider's feed body.
///
/// `source_name` is the producing provider's identity (`Entry::source`,
/// e.g. `OISD_BIG`); `source_url` is the entry's own natural key, the
/// trimmed line itself (`Entry::source_url`) — not the provider's feed
/// URL, which the caller already consumed during `fetch` and has no
/// further role here.
///
/// Rejects blank lines and `#`-comment lines outright (these are not
/// failures worth counting against `import_errors`; the caller should just
/// skip them). A line that survives that filter but fails URL decomposition
/// is reported as [`CoreError::ParseLineFailed`].
pub fn build_entry(
    raw_line: &str,
    source_name: &str,
    process_id: &str,
    category: Option<&str>,
) -> Result<Option<Entry>, CoreError> {
    let trimmed = raw_line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let parts = url::set_url(trimmed)
        .map_err(|e| CoreError::ParseLineFailed(format!("{trimmed}: {e}")))?;

    let now = Utc::now();
    Ok(Some(Entry {
        id: Uuid::new_v4().to_string(),
        process_id: process_id.to_string(),
        scheme: parts.scheme,
        host: parts.host,
        domain: parts.domain,
        sub_domains: parts.sub_domains,
        path: parts.path,
        raw_query: parts.raw_query,
        source_url: trimmed.to_string(),
        source: source_name.to_string(),
        category: category.unwrap_or("").to_string(),
        confidence: 0.0,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }))
}
