use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// One blacklist record, as described in the data model.
///
/// `sub_domains` is kept as a typed `Vec<String>` in memory; the repository
/// is responsible for joining/splitting it on `.` at the storage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub process_id: String,
    pub scheme: String,
    pub host: String,
    pub domain: String,
    pub sub_domains: Vec<String>,
    pub path: String,
    pub raw_query: String,
    pub source_url: String,
    pub source: String,
    pub category: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// True once the row has been marked as deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// The facet that produced a [`Hit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    ExactUrl,
    Host,
    Domain,
    Path,
}

impl Display for MatchType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchType::ExactUrl => "EXACT_URL",
            MatchType::Host => "HOST",
            MatchType::Domain => "DOMAIN",
            MatchType::Path => "PATH",
        })
    }
}

/// A positive lookup result produced by [`crate::repository::Repository::query_link`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub match_type: MatchType,
    pub matched_value: String,
}

impl Hit {
    pub fn new(id: impl Into<String>, match_type: MatchType, matched_value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            match_type,
            matched_value: matched_value.into(),
        }
    }
}
