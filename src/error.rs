use thiserror::Error;

/// Crate-wide error type for the ingestion-and-lookup engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed url: {0}")]
    MalformedUrl(String),

    #[error("fetch failed for {source}: {message}")]
    FetchFailed { source: String, message: String },

    #[error("failed to parse line: {0}")]
    ParseLineFailed(String),

    #[error("batch save failed for entry {entry_id}: {message}")]
    BatchSaveFailed { entry_id: String, message: String },

    #[error("operation was cancelled")]
    Cancelled,

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
}
