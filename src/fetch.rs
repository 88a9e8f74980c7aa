//! Fetching provider feed bodies over HTTP.
//!
//! The concrete transport (`ReqwestFetcher`) reuses the teacher's
//! `reqwest::Client` idiom; providers and the runner only ever depend on
//! the [`Fetcher`] trait so tests can swap in [`MockFetcher`].

use async_trait::async_trait;

use crate::config::Config;
use crate::error::CoreError;

/// Fetches the raw body of a provider's feed.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source_url: &str) -> Result<Vec<u8>, CoreError>;
}

/// Default [`Fetcher`], backed by a shared `reqwest::Client`.
///
/// Honors `Config::allowed_domains`: if the list is non-empty, a request
/// whose host isn't on it is refused before any network call is made.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    allowed_domains: Vec<String>,
}

impl ReqwestFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("blacklist-engine/0.1")
                .build()
                .unwrap_or_default(),
            allowed_domains: config.allowed_domains.clone(),
        }
    }

    fn host_allowed(&self, source_url: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let Ok(parsed) = url::Url::parse(source_url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.allowed_domains
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, source_url: &str) -> Result<Vec<u8>, CoreError> {
        if !self.host_allowed(source_url) {
            return Err(CoreError::FetchFailed {
                source: source_url.to_string(),
                message: "host not on allowed_domains".to_string(),
            });
        }

        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| CoreError::FetchFailed {
                source: source_url.to_string(),
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| CoreError::FetchFailed {
                source: source_url.to_string(),
                message: e.to_string(),
            })?;

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| CoreError::FetchFailed {
                source: source_url.to_string(),
                message: e.to_string(),
            })
    }
}

/// Test-only [`Fetcher`] that returns a fixed body after an artificial
/// delay, used to exercise the runner's concurrency guarantee.
pub struct MockFetcher {
    pub body: Vec<u8>,
    pub delay: std::time::Duration,
    pub fail: bool,
}

impl MockFetcher {
    pub fn new(body: impl Into<Vec<u8>>, delay: std::time::Duration) -> Self {
        Self {
            body: body.into(),
            delay,
            fail: false,
        }
    }

    pub fn failing(delay: std::time::Duration) -> Self {
        Self {
            body: Vec::new(),
            delay,
            fail: true,
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, source_url: &str) -> Result<Vec<u8>, CoreError> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(CoreError::FetchFailed {
                source: source_url.to_string(),
                message: "mock fetch configured to fail".to_string(),
            });
        }
        Ok(self.body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_fetcher_returns_configured_body() {
        let fetcher = MockFetcher::new(b"example.com\n".to_vec(), std::time::Duration::from_millis(1));
        let body = fetcher.fetch("https://example.test/feed.txt").await.unwrap();
        assert_eq!(body, b"example.com\n");
    }

    #[tokio::test]
    async fn mock_fetcher_can_be_made_to_fail() {
        let fetcher = MockFetcher::failing(std::time::Duration::from_millis(1));
        assert!(fetcher.fetch("https://example.test/feed.txt").await.is_err());
    }

    #[test]
    fn reqwest_fetcher_allows_any_host_when_allowlist_empty() {
        let config = Config::default();
        let fetcher = ReqwestFetcher::new(&config);
        assert!(fetcher.host_allowed("https://anything.example/feed.txt"));
    }

    #[test]
    fn reqwest_fetcher_enforces_allowlist() {
        let mut config = Config::default();
        config.allowed_domains = vec!["oisd.nl".to_string()];
        let fetcher = ReqwestFetcher::new(&config);
        assert!(fetcher.host_allowed("https://big.oisd.nl/feed.txt"));
        assert!(!fetcher.host_allowed("https://evil.example/feed.txt"));
    }
}
