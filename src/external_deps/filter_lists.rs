//! Cosmetic filter-list sources.
//!
//! The ad-blocker heuristic only needs raw list text per URL. Production runs
//! download it over HTTP; tests and offline embeddings serve fixed text.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// Errors surfaced while retrieving one filter list.
#[derive(Debug, Error)]
pub enum FilterListError {
    #[error("filter list request failed: {0}")]
    Transport(String),
    #[error("filter list responded with status {0}")]
    Status(u16),
    #[error("no filter list registered for {0}")]
    NotFound(String),
}

/// Provider of filter-list text.
#[async_trait]
pub trait FilterListSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FilterListError>;
}

/// Downloads lists with reqwest. Non-success statuses are errors.
pub struct HttpFilterListSource {
    client: Client,
}

impl HttpFilterListSource {
    pub fn new(timeout: Duration) -> Result<Self, FilterListError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FilterListError::Transport(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FilterListSource for HttpFilterListSource {
    async fn fetch(&self, url: &str) -> Result<String, FilterListError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FilterListError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FilterListError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|err| FilterListError::Transport(err.to_string()))
    }
}

/// In-memory lists keyed by URL, with an optional catch-all.
#[derive(Debug, Clone, Default)]
pub struct StaticFilterLists {
    lists: HashMap<String, String>,
    fallback: Option<String>,
}

impl StaticFilterLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `text` for every URL.
    pub fn uniform(text: impl Into<String>) -> Self {
        Self {
            lists: HashMap::new(),
            fallback: Some(text.into()),
        }
    }

    pub fn with_list(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.lists.insert(url.into(), text.into());
        self
    }
}

#[async_trait]
impl FilterListSource for StaticFilterLists {
    async fn fetch(&self, url: &str) -> Result<String, FilterListError> {
        tokio::task::yield_now().await;
        self.lists
            .get(url)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| FilterListError::NotFound(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_lists_prefer_exact_urls() {
        let source = StaticFilterLists::uniform("##.fallback").with_list("https://a", "##.exact");
        assert_eq!(source.fetch("https://a").await.unwrap(), "##.exact");
        assert_eq!(source.fetch("https://b").await.unwrap(), "##.fallback");
    }

    #[tokio::test]
    async fn unknown_urls_without_fallback_fail() {
        let source = StaticFilterLists::new();
        assert!(matches!(
            source.fetch("https://missing").await,
            Err(FilterListError::NotFound(url)) if url == "https://missing"
        ));
    }
}
