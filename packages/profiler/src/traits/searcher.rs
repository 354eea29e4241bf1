//! Search provider capability.
//!
//! The pipeline only needs one operation: turn a query string into ranked
//! web hits. Implementations wrap specific providers; rate-limit handling is
//! the caller's concern (the search phase retries with backoff, bounded by
//! its timeout), but a [`RateLimitedSearcher`] wrapper is provided for
//! callers that want client-side pacing as well.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::error::{SearchError, SearchResult};

/// One result from the search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub domain: String,
}

impl SearchHit {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let domain = Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            url,
            title: String::new(),
            snippet: String::new(),
            domain,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}

/// Web search capability.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search the web. Errors are tagged transport or rate-limited; the
    /// caller decides whether to retry.
    async fn search(&self, query: &str, num_results: usize) -> SearchResult<Vec<SearchHit>>;
}

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A provider wrapper that enforces a client-side request rate.
pub struct RateLimitedSearcher<S: SearchProvider> {
    inner: S,
    limiter: Arc<DirectRateLimiter>,
}

impl<S: SearchProvider> RateLimitedSearcher<S> {
    pub fn new(inner: S, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second).expect("requests_per_second must be > 0"),
        );
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<S: SearchProvider> SearchProvider for RateLimitedSearcher<S> {
    async fn search(&self, query: &str, num_results: usize) -> SearchResult<Vec<SearchHit>> {
        self.limiter.until_ready().await;
        self.inner.search(query, num_results).await
    }
}

/// HTTP JSON-API search provider.
///
/// Posts `{query, num_results}` to the configured endpoint with a bearer
/// token and expects `{results: [{url, title, snippet}]}` back. Covers the
/// common hosted search APIs without binding to one vendor.
pub struct HttpSearchProvider {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpSearchProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(&self, query: &str, num_results: usize) -> SearchResult<Vec<SearchHit>> {
        #[derive(Serialize)]
        struct Request<'a> {
            query: &'a str,
            num_results: usize,
        }

        #[derive(Deserialize)]
        struct Response {
            results: Vec<RawHit>,
        }

        #[derive(Deserialize)]
        struct RawHit {
            url: String,
            #[serde(default)]
            title: Option<String>,
            #[serde(default)]
            snippet: Option<String>,
        }

        debug!(query, num_results, "Calling search provider");
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&Request { query, num_results })
            .send()
            .await
            .map_err(|e| SearchError::Transport(Box::new(e)))?;

        if response.status().as_u16() == 429 {
            return Err(SearchError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(SearchError::Transport(Box::new(std::io::Error::other(
                format!("search API error: {}", response.status()),
            ))));
        }

        let parsed: Response = response
            .json()
            .await
            .map_err(|e| SearchError::Transport(Box::new(e)))?;

        Ok(parsed
            .results
            .into_iter()
            .take(num_results)
            .map(|r| {
                let mut hit = SearchHit::new(r.url);
                if let Some(title) = r.title {
                    hit = hit.with_title(title);
                }
                if let Some(snippet) = r.snippet {
                    hit = hit.with_snippet(snippet);
                }
                hit
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_hit_derives_domain() {
        let hit = SearchHit::new("https://www.example.edu/about");
        assert_eq!(hit.domain, "www.example.edu");
    }

    #[test]
    fn search_hit_tolerates_bad_urls() {
        let hit = SearchHit::new("not a url");
        assert!(hit.domain.is_empty());
    }
}
