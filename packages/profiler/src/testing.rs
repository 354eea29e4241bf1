//! Mock capability implementations for testing.
//!
//! Deterministic, configurable stand-ins for the search provider, crawler
//! engine, and language model, with call tracking for assertions. No
//! network traffic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use crate::error::{ProfileError, Result, SearchError, SearchResult};
use crate::phases::crawl::canonical_url;
use crate::traits::ai::{Completion, CompletionOptions, LanguageModel};
use crate::traits::crawler::{CrawlerEngine, FetchOptions};
use crate::traits::searcher::{SearchHit, SearchProvider};
use crate::types::artifact::CrawlArtifact;

/// Failure modes a mock provider can simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Transport,
    RateLimited,
}

/// Mock search provider returning fixed hits.
#[derive(Default)]
pub struct MockSearchProvider {
    hits: RwLock<Vec<SearchHit>>,
    /// Per-query overrides, checked before the default hit list.
    per_query: RwLock<HashMap<String, Vec<SearchHit>>>,
    failure: RwLock<Option<MockFailure>>,
    /// Fail this many calls with RateLimited before succeeding.
    rate_limit_first: AtomicU32,
    calls: RwLock<Vec<String>>,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(self, hits: Vec<SearchHit>) -> Self {
        *self.hits.write().unwrap() = hits;
        self
    }

    /// Serve specific hits for one exact query string.
    pub fn with_hits_for(self, query: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        self.per_query.write().unwrap().insert(query.into(), hits);
        self
    }

    pub fn with_failure(self, failure: MockFailure) -> Self {
        *self.failure.write().unwrap() = Some(failure);
        self
    }

    /// Rate-limit the first `n` calls, then serve hits.
    pub fn rate_limited_first(self, n: u32) -> Self {
        self.rate_limit_first.store(n, Ordering::SeqCst);
        self
    }

    /// Queries this mock has served, in order.
    pub fn queries(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, query: &str, num_results: usize) -> SearchResult<Vec<SearchHit>> {
        self.calls.write().unwrap().push(query.to_string());

        if self
            .rate_limit_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SearchError::RateLimited);
        }

        match *self.failure.read().unwrap() {
            Some(MockFailure::Transport) => Err(SearchError::Transport(Box::new(
                std::io::Error::other("mock transport failure"),
            ))),
            Some(MockFailure::RateLimited) => Err(SearchError::RateLimited),
            None => {
                let mut hits = match self.per_query.read().unwrap().get(query) {
                    Some(hits) => hits.clone(),
                    None => self.hits.read().unwrap().clone(),
                };
                hits.truncate(num_results);
                Ok(hits)
            }
        }
    }
}

/// Mock crawler engine serving fixed artifacts by canonical URL.
#[derive(Default)]
pub struct MockCrawlerEngine {
    artifacts: RwLock<HashMap<String, CrawlArtifact>>,
    delays: RwLock<HashMap<String, Duration>>,
    fetches: AtomicUsize,
}

impl MockCrawlerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact, keyed by its own canonicalized URL.
    pub fn with_artifact(self, artifact: CrawlArtifact) -> Self {
        self.artifacts
            .write()
            .unwrap()
            .insert(canonical_url(&artifact.url), artifact);
        self
    }

    /// Delay fetches of one URL, for completion-order tests.
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.write().unwrap().insert(canonical_url(url), delay);
        self
    }

    /// How many fetches reached the engine (cache hits do not).
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrawlerEngine for MockCrawlerEngine {
    async fn fetch(&self, url: &str, _options: &FetchOptions) -> Result<CrawlArtifact> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let key = canonical_url(url);
        let delay = self.delays.read().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.artifacts
            .read()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                ProfileError::Crawl(Box::new(std::io::Error::other(format!(
                    "mock has no fixture for {url}"
                ))))
            })
    }
}

/// Mock language model returning a fixed response.
#[derive(Default)]
pub struct MockLanguageModel {
    response: RwLock<String>,
    fail: RwLock<bool>,
    calls: RwLock<Vec<(String, String)>>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self {
            response: RwLock::new("{}".to_string()),
            ..Default::default()
        }
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        *self.response.write().unwrap() = response.into();
        self
    }

    pub fn failing(self) -> Self {
        *self.fail.write().unwrap() = true;
        self
    }

    /// (system, user) prompt pairs this mock has seen.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<Completion> {
        self.calls
            .write()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));

        if *self.fail.read().unwrap() {
            return Err(ProfileError::LanguageModel(Box::new(std::io::Error::other(
                "mock language model failure",
            ))));
        }

        let text = self.response.read().unwrap().clone();
        // Rough 4-chars-per-token accounting keeps benchmark fields nonzero.
        Ok(Completion {
            input_tokens: ((system_prompt.len() + user_prompt.len()) / 4) as u32,
            output_tokens: (text.len() / 4) as u32,
            cost_usd: 0.001,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_searcher_tracks_calls_and_rate_limits() {
        let searcher = MockSearchProvider::new()
            .with_hits(vec![SearchHit::new("https://example.edu/")])
            .rate_limited_first(1);

        assert!(matches!(
            searcher.search("q", 10).await,
            Err(SearchError::RateLimited)
        ));
        let hits = searcher.search("q", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(searcher.queries().len(), 2);
    }

    #[tokio::test]
    async fn mock_crawler_errors_without_fixture() {
        let crawler = MockCrawlerEngine::new();
        let result = crawler
            .fetch("https://nowhere.example.com", &FetchOptions::default())
            .await;
        assert!(result.is_err());
        assert_eq!(crawler.fetch_count(), 1);
    }

    #[tokio::test]
    async fn mock_language_model_replays_response() {
        let ai = MockLanguageModel::new().with_response(r#"{"name": "X"}"#);
        let completion = ai
            .complete("system", "user", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.text, r#"{"name": "X"}"#);
        assert_eq!(ai.calls().len(), 1);
    }
}
