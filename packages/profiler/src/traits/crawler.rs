//! Crawler engine capability.
//!
//! The engine turns one URL into a full [`CrawlArtifact`]: every content
//! format it can produce, plus media and link inventories. Scheduling,
//! tiering, concurrency, and caching all live in the crawl phase; the
//! engine only fetches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;
use crate::types::artifact::CrawlArtifact;

/// Per-fetch parameters handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Whether the engine should execute page JavaScript (engines without a
    /// browser ignore this).
    pub js_enabled: bool,

    /// Hard deadline for the fetch.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// How many link levels the engine may follow from this URL.
    pub follow_depth: usize,

    /// Page budget for follow-up fetches rooted at this URL.
    pub max_pages: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            js_enabled: false,
            timeout: Duration::from_secs(30),
            follow_depth: 0,
            max_pages: 1,
        }
    }
}

impl FetchOptions {
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.follow_depth = depth;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Headless-fetch capability.
#[async_trait]
pub trait CrawlerEngine: Send + Sync {
    /// Fetch one URL into an artifact. Per-URL failures surface as errors;
    /// the crawl phase isolates them.
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<CrawlArtifact>;
}
