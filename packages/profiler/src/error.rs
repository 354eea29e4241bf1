//! Typed errors for the profiling pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Most failures never surface
//! here: the pipeline degrades per phase and records an [`ErrorKind`] on the
//! result instead. Only schema mismatches and cancellation abort a request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during profiling operations.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Search provider call failed
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    /// Crawler engine call failed
    #[error("crawl failed: {0}")]
    Crawl(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// LLM transport or response failure
    #[error("language model error: {0}")]
    LanguageModel(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Cache storage failed
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Extracted record does not match the frozen field schema
    #[error("schema mismatch: {reason}")]
    SchemaMismatch { reason: String },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid request (e.g. empty institution name)
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Errors from the search provider capability.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Transport-level failure (connection, DNS, non-2xx)
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Provider rejected the call due to rate limiting
    #[error("rate limited")]
    RateLimited,
}

/// Errors from the file-backed cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry file exists but cannot be decoded; it is quarantined
    #[error("corrupt cache entry: {path}")]
    Corrupt { path: String },
}

/// Non-fatal degradation tags accumulated on a pipeline result.
///
/// These never abort the request (see [`ProfileError`] for the conditions
/// that do); they are reported on the result and fed into the quality
/// scorer's processing-success bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Spell corrector found no trie-validated correction
    NoSuggestion,
    /// Cache lookup missed; drives a fresh call
    CacheMiss,
    /// Search provider unreachable or rate-limit budget exhausted
    SearchProviderUnavailable,
    /// No URL produced a usable artifact
    CrawlEmpty,
    /// LLM transport or parse failure; record built from crawl data only
    ExtractFailed,
    /// Phase exceeded its timeout budget
    PhaseTimeout,
    /// Corrupt cache file quarantined and treated as a miss
    CacheCorrupt,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::NoSuggestion => "no_suggestion",
            Self::CacheMiss => "cache_miss",
            Self::SearchProviderUnavailable => "search_provider_unavailable",
            Self::CrawlEmpty => "crawl_empty",
            Self::ExtractFailed => "extract_failed",
            Self::PhaseTimeout => "phase_timeout",
            Self::CacheCorrupt => "cache_corrupt",
        };
        f.write_str(tag)
    }
}

/// Result type alias for profiling operations.
pub type Result<T> = std::result::Result<T, ProfileError>;

/// Result type alias for search provider operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SearchProviderUnavailable).unwrap();
        assert_eq!(json, "\"search_provider_unavailable\"");
        assert_eq!(
            ErrorKind::SearchProviderUnavailable.to_string(),
            "search_provider_unavailable"
        );
    }
}
