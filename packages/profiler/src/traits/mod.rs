//! Capability traits the pipeline depends on.
//!
//! Applications supply implementations of these three interfaces; a
//! `Services` bundle threads them through the pipeline with no process-wide
//! state.

pub mod ai;
pub mod crawler;
pub mod searcher;

pub use ai::{Completion, CompletionOptions, HttpLanguageModel, LanguageModel};
pub use crawler::{CrawlerEngine, FetchOptions};
pub use searcher::{HttpSearchProvider, RateLimitedSearcher, SearchHit, SearchProvider};
