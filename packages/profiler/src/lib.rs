//! Institution profiling pipeline.
//!
//! Builds structured profiles of named institutions (universities,
//! hospitals, banks, and a general fallback class) from unstructured web
//! sources. Given a free-text name, the pipeline runs search → crawl →
//! extract and returns a typed record with scored media assets, a 0-100
//! quality score, and a per-request benchmark trace.
//!
//! # Design
//!
//! - Capability-driven: the search provider, crawler engine, and language
//!   model are narrow traits ([`traits`]); a [`pipeline::Services`] bundle
//!   is threaded through, with no process-wide state.
//! - Degradation over failure: provider outages, empty crawls, and LLM
//!   failures mark the result degraded with typed [`error::ErrorKind`] tags;
//!   only schema mismatches and cancellation abort a request.
//! - Everything observable: every phase runs inside a benchmark span that
//!   is journaled per session and aggregated across requests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use profiler::{Pipeline, ProfileRequest, Services};
//!
//! let services = Services::new(searcher, crawler, language_model);
//! let pipeline = Pipeline::open(services, "./data").await?;
//!
//! let result = pipeline
//!     .process(ProfileRequest::new("Massachusetts Institute of Technology"))
//!     .await?;
//!
//! println!("quality: {} ({:?})", result.quality.score, result.quality.rating);
//! ```
//!
//! # Modules
//!
//! - [`autocomplete`] - trie, spell correction, and suggestion front end
//! - [`normalize`] - query canonicalization and the similarity metric
//! - [`cache`] - similarity cache with file-backed entries
//! - [`traits`] - capability interfaces (search, crawl, LLM)
//! - [`engines`] - bundled static-HTML crawler engine
//! - [`phases`] - the three phase handlers and content preparation
//! - [`pipeline`] - the orchestrator
//! - [`scoring`] - media heuristics and the quality score
//! - [`benchmark`] - span collection, session journal, aggregates
//! - [`testing`] - mock capability implementations

pub mod autocomplete;
pub mod benchmark;
pub mod cache;
pub mod engines;
pub mod error;
pub mod normalize;
pub mod phases;
pub mod pipeline;
pub mod scoring;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export the core surface at the crate root.
pub use autocomplete::{AutocompleteService, SpellCorrector, Suggestion, Trie};
pub use benchmark::{AggregateSnapshot, BenchmarkCollector, BenchmarkSample, Category};
pub use cache::{CacheHit, CacheStats, Provenance, SimilarityCache};
pub use engines::HttpCrawlerEngine;
pub use error::{ErrorKind, ProfileError, Result, SearchError};
pub use normalize::{AbbreviationTable, NormalizedKey};
pub use phases::{CrawlPhase, ExtractPhase, SearchPhase, Tier};
pub use pipeline::{Pipeline, PipelineConfig, ProfilingContext, Services};
pub use scoring::{MediaScorer, QualityReport, Rating};
pub use traits::{
    Completion, CompletionOptions, CrawlerEngine, FetchOptions, HttpLanguageModel,
    HttpSearchProvider, LanguageModel, RateLimitedSearcher, SearchHit, SearchProvider,
};
pub use types::artifact::{CrawlArtifact, ImageRecord, ScoredImage};
pub use types::profile::{InstitutionProfile, Value};
pub use types::request::{CrawlStrategy, ProfileRequest};
pub use types::result::ProfileResult;
pub use types::schema::{FieldClass, InstitutionType};
