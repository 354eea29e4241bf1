//! Per-request mutable state threaded through the pipeline.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::benchmark::BenchmarkSample;
use crate::normalize::NormalizedKey;
use crate::phases::{CrawlOutcome, ExtractOutcome, SearchOutcome};
use crate::types::request::ProfileRequest;
use crate::types::result::PhaseStatuses;
use crate::types::schema::InstitutionType;

/// Owns a request's phase outputs until the final result is assembled.
///
/// One context lives for exactly one request; everything it owns is moved
/// into the [`crate::types::result::ProfileResult`] or dropped when an error
/// surfaces.
pub struct ProfilingContext {
    /// Unique id for this request, carried through log lines.
    pub request_id: Uuid,
    pub request: ProfileRequest,
    pub institution_type: InstitutionType,
    pub key: NormalizedKey,
    pub cancel: CancellationToken,

    pub search: Option<SearchOutcome>,
    pub crawl: Option<CrawlOutcome>,
    pub extract: Option<ExtractOutcome>,

    pub phases: PhaseStatuses,
    pub samples: Vec<BenchmarkSample>,
}

impl ProfilingContext {
    pub fn new(
        request: ProfileRequest,
        institution_type: InstitutionType,
        key: NormalizedKey,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            request,
            institution_type,
            key,
            cancel,
            search: None,
            crawl: None,
            extract: None,
            phases: PhaseStatuses::default(),
            samples: Vec::new(),
        }
    }

    /// Description text available for content preparation: the search
    /// phase's assembled description, if any.
    pub fn search_description(&self) -> &str {
        self.search.as_ref().map(|s| s.description.as_str()).unwrap_or("")
    }
}
