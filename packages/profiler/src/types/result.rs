//! The final result of a profiling request.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::benchmark::BenchmarkSample;
use crate::error::ErrorKind;
use crate::scoring::quality::QualityReport;
use crate::types::artifact::ScoredImage;
use crate::types::profile::InstitutionProfile;
use crate::types::schema::InstitutionType;

/// Per-phase completion record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub completed: bool,
    pub success: bool,
    pub duration_ms: u64,
}

impl PhaseStatus {
    pub fn ok(duration_ms: u64) -> Self {
        Self {
            completed: true,
            success: true,
            duration_ms,
        }
    }

    pub fn failed(duration_ms: u64) -> Self {
        Self {
            completed: true,
            success: false,
            duration_ms,
        }
    }
}

/// Completion state of the three phases.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseStatuses {
    pub search: PhaseStatus,
    pub crawl: PhaseStatus,
    pub extract: PhaseStatus,
}

impl PhaseStatuses {
    pub fn successful_count(&self) -> usize {
        [self.search, self.crawl, self.extract]
            .iter()
            .filter(|p| p.completed && p.success)
            .count()
    }
}

/// Aggregate facts about the crawl, consumed by the quality scorer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub urls_requested: usize,
    pub successful_pages: usize,
    pub total_bytes: usize,
    /// Fraction of per-URL lookups served from the crawl cache, in [0, 1].
    pub cache_hit_rate: f64,
    /// Mean per-page content richness (0-100) across fetched artifacts.
    pub avg_content_richness: f64,
}

impl CrawlSummary {
    /// Fraction of requested URLs that produced a usable artifact.
    pub fn success_rate(&self) -> f64 {
        if self.urls_requested == 0 {
            0.0
        } else {
            self.successful_pages as f64 / self.urls_requested as f64
        }
    }
}

/// Everything a profiling request produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResult {
    pub profile: InstitutionProfile,
    pub institution_type: InstitutionType,

    /// Logo candidates, confidence descending.
    pub logos: Vec<ScoredImage>,
    /// Relevant images (relevance >= 3), score descending.
    pub images: Vec<ScoredImage>,
    /// Subset with relevance >= 5.
    pub facility_images: Vec<ScoredImage>,
    /// Platform -> URL, one link per known platform.
    pub social_links: BTreeMap<String, String>,
    /// Links to documents (.pdf, .doc, ...) discovered during the crawl.
    pub document_links: Vec<String>,

    pub quality: QualityReport,
    pub crawl_summary: CrawlSummary,
    pub phases: PhaseStatuses,

    /// Benchmark samples recorded for this request, in close order.
    pub benchmark_trace: Vec<BenchmarkSample>,

    /// True when any phase reported a non-fatal failure.
    pub degraded: bool,
    pub error_kinds: Vec<ErrorKind>,
}

impl ProfileResult {
    /// Record a non-fatal degradation.
    pub fn degrade(&mut self, kind: ErrorKind) {
        self.degraded = true;
        if !self.error_kinds.contains(&kind) {
            self.error_kinds.push(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrade_deduplicates_kinds() {
        let mut result = ProfileResult {
            profile: InstitutionProfile::new(),
            institution_type: InstitutionType::General,
            logos: vec![],
            images: vec![],
            facility_images: vec![],
            social_links: BTreeMap::new(),
            document_links: vec![],
            quality: QualityReport::default(),
            crawl_summary: CrawlSummary::default(),
            phases: PhaseStatuses::default(),
            benchmark_trace: vec![],
            degraded: false,
            error_kinds: vec![],
        };

        result.degrade(ErrorKind::CrawlEmpty);
        result.degrade(ErrorKind::CrawlEmpty);
        assert!(result.degraded);
        assert_eq!(result.error_kinds.len(), 1);
    }

    #[test]
    fn success_rate_handles_empty_crawl() {
        let summary = CrawlSummary::default();
        assert_eq!(summary.success_rate(), 0.0);
    }
}
