//! Benchmark collection: per-phase spans, a per-session journal, and
//! cross-session aggregates.
//!
//! The collector is thread-safe and append-only. A span is opened per
//! phase (and one per pipeline run), fed cost/latency/token metrics while
//! the phase executes, and closed with its success flag. Closing flushes
//! the sample to the session journal and folds it into in-memory
//! aggregates.

pub mod journal;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;
use tracing::warn;

use crate::cache::Provenance;
use crate::error::{CacheError, ErrorKind};

pub use journal::Journal;

/// What a benchmark span measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Search,
    Crawl,
    Extract,
    Pipeline,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Crawl => "crawl",
            Self::Extract => "extract",
            Self::Pipeline => "pipeline",
        }
    }
}

/// One closed span, as journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSample {
    pub session_id: String,
    pub category: Category,
    pub phase_ms: u64,
    pub cost_usd: f64,
    pub api_calls: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// How the phase's cache behaved, when it consulted one.
    pub cache_hit: Option<Provenance>,
    pub success: bool,
    /// 0-100 estimate of how complete the phase's output was.
    pub completeness_pct: f64,
    pub error_kind: Option<ErrorKind>,
    pub closed_at: DateTime<Utc>,
}

impl BenchmarkSample {
    pub fn new(session_id: impl Into<String>, category: Category) -> Self {
        Self {
            session_id: session_id.into(),
            category,
            phase_ms: 0,
            cost_usd: 0.0,
            api_calls: 0,
            input_tokens: 0,
            output_tokens: 0,
            cache_hit: None,
            success: false,
            completeness_pct: 0.0,
            error_kind: None,
            closed_at: Utc::now(),
        }
    }
}

/// An open span. Created by [`BenchmarkCollector::open_span`]; metrics are
/// recorded onto it and it is consumed by `close_span`.
pub struct Span {
    category: Category,
    started: Instant,
    cost_usd: f64,
    api_calls: u32,
    input_tokens: u32,
    output_tokens: u32,
    cache_hit: Option<Provenance>,
    completeness_pct: f64,
}

impl Span {
    pub fn record_api_calls(&mut self, calls: u32) {
        self.api_calls += calls;
    }

    pub fn record_cost(&mut self, cost_usd: f64) {
        self.cost_usd += cost_usd;
    }

    pub fn record_tokens(&mut self, input: u32, output: u32) {
        self.input_tokens += input;
        self.output_tokens += output;
    }

    pub fn record_cache_hit(&mut self, provenance: Provenance) {
        self.cache_hit = Some(provenance);
    }

    pub fn record_completeness(&mut self, pct: f64) {
        self.completeness_pct = pct.clamp(0.0, 100.0);
    }
}

/// Per-category aggregate counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryAggregate {
    pub samples: u64,
    pub successes: u64,
    pub total_ms: u64,
    pub cache_hits: u64,
    pub cache_probes: u64,
}

impl CategoryAggregate {
    pub fn success_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.successes as f64 / self.samples as f64
        }
    }

    pub fn cache_hit_rate(&self) -> f64 {
        if self.cache_probes == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.cache_probes as f64
        }
    }
}

/// Read-only aggregate view, also the shape of `aggregate.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub session_id: String,
    pub total_cost_usd: f64,
    pub total_samples: u64,
    pub categories: HashMap<String, CategoryAggregate>,
}

/// Thread-safe benchmark collector for one session.
pub struct BenchmarkCollector {
    session_id: String,
    journal: Option<Journal>,
    aggregates: RwLock<AggregateSnapshot>,
}

impl BenchmarkCollector {
    /// Collector without durable storage (tests, embedded callers).
    pub fn in_memory() -> Self {
        let session_id = Utc::now().format("%Y%m%dT%H%M%S").to_string();
        Self {
            aggregates: RwLock::new(AggregateSnapshot {
                session_id: session_id.clone(),
                ..Default::default()
            }),
            session_id,
            journal: None,
        }
    }

    /// Collector journaling to `dir/session_<start>.jsonl` and
    /// `dir/aggregate.json`.
    pub async fn with_journal(dir: impl AsRef<std::path::Path>) -> Result<Self, CacheError> {
        let session_id = Utc::now().format("%Y%m%dT%H%M%S").to_string();
        let journal = Journal::open(dir, &session_id).await?;
        Ok(Self {
            aggregates: RwLock::new(AggregateSnapshot {
                session_id: session_id.clone(),
                ..Default::default()
            }),
            session_id,
            journal: Some(journal),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Open a span for a phase or pipeline run.
    pub fn open_span(&self, category: Category) -> Span {
        Span {
            category,
            started: Instant::now(),
            cost_usd: 0.0,
            api_calls: 0,
            input_tokens: 0,
            output_tokens: 0,
            cache_hit: None,
            completeness_pct: 0.0,
        }
    }

    /// Close a span: build the sample, flush it to the journal, fold it into
    /// the aggregates, and return it for the request's trace.
    pub async fn close_span(
        &self,
        span: Span,
        success: bool,
        error_kind: Option<ErrorKind>,
    ) -> BenchmarkSample {
        let sample = BenchmarkSample {
            session_id: self.session_id.clone(),
            category: span.category,
            phase_ms: span.started.elapsed().as_millis() as u64,
            cost_usd: span.cost_usd,
            api_calls: span.api_calls,
            input_tokens: span.input_tokens,
            output_tokens: span.output_tokens,
            cache_hit: span.cache_hit,
            success,
            completeness_pct: span.completeness_pct,
            error_kind,
            closed_at: Utc::now(),
        };

        {
            let mut aggregates = self.aggregates.write().unwrap();
            aggregates.total_cost_usd += sample.cost_usd;
            aggregates.total_samples += 1;
            let entry = aggregates
                .categories
                .entry(sample.category.as_str().to_string())
                .or_default();
            entry.samples += 1;
            if sample.success {
                entry.successes += 1;
            }
            entry.total_ms += sample.phase_ms;
            if sample.cache_hit.is_some() {
                entry.cache_probes += 1;
                if matches!(
                    sample.cache_hit,
                    Some(Provenance::DirectHit | Provenance::SimilarityHit)
                ) {
                    entry.cache_hits += 1;
                }
            }
        }

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&sample).await {
                warn!(error = %e, "Failed to journal benchmark sample");
            }
        }

        sample
    }

    /// Read-only aggregate snapshot.
    pub fn aggregates(&self) -> AggregateSnapshot {
        self.aggregates.read().unwrap().clone()
    }

    /// Rewrite `aggregate.json` with the current snapshot.
    pub async fn flush_aggregates(&self) -> Result<(), CacheError> {
        if let Some(journal) = &self.journal {
            journal.write_aggregate(&self.aggregates()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spans_fold_into_aggregates() {
        let collector = BenchmarkCollector::in_memory();

        let mut span = collector.open_span(Category::Search);
        span.record_api_calls(1);
        span.record_cost(0.005);
        span.record_cache_hit(Provenance::DirectHit);
        let sample = collector.close_span(span, true, None).await;
        assert!(sample.success);
        assert_eq!(sample.api_calls, 1);

        let span = collector.open_span(Category::Search);
        let sample = collector
            .close_span(span, false, Some(ErrorKind::SearchProviderUnavailable))
            .await;
        assert_eq!(sample.error_kind, Some(ErrorKind::SearchProviderUnavailable));

        let aggregates = collector.aggregates();
        assert_eq!(aggregates.total_samples, 2);
        let search = &aggregates.categories["search"];
        assert_eq!(search.samples, 2);
        assert_eq!(search.successes, 1);
        assert!((search.success_rate() - 0.5).abs() < 1e-9);
        assert!((search.cache_hit_rate() - 1.0).abs() < 1e-9);
        assert!((aggregates.total_cost_usd - 0.005).abs() < 1e-12);
    }

    #[tokio::test]
    async fn journaled_collector_persists_samples() {
        let dir = tempfile::tempdir().unwrap();
        let collector = BenchmarkCollector::with_journal(dir.path()).await.unwrap();

        let mut span = collector.open_span(Category::Pipeline);
        span.record_completeness(80.0);
        collector.close_span(span, true, None).await;
        collector.flush_aggregates().await.unwrap();

        let mut session_files = 0;
        let mut has_aggregate = false;
        let mut read_dir = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = read_dir.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("session_") && name.ends_with(".jsonl") {
                session_files += 1;
            }
            if name == "aggregate.json" {
                has_aggregate = true;
            }
        }
        assert_eq!(session_files, 1);
        assert!(has_aggregate);
    }

    #[test]
    fn completeness_is_clamped() {
        let collector = BenchmarkCollector::in_memory();
        let mut span = collector.open_span(Category::Extract);
        span.record_completeness(150.0);
        assert_eq!(span.completeness_pct, 100.0);
    }
}
