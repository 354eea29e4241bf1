//! The pipeline orchestrator: phase sequencing, caching, cancellation, and
//! error routing.
//!
//! One [`Pipeline`] owns the capability services, the three caches, and the
//! benchmark collector. For each phase it opens a span, consults the
//! phase-appropriate cache, runs the handler under its timeout with the
//! shared cancellation token, and closes the span. Non-fatal phase failures
//! degrade the result; only schema mismatches and cancellation surface as
//! top-level errors.

pub mod context;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::benchmark::{BenchmarkCollector, Category};
use crate::cache::{Provenance, SimilarityCache};
use crate::error::{ErrorKind, ProfileError, Result};
use crate::normalize::{AbbreviationTable, NormalizedKey};
use crate::phases::crawl::{CrawlOutcome, CrawlPhase};
use crate::phases::extract::{self, ExtractOutcome, ExtractPhase};
use crate::phases::prepare;
use crate::phases::search::{infer_type, SearchOutcome, SearchPhase};
use crate::scoring::quality::{self, QualityInputs};
use crate::traits::ai::LanguageModel;
use crate::traits::crawler::CrawlerEngine;
use crate::traits::searcher::SearchProvider;
use crate::types::artifact::CrawlArtifact;
use crate::types::profile::Value;
use crate::types::request::ProfileRequest;
use crate::types::result::{PhaseStatus, ProfileResult};
use crate::types::schema::{self, InstitutionType};

pub use context::ProfilingContext;

/// The capability bundle threaded through the pipeline. Constructed once at
/// startup; no process-wide mutable state.
pub struct Services<S, C, A> {
    pub searcher: S,
    pub crawler: C,
    pub ai: A,
}

impl<S, C, A> Services<S, C, A> {
    pub fn new(searcher: S, crawler: C, ai: A) -> Self {
        Self { searcher, crawler, ai }
    }
}

/// Phase handlers and timeout budgets.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub search: SearchPhase,
    pub crawl: CrawlPhase,
    pub extract: ExtractPhase,
    pub search_timeout: Duration,
    pub crawl_timeout: Duration,
    pub extract_timeout: Duration,
    pub search_ttl: Duration,
    pub crawl_ttl: Duration,
    pub extract_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search: SearchPhase::default(),
            crawl: CrawlPhase::default(),
            extract: ExtractPhase::default(),
            search_timeout: Duration::from_secs(10),
            crawl_timeout: Duration::from_secs(60),
            extract_timeout: Duration::from_secs(30),
            search_ttl: Duration::from_secs(7 * 24 * 3600),
            crawl_ttl: Duration::from_secs(24 * 3600),
            extract_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// The profiling pipeline.
pub struct Pipeline<S: SearchProvider, C: CrawlerEngine, A: LanguageModel> {
    services: Services<S, C, A>,
    config: PipelineConfig,
    abbreviations: AbbreviationTable,
    search_cache: SimilarityCache<SearchOutcome>,
    crawl_cache: SimilarityCache<CrawlArtifact>,
    extract_cache: SimilarityCache<ExtractOutcome>,
    benchmarks: Arc<BenchmarkCollector>,
}

impl<S: SearchProvider, C: CrawlerEngine, A: LanguageModel> Pipeline<S, C, A> {
    /// In-memory pipeline with default configuration.
    pub fn new(services: Services<S, C, A>) -> Self {
        let config = PipelineConfig::default();
        Self {
            search_cache: SimilarityCache::in_memory(config.search_ttl),
            crawl_cache: SimilarityCache::in_memory(config.crawl_ttl).exact_only(),
            extract_cache: SimilarityCache::in_memory(config.extract_ttl),
            benchmarks: Arc::new(BenchmarkCollector::in_memory()),
            abbreviations: AbbreviationTable::empty(),
            services,
            config,
        }
    }

    /// Pipeline with durable caches and benchmark journal under `base_dir`:
    /// `cache/{search,crawl,extract}/` and `benchmarks/`.
    pub async fn open(services: Services<S, C, A>, base_dir: impl AsRef<Path>) -> Result<Self> {
        let base = base_dir.as_ref();
        let config = PipelineConfig::default();
        let search_cache =
            SimilarityCache::open(base.join("cache/search"), config.search_ttl).await?;
        let crawl_cache = SimilarityCache::open(base.join("cache/crawl"), config.crawl_ttl)
            .await?
            .exact_only();
        let extract_cache =
            SimilarityCache::open(base.join("cache/extract"), config.extract_ttl).await?;
        let benchmarks = Arc::new(BenchmarkCollector::with_journal(base.join("benchmarks")).await?);

        Ok(Self {
            services,
            config,
            abbreviations: AbbreviationTable::empty(),
            search_cache,
            crawl_cache,
            extract_cache,
            benchmarks,
        })
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the abbreviation table (normally built from the trie).
    pub fn with_abbreviations(mut self, abbreviations: AbbreviationTable) -> Self {
        self.abbreviations = abbreviations;
        self
    }

    pub fn with_benchmarks(mut self, benchmarks: Arc<BenchmarkCollector>) -> Self {
        self.benchmarks = benchmarks;
        self
    }

    pub fn benchmarks(&self) -> &BenchmarkCollector {
        &self.benchmarks
    }

    /// Sweep all three caches. Invoked on startup and periodically.
    pub async fn sweep_caches(&self) -> Result<usize> {
        let mut removed = 0;
        removed += self.search_cache.sweep().await?;
        removed += self.crawl_cache.sweep().await?;
        removed += self.extract_cache.sweep().await?;
        Ok(removed)
    }

    /// Profile an institution.
    pub async fn process(&self, request: ProfileRequest) -> Result<ProfileResult> {
        self.process_with_cancel(request, CancellationToken::new()).await
    }

    /// Profile with an externally owned cancellation token. On cancel,
    /// in-flight work is abandoned, nothing partial is cached, and
    /// [`ProfileError::Cancelled`] is returned.
    pub async fn process_with_cancel(
        &self,
        request: ProfileRequest,
        cancel: CancellationToken,
    ) -> Result<ProfileResult> {
        if request.institution_name.trim().is_empty() {
            return Err(ProfileError::InvalidRequest {
                reason: "institution name is empty".to_string(),
            });
        }

        let institution_type = request
            .institution_type
            .unwrap_or_else(|| infer_type(&request.institution_name));
        let key = NormalizedKey::from_request(&request, &self.abbreviations);
        info!(
            name = %request.institution_name,
            institution_type = %institution_type,
            canonical = %key.canonical,
            "Pipeline start"
        );

        let mut ctx = ProfilingContext::new(request, institution_type, key, cancel);
        debug!(request_id = %ctx.request_id, "Context created");
        let pipeline_span = self.benchmarks.open_span(Category::Pipeline);

        self.run_search(&mut ctx).await?;
        self.run_crawl(&mut ctx).await?;

        let skip_extraction = ctx.request.skip_extraction;
        if !skip_extraction {
            self.run_extract(&mut ctx).await?;
        }

        let mut result = self.assemble(ctx);

        let mut span = pipeline_span;
        span.record_cost(result.benchmark_trace.iter().map(|s| s.cost_usd).sum());
        span.record_completeness(result.quality.score);
        let pipeline_sample = self
            .benchmarks
            .close_span(span, !result.degraded, result.error_kinds.first().copied())
            .await;
        result.benchmark_trace.push(pipeline_sample);

        Ok(result)
    }

    async fn run_search(&self, ctx: &mut ProfilingContext) -> Result<()> {
        let mut span = self.benchmarks.open_span(Category::Search);
        let started = std::time::Instant::now();
        let _flight = self.search_cache.flight(&ctx.key.cache_key()).await;

        let mut outcome: Option<SearchOutcome> = None;
        if !ctx.request.force_refresh {
            if let Some(hit) = self.search_cache.get(&ctx.key) {
                debug!(provenance = hit.provenance.as_str(), "Search cache hit");
                span.record_cache_hit(hit.provenance);
                outcome = Some(hit.value);
            }
        }

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => {
                let phase = &self.config.search;
                let executed = self
                    .phase_with_timeout(
                        self.config.search_timeout,
                        &ctx.cancel,
                        phase.execute(
                            &self.services.searcher,
                            &ctx.request,
                            ctx.institution_type,
                            &ctx.cancel,
                        ),
                    )
                    .await?;

                span.record_api_calls(1);
                let outcome = executed.unwrap_or_else(|| SearchOutcome {
                    error_kind: Some(ErrorKind::SearchProviderUnavailable),
                    ..Default::default()
                });

                if !outcome.degraded() {
                    self.search_cache.put(&ctx.key, &outcome).await?;
                }
                outcome
            }
        };

        span.record_completeness((outcome.links.len() as f64 * 6.67).min(100.0));
        let success = !outcome.degraded();
        let sample = self
            .benchmarks
            .close_span(span, success, outcome.error_kind)
            .await;
        ctx.samples.push(sample);

        ctx.phases.search = if success {
            PhaseStatus::ok(started.elapsed().as_millis() as u64)
        } else {
            PhaseStatus::failed(started.elapsed().as_millis() as u64)
        };
        ctx.search = Some(outcome);
        Ok(())
    }

    async fn run_crawl(&self, ctx: &mut ProfilingContext) -> Result<()> {
        let mut span = self.benchmarks.open_span(Category::Crawl);
        let started = std::time::Instant::now();

        let links = ctx
            .search
            .as_ref()
            .map(|s| s.links.clone())
            .unwrap_or_default();

        let outcome = if links.is_empty() {
            // Nothing to crawl; the phase is skipped and reported empty.
            CrawlOutcome {
                error_kind: Some(ErrorKind::CrawlEmpty),
                ..Default::default()
            }
        } else {
            let phase = &self.config.crawl;
            let executed = self
                .phase_with_timeout(
                    self.config.crawl_timeout,
                    &ctx.cancel,
                    phase.execute(
                        &self.services.crawler,
                        &self.crawl_cache,
                        &links,
                        &ctx.request.institution_name,
                        ctx.institution_type,
                        ctx.request.strategy,
                        ctx.request.max_pages,
                        ctx.request.force_refresh,
                        &ctx.cancel,
                    ),
                )
                .await?;

            executed.unwrap_or_else(|| CrawlOutcome {
                error_kind: Some(ErrorKind::CrawlEmpty),
                ..Default::default()
            })
        };

        span.record_api_calls(outcome.summary.urls_requested as u32);
        span.record_completeness((outcome.summary.successful_pages as f64 * 8.33).min(100.0));
        if outcome.summary.urls_requested > 0 && outcome.summary.cache_hit_rate >= 1.0 {
            span.record_cache_hit(Provenance::DirectHit);
        }

        let success = !outcome.degraded();
        let sample = self
            .benchmarks
            .close_span(span, success, outcome.error_kind)
            .await;
        ctx.samples.push(sample);

        ctx.phases.crawl = if success {
            PhaseStatus::ok(started.elapsed().as_millis() as u64)
        } else {
            PhaseStatus::failed(started.elapsed().as_millis() as u64)
        };
        ctx.crawl = Some(outcome);
        Ok(())
    }

    async fn run_extract(&self, ctx: &mut ProfilingContext) -> Result<()> {
        let mut span = self.benchmarks.open_span(Category::Extract);
        let started = std::time::Instant::now();

        let artifacts = ctx
            .crawl
            .as_ref()
            .map(|c| c.artifacts.as_slice())
            .unwrap_or(&[]);
        let prepared = prepare::prepare(
            artifacts,
            ctx.search_description(),
            ctx.request.direct_text.as_deref(),
        );
        debug!(branch = ?prepared.branch, bytes = prepared.text.len(), "Content prepared");

        let model_id = self.config.extract.completion.model_id.clone();
        let cache_key = extract::extraction_key(&ctx.key, &prepared.text, &model_id);
        let _flight = self.extract_cache.flight(&cache_key.cache_key()).await;

        let mut outcome: Option<ExtractOutcome> = None;
        if !ctx.request.force_refresh {
            if let Some(hit) = self.extract_cache.get(&cache_key) {
                // A cached record carrying fields outside the frozen schema
                // is a hard-fatal condition, not a miss.
                if let Some(field) = hit.value.profile.first_unknown_field() {
                    return Err(ProfileError::SchemaMismatch {
                        reason: format!("cached extraction carries unknown field `{field}`"),
                    });
                }
                debug!(provenance = hit.provenance.as_str(), "Extraction cache hit");
                span.record_cache_hit(hit.provenance);
                outcome = Some(hit.value);
            }
        }

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => {
                let phase = &self.config.extract;
                let executed = self
                    .phase_with_timeout(
                        self.config.extract_timeout,
                        &ctx.cancel,
                        phase.execute(
                            &self.services.ai,
                            &ctx.request.institution_name,
                            &prepared.text,
                        ),
                    )
                    .await?;

                let outcome = executed.unwrap_or_else(|| ExtractOutcome {
                    error_kind: Some(ErrorKind::ExtractFailed),
                    ..Default::default()
                });

                if !outcome.degraded() {
                    self.extract_cache.put(&cache_key, &outcome).await?;
                }
                outcome
            }
        };

        span.record_api_calls(outcome.usage.api_calls);
        span.record_tokens(outcome.usage.input_tokens, outcome.usage.output_tokens);
        span.record_cost(outcome.usage.cost_usd);
        let eligible = schema::FIELDS.len() as f64;
        span.record_completeness(outcome.profile.len() as f64 / eligible * 100.0);

        let success = !outcome.degraded();
        let sample = self
            .benchmarks
            .close_span(span, success, outcome.error_kind)
            .await;
        ctx.samples.push(sample);

        ctx.phases.extract = if success {
            PhaseStatus::ok(started.elapsed().as_millis() as u64)
        } else {
            PhaseStatus::failed(started.elapsed().as_millis() as u64)
        };
        ctx.extract = Some(outcome);
        Ok(())
    }

    /// Run a phase future under its timeout. `Ok(None)` is a timeout;
    /// cancellation is fatal.
    async fn phase_with_timeout<T>(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
        future: impl std::future::Future<Output = T>,
    ) -> Result<Option<T>> {
        tokio::select! {
            outcome = future => Ok(Some(outcome)),
            _ = tokio::time::sleep(timeout) => Ok(None),
            _ = cancel.cancelled() => Err(ProfileError::Cancelled),
        }
    }

    /// Assemble the final result: extracted record plus crawl-derived
    /// media, quality score, and benchmark trace.
    fn assemble(&self, ctx: ProfilingContext) -> ProfileResult {
        let ProfilingContext {
            request,
            institution_type,
            search,
            crawl,
            extract: extraction,
            phases,
            samples,
            ..
        } = ctx;

        let crawl = crawl.unwrap_or_default();
        let media = extract::merge_media(&crawl.artifacts);

        let mut profile = extraction
            .as_ref()
            .map(|e| e.profile.clone())
            .unwrap_or_default();

        // Crawl-derived fallbacks for fields the extractor could not supply.
        if !profile.contains("name") {
            profile.set("name", request.institution_name.as_str());
        }
        if !profile.contains("type") {
            profile.set("type", institution_type.as_str());
        }
        if !profile.contains("website") {
            if let Some(top) = search.as_ref().and_then(|s| s.links.first()) {
                profile.set("website", top.url.as_str());
            }
        }
        if !profile.contains("description") {
            if let Some(outcome) = &search {
                if !outcome.description.is_empty() {
                    profile.set(
                        "description",
                        prepare::truncate_at_boundary(&outcome.description, 500),
                    );
                }
            }
        }

        let record_type = profile.institution_type().unwrap_or(institution_type);

        let quality = quality::score(
            &profile,
            record_type,
            &QualityInputs {
                logo_count: media.logos.len(),
                image_count: media.images.len(),
                facility_image_count: media.facility_images.len(),
                campus_image_count: media.campus_image_count,
                social_link_count: media.social_links.len(),
                document_count: media.document_links.len(),
                crawl_summary: crawl.summary.clone(),
                phases,
            },
        );

        let mut result = ProfileResult {
            profile,
            institution_type: record_type,
            logos: media.logos,
            images: media.images,
            facility_images: media.facility_images,
            social_links: media.social_links,
            document_links: media.document_links,
            quality,
            crawl_summary: crawl.summary,
            phases,
            benchmark_trace: samples,
            degraded: false,
            error_kinds: Vec::new(),
        };

        if let Some(kind) = search.and_then(|s| s.error_kind) {
            result.degrade(kind);
        }
        if let Some(kind) = crawl.error_kind {
            result.degrade(kind);
        }
        if let Some(kind) = extraction.and_then(|e| e.error_kind) {
            result.degrade(kind);
        }

        result
    }
}

/// Convenience accessor used by tests and embedding callers: the profile's
/// `website` value when set.
pub fn website_of(result: &ProfileResult) -> Option<&str> {
    result.profile.get("website").and_then(Value::as_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCrawlerEngine, MockLanguageModel, MockSearchProvider};
    use crate::traits::searcher::SearchHit;

    fn services(
    ) -> Services<MockSearchProvider, MockCrawlerEngine, MockLanguageModel> {
        Services::new(
            MockSearchProvider::new()
                .with_hits(vec![SearchHit::new("https://www.example.edu/")
                    .with_title("Example University official")
                    .with_snippet("Example University is a research university.")]),
            MockCrawlerEngine::new().with_artifact(
                CrawlArtifact::new("https://www.example.edu")
                    .with_title("Example University")
                    .with_markdown("Example University, founded 1891, in Springfield."),
            ),
            MockLanguageModel::new().with_response(
                r#"{"name": "Example University", "founded": "1891", "location_city": "Springfield"}"#,
            ),
        )
    }

    #[tokio::test]
    async fn full_pipeline_produces_a_profile() {
        let pipeline = Pipeline::new(services());
        let result = pipeline
            .process(ProfileRequest::new("Example University"))
            .await
            .unwrap();

        assert!(!result.degraded, "{:?}", result.error_kinds);
        assert_eq!(
            result.profile.get("founded").unwrap().as_text(),
            Some("1891")
        );
        assert_eq!(result.institution_type, InstitutionType::University);
        assert!(result.phases.search.success);
        assert!(result.phases.crawl.success);
        assert!(result.phases.extract.success);
        // search + crawl + extract + pipeline
        assert_eq!(result.benchmark_trace.len(), 4);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let pipeline = Pipeline::new(services());
        let error = pipeline.process(ProfileRequest::new("  ")).await.unwrap_err();
        assert!(matches!(error, ProfileError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn skip_extraction_stops_after_crawl() {
        let pipeline = Pipeline::new(services());
        let result = pipeline
            .process(ProfileRequest::new("Example University").skip_extraction())
            .await
            .unwrap();

        assert!(!result.phases.extract.completed);
        // name/type/website still derived without the extractor
        assert!(result.profile.contains("name"));
        assert!(website_of(&result).is_some());
    }

    #[tokio::test]
    async fn cancellation_surfaces_as_an_error() {
        let pipeline = Pipeline::new(services());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = pipeline
            .process_with_cancel(ProfileRequest::new("Example University"), cancel)
            .await
            .unwrap_err();
        assert!(matches!(error, ProfileError::Cancelled));
    }

    #[tokio::test]
    async fn second_request_hits_the_search_cache() {
        let pipeline = Pipeline::new(services());
        let first = pipeline
            .process(ProfileRequest::new("Example University"))
            .await
            .unwrap();
        assert!(first.benchmark_trace[0].cache_hit.is_none());

        let second = pipeline
            .process(ProfileRequest::new("Example University"))
            .await
            .unwrap();
        assert_eq!(second.benchmark_trace[0].cache_hit, Some(Provenance::DirectHit));
    }

    #[tokio::test]
    async fn force_refresh_bypasses_cache_reads() {
        let pipeline = Pipeline::new(services());
        pipeline
            .process(ProfileRequest::new("Example University"))
            .await
            .unwrap();

        let refreshed = pipeline
            .process(ProfileRequest::new("Example University").force_refresh())
            .await
            .unwrap();
        assert!(refreshed.benchmark_trace[0].cache_hit.is_none());
    }
}
