//! Crawl phase: tier-budgeted parallel fetching, caching, media scoring.
//!
//! URLs are fetched concurrently under a semaphore, but results are
//! reassembled in planned priority order so downstream merges stay
//! deterministic regardless of completion order. Per-URL failures are
//! isolated; the phase only degrades when no URL produced an artifact.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::SimilarityCache;
use crate::error::ErrorKind;
use crate::phases::search::{RankedLink, Tier};
use crate::scoring::media::MediaScorer;
use crate::traits::crawler::{CrawlerEngine, FetchOptions};
use crate::types::artifact::{CrawlArtifact, ScoredArtifact};
use crate::types::request::CrawlStrategy;
use crate::types::result::CrawlSummary;
use crate::types::schema::InstitutionType;

/// Per-page slice of `total_text`.
const TEXT_PER_PAGE: usize = 2_000;

/// Depth and page budget for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBudget {
    pub max_depth: usize,
    pub max_pages: usize,
}

/// Resource allocation per tier under a strategy.
///
/// `PriorityBased` is the baseline table; the other strategies reshape it.
pub fn tier_budget(strategy: CrawlStrategy, tier: Tier) -> TierBudget {
    let (max_depth, max_pages) = match strategy {
        CrawlStrategy::PriorityBased => match tier {
            Tier::High => (3, 25),
            Tier::Medium => (2, 15),
            Tier::Low => (1, 8),
        },
        CrawlStrategy::Equal => (2, 15),
        CrawlStrategy::HighLinks => match tier {
            Tier::High => (1, 35),
            Tier::Medium => (1, 20),
            Tier::Low => (1, 10),
        },
        CrawlStrategy::HighDepth => match tier {
            Tier::High => (4, 15),
            Tier::Medium => (3, 10),
            Tier::Low => (2, 5),
        },
    };
    TierBudget {
        max_depth,
        max_pages,
    }
}

/// Canonical form of a URL for dedup and cache keys: scheme + host + path,
/// query and fragment dropped, trailing slash trimmed.
pub fn canonical_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => url.trim_end_matches('/').to_string(),
    }
}

/// The crawl phase's artifact bundle.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    pub artifacts: Vec<ScoredArtifact>,
    /// Concatenated per-page markdown, bounded per page.
    pub total_text: String,
    pub summary: CrawlSummary,
    pub error_kind: Option<ErrorKind>,
}

impl CrawlOutcome {
    pub fn degraded(&self) -> bool {
        self.error_kind.is_some()
    }
}

/// Crawl phase configuration and execution.
#[derive(Debug, Clone)]
pub struct CrawlPhase {
    /// Bound on concurrent fetches; the primary backpressure mechanism.
    pub concurrency: usize,
    /// Per-URL fetch deadline handed to the engine.
    pub per_url_timeout: Duration,
}

impl Default for CrawlPhase {
    fn default() -> Self {
        Self {
            concurrency: 8,
            per_url_timeout: Duration::from_secs(20),
        }
    }
}

struct PlannedFetch {
    rank: usize,
    url: String,
    options: FetchOptions,
}

impl CrawlPhase {
    /// Run the phase over prioritized links.
    ///
    /// `force_refresh` bypasses crawl-cache reads; writes still populate it.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        crawler: &dyn CrawlerEngine,
        cache: &SimilarityCache<CrawlArtifact>,
        links: &[RankedLink],
        institution_name: &str,
        institution_type: InstitutionType,
        strategy: CrawlStrategy,
        global_max_pages: Option<usize>,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> CrawlOutcome {
        let plan = self.plan(links, strategy, global_max_pages);
        if plan.is_empty() {
            return CrawlOutcome {
                error_kind: Some(ErrorKind::CrawlEmpty),
                ..Default::default()
            };
        }

        let urls_requested = plan.len();
        info!(urls = urls_requested, strategy = strategy.as_str(), "Crawl phase start");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let cache_hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let fetches = plan.into_iter().map(|planned| {
            let semaphore = semaphore.clone();
            let cache_hits = cache_hits.clone();
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }

                if !force_refresh {
                    if let Some(hit) = cache.get_raw(&planned.url) {
                        debug!(url = %planned.url, "Crawl cache hit");
                        cache_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        return Some((planned.rank, hit.value));
                    }
                }

                let fetched = tokio::select! {
                    result = crawler.fetch(&planned.url, &planned.options) => result,
                    _ = cancel.cancelled() => return None,
                };

                match fetched {
                    Ok(artifact) => {
                        if let Err(e) = cache.put_raw(&planned.url, &artifact).await {
                            warn!(url = %planned.url, error = %e, "Crawl cache write failed");
                        }
                        Some((planned.rank, artifact))
                    }
                    Err(e) => {
                        warn!(url = %planned.url, error = %e, "Fetch failed");
                        None
                    }
                }
            }
        });

        let mut fetched: Vec<(usize, CrawlArtifact)> = futures::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect();

        if cancel.is_cancelled() {
            // Partial artifacts are discarded on cancellation.
            return CrawlOutcome {
                error_kind: Some(ErrorKind::CrawlEmpty),
                ..Default::default()
            };
        }

        // Priority order, not completion order.
        fetched.sort_by_key(|(rank, _)| *rank);

        let scorer = MediaScorer::new(institution_name, institution_type);
        let mut artifacts = Vec::with_capacity(fetched.len());
        let mut total_text = String::new();
        let mut total_bytes = 0usize;
        let mut successful = 0usize;
        let mut richness_sum = 0u64;

        for (rank, artifact) in fetched {
            if artifact.succeeded() {
                successful += 1;
            }
            total_bytes += artifact.size_bytes.max(artifact.raw_html.len());
            richness_sum += artifact.content_richness() as u64;

            let text = artifact.markdown.primary_content.trim();
            if !text.is_empty() {
                if !total_text.is_empty() {
                    total_text.push_str("\n\n");
                }
                total_text.push_str(truncate_chars(text, TEXT_PER_PAGE));
            }

            let scored_images = artifact.images.iter().map(|i| scorer.score(i)).collect();
            artifacts.push(ScoredArtifact {
                artifact,
                scored_images,
                priority_rank: rank,
            });
        }

        let summary = CrawlSummary {
            urls_requested,
            successful_pages: successful,
            total_bytes,
            cache_hit_rate: cache_hits.load(std::sync::atomic::Ordering::Relaxed) as f64
                / urls_requested as f64,
            avg_content_richness: if artifacts.is_empty() {
                0.0
            } else {
                richness_sum as f64 / artifacts.len() as f64
            },
        };

        let error_kind = (successful == 0).then_some(ErrorKind::CrawlEmpty);
        info!(
            successful,
            urls_requested,
            degraded = error_kind.is_some(),
            "Crawl phase complete"
        );

        CrawlOutcome {
            artifacts,
            total_text,
            summary,
            error_kind,
        }
    }

    /// Deduplicate by canonical URL and allocate per-tier budgets.
    fn plan(
        &self,
        links: &[RankedLink],
        strategy: CrawlStrategy,
        global_max_pages: Option<usize>,
    ) -> Vec<PlannedFetch> {
        let mut seen = std::collections::HashSet::new();
        let mut taken_per_tier: std::collections::HashMap<Tier, usize> =
            std::collections::HashMap::new();
        let mut plan = Vec::new();

        for link in links {
            if let Some(cap) = global_max_pages {
                if plan.len() >= cap {
                    break;
                }
            }

            let canonical = canonical_url(&link.url);
            if !seen.insert(canonical.clone()) {
                continue;
            }

            let budget = tier_budget(strategy, link.tier);
            let taken = taken_per_tier.entry(link.tier).or_default();
            if *taken >= budget.max_pages {
                continue;
            }
            *taken += 1;

            plan.push(PlannedFetch {
                rank: plan.len(),
                url: canonical,
                options: FetchOptions::default()
                    .with_depth(budget.max_depth)
                    .with_max_pages(budget.max_pages)
                    .with_timeout(self.per_url_timeout),
            });
        }

        plan
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
