//! Search phase: query construction, provider call, link prioritization.
//!
//! Converts `(name, type, options)` into a ranked, tiered list of candidate
//! URLs plus a short description text assembled from result snippets. A
//! provider failure degrades the phase (empty links, tagged error) rather
//! than failing the pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, SearchError};
use crate::traits::searcher::{SearchHit, SearchProvider};
use crate::types::request::ProfileRequest;
use crate::types::schema::InstitutionType;

/// Priority bucket controlling crawl depth and page budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    fn for_score(score: i32) -> Self {
        if score >= 100 {
            Self::High
        } else if score >= 50 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A search hit with its priority score and tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedLink {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub domain: String,
    pub score: i32,
    pub tier: Tier,
}

/// The search phase's artifact. Cached by normalized key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: String,
    pub links: Vec<RankedLink>,
    /// Short description assembled from result snippets.
    pub description: String,
    /// Set when the provider was unreachable and the phase degraded.
    pub error_kind: Option<ErrorKind>,
}

impl SearchOutcome {
    pub fn degraded(&self) -> bool {
        self.error_kind.is_some()
    }
}

/// Keyword table for inferring a type from the institution name.
/// First match wins; fallback is `General`.
const TYPE_KEYWORDS: &[(InstitutionType, &[&str])] = &[
    (
        InstitutionType::University,
        &["university", "college", "polytechnic", "institute of technology", "school"],
    ),
    (
        InstitutionType::Hospital,
        &["hospital", "clinic", "medical", "health system", "healthcare"],
    ),
    (
        InstitutionType::Bank,
        &["bank", "banking", "financial", "credit union", "savings"],
    ),
];

/// Infer the institution type from its name.
pub fn infer_type(name: &str) -> InstitutionType {
    let name = name.to_lowercase();
    for (institution_type, keywords) in TYPE_KEYWORDS {
        if keywords.iter().any(|k| name.contains(k)) {
            return *institution_type;
        }
    }
    InstitutionType::General
}

fn enrichment_terms(institution_type: InstitutionType) -> &'static str {
    match institution_type {
        InstitutionType::University => "university college education academic research",
        InstitutionType::Hospital => "hospital medical healthcare clinic health",
        InstitutionType::Bank => "bank banking financial finance services",
        InstitutionType::General => "organization official information",
    }
}

fn site_filter(institution_type: InstitutionType) -> Option<&'static str> {
    match institution_type {
        InstitutionType::University => Some("site:edu OR site:ac.uk"),
        InstitutionType::Hospital => Some("site:org OR site:gov"),
        _ => None,
    }
}

fn preferred_tlds(institution_type: InstitutionType) -> &'static [&'static str] {
    match institution_type {
        InstitutionType::University => &[".edu", ".ac."],
        InstitutionType::Hospital => &[".org", ".gov"],
        InstitutionType::Bank => &[".com", ".bank"],
        InstitutionType::General => &[".org", ".gov", ".edu"],
    }
}

fn type_keywords(institution_type: InstitutionType) -> &'static [&'static str] {
    match institution_type {
        InstitutionType::University => &["university", "college", "academic", "campus"],
        InstitutionType::Hospital => &["hospital", "medical", "health", "clinic"],
        InstitutionType::Bank => &["bank", "banking", "financial", "finance"],
        InstitutionType::General => &["official", "organization"],
    }
}

const SOCIAL_OR_WIKI: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "instagram.com",
    "youtube.com",
    "wikipedia.org",
];

/// The full query built for a request, with fallback variations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltQuery {
    pub primary: String,
    /// Alternative formulations providers may try when the primary query
    /// returns nothing, narrowest first.
    pub variations: Vec<String>,
}

/// Build the provider query for a request.
pub fn build_query(request: &ProfileRequest, institution_type: InstitutionType) -> BuiltQuery {
    let name = request.institution_name.trim();
    let mut parts: Vec<String> = vec![name.to_string()];
    parts.push(enrichment_terms(institution_type).to_string());

    if let Some(location) = &request.location {
        parts.push(location.clone());
    }
    if let Some(keywords) = &request.additional_keywords {
        parts.push(keywords.clone());
    }
    if let Some(domain) = &request.domain_hint {
        let domain = domain.strip_prefix("site:").unwrap_or(domain);
        parts.push(format!("site:{domain}"));
    } else if let Some(filter) = site_filter(institution_type) {
        parts.push(filter.to_string());
    }
    if let Some(exclude) = &request.exclude_terms {
        for term in exclude.split_whitespace() {
            parts.push(format!("-{term}"));
        }
    }

    let mut variations = vec![format!("\"{name}\" {}", institution_type.as_str())];
    if let Some(location) = &request.location {
        variations.push(format!("\"{name}\" {location}"));
    }
    variations.push(format!("\"{name}\""));
    variations.push(name.to_string());

    BuiltQuery {
        primary: parts.join(" "),
        variations,
    }
}

/// Score one hit for crawl priority.
pub fn score_link(
    hit: &SearchHit,
    institution_type: InstitutionType,
    domain_hint: Option<&str>,
) -> i32 {
    let url = hit.url.to_lowercase();
    let title = hit.title.to_lowercase();
    let mut score = 0;

    if preferred_tlds(institution_type)
        .iter()
        .any(|tld| hit.domain.to_lowercase().contains(tld))
    {
        score += 100;
    }

    let keyword_hits = type_keywords(institution_type)
        .iter()
        .filter(|k| url.contains(*k) || title.contains(*k))
        .take(3)
        .count() as i32;
    score += 15 * keyword_hits;

    let path_is_official = url::Url::parse(&hit.url)
        .map(|u| {
            let path = u.path().trim_end_matches('/');
            path.is_empty() || matches!(path, "/about" | "/home" | "/index" | "/about-us")
        })
        .unwrap_or(false);
    if path_is_official || title.contains("official") || title.contains("homepage") {
        score += 50;
    }

    if SOCIAL_OR_WIKI.iter().any(|h| url.contains(h)) {
        score -= 20;
    }

    if let Some(hint) = domain_hint {
        let hint = hint.strip_prefix("site:").unwrap_or(hint).to_lowercase();
        if hit.domain.to_lowercase().contains(&hint) {
            score += 20;
        }
    }

    score
}

/// Rank hits into tier-then-score order and keep the top k.
pub fn prioritize(
    hits: Vec<SearchHit>,
    institution_type: InstitutionType,
    domain_hint: Option<&str>,
    top_k: usize,
) -> Vec<RankedLink> {
    let mut ranked: Vec<RankedLink> = hits
        .into_iter()
        .map(|hit| {
            let score = score_link(&hit, institution_type, domain_hint);
            RankedLink {
                url: hit.url,
                title: hit.title,
                snippet: hit.snippet,
                domain: hit.domain,
                score,
                tier: Tier::for_score(score),
            }
        })
        .collect();

    ranked.sort_by(|a, b| a.tier.cmp(&b.tier).then(b.score.cmp(&a.score)));
    ranked.truncate(top_k);
    ranked
}

/// Search phase configuration and execution.
#[derive(Debug, Clone)]
pub struct SearchPhase {
    /// How many links to keep after prioritization.
    pub top_k: usize,
    /// How many raw results to request from the provider.
    pub num_results: usize,
    /// Retry budget for rate-limited calls.
    pub max_attempts: u32,
    /// Initial backoff, doubled per retry.
    pub backoff: Duration,
}

impl Default for SearchPhase {
    fn default() -> Self {
        Self {
            top_k: 15,
            num_results: 20,
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl SearchPhase {
    /// Run the phase. Provider failure degrades the outcome instead of
    /// erroring; cancellation surfaces as `None` from the caller's select.
    pub async fn execute(
        &self,
        searcher: &dyn SearchProvider,
        request: &ProfileRequest,
        institution_type: InstitutionType,
        cancel: &CancellationToken,
    ) -> SearchOutcome {
        let built = build_query(request, institution_type);
        debug!(query = %built.primary, "Search phase query");

        let mut backoff = self.backoff;

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                break;
            }
            match searcher.search(&built.primary, self.num_results).await {
                Ok(hits) => {
                    let hits = if hits.is_empty() {
                        self.try_variations(searcher, &built.variations, cancel).await
                    } else {
                        hits
                    };
                    let description = hits
                        .iter()
                        .filter(|h| !h.snippet.is_empty())
                        .take(5)
                        .map(|h| h.snippet.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    let links = prioritize(
                        hits,
                        institution_type,
                        request.domain_hint.as_deref(),
                        self.top_k,
                    );
                    info!(links = links.len(), "Search phase complete");
                    return SearchOutcome {
                        query: built.primary,
                        links,
                        description,
                        error_kind: None,
                    };
                }
                Err(SearchError::RateLimited) if attempt < self.max_attempts => {
                    warn!(attempt, "Search provider rate limited, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => break,
                    }
                    backoff *= 2;
                }
                Err(e) => {
                    warn!(error = %e, "Search provider unavailable");
                    break;
                }
            }
        }

        SearchOutcome {
            query: built.primary,
            links: Vec::new(),
            description: String::new(),
            error_kind: Some(ErrorKind::SearchProviderUnavailable),
        }
    }

    /// Fall back through the narrower query variations when the primary
    /// query came back empty. First non-empty result wins.
    async fn try_variations(
        &self,
        searcher: &dyn SearchProvider,
        variations: &[String],
        cancel: &CancellationToken,
    ) -> Vec<SearchHit> {
        for variation in variations {
            if cancel.is_cancelled() {
                break;
            }
            debug!(query = %variation, "Trying fallback query");
            match searcher.search(variation, self.num_results).await {
                Ok(hits) if !hits.is_empty() => return hits,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "Fallback query failed");
                    break;
                }
            }
        }
        Vec::new()
    }
}
