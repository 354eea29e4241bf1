//! Profile requests and the recognized refinement options.

use serde::{Deserialize, Serialize};

use crate::types::schema::InstitutionType;

/// Crawl-tier resource strategy.
///
/// Modulates how depth and page budgets are split across priority tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStrategy {
    /// Same budget for every tier.
    Equal,
    /// Budget follows tier priority. The default.
    PriorityBased,
    /// More pages per tier, shallow depth.
    HighLinks,
    /// Fewer pages per tier, deeper follow.
    HighDepth,
}

impl Default for CrawlStrategy {
    fn default() -> Self {
        Self::PriorityBased
    }
}

impl CrawlStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::PriorityBased => "priority_based",
            Self::HighLinks => "high_links",
            Self::HighDepth => "high_depth",
        }
    }
}

/// A request to profile one institution.
///
/// Every option except the name is optional; see the builder methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRequest {
    /// Subject of the profile.
    pub institution_name: String,

    /// Overrides type inference when set.
    pub institution_type: Option<InstitutionType>,

    /// Free-text location constraint appended to the search query.
    pub location: Option<String>,

    /// Extra keywords appended to the search query.
    pub additional_keywords: Option<String>,

    /// Known domain; becomes a `site:` operator and boosts matching links.
    pub domain_hint: Option<String>,

    /// Space-separated terms, each negated in the query.
    pub exclude_terms: Option<String>,

    /// Bypass cache reads for this request. Writes still populate caches.
    #[serde(default)]
    pub force_refresh: bool,

    /// Stop after the crawl phase and return the partial result.
    #[serde(default)]
    pub skip_extraction: bool,

    #[serde(default)]
    pub strategy: CrawlStrategy,

    /// Global cap on total pages crawled across all tiers.
    pub max_pages: Option<usize>,

    /// Caller-supplied text used when search and crawl produce nothing.
    pub direct_text: Option<String>,
}

impl ProfileRequest {
    pub fn new(institution_name: impl Into<String>) -> Self {
        Self {
            institution_name: institution_name.into(),
            institution_type: None,
            location: None,
            additional_keywords: None,
            domain_hint: None,
            exclude_terms: None,
            force_refresh: false,
            skip_extraction: false,
            strategy: CrawlStrategy::default(),
            max_pages: None,
            direct_text: None,
        }
    }

    pub fn with_type(mut self, institution_type: InstitutionType) -> Self {
        self.institution_type = Some(institution_type);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.additional_keywords = Some(keywords.into());
        self
    }

    pub fn with_domain_hint(mut self, domain: impl Into<String>) -> Self {
        self.domain_hint = Some(domain.into());
        self
    }

    pub fn with_exclude_terms(mut self, terms: impl Into<String>) -> Self {
        self.exclude_terms = Some(terms.into());
        self
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    pub fn skip_extraction(mut self) -> Self {
        self.skip_extraction = true;
        self
    }

    pub fn with_strategy(mut self, strategy: CrawlStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_direct_text(mut self, text: impl Into<String>) -> Self {
        self.direct_text = Some(text.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_options() {
        let request = ProfileRequest::new("Example University")
            .with_type(InstitutionType::University)
            .with_location("Boston")
            .with_domain_hint("example.edu")
            .with_exclude_terms("reviews rankings")
            .with_strategy(CrawlStrategy::HighLinks)
            .with_max_pages(20)
            .force_refresh();

        assert_eq!(request.institution_type, Some(InstitutionType::University));
        assert_eq!(request.domain_hint.as_deref(), Some("example.edu"));
        assert!(request.force_refresh);
        assert!(!request.skip_extraction);
        assert_eq!(request.strategy, CrawlStrategy::HighLinks);
    }
}
