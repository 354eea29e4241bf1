//! Per-image heuristics: logo confidence and relevance banding.
//!
//! Logo confidence is an additive accumulator clamped to [0, 1]. Relevance
//! is a band 0..=6 decided by a fixed cascade; when an image satisfies more
//! than one band the lower, more conservative band wins, with two hard
//! overrides: advertisement/tracker sources are always 0, and a confirmed
//! logo (confidence >= 0.8) is always 6.

use crate::types::artifact::{DomLocation, ImageRecord, ScoredImage};
use crate::types::schema::InstitutionType;

/// Confidence at or above which an image is a logo candidate.
pub const LOGO_CANDIDATE_THRESHOLD: f32 = 0.5;

/// Confidence at or above which a logo is confirmed (relevance 6).
pub const LOGO_CONFIRMED_THRESHOLD: f32 = 0.8;

const AD_HOSTS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication",
    "adservice",
    "/ads/",
    "sharethis",
    "addthis",
    "facebook.com/tr",
    "pixel.",
    "analytics",
];

const UI_TERMS: &[&str] = &["icon", "arrow", "menu", "button", "chevron", "hamburger", "caret"];

const DECORATIVE_TERMS: &[&str] = &["background", "banner", "divider", "spacer", "pattern", "decoration"];

const FACILITY_TERMS: &[&str] = &[
    "campus",
    "building",
    "facility",
    "facilities",
    "library",
    "aerial",
    "entrance",
    "branding",
    "headquarters",
];

fn activity_terms(institution_type: InstitutionType) -> &'static [&'static str] {
    match institution_type {
        InstitutionType::University => &[
            "students", "graduation", "lecture", "research", "faculty", "classroom", "program",
            "event",
        ],
        InstitutionType::Hospital => &[
            "doctor", "nurse", "patient", "surgery", "staff", "care", "treatment", "ward",
        ],
        InstitutionType::Bank => &[
            "customer", "service", "atm", "branch", "advisor", "meeting", "staff",
        ],
        InstitutionType::General => &["team", "staff", "office", "event", "service"],
    }
}

/// Scores images for one institution.
pub struct MediaScorer {
    name_tokens: Vec<String>,
    institution_type: InstitutionType,
}

impl MediaScorer {
    pub fn new(institution_name: &str, institution_type: InstitutionType) -> Self {
        let name_tokens = institution_name
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(str::to_string)
            .collect();
        Self {
            name_tokens,
            institution_type,
        }
    }

    /// Score one image on both axes.
    pub fn score(&self, image: &ImageRecord) -> ScoredImage {
        let logo_confidence = self.logo_confidence(image);
        ScoredImage {
            relevance: self.relevance(image, logo_confidence),
            logo_confidence,
            image: image.clone(),
        }
    }

    /// Additive logo confidence, clamped to [0, 1].
    pub fn logo_confidence(&self, image: &ImageRecord) -> f32 {
        let src = image.src.to_lowercase();
        let alt = image.alt.to_lowercase();
        let mut confidence = 0.0f32;

        if src.contains("logo") || src.contains("brand") {
            confidence += 0.4;
        }
        if alt.contains("logo") || self.name_tokens.iter().any(|t| alt.contains(t)) {
            confidence += 0.3;
        }
        if let (Some(w), Some(h)) = (image.width, image.height) {
            if (50..=400).contains(&w) && (50..=200).contains(&h) {
                confidence += 0.2;
            }
        }
        if matches!(image.dom_location, DomLocation::Header | DomLocation::NearTitle) {
            confidence += 0.2;
        }

        confidence.min(1.0)
    }

    /// Relevance band 0..=6. See the module docs for the cascade order.
    pub fn relevance(&self, image: &ImageRecord, logo_confidence: f32) -> u8 {
        let src = image.src.to_lowercase();
        let alt = image.alt.to_lowercase();
        let context = image.context_snippet.to_lowercase();
        let width = image.width.unwrap_or(0);
        let height = image.height.unwrap_or(0);

        if AD_HOSTS.iter().any(|h| src.contains(h)) {
            return 0;
        }
        if logo_confidence >= LOGO_CONFIRMED_THRESHOLD {
            return 6;
        }

        let has = |terms: &[&str]| {
            terms
                .iter()
                .any(|t| alt.contains(t) || context.contains(t))
        };

        // UI affordances and tiny images are navigation chrome.
        let tiny = width > 0 && height > 0 && width <= 64 && height <= 64;
        if tiny || UI_TERMS.iter().any(|t| src.contains(t) || alt.contains(t)) {
            return 1;
        }

        // Decorative before the content bands: lower band wins overlaps.
        let small = width < 200 || height < 200;
        if small || has(DECORATIVE_TERMS) {
            return 2;
        }

        if has(activity_terms(self.institution_type)) && width >= 200 && height >= 200 {
            return 4;
        }

        if has(FACILITY_TERMS) && width >= 300 && height >= 300 {
            return 5;
        }

        if image.dom_location == DomLocation::MainContent {
            return 3;
        }

        2
    }
}
