//! Type-aware profile quality scoring.
//!
//! The base score is a weighted field-presence sum over the five schema
//! classes, scaled to 0-75. Up to 25 bonus points reward visual content,
//! richness, data-source quality, and processing success. The scorer is a
//! pure function of its inputs.

use serde::{Deserialize, Serialize};

use crate::types::profile::InstitutionProfile;
use crate::types::result::{CrawlSummary, PhaseStatuses};
use crate::types::schema::{self, FieldClass, InstitutionType};

/// Rating band for a final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Exceptional,
    Excellent,
    VeryGood,
    Good,
    Fair,
    Poor,
    VeryPoor,
    Minimal,
}

impl Rating {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::Exceptional
        } else if score >= 80.0 {
            Self::Excellent
        } else if score >= 70.0 {
            Self::VeryGood
        } else if score >= 60.0 {
            Self::Good
        } else if score >= 50.0 {
            Self::Fair
        } else if score >= 35.0 {
            Self::Poor
        } else if score >= 20.0 {
            Self::VeryPoor
        } else {
            Self::Minimal
        }
    }
}

/// Per-class completion detail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassBreakdown {
    pub populated: usize,
    pub eligible: usize,
    /// Contribution to the base score, already weighted.
    pub contribution: f64,
}

/// The scorer's non-field inputs: media counts, crawl facts, phase states.
#[derive(Debug, Clone, Default)]
pub struct QualityInputs {
    pub logo_count: usize,
    pub image_count: usize,
    pub facility_image_count: usize,
    pub campus_image_count: usize,
    pub social_link_count: usize,
    pub document_count: usize,
    pub crawl_summary: CrawlSummary,
    pub phases: PhaseStatuses,
}

/// The final quality verdict attached to a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: f64,
    pub rating: Option<Rating>,
    pub base_score: f64,
    pub bonus_points: f64,
    pub populated_fields: usize,
    pub breakdown: Vec<(FieldClass, ClassBreakdown)>,
}

/// Compute the 0-100 quality score for a record.
pub fn score(
    profile: &InstitutionProfile,
    institution_type: InstitutionType,
    inputs: &QualityInputs,
) -> QualityReport {
    let mut base = 0.0f64;
    let mut populated_total = 0usize;
    let mut breakdown = Vec::with_capacity(FieldClass::ALL.len());

    for class in FieldClass::ALL {
        let eligible = schema::FIELDS
            .iter()
            .filter(|f| f.class == class && schema::field_eligible(f, institution_type))
            .count();
        let populated = profile.populated_in_class(class, institution_type);
        populated_total += populated;

        let contribution = if eligible == 0 {
            0.0
        } else {
            class.weight() * populated as f64 / eligible as f64
        };
        base += contribution;
        breakdown.push((
            class,
            ClassBreakdown {
                populated,
                eligible,
                contribution,
            },
        ));
    }

    let base_score = base * 75.0;
    let bonus = bonus_points(inputs);
    let total = (base_score + bonus).clamp(0.0, 100.0);

    QualityReport {
        score: total,
        rating: Some(Rating::from_score(total)),
        base_score,
        bonus_points: bonus,
        populated_fields: populated_total,
        breakdown,
    }
}

fn bonus_points(inputs: &QualityInputs) -> f64 {
    let mut bonus = 0.0f64;

    // Visual content, up to 8.
    if inputs.logo_count > 0 {
        bonus += 3.0;
    }
    if inputs.image_count > 0 {
        bonus += 2.0;
    }
    if inputs.facility_image_count > 0 {
        bonus += 2.0;
    }
    if inputs.campus_image_count > 0 {
        bonus += 1.0;
    }

    // Richness, up to 7.
    if inputs.social_link_count > 0 {
        bonus += 2.0;
    }
    if inputs.document_count > 0 {
        bonus += 2.0;
    }
    if inputs.crawl_summary.successful_pages >= 3 {
        bonus += 3.0;
    }

    // Data-source quality, up to 10. Only meaningful when a crawl ran.
    let crawl = &inputs.crawl_summary;
    if crawl.urls_requested > 0 {
        if crawl.success_rate() >= 0.8 {
            bonus += 3.0;
        }
        if crawl.total_bytes > 1024 * 1024 {
            bonus += 2.0;
        }
        if crawl.cache_hit_rate < 0.5 {
            bonus += 2.0;
        }
        if inputs.phases.extract.success && crawl.success_rate() > 0.0 {
            bonus += 3.0;
        }
    }

    // Processing success, up to 5.
    match inputs.phases.successful_count() {
        n if n >= 3 => bonus += 3.0,
        2 => bonus += 2.0,
        _ => {}
    }

    bonus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::result::PhaseStatus;

    fn bank_record() -> InstitutionProfile {
        let mut profile = InstitutionProfile::new();
        for (field, value) in [
            ("name", "Example Bank"),
            ("official_name", "Example Bank plc"),
            ("website", "https://example-bank.com"),
            ("description", "A bank."),
            ("location_city", "London"),
            ("location_country", "United Kingdom"),
            ("type", "bank"),
            ("founded", "1890"),
            ("address", "1 Example Street"),
            ("phone", "+44 20 0000 0000"),
            ("email", "info@example-bank.com"),
            ("ceo", "J. Doe"),
        ] {
            assert!(profile.set(field, value), "{field}");
        }
        profile
    }

    #[test]
    fn bank_scenario_scores_as_specified() {
        let inputs = QualityInputs {
            logo_count: 1,
            image_count: 2,
            ..Default::default()
        };
        let report = score(&bank_record(), InstitutionType::Bank, &inputs);

        // 8/8 critical, 4/10 important, nothing else.
        assert!((report.base_score - 37.5).abs() < 1e-9, "{}", report.base_score);
        assert!((report.bonus_points - 5.0).abs() < 1e-9);
        assert!((report.score - 42.5).abs() < 1e-9);
        assert_eq!(report.rating, Some(Rating::Poor));
    }

    #[test]
    fn adding_a_field_never_decreases_the_score() {
        let inputs = QualityInputs::default();
        let mut profile = bank_record();
        let before = score(&profile, InstitutionType::Bank, &inputs).score;

        for field in ["state", "leadership", "regulatory_body", "rankings"] {
            profile.set(field, "present");
            let after = score(&profile, InstitutionType::Bank, &inputs).score;
            assert!(after >= before, "{field} decreased the score");
        }
    }

    #[test]
    fn specialized_fields_of_other_types_are_ignored() {
        let inputs = QualityInputs::default();
        let mut profile = bank_record();
        let before = score(&profile, InstitutionType::Bank, &inputs).score;

        profile.set("student_population", "12000");
        let after = score(&profile, InstitutionType::Bank, &inputs).score;
        assert!((after - before).abs() < 1e-9);
    }

    #[test]
    fn general_records_exclude_specialized_entirely() {
        let inputs = QualityInputs::default();
        let report = score(&bank_record(), InstitutionType::General, &inputs);
        let specialized = report
            .breakdown
            .iter()
            .find(|(c, _)| *c == FieldClass::Specialized)
            .map(|(_, b)| b.clone())
            .unwrap();
        assert_eq!(specialized.eligible, 0);
        assert_eq!(specialized.contribution, 0.0);
    }

    #[test]
    fn processing_bonus_follows_phase_successes() {
        let mut inputs = QualityInputs::default();
        assert_eq!(bonus_points(&inputs), 0.0);

        inputs.phases.search = PhaseStatus::ok(10);
        inputs.phases.crawl = PhaseStatus::ok(10);
        assert_eq!(bonus_points(&inputs), 2.0);

        inputs.phases.extract = PhaseStatus::ok(10);
        assert_eq!(bonus_points(&inputs), 3.0);
    }

    #[test]
    fn score_is_clamped_to_100() {
        let mut profile = InstitutionProfile::new();
        for field in schema::FIELDS {
            profile.set(field.name, "present");
        }
        let inputs = QualityInputs {
            logo_count: 1,
            image_count: 5,
            facility_image_count: 2,
            campus_image_count: 1,
            social_link_count: 3,
            document_count: 2,
            crawl_summary: CrawlSummary {
                urls_requested: 10,
                successful_pages: 10,
                total_bytes: 5 * 1024 * 1024,
                cache_hit_rate: 0.0,
                avg_content_richness: 85.0,
            },
            phases: PhaseStatuses {
                search: PhaseStatus::ok(1),
                crawl: PhaseStatus::ok(1),
                extract: PhaseStatus::ok(1),
            },
        };
        let report = score(&profile, InstitutionType::University, &inputs);
        assert!(report.score <= 100.0);
        assert_eq!(report.rating, Some(Rating::Exceptional));
    }
}
