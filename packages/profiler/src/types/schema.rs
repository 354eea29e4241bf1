//! The frozen field schema shared by extraction and quality scoring.
//!
//! Every field a profile may carry is declared here once, with its priority
//! class and (for specialized fields) the institution types it applies to.
//! The extractor drops response keys that are not in this table; the quality
//! scorer derives its per-class denominators from it. Adding a field means
//! adding a row here and nothing else.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Supported institution types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstitutionType {
    University,
    Hospital,
    Bank,
    General,
}

impl InstitutionType {
    /// Parse a loose user-supplied tag. Returns `None` for unrecognized input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "university" | "college" | "school" | "edu" => Some(Self::University),
            "hospital" | "clinic" | "medical" | "med" => Some(Self::Hospital),
            "bank" | "financial" | "fin" => Some(Self::Bank),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::University => "university",
            Self::Hospital => "hospital",
            Self::Bank => "bank",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for InstitutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority class of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldClass {
    Critical,
    Important,
    Valuable,
    Specialized,
    Enhanced,
}

impl FieldClass {
    /// Weight of this class in the base quality score.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Critical => 0.40,
            Self::Important => 0.25,
            Self::Valuable => 0.20,
            Self::Specialized => 0.10,
            Self::Enhanced => 0.05,
        }
    }

    pub const ALL: [FieldClass; 5] = [
        Self::Critical,
        Self::Important,
        Self::Valuable,
        Self::Specialized,
        Self::Enhanced,
    ];
}

/// One row of the frozen schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Canonical field name as it appears in extraction output.
    pub name: &'static str,
    pub class: FieldClass,
    /// Institution types this field applies to. Empty = universal.
    /// Only `Specialized` fields carry type tags.
    pub types: &'static [InstitutionType],
}

use FieldClass::*;
use InstitutionType::*;

/// The complete field schema, frozen at build time.
pub const FIELDS: &[FieldSpec] = &[
    // Critical: essential identification
    FieldSpec { name: "name", class: Critical, types: &[] },
    FieldSpec { name: "official_name", class: Critical, types: &[] },
    FieldSpec { name: "type", class: Critical, types: &[] },
    FieldSpec { name: "founded", class: Critical, types: &[] },
    FieldSpec { name: "website", class: Critical, types: &[] },
    FieldSpec { name: "description", class: Critical, types: &[] },
    FieldSpec { name: "location_city", class: Critical, types: &[] },
    FieldSpec { name: "location_country", class: Critical, types: &[] },
    // Important: key operational details
    FieldSpec { name: "address", class: Important, types: &[] },
    FieldSpec { name: "state", class: Important, types: &[] },
    FieldSpec { name: "postal_code", class: Important, types: &[] },
    FieldSpec { name: "phone", class: Important, types: &[] },
    FieldSpec { name: "email", class: Important, types: &[] },
    FieldSpec { name: "ceo", class: Important, types: &[] },
    FieldSpec { name: "industry_sector", class: Important, types: &[] },
    FieldSpec { name: "size", class: Important, types: &[] },
    FieldSpec { name: "number_of_employees", class: Important, types: &[] },
    FieldSpec { name: "headquarters_location", class: Important, types: &[] },
    // Valuable: detailed organizational info
    FieldSpec { name: "leadership", class: Valuable, types: &[] },
    FieldSpec { name: "president", class: Valuable, types: &[] },
    FieldSpec { name: "chairman", class: Valuable, types: &[] },
    FieldSpec { name: "key_people", class: Valuable, types: &[] },
    FieldSpec { name: "annual_revenue", class: Valuable, types: &[] },
    FieldSpec { name: "legal_status", class: Valuable, types: &[] },
    FieldSpec { name: "fields_of_focus", class: Valuable, types: &[] },
    FieldSpec { name: "services_offered", class: Valuable, types: &[] },
    FieldSpec { name: "products", class: Valuable, types: &[] },
    FieldSpec { name: "operating_countries", class: Valuable, types: &[] },
    FieldSpec { name: "parent_organization", class: Valuable, types: &[] },
    // Specialized: only counted for the tagged institution types
    FieldSpec { name: "student_population", class: Specialized, types: &[University] },
    FieldSpec { name: "faculty_count", class: Specialized, types: &[University] },
    FieldSpec { name: "programs_offered", class: Specialized, types: &[University] },
    FieldSpec { name: "research_areas", class: Specialized, types: &[University] },
    FieldSpec { name: "campus_size", class: Specialized, types: &[University] },
    FieldSpec { name: "endowment", class: Specialized, types: &[University] },
    FieldSpec { name: "tuition_fees", class: Specialized, types: &[University] },
    FieldSpec { name: "notable_alumni", class: Specialized, types: &[University] },
    FieldSpec { name: "bed_count", class: Specialized, types: &[Hospital] },
    FieldSpec { name: "patient_capacity", class: Specialized, types: &[Hospital] },
    FieldSpec { name: "medical_specialties", class: Specialized, types: &[Hospital] },
    FieldSpec { name: "emergency_services", class: Specialized, types: &[Hospital] },
    FieldSpec { name: "departments", class: Specialized, types: &[University, Hospital] },
    FieldSpec { name: "accreditation_bodies", class: Specialized, types: &[University, Hospital] },
    FieldSpec { name: "regulatory_body", class: Specialized, types: &[Bank] },
    FieldSpec { name: "branches_count", class: Specialized, types: &[Bank] },
    FieldSpec { name: "total_assets", class: Specialized, types: &[Bank] },
    FieldSpec { name: "subsidiaries", class: Specialized, types: &[Bank] },
    FieldSpec { name: "stock_symbol", class: Specialized, types: &[Bank] },
    FieldSpec { name: "market_cap", class: Specialized, types: &[Bank] },
    // Enhanced: rich content and relationships
    FieldSpec { name: "notable_achievements", class: Enhanced, types: &[] },
    FieldSpec { name: "rankings", class: Enhanced, types: &[] },
    FieldSpec { name: "awards", class: Enhanced, types: &[] },
    FieldSpec { name: "certifications", class: Enhanced, types: &[] },
    FieldSpec { name: "affiliations", class: Enhanced, types: &[] },
    FieldSpec { name: "partnerships", class: Enhanced, types: &[] },
    FieldSpec { name: "publications", class: Enhanced, types: &[] },
    FieldSpec { name: "patents", class: Enhanced, types: &[] },
    FieldSpec { name: "facilities", class: Enhanced, types: &[] },
    FieldSpec { name: "budget", class: Enhanced, types: &[] },
    FieldSpec { name: "recent_news", class: Enhanced, types: &[] },
    FieldSpec { name: "press_releases", class: Enhanced, types: &[] },
];

/// Look up the schema row for a field name.
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.name == name)
}

/// Whether `name` is a schema field.
pub fn is_schema_field(name: &str) -> bool {
    field_spec(name).is_some()
}

/// Whether a field is eligible for a record of the given type.
///
/// Universal fields are always eligible. Specialized fields are eligible
/// only when tagged with the record's type; for `General`, no specialized
/// field is eligible.
pub fn field_eligible(spec: &FieldSpec, institution_type: InstitutionType) -> bool {
    if spec.types.is_empty() {
        return true;
    }
    institution_type != InstitutionType::General && spec.types.contains(&institution_type)
}

/// Version stamp of the schema: first 16 hex chars of the SHA-256 over the
/// ordered field names. Part of the extraction cache key so that a schema
/// change invalidates cached extractions.
pub fn schema_version() -> String {
    let mut hasher = Sha256::new();
    for field in FIELDS {
        hasher.update(field.name.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn field_names_are_unique() {
        let names: HashSet<_> = FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), FIELDS.len());
    }

    #[test]
    fn only_specialized_fields_carry_type_tags() {
        for field in FIELDS {
            if !field.types.is_empty() {
                assert_eq!(field.class, FieldClass::Specialized, "{}", field.name);
            }
            if field.class == FieldClass::Specialized {
                assert!(!field.types.is_empty(), "{}", field.name);
            }
        }
    }

    #[test]
    fn class_counts_match_scoring_expectations() {
        let count = |class| FIELDS.iter().filter(|f| f.class == class).count();
        assert_eq!(count(FieldClass::Critical), 8);
        assert_eq!(count(FieldClass::Important), 10);
        assert_eq!(count(FieldClass::Valuable), 11);
    }

    #[test]
    fn specialized_fields_are_type_scoped() {
        let spec = field_spec("student_population").unwrap();
        assert!(field_eligible(spec, InstitutionType::University));
        assert!(!field_eligible(spec, InstitutionType::Bank));
        assert!(!field_eligible(spec, InstitutionType::General));

        let spec = field_spec("departments").unwrap();
        assert!(field_eligible(spec, InstitutionType::Hospital));
        assert!(field_eligible(spec, InstitutionType::University));
        assert!(!field_eligible(spec, InstitutionType::Bank));
    }

    #[test]
    fn schema_version_is_stable_and_short() {
        let v1 = schema_version();
        let v2 = schema_version();
        assert_eq!(v1, v2);
        assert_eq!(v1.len(), 16);
    }
}
