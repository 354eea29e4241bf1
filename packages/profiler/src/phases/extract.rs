//! Extract phase: LLM-prompted structured-field extraction and the merge of
//! crawl-derived media into the final record.
//!
//! The system prompt embeds the frozen field schema; the response is parsed
//! against it and unknown keys are dropped with a warning recorded on the
//! outcome. An LLM transport or parse failure degrades the phase: the record
//! keeps whatever the crawl could derive.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::ErrorKind;
use crate::normalize::NormalizedKey;
use crate::scoring::media::LOGO_CANDIDATE_THRESHOLD;
use crate::traits::ai::{CompletionOptions, LanguageModel};
use crate::types::artifact::{ScoredArtifact, ScoredImage};
use crate::types::profile::{InstitutionProfile, Value};
use crate::types::schema;

/// Relevance floor for images carried onto the result.
const IMAGE_RELEVANCE_FLOOR: u8 = 3;
/// Relevance floor for facility images.
const FACILITY_RELEVANCE_FLOOR: u8 = 5;

const SOCIAL_PLATFORMS: &[(&str, &[&str])] = &[
    ("facebook", &["facebook.com"]),
    ("twitter", &["twitter.com", "x.com"]),
    ("linkedin", &["linkedin.com"]),
    ("instagram", &["instagram.com"]),
    ("youtube", &["youtube.com", "youtu.be"]),
    ("tiktok", &["tiktok.com"]),
];

const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx"];

/// Usage accounting carried out of the phase for benchmarking.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExtractUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub api_calls: u32,
}

/// The extract phase's artifact. Cached by the composite extraction key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractOutcome {
    pub profile: InstitutionProfile,
    /// Response keys outside the schema, dropped with a warning.
    pub dropped_keys: Vec<String>,
    pub usage: ExtractUsage,
    pub error_kind: Option<ErrorKind>,
}

impl ExtractOutcome {
    pub fn degraded(&self) -> bool {
        self.error_kind.is_some()
    }
}

/// Media assets merged from the crawl onto the result.
#[derive(Debug, Clone, Default)]
pub struct MediaMerge {
    pub logos: Vec<ScoredImage>,
    pub images: Vec<ScoredImage>,
    pub facility_images: Vec<ScoredImage>,
    pub campus_image_count: usize,
    pub social_links: BTreeMap<String, String>,
    pub document_links: Vec<String>,
}

/// Derive the extraction cache key: the request's normalized key refined
/// with the prepared-content hash, schema version, and model id, so any of
/// those changing invalidates the cached extraction.
pub fn extraction_key(base: &NormalizedKey, prepared_content: &str, model_id: &str) -> NormalizedKey {
    let mut hasher = Sha256::new();
    hasher.update(base.option_fingerprint.as_bytes());
    hasher.update(prepared_content.as_bytes());
    hasher.update(schema::schema_version().as_bytes());
    hasher.update(model_id.as_bytes());
    NormalizedKey {
        canonical: base.canonical.clone(),
        type_tag: base.type_tag,
        option_fingerprint: format!("{:x}", hasher.finalize())[..16].to_string(),
    }
}

/// System prompt embedding the field schema.
pub fn system_prompt() -> String {
    let field_list = schema::FIELDS
        .iter()
        .map(|f| f.name)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You extract structured facts about institutions from source text. \
         Respond with a single JSON object. Allowed keys: {field_list}. \
         Omit any field the text does not support; never invent values and \
         never emit keys outside the allowed list. Values may be strings, \
         numbers, lists, or objects (leadership is a list of {{name, title}})."
    )
}

/// User prompt carrying the prepared content.
pub fn user_prompt(institution_name: &str, prepared_content: &str) -> String {
    format!(
        "Institution: {institution_name}\n\nSource text:\n---\n{prepared_content}\n---\n\nJSON:"
    )
}

/// Parse an LLM response against the schema.
///
/// Returns the profile plus the list of dropped out-of-schema keys. A
/// response that is not a JSON object is a parse failure.
pub fn parse_response(
    text: &str,
    institution_name: &str,
) -> Result<(InstitutionProfile, Vec<String>), serde_json::Error> {
    let cleaned = strip_fences(text);
    let parsed: serde_json::Value = serde_json::from_str(cleaned)?;

    let mut profile = InstitutionProfile::new();
    let mut dropped = Vec::new();

    if let serde_json::Value::Object(map) = parsed {
        for (key, raw) in map {
            if !schema::is_schema_field(&key) {
                warn!(key = %key, "Dropping out-of-schema extraction key");
                dropped.push(key);
                continue;
            }
            if let Some(value) = convert(raw) {
                profile.set(&key, value);
            }
        }
    }

    // The subject's name is always known to the caller.
    if !profile.contains("name") {
        profile.set("name", institution_name);
    }

    Ok((profile, dropped))
}

fn strip_fences(text: &str) -> &str {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```json") {
        t = rest;
    } else if let Some(rest) = t.strip_prefix("```") {
        t = rest;
    }
    if let Some(rest) = t.strip_suffix("```") {
        t = rest;
    }
    t.trim()
}

fn convert(raw: serde_json::Value) -> Option<Value> {
    match raw {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::Text(b.to_string())),
        serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
        serde_json::Value::String(s) => Some(Value::Text(s)),
        serde_json::Value::Array(items) => Some(Value::List(
            items.into_iter().filter_map(convert).collect(),
        )),
        serde_json::Value::Object(map) => Some(Value::Record(
            map.into_iter()
                .filter_map(|(k, v)| convert(v).map(|v| (k, v)))
                .collect(),
        )),
    }
}

/// Merge crawl-derived media: logo candidates by confidence, images by
/// relevance, social links deduped per platform, document links.
pub fn merge_media(artifacts: &[ScoredArtifact]) -> MediaMerge {
    let mut merge = MediaMerge::default();
    let mut seen_images = std::collections::HashSet::new();

    for scored in artifacts {
        for image in &scored.scored_images {
            if !seen_images.insert(image.image.src.clone()) {
                continue;
            }
            if image.logo_confidence >= LOGO_CANDIDATE_THRESHOLD {
                merge.logos.push(image.clone());
            }
            if image.relevance >= IMAGE_RELEVANCE_FLOOR {
                merge.images.push(image.clone());
            }
            if image.relevance >= FACILITY_RELEVANCE_FLOOR {
                let text = format!("{} {}", image.image.alt, image.image.context_snippet)
                    .to_lowercase();
                if text.contains("campus") {
                    merge.campus_image_count += 1;
                }
                merge.facility_images.push(image.clone());
            }
        }

        for link in scored
            .artifact
            .external_links
            .iter()
            .chain(scored.artifact.internal_links.iter())
        {
            let lower = link.to_lowercase();
            for (platform, hosts) in SOCIAL_PLATFORMS {
                if hosts.iter().any(|h| lower.contains(h)) {
                    merge
                        .social_links
                        .entry((*platform).to_string())
                        .or_insert_with(|| link.clone());
                }
            }
            if DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
                && !merge.document_links.contains(link)
            {
                merge.document_links.push(link.clone());
            }
        }
    }

    merge
        .logos
        .sort_by(|a, b| b.logo_confidence.total_cmp(&a.logo_confidence));
    merge.images.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    merge
        .facility_images
        .sort_by(|a, b| b.relevance.cmp(&a.relevance));
    merge
}

/// Extract phase configuration and execution.
#[derive(Debug, Clone, Default)]
pub struct ExtractPhase {
    pub completion: CompletionOptions,
}

impl ExtractPhase {
    /// Run the LLM extraction. Transport and parse failures degrade the
    /// outcome to an empty profile tagged `ExtractFailed`; the orchestrator
    /// then fills in crawl-derived fields.
    pub async fn execute(
        &self,
        ai: &dyn LanguageModel,
        institution_name: &str,
        prepared_content: &str,
    ) -> ExtractOutcome {
        let system = system_prompt();
        let user = user_prompt(institution_name, prepared_content);

        let completion = match ai.complete(&system, &user, &self.completion).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!(error = %e, "Language model call failed");
                return ExtractOutcome {
                    error_kind: Some(ErrorKind::ExtractFailed),
                    usage: ExtractUsage {
                        api_calls: 1,
                        ..Default::default()
                    },
                    ..Default::default()
                };
            }
        };

        let usage = ExtractUsage {
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            cost_usd: completion.cost_usd,
            api_calls: 1,
        };

        match parse_response(&completion.text, institution_name) {
            Ok((profile, dropped_keys)) => {
                info!(
                    fields = profile.len(),
                    dropped = dropped_keys.len(),
                    "Extraction parsed"
                );
                ExtractOutcome {
                    profile,
                    dropped_keys,
                    usage,
                    error_kind: None,
                }
            }
            Err(e) => {
                debug!(error = %e, "Extraction response was not valid JSON");
                ExtractOutcome {
                    usage,
                    error_kind: Some(ErrorKind::ExtractFailed),
                    ..Default::default()
                }
            }
        }
    }
}
