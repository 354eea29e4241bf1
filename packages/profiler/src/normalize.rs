//! Query canonicalization and the similarity metric behind the caches.
//!
//! A query's canonical form is produced by lowercasing, folding accented
//! characters, expanding known abbreviations, stripping punctuation, and
//! collapsing whitespace. Two canonical keys can still refer to the same
//! institution ("harvard university" vs "harvard univ"); the similarity
//! metric lets the cache serve those as fuzzy hits.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::autocomplete::spell::levenshtein;
use crate::autocomplete::trie::{normalize_name, Trie};
use crate::types::request::ProfileRequest;
use crate::types::schema::InstitutionType;

/// Weighted-similarity acceptance threshold for fuzzy cache hits.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

/// Tokens that do not contribute letters to an acronym.
const STOP_WORDS: &[&str] = &["of", "the", "and", "for", "at", "in"];

/// Acronym expansion table derived from the trie at startup.
///
/// An acronym formed from the leading letters of an entry's significant
/// words maps to that entry's normalized name when no other entry produces
/// the same acronym.
#[derive(Debug, Default, Clone)]
pub struct AbbreviationTable {
    expansions: HashMap<String, String>,
}

impl AbbreviationTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from trie entries with at least two significant words.
    pub fn from_trie(trie: &Trie) -> Self {
        let mut candidates: HashMap<String, HashSet<String>> = HashMap::new();

        for entry in trie.entries() {
            let normalized = normalize_name(&entry.original);
            let significant: Vec<&str> = normalized
                .split_whitespace()
                .filter(|w| !STOP_WORDS.contains(w))
                .collect();
            if significant.len() < 2 {
                continue;
            }
            let acronym: String = significant
                .iter()
                .filter_map(|w| w.chars().next())
                .collect();
            if acronym.len() >= 2 {
                candidates.entry(acronym).or_default().insert(normalized.clone());
            }
        }

        let expansions = candidates
            .into_iter()
            .filter_map(|(acronym, names)| {
                // Ambiguous acronyms expand to nothing.
                (names.len() == 1).then(|| (acronym, names.into_iter().next().unwrap()))
            })
            .collect();

        Self { expansions }
    }

    /// Add a fixed mapping (normalized forms on both sides).
    pub fn with_entry(mut self, acronym: &str, expansion: &str) -> Self {
        self.expansions
            .insert(normalize_name(acronym), normalize_name(expansion));
        self
    }

    pub fn expand(&self, normalized: &str) -> Option<&str> {
        self.expansions.get(normalized).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.expansions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expansions.is_empty()
    }
}

/// Fold common accented Latin characters to their ASCII base.
fn fold_char(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Canonicalize a free-text institution name.
///
/// Idempotent: canonicalizing a canonical form returns it unchanged.
pub fn canonicalize(input: &str, abbreviations: &AbbreviationTable) -> String {
    let folded: String = input
        .to_lowercase()
        .chars()
        .map(fold_char)
        .collect();
    let normalized = normalize_name(&folded);

    match abbreviations.expand(&normalized) {
        Some(expansion) => expansion.to_string(),
        None => normalized,
    }
}

/// The canonical cache key for a profiling request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedKey {
    pub canonical: String,
    pub type_tag: Option<InstitutionType>,
    /// Hash over the recognized search-refinement options.
    pub option_fingerprint: String,
}

impl NormalizedKey {
    pub fn new(
        name: &str,
        type_tag: Option<InstitutionType>,
        abbreviations: &AbbreviationTable,
    ) -> Self {
        Self {
            canonical: canonicalize(name, abbreviations),
            type_tag,
            option_fingerprint: fingerprint_options(&BTreeMap::new()),
        }
    }

    /// Derive the key for a request, folding its refinement options into the
    /// fingerprint.
    pub fn from_request(request: &ProfileRequest, abbreviations: &AbbreviationTable) -> Self {
        let mut options: BTreeMap<&str, String> = BTreeMap::new();
        if let Some(v) = &request.location {
            options.insert("location", v.to_lowercase());
        }
        if let Some(v) = &request.additional_keywords {
            options.insert("additional_keywords", v.to_lowercase());
        }
        if let Some(v) = &request.domain_hint {
            options.insert("domain_hint", v.to_lowercase());
        }
        if let Some(v) = &request.exclude_terms {
            options.insert("exclude_terms", v.to_lowercase());
        }

        Self {
            canonical: canonicalize(&request.institution_name, abbreviations),
            type_tag: request.institution_type,
            option_fingerprint: fingerprint_options(&options),
        }
    }

    /// Flat string form used for file naming and exact lookups.
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.canonical,
            self.type_tag.map(|t| t.as_str()).unwrap_or("unknown"),
            self.option_fingerprint
        )
    }
}

fn fingerprint_options(options: &BTreeMap<&str, String>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in options {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b";");
    }
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Blended similarity of two canonical strings, in [0, 1].
///
/// 0.3 character-level Levenshtein ratio + 0.4 token-set Jaccard +
/// 0.3 token-sequence ratio. Symmetric by construction.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    0.3 * levenshtein_ratio(a, b) + 0.4 * token_jaccard(a, b) + 0.3 * token_sequence_ratio(a, b)
}

fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// `2 * LCS / (len_a + len_b)` over token sequences.
fn token_sequence_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let mut previous = vec![0usize; tokens_b.len() + 1];
    let mut current = vec![0usize; tokens_b.len() + 1];
    for ta in &tokens_a {
        for (j, tb) in tokens_b.iter().enumerate() {
            current[j + 1] = if ta == tb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
        current.fill(0);
    }
    let lcs = previous[tokens_b.len()];
    2.0 * lcs as f64 / (tokens_a.len() + tokens_b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mit_table() -> AbbreviationTable {
        let mut trie = Trie::new();
        trie.insert(
            "Massachusetts Institute of Technology",
            100,
            Some(InstitutionType::University),
        );
        trie.insert("Mass General Brigham", 50, Some(InstitutionType::Hospital));
        AbbreviationTable::from_trie(&trie)
    }

    #[test]
    fn builds_acronyms_from_trie() {
        let table = mit_table();
        assert_eq!(
            table.expand("mit"),
            Some("massachusetts institute of technology")
        );
        assert_eq!(table.expand("mgb"), Some("mass general brigham"));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let table = mit_table();
        for input in [
            "MIT",
            "Massachusetts  Institute of Technology!",
            "Université de Montréal",
            "  plain  name  ",
        ] {
            let once = canonicalize(input, &table);
            assert_eq!(canonicalize(&once, &table), once, "{input}");
        }
    }

    #[test]
    fn abbreviation_collapses_to_same_canonical_form() {
        let table = mit_table();
        assert_eq!(
            canonicalize("MIT", &table),
            canonicalize("Massachusetts Institute of Technology", &table)
        );
    }

    #[test]
    fn accents_fold_to_ascii() {
        let table = AbbreviationTable::empty();
        assert_eq!(canonicalize("Université de Montréal", &table), "universite de montreal");
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            ("harvard university", "harvard univ"),
            ("stanford", "university of stanford"),
            ("a b c", "c b a"),
            ("", "nonempty"),
        ];
        for (a, b) in pairs {
            assert!((similarity(a, b) - similarity(b, a)).abs() < 1e-9, "{a} / {b}");
        }
    }

    #[test]
    fn similarity_accepts_near_duplicates_only() {
        assert!(similarity("harvard university", "harvard university") >= 1.0 - 1e-9);

        // A single typo'd token in a long query stays above the threshold.
        let a = "the london school of economics and political science main campus";
        let b = "the london school of economics and political sciense main campus";
        assert!(similarity(a, b) >= SIMILARITY_THRESHOLD, "{}", similarity(a, b));

        // Short queries with a differing token are rejected: the token-set
        // and token-sequence components dominate at this length.
        assert!(similarity("harvard university", "harvard universty") < SIMILARITY_THRESHOLD);
        assert!(similarity("harvard university", "yale school of medicine") < SIMILARITY_THRESHOLD);
    }

    #[test]
    fn option_fingerprint_separates_requests() {
        let table = AbbreviationTable::empty();
        let plain = ProfileRequest::new("Example University");
        let located = ProfileRequest::new("Example University").with_location("Boston");

        let key_a = NormalizedKey::from_request(&plain, &table);
        let key_b = NormalizedKey::from_request(&located, &table);
        assert_eq!(key_a.canonical, key_b.canonical);
        assert_ne!(key_a.option_fingerprint, key_b.option_fingerprint);
        assert_ne!(key_a.cache_key(), key_b.cache_key());
    }
}
