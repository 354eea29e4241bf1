//! Autocomplete front end: trie suggestions with spell-correction fallback.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::autocomplete::spell::SpellCorrector;
use crate::autocomplete::trie::Trie;
use crate::types::schema::InstitutionType;

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Autocomplete,
    SpellCorrection,
}

/// One suggestion shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    /// Original-cased institution name.
    pub name: String,
    pub institution_type: Option<InstitutionType>,
    pub frequency: u32,
    pub source: SuggestionSource,
}

/// Institutional prefixes tried when the bare prefix yields nothing, so that
/// "Mass" can surface "University of Massachusetts".
const PREFIX_VARIATIONS: &[&str] = &[
    "University of",
    "College of",
    "Institute of",
    "Bank of",
    "Hospital of",
];

/// Minimum query shape before the spell-correction fallback kicks in:
/// at least two tokens or at least this many characters.
const SPELL_FALLBACK_MIN_CHARS: usize = 4;

/// Autocomplete service over an immutable trie and spell corrector.
pub struct AutocompleteService {
    trie: Trie,
    corrector: SpellCorrector,
}

impl AutocompleteService {
    /// Build from a populated trie. The spell dictionary is derived from the
    /// trie's own vocabulary, so every correction is trie-validated.
    pub fn new(trie: Trie) -> Self {
        let corrector = SpellCorrector::from_trie(&trie);
        Self { trie, corrector }
    }

    pub fn trie(&self) -> &Trie {
        &self.trie
    }

    pub fn corrector(&self) -> &SpellCorrector {
        &self.corrector
    }

    /// Suggest completions for a prefix.
    ///
    /// Trie lookup first (with institutional prefix variations when the bare
    /// prefix is empty); spell correction only as a fallback, and only for
    /// queries long enough to correct meaningfully.
    pub fn suggest(&self, prefix: &str, k: usize) -> Vec<Suggestion> {
        let mut suggestions = self.trie_suggestions(prefix, k);

        if suggestions.is_empty() {
            for variation in PREFIX_VARIATIONS {
                let expanded = format!("{variation} {prefix}");
                suggestions = self.trie_suggestions(&expanded, k);
                if !suggestions.is_empty() {
                    debug!(prefix, variation, "Prefix variation matched");
                    break;
                }
            }
        }

        if suggestions.is_empty() && self.spell_fallback_applies(prefix) {
            suggestions = self
                .corrector
                .correct(&self.trie, prefix, k)
                .into_iter()
                .filter_map(|c| {
                    let entry = self.trie.get(&c.corrected_phrase)?;
                    Some(Suggestion {
                        name: entry.original.clone(),
                        institution_type: entry.institution_type,
                        frequency: entry.frequency,
                        source: SuggestionSource::SpellCorrection,
                    })
                })
                .collect();
        }

        suggestions
    }

    fn trie_suggestions(&self, prefix: &str, k: usize) -> Vec<Suggestion> {
        self.trie
            .suggest(prefix, k)
            .into_iter()
            .map(|entry| Suggestion {
                name: entry.original.clone(),
                institution_type: entry.institution_type,
                frequency: entry.frequency,
                source: SuggestionSource::Autocomplete,
            })
            .collect()
    }

    fn spell_fallback_applies(&self, prefix: &str) -> bool {
        prefix.split_whitespace().count() >= 2 || prefix.trim().len() >= SPELL_FALLBACK_MIN_CHARS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AutocompleteService {
        let mut trie = Trie::new();
        trie.insert(
            "Massachusetts Institute of Technology",
            100,
            Some(InstitutionType::University),
        );
        trie.insert(
            "Massachusetts General Hospital",
            80,
            Some(InstitutionType::Hospital),
        );
        trie.insert("Massey University", 40, Some(InstitutionType::University));
        trie.insert("University of Minnesota", 60, Some(InstitutionType::University));
        AutocompleteService::new(trie)
    }

    #[test]
    fn prefix_suggestions_in_frequency_order() {
        let service = service();
        let suggestions = service.suggest("mass", 3);
        let names: Vec<_> = suggestions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Massachusetts Institute of Technology",
                "Massachusetts General Hospital",
                "Massey University",
            ]
        );
        assert!(suggestions
            .iter()
            .all(|s| s.source == SuggestionSource::Autocomplete));
    }

    #[test]
    fn prefix_variation_surfaces_prefixed_entries() {
        let service = service();
        let suggestions = service.suggest("minnesota", 3);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].name, "University of Minnesota");
    }

    #[test]
    fn spell_fallback_annotates_provenance() {
        let service = service();
        let suggestions = service.suggest("massey universty", 3);
        assert!(!suggestions.is_empty());
        assert_eq!(suggestions[0].name, "Massey University");
        assert_eq!(suggestions[0].source, SuggestionSource::SpellCorrection);
    }

    #[test]
    fn short_garbage_prefix_gets_nothing() {
        let service = service();
        assert!(service.suggest("zq", 3).is_empty());
    }
}
