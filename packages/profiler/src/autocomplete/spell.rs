//! Trie-validated spell correction for institution queries.
//!
//! Candidate generation runs per word against a delete-variant dictionary
//! built from the trie's own vocabulary; whole phrases are then assembled
//! from per-word candidate sets and validated with `Trie::contains`. The
//! invariant is zero tolerance for out-of-vocabulary output: a phrase that
//! is not a reachable terminal in the trie is never suggested.

use std::collections::HashMap;

use tracing::debug;

use crate::autocomplete::trie::{normalize_name, Trie};

/// Maximum edit distance for word-level candidates.
const MAX_EDIT_DISTANCE: usize = 2;

/// Cap on the phrase candidate cartesian product.
const PRODUCT_CAP: usize = 128;

/// Per-word candidates kept from the dictionary lookup.
const CANDIDATES_PER_WORD: usize = 3;

/// Words shorter than this are never corrected (articles, prepositions).
const MIN_CORRECTABLE_LEN: usize = 3;

/// Institution terms additionally tried at the last phrase position.
const INSTITUTION_TERMS: &[&str] = &[
    "university",
    "college",
    "institute",
    "school",
    "academy",
    "hospital",
    "clinic",
    "bank",
];

/// One word-level replacement inside a corrected phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub position: usize,
    pub original: String,
    pub corrected: String,
    pub distance: usize,
}

/// A trie-validated corrected phrase.
#[derive(Debug, Clone)]
pub struct PhraseCorrection {
    /// Satisfies `trie.contains(&corrected_phrase)` by construction.
    pub corrected_phrase: String,
    pub corrections: Vec<Correction>,
    pub total_distance: usize,
    /// Frequency of the matched trie entry, for ranking.
    pub frequency: u32,
}

#[derive(Debug, Clone)]
struct WordCandidate {
    term: String,
    distance: usize,
}

/// Edit-distance candidate generator validated against the trie.
///
/// Built once at startup from the trie vocabulary; immutable afterwards.
pub struct SpellCorrector {
    /// word -> accumulated frequency
    words: HashMap<String, u32>,
    /// delete-variant -> dictionary words that produce it
    deletes: HashMap<String, Vec<String>>,
}

impl SpellCorrector {
    /// Build the dictionary from every word of every trie entry. Words of
    /// one or two characters are skipped; frequencies accumulate across
    /// entries sharing a word.
    pub fn from_trie(trie: &Trie) -> Self {
        let mut words: HashMap<String, u32> = HashMap::new();
        for entry in trie.entries() {
            for word in normalize_name(&entry.original).split_whitespace() {
                if word.len() >= MIN_CORRECTABLE_LEN {
                    *words.entry(word.to_string()).or_default() += entry.frequency.max(1);
                }
            }
        }

        let mut deletes: HashMap<String, Vec<String>> = HashMap::new();
        for word in words.keys() {
            for variant in delete_variants(word, MAX_EDIT_DISTANCE) {
                let bucket = deletes.entry(variant).or_default();
                if !bucket.contains(word) {
                    bucket.push(word.clone());
                }
            }
        }

        Self { words, deletes }
    }

    /// Number of dictionary words.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Whether a single word is in the dictionary.
    pub fn knows_word(&self, word: &str) -> bool {
        self.words.contains_key(&word.to_lowercase())
    }

    /// Closest dictionary candidates for one word, distance then frequency.
    fn lookup(&self, word: &str) -> Vec<WordCandidate> {
        let word = word.to_lowercase();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for variant in delete_variants(&word, MAX_EDIT_DISTANCE) {
            if let Some(bucket) = self.deletes.get(&variant) {
                for candidate in bucket {
                    if seen.contains_key(candidate) {
                        continue;
                    }
                    if let Some(d) = levenshtein_within(&word, candidate, MAX_EDIT_DISTANCE) {
                        seen.insert(candidate.clone(), d);
                    }
                }
            }
        }

        let mut candidates: Vec<WordCandidate> = seen
            .into_iter()
            .map(|(term, distance)| WordCandidate { term, distance })
            .collect();
        candidates.sort_by(|a, b| {
            a.distance.cmp(&b.distance).then_with(|| {
                let fa = self.words.get(&a.term).copied().unwrap_or(0);
                let fb = self.words.get(&b.term).copied().unwrap_or(0);
                fb.cmp(&fa).then_with(|| a.term.cmp(&b.term))
            })
        });
        candidates.truncate(CANDIDATES_PER_WORD);
        candidates
    }

    /// Propose corrections for a multi-word query. Every returned phrase
    /// exists in the trie. An empty vec is the `NoSuggestion` outcome, not
    /// an error.
    pub fn correct(&self, trie: &Trie, query: &str, limit: usize) -> Vec<PhraseCorrection> {
        let words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if words.is_empty() || limit == 0 {
            return Vec::new();
        }

        // Per-position candidate sets; the original word is always first.
        let mut options: Vec<Vec<WordCandidate>> = Vec::with_capacity(words.len());
        for (i, word) in words.iter().enumerate() {
            let mut set = vec![WordCandidate {
                term: word.clone(),
                distance: 0,
            }];

            if word.len() >= MIN_CORRECTABLE_LEN {
                for candidate in self.lookup(word) {
                    if candidate.term != *word {
                        set.push(candidate);
                    }
                }
                if i == words.len() - 1 {
                    for term in INSTITUTION_TERMS {
                        if set.iter().any(|c| c.term == *term) {
                            continue;
                        }
                        let distance = levenshtein(word, term);
                        set.push(WordCandidate {
                            term: (*term).to_string(),
                            distance,
                        });
                    }
                }
            }

            set.sort_by(|a, b| a.distance.cmp(&b.distance));
            options.push(set);
        }

        prune_to_cap(&mut options, PRODUCT_CAP);
        debug!(
            words = words.len(),
            product = options.iter().map(Vec::len).product::<usize>(),
            "Enumerating correction candidates"
        );

        let mut results: Vec<PhraseCorrection> = Vec::new();
        let mut combo: Vec<usize> = vec![0; options.len()];
        enumerate(&options, &mut combo, 0, &mut |indices| {
            let phrase = indices
                .iter()
                .enumerate()
                .map(|(pos, &i)| options[pos][i].term.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            let Some(entry) = trie.get(&phrase) else {
                return;
            };

            let corrections: Vec<Correction> = indices
                .iter()
                .enumerate()
                .filter(|(pos, &i)| options[*pos][i].term != words[*pos])
                .map(|(pos, &i)| Correction {
                    position: pos,
                    original: words[pos].clone(),
                    corrected: options[pos][i].term.clone(),
                    distance: options[pos][i].distance,
                })
                .collect();

            results.push(PhraseCorrection {
                corrected_phrase: phrase,
                total_distance: corrections.iter().map(|c| c.distance).sum(),
                corrections,
                frequency: entry.frequency,
            });
        });

        results.sort_by(|a, b| {
            a.total_distance
                .cmp(&b.total_distance)
                .then_with(|| b.frequency.cmp(&a.frequency))
                .then_with(|| a.corrected_phrase.cmp(&b.corrected_phrase))
        });
        results.dedup_by(|a, b| a.corrected_phrase == b.corrected_phrase);
        results.truncate(limit);
        results
    }
}

/// Shrink per-position candidate lists until the cartesian product fits the
/// cap, always dropping the highest-distance candidate of the longest list.
fn prune_to_cap(options: &mut [Vec<WordCandidate>], cap: usize) {
    loop {
        let product: usize = options.iter().map(Vec::len).product();
        if product <= cap {
            return;
        }
        let longest = options
            .iter_mut()
            .max_by_key(|set| set.len())
            .expect("options is non-empty");
        if longest.len() <= 1 {
            return;
        }
        // Lists are sorted by distance, so the tail is the worst candidate.
        longest.pop();
    }
}

fn enumerate(
    options: &[Vec<WordCandidate>],
    combo: &mut Vec<usize>,
    depth: usize,
    visit: &mut impl FnMut(&[usize]),
) {
    if depth == options.len() {
        visit(combo);
        return;
    }
    for i in 0..options[depth].len() {
        combo[depth] = i;
        enumerate(options, combo, depth + 1, visit);
    }
}

/// All strings obtainable by deleting up to `max_deletes` characters,
/// including the word itself.
fn delete_variants(word: &str, max_deletes: usize) -> Vec<String> {
    let mut variants = vec![word.to_string()];
    let mut frontier = vec![word.to_string()];
    for _ in 0..max_deletes {
        let mut next = Vec::new();
        for w in &frontier {
            let chars: Vec<char> = w.chars().collect();
            if chars.len() <= 1 {
                continue;
            }
            for skip in 0..chars.len() {
                let variant: String = chars
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != skip)
                    .map(|(_, c)| c)
                    .collect();
                if !variants.contains(&variant) {
                    variants.push(variant.clone());
                    next.push(variant);
                }
            }
        }
        frontier = next;
    }
    variants
}

/// Plain Levenshtein distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Levenshtein distance if it is at most `max`, else `None`.
fn levenshtein_within(a: &str, b: &str, max: usize) -> Option<usize> {
    if a.len().abs_diff(b.len()) > max {
        return None;
    }
    let d = levenshtein(a, b);
    (d <= max).then_some(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::InstitutionType;

    fn harvard_trie() -> Trie {
        let mut trie = Trie::new();
        trie.insert("harvard university", 10, Some(InstitutionType::University));
        trie.insert("harvest", 1, None);
        trie
    }

    #[test]
    fn corrects_single_typo_phrase() {
        let trie = harvard_trie();
        let corrector = SpellCorrector::from_trie(&trie);

        let results = corrector.correct(&trie, "harvrd university", 5);
        assert_eq!(results.len(), 1);

        let top = &results[0];
        assert_eq!(top.corrected_phrase, "harvard university");
        assert_eq!(top.corrections.len(), 1);
        assert_eq!(top.corrections[0].position, 0);
        assert_eq!(top.corrections[0].original, "harvrd");
        assert_eq!(top.corrections[0].corrected, "harvard");
        assert_eq!(top.corrections[0].distance, 1);
    }

    #[test]
    fn every_suggestion_exists_in_trie() {
        let mut trie = Trie::new();
        trie.insert("stanford university", 50, Some(InstitutionType::University));
        trie.insert("stamford hospital", 20, Some(InstitutionType::Hospital));
        trie.insert("standard bank", 30, Some(InstitutionType::Bank));
        let corrector = SpellCorrector::from_trie(&trie);

        for query in [
            "stanfrd university",
            "stamfort hospitl",
            "standrd bank",
            "stanford universty",
            "xyzzy plugh",
        ] {
            for suggestion in corrector.correct(&trie, query, 10) {
                assert!(
                    trie.contains(&suggestion.corrected_phrase),
                    "out-of-vocabulary suggestion {:?} for {:?}",
                    suggestion.corrected_phrase,
                    query
                );
            }
        }
    }

    #[test]
    fn no_suggestion_is_an_empty_set() {
        let trie = harvard_trie();
        let corrector = SpellCorrector::from_trie(&trie);
        assert!(corrector.correct(&trie, "completely unrelated words", 5).is_empty());
    }

    #[test]
    fn last_word_tries_institution_terms() {
        let mut trie = Trie::new();
        trie.insert("acme university", 10, Some(InstitutionType::University));
        let corrector = SpellCorrector::from_trie(&trie);

        // "universit" is close to the institution term even though the
        // dictionary word list alone would also supply it.
        let results = corrector.correct(&trie, "acme universit", 5);
        assert_eq!(results[0].corrected_phrase, "acme university");
    }

    #[test]
    fn short_words_are_left_alone() {
        let mut trie = Trie::new();
        trie.insert("university of utah", 10, Some(InstitutionType::University));
        let corrector = SpellCorrector::from_trie(&trie);

        let results = corrector.correct(&trie, "universty of utah", 5);
        assert_eq!(results[0].corrected_phrase, "university of utah");
        // "of" must not appear among the corrections
        assert!(results[0].corrections.iter().all(|c| c.original != "of"));
    }

    #[test]
    fn ranks_by_distance_then_frequency() {
        let mut trie = Trie::new();
        trie.insert("mercy hospital", 90, Some(InstitutionType::Hospital));
        trie.insert("marcy hospital", 5, Some(InstitutionType::Hospital));
        let corrector = SpellCorrector::from_trie(&trie);

        let results = corrector.correct(&trie, "mrcy hospital", 5);
        assert!(results.len() >= 2);
        // Both are distance 1; the more frequent entry wins.
        assert_eq!(results[0].corrected_phrase, "mercy hospital");
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("harvrd", "harvard"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn delete_variants_bounded() {
        let variants = delete_variants("abc", 2);
        assert!(variants.contains(&"abc".to_string()));
        assert!(variants.contains(&"ab".to_string()));
        assert!(variants.contains(&"a".to_string()));
        assert!(!variants.contains(&"".to_string()));
    }
}
