//! Prefix trie over institution names.
//!
//! Search is case-insensitive on the normalized form; output preserves the
//! original casing. That split is a correctness requirement: downstream
//! components match on the normalized form while the user sees the original.
//! The trie is built once at startup from bulk CSV ingestion and never
//! mutated afterwards, so concurrent reads need no locking.

use std::collections::HashMap;

use crate::types::schema::InstitutionType;

/// Metadata stored at a terminal node.
#[derive(Debug, Clone)]
pub struct TrieEntry {
    /// The name with its original casing.
    pub original: String,
    /// Frequency weight used for ordering suggestions.
    pub frequency: u32,
    pub institution_type: Option<InstitutionType>,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<char, TrieNode>,
    entry: Option<TrieEntry>,
}

/// Normalize a name for trie storage: lowercase, punctuation stripped,
/// whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if ch.is_whitespace() || ch == '-' || ch == '&' || ch == '/' {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
        // other punctuation is dropped entirely
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Corporate suffixes stripped at bulk insertion.
const SUFFIXES_TO_REMOVE: &[&str] = &[
    "National Association",
    "N.A.",
    "F.S.B.",
    "Federal Savings Bank",
    "Trust Company",
    "Inc.",
    "LLC",
    "Corporation",
    "Corp.",
];

/// Clean a raw CSV name: truncate at the first comma, strip corporate
/// suffixes ("BancCentral, National Association" -> "BancCentral").
pub fn clean_name(name: &str) -> String {
    let mut cleaned = name.split(',').next().unwrap_or(name).trim().to_string();
    for suffix in SUFFIXES_TO_REMOVE {
        if let Some(stripped) = cleaned.strip_suffix(suffix) {
            cleaned = stripped.trim_end().to_string();
            break;
        }
    }
    cleaned
}

/// Prefix index of institution names with per-terminal metadata.
#[derive(Debug, Default)]
pub struct Trie {
    root: TrieNode,
    len: usize,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct names stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a name. Idempotent on the normalized form: re-inserting keeps
    /// the higher frequency, and keeps the earlier institution type unless
    /// the old entry had none and the new insert supplies one.
    pub fn insert(
        &mut self,
        name: &str,
        frequency: u32,
        institution_type: Option<InstitutionType>,
    ) {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return;
        }

        let mut node = &mut self.root;
        for ch in normalized.chars() {
            node = node.children.entry(ch).or_default();
        }

        match &mut node.entry {
            Some(existing) => {
                existing.frequency = existing.frequency.max(frequency);
                if existing.institution_type.is_none() {
                    existing.institution_type = institution_type;
                }
            }
            None => {
                self.len += 1;
                node.entry = Some(TrieEntry {
                    original: name.to_string(),
                    frequency,
                    institution_type,
                });
            }
        }
    }

    /// Bulk insertion from raw records, cleaning names first.
    pub fn insert_bulk<'a>(
        &mut self,
        records: impl IntoIterator<Item = (&'a str, u32, Option<InstitutionType>)>,
    ) {
        for (name, frequency, institution_type) in records {
            let cleaned = clean_name(name);
            if !cleaned.is_empty() {
                self.insert(&cleaned, frequency, institution_type);
            }
        }
    }

    /// Exact normalized membership check. Used by the spell-corrector
    /// validator: every suggestion it emits must pass this.
    pub fn contains(&self, name: &str) -> bool {
        self.find_node(&normalize_name(name))
            .map(|n| n.entry.is_some())
            .unwrap_or(false)
    }

    /// Entry lookup by exact normalized name.
    pub fn get(&self, name: &str) -> Option<&TrieEntry> {
        self.find_node(&normalize_name(name))
            .and_then(|n| n.entry.as_ref())
    }

    /// Top-k suggestions under a prefix, ordered by descending frequency and
    /// then ascending normalized name.
    pub fn suggest(&self, prefix: &str, k: usize) -> Vec<&TrieEntry> {
        let normalized = normalize_name(prefix);
        if normalized.is_empty() || k == 0 {
            return Vec::new();
        }

        let Some(start) = self.find_node(&normalized) else {
            return Vec::new();
        };

        let mut collected: Vec<(String, &TrieEntry)> = Vec::new();
        Self::collect(start, &mut normalized.clone(), &mut collected);

        collected.sort_by(|(name_a, a), (name_b, b)| {
            b.frequency.cmp(&a.frequency).then_with(|| name_a.cmp(name_b))
        });
        collected.into_iter().take(k).map(|(_, e)| e).collect()
    }

    /// All entries, frequency descending. Used to build the spell dictionary
    /// and the abbreviation table.
    pub fn entries(&self) -> Vec<&TrieEntry> {
        let mut collected: Vec<(String, &TrieEntry)> = Vec::new();
        Self::collect(&self.root, &mut String::new(), &mut collected);
        collected.sort_by(|(name_a, a), (name_b, b)| {
            b.frequency.cmp(&a.frequency).then_with(|| name_a.cmp(name_b))
        });
        collected.into_iter().map(|(_, e)| e).collect()
    }

    fn find_node(&self, normalized: &str) -> Option<&TrieNode> {
        let mut node = &self.root;
        for ch in normalized.chars() {
            node = node.children.get(&ch)?;
        }
        Some(node)
    }

    fn collect<'a>(node: &'a TrieNode, path: &mut String, out: &mut Vec<(String, &'a TrieEntry)>) {
        if let Some(entry) = &node.entry {
            out.push((path.clone(), entry));
        }
        // Deterministic traversal order is not required here; the caller
        // sorts before truncating.
        for (ch, child) in &node.children {
            path.push(*ch);
            Self::collect(child, path, out);
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trie() -> Trie {
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
        trie.insert("Masseter Clinic", 5, Some(InstitutionType::Hospital));
        trie
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in ["  Harvard   University ", "St. Mary's Hospital", "BANK-OF-X", "mit"] {
            let once = normalize_name(input);
            assert_eq!(normalize_name(&once), once, "{input}");
        }
    }

    #[test]
    fn contains_is_case_insensitive() {
        let trie = sample_trie();
        assert!(trie.contains("massachusetts institute of technology"));
        assert!(trie.contains("MASSACHUSETTS INSTITUTE OF TECHNOLOGY"));
        assert!(!trie.contains("massachusetts"));
    }

    #[test]
    fn suggest_orders_by_frequency_then_name() {
        let trie = sample_trie();
        let suggestions = trie.suggest("mass", 3);
        let names: Vec<_> = suggestions.iter().map(|e| e.original.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Massachusetts Institute of Technology",
                "Massachusetts General Hospital",
                "Massey University",
            ]
        );
    }

    #[test]
    fn suggest_breaks_frequency_ties_lexicographically() {
        let mut trie = Trie::new();
        trie.insert("Beta College", 10, None);
        trie.insert("Alpha College", 10, None);
        let names: Vec<_> = trie
            .suggest("a", 5)
            .iter()
            .map(|e| e.original.as_str())
            .collect();
        assert_eq!(names, vec!["Alpha College"]);

        let mut trie = Trie::new();
        trie.insert("Acme Beta", 10, None);
        trie.insert("Acme Alpha", 10, None);
        let names: Vec<_> = trie
            .suggest("acme", 5)
            .iter()
            .map(|e| e.original.as_str())
            .collect();
        assert_eq!(names, vec!["Acme Alpha", "Acme Beta"]);
    }

    #[test]
    fn insert_keeps_higher_frequency_and_earlier_type() {
        let mut trie = Trie::new();
        trie.insert("Example University", 5, None);
        trie.insert("example university", 10, Some(InstitutionType::University));
        assert_eq!(trie.len(), 1);

        let entry = trie.get("Example University").unwrap();
        assert_eq!(entry.frequency, 10);
        // type filled in because the first insert had none
        assert_eq!(entry.institution_type, Some(InstitutionType::University));

        trie.insert("Example University", 1, Some(InstitutionType::Hospital));
        let entry = trie.get("Example University").unwrap();
        assert_eq!(entry.frequency, 10);
        assert_eq!(entry.institution_type, Some(InstitutionType::University));
    }

    #[test]
    fn bulk_insert_cleans_names() {
        let mut trie = Trie::new();
        trie.insert_bulk([(
            "BancCentral, National Association",
            3,
            Some(InstitutionType::Bank),
        )]);
        assert!(trie.contains("BancCentral"));
        assert!(!trie.contains("BancCentral National Association"));
    }

    #[test]
    fn clean_name_strips_suffixes() {
        assert_eq!(clean_name("Acme Trust Company"), "Acme");
        assert_eq!(clean_name("First Bank Inc."), "First Bank");
        assert_eq!(clean_name("Plain Name"), "Plain Name");
    }
}
