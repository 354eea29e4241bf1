//! Input resolution: prefix trie, spell correction, and the autocomplete
//! front end. Everything here is built once at startup from bulk CSV
//! ingestion and read concurrently afterwards.

pub mod service;
pub mod spell;
pub mod trie;

pub use service::{AutocompleteService, Suggestion, SuggestionSource};
pub use spell::{Correction, PhraseCorrection, SpellCorrector};
pub use trie::{clean_name, normalize_name, Trie, TrieEntry};
