//! Content preparation: assemble one bounded text payload for the extractor
//! from whatever upstream produced.
//!
//! Priority order: crawled pages, then a multi-paragraph search description,
//! then a short snippet, then caller-supplied text. Each branch has its own
//! budget; truncation prefers sentence or paragraph boundaries within 10% of
//! the budget and falls back to a whitespace boundary.

use serde::{Deserialize, Serialize};

use crate::types::artifact::ScoredArtifact;

/// Per-page section cap in the crawled-pages branch.
pub const SECTION_CAP: usize = 2_000;
/// Total cap for the crawled-pages branch.
pub const CRAWL_CAP: usize = 12_000;
/// Cap for a multi-paragraph search description.
pub const DESCRIPTION_CAP: usize = 8_000;
/// Cap for a short search snippet.
pub const SNIPPET_CAP: usize = 4_000;
/// Cap for caller-supplied direct text.
pub const DIRECT_TEXT_CAP: usize = 6_000;

/// A description is "multi-paragraph" at or past this length even without
/// an explicit paragraph break.
const MULTI_PARAGRAPH_LEN: usize = 600;

/// Which input the preparer selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrepareBranch {
    CrawledPages,
    SearchDescription,
    SearchSnippet,
    DirectText,
    Empty,
}

/// The bounded prompt input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedContent {
    pub text: String,
    pub branch: PrepareBranch,
    /// The cap that applied to the selected branch.
    pub hard_cap: usize,
}

impl PreparedContent {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Assemble the extraction payload.
pub fn prepare(
    artifacts: &[ScoredArtifact],
    search_description: &str,
    direct_text: Option<&str>,
) -> PreparedContent {
    let successful: Vec<&ScoredArtifact> =
        artifacts.iter().filter(|a| a.artifact.succeeded()).collect();

    if !successful.is_empty() {
        return PreparedContent {
            text: assemble_pages(&successful),
            branch: PrepareBranch::CrawledPages,
            hard_cap: CRAWL_CAP,
        };
    }

    let description = search_description.trim();
    if !description.is_empty() {
        let multi_paragraph =
            description.contains("\n\n") || description.len() >= MULTI_PARAGRAPH_LEN;
        let (cap, branch) = if multi_paragraph {
            (DESCRIPTION_CAP, PrepareBranch::SearchDescription)
        } else {
            (SNIPPET_CAP, PrepareBranch::SearchSnippet)
        };
        return PreparedContent {
            text: truncate_at_boundary(description, cap).to_string(),
            branch,
            hard_cap: cap,
        };
    }

    if let Some(text) = direct_text.map(str::trim).filter(|t| !t.is_empty()) {
        return PreparedContent {
            text: truncate_at_boundary(text, DIRECT_TEXT_CAP).to_string(),
            branch: PrepareBranch::DirectText,
            hard_cap: DIRECT_TEXT_CAP,
        };
    }

    PreparedContent {
        text: String::new(),
        branch: PrepareBranch::Empty,
        hard_cap: 0,
    }
}

/// Concatenate per-page sections with source-attribution headers, each
/// section capped, the whole capped.
fn assemble_pages(artifacts: &[&ScoredArtifact]) -> String {
    let mut out = String::new();

    for (index, scored) in artifacts.iter().enumerate() {
        let artifact = &scored.artifact;
        let header = format!("[page {}: {}]\n", index + 1, artifact.url);

        let separator = if out.is_empty() { 0 } else { 2 };
        let remaining = CRAWL_CAP.saturating_sub(out.len() + separator);
        // Not worth starting a section that can only hold its header.
        if remaining <= header.len() + 80 {
            break;
        }

        let mut section = String::new();
        if !artifact.metadata.title.is_empty() {
            section.push_str(&artifact.metadata.title);
            section.push('\n');
        }
        section.push_str(artifact.markdown.primary_content.trim());
        if let Some(block) = artifact.structured_data.first() {
            if let Ok(compact) = serde_json::to_string(block) {
                section.push_str("\n");
                section.push_str(&compact);
            }
        }

        let section_budget = SECTION_CAP.min(remaining - header.len());
        let section = truncate_at_boundary(&section, section_budget);

        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&header);
        out.push_str(section);
    }

    debug_assert!(out.len() <= CRAWL_CAP);
    out
}

/// Cut `text` to at most `budget` bytes, preferring a paragraph or sentence
/// boundary within the last 10% of the budget, then a whitespace boundary,
/// then a plain character boundary.
pub fn truncate_at_boundary(text: &str, budget: usize) -> &str {
    if text.len() <= budget {
        return text;
    }

    let hard = floor_char_boundary(text, budget);
    let window_start = budget.saturating_sub(budget / 10);
    let slice = &text[..hard];

    for pattern in ["\n\n", ". ", "! ", "? "] {
        if let Some(pos) = slice.rfind(pattern) {
            let end = pos + pattern.len();
            if end >= window_start {
                return text[..end].trim_end();
            }
        }
    }

    if let Some(pos) = slice.rfind(char::is_whitespace) {
        if pos > 0 {
            return text[..pos].trim_end();
        }
    }

    slice
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::artifact::CrawlArtifact;

    fn scored(artifact: CrawlArtifact) -> ScoredArtifact {
        ScoredArtifact {
            artifact,
            scored_images: vec![],
            priority_rank: 0,
        }
    }

    fn page(url: &str, words: usize) -> ScoredArtifact {
        let text = "campus word ".repeat(words);
        scored(
            CrawlArtifact::new(url)
                .with_title("Page Title")
                .with_markdown(text),
        )
    }

    #[test]
    fn crawled_pages_win_and_keep_headers() {
        let artifacts = vec![page("https://example.edu/a", 50), page("https://example.edu/b", 50)];
        let prepared = prepare(&artifacts, "some description", None);

        assert_eq!(prepared.branch, PrepareBranch::CrawledPages);
        assert!(prepared.text.contains("[page 1: https://example.edu/a]"));
        assert!(prepared.text.contains("[page 2: https://example.edu/b]"));
        assert!(prepared.text.len() <= CRAWL_CAP);
    }

    #[test]
    fn total_output_respects_the_hard_cap() {
        let artifacts: Vec<_> = (0..20)
            .map(|i| page(&format!("https://example.edu/{i}"), 400))
            .collect();
        let prepared = prepare(&artifacts, "", None);
        assert!(prepared.text.len() <= CRAWL_CAP, "{}", prepared.text.len());
    }

    #[test]
    fn long_description_takes_branch_two() {
        let description = "First paragraph about the institution.\n\nSecond paragraph.";
        let prepared = prepare(&[], description, None);
        assert_eq!(prepared.branch, PrepareBranch::SearchDescription);
        assert_eq!(prepared.hard_cap, DESCRIPTION_CAP);
    }

    #[test]
    fn short_snippet_takes_branch_three() {
        let prepared = prepare(&[], "A short snippet.", None);
        assert_eq!(prepared.branch, PrepareBranch::SearchSnippet);
        assert_eq!(prepared.hard_cap, SNIPPET_CAP);
    }

    #[test]
    fn direct_text_is_the_last_resort() {
        let prepared = prepare(&[], "", Some("Caller supplied text."));
        assert_eq!(prepared.branch, PrepareBranch::DirectText);

        let empty = prepare(&[], "", None);
        assert_eq!(empty.branch, PrepareBranch::Empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn failed_artifacts_do_not_select_branch_one() {
        let mut artifact = CrawlArtifact::new("https://example.edu").with_markdown("content");
        artifact.status = 500;
        let prepared = prepare(&[scored(artifact)], "snippet", None);
        assert_eq!(prepared.branch, PrepareBranch::SearchSnippet);
    }

    #[test]
    fn truncation_prefers_sentence_boundaries() {
        let text = format!("{}. {}", "a".repeat(95), "b".repeat(200));
        let cut = truncate_at_boundary(&text, 100);
        assert_eq!(cut, format!("{}.", "a".repeat(95)));
    }

    #[test]
    fn truncation_falls_back_to_whitespace() {
        let text = format!("{} {}", "a".repeat(50), "b".repeat(200));
        let cut = truncate_at_boundary(&text, 100);
        assert_eq!(cut, "a".repeat(50));
    }

    #[test]
    fn truncation_never_exceeds_budget() {
        let text = "word ".repeat(1000);
        for budget in [10, 100, 1000, 4000] {
            assert!(truncate_at_boundary(&text, budget).len() <= budget);
        }
    }

    #[test]
    fn truncation_is_utf8_safe() {
        let text = "é".repeat(300);
        let cut = truncate_at_boundary(&text, 101);
        assert!(cut.len() <= 101);
        assert!(std::str::from_utf8(cut.as_bytes()).is_ok());
    }
}
