//! Crawl artifacts: the per-URL bundle a crawler engine returns.
//!
//! The engine is expected to expose every content format it can produce
//! (raw HTML, cleaned HTML, markdown, structured data) plus media and link
//! inventories. Downstream stages pick what they need; nothing is thrown
//! away before content preparation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where in the page's DOM an image was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomLocation {
    Header,
    NearTitle,
    MainContent,
    Sidebar,
    Footer,
    Unknown,
}

impl Default for DomLocation {
    fn default() -> Self {
        Self::Unknown
    }
}

/// An image as reported by the crawler engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRecord {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Text found near the image in the document.
    #[serde(default)]
    pub context_snippet: String,
    #[serde(default)]
    pub dom_location: DomLocation,
}

impl ImageRecord {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            ..Default::default()
        }
    }

    pub fn with_alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = alt.into();
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_context(mut self, snippet: impl Into<String>) -> Self {
        self.context_snippet = snippet.into();
        self
    }

    pub fn with_location(mut self, location: DomLocation) -> Self {
        self.dom_location = location;
        self
    }
}

/// An image with heuristic scores attached (see `scoring::media`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredImage {
    #[serde(flatten)]
    pub image: ImageRecord,
    /// Relevance band 0..=6; 6 is a confirmed logo.
    pub relevance: u8,
    /// Logo confidence in [0, 1]; candidate at >= 0.5.
    pub logo_confidence: f32,
}

impl ScoredImage {
    pub fn is_logo_candidate(&self) -> bool {
        self.logo_confidence >= 0.5
    }
}

/// Markdown renderings of a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkdownBundle {
    /// Full markdown rendering of the page.
    #[serde(default)]
    pub raw: String,
    /// Rendering restricted to content that passed the engine's fit filter.
    #[serde(default)]
    pub fit: String,
    /// The variant downstream stages should read.
    #[serde(default)]
    pub primary_content: String,
}

/// Page-level metadata extracted by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub language: String,
}

/// The full per-URL crawl bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlArtifact {
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub raw_html: String,
    #[serde(default)]
    pub cleaned_html: String,
    #[serde(default)]
    pub markdown: MarkdownBundle,
    /// JSON-LD blocks found in the page, already parsed.
    #[serde(default)]
    pub structured_data: Vec<serde_json::Value>,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub audio: Vec<String>,
    #[serde(default)]
    pub internal_links: Vec<String>,
    #[serde(default)]
    pub external_links: Vec<String>,
    #[serde(default)]
    pub metadata: PageMetadata,
    pub fetched_at: DateTime<Utc>,
    pub size_bytes: usize,
}

impl CrawlArtifact {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            raw_html: String::new(),
            cleaned_html: String::new(),
            markdown: MarkdownBundle::default(),
            structured_data: Vec::new(),
            images: Vec::new(),
            videos: Vec::new(),
            audio: Vec::new(),
            internal_links: Vec::new(),
            external_links: Vec::new(),
            metadata: PageMetadata::default(),
            fetched_at: Utc::now(),
            size_bytes: 0,
        }
    }

    pub fn with_markdown(mut self, primary: impl Into<String>) -> Self {
        let primary = primary.into();
        self.size_bytes += primary.len();
        self.markdown.raw = primary.clone();
        self.markdown.primary_content = primary;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = title.into();
        self
    }

    pub fn with_image(mut self, image: ImageRecord) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_external_link(mut self, link: impl Into<String>) -> Self {
        self.external_links.push(link.into());
        self
    }

    pub fn succeeded(&self) -> bool {
        (200..300).contains(&self.status) && !self.markdown.primary_content.trim().is_empty()
    }

    /// Content richness 0-100: how much usable material this page carried.
    ///
    /// Bands: content presence 40, media 30, metadata 20, structured data 10.
    pub fn content_richness(&self) -> u8 {
        let mut score = 0u8;

        if !self.raw_html.is_empty() {
            score += 10;
        }
        if !self.cleaned_html.is_empty() {
            score += 10;
        }
        if !self.markdown.primary_content.is_empty() {
            score += 10;
        }
        if self.raw_html.len() > 1000 {
            score += 10;
        }

        if !self.images.is_empty() {
            score += 15;
        }
        if !self.videos.is_empty() {
            score += 10;
        }
        if self.images.len() > 5 {
            score += 5;
        }

        if !self.metadata.title.is_empty() {
            score += 5;
        }
        if !self.metadata.description.is_empty() {
            score += 5;
        }
        if !self.metadata.language.is_empty() {
            score += 5;
        }
        if !self.internal_links.is_empty() || !self.external_links.is_empty() {
            score += 5;
        }

        if !self.structured_data.is_empty() {
            score += 10;
        }

        score.min(100)
    }
}

/// A crawl artifact with every image scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredArtifact {
    pub artifact: CrawlArtifact,
    pub scored_images: Vec<ScoredImage>,
    /// Priority rank the URL held when the crawl was planned; used to keep
    /// downstream merges deterministic regardless of completion order.
    pub priority_rank: usize,
}
