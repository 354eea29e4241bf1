//! Static-HTML crawler engine: reqwest + scraper + htmd.
//!
//! Fetches a page over plain HTTP and builds the full artifact bundle:
//! raw and cleaned HTML, markdown, JSON-LD, images with DOM locations,
//! internal/external link lists. No JavaScript rendering; sites that need a
//! browser should be served by a headless engine behind the same trait.

use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ProfileError, Result};
use crate::traits::crawler::{CrawlerEngine, FetchOptions};
use crate::types::artifact::{CrawlArtifact, DomLocation, ImageRecord};

/// Plain-HTTP crawler engine.
pub struct HttpCrawlerEngine {
    client: reqwest::Client,
}

impl HttpCrawlerEngine {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("profiler-crawler/0.1")
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ProfileError::Crawl(Box::new(e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn extract_title(document: &Html) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    fn extract_meta(document: &Html, name: &str) -> String {
        let Ok(selector) = Selector::parse(&format!("meta[name='{name}']")) else {
            return String::new();
        };
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .unwrap_or_default()
            .to_string()
    }

    fn extract_language(document: &Html) -> String {
        let Ok(selector) = Selector::parse("html") else {
            return String::new();
        };
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("lang"))
            .unwrap_or_default()
            .to_string()
    }

    /// Main content HTML, falling back through common content selectors.
    fn extract_main_content(document: &Html) -> String {
        let main_selectors = ["main", "article", "[role='main']", "#content", ".content"];
        for selector_str in main_selectors {
            if let Ok(selector) = Selector::parse(selector_str) {
                if let Some(main) = document.select(&selector).next() {
                    return main.html();
                }
            }
        }
        if let Ok(body) = Selector::parse("body") {
            if let Some(body) = document.select(&body).next() {
                return body.html();
            }
        }
        document.html()
    }

    fn html_to_markdown(html: &str) -> String {
        htmd::convert(html).unwrap_or_else(|_| {
            Html::parse_document(html)
                .root_element()
                .text()
                .collect::<String>()
        })
    }

    /// Classify where in the DOM an element sits by walking its ancestors.
    fn dom_location(element: ElementRef<'_>) -> DomLocation {
        let mut node = element.parent();
        while let Some(current) = node {
            if let Some(ancestor) = ElementRef::wrap(current) {
                match ancestor.value().name() {
                    "header" => return DomLocation::Header,
                    "h1" | "hgroup" => return DomLocation::NearTitle,
                    "nav" => return DomLocation::Header,
                    "footer" => return DomLocation::Footer,
                    "aside" => return DomLocation::Sidebar,
                    "main" | "article" => return DomLocation::MainContent,
                    _ => {}
                }
            }
            node = current.parent();
        }
        DomLocation::Unknown
    }

    fn parse_dimension(value: Option<&str>) -> Option<u32> {
        value?.trim().trim_end_matches("px").parse().ok()
    }

    fn extract_images(document: &Html, base: &Url) -> Vec<ImageRecord> {
        let Ok(selector) = Selector::parse("img[src]") else {
            return Vec::new();
        };

        document
            .select(&selector)
            .filter_map(|el| {
                let src = el.value().attr("src")?;
                let resolved = base.join(src).map(|u| u.to_string()).unwrap_or_else(|_| src.to_string());
                let context = el
                    .parent()
                    .and_then(ElementRef::wrap)
                    .map(|p| p.text().collect::<String>())
                    .unwrap_or_default();
                Some(ImageRecord {
                    src: resolved,
                    alt: el.value().attr("alt").unwrap_or_default().to_string(),
                    width: Self::parse_dimension(el.value().attr("width")),
                    height: Self::parse_dimension(el.value().attr("height")),
                    context_snippet: context.split_whitespace().take(30).collect::<Vec<_>>().join(" "),
                    dom_location: Self::dom_location(el),
                })
            })
            .collect()
    }

    fn extract_links(document: &Html, base: &Url) -> (Vec<String>, Vec<String>) {
        let Ok(selector) = Selector::parse("a[href]") else {
            return (Vec::new(), Vec::new());
        };
        let base_domain = base.domain().unwrap_or("");

        let mut internal = Vec::new();
        let mut external = Vec::new();
        for href in document
            .select(&selector)
            .filter_map(|el| el.value().attr("href"))
        {
            let Ok(resolved) = base.join(href) else { continue };
            if resolved.scheme() != "http" && resolved.scheme() != "https" {
                continue;
            }
            let link = resolved.to_string();
            if resolved.domain() == Some(base_domain) {
                if !internal.contains(&link) {
                    internal.push(link);
                }
            } else if !external.contains(&link) {
                external.push(link);
            }
        }
        (internal, external)
    }

    fn extract_json_ld(document: &Html) -> Vec<serde_json::Value> {
        let Ok(selector) = Selector::parse("script[type='application/ld+json']") else {
            return Vec::new();
        };
        document
            .select(&selector)
            .filter_map(|el| {
                let text = el.text().collect::<String>();
                serde_json::from_str(&text).ok()
            })
            .collect()
    }

    /// Build an artifact from already-fetched HTML.
    fn build_artifact(url: &str, status: u16, html: String) -> CrawlArtifact {
        let document = Html::parse_document(&html);
        let base = Url::parse(url).unwrap_or_else(|_| {
            Url::parse("https://invalid.invalid/").expect("static URL parses")
        });

        let cleaned = Self::extract_main_content(&document);
        let raw_markdown = Self::html_to_markdown(&html);
        let primary = Self::html_to_markdown(&cleaned);
        let (internal_links, external_links) = Self::extract_links(&document, &base);

        let mut artifact = CrawlArtifact::new(url);
        artifact.status = status;
        artifact.size_bytes = html.len();
        artifact.metadata.title = Self::extract_title(&document).unwrap_or_default();
        artifact.metadata.description = Self::extract_meta(&document, "description");
        artifact.metadata.language = Self::extract_language(&document);
        artifact.images = Self::extract_images(&document, &base);
        artifact.structured_data = Self::extract_json_ld(&document);
        artifact.internal_links = internal_links;
        artifact.external_links = external_links;
        artifact.markdown.raw = raw_markdown;
        artifact.markdown.fit = primary.clone();
        artifact.markdown.primary_content = primary;
        artifact.cleaned_html = cleaned;
        artifact.raw_html = html;
        artifact.fetched_at = Utc::now();
        artifact
    }
}

#[async_trait]
impl CrawlerEngine for HttpCrawlerEngine {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<CrawlArtifact> {
        debug!(url, "Fetching page");
        let response = self
            .client
            .get(url)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| ProfileError::Crawl(Box::new(e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            warn!(url, status, "Non-success fetch");
        }
        let html = response
            .text()
            .await
            .map_err(|e| ProfileError::Crawl(Box::new(e)))?;

        Ok(Self::build_artifact(url, status, html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<html lang="en"><head>
        <title>Example University</title>
        <meta name="description" content="A research university.">
        <script type="application/ld+json">{"@type": "CollegeOrUniversity", "name": "Example University"}</script>
        </head><body>
        <header><img src="/assets/logo.png" alt="Example University logo" width="120" height="80"></header>
        <main><h2>About</h2><p>Founded in 1891.</p>
        <img src="/media/campus.jpg" alt="campus aerial" width="1200" height="800">
        <a href="/about">About us</a>
        <a href="https://facebook.com/example">Facebook</a></main>
        <footer><a href="/contact">Contact</a></footer>
        </body></html>"#;

    fn artifact() -> CrawlArtifact {
        HttpCrawlerEngine::build_artifact("https://example.edu/", 200, SAMPLE.to_string())
    }

    #[test]
    fn builds_metadata_and_markdown() {
        let artifact = artifact();
        assert_eq!(artifact.metadata.title, "Example University");
        assert_eq!(artifact.metadata.description, "A research university.");
        assert_eq!(artifact.metadata.language, "en");
        assert!(artifact.markdown.primary_content.contains("Founded in 1891"));
        assert!(artifact.succeeded());
    }

    #[test]
    fn images_carry_dimensions_and_dom_location() {
        let artifact = artifact();
        assert_eq!(artifact.images.len(), 2);

        let logo = &artifact.images[0];
        assert!(logo.src.ends_with("/assets/logo.png"));
        assert_eq!(logo.width, Some(120));
        assert_eq!(logo.dom_location, DomLocation::Header);

        let campus = &artifact.images[1];
        assert_eq!(campus.dom_location, DomLocation::MainContent);
    }

    #[test]
    fn links_split_internal_external() {
        let artifact = artifact();
        assert!(artifact
            .internal_links
            .iter()
            .any(|l| l.ends_with("/about")));
        assert!(artifact
            .external_links
            .iter()
            .any(|l| l.contains("facebook.com")));
    }

    #[test]
    fn json_ld_is_parsed() {
        let artifact = artifact();
        assert_eq!(artifact.structured_data.len(), 1);
        assert_eq!(
            artifact.structured_data[0]["@type"],
            "CollegeOrUniversity"
        );
    }

    #[test]
    fn dimension_parsing_tolerates_px_suffix() {
        assert_eq!(HttpCrawlerEngine::parse_dimension(Some("120px")), Some(120));
        assert_eq!(HttpCrawlerEngine::parse_dimension(Some("bad")), None);
        assert_eq!(HttpCrawlerEngine::parse_dimension(None), None);
    }
}
