//! Link discovery on agency listing pages.
//!
//! Two interchangeable finders turn page markup into candidate document
//! URLs: `ExtensionLinkFinder` (anchors by file extension) and
//! `AssistedLinkFinder` (a local model classifies the links). The harvester
//! holds either as `Arc<LinkFinder>`. Agencies with a CSS selector override
//! skip both and go through `select_items`.

use std::collections::HashSet;
use std::sync::LazyLock;

use ai_client::util::truncate_to_char_boundary;
use ai_client::Ollama;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;
use url::Url;

use procurecast_common::Attempt;

use crate::error::{ScoutError, ScoutResult};

/// Markup larger than this is cut before it goes into a prompt.
const MAX_PROMPT_MARKUP_BYTES: usize = 60_000;

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("valid href regex"));

/// A fetched listing page.
#[derive(Debug, Clone)]
pub struct PageMarkup {
    pub url: String,
    pub html: String,
}

impl PageMarkup {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// Any strategy mapping a page to candidate document URLs.
pub type LinkFinder = dyn Attempt<PageMarkup, Output = Vec<String>>;

/// Resolve `href` against `base`, keeping only http(s) targets and dropping
/// the fragment.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Every `href` in `html` resolved against `base_url` that satisfies
/// `keep`, deduplicated in page order.
pub fn extract_links<F>(html: &str, base_url: &str, keep: F) -> Vec<String>
where
    F: Fn(&Url) -> bool,
{
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    HREF_RE
        .captures_iter(html)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| resolve_link(&base, m.as_str()))
        .filter(|u| keep(u))
        .map(String::from)
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

// --- Deterministic finder ---

/// Anchors whose target path ends in one of the given extensions.
pub struct ExtensionLinkFinder {
    extensions: Vec<String>,
}

impl ExtensionLinkFinder {
    pub fn new(extensions: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    pub fn pdf() -> Self {
        Self::new(&[".pdf"])
    }

    pub fn find(&self, page: &PageMarkup) -> Vec<String> {
        extract_links(&page.html, &page.url, |u| {
            let path = u.path().to_ascii_lowercase();
            self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
        })
    }
}

#[async_trait]
impl Attempt<PageMarkup> for ExtensionLinkFinder {
    type Output = Vec<String>;

    async fn attempt(&self, page: &PageMarkup) -> Result<Vec<String>> {
        Ok(self.find(page))
    }

    fn name(&self) -> &str {
        "extension"
    }
}

// --- Model-assisted finder ---

#[derive(Debug, Deserialize, JsonSchema)]
struct DocumentLinks {
    /// Absolute URLs of linked planning documents.
    #[serde(default)]
    document_urls: Vec<String>,
}

/// Hands the page markup to a local model and asks which links lead to
/// planning documents.
pub struct AssistedLinkFinder {
    ollama: Ollama,
}

impl AssistedLinkFinder {
    pub fn new(ollama: Ollama) -> Self {
        info!(model = ollama.model(), "Using model-assisted link discovery");
        Self { ollama }
    }

    fn prompt(html: &str) -> String {
        format!(
            "You are an expert web scraping assistant. Analyze the following HTML content and \
identify all hyperlinks (`<a>` tags) that likely lead to transportation planning documents. \
These documents might be called 'Metropolitan Transportation Plan', 'Transportation Improvement \
Program', 'Long-Range Plan', 'Meeting Minutes', 'Agendas', 'ITS Architecture', or similar.\n\n\
Return ONLY a JSON object with a single key \"document_urls\", where the value is a list of the \
full, absolute URLs. Do not include duplicates. If no relevant documents are found, return an \
empty list.\n\nHTML Content:\n```html\n{}\n```",
            truncate_to_char_boundary(html, MAX_PROMPT_MARKUP_BYTES)
        )
    }
}

/// Resolve model-returned URLs against the page, dropping junk and repeats.
pub fn normalize_candidates(page_url: &str, candidates: &[String]) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter_map(|c| resolve_link(&base, c))
        .map(String::from)
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

#[async_trait]
impl Attempt<PageMarkup> for AssistedLinkFinder {
    type Output = Vec<String>;

    async fn attempt(&self, page: &PageMarkup) -> Result<Vec<String>> {
        let links: DocumentLinks = self
            .ollama
            .extract(&Self::prompt(&page.html))
            .await
            .context("Link classification request failed")?;
        let urls = normalize_candidates(&page.url, &links.document_urls);
        info!(url = page.url.as_str(), count = urls.len(), "Model identified document links");
        Ok(urls)
    }

    fn name(&self) -> &str {
        "assisted"
    }
}

// --- Selector override path ---

/// One entry matched by an agency's item selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedItem {
    pub title: String,
    pub url: String,
}

impl ListedItem {
    /// Stand-in document body for link-only discovery.
    pub fn placeholder_text(&self) -> String {
        format!("Title: {}\nURL: {}", self.title, self.url)
    }
}

/// Elements matching `selector` that carry a link, either on the element
/// itself or on its first descendant anchor.
pub fn select_items(html: &str, base_url: &str, selector: &str) -> ScoutResult<Vec<ListedItem>> {
    let item_selector =
        scraper::Selector::parse(selector).map_err(|_| ScoutError::Selector(selector.to_string()))?;
    let anchor = scraper::Selector::parse("a[href]")
        .map_err(|_| ScoutError::Selector("a[href]".to_string()))?;
    let base = Url::parse(base_url).map_err(|e| ScoutError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;

    let doc = scraper::Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for element in doc.select(&item_selector) {
        let href = element
            .value()
            .attr("href")
            .or_else(|| element.select(&anchor).next().and_then(|a| a.value().attr("href")));
        let Some(url) = href.and_then(|h| resolve_link(&base, h)) else {
            continue;
        };
        let url = String::from(url);
        if !seen.insert(url.clone()) {
            continue;
        }
        let title = element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        items.push(ListedItem { title, url });
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLANNING_PAGE: &str = r##"
        <html><body>
          <a href="/docs/MTP-2045.PDF">Metropolitan Transportation Plan</a>
          <a href="tip/2024-tip.pdf#page=3">TIP</a>
          <a href='https://cdn.example.gov/minutes/jan.pdf'>January minutes</a>
          <a href="/docs/MTP-2045.PDF">Duplicate link</a>
          <a href="/about.html">About</a>
          <a href="mailto:info@example.gov">Contact</a>
          <a href="#top">Top</a>
        </body></html>
    "##;

    #[test]
    fn extension_finder_resolves_and_dedups_pdf_links() {
        let page = PageMarkup::new("https://www.example.gov/planning/", PLANNING_PAGE);
        let links = ExtensionLinkFinder::pdf().find(&page);
        assert_eq!(
            links,
            vec![
                "https://www.example.gov/docs/MTP-2045.PDF",
                "https://www.example.gov/planning/tip/2024-tip.pdf",
                "https://cdn.example.gov/minutes/jan.pdf",
            ]
        );
    }

    #[tokio::test]
    async fn extension_finder_is_an_attempt() {
        let finder: Box<LinkFinder> = Box::new(ExtensionLinkFinder::pdf());
        let page = PageMarkup::new("https://www.example.gov/", PLANNING_PAGE);
        assert_eq!(finder.attempt(&page).await.unwrap().len(), 3);
        assert_eq!(finder.name(), "extension");
    }

    #[test]
    fn model_candidates_are_resolved_and_filtered() {
        let urls = normalize_candidates(
            "https://www.example.gov/planning/index.html",
            &[
                "docs/plan.pdf".to_string(),
                "https://www.example.gov/planning/docs/plan.pdf".to_string(),
                "ftp://files.example.gov/a.pdf".to_string(),
                "".to_string(),
            ],
        );
        assert_eq!(urls, vec!["https://www.example.gov/planning/docs/plan.pdf"]);
    }

    #[test]
    fn prompt_caps_markup_size() {
        let huge = "x".repeat(MAX_PROMPT_MARKUP_BYTES * 2);
        let prompt = AssistedLinkFinder::prompt(&huge);
        assert!(prompt.len() < MAX_PROMPT_MARKUP_BYTES + 2_000);
        assert!(prompt.contains("document_urls"));
    }

    #[test]
    fn selector_items_take_href_from_element_or_child_anchor() {
        let html = r#"
            <table>
              <tr class="bid"><td><a href="/bids/101">Signal Timing Services</a></td></tr>
              <tr class="bid"><td><a href="/bids/102"> Smart Corridor
                  Design </a></td></tr>
              <tr class="bid"><td>No link yet</td></tr>
            </table>
            <a class="direct" href="https://bids.example.gov/103">Direct</a>
        "#;
        let items = select_items(html, "https://www.ridemetro.example/procurement", "tr.bid").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://www.ridemetro.example/bids/101");
        assert_eq!(items[0].title, "Signal Timing Services");
        assert_eq!(items[1].title, "Smart Corridor Design");

        let direct = select_items(html, "https://www.ridemetro.example/", "a.direct").unwrap();
        assert_eq!(direct[0].url, "https://bids.example.gov/103");
        assert_eq!(
            direct[0].placeholder_text(),
            "Title: Direct\nURL: https://bids.example.gov/103"
        );
    }

    #[test]
    fn bad_selector_is_reported() {
        let err = select_items("<p></p>", "https://www.example.gov/", "tr[").unwrap_err();
        assert!(matches!(err, ScoutError::Selector(_)));
    }
}
