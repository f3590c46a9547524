// Test doubles for the harvesting seams.
//
// MockFetcher serves canned pages and resources keyed by URL and records
// every request, so tests can assert that stored URLs are never fetched.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use procurecast_common::Attempt;

use crate::error::{ScoutError, ScoutResult};
use crate::fetch::{PageFetcher, Resource};
use crate::links::PageMarkup;
use crate::solicitations::{Opportunity, OpportunitySource, PageQuery};

#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    resources: HashMap<String, Resource>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn on_resource(mut self, url: &str, content_type: &str, body: &[u8]) -> Self {
        self.resources.insert(
            url.to_string(),
            Resource {
                url: url.to_string(),
                content_type: Some(content_type.to_string()),
                body: body.to_vec(),
            },
        );
        self
    }

    /// Every URL requested so far, pages and resources, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    fn record(&self, url: &str) {
        self.requests.lock().unwrap().push(url.to_string());
    }

    fn not_found(url: &str) -> ScoutError {
        ScoutError::Status {
            url: url.to_string(),
            status: 404,
        }
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn page(&self, url: &str) -> ScoutResult<String> {
        self.record(url);
        self.pages.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    async fn resource(&self, url: &str) -> ScoutResult<Resource> {
        self.record(url);
        self.resources.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Link finder that returns the same URLs for every page.
pub struct FixedLinkFinder {
    urls: Vec<String>,
}

impl FixedLinkFinder {
    pub fn new(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Attempt<PageMarkup> for FixedLinkFinder {
    type Output = Vec<String>;

    async fn attempt(&self, _page: &PageMarkup) -> Result<Vec<String>> {
        Ok(self.urls.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Link finder standing in for an unreachable model endpoint.
pub struct FailingLinkFinder;

#[async_trait]
impl Attempt<PageMarkup> for FailingLinkFinder {
    type Output = Vec<String>;

    async fn attempt(&self, page: &PageMarkup) -> Result<Vec<String>> {
        anyhow::bail!("model endpoint unreachable while reading {}", page.url)
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Registry pages keyed by (classification code, offset). Unscripted
/// offsets are empty pages; failing codes answer with HTTP 500.
#[derive(Default)]
pub struct ScriptedRegistry {
    pages: HashMap<(String, usize), Vec<Opportunity>>,
    failing: HashSet<String>,
    queries: Mutex<Vec<PageQuery>>,
}

impl ScriptedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, code: &str, offset: usize, page: Vec<Opportunity>) -> Self {
        self.pages.insert((code.to_string(), offset), page);
        self
    }

    pub fn failing(mut self, code: &str) -> Self {
        self.failing.insert(code.to_string());
        self
    }

    pub fn queries(&self) -> Vec<PageQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl OpportunitySource for ScriptedRegistry {
    async fn fetch_page(&self, query: &PageQuery) -> ScoutResult<Vec<Opportunity>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.failing.contains(&query.code) {
            return Err(ScoutError::Status {
                url: format!("https://registry.test/search?ncode={}", query.code),
                status: 500,
            });
        }
        Ok(self
            .pages
            .get(&(query.code.clone(), query.offset))
            .cloned()
            .unwrap_or_default())
    }
}

/// A registry record with every field the harvester needs.
pub fn opportunity(parent: &str, posted: &str, url: &str) -> Opportunity {
    Opportunity {
        posted_date: Some(posted.to_string()),
        title: Some("Adaptive signal control".to_string()),
        ui_link: Some(url.to_string()),
        full_parent_path_name: Some(parent.to_string()),
    }
}
