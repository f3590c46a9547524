use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use procurecast_common::{
    Agency, AgencyId, Attempt, DocumentType, FetcherKind, InsertOutcome, NewDocument, SelectorOverride,
    SelectorOverrides,
};
use procurecast_store::ProcurementStore;

use crate::fetch::PageFetcher;
use crate::links::{select_items, LinkFinder, PageMarkup};
use crate::pdf::extract_pdf_text;
use crate::stats::HarvestStats;
use crate::throttle::Throttle;

/// A listing page to harvest and the type given to what it links to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePage {
    pub url: String,
    pub document_type: DocumentType,
}

/// Pages to visit for `agency`. An override procurement URL replaces the
/// stored planning and minutes pages entirely.
pub fn source_pages(agency: &Agency, rule: Option<&SelectorOverride>) -> Vec<SourcePage> {
    if let Some(url) = rule.and_then(|r| r.procurement_url.as_deref()) {
        return vec![SourcePage {
            url: url.to_string(),
            document_type: DocumentType::Solicitation,
        }];
    }

    let mut pages = Vec::new();
    if let Some(url) = agency.planning_url.as_deref().filter(|u| !u.trim().is_empty()) {
        pages.push(SourcePage {
            url: url.to_string(),
            document_type: DocumentType::PlanningDocument,
        });
    }
    if let Some(url) = agency.minutes_url.as_deref().filter(|u| !u.trim().is_empty()) {
        pages.push(SourcePage {
            url: url.to_string(),
            document_type: DocumentType::MeetingMinutes,
        });
    }
    pages
}

/// Harvests agency listing pages into `documents`.
///
/// Agencies run concurrently up to `concurrency`; within an agency pages and
/// links are visited in order so per-host spacing stays meaningful. Any
/// per-page or per-link failure is counted and logged, never propagated.
pub struct DocumentHarvester {
    store: Arc<dyn ProcurementStore>,
    browser: Arc<dyn PageFetcher>,
    http: Arc<dyn PageFetcher>,
    link_finder: Arc<LinkFinder>,
    overrides: SelectorOverrides,
    throttle: Arc<Throttle>,
    concurrency: usize,
}

impl DocumentHarvester {
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        browser: Arc<dyn PageFetcher>,
        http: Arc<dyn PageFetcher>,
        link_finder: Arc<LinkFinder>,
        throttle: Arc<Throttle>,
    ) -> Self {
        Self {
            store,
            browser,
            http,
            link_finder,
            overrides: SelectorOverrides::default(),
            throttle,
            concurrency: 4,
        }
    }

    pub fn with_overrides(mut self, overrides: SelectorOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Harvest the given agencies, or every agency when `targets` is `None`.
    pub async fn run(&self, targets: Option<&[AgencyId]>) -> Result<HarvestStats> {
        let agencies = self
            .store
            .agencies(targets)
            .await
            .context("Failed to load target agencies")?;
        info!(
            agencies = agencies.len(),
            overrides = self.overrides.len(),
            link_finder = self.link_finder.name(),
            "Harvesting agency documents"
        );

        let stats = stream::iter(agencies)
            .map(|agency| async move { self.harvest_agency(&agency).await })
            .buffer_unordered(self.concurrency)
            .fold(HarvestStats::default(), |mut total, stats| async move {
                total += stats;
                total
            })
            .await;

        info!(%stats, "Document harvest complete");
        Ok(stats)
    }

    async fn harvest_agency(&self, agency: &Agency) -> HarvestStats {
        let mut stats = HarvestStats {
            agencies: 1,
            ..Default::default()
        };
        let rule = self.overrides.get(&agency.name);
        let pages = source_pages(agency, rule);
        if pages.is_empty() {
            info!(agency = agency.name.as_str(), "No source pages configured");
            return stats;
        }

        let fetcher = match rule.map(|r| r.fetcher) {
            Some(FetcherKind::Http) => &self.http,
            _ => &self.browser,
        };

        for page in &pages {
            info!(
                agency = agency.name.as_str(),
                url = page.url.as_str(),
                document_type = %page.document_type,
                fetcher = fetcher.name(),
                "Checking page"
            );
            let html = match self.throttle.run(&page.url, || fetcher.page(&page.url)).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(agency = agency.name.as_str(), url = page.url.as_str(), error = %e, "Failed to fetch page");
                    stats.pages_failed += 1;
                    continue;
                }
            };
            stats.pages_fetched += 1;

            match rule.and_then(|r| r.item_selector.as_deref()) {
                Some(selector) => {
                    self.harvest_listed_items(agency, page, &html, selector, &mut stats)
                        .await
                }
                None => {
                    self.harvest_linked_documents(agency, page, html, fetcher.as_ref(), &mut stats)
                        .await
                }
            }
        }
        stats
    }

    /// Custom-selector path: one lightweight record per listed item.
    async fn harvest_listed_items(
        &self,
        agency: &Agency,
        page: &SourcePage,
        html: &str,
        selector: &str,
        stats: &mut HarvestStats,
    ) {
        let items = match select_items(html, &page.url, selector) {
            Ok(items) => items,
            Err(e) => {
                warn!(agency = agency.name.as_str(), url = page.url.as_str(), error = %e, "Item selection failed");
                stats.failed += 1;
                return;
            }
        };
        info!(url = page.url.as_str(), selector, count = items.len(), "Found listed items");

        for item in items {
            stats.items_found += 1;
            let doc = new_document(agency.agency_id, page.document_type, &item.url, Some(item.placeholder_text()));
            self.persist(&doc, stats).await;
        }
    }

    /// Default path: discover document links, download, extract text.
    async fn harvest_linked_documents(
        &self,
        agency: &Agency,
        page: &SourcePage,
        html: String,
        fetcher: &dyn PageFetcher,
        stats: &mut HarvestStats,
    ) {
        let markup = PageMarkup::new(page.url.clone(), html);
        let links = match self.link_finder.attempt(&markup).await {
            Ok(links) => links,
            Err(e) => {
                warn!(url = page.url.as_str(), finder = self.link_finder.name(), error = %e, "Link discovery failed");
                stats.failed += 1;
                return;
            }
        };
        info!(url = page.url.as_str(), count = links.len(), "Found links to process");

        for link in links {
            stats.items_found += 1;
            match self.store.document_exists(&link).await {
                Ok(true) => {
                    stats.already_stored += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(url = link.as_str(), error = %e, "Existence check failed");
                    stats.failed += 1;
                    continue;
                }
            }

            let resource = match self.throttle.run(&link, || fetcher.resource(&link)).await {
                Ok(resource) => resource,
                Err(e) => {
                    warn!(url = link.as_str(), error = %e, "Failed to download document");
                    stats.failed += 1;
                    continue;
                }
            };
            if !resource.is_pdf() {
                info!(url = link.as_str(), content_type = ?resource.content_type, "Skipping non-PDF link");
                stats.skipped += 1;
                continue;
            }

            let Some(text) = extract_pdf_text(resource.body).await else {
                warn!(url = link.as_str(), "No text extracted, not storing");
                stats.skipped += 1;
                continue;
            };
            let doc = new_document(agency.agency_id, page.document_type, &link, Some(text));
            self.persist(&doc, stats).await;
        }
    }

    async fn persist(&self, doc: &NewDocument, stats: &mut HarvestStats) {
        match self.store.insert_document(doc).await {
            Ok(InsertOutcome::Inserted) => {
                info!(url = doc.url.as_str(), document_type = %doc.document_type, "Stored document");
                stats.inserted += 1;
            }
            Ok(InsertOutcome::AlreadyPresent) => stats.already_stored += 1,
            Err(e) => {
                warn!(url = doc.url.as_str(), error = %e, "Failed to store document");
                stats.failed += 1;
            }
        }
    }
}

fn new_document(
    agency_id: AgencyId,
    document_type: DocumentType,
    url: &str,
    raw_text: Option<String>,
) -> NewDocument {
    let now = Utc::now();
    NewDocument {
        agency_id,
        document_type,
        url: url.to_string(),
        raw_text,
        scraped_at: now,
        publication_date: now.date_naive(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(procurement_url: Option<&str>) -> SelectorOverride {
        SelectorOverride {
            item_selector: Some("a.bid".into()),
            procurement_url: procurement_url.map(str::to_string),
            fetcher: FetcherKind::Browser,
        }
    }

    #[test]
    fn stored_pages_are_used_without_override() {
        let agency = Agency::new(1, "Capital Area MPO")
            .with_planning_url("https://campo.example.gov/plans")
            .with_minutes_url("https://campo.example.gov/minutes");
        let pages = source_pages(&agency, None);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].document_type, DocumentType::PlanningDocument);
        assert_eq!(pages[1].document_type, DocumentType::MeetingMinutes);
    }

    #[test]
    fn override_procurement_url_is_exclusive() {
        let agency = Agency::new(2, "METRO (Houston)").with_planning_url("https://metro.example/plans");
        let r = rule(Some("https://metro.example/bids"));
        let pages = source_pages(&agency, Some(&r));
        assert_eq!(
            pages,
            vec![SourcePage {
                url: "https://metro.example/bids".into(),
                document_type: DocumentType::Solicitation,
            }]
        );
    }

    #[test]
    fn override_without_url_keeps_stored_pages() {
        let agency = Agency::new(3, "Port Authority").with_minutes_url("https://port.example/minutes");
        let r = rule(None);
        let pages = source_pages(&agency, Some(&r));
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].document_type, DocumentType::MeetingMinutes);
    }

    #[test]
    fn agency_without_pages_has_nothing_to_visit() {
        assert!(source_pages(&Agency::new(4, "Quiet County"), None).is_empty());
    }
}
