use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use procurecast_common::{AgencyId, InsertOutcome, NewSolicitation, RegistryConfig};
use procurecast_store::ProcurementStore;

use crate::error::{ScoutError, ScoutResult};
use crate::stats::HarvestStats;
use crate::throttle::{timeout_error, Throttle};

// --- Registry response types ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, rename = "opportunitiesData")]
    opportunities: Vec<Opportunity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Opportunity {
    #[serde(default, rename = "postedDate")]
    pub posted_date: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "uiLink")]
    pub ui_link: Option<String>,
    #[serde(default, rename = "fullParentPathName")]
    pub full_parent_path_name: Option<String>,
}

/// One page request against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub posted_from: String,
    pub posted_to: String,
    pub code: String,
    pub offset: usize,
    pub limit: usize,
}

/// Where opportunity pages come from.
#[async_trait]
pub trait OpportunitySource: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> ScoutResult<Vec<Opportunity>>;
}

/// The SAM.gov opportunity search API.
pub struct SamGovSource {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    throttle: Arc<Throttle>,
    timeout: Duration,
}

impl SamGovSource {
    pub fn new(
        api_key: &str,
        endpoint: &str,
        throttle: Arc<Throttle>,
        timeout: Duration,
    ) -> ScoutResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
            throttle,
            timeout,
        })
    }
}

#[async_trait]
impl OpportunitySource for SamGovSource {
    async fn fetch_page(&self, query: &PageQuery) -> ScoutResult<Vec<Opportunity>> {
        let endpoint = self.endpoint.as_str();
        let limit = query.limit.to_string();
        let offset = query.offset.to_string();

        self.throttle
            .run(endpoint, || async {
                let resp = self
                    .client
                    .get(endpoint)
                    .query(&[
                        ("api_key", self.api_key.as_str()),
                        ("postedFrom", query.posted_from.as_str()),
                        ("postedTo", query.posted_to.as_str()),
                        ("ncode", query.code.as_str()),
                        ("limit", limit.as_str()),
                        ("offset", offset.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(|e| {
                        if e.is_timeout() {
                            timeout_error(endpoint, self.timeout)
                        } else {
                            ScoutError::Http(e)
                        }
                    })?;
                if !resp.status().is_success() {
                    return Err(ScoutError::Status {
                        url: endpoint.to_string(),
                        status: resp.status().as_u16(),
                    });
                }
                let body: SearchResponse = resp.json().await?;
                Ok(body.opportunities)
            })
            .await
    }
}

/// Calendar years to query, newest first.
pub fn target_years(today: NaiveDate, years: i32) -> Vec<i32> {
    (0..years.max(0)).map(|offset| today.year() - offset).collect()
}

/// `postedFrom` / `postedTo` bounds covering one calendar year.
pub fn year_bounds(year: i32) -> (String, String) {
    (format!("01/01/{year}"), format!("12/31/{year}"))
}

/// Registry dates arrive as `YYYY-MM-DD`, sometimes with a time suffix.
pub fn parse_posted_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

/// Pulls past solicitations from the contract-opportunity registry, one
/// (year, classification code) pagination loop at a time.
pub struct RegistryHarvester {
    store: Arc<dyn ProcurementStore>,
    source: Arc<dyn OpportunitySource>,
    config: RegistryConfig,
}

impl RegistryHarvester {
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        api_key: &str,
        config: RegistryConfig,
        throttle: Arc<Throttle>,
        timeout: Duration,
    ) -> ScoutResult<Self> {
        let source = SamGovSource::new(api_key, &config.endpoint, throttle, timeout)?;
        Ok(Self::with_source(store, Arc::new(source), config))
    }

    pub fn with_source(
        store: Arc<dyn ProcurementStore>,
        source: Arc<dyn OpportunitySource>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    pub async fn run(&self) -> Result<HarvestStats> {
        let years = target_years(Utc::now().date_naive(), self.config.years);
        info!(
            years = ?years,
            codes = ?self.config.naics_codes,
            "Harvesting historical solicitations"
        );

        let mut stats = HarvestStats::default();
        // parent path name -> matched agency, memoised per run
        let mut matches: HashMap<String, Option<AgencyId>> = HashMap::new();

        for year in years {
            for code in &self.config.naics_codes {
                self.harvest_code(year, code, &mut matches, &mut stats).await;
            }
        }

        info!(%stats, "Historical solicitation harvest complete");
        Ok(stats)
    }

    async fn harvest_code(
        &self,
        year: i32,
        code: &str,
        matches: &mut HashMap<String, Option<AgencyId>>,
        stats: &mut HarvestStats,
    ) {
        let (posted_from, posted_to) = year_bounds(year);
        let page_size = self.config.page_size.max(1);
        let mut query = PageQuery {
            posted_from,
            posted_to,
            code: code.to_string(),
            offset: 0,
            limit: page_size,
        };
        loop {
            let offset = query.offset;
            let page = match self.source.fetch_page(&query).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(year, naics = code, offset, error = %e, "Registry page failed, abandoning this code");
                    stats.pages_failed += 1;
                    return;
                }
            };
            stats.pages_fetched += 1;
            let page_len = page.len();
            info!(year, naics = code, offset, count = page_len, "Fetched registry page");

            for opp in page {
                stats.items_found += 1;
                self.store_opportunity(opp, code, matches, stats).await;
            }

            if page_len == 0 || page_len < page_size {
                return;
            }
            query.offset += page_size;
        }
    }

    async fn store_opportunity(
        &self,
        opp: Opportunity,
        code: &str,
        matches: &mut HashMap<String, Option<AgencyId>>,
        stats: &mut HarvestStats,
    ) {
        let (Some(release_date), Some(title), Some(url)) = (
            opp.posted_date.as_deref().and_then(parse_posted_date),
            opp.title.filter(|t| !t.trim().is_empty()),
            opp.ui_link.filter(|u| !u.trim().is_empty()),
        ) else {
            stats.skipped += 1;
            return;
        };

        let parent = opp.full_parent_path_name.unwrap_or_default();
        let agency_id = match matches.get(&parent) {
            Some(hit) => *hit,
            None => {
                let hit = match self.store.find_agency_by_name(&parent).await {
                    Ok(agency) => agency.map(|a| a.agency_id),
                    Err(e) => {
                        warn!(parent = parent.as_str(), error = %e, "Agency match failed");
                        stats.failed += 1;
                        return;
                    }
                };
                matches.insert(parent, hit);
                hit
            }
        };

        let solicitation = NewSolicitation {
            agency_id,
            release_date,
            title,
            url,
            keywords: vec![code.to_string()],
        };
        match self.store.insert_solicitation(&solicitation).await {
            Ok(InsertOutcome::Inserted) => stats.inserted += 1,
            Ok(InsertOutcome::AlreadyPresent) => stats.already_stored += 1,
            Err(e) => {
                warn!(url = solicitation.url.as_str(), error = %e, "Failed to store solicitation");
                stats.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procurecast_common::Agency;
    use procurecast_store::MemoryStore;

    #[test]
    fn years_walk_back_from_today() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(target_years(today, 3), vec![2025, 2024, 2023]);
        assert!(target_years(today, 0).is_empty());
        assert_eq!(year_bounds(2024), ("01/01/2024".to_string(), "12/31/2024".to_string()));
    }

    #[test]
    fn posted_dates_tolerate_time_suffix() {
        let d = NaiveDate::from_ymd_opt(2023, 5, 12).unwrap();
        assert_eq!(parse_posted_date("2023-05-12"), Some(d));
        assert_eq!(parse_posted_date("2023-05-12 10:00:00-04"), Some(d));
        assert_eq!(parse_posted_date("05/12/2023"), Some(d));
        assert_eq!(parse_posted_date("soon"), None);
    }

    #[test]
    fn response_without_data_is_an_empty_page() {
        let body: SearchResponse = serde_json::from_str(r#"{"totalRecords":0}"#).unwrap();
        assert!(body.opportunities.is_empty());
    }

    fn harvester(store: Arc<MemoryStore>) -> RegistryHarvester {
        RegistryHarvester::new(
            store,
            "test-key",
            RegistryConfig::default(),
            Arc::new(Throttle::unthrottled()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn opportunity(parent: Option<&str>, url: Option<&str>) -> Opportunity {
        Opportunity {
            posted_date: Some("2022-09-01".into()),
            title: Some("Adaptive signal control".into()),
            ui_link: url.map(str::to_string),
            full_parent_path_name: parent.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn opportunities_match_agencies_or_store_unmatched() {
        let store = Arc::new(MemoryStore::new());
        store.add_agency(Agency::new(1, "DEPT OF TRANSPORTATION.FEDERAL HIGHWAY ADMINISTRATION"));
        let h = harvester(store.clone());
        let mut matches = HashMap::new();
        let mut stats = HarvestStats::default();

        h.store_opportunity(
            opportunity(Some("federal highway"), Some("https://sam.gov/opp/1")),
            "541512",
            &mut matches,
            &mut stats,
        )
        .await;
        h.store_opportunity(opportunity(Some("NASA"), Some("https://sam.gov/opp/2")), "541330", &mut matches, &mut stats)
            .await;
        h.store_opportunity(opportunity(None, Some("https://sam.gov/opp/3")), "541330", &mut matches, &mut stats)
            .await;
        h.store_opportunity(opportunity(Some("NASA"), None), "541330", &mut matches, &mut stats)
            .await;
        // same URL under another code
        h.store_opportunity(
            opportunity(Some("federal highway"), Some("https://sam.gov/opp/1")),
            "334511",
            &mut matches,
            &mut stats,
        )
        .await;

        let stored = store.solicitations();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].agency_id, Some(1));
        assert_eq!(stored[0].keywords, vec!["541512".to_string()]);
        assert_eq!(stored[1].agency_id, None);
        assert_eq!(stored[2].agency_id, None);
        assert_eq!(stats.inserted, 3);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.already_stored, 1);
    }

    #[tokio::test]
    async fn failed_pages_abort_only_their_own_loop() {
        let store = Arc::new(MemoryStore::new());
        let mut config = RegistryConfig::default();
        config.endpoint = "http://127.0.0.1:9/opportunities/v2/search".into();
        config.years = 2;
        let h = RegistryHarvester::new(
            store,
            "test-key",
            config,
            Arc::new(Throttle::unthrottled()),
            Duration::from_secs(2),
        )
        .unwrap();

        let stats = h.run().await.unwrap();
        // 2 years x 4 codes, each loop tried once and abandoned
        assert_eq!(stats.pages_failed, 8);
        assert_eq!(stats.pages_fetched, 0);
    }
}
