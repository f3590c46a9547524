use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use procurecast_common::{Agency, AgencyId, InsertOutcome, NewNewsArticle, NewsConfig};
use procurecast_store::ProcurementStore;

use crate::error::{ScoutError, ScoutResult};
use crate::stats::HarvestStats;
use crate::throttle::{timeout_error, Throttle};

// --- NewsAPI response types ---

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    source: Option<ArticleSource>,
    #[serde(default, rename = "publishedAt")]
    published_at: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    #[serde(default)]
    name: Option<String>,
}

/// Search phrase for an agency: its exact name plus the domain terms.
pub fn news_query(agency_name: &str) -> String {
    format!("\"{agency_name}\" AND (transportation OR transit OR procurement)")
}

fn to_article(agency_id: AgencyId, article: Article) -> Option<NewNewsArticle> {
    let article_url = article.url.filter(|u| !u.trim().is_empty())?;
    Some(NewNewsArticle {
        agency_id,
        article_url,
        title: article.title.unwrap_or_default(),
        source_name: article.source.and_then(|s| s.name),
        published_at: article
            .published_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc)),
        content: article.description,
    })
}

/// Pulls recent articles mentioning each agency from an article-search API.
pub struct NewsHarvester {
    store: Arc<dyn ProcurementStore>,
    client: reqwest::Client,
    api_key: String,
    config: NewsConfig,
    throttle: Arc<Throttle>,
    timeout: Duration,
    concurrency: usize,
}

impl NewsHarvester {
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        api_key: &str,
        config: NewsConfig,
        throttle: Arc<Throttle>,
        timeout: Duration,
    ) -> ScoutResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            store,
            client,
            api_key: api_key.to_string(),
            config,
            throttle,
            timeout,
            concurrency: 2,
        })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Harvest news for `targets`, or for a random sample of agencies.
    pub async fn run(&self, targets: Option<&[AgencyId]>) -> Result<HarvestStats> {
        let agencies = match targets {
            Some(ids) => self.store.agencies(Some(ids)).await,
            None => self.store.sample_agencies(self.config.sample_size).await,
        }
        .context("Failed to load agencies for news search")?;

        let from = (Utc::now() - chrono::Duration::days(self.config.window_days)).date_naive();
        info!(agencies = agencies.len(), %from, "Harvesting news articles");

        let stats = stream::iter(agencies)
            .map(|agency| async move { self.harvest_agency(&agency, from).await })
            .buffer_unordered(self.concurrency)
            .fold(HarvestStats::default(), |mut total, stats| async move {
                total += stats;
                total
            })
            .await;

        info!(%stats, "News harvest complete");
        Ok(stats)
    }

    async fn harvest_agency(&self, agency: &Agency, from: NaiveDate) -> HarvestStats {
        let mut stats = HarvestStats {
            agencies: 1,
            ..Default::default()
        };

        let articles = match self.search(&agency.name, from).await {
            Ok(articles) => {
                stats.pages_fetched += 1;
                articles
            }
            Err(e) => {
                warn!(agency = agency.name.as_str(), error = %e, "News search failed");
                stats.pages_failed += 1;
                return stats;
            }
        };

        for article in articles.into_iter().take(self.config.per_agency_limit) {
            stats.items_found += 1;
            let Some(article) = to_article(agency.agency_id, article) else {
                stats.skipped += 1;
                continue;
            };
            match self.store.insert_news_article(&article).await {
                Ok(InsertOutcome::Inserted) => stats.inserted += 1,
                Ok(InsertOutcome::AlreadyPresent) => stats.already_stored += 1,
                Err(e) => {
                    warn!(url = article.article_url.as_str(), error = %e, "Failed to store article");
                    stats.failed += 1;
                }
            }
        }
        info!(agency = agency.name.as_str(), inserted = stats.inserted, "News stored");
        stats
    }

    async fn search(&self, agency_name: &str, from: NaiveDate) -> ScoutResult<Vec<Article>> {
        let query = news_query(agency_name);
        let from = from.format("%Y-%m-%d").to_string();
        let endpoint = self.config.endpoint.as_str();

        self.throttle
            .run(endpoint, || async {
                let resp = self
                    .client
                    .get(endpoint)
                    .query(&[
                        ("q", query.as_str()),
                        ("from", from.as_str()),
                        ("sortBy", "relevancy"),
                        ("apiKey", self.api_key.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(|e| self.map_send_error(endpoint, e))?;
                if !resp.status().is_success() {
                    return Err(ScoutError::Status {
                        url: endpoint.to_string(),
                        status: resp.status().as_u16(),
                    });
                }
                let body: EverythingResponse = resp.json().await?;
                Ok(body.articles)
            })
            .await
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> ScoutError {
        if e.is_timeout() {
            timeout_error(url, self.timeout)
        } else {
            ScoutError::Http(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procurecast_store::MemoryStore;

    #[test]
    fn query_quotes_the_agency_name() {
        assert_eq!(
            news_query("Port of Houston Authority"),
            "\"Port of Houston Authority\" AND (transportation OR transit OR procurement)"
        );
    }

    #[test]
    fn articles_map_source_and_timestamp() {
        let body: EverythingResponse = serde_json::from_str(
            r#"{"status":"ok","articles":[
                {"source":{"id":null,"name":"Houston Chronicle"},"title":"METRO eyes signal priority",
                 "url":"https://news.example.com/metro-tsp","publishedAt":"2024-03-04T12:30:00Z",
                 "description":"Transit signal priority pilot"},
                {"source":{"name":"Wire"},"title":"No link","url":null}
            ]}"#,
        )
        .unwrap();
        let mapped: Vec<_> = body.articles.into_iter().filter_map(|a| to_article(7, a)).collect();
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].agency_id, 7);
        assert_eq!(mapped[0].source_name.as_deref(), Some("Houston Chronicle"));
        assert_eq!(mapped[0].published_at.unwrap().to_rfc3339(), "2024-03-04T12:30:00+00:00");
        assert_eq!(mapped[0].content.as_deref(), Some("Transit signal priority pilot"));
    }

    #[test]
    fn missing_articles_key_is_empty() {
        let body: EverythingResponse = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert!(body.articles.is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_fails_per_agency_without_aborting() {
        let store = Arc::new(MemoryStore::new());
        store.add_agency(Agency::new(1, "Capital Metro"));
        store.add_agency(Agency::new(2, "Harris County"));
        let config = NewsConfig {
            endpoint: "http://127.0.0.1:9/v2/everything".into(),
            ..Default::default()
        };
        let harvester = NewsHarvester::new(
            store.clone(),
            "test-key",
            config,
            Arc::new(Throttle::unthrottled()),
            Duration::from_secs(2),
        )
        .unwrap();

        let stats = harvester.run(Some(&[1, 2])).await.unwrap();
        assert_eq!(stats.agencies, 2);
        assert_eq!(stats.pages_failed, 2);
        assert!(store.news_articles().is_empty());
    }
}
