use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::{debug, info};

use procurecast_common::types::{
    Agency, AgencyId, BacktestResult, EntityCount, InsertOutcome, NewDocument, NewEntity,
    NewNewsArticle, NewSolicitation, Prediction, SolicitationDate, SuspectDocument,
    UnprocessedDocument, VerifierCandidate, DOCUMENT_SOURCE_TYPE, STATE_DOT_TYPE,
};

use crate::dialect::{dialect_for_url, SqlDialect};
use crate::error::StoreResult;
use crate::query::{parse_date, parse_timestamp, InsertQuery, Params};
use crate::traits::ProcurementStore;

const AGENCY_COLUMNS: &str = "agency_id, name, state, agency_type, procurement_url, planning_url, minutes_url, latitude, longitude";

type AgencyRow = (
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<f64>,
    Option<f64>,
);

fn agency_from_row(row: AgencyRow) -> Agency {
    let (agency_id, name, state, agency_type, procurement_url, planning_url, minutes_url, latitude, longitude) = row;
    Agency {
        agency_id,
        name,
        state,
        agency_type,
        procurement_url,
        planning_url,
        minutes_url,
        latitude,
        longitude,
    }
}

/// `ProcurementStore` over a Postgres or SQLite pool.
pub struct SqlStore {
    pool: AnyPool,
    dialect: Box<dyn SqlDialect>,
}

impl SqlStore {
    /// Connect and pick the dialect from the URL scheme.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        sqlx::any::install_default_drivers();
        let dialect = dialect_for_url(url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(backend = dialect.name(), "Connected to database");
        Ok(Self { pool, dialect })
    }

    pub fn new(pool: AnyPool, dialect: Box<dyn SqlDialect>) -> Self {
        Self { pool, dialect }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    fn params(&self) -> Params<'_> {
        Params::new(self.dialect.as_ref())
    }
}

#[async_trait]
impl ProcurementStore for SqlStore {
    async fn find_agency_by_name(&self, fragment: &str) -> StoreResult<Option<Agency>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(None);
        }

        let mut p = self.params();
        let pattern = p.push(format!("%{fragment}%"));
        let sql = format!(
            "SELECT {AGENCY_COLUMNS} FROM agencies WHERE {} ORDER BY agency_id LIMIT 1",
            self.dialect.case_insensitive_like("name", &pattern)
        );

        let row = p
            .bind_as(sqlx::query_as::<_, AgencyRow>(&sql))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(agency_from_row))
    }

    async fn child_agency_ids(&self, parent: AgencyId) -> StoreResult<Vec<AgencyId>> {
        let mut p = self.params();
        let sql = format!(
            "SELECT DISTINCT child_agency_id FROM agency_relationships WHERE parent_agency_id = {} ORDER BY child_agency_id",
            p.push(parent)
        );

        let rows = p
            .bind_as(sqlx::query_as::<_, (i64,)>(&sql))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn state_dot(&self, state: &str) -> StoreResult<Option<AgencyId>> {
        let mut p = self.params();
        let sql = format!(
            "SELECT agency_id FROM agencies WHERE state = {} AND agency_type = {} ORDER BY agency_id LIMIT 1",
            p.push(state),
            p.push(STATE_DOT_TYPE)
        );

        let row = p
            .bind_as(sqlx::query_as::<_, (i64,)>(&sql))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn agencies(&self, ids: Option<&[AgencyId]>) -> StoreResult<Vec<Agency>> {
        let mut p = self.params();
        let sql = match ids {
            None => format!("SELECT {AGENCY_COLUMNS} FROM agencies ORDER BY agency_id"),
            Some([]) => return Ok(Vec::new()),
            Some(ids) => format!(
                "SELECT {AGENCY_COLUMNS} FROM agencies WHERE agency_id IN ({}) ORDER BY agency_id",
                p.push_list(ids)
            ),
        };

        let rows = p
            .bind_as(sqlx::query_as::<_, AgencyRow>(&sql))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(agency_from_row).collect())
    }

    async fn sample_agencies(&self, limit: usize) -> StoreResult<Vec<Agency>> {
        let mut p = self.params();
        let sql = format!(
            "SELECT {AGENCY_COLUMNS} FROM agencies ORDER BY RANDOM() LIMIT {}",
            p.push(limit as i64)
        );

        let rows = p
            .bind_as(sqlx::query_as::<_, AgencyRow>(&sql))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(agency_from_row).collect())
    }

    async fn document_exists(&self, url: &str) -> StoreResult<bool> {
        let mut p = self.params();
        let sql = format!("SELECT document_id FROM documents WHERE url = {} LIMIT 1", p.push(url));

        let row = p
            .bind_as(sqlx::query_as::<_, (i64,)>(&sql))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_document(&self, doc: &NewDocument) -> StoreResult<InsertOutcome> {
        let mut p = self.params();
        let sql = InsertQuery::into_table("documents")
            .value("agency_id", p.push(doc.agency_id))
            .value("document_type", p.push(doc.document_type.as_str()))
            .value("url", p.push(doc.url.as_str()))
            .value("raw_text", p.push(doc.raw_text.clone()))
            .value("scraped_date", p.push_timestamp(doc.scraped_at))
            .value("publication_date", p.push_date(doc.publication_date))
            .ignore_conflict_on("url")
            .to_sql(self.dialect.as_ref());

        let result = p.bind(sqlx::query(&sql)).execute(&self.pool).await?;
        let outcome = InsertOutcome::from_rows_affected(result.rows_affected());
        debug!(url = doc.url.as_str(), ?outcome, "Document insert");
        Ok(outcome)
    }

    async fn unprocessed_documents(&self) -> StoreResult<Vec<UnprocessedDocument>> {
        let mut p = self.params();
        let sql = format!(
            r#"
            SELECT d.document_id, d.raw_text
            FROM documents d
            WHERE d.raw_text IS NOT NULL
              AND NOT EXISTS (
                SELECT 1 FROM extracted_entities e
                WHERE e.source_id = d.document_id AND e.source_type = {}
              )
            ORDER BY d.document_id
            "#,
            p.push(DOCUMENT_SOURCE_TYPE)
        );

        let rows = p
            .bind_as(sqlx::query_as::<_, (i64, String)>(&sql))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(document_id, raw_text)| UnprocessedDocument {
                document_id,
                raw_text,
            })
            .collect())
    }

    async fn thin_documents(
        &self,
        since: DateTime<Utc>,
        min_chars: usize,
    ) -> StoreResult<Vec<SuspectDocument>> {
        let mut p = self.params();
        let sql = format!(
            r#"
            SELECT document_id, agency_id, url, LENGTH(raw_text), {}
            FROM documents
            WHERE (raw_text IS NULL OR LENGTH(raw_text) < {})
              AND scraped_date > {}
            ORDER BY document_id
            "#,
            self.dialect.as_text("scraped_date"),
            p.push(min_chars as i64),
            p.push_timestamp(since)
        );

        let rows = p
            .bind_as(sqlx::query_as::<_, (i64, Option<i64>, Option<String>, Option<i64>, String)>(&sql))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(document_id, agency_id, url, length, scraped)| {
                Ok(SuspectDocument {
                    document_id,
                    agency_id,
                    url: url.unwrap_or_default(),
                    text_chars: length.map(|n| n.max(0) as usize),
                    scraped_at: parse_timestamp("scraped_date", &scraped)?,
                })
            })
            .collect()
    }

    async fn insert_news_article(&self, article: &NewNewsArticle) -> StoreResult<InsertOutcome> {
        let mut p = self.params();
        let sql = InsertQuery::into_table("news_articles")
            .value("agency_id", p.push(article.agency_id))
            .value("article_url", p.push(article.article_url.as_str()))
            .value("title", p.push(article.title.as_str()))
            .value("source_name", p.push(article.source_name.clone()))
            .value("published_date", p.push_opt_timestamp(article.published_at))
            .value("content", p.push(article.content.clone()))
            .ignore_conflict_on("article_url")
            .to_sql(self.dialect.as_ref());

        let result = p.bind(sqlx::query(&sql)).execute(&self.pool).await?;
        Ok(InsertOutcome::from_rows_affected(result.rows_affected()))
    }

    async fn insert_entities(&self, entities: &[NewEntity]) -> StoreResult<u64> {
        if entities.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for entity in entities {
            let mut p = self.params();
            let sql = InsertQuery::into_table("extracted_entities")
                .value("source_id", p.push(entity.source_id))
                .value("source_type", p.push(DOCUMENT_SOURCE_TYPE))
                .value("entity_text", p.push(entity.entity_text.as_str()))
                .value("entity_label", p.push(entity.label.as_str()))
                .value("context_sentence", p.push(entity.context_sentence.as_str()))
                .to_sql(self.dialect.as_ref());
            written += p.bind(sqlx::query(&sql)).execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn validated_entity_counts(
        &self,
        published_before: Option<NaiveDate>,
    ) -> StoreResult<Vec<EntityCount>> {
        let mut p = self.params();
        let source_type = p.push(DOCUMENT_SOURCE_TYPE);
        let cutoff = match published_before {
            Some(date) => format!("AND d.publication_date < {}", p.push_date(date)),
            None => String::new(),
        };
        // validation_status is an enum in Postgres; compare against a literal
        let sql = format!(
            r#"
            SELECT d.agency_id, d.document_type, e.entity_label, COUNT(*)
            FROM documents d
            JOIN extracted_entities e ON d.document_id = e.source_id
            WHERE e.source_type = {source_type}
              AND e.validation_status = 'correct'
              AND d.agency_id IS NOT NULL
              {cutoff}
            GROUP BY d.agency_id, d.document_type, e.entity_label
            ORDER BY d.agency_id
            "#
        );

        let rows = p
            .bind_as(sqlx::query_as::<_, (i64, Option<String>, Option<String>, i64)>(&sql))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(agency_id, document_type, entity_label, count)| {
                Some(EntityCount {
                    agency_id,
                    document_type: document_type?,
                    entity_label: entity_label?,
                    count,
                })
            })
            .collect())
    }

    async fn insert_solicitation(&self, solicitation: &NewSolicitation) -> StoreResult<InsertOutcome> {
        let mut p = self.params();
        let sql = InsertQuery::into_table("historical_solicitations")
            .value("agency_id", p.push(solicitation.agency_id))
            .value("release_date", p.push_date(solicitation.release_date))
            .value("title", p.push(solicitation.title.as_str()))
            .value("url", p.push(solicitation.url.as_str()))
            .value("keywords", p.push_text_list(&solicitation.keywords))
            .ignore_conflict_on("url")
            .to_sql(self.dialect.as_ref());

        let result = p.bind(sqlx::query(&sql)).execute(&self.pool).await?;
        Ok(InsertOutcome::from_rows_affected(result.rows_affected()))
    }

    async fn solicitation_dates(&self) -> StoreResult<Vec<SolicitationDate>> {
        let sql = format!(
            "SELECT agency_id, {} FROM historical_solicitations WHERE agency_id IS NOT NULL ORDER BY agency_id, release_date",
            self.dialect.as_text("release_date")
        );

        let rows = sqlx::query_as::<_, (i64, String)>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(agency_id, release)| {
                Ok(SolicitationDate {
                    agency_id,
                    release_date: parse_date("release_date", &release)?,
                })
            })
            .collect()
    }

    async fn replace_predictions(&self, predictions: &[Prediction]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&self.dialect.truncate("predictions"))
            .execute(&mut *tx)
            .await?;

        let mut written = 0;
        for prediction in predictions {
            let mut p = self.params();
            let evidence = p.push_json(&prediction.supporting_evidence)?;
            let sql = InsertQuery::into_table("predictions")
                .value("agency_id", p.push(prediction.agency_id))
                .value("prediction_date", p.push_date(prediction.prediction_date))
                .value("prob_6_months", p.push(prediction.prob_6_months))
                .value("prob_12_months", p.push(prediction.prob_12_months))
                .value("supporting_evidence", evidence)
                .to_sql(self.dialect.as_ref());
            written += p.bind(sqlx::query(&sql)).execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        info!(count = written, "Predictions table replaced");
        Ok(written)
    }

    async fn predictions(&self) -> StoreResult<Vec<Prediction>> {
        let sql = format!(
            "SELECT agency_id, {}, prob_6_months, prob_12_months, {} FROM predictions ORDER BY agency_id",
            self.dialect.as_text("prediction_date"),
            self.dialect.as_text("supporting_evidence")
        );

        let rows = sqlx::query_as::<_, (i64, String, Option<f64>, Option<f64>, Option<String>)>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(agency_id, date, prob_6_months, prob_12_months, evidence)| {
                let supporting_evidence = match evidence {
                    Some(text) => serde_json::from_str(&text)?,
                    None => serde_json::Value::Null,
                };
                Ok(Prediction {
                    agency_id,
                    prediction_date: parse_date("prediction_date", &date)?,
                    prob_6_months,
                    prob_12_months: prob_12_months.unwrap_or_default(),
                    supporting_evidence,
                })
            })
            .collect()
    }

    async fn record_backtest_results(&self, results: &[BacktestResult]) -> StoreResult<u64> {
        if results.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for result in results {
            let mut p = self.params();
            let sql = InsertQuery::into_table("backtest_results")
                .value("simulation_date", p.push_date(result.simulation_date))
                .value("agency_id", p.push(result.agency_id))
                .value("predicted_prob_12m", p.push(result.predicted_prob_12m))
                .value("actual_outcome_12m", p.push(result.actual_outcome_12m))
                .value("time_to_event_days", p.push(result.time_to_event_days))
                .update_conflict_on(
                    "simulation_date, agency_id",
                    &["predicted_prob_12m", "actual_outcome_12m", "time_to_event_days"],
                )
                .to_sql(self.dialect.as_ref());
            written += p.bind(sqlx::query(&sql)).execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn verifier_candidates(
        &self,
        min_probability: f64,
        quiet_since: NaiveDate,
        limit: usize,
    ) -> StoreResult<Vec<VerifierCandidate>> {
        let mut p = self.params();
        let sql = format!(
            r#"
            SELECT p.agency_id, a.name, a.procurement_url, p.prob_12_months
            FROM predictions p
            JOIN agencies a ON p.agency_id = a.agency_id
            WHERE p.prob_12_months > {}
              AND NOT EXISTS (
                SELECT 1 FROM historical_solicitations hs
                WHERE hs.agency_id = p.agency_id AND hs.release_date > {}
              )
            ORDER BY p.prob_12_months DESC, p.agency_id
            LIMIT {}
            "#,
            p.push(min_probability),
            p.push_date(quiet_since),
            p.push(limit as i64)
        );

        let rows = p
            .bind_as(sqlx::query_as::<_, (i64, String, Option<String>, f64)>(&sql))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(agency_id, name, procurement_url, prob_12_months)| VerifierCandidate {
                agency_id,
                name,
                procurement_url,
                prob_12_months,
            })
            .collect())
    }
}
