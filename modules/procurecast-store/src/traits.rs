// Storage boundary for every pipeline stage.
//
// SqlStore implements it over Postgres or SQLite; MemoryStore (test-support)
// implements it in memory so stage tests need no database server.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use procurecast_common::types::{
    Agency, AgencyId, BacktestResult, EntityCount, InsertOutcome, NewDocument, NewEntity,
    NewNewsArticle, NewSolicitation, Prediction, SolicitationDate, SuspectDocument,
    UnprocessedDocument, VerifierCandidate,
};

use crate::error::StoreResult;

#[async_trait]
pub trait ProcurementStore: Send + Sync {
    // --- Agencies ---

    /// Lowest-id agency whose name contains `fragment`, case-insensitively.
    /// An empty fragment matches nothing.
    async fn find_agency_by_name(&self, fragment: &str) -> StoreResult<Option<Agency>>;

    /// Direct children of `parent` over any relationship type.
    async fn child_agency_ids(&self, parent: AgencyId) -> StoreResult<Vec<AgencyId>>;

    /// Lowest-id agency of type "State DOT" in `state`.
    async fn state_dot(&self, state: &str) -> StoreResult<Option<AgencyId>>;

    /// The given agencies, or all of them when `ids` is `None`.
    async fn agencies(&self, ids: Option<&[AgencyId]>) -> StoreResult<Vec<Agency>>;

    /// Up to `limit` agencies in random order.
    async fn sample_agencies(&self, limit: usize) -> StoreResult<Vec<Agency>>;

    // --- Documents ---

    async fn document_exists(&self, url: &str) -> StoreResult<bool>;

    /// Conditional insert keyed on the document URL.
    async fn insert_document(&self, doc: &NewDocument) -> StoreResult<InsertOutcome>;

    /// Documents with text and no extracted entities yet.
    async fn unprocessed_documents(&self) -> StoreResult<Vec<UnprocessedDocument>>;

    /// Documents scraped after `since` whose text is null or under `min_chars`.
    async fn thin_documents(
        &self,
        since: DateTime<Utc>,
        min_chars: usize,
    ) -> StoreResult<Vec<SuspectDocument>>;

    // --- News ---

    /// Conditional insert keyed on the article URL.
    async fn insert_news_article(&self, article: &NewNewsArticle) -> StoreResult<InsertOutcome>;

    // --- Entities ---

    /// Insert entities in the unverified state. Returns the number written.
    async fn insert_entities(&self, entities: &[NewEntity]) -> StoreResult<u64>;

    /// Counts of validated entities per (agency, document type, label).
    /// With a cutoff, only documents published strictly before it count.
    async fn validated_entity_counts(
        &self,
        published_before: Option<NaiveDate>,
    ) -> StoreResult<Vec<EntityCount>>;

    // --- Solicitations ---

    /// Conditional insert keyed on the solicitation URL.
    async fn insert_solicitation(&self, solicitation: &NewSolicitation) -> StoreResult<InsertOutcome>;

    /// Release dates of every solicitation matched to an agency.
    async fn solicitation_dates(&self) -> StoreResult<Vec<SolicitationDate>>;

    // --- Predictions ---

    /// Replace the whole predictions table in one transaction.
    async fn replace_predictions(&self, predictions: &[Prediction]) -> StoreResult<u64>;

    async fn predictions(&self) -> StoreResult<Vec<Prediction>>;

    /// Upsert keyed on (simulation date, agency).
    async fn record_backtest_results(&self, results: &[BacktestResult]) -> StoreResult<u64>;

    /// Highest-probability predictions above `min_probability` for agencies
    /// with no solicitation released after `quiet_since`.
    async fn verifier_candidates(
        &self,
        min_probability: f64,
        quiet_since: NaiveDate,
        limit: usize,
    ) -> StoreResult<Vec<VerifierCandidate>>;
}
