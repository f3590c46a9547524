// In-memory ProcurementStore for stage tests.
//
// Mirrors SqlStore's semantics (conditional inserts, strict cutoffs,
// lowest-id matches) without a database. Seeding helpers stand in for the
// external seeding scripts and review process.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use procurecast_common::types::{
    Agency, AgencyId, AgencyRelationship, BacktestResult, DocumentId, EntityCount, EntityLabel,
    InsertOutcome, NewDocument, NewEntity, NewNewsArticle, NewSolicitation, Prediction,
    SolicitationDate, SuspectDocument, UnprocessedDocument, ValidationStatus, VerifierCandidate,
    STATE_DOT_TYPE,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::ProcurementStore;

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub document_id: DocumentId,
    pub document: NewDocument,
}

#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub entity: NewEntity,
    pub status: ValidationStatus,
}

#[derive(Default)]
struct Inner {
    agencies: BTreeMap<AgencyId, Agency>,
    relationships: HashSet<AgencyRelationship>,
    documents: Vec<StoredDocument>,
    entities: Vec<StoredEntity>,
    news: Vec<NewNewsArticle>,
    solicitations: Vec<NewSolicitation>,
    predictions: Vec<Prediction>,
    backtests: BTreeMap<(NaiveDate, AgencyId), BacktestResult>,
    rejected_solicitations: HashSet<AgencyId>,
}

/// Thread-safe via interior Mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seeding ---

    pub fn add_agency(&self, agency: Agency) {
        self.inner
            .lock()
            .unwrap()
            .agencies
            .insert(agency.agency_id, agency);
    }

    pub fn add_relationship(&self, parent: AgencyId, child: AgencyId, structure_id: i64) {
        self.inner.lock().unwrap().relationships.insert(AgencyRelationship {
            parent_agency_id: parent,
            child_agency_id: child,
            structure_id,
        });
    }

    /// Store a document unconditionally and return its id.
    pub fn add_document(&self, document: NewDocument) -> DocumentId {
        let mut inner = self.inner.lock().unwrap();
        let document_id = inner.documents.len() as DocumentId + 1;
        inner.documents.push(StoredDocument {
            document_id,
            document,
        });
        document_id
    }

    pub fn add_entity(&self, source_id: DocumentId, label: EntityLabel, text: &str, status: ValidationStatus) {
        self.inner.lock().unwrap().entities.push(StoredEntity {
            entity: NewEntity {
                source_id,
                entity_text: text.to_string(),
                label,
                context_sentence: text.to_string(),
            },
            status,
        });
    }

    /// Mark every entity correct, as an external review pass would.
    pub fn validate_all(&self) {
        for stored in self.inner.lock().unwrap().entities.iter_mut() {
            stored.status = ValidationStatus::Correct;
        }
    }

    pub fn add_solicitation(&self, agency_id: AgencyId, release_date: NaiveDate) {
        let mut inner = self.inner.lock().unwrap();
        let url = format!("https://registry.test/opp/{}", inner.solicitations.len() + 1);
        inner.solicitations.push(NewSolicitation {
            agency_id: Some(agency_id),
            release_date,
            title: "Seeded solicitation".to_string(),
            url,
            keywords: Vec::new(),
        });
    }

    /// Make every later solicitation insert for this agency fail.
    pub fn reject_solicitations_for(&self, agency_id: AgencyId) {
        self.inner.lock().unwrap().rejected_solicitations.insert(agency_id);
    }

    // --- Inspection ---

    pub fn documents(&self) -> Vec<StoredDocument> {
        self.inner.lock().unwrap().documents.clone()
    }

    pub fn entities(&self) -> Vec<StoredEntity> {
        self.inner.lock().unwrap().entities.clone()
    }

    pub fn news_articles(&self) -> Vec<NewNewsArticle> {
        self.inner.lock().unwrap().news.clone()
    }

    pub fn solicitations(&self) -> Vec<NewSolicitation> {
        self.inner.lock().unwrap().solicitations.clone()
    }

    pub fn backtest_results(&self) -> Vec<BacktestResult> {
        self.inner.lock().unwrap().backtests.values().cloned().collect()
    }
}

#[async_trait]
impl ProcurementStore for MemoryStore {
    async fn find_agency_by_name(&self, fragment: &str) -> StoreResult<Option<Agency>> {
        let needle = fragment.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .agencies
            .values()
            .find(|a| a.name.to_lowercase().contains(&needle))
            .cloned())
    }

    async fn child_agency_ids(&self, parent: AgencyId) -> StoreResult<Vec<AgencyId>> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<AgencyId> = inner
            .relationships
            .iter()
            .filter(|r| r.parent_agency_id == parent)
            .map(|r| r.child_agency_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn state_dot(&self, state: &str) -> StoreResult<Option<AgencyId>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .agencies
            .values()
            .find(|a| {
                a.state.as_deref() == Some(state) && a.agency_type.as_deref() == Some(STATE_DOT_TYPE)
            })
            .map(|a| a.agency_id))
    }

    async fn agencies(&self, ids: Option<&[AgencyId]>) -> StoreResult<Vec<Agency>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .agencies
            .values()
            .filter(|a| ids.map_or(true, |ids| ids.contains(&a.agency_id)))
            .cloned()
            .collect())
    }

    async fn sample_agencies(&self, limit: usize) -> StoreResult<Vec<Agency>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.agencies.values().take(limit).cloned().collect())
    }

    async fn document_exists(&self, url: &str) -> StoreResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.documents.iter().any(|d| d.document.url == url))
    }

    async fn insert_document(&self, doc: &NewDocument) -> StoreResult<InsertOutcome> {
        let mut inner = self.inner.lock().unwrap();
        if inner.documents.iter().any(|d| d.document.url == doc.url) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        let document_id = inner.documents.len() as DocumentId + 1;
        inner.documents.push(StoredDocument {
            document_id,
            document: doc.clone(),
        });
        Ok(InsertOutcome::Inserted)
    }

    async fn unprocessed_documents(&self) -> StoreResult<Vec<UnprocessedDocument>> {
        let inner = self.inner.lock().unwrap();
        let processed: HashSet<DocumentId> = inner.entities.iter().map(|e| e.entity.source_id).collect();
        Ok(inner
            .documents
            .iter()
            .filter(|d| !processed.contains(&d.document_id))
            .filter_map(|d| {
                d.document.raw_text.as_ref().map(|text| UnprocessedDocument {
                    document_id: d.document_id,
                    raw_text: text.clone(),
                })
            })
            .collect())
    }

    async fn thin_documents(
        &self,
        since: DateTime<Utc>,
        min_chars: usize,
    ) -> StoreResult<Vec<SuspectDocument>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .documents
            .iter()
            .filter(|d| d.document.scraped_at > since)
            .filter_map(|d| {
                let text_chars = d.document.raw_text.as_ref().map(|t| t.chars().count());
                let thin = text_chars.map_or(true, |n| n < min_chars);
                thin.then(|| SuspectDocument {
                    document_id: d.document_id,
                    agency_id: Some(d.document.agency_id),
                    url: d.document.url.clone(),
                    text_chars,
                    scraped_at: d.document.scraped_at,
                })
            })
            .collect())
    }

    async fn insert_news_article(&self, article: &NewNewsArticle) -> StoreResult<InsertOutcome> {
        let mut inner = self.inner.lock().unwrap();
        if inner.news.iter().any(|a| a.article_url == article.article_url) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        inner.news.push(article.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_entities(&self, entities: &[NewEntity]) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.entities.extend(entities.iter().cloned().map(|entity| StoredEntity {
            entity,
            status: ValidationStatus::Unverified,
        }));
        Ok(entities.len() as u64)
    }

    async fn validated_entity_counts(
        &self,
        published_before: Option<NaiveDate>,
    ) -> StoreResult<Vec<EntityCount>> {
        let inner = self.inner.lock().unwrap();
        let mut counts: BTreeMap<(AgencyId, String, String), i64> = BTreeMap::new();

        for stored in inner
            .entities
            .iter()
            .filter(|e| e.status == ValidationStatus::Correct)
        {
            let Some(doc) = inner
                .documents
                .iter()
                .find(|d| d.document_id == stored.entity.source_id)
            else {
                continue;
            };
            if published_before.is_some_and(|cutoff| doc.document.publication_date >= cutoff) {
                continue;
            }
            *counts
                .entry((
                    doc.document.agency_id,
                    doc.document.document_type.as_str().to_string(),
                    stored.entity.label.as_str().to_string(),
                ))
                .or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|((agency_id, document_type, entity_label), count)| EntityCount {
                agency_id,
                document_type,
                entity_label,
                count,
            })
            .collect())
    }

    async fn insert_solicitation(&self, solicitation: &NewSolicitation) -> StoreResult<InsertOutcome> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(agency_id) = solicitation.agency_id {
            if inner.rejected_solicitations.contains(&agency_id) {
                return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                    "solicitation insert rejected for agency {agency_id}"
                ))));
            }
        }
        if inner.solicitations.iter().any(|s| s.url == solicitation.url) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        inner.solicitations.push(solicitation.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn solicitation_dates(&self) -> StoreResult<Vec<SolicitationDate>> {
        let inner = self.inner.lock().unwrap();
        let mut dates: Vec<SolicitationDate> = inner
            .solicitations
            .iter()
            .filter_map(|s| {
                s.agency_id.map(|agency_id| SolicitationDate {
                    agency_id,
                    release_date: s.release_date,
                })
            })
            .collect();
        dates.sort_by_key(|d| (d.agency_id, d.release_date));
        Ok(dates)
    }

    async fn replace_predictions(&self, predictions: &[Prediction]) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.predictions = predictions.to_vec();
        Ok(predictions.len() as u64)
    }

    async fn predictions(&self) -> StoreResult<Vec<Prediction>> {
        let inner = self.inner.lock().unwrap();
        let mut predictions = inner.predictions.clone();
        predictions.sort_by_key(|p| p.agency_id);
        Ok(predictions)
    }

    async fn record_backtest_results(&self, results: &[BacktestResult]) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        for result in results {
            inner
                .backtests
                .insert((result.simulation_date, result.agency_id), result.clone());
        }
        Ok(results.len() as u64)
    }

    async fn verifier_candidates(
        &self,
        min_probability: f64,
        quiet_since: NaiveDate,
        limit: usize,
    ) -> StoreResult<Vec<VerifierCandidate>> {
        let inner = self.inner.lock().unwrap();
        let mut candidates: Vec<VerifierCandidate> = inner
            .predictions
            .iter()
            .filter(|p| p.prob_12_months > min_probability)
            .filter(|p| {
                !inner
                    .solicitations
                    .iter()
                    .any(|s| s.agency_id == Some(p.agency_id) && s.release_date > quiet_since)
            })
            .filter_map(|p| {
                inner.agencies.get(&p.agency_id).map(|a| VerifierCandidate {
                    agency_id: p.agency_id,
                    name: a.name.clone(),
                    procurement_url: a.procurement_url.clone(),
                    prob_12_months: p.prob_12_months,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.prob_12_months
                .total_cmp(&a.prob_12_months)
                .then(a.agency_id.cmp(&b.agency_id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }
}
