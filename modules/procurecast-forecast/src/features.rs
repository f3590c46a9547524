//! Per-agency count features over validated entities.
//!
//! Live mode counts everything; historical mode only counts entities whose
//! parent document was published strictly before the cutoff.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use procurecast_common::{AgencyId, DocumentType, EntityCount, EntityLabel};
use procurecast_store::{ProcurementStore, StoreResult};

/// Suffix every trainable count column carries.
pub const FEATURE_SUFFIX: &str = "_mentions";

/// One named count: entities with `label` found in documents of `document_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub document_type: DocumentType,
    pub label: EntityLabel,
}

pub const FEATURE_CATALOGUE: [FeatureSpec; 4] = [
    FeatureSpec {
        name: "planning_doc_its_mentions",
        document_type: DocumentType::PlanningDocument,
        label: EntityLabel::ItsTechnology,
    },
    FeatureSpec {
        name: "planning_doc_budget_mentions",
        document_type: DocumentType::PlanningDocument,
        label: EntityLabel::Money,
    },
    FeatureSpec {
        name: "its_arch_its_mentions",
        document_type: DocumentType::ItsArchitecture,
        label: EntityLabel::ItsTechnology,
    },
    FeatureSpec {
        name: "minutes_its_mentions",
        document_type: DocumentType::MeetingMinutes,
        label: EntityLabel::ItsTechnology,
    },
];

/// Whether a column takes part in training.
pub fn is_model_feature(name: &str) -> bool {
    name.contains(FEATURE_SUFFIX) || name.contains("_count")
}

/// Agencies × named features, zero-filled.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    agency_ids: Vec<AgencyId>,
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureFrame {
    /// A frame with every value zero.
    pub fn zeros(agency_ids: Vec<AgencyId>, names: Vec<String>) -> Self {
        let rows = vec![vec![0.0; names.len()]; agency_ids.len()];
        Self {
            agency_ids,
            names,
            rows,
        }
    }

    /// Catalogue features for `agency_ids`, filled from grouped counts.
    /// Counts for agencies outside the list, or for groups the catalogue
    /// does not name, are ignored.
    pub fn from_counts(agency_ids: Vec<AgencyId>, counts: &[EntityCount]) -> Self {
        let names = FEATURE_CATALOGUE.iter().map(|f| f.name.to_string()).collect();
        let mut frame = Self::zeros(agency_ids, names);
        let index: HashMap<AgencyId, usize> = frame
            .agency_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        for count in counts {
            let Some(&row) = index.get(&count.agency_id) else {
                continue;
            };
            for (col, spec) in FEATURE_CATALOGUE.iter().enumerate() {
                if spec.document_type.as_str() == count.document_type
                    && spec.label.as_str() == count.entity_label
                {
                    frame.rows[row][col] += count.count as f64;
                }
            }
        }
        frame
    }

    pub fn agency_ids(&self) -> &[AgencyId] {
        &self.agency_ids
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.rows[idx]
    }

    pub fn len(&self) -> usize {
        self.agency_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agency_ids.is_empty()
    }

    pub fn value(&self, agency_id: AgencyId, name: &str) -> Option<f64> {
        let row = self.agency_ids.iter().position(|id| *id == agency_id)?;
        let col = self.names.iter().position(|n| n == name)?;
        Some(self.rows[row][col])
    }

    /// Remove a column. Returns false when it was not present.
    pub fn drop_feature(&mut self, name: &str) -> bool {
        let Some(col) = self.names.iter().position(|n| n == name) else {
            return false;
        };
        self.names.remove(col);
        for row in &mut self.rows {
            row.remove(col);
        }
        true
    }

    /// Rows re-ordered to `names`; unknown columns are zero, extras dropped.
    pub fn aligned_rows(&self, names: &[String]) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .map(|row| align_row(&self.names, row, names))
            .collect()
    }
}

/// Re-order `row` (labelled by `source`) to `target`, zero-filling.
pub fn align_row(source: &[String], row: &[f64], target: &[String]) -> Vec<f64> {
    target
        .iter()
        .map(|name| {
            source
                .iter()
                .position(|s| s == name)
                .and_then(|i| row.get(i).copied())
                .unwrap_or(0.0)
        })
        .collect()
}

/// Feature values as a JSON object, for prediction evidence.
pub fn evidence(names: &[String], values: &[f64]) -> Value {
    let map: Map<String, Value> = names
        .iter()
        .zip(values)
        .map(|(name, v)| (name.clone(), Value::from(*v)))
        .collect();
    Value::Object(map)
}

/// Current features for every agency.
pub async fn live_features(store: &dyn ProcurementStore) -> StoreResult<FeatureFrame> {
    features(store, None).await
}

/// Features for every agency using only documents published before `cutoff`.
pub async fn features_as_of(
    store: &dyn ProcurementStore,
    cutoff: NaiveDate,
) -> StoreResult<FeatureFrame> {
    features(store, Some(cutoff)).await
}

async fn features(
    store: &dyn ProcurementStore,
    cutoff: Option<NaiveDate>,
) -> StoreResult<FeatureFrame> {
    let agency_ids = store
        .agencies(None)
        .await?
        .into_iter()
        .map(|a| a.agency_id)
        .collect();
    let counts = store.validated_entity_counts(cutoff).await?;
    Ok(FeatureFrame::from_counts(agency_ids, &counts))
}
