use std::fmt;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use procurecast_common::Prediction;
use procurecast_store::ProcurementStore;

use crate::artifact::ModelArtifact;
use crate::error::ForecastResult;
use crate::features::{evidence, live_features, FeatureFrame};

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSummary {
    pub prediction_date: NaiveDate,
    pub agencies: usize,
    pub written: u64,
    pub above_half: usize,
    pub max_probability: f64,
}

impl fmt::Display for PredictionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} predictions for {} ({} at or above 0.5, max {:.3})",
            self.written, self.prediction_date, self.above_half, self.max_probability
        )
    }
}

/// One prediction per agency in the frame, with the aligned features as evidence.
pub fn score_agencies(
    artifact: &ModelArtifact,
    frame: &FeatureFrame,
    prediction_date: NaiveDate,
) -> Vec<Prediction> {
    frame
        .agency_ids()
        .iter()
        .zip(artifact.score_frame(frame))
        .map(|(&agency_id, (row, prob))| Prediction {
            agency_id,
            prediction_date,
            prob_6_months: None,
            prob_12_months: prob,
            supporting_evidence: evidence(&artifact.feature_names, &row),
        })
        .collect()
}

/// Score every agency on live features and replace the predictions table.
pub async fn predict(store: &dyn ProcurementStore, model_path: &Path) -> ForecastResult<PredictionSummary> {
    let artifact = ModelArtifact::load(model_path)?;
    info!(
        trained_at = %artifact.trained_at,
        features = artifact.feature_names.len(),
        "Model loaded"
    );

    let frame = live_features(store).await?;
    for name in &artifact.feature_names {
        if !frame.feature_names().contains(name) {
            info!(feature = name.as_str(), "Feature absent from live data, using zero");
        }
    }

    let today = Utc::now().date_naive();
    if frame.is_empty() {
        warn!("No feature data available, keeping existing predictions");
        return Ok(PredictionSummary {
            prediction_date: today,
            agencies: 0,
            written: 0,
            above_half: 0,
            max_probability: 0.0,
        });
    }

    let predictions = score_agencies(&artifact, &frame, today);
    let written = store.replace_predictions(&predictions).await?;

    let summary = PredictionSummary {
        prediction_date: today,
        agencies: frame.len(),
        written,
        above_half: predictions.iter().filter(|p| p.prob_12_months >= 0.5).count(),
        max_probability: predictions.iter().map(|p| p.prob_12_months).fold(0.0, f64::max),
    };
    info!(%summary, "Predictions replaced");
    Ok(summary)
}
