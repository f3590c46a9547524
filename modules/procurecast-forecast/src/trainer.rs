use std::fmt;
use std::path::Path;

use tracing::info;

use procurecast_common::{BacktestConfig, TrainingConfig};
use procurecast_store::ProcurementStore;

use crate::artifact::ModelArtifact;
use crate::error::{ForecastError, ForecastResult};
use crate::features::is_model_feature;
use crate::gbdt::{Booster, BoosterParams, TreeParams};
use crate::metrics::{evaluate, Metrics};
use crate::panel::{build_panel, snapshot_dates, Panel};
use crate::split::stratified_split;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub rows: usize,
    pub positives: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub scale_pos_weight: f64,
    pub features: Vec<String>,
    pub metrics: Metrics,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows {} ({} positive), train {}, test {}, pos weight {:.2}, {}",
            self.rows, self.positives, self.train_rows, self.test_rows, self.scale_pos_weight, self.metrics
        )
    }
}

/// #negative / #positive over the training rows; 1 without positives.
pub fn positive_weight(labels: &[bool], rows: &[usize]) -> f64 {
    let pos = rows.iter().filter(|&&r| labels[r]).count();
    let neg = rows.len() - pos;
    if pos == 0 {
        1.0
    } else {
        neg as f64 / pos as f64
    }
}

/// Fit a classifier on the panel and evaluate it on a stratified hold-out.
pub fn train(panel: &Panel, config: &TrainingConfig) -> ForecastResult<(ModelArtifact, TrainingReport)> {
    if panel.is_empty() {
        return Err(ForecastError::EmptyPanel);
    }
    let positives = panel.positives();
    if positives == 0 {
        return Err(ForecastError::SingleClass("negative"));
    }
    if positives == panel.len() {
        return Err(ForecastError::SingleClass("positive"));
    }

    let columns: Vec<usize> = panel
        .feature_names
        .iter()
        .enumerate()
        .filter(|(_, name)| is_model_feature(name))
        .map(|(i, _)| i)
        .collect();
    let features: Vec<String> = columns.iter().map(|&i| panel.feature_names[i].clone()).collect();
    let x: Vec<Vec<f64>> = panel
        .rows
        .iter()
        .map(|row| columns.iter().map(|&i| row.features.get(i).copied().unwrap_or(0.0)).collect())
        .collect();
    let y = panel.labels();

    let split = stratified_split(&y, config.test_fraction, config.seed);
    let scale_pos_weight = positive_weight(&y, &split.train);
    info!(
        rows = panel.len(),
        positives,
        train = split.train.len(),
        test = split.test.len(),
        scale_pos_weight,
        "Training classifier"
    );

    let params = BoosterParams {
        rounds: config.rounds,
        tree: TreeParams {
            max_depth: config.max_depth,
            lambda: config.lambda,
            min_child_weight: config.min_child_weight,
            learning_rate: config.learning_rate,
        },
        scale_pos_weight,
        base_score: 0.5,
    };
    let booster = Booster::fit(&x, &y, &split.train, params);

    let test_labels: Vec<bool> = split.test.iter().map(|&r| y[r]).collect();
    let test_probs: Vec<f64> = split.test.iter().map(|&r| booster.predict_proba(&x[r])).collect();
    let metrics = evaluate(&test_labels, &test_probs);
    info!(%metrics, "Held-out evaluation");

    let report = TrainingReport {
        rows: panel.len(),
        positives,
        train_rows: split.train.len(),
        test_rows: split.test.len(),
        scale_pos_weight,
        features: features.clone(),
        metrics,
    };
    Ok((ModelArtifact::new(features, booster, Some(metrics)), report))
}

/// Build the backtest panel from the store, train, and persist the artifact.
pub async fn train_from_store(
    store: &dyn ProcurementStore,
    backtest: &BacktestConfig,
    training: &TrainingConfig,
    model_path: &Path,
) -> ForecastResult<TrainingReport> {
    let cutoffs = snapshot_dates(backtest.start, backtest.end, backtest.step_months);
    let panel = build_panel(store, &cutoffs, backtest.window_days).await?;
    let (artifact, report) = train(&panel, training)?;
    artifact.save(model_path)?;
    Ok(report)
}
