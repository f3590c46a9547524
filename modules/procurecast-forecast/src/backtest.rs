use std::fmt;

use tracing::info;

use procurecast_common::{BacktestConfig, BacktestResult};
use procurecast_store::ProcurementStore;

use crate::artifact::ModelArtifact;
use crate::error::ForecastResult;
use crate::metrics::{evaluate, Metrics};
use crate::panel::{build_panel, snapshot_dates, Panel};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSummary {
    pub snapshots: usize,
    pub rows: usize,
    pub recorded: u64,
    pub metrics: Metrics,
}

impl fmt::Display for BacktestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "snapshots {}, rows {}, recorded {}, {}",
            self.snapshots, self.rows, self.recorded, self.metrics
        )
    }
}

/// Score each panel row with the model against its realised outcome.
pub fn evaluate_panel(artifact: &ModelArtifact, panel: &Panel) -> Vec<BacktestResult> {
    panel
        .rows
        .iter()
        .map(|row| BacktestResult {
            simulation_date: row.snapshot_date,
            agency_id: row.agency_id,
            predicted_prob_12m: artifact.predict_named(&panel.feature_names, &row.features),
            actual_outcome_12m: row.label,
            time_to_event_days: row.days_to_event,
        })
        .collect()
}

/// Replay the snapshot schedule with a trained model and store the results.
pub async fn run_backtest(
    store: &dyn ProcurementStore,
    artifact: &ModelArtifact,
    config: &BacktestConfig,
) -> ForecastResult<BacktestSummary> {
    let cutoffs = snapshot_dates(config.start, config.end, config.step_months);
    let panel = build_panel(store, &cutoffs, config.window_days).await?;
    let results = evaluate_panel(artifact, &panel);

    let labels: Vec<bool> = results.iter().map(|r| r.actual_outcome_12m).collect();
    let probs: Vec<f64> = results.iter().map(|r| r.predicted_prob_12m).collect();
    let metrics = evaluate(&labels, &probs);
    let recorded = store.record_backtest_results(&results).await?;

    let summary = BacktestSummary {
        snapshots: cutoffs.len(),
        rows: results.len(),
        recorded,
        metrics,
    };
    info!(%summary, "Backtest recorded");
    Ok(summary)
}
