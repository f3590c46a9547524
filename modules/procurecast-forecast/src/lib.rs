pub mod artifact;
pub mod backtest;
pub mod error;
pub mod features;
pub mod gbdt;
pub mod metrics;
pub mod panel;
pub mod predictor;
pub mod split;
pub mod trainer;

pub use artifact::{ModelArtifact, FORMAT_VERSION};
pub use backtest::{evaluate_panel, run_backtest, BacktestSummary};
pub use error::{ForecastError, ForecastResult};
pub use features::{features_as_of, live_features, FeatureFrame, FeatureSpec, FEATURE_CATALOGUE};
pub use metrics::{evaluate, roc_auc, Metrics};
pub use panel::{build_panel, snapshot_dates, Panel, PanelRow, ReleaseIndex};
pub use predictor::{predict, score_agencies, PredictionSummary};
pub use split::{stratified_split, Split};
pub use trainer::{train, train_from_store, TrainingReport};
