pub mod config;
pub mod error;
pub mod file_config;
pub mod selectors;
pub mod stage;
pub mod strategy;
pub mod types;

pub use config::AppConfig;
pub use error::CommonError;
pub use file_config::{
    AnomalyConfig, BacktestConfig, HarvestConfig, NewsConfig, PipelineConfig, RegistryConfig,
    TrainingConfig, VerifierConfig,
};
pub use selectors::{FetcherKind, SelectorOverride, SelectorOverrides};
pub use stage::{run_stage, StageOutcome};
pub use strategy::Attempt;
pub use types::*;
