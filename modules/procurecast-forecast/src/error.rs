use std::path::PathBuf;

use thiserror::Error;

use procurecast_store::StoreError;

pub type ForecastResult<T> = std::result::Result<T, ForecastError>;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model artifact not found at {0}; run `forecast train` first")]
    ModelMissing(PathBuf),

    #[error("model artifact format {found} is not supported (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },

    #[error("training panel is empty")]
    EmptyPanel,

    #[error("training panel has only {0} examples; both outcomes are needed")]
    SingleClass(&'static str),

    #[error("row has {found} features, model expects {expected}")]
    FeatureCount { found: usize, expected: usize },
}
