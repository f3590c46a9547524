use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("{0} environment variable is required")]
    MissingEnv(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid selector overrides: {0}")]
    Selectors(#[from] serde_json::Error),
}
