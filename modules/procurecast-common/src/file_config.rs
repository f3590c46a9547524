use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::CommonError;

/// TOML-backed tuning loaded from disk.
/// Every section is optional; secrets (API keys, DB URL) stay as env vars.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub harvest: HarvestConfig,
    pub news: NewsConfig,
    pub registry: RegistryConfig,
    pub backtest: BacktestConfig,
    pub training: TrainingConfig,
    pub verifier: VerifierConfig,
    pub anomaly: AnomalyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Agencies processed concurrently.
    pub concurrency: usize,
    /// Headless browsers alive at once.
    pub browser_concurrency: usize,
    /// Minimum spacing between requests to the same host.
    pub min_host_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    /// Use the generative link finder instead of extension matching.
    pub use_ai_finder: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            browser_concurrency: 2,
            min_host_delay_ms: 1000,
            request_timeout_secs: 30,
            max_attempts: 3,
            backoff_base_ms: 500,
            use_ai_finder: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub endpoint: String,
    pub window_days: i64,
    pub per_agency_limit: usize,
    /// Agencies sampled when no targets are given.
    pub sample_size: usize,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://newsapi.org/v2/everything".to_string(),
            window_days: 30,
            per_agency_limit: 5,
            sample_size: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub endpoint: String,
    /// Calendar years walked back from the current one.
    pub years: i32,
    #[serde(deserialize_with = "nonzero_usize")]
    pub page_size: usize,
    pub naics_codes: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.sam.gov/opportunities/v2/search".to_string(),
            years: 5,
            page_size: 1000,
            naics_codes: ["541512", "541330", "541715", "334511"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub step_months: u32,
    pub window_days: i64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2011, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            step_months: 6,
            window_days: 365,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub rounds: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub lambda: f64,
    pub min_child_weight: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            rounds: 100,
            max_depth: 6,
            learning_rate: 0.3,
            lambda: 1.0,
            min_child_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub min_probability: f64,
    pub limit: usize,
    /// Agencies with a solicitation inside this many days are skipped.
    pub quiet_days: i64,
    pub confirmation_rate: f64,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            min_probability: 0.75,
            limit: 5,
            quiet_days: 60,
            confirmation_rate: 0.2,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub window_days: i64,
    pub min_text_chars: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            min_text_chars: 100,
        }
    }
}

fn nonzero_usize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = usize::deserialize(deserializer)?;
    if value == 0 {
        return Err(serde::de::Error::custom("must be greater than zero"));
    }
    Ok(value)
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, CommonError> {
        let content = std::fs::read_to_string(path).map_err(|source| CommonError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| CommonError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
