use std::path::PathBuf;

use crate::error::CommonError;
use crate::file_config::PipelineConfig;

/// Values seeded into `.env` templates that must not be sent to a real API.
const PLACEHOLDER_KEYS: &[&str] = &["YOUR_ACTUAL_API_KEY", "YOUR_SAM_API_KEY"];

/// Application configuration loaded from environment variables.
/// Holds secrets and paths only; tuning lives in the TOML `PipelineConfig`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,

    // Local model endpoint (link discovery; reserved for tier-2 extraction)
    pub ollama_url: String,
    pub ollama_model: String,

    // External APIs
    pub news_api_key: Option<String>,
    pub sam_api_key: Option<String>,

    // Browser
    pub chrome_bin: String,

    // Files
    pub selectors_path: PathBuf,
    pub model_path: PathBuf,
    pub config_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, CommonError> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build from an arbitrary key lookup. `from_env` delegates here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CommonError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .ok_or(CommonError::MissingEnv("DATABASE_URL"))?,
            ollama_url: or_default("OLLAMA_URL", "http://localhost:11434"),
            ollama_model: or_default("OLLAMA_MODEL", "llama3"),
            news_api_key: api_key(lookup("NEWS_API_KEY")),
            sam_api_key: api_key(lookup("SAM_API_KEY")),
            chrome_bin: or_default("CHROME_BIN", "chromium"),
            selectors_path: PathBuf::from(or_default("SELECTORS_PATH", "data/selectors.json")),
            model_path: PathBuf::from(or_default("MODEL_PATH", "models/procurement_model.json")),
            config_path: lookup("PROCURECAST_CONFIG")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Tuning file named by `PROCURECAST_CONFIG`, or defaults when unset.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, CommonError> {
        match &self.config_path {
            Some(path) => PipelineConfig::load(path),
            None => Ok(PipelineConfig::default()),
        }
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.char_indices().nth(5).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  OLLAMA_URL: {} (model {})", self.ollama_url, self.ollama_model);
        tracing::info!("  NEWS_API_KEY: {}", preview_opt(&self.news_api_key));
        tracing::info!("  SAM_API_KEY: {}", preview_opt(&self.sam_api_key));
        tracing::info!("  CHROME_BIN: {}", self.chrome_bin);
        tracing::info!("  MODEL_PATH: {}", self.model_path.display());
    }
}

fn api_key(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| !PLACEHOLDER_KEYS.iter().any(|p| v.contains(p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn database_url_is_required() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, CommonError::MissingEnv("DATABASE_URL")));
    }

    #[test]
    fn defaults_fill_optional_values() {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.ollama_model, "llama3");
        assert_eq!(config.chrome_bin, "chromium");
        assert_eq!(config.selectors_path, PathBuf::from("data/selectors.json"));
        assert_eq!(config.model_path, PathBuf::from("models/procurement_model.json"));
        assert!(config.news_api_key.is_none());
        assert!(config.config_path.is_none());
    }

    #[test]
    fn placeholder_api_keys_count_as_unset() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("NEWS_API_KEY", "YOUR_ACTUAL_API_KEY"),
            ("SAM_API_KEY", "YOUR_SAM_API_KEY_HERE"),
        ]))
        .unwrap();
        assert!(config.news_api_key.is_none());
        assert!(config.sam_api_key.is_none());
    }

    #[test]
    fn real_api_keys_are_kept() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/procurecast"),
            ("NEWS_API_KEY", " abc123 "),
        ]))
        .unwrap();
        assert_eq!(config.news_api_key.as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_config_path_yields_default_tuning() {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();
        let pipeline = config.pipeline_config().unwrap();
        assert_eq!(pipeline.verifier.limit, 5);
    }
}
