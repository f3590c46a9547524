//! The persisted model: booster plus the feature contract it was trained on.

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ForecastError, ForecastResult};
use crate::features::{align_row, FeatureFrame};
use crate::gbdt::Booster;
use crate::metrics::Metrics;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    /// Column order the booster expects.
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub metrics: Option<Metrics>,
    pub booster: Booster,
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

impl ModelArtifact {
    pub fn new(feature_names: Vec<String>, booster: Booster, metrics: Option<Metrics>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            trained_at: Utc::now(),
            feature_names,
            metrics,
            booster,
        }
    }

    /// Write via a temp file in the same directory, then rename over `path`.
    pub fn save(&self, path: &Path) -> ForecastResult<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ForecastError::Io(e.error))?;

        info!(path = %path.display(), features = self.feature_names.len(), "Model artifact written");
        Ok(())
    }

    pub fn load(path: &Path) -> ForecastResult<Self> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ForecastError::ModelMissing(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let probe: VersionProbe = serde_json::from_slice(&raw)?;
        if probe.format_version != FORMAT_VERSION {
            return Err(ForecastError::UnsupportedFormat {
                found: probe.format_version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Class-1 probability for a row already in `feature_names` order.
    pub fn predict_row(&self, row: &[f64]) -> ForecastResult<f64> {
        if row.len() != self.feature_names.len() {
            return Err(ForecastError::FeatureCount {
                found: row.len(),
                expected: self.feature_names.len(),
            });
        }
        Ok(self.booster.predict_proba(row))
    }

    /// Score a row labelled by `names`, reconciling it to the trained columns.
    pub fn predict_named(&self, names: &[String], row: &[f64]) -> f64 {
        self.booster.predict_proba(&align_row(names, row, &self.feature_names))
    }

    /// Aligned feature rows and their probabilities, in frame order.
    pub fn score_frame(&self, frame: &FeatureFrame) -> Vec<(Vec<f64>, f64)> {
        frame
            .aligned_rows(&self.feature_names)
            .into_iter()
            .map(|row| {
                let p = self.booster.predict_proba(&row);
                (row, p)
            })
            .collect()
    }
}
