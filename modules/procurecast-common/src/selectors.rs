use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::CommonError;

/// How an override page is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    /// Headless browser render (default, handles JS-built listings).
    #[default]
    Browser,
    /// Plain HTTP GET, for sites that block automated browsers.
    Http,
}

/// Per-agency scrape rules keyed by agency name in the overrides file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectorOverride {
    /// CSS selector matching the anchor of each listed item.
    pub item_selector: Option<String>,
    /// Replaces the agency's planning/minutes pages with this listing.
    pub procurement_url: Option<String>,
    #[serde(default)]
    pub fetcher: FetcherKind,
}

#[derive(Debug, Clone, Default)]
pub struct SelectorOverrides {
    by_agency: HashMap<String, SelectorOverride>,
}

impl SelectorOverrides {
    pub fn parse(json: &str) -> Result<Self, CommonError> {
        let by_agency: HashMap<String, SelectorOverride> = serde_json::from_str(json)?;
        Ok(Self { by_agency })
    }

    /// Load the overrides file. A missing or malformed file is not fatal:
    /// it logs a warning and yields no overrides.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read selector overrides, proceeding without");
                return Self::default();
            }
        };

        match Self::parse(&content) {
            Ok(overrides) => {
                info!(path = %path.display(), agencies = overrides.len(), "Loaded selector overrides");
                overrides
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not parse selector overrides, proceeding without");
                Self::default()
            }
        }
    }

    pub fn get(&self, agency_name: &str) -> Option<&SelectorOverride> {
        self.by_agency.get(agency_name)
    }

    pub fn insert(&mut self, agency_name: impl Into<String>, rule: SelectorOverride) {
        self.by_agency.insert(agency_name.into(), rule);
    }

    pub fn len(&self) -> usize {
        self.by_agency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_agency.is_empty()
    }
}
