use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use procurecast_common::AnomalyConfig;
use procurecast_store::ProcurementStore;

use crate::types::AnomalyReport;

/// Flag documents scraped in the window whose text is missing or short.
/// Reports only; nothing is modified.
pub async fn detect_anomalies(
    store: &dyn ProcurementStore,
    config: &AnomalyConfig,
    now: DateTime<Utc>,
) -> Result<AnomalyReport> {
    let since = now - Duration::days(config.window_days);
    let suspects = store
        .thin_documents(since, config.min_text_chars)
        .await
        .context("Failed to scan recent documents")?;

    let report = AnomalyReport {
        window_days: config.window_days,
        min_text_chars: config.min_text_chars,
        suspects,
    };

    if report.is_clean() {
        info!(window_days = config.window_days, "No thin documents found");
    } else {
        warn!(
            count = report.suspects.len(),
            document_ids = ?report.document_ids(),
            "Documents scraped recently with little or no text"
        );
        for doc in &report.suspects {
            warn!(
                document_id = doc.document_id,
                url = doc.url.as_str(),
                chars = ?doc.text_chars,
                "Thin document"
            );
        }
    }
    Ok(report)
}
