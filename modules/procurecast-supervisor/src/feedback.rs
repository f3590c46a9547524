use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use procurecast_common::{Attempt, InsertOutcome, VerifierConfig};
use procurecast_store::ProcurementStore;

use crate::probe::{ConfirmationProbe, ProbeTarget};
use crate::types::FeedbackStats;

/// Probe high-confidence predictions with no recent solicitation and record
/// every confirmation as ground truth for the next training cycle.
pub async fn run_feedback_loop(
    store: &dyn ProcurementStore,
    probe: &ConfirmationProbe,
    config: &VerifierConfig,
    today: NaiveDate,
) -> Result<FeedbackStats> {
    let quiet_since = today - Duration::days(config.quiet_days);
    let candidates = store
        .verifier_candidates(config.min_probability, quiet_since, config.limit)
        .await
        .context("Failed to load verifier candidates")?;

    let mut stats = FeedbackStats::default();
    if candidates.is_empty() {
        info!("No new high-probability targets to check");
        return Ok(stats);
    }

    for candidate in candidates {
        stats.candidates += 1;
        let target = ProbeTarget::from_candidate(candidate, today);
        info!(
            agency = target.name.as_str(),
            prob = target.prob_12_months,
            probe = probe.name(),
            "Checking for new solicitations"
        );

        let solicitation = match probe.attempt(&target).await {
            Ok(Some(solicitation)) => solicitation,
            Ok(None) => {
                stats.unconfirmed += 1;
                continue;
            }
            Err(e) => {
                warn!(agency = target.name.as_str(), error = %e, "Confirmation probe failed");
                stats.probe_errors += 1;
                continue;
            }
        };

        match store.insert_solicitation(&solicitation).await {
            Ok(InsertOutcome::Inserted) => {
                info!(
                    agency = target.name.as_str(),
                    url = solicitation.url.as_str(),
                    "Confirmed solicitation added to ground truth"
                );
                stats.confirmed += 1;
                stats.inserted += 1;
            }
            Ok(InsertOutcome::AlreadyPresent) => {
                stats.confirmed += 1;
                stats.already_known += 1;
            }
            Err(e) => {
                warn!(
                    agency = target.name.as_str(),
                    url = solicitation.url.as_str(),
                    error = %e,
                    "Failed to store confirmed solicitation"
                );
                stats.insert_errors += 1;
            }
        }
    }

    info!(%stats, "Feedback loop complete");
    Ok(stats)
}
