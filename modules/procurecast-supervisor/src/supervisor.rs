use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{info, warn};

use procurecast_common::{AnomalyConfig, VerifierConfig};
use procurecast_store::ProcurementStore;

use crate::anomalies::detect_anomalies;
use crate::feedback::run_feedback_loop;
use crate::probe::ConfirmationProbe;
use crate::types::{AnomalyReport, FeedbackStats, SupervisorStats};

/// Closes the loop between predictions and outcomes, then checks harvest health.
pub struct Supervisor {
    store: Arc<dyn ProcurementStore>,
    probe: Box<ConfirmationProbe>,
    verifier: VerifierConfig,
    anomaly: AnomalyConfig,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        probe: Box<ConfirmationProbe>,
        verifier: VerifierConfig,
        anomaly: AnomalyConfig,
    ) -> Self {
        Self {
            store,
            probe,
            verifier,
            anomaly,
        }
    }

    /// Feedback loop, then anomaly scan. A failed phase is logged and the
    /// other still runs; the run fails only if both do.
    pub async fn run(&self) -> Result<SupervisorStats> {
        let mut stats = SupervisorStats::default();
        let mut failed = 0;

        match self.feedback().await {
            Ok(feedback) => stats.feedback = feedback,
            Err(e) => {
                warn!(error = %e, "Feedback loop failed");
                failed += 1;
            }
        }
        match self.anomalies().await {
            Ok(report) => stats.anomalies = report,
            Err(e) => {
                warn!(error = %e, "Anomaly scan failed");
                failed += 1;
            }
        }
        if failed == 2 {
            bail!("feedback loop and anomaly scan both failed");
        }

        info!("Supervisor run complete. {stats}");
        Ok(stats)
    }

    pub async fn feedback(&self) -> Result<FeedbackStats> {
        run_feedback_loop(
            self.store.as_ref(),
            self.probe.as_ref(),
            &self.verifier,
            Utc::now().date_naive(),
        )
        .await
    }

    pub async fn anomalies(&self) -> Result<AnomalyReport> {
        detect_anomalies(self.store.as_ref(), &self.anomaly, Utc::now()).await
    }
}
