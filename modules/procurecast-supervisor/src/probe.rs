//! Confirmation probes: given a high-confidence prediction, look for a real
//! solicitation that resolves it.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use procurecast_common::{AgencyId, Attempt, NewSolicitation, VerifierCandidate};

/// What a probe is asked to confirm.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    pub agency_id: AgencyId,
    pub name: String,
    pub procurement_url: Option<String>,
    pub prob_12_months: f64,
    /// Release date to record on a confirmation.
    pub as_of: NaiveDate,
}

impl ProbeTarget {
    pub fn from_candidate(candidate: VerifierCandidate, as_of: NaiveDate) -> Self {
        Self {
            agency_id: candidate.agency_id,
            name: candidate.name,
            procurement_url: candidate.procurement_url,
            prob_12_months: candidate.prob_12_months,
            as_of,
        }
    }
}

/// `Ok(Some)` is a confirmed solicitation, `Ok(None)` found nothing.
pub type ConfirmationProbe = dyn Attempt<ProbeTarget, Output = Option<NewSolicitation>>;

pub const SIMULATED_TITLE: &str = "Simulated ITS Smart Corridor RFP";

/// Stand-in probe: confirms with a fixed probability.
pub struct StochasticProbe {
    rng: Mutex<StdRng>,
    success_rate: f64,
}

impl StochasticProbe {
    pub fn new(success_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }

    fn roll(&self) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.random::<f64>() < self.success_rate
    }
}

#[async_trait]
impl Attempt<ProbeTarget> for StochasticProbe {
    type Output = Option<NewSolicitation>;

    async fn attempt(&self, target: &ProbeTarget) -> Result<Self::Output> {
        if !self.roll() {
            return Ok(None);
        }
        Ok(Some(NewSolicitation {
            agency_id: Some(target.agency_id),
            release_date: target.as_of,
            title: SIMULATED_TITLE.to_string(),
            url: format!("https://simulated.invalid/solicitations/{}", Uuid::new_v4()),
            keywords: Vec::new(),
        }))
    }

    fn name(&self) -> &str {
        "stochastic"
    }
}
