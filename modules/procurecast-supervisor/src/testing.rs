// Scripted confirmation probes for feedback-loop tests.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use procurecast_common::{AgencyId, Attempt, NewSolicitation};

use crate::probe::ProbeTarget;

/// Confirms exactly the listed agencies, with a fixed URL per agency, and
/// records every agency it was asked about.
#[derive(Default)]
pub struct ScriptedProbe {
    confirm: HashSet<AgencyId>,
    fail: HashSet<AgencyId>,
    asked: Mutex<Vec<AgencyId>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirming(mut self, agency_id: AgencyId) -> Self {
        self.confirm.insert(agency_id);
        self
    }

    pub fn failing(mut self, agency_id: AgencyId) -> Self {
        self.fail.insert(agency_id);
        self
    }

    pub fn asked(&self) -> Vec<AgencyId> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Attempt<ProbeTarget> for ScriptedProbe {
    type Output = Option<NewSolicitation>;

    async fn attempt(&self, target: &ProbeTarget) -> Result<Self::Output> {
        self.asked.lock().unwrap().push(target.agency_id);
        if self.fail.contains(&target.agency_id) {
            bail!("probe could not reach {}", target.name);
        }
        if !self.confirm.contains(&target.agency_id) {
            return Ok(None);
        }
        Ok(Some(NewSolicitation {
            agency_id: Some(target.agency_id),
            release_date: target.as_of,
            title: format!("{} ITS RFP", target.name),
            url: format!("https://scripted.test/rfp/{}", target.agency_id),
            keywords: Vec::new(),
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
