//! Labelled (agency, snapshot) training panel.

use std::collections::HashMap;

use chrono::{Duration, Months, NaiveDate};
use tracing::{debug, info};

use procurecast_common::{AgencyId, SolicitationDate};
use procurecast_store::{ProcurementStore, StoreResult};

use crate::features::features_as_of;

/// Cutoffs from `start`, every `step_months`, while not after `end`.
pub fn snapshot_dates(start: NaiveDate, end: NaiveDate, step_months: u32) -> Vec<NaiveDate> {
    if step_months == 0 {
        return if start <= end { vec![start] } else { Vec::new() };
    }
    (0..)
        .map_while(|i: u32| start.checked_add_months(Months::new(i * step_months)))
        .take_while(|d| *d <= end)
        .collect()
}

/// What happened after a cutoff for one agency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// A release fell in `(cutoff, cutoff + window]`.
    pub label: bool,
    /// Days to the first release after the cutoff, inside the window or not.
    pub days_to_event: Option<i64>,
}

/// Release dates per agency, sorted.
#[derive(Debug, Default, Clone)]
pub struct ReleaseIndex {
    by_agency: HashMap<AgencyId, Vec<NaiveDate>>,
}

impl ReleaseIndex {
    pub fn new(dates: impl IntoIterator<Item = SolicitationDate>) -> Self {
        let mut by_agency: HashMap<AgencyId, Vec<NaiveDate>> = HashMap::new();
        for d in dates {
            by_agency.entry(d.agency_id).or_default().push(d.release_date);
        }
        for releases in by_agency.values_mut() {
            releases.sort();
        }
        Self { by_agency }
    }

    pub fn outcome(&self, agency_id: AgencyId, cutoff: NaiveDate, window_days: i64) -> Outcome {
        let first_after = self.by_agency.get(&agency_id).and_then(|releases| {
            let idx = releases.partition_point(|d| *d <= cutoff);
            releases.get(idx).copied()
        });
        let horizon = cutoff + Duration::days(window_days);
        Outcome {
            label: first_after.is_some_and(|d| d <= horizon),
            days_to_event: first_after.map(|d| (d - cutoff).num_days()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub agency_id: AgencyId,
    pub snapshot_date: NaiveDate,
    pub features: Vec<f64>,
    pub label: bool,
    pub days_to_event: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    pub feature_names: Vec<String>,
    pub rows: Vec<PanelRow>,
}

impl Panel {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.rows.iter().filter(|r| r.label).count()
    }

    pub fn labels(&self) -> Vec<bool> {
        self.rows.iter().map(|r| r.label).collect()
    }

    /// The label for one (agency, snapshot) row.
    pub fn label(&self, agency_id: AgencyId, snapshot_date: NaiveDate) -> Option<bool> {
        self.rows
            .iter()
            .find(|r| r.agency_id == agency_id && r.snapshot_date == snapshot_date)
            .map(|r| r.label)
    }
}

/// One row per agency per cutoff: historical features, forward label.
pub async fn build_panel(
    store: &dyn ProcurementStore,
    cutoffs: &[NaiveDate],
    window_days: i64,
) -> StoreResult<Panel> {
    let releases = ReleaseIndex::new(store.solicitation_dates().await?);
    let mut panel = Panel::default();

    for &cutoff in cutoffs {
        let frame = features_as_of(store, cutoff).await?;
        if panel.feature_names.is_empty() {
            panel.feature_names = frame.feature_names().to_vec();
        }
        let before = panel.rows.len();
        for (idx, &agency_id) in frame.agency_ids().iter().enumerate() {
            let outcome = releases.outcome(agency_id, cutoff, window_days);
            panel.rows.push(PanelRow {
                agency_id,
                snapshot_date: cutoff,
                features: frame.row(idx).to_vec(),
                label: outcome.label,
                days_to_event: outcome.days_to_event,
            });
        }
        let positives = panel.rows[before..].iter().filter(|r| r.label).count();
        debug!(%cutoff, rows = panel.rows.len() - before, positives, "Snapshot built");
    }

    info!(
        snapshots = cutoffs.len(),
        rows = panel.len(),
        positives = panel.positives(),
        "Backtest panel built"
    );
    Ok(panel)
}
