use std::fmt;

use procurecast_common::SuspectDocument;

/// Stats from one feedback-loop pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedbackStats {
    pub candidates: u32,
    pub confirmed: u32,
    pub unconfirmed: u32,
    pub probe_errors: u32,
    pub inserted: u32,
    pub already_known: u32,
    pub insert_errors: u32,
}

impl fmt::Display for FeedbackStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "candidates={} confirmed={} unconfirmed={} probe_errors={} inserted={} already_known={} insert_errors={}",
            self.candidates,
            self.confirmed,
            self.unconfirmed,
            self.probe_errors,
            self.inserted,
            self.already_known,
            self.insert_errors,
        )
    }
}

/// Recently scraped documents that look like failed extractions.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AnomalyReport {
    pub window_days: i64,
    pub min_text_chars: usize,
    pub suspects: Vec<SuspectDocument>,
}

impl AnomalyReport {
    pub fn is_clean(&self) -> bool {
        self.suspects.is_empty()
    }

    pub fn document_ids(&self) -> Vec<i64> {
        self.suspects.iter().map(|s| s.document_id).collect()
    }
}

impl fmt::Display for AnomalyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} thin documents in the last {} days",
            self.suspects.len(),
            self.window_days
        )
    }
}

/// Stats from a supervisor run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SupervisorStats {
    pub feedback: FeedbackStats,
    pub anomalies: AnomalyReport,
}

impl fmt::Display for SupervisorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "feedback({}) anomalies({})", self.feedback, self.anomalies)
    }
}
