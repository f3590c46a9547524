use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{error, info, warn};

/// What a batch stage reports to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed { summary: String },
    Skipped { reason: String },
    Failed { error: String },
}

impl StageOutcome {
    pub fn completed(summary: impl fmt::Display) -> Self {
        Self::Completed {
            summary: summary.to_string(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Process exit code: failures are 1, everything else 0.
    pub fn exit_code(&self) -> i32 {
        if self.is_failed() {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { summary } => write!(f, "completed: {summary}"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Run one stage to an outcome. Errors and panics stop at this boundary.
pub async fn run_stage<F>(name: &str, stage: F) -> StageOutcome
where
    F: Future<Output = anyhow::Result<StageOutcome>>,
{
    info!(stage = name, "Stage starting");

    let outcome = match AssertUnwindSafe(stage).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => StageOutcome::Failed {
            error: format!("{e:#}"),
        },
        Err(panic) => StageOutcome::Failed {
            error: panic_message(panic.as_ref()),
        },
    };

    match &outcome {
        StageOutcome::Completed { summary } => info!(stage = name, %summary, "Stage completed"),
        StageOutcome::Skipped { reason } => warn!(stage = name, %reason, "Stage skipped"),
        StageOutcome::Failed { error } => error!(stage = name, %error, "Stage failed"),
    }

    outcome
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
