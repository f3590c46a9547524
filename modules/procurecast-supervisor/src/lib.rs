pub mod anomalies;
pub mod feedback;
pub mod probe;
pub mod supervisor;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use anomalies::detect_anomalies;
pub use feedback::run_feedback_loop;
pub use probe::{ConfirmationProbe, ProbeTarget, StochasticProbe, SIMULATED_TITLE};
pub use supervisor::Supervisor;
pub use types::{AnomalyReport, FeedbackStats, SupervisorStats};
