// crates/catalog-core/src/job.rs
// ============================================================================
// Module: Job State & Progress
// Description: Shared vocabulary for long-running jobs (NRM, HC, quality
// analysis) that the control plane reports over HTTP/SSE (spec §4.11, §6).
// Purpose: Give every job producer one status shape so the control plane
// never has to special-case "normalization status" vs. "IC status" fields,
// and give every job an explicit state instead of inferring liveness from
// elapsed time (spec §9 Open Questions).
// Dependencies: serde, crate::time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::time::Timestamp;

/// Explicit lifecycle state of a long-running job.
///
/// # Invariants
/// - The control plane never infers `Stopped` from "no progress for N
///   minutes"; a job transitions here only by its own cooperative-stop
///   handling (spec §5, §9 Open Questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No run has started, or the previous run's summary has been consumed.
    Idle,
    /// Actively processing.
    Running,
    /// A stop was requested; in-flight work is draining (spec §5
    /// cancellation semantics).
    Stopping,
    /// Finished: either ran to completion or was stopped cooperatively.
    Stopped,
}

impl JobState {
    /// Returns whether the control plane should report `is_running = true`
    /// for this state.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }
}

/// A point-in-time snapshot of a job's progress (spec §4.11 status fields).
///
/// # Invariants
/// - `processed = success + errors` once the job has touched a unit of
///   work; `processed <= total` while `total` is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Current lifecycle state.
    pub state: JobState,
    /// Units of work processed so far.
    pub processed: u64,
    /// Total units of work, if known up front.
    pub total: u64,
    /// Units that completed successfully.
    pub success: u64,
    /// Units that errored (counted, not fatal to the job; spec §7).
    pub errors: u64,
    /// Time the current/last run started.
    pub started_at: Option<Timestamp>,
}

impl JobProgress {
    /// Returns a fresh idle progress snapshot.
    #[must_use]
    pub const fn idle() -> Self {
        Self { state: JobState::Idle, processed: 0, total: 0, success: 0, errors: 0, started_at: None }
    }

    /// Returns `processed / total` as a percentage in `[0, 100]`, or `0.0`
    /// before `total` is known.
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 { 0.0 } else { (self.processed as f64 / self.total as f64) * 100.0 }
    }

    /// Returns `processed / elapsed_seconds`, the throughput rate used in
    /// status responses (spec §6 `rate`).
    #[must_use]
    pub fn rate_per_second(&self, elapsed_seconds: f64) -> f64 {
        if elapsed_seconds <= 0.0 { 0.0 } else { self.processed as f64 / elapsed_seconds }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_state_is_not_running() {
        assert!(!JobState::Idle.is_running());
        assert!(!JobState::Stopped.is_running());
    }

    #[test]
    fn running_and_stopping_report_is_running() {
        assert!(JobState::Running.is_running());
        assert!(JobState::Stopping.is_running());
    }

    #[test]
    fn progress_percent_handles_zero_total() {
        assert_eq!(JobProgress::idle().progress_percent(), 0.0);
    }

    #[test]
    fn progress_percent_computes_ratio() {
        let progress = JobProgress { total: 200, processed: 50, ..JobProgress::idle() };
        assert!((progress.progress_percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rate_per_second_avoids_division_by_zero() {
        let progress = JobProgress { processed: 100, ..JobProgress::idle() };
        assert_eq!(progress.rate_per_second(0.0), 0.0);
    }
}
