//! End-of-run report.

use scope_storage::JobResult;
use serde::Serialize;
use std::time::Duration;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every planned position was visited.
    Completed,
    /// Stopped by an abort request.
    Aborted,
    /// Stopped by a fatal error.
    Failed(String),
}

/// A region cut short by camera failures or an autofocus skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionError {
    /// Timepoint index
    pub timepoint: usize,
    /// Region name
    pub region: String,
    /// Error text
    pub message: String,
}

/// An autofocus run that did not lock focus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutofocusFailure {
    /// Timepoint index
    pub timepoint: usize,
    /// Region name
    pub region: String,
    /// FOV index within the region
    pub fov: usize,
    /// Error text, or "no focus found"
    pub message: String,
}

/// Everything an observer needs to judge a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Experiment id of the run
    pub experiment_id: String,
    /// Terminal outcome
    pub outcome: RunOutcome,
    /// Frames captured
    pub captures: u64,
    /// Frames the plan called for
    pub expected_captures: u64,
    /// Save jobs accepted by the queue
    pub jobs_submitted: u64,
    /// Save jobs that wrote their file
    pub jobs_succeeded: u64,
    /// Jobs that ran and failed or panicked
    pub failed_jobs: Vec<JobResult>,
    /// Jobs cut off by the drain timeout
    pub abandoned_jobs: Vec<JobResult>,
    /// Regions cut short
    pub region_errors: Vec<RegionError>,
    /// Autofocus misses, including those the policy let through
    pub autofocus_failures: Vec<AutofocusFailure>,
    /// Wall time from start to drain
    pub elapsed: Duration,
}

impl RunSummary {
    /// Completed with every job written and no region or focus problems.
    pub fn is_clean(&self) -> bool {
        self.outcome == RunOutcome::Completed
            && self.failed_jobs.is_empty()
            && self.abandoned_jobs.is_empty()
            && self.region_errors.is_empty()
            && self.autofocus_failures.is_empty()
            && self.jobs_succeeded == self.jobs_submitted
    }
}
