//! Multi-point acquisition controller.
//!
//! The controller is the only entry point for starting, observing and
//! aborting a run. `run_acquisition` validates the request, plans the scan,
//! claims the hardware and spawns three tasks:
//!
//! - the [`MultiPointWorker`] scan loop
//! - a result pump forwarding [`JobResult`]s to the observers
//! - a supervisor that waits for the worker, drains the job pool, publishes
//!   the [`RunSummary`] and returns the controller to `Idle`
//!
//! The caller's task never runs hardware code.
//!
//! ```rust,ignore
//! let controller = MultiPointController::new(microscope, planner, gate, ScopeConfig::default());
//! controller.register_callbacks(AcquisitionCallbacks::new().on_finished(|s| println!("{:?}", s)));
//! controller.run_acquisition(params).await?;
//! let summary = controller.wait_for_completion().await;
//! ```

use crate::callbacks::AcquisitionCallbacks;
use crate::config::ScopeConfig;
use crate::error::{AcquisitionError, AcquisitionResult};
use crate::hardware::Microscope;
use crate::parameters::AcquisitionParameters;
use crate::scan_positions::ScanPositionInformation;
use crate::state::{AbortHandle, AcquisitionState, RunControl};
use crate::summary::{RunOutcome, RunSummary};
use crate::worker::{MultiPointWorker, SaveTarget, WorkerReport};
use chrono::Utc;
use parking_lot::Mutex;
use scope_core::mode_gate::ModeGate;
use scope_core::planner::CoordinatePlanner;
use scope_storage::metadata::{write_coordinates, write_manifest};
use scope_storage::{job_queue, JobError, JobResult, JobRunner};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Contents of `acquisition_parameters.json`.
#[derive(Debug, Serialize)]
struct Manifest<'a> {
    #[serde(flatten)]
    parameters: &'a AcquisitionParameters,
    regions: Vec<&'a str>,
    total_fovs: usize,
    expected_images: u64,
}

/// Job results collected by the pump.
#[derive(Debug, Default)]
struct JobTally {
    succeeded: u64,
    failed: Vec<JobResult>,
    abandoned: Vec<JobResult>,
}

/// Starts, observes and aborts acquisition runs.
pub struct MultiPointController {
    microscope: Microscope,
    planner: Arc<dyn CoordinatePlanner>,
    mode_gate: Arc<dyn ModeGate>,
    config: ScopeConfig,
    control: Arc<RunControl>,
    callbacks: Mutex<Arc<AcquisitionCallbacks>>,
    supervisor: Mutex<Option<JoinHandle<RunSummary>>>,
    last_summary: Arc<Mutex<Option<RunSummary>>>,
}

impl MultiPointController {
    /// Controller over a device bundle. Nothing runs until `run_acquisition`.
    pub fn new(
        microscope: Microscope,
        planner: Arc<dyn CoordinatePlanner>,
        mode_gate: Arc<dyn ModeGate>,
        config: ScopeConfig,
    ) -> Self {
        Self {
            microscope,
            planner,
            mode_gate,
            config,
            control: Arc::new(RunControl::new()),
            callbacks: Mutex::new(Arc::new(AcquisitionCallbacks::default())),
            supervisor: Mutex::new(None),
            last_summary: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace the observer hooks. Takes effect for the next run.
    pub fn register_callbacks(&self, callbacks: AcquisitionCallbacks) {
        *self.callbacks.lock() = Arc::new(callbacks);
    }

    /// Current run state.
    pub fn state(&self) -> AcquisitionState {
        self.control.state()
    }

    /// True from `run_acquisition` until the worker has exited and the job
    /// pool has drained.
    pub fn acquisition_in_progress(&self) -> bool {
        self.control.state().is_active()
    }

    /// Request a cooperative abort. Idempotent, non-blocking, and a no-op
    /// when no run is active.
    pub fn abort_acquisition(&self) {
        if !self.control.request_abort() {
            tracing::debug!(state = %self.state(), "Abort ignored");
        }
    }

    /// Handle that can abort runs of this controller from anywhere.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(self.control.clone())
    }

    /// Settings the controller was built with.
    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Frames a run of `params` would capture: `Nt × ΣFOV × NZ × channels`.
    pub fn expected_image_count(&self, params: &AcquisitionParameters) -> AcquisitionResult<u64> {
        let positions = self.plan()?;
        image_count(params, &positions)
    }

    fn plan(&self) -> AcquisitionResult<ScanPositionInformation> {
        let plans = self
            .planner
            .compute_scan_positions()
            .map_err(|e| AcquisitionError::Planning(format!("{:#}", e)))?;
        ScanPositionInformation::from_plans(plans)
    }

    /// Validate `params`, plan the scan and start the run in the background.
    ///
    /// Returns once the worker is spawned; `on_finished` then fires exactly
    /// once. Requests rejected before the start (invalid parameters, planning,
    /// busy) fire nothing. A metadata write failure after the start fires
    /// `on_finished` with a `Failed` summary and returns the error.
    pub async fn run_acquisition(&self, mut params: AcquisitionParameters) -> AcquisitionResult<()> {
        params.validate()?;
        self.microscope.check_supports(&params)?;
        let positions = Arc::new(self.plan()?);
        let expected = image_count(&params, &positions)?;

        if !self
            .control
            .transition(AcquisitionState::Idle, AcquisitionState::Running)
        {
            return Err(AcquisitionError::AlreadyRunning);
        }
        // The token is clear here: every run leaves through `finish`, which
        // resets it. An abort from this point on belongs to this run.
        if !self.mode_gate.engage() {
            tracing::warn!("Microscope mode gate is held elsewhere");
            self.control.abort_token().reset();
            self.control.set(AcquisitionState::Idle);
            return Err(AcquisitionError::AlreadyRunning);
        }

        params.acquisition_start_time = Utc::now();
        let params = Arc::new(params);
        let callbacks = self.callbacks.lock().clone();
        let started = tokio::time::Instant::now();

        tracing::info!(
            experiment = %params.experiment_id,
            expected_images = expected,
            skip_saving = params.skip_saving,
            "Starting acquisition"
        );

        if !params.skip_saving {
            if let Err(e) = write_experiment_metadata(params.clone(), positions.clone(), expected).await {
                tracing::error!(error = %e, "Failed to write experiment metadata");
                self.control.set(AcquisitionState::Error);
                let summary = RunSummary {
                    experiment_id: params.experiment_id.clone(),
                    outcome: RunOutcome::Failed(e.to_string()),
                    captures: 0,
                    expected_captures: expected,
                    jobs_submitted: 0,
                    jobs_succeeded: 0,
                    failed_jobs: Vec::new(),
                    abandoned_jobs: Vec::new(),
                    region_errors: Vec::new(),
                    autofocus_failures: Vec::new(),
                    elapsed: started.elapsed(),
                };
                finish(
                    &self.control,
                    self.mode_gate.as_ref(),
                    &callbacks,
                    &self.last_summary,
                    &summary,
                );
                return Err(e);
            }
        }

        let failed_jobs = Arc::new(AtomicUsize::new(0));
        let (pipeline, save) = if params.skip_saving {
            (None, None)
        } else {
            let (submitter, receiver) = job_queue(self.config.pipeline.queue_capacity);
            let (result_tx, result_rx) = mpsc::unbounded_channel();
            let runner = JobRunner::spawn(receiver, self.config.pipeline.workers, result_tx);
            let pump = tokio::spawn(pump_results(
                result_rx,
                callbacks.clone(),
                failed_jobs.clone(),
            ));
            let save = SaveTarget {
                submitter,
                options: self.config.storage.save_options(params.experiment_dir()),
            };
            (Some((runner, pump)), Some(save))
        };

        let worker = MultiPointWorker::new(
            params.clone(),
            positions,
            self.microscope.clone(),
            self.config.acquisition.clone(),
            callbacks.clone(),
            self.control.clone(),
            save,
            failed_jobs,
        );
        let worker = tokio::spawn(worker.run());

        let supervisor = tokio::spawn(supervise(Supervision {
            experiment_id: params.experiment_id.clone(),
            expected,
            started,
            worker,
            pipeline,
            drain_timeout: self.config.pipeline.drain_timeout(),
            control: self.control.clone(),
            mode_gate: self.mode_gate.clone(),
            callbacks,
            last_summary: self.last_summary.clone(),
        }));
        *self.supervisor.lock() = Some(supervisor);
        Ok(())
    }

    /// Wait for the current run to finish and return its summary.
    ///
    /// With no run in flight, returns the last run's summary (if any).
    pub async fn wait_for_completion(&self) -> Option<RunSummary> {
        let handle = self.supervisor.lock().take();
        match handle {
            Some(handle) => match handle.await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    tracing::error!(error = %e, "Acquisition supervisor task failed");
                    None
                }
            },
            None => self.last_summary.lock().clone(),
        }
    }

    /// Summary of the most recent finished run.
    pub fn last_summary(&self) -> Option<RunSummary> {
        self.last_summary.lock().clone()
    }
}

fn image_count(
    params: &AcquisitionParameters,
    positions: &ScanPositionInformation,
) -> AcquisitionResult<u64> {
    params.image_count(positions.total_fovs()).ok_or_else(|| {
        AcquisitionError::InvalidParameters(format!(
            "{} timepoints over {} FOVs overflow the image count",
            params.nt,
            positions.total_fovs()
        ))
    })
}

async fn write_experiment_metadata(
    params: Arc<AcquisitionParameters>,
    positions: Arc<ScanPositionInformation>,
    expected: u64,
) -> AcquisitionResult<()> {
    let written = tokio::task::spawn_blocking(move || {
        let dir = params.experiment_dir();
        let manifest = Manifest {
            parameters: &params,
            regions: positions.region_names().collect(),
            total_fovs: positions.total_fovs(),
            expected_images: expected,
        };
        write_manifest(&dir, &manifest)?;
        write_coordinates(&dir, &positions.planned_coordinates())?;
        Ok::<_, scope_storage::StorageError>(())
    })
    .await;

    match written {
        Ok(result) => result.map_err(AcquisitionError::from),
        Err(e) => Err(AcquisitionError::Io(std::io::Error::other(format!(
            "metadata writer failed: {}",
            e
        )))),
    }
}

async fn pump_results(
    mut results: mpsc::UnboundedReceiver<JobResult>,
    callbacks: Arc<AcquisitionCallbacks>,
    failed: Arc<AtomicUsize>,
) -> JobTally {
    let mut tally = JobTally::default();
    while let Some(result) = results.recv().await {
        callbacks.job_result(&result);
        match &result.outcome {
            Ok(_) => tally.succeeded += 1,
            Err(JobError::Abandoned) => tally.abandoned.push(result),
            Err(_) => {
                failed.fetch_add(1, Ordering::SeqCst);
                tally.failed.push(result);
            }
        }
    }
    tally
}

struct Supervision {
    experiment_id: String,
    expected: u64,
    started: tokio::time::Instant,
    worker: JoinHandle<WorkerReport>,
    pipeline: Option<(JobRunner, JoinHandle<JobTally>)>,
    drain_timeout: std::time::Duration,
    control: Arc<RunControl>,
    mode_gate: Arc<dyn ModeGate>,
    callbacks: Arc<AcquisitionCallbacks>,
    last_summary: Arc<Mutex<Option<RunSummary>>>,
}

async fn supervise(s: Supervision) -> RunSummary {
    let report = match s.worker.await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Acquisition worker task failed");
            WorkerReport::failed(format!("worker task failed: {}", e))
        }
    };

    let tally = match s.pipeline {
        Some((runner, pump)) => {
            let drain = runner.shutdown(s.drain_timeout).await;
            if !drain.drained {
                tracing::warn!(
                    abandoned = drain.abandoned.len(),
                    "Job pool did not drain in time"
                );
            }
            match pump.await {
                Ok(tally) => tally,
                Err(e) => {
                    tracing::error!(error = %e, "Job result pump failed");
                    JobTally::default()
                }
            }
        }
        None => JobTally::default(),
    };

    // An abort that raced with the last FOV still ends as Aborted.
    let outcome = match report.outcome {
        RunOutcome::Completed if s.control.state() == AcquisitionState::Aborting => {
            RunOutcome::Aborted
        }
        other => other,
    };
    s.control.set(match outcome {
        RunOutcome::Completed => AcquisitionState::Completed,
        RunOutcome::Aborted => AcquisitionState::Aborted,
        RunOutcome::Failed(_) => AcquisitionState::Error,
    });

    let summary = RunSummary {
        experiment_id: s.experiment_id,
        outcome,
        captures: report.captures,
        expected_captures: s.expected,
        jobs_submitted: report.jobs_submitted,
        jobs_succeeded: tally.succeeded,
        failed_jobs: tally.failed,
        abandoned_jobs: tally.abandoned,
        region_errors: report.region_errors,
        autofocus_failures: report.autofocus_failures,
        elapsed: s.started.elapsed(),
    };

    tracing::info!(
        experiment = %summary.experiment_id,
        outcome = ?summary.outcome,
        captures = summary.captures,
        expected = summary.expected_captures,
        jobs_succeeded = summary.jobs_succeeded,
        jobs_failed = summary.failed_jobs.len(),
        jobs_abandoned = summary.abandoned_jobs.len(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Acquisition finished"
    );

    finish(
        &s.control,
        s.mode_gate.as_ref(),
        &s.callbacks,
        &s.last_summary,
        &summary,
    );
    summary
}

/// Single exit path: release the gate, publish, return to `Idle`.
fn finish(
    control: &RunControl,
    mode_gate: &dyn ModeGate,
    callbacks: &AcquisitionCallbacks,
    last_summary: &Mutex<Option<RunSummary>>,
    summary: &RunSummary,
) {
    mode_gate.release();
    *last_summary.lock() = Some(summary.clone());
    callbacks.finished(summary);
    control.abort_token().reset();
    control.set(AcquisitionState::Idle);
}
