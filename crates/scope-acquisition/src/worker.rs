//! Multi-point scan loop.
//!
//! One [`MultiPointWorker`] owns the stage, camera and illumination for a
//! whole run. It walks timepoints, regions, FOVs, z-levels and channels in
//! that nesting order, publishes each frame to the observers and hands a copy
//! to the job queue. A z-level that captured all three LED-matrix R/G/B
//! channels also queues their RGB composite. Each timepoint that scans to the
//! end gets a `.done` marker next to its `coordinates.csv`.
//!
//! # Failure handling
//!
//! - Camera trigger/read errors are retried; exhaustion ends the region.
//! - Autofocus misses follow [`AutofocusPolicy`].
//! - Stage, illumination, piezo and fluidics errors end the run.
//!
//! # Cancellation points
//!
//! The abort token is checked at the start of every FOV (before the stage
//! moves, so the stage stays at the last completed FOV), between z-levels,
//! and during the inter-timepoint wait.

use crate::abort::AbortToken;
use crate::callbacks::AcquisitionCallbacks;
use crate::capture::CaptureInfo;
use crate::config::{AcquisitionConfig, AutofocusPolicy};
use crate::error::{AcquisitionError, AcquisitionResult};
use crate::hardware::Microscope;
use crate::parameters::AcquisitionParameters;
use crate::progress::{OverallProgressUpdate, RegionProgressUpdate};
use crate::scan_positions::ScanPositionInformation;
use crate::state::RunControl;
use crate::summary::{AutofocusFailure, RegionError, RunOutcome};
use crate::z_stack::ZStackPlan;
use chrono::{Local, Utc};
use scope_core::capabilities::StagePosition;
use scope_core::data::Frame;
use scope_core::planner::FovCoordinate;
use scope_storage::metadata::{write_coordinates, write_done_marker, AcquiredCoordinate};
use scope_storage::{
    rgb_plane_of, ImageName, JobImage, JobSubmitter, RgbCompositeJob, SaveImageJob, SaveOptions,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Whether the loop should keep going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Aborted,
}

/// Where frames go besides the observers.
pub(crate) struct SaveTarget {
    pub(crate) submitter: JobSubmitter,
    pub(crate) options: SaveOptions,
}

/// What the worker reports back to the controller.
#[derive(Debug, Clone)]
pub(crate) struct WorkerReport {
    pub(crate) outcome: RunOutcome,
    pub(crate) captures: u64,
    pub(crate) jobs_submitted: u64,
    pub(crate) region_errors: Vec<RegionError>,
    pub(crate) autofocus_failures: Vec<AutofocusFailure>,
}

impl WorkerReport {
    pub(crate) fn failed(reason: impl Into<String>) -> Self {
        Self {
            outcome: RunOutcome::Failed(reason.into()),
            captures: 0,
            jobs_submitted: 0,
            region_errors: Vec::new(),
            autofocus_failures: Vec::new(),
        }
    }
}

/// Executes one acquisition run.
pub(crate) struct MultiPointWorker {
    params: Arc<AcquisitionParameters>,
    positions: Arc<ScanPositionInformation>,
    hw: Microscope,
    settings: AcquisitionConfig,
    callbacks: Arc<AcquisitionCallbacks>,
    control: Arc<RunControl>,
    save: Option<SaveTarget>,
    failed_jobs: Arc<AtomicUsize>,

    capture_index: u64,
    jobs_submitted: u64,
    af_fov_count: usize,
    focus_memory: HashMap<(usize, usize), f64>,
    coordinates: Vec<AcquiredCoordinate>,
    region_errors: Vec<RegionError>,
    autofocus_failures: Vec<AutofocusFailure>,
}

impl MultiPointWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        params: Arc<AcquisitionParameters>,
        positions: Arc<ScanPositionInformation>,
        hw: Microscope,
        settings: AcquisitionConfig,
        callbacks: Arc<AcquisitionCallbacks>,
        control: Arc<RunControl>,
        save: Option<SaveTarget>,
        failed_jobs: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            params,
            positions,
            hw,
            settings,
            callbacks,
            control,
            save,
            failed_jobs,
            capture_index: 0,
            jobs_submitted: 0,
            af_fov_count: 0,
            focus_memory: HashMap::new(),
            coordinates: Vec::new(),
            region_errors: Vec::new(),
            autofocus_failures: Vec::new(),
        }
    }

    fn abort_token(&self) -> &AbortToken {
        self.control.abort_token()
    }

    /// Run to completion, abort or fatal error. Consumes the worker so the
    /// job submitter is dropped when the scan ends.
    pub(crate) async fn run(mut self) -> WorkerReport {
        self.callbacks.acquisition_start(&self.params);
        tracing::info!(
            experiment = %self.params.experiment_id,
            regions = self.positions.region_count(),
            fovs = self.positions.total_fovs(),
            nz = self.params.nz,
            nt = self.params.nt,
            channels = self.params.channels.len(),
            "Acquisition started"
        );

        let outcome = match self.hw.camera.start_streaming().await {
            Ok(()) => {
                let result = self.run_timepoints().await;
                if let Err(e) = self.hw.camera.stop_streaming().await {
                    tracing::warn!(error = %e, "Failed to stop camera streaming");
                }
                match result {
                    Ok(Flow::Continue) => RunOutcome::Completed,
                    Ok(Flow::Aborted) => RunOutcome::Aborted,
                    Err(e) => {
                        tracing::error!(error = %e, "Acquisition failed");
                        RunOutcome::Failed(e.to_string())
                    }
                }
            }
            Err(e) => {
                let e = AcquisitionError::hardware("camera start_streaming", e);
                tracing::error!(error = %e, "Acquisition failed before the first capture");
                RunOutcome::Failed(e.to_string())
            }
        };

        tracing::info!(
            experiment = %self.params.experiment_id,
            outcome = ?outcome,
            captures = self.capture_index,
            "Acquisition loop finished"
        );

        WorkerReport {
            outcome,
            captures: self.capture_index,
            jobs_submitted: self.jobs_submitted,
            region_errors: self.region_errors,
            autofocus_failures: self.autofocus_failures,
        }
    }

    async fn run_timepoints(&mut self) -> AcquisitionResult<Flow> {
        let start = Instant::now();
        let nt = self.params.nt;
        let interval = Duration::try_from_secs_f64(self.params.delta_t_s).map_err(|e| {
            AcquisitionError::InvalidParameters(format!(
                "delta_t_s {}: {}",
                self.params.delta_t_s, e
            ))
        })?;

        for timepoint in 0..nt {
            if self.abort_token().is_requested() {
                return Ok(Flow::Aborted);
            }
            tracing::info!(timepoint, total = nt, "Timepoint started");

            if self.params.use_fluidics {
                if let Some(fluidics) = &self.hw.fluidics {
                    fluidics
                        .before_imaging(timepoint)
                        .await
                        .map_err(|e| AcquisitionError::hardware("fluidics before imaging", e))?;
                }
            }

            self.coordinates.clear();
            let flow = self.run_timepoint(timepoint).await;
            self.flush_coordinates(timepoint).await;
            if flow? == Flow::Aborted {
                return Ok(Flow::Aborted);
            }
            self.mark_timepoint_done(timepoint).await;

            if self.params.use_fluidics {
                if let Some(fluidics) = &self.hw.fluidics {
                    fluidics
                        .after_imaging(timepoint)
                        .await
                        .map_err(|e| AcquisitionError::hardware("fluidics after imaging", e))?;
                }
            }

            if timepoint + 1 < nt && !interval.is_zero() {
                let deadline = timepoint_deadline(start, interval, timepoint).ok_or_else(|| {
                    AcquisitionError::InvalidParameters(format!(
                        "timepoint {} of interval {:?} is beyond the clock range",
                        timepoint + 1,
                        interval
                    ))
                })?;
                let now = Instant::now();
                if now > deadline {
                    tracing::warn!(
                        timepoint,
                        overrun_ms = (now - deadline).as_millis() as u64,
                        "Timepoint took longer than the interval, starting the next one now"
                    );
                } else if self.abort_token().sleep_until(deadline).await {
                    return Ok(Flow::Aborted);
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn run_timepoint(&mut self, timepoint: usize) -> AcquisitionResult<Flow> {
        let positions = self.positions.clone();
        let total_regions = positions.region_count();

        for (region_index, region) in positions.regions().iter().enumerate() {
            self.callbacks.overall_progress(OverallProgressUpdate {
                current_region: region_index + 1,
                total_regions,
                current_timepoint: timepoint,
                total_timepoints: self.params.nt,
            });

            match self
                .run_region(timepoint, region_index, &region.name, &region.fovs)
                .await
            {
                Ok(Flow::Continue) => {}
                Ok(Flow::Aborted) => return Ok(Flow::Aborted),
                Err(e) if e.is_region_scoped() => {
                    tracing::warn!(
                        timepoint,
                        region = %region.name,
                        error = %e,
                        "Skipping rest of region"
                    );
                    self.region_errors.push(RegionError {
                        timepoint,
                        region: region.name.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Flow::Continue)
    }

    async fn run_region(
        &mut self,
        timepoint: usize,
        region_index: usize,
        region: &str,
        fovs: &[FovCoordinate],
    ) -> AcquisitionResult<Flow> {
        for (fov, coordinate) in fovs.iter().enumerate() {
            if self.abort_token().is_requested() {
                return Ok(Flow::Aborted);
            }
            if self.settings.abort_on_failed_jobs && self.failed_jobs.load(Ordering::SeqCst) > 0 {
                tracing::error!(
                    failed_jobs = self.failed_jobs.load(Ordering::SeqCst),
                    "Save jobs failed, aborting acquisition"
                );
                self.control.request_abort();
                return Ok(Flow::Aborted);
            }

            self.move_to_fov(timepoint, region_index, fov, coordinate)
                .await?;

            if self.params.positions_only {
                tracing::debug!(region, fov, "Position visited, imaging skipped");
            } else {
                self.autofocus(timepoint, region_index, region, fov).await?;
                if self
                    .acquire_at_fov(timepoint, region_index, region, fov)
                    .await?
                    == Flow::Aborted
                {
                    return Ok(Flow::Aborted);
                }
            }

            self.callbacks.region_progress(RegionProgressUpdate {
                current_fov: fov + 1,
                region_fovs: fovs.len(),
            });
        }
        Ok(Flow::Continue)
    }

    fn autofocus_enabled(&self) -> bool {
        self.params.do_autofocus || self.params.do_reflection_autofocus
    }

    async fn move_to_fov(
        &mut self,
        timepoint: usize,
        region_index: usize,
        fov: usize,
        coordinate: &FovCoordinate,
    ) -> AcquisitionResult<()> {
        let stage = &self.hw.stage;
        tracing::debug!(
            region_index,
            fov,
            x_mm = coordinate.x_mm,
            y_mm = coordinate.y_mm,
            "Moving to FOV"
        );
        stage
            .move_to(coordinate.x_mm, coordinate.y_mm)
            .await
            .map_err(AcquisitionError::stage)?;
        stage.wait_idle().await.map_err(AcquisitionError::stage)?;
        settle(self.settings.xy_settle()).await;

        let remembered = if timepoint > 0 && self.autofocus_enabled() {
            self.focus_memory.get(&(region_index, fov)).copied()
        } else {
            None
        };
        if let Some(z) = remembered.or(coordinate.z_mm) {
            self.move_z(z).await?;
        }
        Ok(())
    }

    async fn move_z(&self, z_mm: f64) -> AcquisitionResult<()> {
        self.hw
            .stage
            .move_z_to(z_mm)
            .await
            .map_err(AcquisitionError::stage)?;
        self.hw
            .stage
            .wait_idle()
            .await
            .map_err(AcquisitionError::stage)?;
        settle(self.settings.z_settle()).await;
        Ok(())
    }

    async fn autofocus(
        &mut self,
        timepoint: usize,
        region_index: usize,
        region: &str,
        fov: usize,
    ) -> AcquisitionResult<()> {
        let device = if self.params.do_reflection_autofocus {
            self.hw.laser_autofocus.clone()
        } else if self.params.do_autofocus {
            let due = self.af_fov_count % self.settings.fovs_per_autofocus.max(1) == 0;
            self.af_fov_count += 1;
            if due {
                self.hw.contrast_autofocus.clone()
            } else {
                None
            }
        } else {
            None
        };

        if let Some(device) = device {
            let failure = match device.run().await {
                Ok(true) => None,
                Ok(false) => Some("no focus found".to_string()),
                Err(e) => Some(format!("{:#}", e)),
            };

            if let Some(message) = failure {
                tracing::warn!(
                    timepoint,
                    region,
                    fov,
                    policy = ?self.settings.autofocus_policy,
                    error = %message,
                    "Autofocus failed"
                );
                self.autofocus_failures.push(AutofocusFailure {
                    timepoint,
                    region: region.to_string(),
                    fov,
                    message: message.clone(),
                });
                if self.settings.autofocus_policy == AutofocusPolicy::SkipRegion {
                    return Err(AcquisitionError::Autofocus {
                        region: region.to_string(),
                        fov,
                        message,
                    });
                }
            }
        }

        if self.autofocus_enabled() && self.params.nt > 1 {
            let z = self
                .hw
                .stage
                .position()
                .await
                .map_err(AcquisitionError::stage)?
                .z_mm;
            self.focus_memory.insert((region_index, fov), z);
        }
        Ok(())
    }

    async fn acquire_at_fov(
        &mut self,
        timepoint: usize,
        region_index: usize,
        region: &str,
        fov: usize,
    ) -> AcquisitionResult<Flow> {
        let base = self
            .hw
            .stage
            .position()
            .await
            .map_err(AcquisitionError::stage)?;
        let piezo_base_um = match (&self.hw.piezo, self.params.use_piezo) {
            (Some(piezo), true) => Some(
                piezo
                    .position_um()
                    .await
                    .map_err(|e| AcquisitionError::hardware("piezo position", e))?,
            ),
            _ => None,
        };
        let plan = match piezo_base_um {
            Some(_) => ZStackPlan::for_piezo(&self.params),
            None => ZStackPlan::for_stage(&self.params, base.z_mm),
        };

        let result = self
            .acquire_stack(timepoint, region_index, region, fov, &plan, base, piezo_base_um)
            .await;

        // Leave the focus where the FOV started, whatever happened in the stack.
        if self.params.nz > 1 || self.params.z_range.is_some() {
            let restored = match (&self.hw.piezo, piezo_base_um) {
                (Some(piezo), Some(um)) => piezo
                    .move_to_um(um)
                    .await
                    .map_err(|e| AcquisitionError::hardware("piezo return", e)),
                _ => self.move_z(base.z_mm).await,
            };
            if let Err(e) = restored {
                if result.is_ok() {
                    return Err(e);
                }
                tracing::error!(error = %e, "Failed to return z after an interrupted stack");
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn acquire_stack(
        &mut self,
        timepoint: usize,
        region_index: usize,
        region: &str,
        fov: usize,
        plan: &ZStackPlan,
        base: StagePosition,
        piezo_base_um: Option<f64>,
    ) -> AcquisitionResult<Flow> {
        for z_level in 0..plan.levels {
            if z_level > 0 && self.abort_token().is_requested() {
                return Ok(Flow::Aborted);
            }

            let level = plan.level(z_level);
            let piezo_um = match (&self.hw.piezo, piezo_base_um) {
                (Some(piezo), Some(origin)) => {
                    let target = origin + level * 1000.0;
                    piezo
                        .move_to_um(target)
                        .await
                        .map_err(|e| AcquisitionError::hardware("piezo move", e))?;
                    settle(self.settings.piezo_settle()).await;
                    Some(target)
                }
                _ => {
                    if (level - base.z_mm).abs() > f64::EPSILON || z_level > 0 {
                        self.move_z(level).await?;
                    }
                    None
                }
            };

            let position = self
                .hw
                .stage
                .position()
                .await
                .map_err(AcquisitionError::stage)?;

            let channels = self.params.channels.clone();
            let mut rgb_planes: [Option<Arc<Frame>>; 3] = Default::default();
            for (channel_index, channel) in channels.iter().enumerate() {
                self.hw
                    .channels
                    .apply(channel)
                    .await
                    .map_err(|e| AcquisitionError::hardware("apply channel", e))?;

                let offset_mm = match channel.z_offset_um {
                    Some(um) if self.params.nz == 1 && um != 0.0 => Some(um / 1000.0),
                    _ => None,
                };
                if let Some(offset) = offset_mm {
                    self.move_z(position.z_mm + offset).await?;
                }

                let frame = self.capture_frame(region).await;

                if offset_mm.is_some() {
                    self.move_z(position.z_mm).await?;
                }
                let frame = Arc::new(frame?);
                if let Some(plane) = rgb_plane_of(&channel.name) {
                    rgb_planes[plane] = Some(frame.clone());
                }

                let capture_position = match offset_mm {
                    Some(offset) => StagePosition::new(
                        position.x_mm,
                        position.y_mm,
                        position.z_mm + offset,
                    ),
                    None => position,
                };

                self.publish(CaptureInfo {
                    preview: self.preview_of(&frame),
                    frame,
                    channel: channel.clone(),
                    channel_index,
                    position: capture_position,
                    z_piezo_um: piezo_um,
                    z_level,
                    region: region.to_string(),
                    region_index,
                    fov,
                    timepoint,
                    total_timepoints: self.params.nt,
                    total_z_levels: plan.levels,
                    total_channels: channels.len(),
                    capture_time: Utc::now(),
                    capture_index: self.capture_index,
                })
                .await?;
            }

            self.save_rgb_composite(
                ImageName {
                    timepoint,
                    region: region.to_string(),
                    fov,
                    z_level,
                    channel_label: String::new(),
                },
                rgb_planes,
            )
            .await?;

            self.coordinates.push(AcquiredCoordinate {
                region: region.to_string(),
                fov,
                z_level,
                x_mm: position.x_mm,
                y_mm: position.y_mm,
                z_um: position.z_mm * 1000.0,
                time: Local::now().format("%Y-%m-%d_%H-%M-%S%.6f").to_string(),
                z_piezo_um: piezo_um,
            });
        }
        Ok(Flow::Continue)
    }

    fn preview_of(&self, frame: &Frame) -> Option<Arc<Frame>> {
        self.params
            .generate_downsampled_views
            .then(|| Arc::new(frame.downsample(self.params.display_resolution_scaling)))
    }

    /// Trigger and read one frame, retrying `camera_retries` times.
    async fn capture_frame(&self, region: &str) -> AcquisitionResult<Frame> {
        let attempts = self.settings.camera_retries + 1;
        let timeout = self.settings.frame_timeout();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let result = async {
                self.hw.camera.trigger().await?;
                self.hw.camera.read_frame(timeout).await
            }
            .await;

            match result {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    tracing::warn!(
                        region,
                        attempt,
                        attempts,
                        kind = ?scope_core::DriverError::kind_of(&e),
                        error = %e,
                        "Frame capture failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(AcquisitionError::Capture {
            region: region.to_string(),
            message: last_error
                .map(|e| format!("{:#}", e))
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }

    /// Notify observers and queue the save job.
    async fn publish(&mut self, info: CaptureInfo) -> AcquisitionResult<()> {
        tracing::debug!(
            capture_index = info.capture_index,
            region = %info.region,
            fov = info.fov,
            z_level = info.z_level,
            channel = %info.channel.name,
            "Frame captured"
        );
        self.capture_index += 1;
        self.callbacks.capture(&info);

        if let Some(save) = &self.save {
            let job = SaveImageJob::new(
                info.capture_index,
                JobImage::copy_of(&info.frame),
                info.channel.clone(),
                info.image_name(),
                save.options.clone(),
            );
            save.submitter.submit(Box::new(job)).await?;
            self.jobs_submitted += 1;
        }
        Ok(())
    }

    /// Queue the RGB composite once all three mono R/G/B planes of a z-level
    /// are in.
    async fn save_rgb_composite(
        &mut self,
        name: ImageName,
        planes: [Option<Arc<Frame>>; 3],
    ) -> AcquisitionResult<()> {
        let Some(save) = &self.save else {
            return Ok(());
        };
        let [Some(red), Some(green), Some(blue)] = planes else {
            return Ok(());
        };
        if [&red, &green, &blue].iter().any(|plane| plane.is_color()) {
            tracing::debug!(region = %name.region, fov = name.fov, "Color camera, no RGB composite");
            return Ok(());
        }

        let job = RgbCompositeJob::new(
            self.capture_index.saturating_sub(1),
            [
                JobImage::copy_of(&red),
                JobImage::copy_of(&green),
                JobImage::copy_of(&blue),
            ],
            name,
            save.options.clone(),
        );
        save.submitter.submit(Box::new(job)).await?;
        self.jobs_submitted += 1;
        Ok(())
    }

    /// Leave the `.done` marker for a completed timepoint. A failure is logged,
    /// not fatal.
    async fn mark_timepoint_done(&self, timepoint: usize) {
        let Some(save) = &self.save else {
            return;
        };
        let dir = timepoint_dir(&save.options, timepoint);
        match tokio::task::spawn_blocking(move || write_done_marker(&dir)).await {
            Ok(Ok(_)) => tracing::debug!(timepoint, "Timepoint done"),
            Ok(Err(e)) => tracing::error!(timepoint, error = %e, "Failed to write done marker"),
            Err(e) => tracing::error!(timepoint, error = %e, "Done marker writer panicked"),
        }
    }

    /// Write the timepoint's visited positions. A failure is logged, not fatal.
    async fn flush_coordinates(&mut self, timepoint: usize) {
        let Some(save) = &self.save else {
            return;
        };
        if self.coordinates.is_empty() {
            return;
        }

        let dir = timepoint_dir(&save.options, timepoint);
        let rows = std::mem::take(&mut self.coordinates);
        let written =
            tokio::task::spawn_blocking(move || write_coordinates(&dir, &rows)).await;
        match written {
            Ok(Ok(path)) => tracing::debug!(path = ?path, "Timepoint coordinates written"),
            Ok(Err(e)) => tracing::error!(timepoint, error = %e, "Failed to write coordinates"),
            Err(e) => tracing::error!(timepoint, error = %e, "Coordinates writer panicked"),
        }
    }
}

fn timepoint_dir(options: &SaveOptions, timepoint: usize) -> std::path::PathBuf {
    Path::new(&options.experiment_dir).join(format!(
        "{:0width$}",
        timepoint,
        width = options.file_id_padding
    ))
}

/// Start of timepoint `timepoint + 1`, or `None` if it cannot be represented.
fn timepoint_deadline(start: Instant, interval: Duration, timepoint: usize) -> Option<Instant> {
    let next = u32::try_from(timepoint.checked_add(1)?).ok()?;
    start.checked_add(interval.checked_mul(next)?)
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
