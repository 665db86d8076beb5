//! Observer hooks.
//!
//! Every hook is optional and is called synchronously on the worker task (or
//! the result pump, for job results) as soon as the event happens. Hooks must
//! return quickly; a slow hook slows the scan.
//!
//! ```rust,ignore
//! let callbacks = AcquisitionCallbacks::new()
//!     .on_capture(|info| tracing::info!(index = info.capture_index, "frame"))
//!     .on_finished(|summary| println!("{:?}", summary.outcome));
//! controller.register_callbacks(callbacks);
//! ```

use crate::capture::CaptureInfo;
use crate::parameters::AcquisitionParameters;
use crate::progress::{OverallProgressUpdate, RegionProgressUpdate};
use crate::summary::RunSummary;
use scope_core::capabilities::StagePosition;
use scope_core::channel::ChannelMode;
use scope_storage::JobResult;
use std::sync::Arc;

/// Run started, with the frozen parameters.
pub type OnAcquisitionStart = Arc<dyn Fn(&AcquisitionParameters) + Send + Sync>;
/// A frame was captured.
pub type OnCapture = Arc<dyn Fn(&CaptureInfo) + Send + Sync>;
/// A channel mode was applied for a capture.
pub type OnChannelMode = Arc<dyn Fn(&ChannelMode) + Send + Sync>;
/// Stage position of a capture.
pub type OnFovPosition = Arc<dyn Fn(&StagePosition) + Send + Sync>;
/// A region started.
pub type OnOverallProgress = Arc<dyn Fn(OverallProgressUpdate) + Send + Sync>;
/// A FOV finished.
pub type OnRegionProgress = Arc<dyn Fn(RegionProgressUpdate) + Send + Sync>;
/// A save job finished, failed or was abandoned.
pub type OnJobResult = Arc<dyn Fn(&JobResult) + Send + Sync>;
/// The run ended. Fires exactly once per started run.
pub type OnFinished = Arc<dyn Fn(&RunSummary) + Send + Sync>;

/// Set of optional observer hooks.
#[derive(Clone, Default)]
pub struct AcquisitionCallbacks {
    acquisition_start: Option<OnAcquisitionStart>,
    capture: Option<OnCapture>,
    channel_mode: Option<OnChannelMode>,
    fov_position: Option<OnFovPosition>,
    overall_progress: Option<OnOverallProgress>,
    region_progress: Option<OnRegionProgress>,
    job_result: Option<OnJobResult>,
    finished: Option<OnFinished>,
}

impl std::fmt::Debug for AcquisitionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionCallbacks")
            .field("acquisition_start", &self.acquisition_start.is_some())
            .field("capture", &self.capture.is_some())
            .field("channel_mode", &self.channel_mode.is_some())
            .field("fov_position", &self.fov_position.is_some())
            .field("overall_progress", &self.overall_progress.is_some())
            .field("region_progress", &self.region_progress.is_some())
            .field("job_result", &self.job_result.is_some())
            .field("finished", &self.finished.is_some())
            .finish()
    }
}

impl AcquisitionCallbacks {
    /// No hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook for run start.
    pub fn on_acquisition_start(
        mut self,
        f: impl Fn(&AcquisitionParameters) + Send + Sync + 'static,
    ) -> Self {
        self.acquisition_start = Some(Arc::new(f));
        self
    }

    /// Hook for every captured frame.
    pub fn on_capture(mut self, f: impl Fn(&CaptureInfo) + Send + Sync + 'static) -> Self {
        self.capture = Some(Arc::new(f));
        self
    }

    /// Hook for the channel of every captured frame.
    pub fn on_channel_mode(mut self, f: impl Fn(&ChannelMode) + Send + Sync + 'static) -> Self {
        self.channel_mode = Some(Arc::new(f));
        self
    }

    /// Hook for the stage position of every captured frame.
    pub fn on_fov_position(mut self, f: impl Fn(&StagePosition) + Send + Sync + 'static) -> Self {
        self.fov_position = Some(Arc::new(f));
        self
    }

    /// Hook for region starts.
    pub fn on_overall_progress(
        mut self,
        f: impl Fn(OverallProgressUpdate) + Send + Sync + 'static,
    ) -> Self {
        self.overall_progress = Some(Arc::new(f));
        self
    }

    /// Hook for finished FOVs.
    pub fn on_region_progress(
        mut self,
        f: impl Fn(RegionProgressUpdate) + Send + Sync + 'static,
    ) -> Self {
        self.region_progress = Some(Arc::new(f));
        self
    }

    /// Hook for job results.
    pub fn on_job_result(mut self, f: impl Fn(&JobResult) + Send + Sync + 'static) -> Self {
        self.job_result = Some(Arc::new(f));
        self
    }

    /// Hook for the end of the run.
    pub fn on_finished(mut self, f: impl Fn(&RunSummary) + Send + Sync + 'static) -> Self {
        self.finished = Some(Arc::new(f));
        self
    }

    pub(crate) fn acquisition_start(&self, params: &AcquisitionParameters) {
        if let Some(f) = &self.acquisition_start {
            f(params);
        }
    }

    pub(crate) fn capture(&self, info: &CaptureInfo) {
        if let Some(f) = &self.capture {
            f(info);
        }
        if let Some(f) = &self.channel_mode {
            f(&info.channel);
        }
        if let Some(f) = &self.fov_position {
            f(&info.position);
        }
    }

    pub(crate) fn overall_progress(&self, update: OverallProgressUpdate) {
        if let Some(f) = &self.overall_progress {
            f(update);
        }
    }

    pub(crate) fn region_progress(&self, update: RegionProgressUpdate) {
        if let Some(f) = &self.region_progress {
            f(update);
        }
    }

    pub(crate) fn job_result(&self, result: &JobResult) {
        if let Some(f) = &self.job_result {
            f(result);
        }
    }

    pub(crate) fn finished(&self, summary: &RunSummary) {
        if let Some(f) = &self.finished {
            f(summary);
        }
    }
}
