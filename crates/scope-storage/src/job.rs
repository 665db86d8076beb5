//! Persistence jobs.
//!
//! A [`Job`] is a self-contained unit of blocking work (post-process, encode,
//! write) executed on a pool thread. The acquisition loop builds one
//! [`SaveImageJob`] per captured frame; the frame pixels are copied into a
//! [`JobImage`] so the job never aliases buffers the capture side still uses.

use crate::image_writer::{ImageFormat, ImageWriter};
use crate::postprocess::PostProcessing;
use scope_core::channel::ChannelMode;
use scope_core::data::Frame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Default zero-padding width for timepoint, FOV and z indices in file names.
pub const DEFAULT_FILE_ID_PADDING: usize = 3;

/// Successful job output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    /// File written by the job.
    pub path: PathBuf,
}

/// Why a job produced no output.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobError {
    /// The job ran and returned an error.
    #[error("Job failed: {0}")]
    Failed(String),

    /// The job panicked on its worker thread.
    #[error("Job panicked: {0}")]
    Panicked(String),

    /// The pool was shut down before the job finished.
    ///
    /// Jobs check for this before writing. One that was already writing when
    /// the pool gave up can still leave its file on disk.
    #[error("Job abandoned at shutdown")]
    Abandoned,
}

/// Outcome of exactly one submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Identifier assigned at submission.
    pub job_id: Uuid,
    /// Capture index of the frame the job persisted.
    pub capture_index: u64,
    /// Output or error.
    pub outcome: Result<JobOutput, JobError>,
}

impl JobResult {
    /// True when the job wrote its output.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Result for a job that never ran to completion.
    pub fn abandoned(job_id: Uuid, capture_index: u64) -> Self {
        Self {
            job_id,
            capture_index,
            outcome: Err(JobError::Abandoned),
        }
    }
}

/// Cancellation flag shared by a pool and the jobs it runs.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    cancelled: Arc<AtomicBool>,
}

impl JobContext {
    /// Live context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tell every job holding this context to stop before its next write.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once the pool has given up on outstanding jobs.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Unit of blocking persistence work.
///
/// `run` executes on a blocking pool thread and must not touch hardware. It
/// should return [`JobError::Abandoned`] without side effects once `ctx` is
/// cancelled.
pub trait Job: Send + 'static {
    /// Unique id, fixed at construction.
    fn id(&self) -> Uuid;

    /// Capture index of the frame this job belongs to.
    fn capture_index(&self) -> u64;

    /// Do the work.
    fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError>;
}

/// Owned copy of a frame's pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct JobImage {
    frame: Frame,
}

impl JobImage {
    /// Copy `frame` so the job owns its pixels.
    pub fn copy_of(frame: &Frame) -> Self {
        Self {
            frame: frame.clone(),
        }
    }

    /// The copied frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

/// Position of a capture in the scan, used for file naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageName {
    /// Timepoint index
    pub timepoint: usize,
    /// Region name
    pub region: String,
    /// FOV index within the region
    pub fov: usize,
    /// Z-level index
    pub z_level: usize,
    /// Channel name with spaces replaced by `_`
    pub channel_label: String,
}

impl ImageName {
    /// `{region}_{fov:0P}_{z:0P}_{channel_label}`
    pub fn file_stem(&self, padding: usize) -> String {
        format!(
            "{}_{:0width$}_{:0width$}_{}",
            self.region,
            self.fov,
            self.z_level,
            self.channel_label,
            width = padding
        )
    }

    /// `{timepoint:0P}`
    pub fn timepoint_dir(&self, padding: usize) -> String {
        format!("{:0width$}", self.timepoint, width = padding)
    }

    /// Full path below `experiment_dir`.
    pub fn path(&self, experiment_dir: &Path, padding: usize, format: ImageFormat) -> PathBuf {
        experiment_dir
            .join(self.timepoint_dir(padding))
            .join(format!("{}.{}", self.file_stem(padding), format.extension()))
    }
}

/// Output options shared by every save job of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// `{base_path}/{experiment_id}`
    pub experiment_dir: PathBuf,
    /// Format for 8-bit frames
    pub image_format: ImageFormat,
    /// Zero-padding width in file names
    pub file_id_padding: usize,
    /// Post-processing switches
    pub post_processing: PostProcessing,
}

impl SaveOptions {
    /// Defaults: TIFF, padding 3, no post-processing.
    pub fn new(experiment_dir: impl Into<PathBuf>) -> Self {
        Self {
            experiment_dir: experiment_dir.into(),
            image_format: ImageFormat::Tiff,
            file_id_padding: DEFAULT_FILE_ID_PADDING,
            post_processing: PostProcessing::default(),
        }
    }
}

/// Post-process, encode and write one captured frame.
#[derive(Debug, Clone)]
pub struct SaveImageJob {
    id: Uuid,
    capture_index: u64,
    image: JobImage,
    channel: ChannelMode,
    name: ImageName,
    options: SaveOptions,
}

impl SaveImageJob {
    /// Build a job; the id is a fresh UUID v4.
    pub fn new(
        capture_index: u64,
        image: JobImage,
        channel: ChannelMode,
        name: ImageName,
        options: SaveOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            capture_index,
            image,
            channel,
            name,
            options,
        }
    }

    /// Path the job will write, given the processed frame.
    pub fn target_path(&self, processed: &Frame) -> PathBuf {
        let format = self.options.image_format.resolve_for(processed);
        self.name.path(
            &self.options.experiment_dir,
            self.options.file_id_padding,
            format,
        )
    }
}

impl Job for SaveImageJob {
    fn id(&self) -> Uuid {
        self.id
    }

    fn capture_index(&self) -> u64 {
        self.capture_index
    }

    fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
        let processed = self
            .options
            .post_processing
            .apply(self.image.frame(), &self.channel)
            .map_err(|e| JobError::Failed(e.to_string()))?;

        let format = self.options.image_format.resolve_for(&processed);
        let path = self.target_path(&processed);
        if ctx.is_cancelled() {
            return Err(JobError::Abandoned);
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| JobError::Failed(format!("create {:?}: {}", dir, e)))?;
        }

        ImageWriter::write_frame(&processed, format, &path)
            .map_err(|e| JobError::Failed(format!("{:#}", e)))?;

        Ok(JobOutput { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name(channel: &ChannelMode) -> ImageName {
        ImageName {
            timepoint: 0,
            region: "A1".to_string(),
            fov: 2,
            z_level: 1,
            channel_label: channel.file_label(),
        }
    }

    #[test]
    fn test_file_naming() {
        let ch = ChannelMode::fluorescence(2, "Fluorescence 488 nm Ex", 488, 10.0);
        let path = name(&ch).path(Path::new("/data/exp"), 3, ImageFormat::Tiff);
        assert_eq!(
            path,
            PathBuf::from("/data/exp/000/A1_002_001_Fluorescence_488_nm_Ex.tiff")
        );
        let wide = name(&ch).path(Path::new("/data/exp"), 5, ImageFormat::Png);
        assert!(wide.ends_with("00000/A1_00002_00001_Fluorescence_488_nm_Ex.png"));
    }

    #[test]
    fn test_save_job_writes_16bit_as_tiff() {
        let dir = TempDir::new().unwrap();
        let ch = ChannelMode::brightfield(1, "BF LED matrix full", 5.0);
        let mut options = SaveOptions::new(dir.path());
        options.image_format = ImageFormat::Png;

        let frame = Frame::from_u16(8, 8, &[1234; 64]);
        let job = SaveImageJob::new(7, JobImage::copy_of(&frame), ch.clone(), name(&ch), options);

        let output = job.run(&JobContext::new()).unwrap();
        assert!(output.path.ends_with("000/A1_002_001_BF_LED_matrix_full.tiff"));
        assert!(output.path.exists());
        assert_eq!(job.capture_index(), 7);
    }

    #[test]
    fn test_save_job_reports_failure() {
        let dir = TempDir::new().unwrap();
        let ch = ChannelMode::brightfield(1, "BF", 5.0);
        let bad = Frame::from_bytes(8, 8, scope_core::data::PixelFormat::Mono16, vec![0; 5]);
        let job = SaveImageJob::new(
            0,
            JobImage::copy_of(&bad),
            ch.clone(),
            name(&ch),
            SaveOptions::new(dir.path()),
        );
        assert!(matches!(job.run(&JobContext::new()), Err(JobError::Failed(_))));
    }

    #[test]
    fn test_cancelled_save_job_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let ch = ChannelMode::brightfield(1, "BF", 5.0);
        let frame = Frame::from_u16(4, 4, &[9; 16]);
        let job = SaveImageJob::new(
            0,
            JobImage::copy_of(&frame),
            ch.clone(),
            name(&ch),
            SaveOptions::new(dir.path()),
        );
        let ctx = JobContext::new();
        ctx.cancel();
        assert_eq!(job.run(&ctx), Err(JobError::Abandoned));
        assert!(!job.target_path(&frame).exists());
        assert!(!dir.path().join("000").exists());
    }
}
