//! Frame persistence for rust-scope.
//!
//! The capture loop hands each frame to a [`SaveImageJob`] and submits it to a
//! bounded [`job_queue`]. A [`JobRunner`] pool post-processes, encodes and
//! writes frames on blocking threads and reports exactly one [`JobResult`] per
//! job.
//!
//! # Modules
//!
//! - [`job`]: `Job` trait, `SaveImageJob`, results and file naming
//! - [`queue`]: bounded queue with backpressure and a pending-job ledger
//! - [`runner`]: worker pool with bounded drain
//! - [`postprocess`]: color reduction and pseudo-coloring
//! - [`composite`]: RGB composite of the LED-matrix R/G/B sub-channels
//! - [`image_writer`]: TIFF/PNG/BMP/JPEG export
//! - [`metadata`]: manifest, coordinates and timepoint done markers

pub mod composite;
pub mod error;
pub mod image_writer;
pub mod job;
pub mod metadata;
pub mod postprocess;
pub mod queue;
pub mod runner;

pub use composite::{rgb_plane_of, RgbCompositeJob, RGB_COMPOSITE_LABEL, RGB_SOURCE_CHANNELS};
pub use error::{StorageError, StorageResult};
pub use image_writer::{ImageFormat, ImageWriter};
pub use job::{
    ImageName, Job, JobContext, JobError, JobImage, JobOutput, JobResult, SaveImageJob,
    SaveOptions, DEFAULT_FILE_ID_PADDING,
};
pub use postprocess::{ColorReduction, PostProcessing};
pub use queue::{job_queue, JobReceiver, JobSubmitter, PendingLedger, DEFAULT_QUEUE_CAPACITY};
pub use runner::{DrainReport, JobRunner, DEFAULT_WORKERS};
