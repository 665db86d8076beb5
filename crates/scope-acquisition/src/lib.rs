//! Multi-dimensional acquisition for rust-scope.
//!
//! A run images every FOV of every planned region at `NZ` focus levels in
//! each selected channel, repeated for `Nt` timepoints. The
//! [`MultiPointController`] validates the request and supervises the run; the
//! worker drives the hardware on its own task and hands frames to the
//! `scope-storage` job pool.
//!
//! # Modules
//!
//! - [`controller`]: run lifecycle, state machine, supervision
//! - [`parameters`]: the run request and its builder
//! - [`scan_positions`]: planned regions and FOVs
//! - [`z_stack`]: z-level sequences
//! - [`callbacks`]: observer hooks
//! - [`config`]: figment-backed settings

pub mod abort;
pub mod callbacks;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod hardware;
pub mod parameters;
pub mod progress;
pub mod scan_positions;
pub mod state;
pub mod summary;
mod worker;
pub mod z_stack;

pub use abort::AbortToken;
pub use callbacks::AcquisitionCallbacks;
pub use capture::CaptureInfo;
pub use config::{
    AcquisitionConfig, ApplicationConfig, AutofocusPolicy, PipelineConfig, ScopeConfig,
    StorageConfig,
};
pub use controller::MultiPointController;
pub use error::{AcquisitionError, AcquisitionResult};
pub use hardware::Microscope;
pub use parameters::{
    unique_experiment_id, AcquisitionParameters, AcquisitionParametersBuilder, ZRange, ZStacking,
    MAX_TIMEPOINT_INTERVAL_S,
};
pub use progress::{OverallProgressUpdate, RegionProgressUpdate};
pub use scan_positions::ScanPositionInformation;
pub use state::{AbortHandle, AcquisitionState};
pub use summary::{AutofocusFailure, RegionError, RunOutcome, RunSummary};
pub use z_stack::ZStackPlan;
