//! Acquisition error types.
//!
//! Hardware capabilities return `anyhow::Result`; the worker adapts those into
//! [`AcquisitionError`] at the call site so the run loop can decide which
//! failures end a region and which end the run.

use scope_storage::StorageError;
use thiserror::Error;

/// Convenience alias.
pub type AcquisitionResult<T> = std::result::Result<T, AcquisitionError>;

/// Errors raised by the controller and the worker.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// Parameters failed validation, or the plan is empty.
    #[error("Invalid acquisition parameters: {0}")]
    InvalidParameters(String),

    /// A run is already active on this controller.
    #[error("An acquisition is already running")]
    AlreadyRunning,

    /// The coordinate planner failed.
    #[error("Scan planning failed: {0}")]
    Planning(String),

    /// A stage move or wait failed. Fatal, never retried.
    #[error("Stage move failed: {0}")]
    StageMove(String),

    /// Camera retries were exhausted inside a region.
    #[error("Capture failed in region '{region}': {message}")]
    Capture {
        /// Region being imaged.
        region: String,
        /// Last camera error.
        message: String,
    },

    /// Autofocus failed and the policy skips the region.
    #[error("Autofocus failed in region '{region}' at FOV {fov}: {message}")]
    Autofocus {
        /// Region being imaged.
        region: String,
        /// FOV index within the region.
        fov: usize,
        /// Failure detail.
        message: String,
    },

    /// Any other hardware failure (illumination, piezo, fluidics).
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Filesystem failure outside the job pool.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persistence pipeline failed (queue closed, metadata write).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AcquisitionError {
    /// True when the error ends only the current region, not the run.
    pub fn is_region_scoped(&self) -> bool {
        matches!(
            self,
            AcquisitionError::Capture { .. } | AcquisitionError::Autofocus { .. }
        )
    }

    pub(crate) fn stage(err: anyhow::Error) -> Self {
        AcquisitionError::StageMove(format!("{:#}", err))
    }

    pub(crate) fn hardware(what: &str, err: anyhow::Error) -> Self {
        AcquisitionError::Hardware(format!("{}: {:#}", what, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_scope() {
        let capture = AcquisitionError::Capture {
            region: "A1".into(),
            message: "timeout".into(),
        };
        assert!(capture.is_region_scoped());
        assert!(!AcquisitionError::StageMove("limit".into()).is_region_scoped());
        assert_eq!(
            capture.to_string(),
            "Capture failed in region 'A1': timeout"
        );
    }
}
