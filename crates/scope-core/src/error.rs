//! Error types shared by every rust-scope crate.
//!
//! `ScopeError` covers malformed frames and failed post-processing. Driver
//! implementations report structured failures through
//! [`DriverError`], whose [`DriverErrorKind`] lets the acquisition layer tell a
//! transient timeout (retryable) from a hardware fault (fatal).
//!
//! Capability traits return `anyhow::Result` so drivers can attach context
//! freely; a `DriverError` placed inside the `anyhow::Error` can be recovered
//! with [`DriverError::kind_of`].

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device failed to initialise.
    Initialization,
    /// Device rejected a configuration value.
    Configuration,
    /// Link to the device failed.
    Communication,
    /// Device reported a hardware fault.
    Hardware,
    /// Operation did not complete in time.
    Timeout,
    /// Argument outside the device's range.
    InvalidParameter,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Structured error raised by a device driver.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver identifier, e.g. `mock_stage`.
    pub driver_type: String,
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a timeout error.
    pub fn timeout(driver_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(driver_type, DriverErrorKind::Timeout, message)
    }

    /// Find the driver error kind inside an `anyhow::Error` chain, if any.
    pub fn kind_of(err: &anyhow::Error) -> Option<DriverErrorKind> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<DriverError>())
            .map(|driver| driver.kind)
    }
}

/// Convenience alias for results using [`ScopeError`].
pub type ScopeResult<T> = std::result::Result<T, ScopeError>;

/// Errors from frame handling in library code.
#[derive(Error, Debug)]
pub enum ScopeError {
    /// Image post-processing failed (bad buffer, unsupported pixel layout).
    #[error("Data processing error: {0}")]
    Processing(String),

    /// Frame buffer length does not match its declared geometry.
    #[error("Frame data size mismatch: expected {expected} bytes for {width}x{height}, got {actual}")]
    FrameSizeMismatch {
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
        /// Bytes implied by geometry and pixel format.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// Calculating a size overflowed usize.
    #[error("Size overflow while computing {context}")]
    SizeOverflow {
        /// What was being computed.
        context: &'static str,
    },
}
