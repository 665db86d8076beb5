//! Microscope Hardware Capabilities
//!
//! The acquisition worker never talks to a concrete driver. It drives the
//! microscope through a handful of narrow capability traits:
//!
//! - [`Stage`]: XY(Z) motorized stage in millimetres
//! - [`Camera`]: software-triggered frame source
//! - [`Piezo`]: optional fast z-actuator in micrometres
//! - [`ChannelConfigurator`]: illumination + exposure switching per channel
//! - [`AutoFocus`]: contrast or reflection (laser) autofocus
//! - [`Fluidics`]: optional liquid handling between timepoints
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! Drivers that want the acquisition layer to distinguish a transient failure
//! from a fatal one should put a [`crate::error::DriverError`] in the error
//! chain.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn snap(stage: &dyn Stage, camera: &dyn Camera) -> Result<Frame> {
//!     stage.move_to(10.0, 5.0).await?;
//!     stage.wait_idle().await?;
//!     camera.trigger().await?;
//!     camera.read_frame(Duration::from_millis(500)).await
//! }
//! ```

use crate::channel::ChannelMode;
use crate::data::Frame;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stage position in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StagePosition {
    /// X in mm
    pub x_mm: f64,
    /// Y in mm
    pub y_mm: f64,
    /// Z (focus) in mm
    pub z_mm: f64,
}

impl StagePosition {
    /// Construct a position.
    pub fn new(x_mm: f64, y_mm: f64, z_mm: f64) -> Self {
        Self { x_mm, y_mm, z_mm }
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Capability: XYZ Stage
///
/// # Contract
/// - Units are millimetres
/// - `move_to` / `move_z_to` initiate motion and may return before completion
/// - `wait_idle` blocks until all axes have stopped
/// - `position` may be approximate while moving
#[async_trait]
pub trait Stage: Send + Sync {
    /// Move X and Y to absolute positions.
    async fn move_to(&self, x_mm: f64, y_mm: f64) -> Result<()>;

    /// Move the focus axis to an absolute position.
    async fn move_z_to(&self, z_mm: f64) -> Result<()>;

    /// Wait until the stage reports idle.
    ///
    /// Should have an internal timeout to prevent infinite blocking.
    async fn wait_idle(&self) -> Result<()>;

    /// Current position.
    async fn position(&self) -> Result<StagePosition>;
}

/// Capability: Software-Triggered Camera
///
/// # Contract
/// - `start_streaming` must be called before `trigger`
/// - Every successful `trigger` makes exactly one frame available to `read_frame`
/// - `read_frame` returns Err on timeout (preferably a `DriverError::timeout`)
#[async_trait]
pub trait Camera: Send + Sync {
    /// Start the camera's acquisition stream.
    async fn start_streaming(&self) -> Result<()>;

    /// Stop the acquisition stream.
    async fn stop_streaming(&self) -> Result<()>;

    /// Send a software trigger.
    async fn trigger(&self) -> Result<()>;

    /// Wait up to `timeout` for the next frame.
    async fn read_frame(&self, timeout: Duration) -> Result<Frame>;

    /// True if the sensor delivers RGB frames.
    fn is_color(&self) -> bool {
        false
    }
}

/// Capability: Piezo Z Actuator
///
/// Positions are micrometres in the piezo's own range.
#[async_trait]
pub trait Piezo: Send + Sync {
    /// Move to an absolute position in µm.
    async fn move_to_um(&self, position_um: f64) -> Result<()>;

    /// Current position in µm.
    async fn position_um(&self) -> Result<f64>;
}

/// Capability: Channel Switching
///
/// Applies a channel's exposure, gain and illumination. Returns once the
/// hardware is ready to expose.
#[async_trait]
pub trait ChannelConfigurator: Send + Sync {
    /// Apply the given channel mode.
    async fn apply(&self, channel: &ChannelMode) -> Result<()>;
}

/// Capability: Autofocus
///
/// `run` leaves the focus axis at the best position it found.
#[async_trait]
pub trait AutoFocus: Send + Sync {
    /// Run one autofocus cycle.
    ///
    /// # Returns
    /// - Ok(true) if focus was found
    /// - Ok(false) if the routine completed without locking focus
    /// - Err on hardware failure
    async fn run(&self) -> Result<bool>;
}

/// Capability: Fluidics
///
/// Hooks around each timepoint's imaging round.
#[async_trait]
pub trait Fluidics: Send + Sync {
    /// Called before imaging timepoint `timepoint` (0-based).
    async fn before_imaging(&self, timepoint: usize) -> Result<()>;

    /// Called after imaging timepoint `timepoint` (0-based).
    async fn after_imaging(&self, timepoint: usize) -> Result<()> {
        let _ = timepoint;
        Ok(())
    }
}
