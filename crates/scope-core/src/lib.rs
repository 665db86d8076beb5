//! Core types for rust-scope.
//!
//! Frames, channel modes, errors and the async hardware capability traits the
//! acquisition layer drives. Nothing in here depends on a runtime or a
//! concrete driver.

pub mod capabilities;
pub mod channel;
pub mod data;
pub mod error;
pub mod mode_gate;
pub mod planner;

pub use anyhow::{anyhow, Result};
pub use capabilities::{
    AutoFocus, Camera, ChannelConfigurator, Fluidics, Piezo, Stage, StagePosition,
};
pub use channel::{ChannelMode, IlluminationSource};
pub use data::{Frame, PixelFormat};
pub use error::{DriverError, DriverErrorKind, ScopeError, ScopeResult};
pub use mode_gate::{AtomicModeGate, ModeGate};
pub use planner::{CoordinatePlanner, FixedPlanner, FovCoordinate, RegionPlan};
