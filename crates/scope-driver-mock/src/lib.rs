//! Mock Hardware Drivers for rust-scope
//!
//! Simulated microscope devices for testing and demos without a microscope.
//! All devices use async-safe delays (`tokio::time::sleep`) and only sleep in
//! [`MockMode::Realistic`].
//!
//! # Available Mock Drivers
//!
//! - [`MockStage`] - XYZ stage with limits and move history
//! - [`MockCamera`] - software-triggered camera producing test patterns
//! - [`MockPiezo`] - z piezo with a travel range
//! - [`MockIlluminator`] - channel switcher that records applied channels
//! - [`MockAutofocus`] - scripted autofocus that can move the stage's z
//! - [`MockFluidics`] - records before/after imaging hooks
//! - [`GridPlanner`] - rectangular FOV grids per region
//!
//! Every device accepts an [`ErrorConfig`] for failure injection and an
//! optional shared [`EventLog`] for cross-device ordering assertions.

pub mod common;
mod grid_planner;
mod mock_autofocus;
mod mock_camera;
mod mock_fluidics;
mod mock_illumination;
mod mock_piezo;
mod mock_stage;
mod pattern;

pub use common::{ErrorConfig, ErrorScenario, EventLog, HardwareEvent, MockMode};

pub use grid_planner::{GridPlanner, GridRegion};
pub use mock_autofocus::MockAutofocus;
pub use mock_camera::{MockCamera, MockCameraBuilder};
pub use mock_fluidics::MockFluidics;
pub use mock_illumination::MockIlluminator;
pub use mock_piezo::MockPiezo;
pub use mock_stage::{AxisLimits, LimitBehavior, MockStage, MockStageBuilder};

pub use pattern::generate_test_pattern;
