//! Operational modes for mock devices.
//!
//! - **Instant**: no delays, deterministic, for unit tests
//! - **Realistic**: exposure, motion and settling delays, for demos and timing tests

use serde::Deserialize;

/// Operational modes for mock devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Hardware-like timing
    Realistic,
}

impl MockMode {
    /// True when the device should sleep to simulate hardware time.
    pub fn simulates_timing(self) -> bool {
        matches!(self, MockMode::Realistic)
    }
}
