//! Common infrastructure for mock devices.
//!
//! - **mode**: Operational modes (Instant, Realistic)
//! - **errors**: Seeded failure injection
//! - **events**: Shared hardware event log for ordering assertions

pub mod errors;
pub mod events;
pub mod mode;

pub use errors::{ErrorConfig, ErrorScenario};
pub use events::{EventLog, HardwareEvent};
pub use mode::MockMode;
