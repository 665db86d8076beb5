//! Mock fluidics system.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use scope_core::capabilities::Fluidics;
use std::sync::Arc;

use crate::common::events::{record, EventLog, HardwareEvent};
use crate::common::ErrorConfig;

const DRIVER: &str = "mock_fluidics";

/// Simulated fluidics; records the timepoints it was called for.
#[derive(Clone, Default)]
pub struct MockFluidics {
    before: Arc<Mutex<Vec<usize>>>,
    after: Arc<Mutex<Vec<usize>>>,
    error_config: ErrorConfig,
    events: Option<EventLog>,
}

impl MockFluidics {
    /// Fluidics that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Error injection; operations are `before_imaging` and `after_imaging`.
    pub fn with_error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Shared event log.
    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.events = Some(log);
        self
    }

    /// Timepoints passed to `before_imaging`.
    pub fn before_calls(&self) -> Vec<usize> {
        self.before.lock().clone()
    }

    /// Timepoints passed to `after_imaging`.
    pub fn after_calls(&self) -> Vec<usize> {
        self.after.lock().clone()
    }
}

#[async_trait]
impl Fluidics for MockFluidics {
    async fn before_imaging(&self, timepoint: usize) -> Result<()> {
        self.error_config.check_operation(DRIVER, "before_imaging")?;
        self.before.lock().push(timepoint);
        record(&self.events, HardwareEvent::FluidicsBefore { timepoint });
        Ok(())
    }

    async fn after_imaging(&self, timepoint: usize) -> Result<()> {
        self.error_config.check_operation(DRIVER, "after_imaging")?;
        self.after.lock().push(timepoint);
        record(&self.events, HardwareEvent::FluidicsAfter { timepoint });
        Ok(())
    }
}
