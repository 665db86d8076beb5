//! Mock piezo z-actuator.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use scope_core::capabilities::Piezo;
use std::sync::Arc;

use crate::common::events::{record, EventLog, HardwareEvent};
use crate::common::ErrorConfig;

const DRIVER: &str = "mock_piezo";

/// Simulated piezo with a fixed travel range in µm.
#[derive(Clone)]
pub struct MockPiezo {
    position_um: Arc<Mutex<f64>>,
    range_um: (f64, f64),
    error_config: ErrorConfig,
    events: Option<EventLog>,
}

impl MockPiezo {
    /// Piezo with 0-300 µm travel, parked at `initial_um`.
    pub fn new(initial_um: f64) -> Self {
        Self {
            position_um: Arc::new(Mutex::new(initial_um)),
            range_um: (0.0, 300.0),
            error_config: ErrorConfig::none(),
            events: None,
        }
    }

    /// Override the travel range.
    pub fn with_range(mut self, min_um: f64, max_um: f64) -> Self {
        self.range_um = (min_um, max_um);
        self
    }

    /// Error injection; operations are `move` and `position`.
    pub fn with_error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Shared event log.
    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.events = Some(log);
        self
    }

    /// Current position without going through the async trait.
    pub fn current_um(&self) -> f64 {
        *self.position_um.lock()
    }
}

#[async_trait]
impl Piezo for MockPiezo {
    async fn move_to_um(&self, position_um: f64) -> Result<()> {
        self.error_config.check_operation(DRIVER, "move")?;
        let (min, max) = self.range_um;
        if !(min..=max).contains(&position_um) {
            return Err(anyhow!(
                "piezo target {:.2}um outside range [{:.1}, {:.1}]um",
                position_um,
                min,
                max
            ));
        }
        *self.position_um.lock() = position_um;
        record(&self.events, HardwareEvent::PiezoMove { position_um });
        Ok(())
    }

    async fn position_um(&self) -> Result<f64> {
        self.error_config.check_operation(DRIVER, "position")?;
        Ok(self.current_um())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_within_range() {
        let piezo = MockPiezo::new(150.0);
        piezo.move_to_um(152.5).await.unwrap();
        assert_eq!(piezo.position_um().await.unwrap(), 152.5);
        assert!(piezo.move_to_um(400.0).await.is_err());
        assert_eq!(piezo.current_um(), 152.5);
    }
}
