//! Mock illumination controller.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use scope_core::capabilities::ChannelConfigurator;
use scope_core::channel::ChannelMode;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::common::events::{record, EventLog, HardwareEvent};
use crate::common::{ErrorConfig, MockMode};

const DRIVER: &str = "mock_illumination";

/// Simulated illumination + exposure switcher. Remembers every applied channel.
#[derive(Clone, Default)]
pub struct MockIlluminator {
    applied: Arc<Mutex<Vec<ChannelMode>>>,
    mode: MockMode,
    switch_delay_ms: u64,
    error_config: ErrorConfig,
    events: Option<EventLog>,
}

impl MockIlluminator {
    /// Instant-mode illuminator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Realistic mode with a fixed switching delay.
    pub fn with_timing(mut self, mode: MockMode, switch_delay_ms: u64) -> Self {
        self.mode = mode;
        self.switch_delay_ms = switch_delay_ms;
        self
    }

    /// Error injection; the operation is `apply`.
    pub fn with_error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Shared event log.
    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.events = Some(log);
        self
    }

    /// Names of applied channels, in order.
    pub fn applied_names(&self) -> Vec<String> {
        self.applied.lock().iter().map(|c| c.name.clone()).collect()
    }

    /// The most recently applied channel.
    pub fn current(&self) -> Option<ChannelMode> {
        self.applied.lock().last().cloned()
    }
}

#[async_trait]
impl ChannelConfigurator for MockIlluminator {
    async fn apply(&self, channel: &ChannelMode) -> Result<()> {
        self.error_config.check_operation(DRIVER, "apply")?;
        if self.mode.simulates_timing() && self.switch_delay_ms > 0 {
            sleep(Duration::from_millis(self.switch_delay_ms)).await;
        }
        tracing::debug!(channel = %channel.name, exposure_ms = channel.exposure_time_ms, "MockIlluminator: channel applied");
        self.applied.lock().push(channel.clone());
        record(
            &self.events,
            HardwareEvent::ChannelApplied {
                name: channel.name.clone(),
            },
        );
        Ok(())
    }
}
