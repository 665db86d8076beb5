//! Mock autofocus.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use scope_core::capabilities::{AutoFocus, Stage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::events::{record, EventLog, HardwareEvent};
use crate::common::ErrorConfig;
use crate::mock_stage::MockStage;

const DRIVER: &str = "mock_autofocus";

/// Simulated autofocus.
///
/// Returns scripted results (then `true` forever). When built with a stage and
/// a focus position, a successful run moves the stage's z there, the way a real
/// routine leaves the focus axis at the best plane.
#[derive(Clone)]
pub struct MockAutofocus {
    runs: Arc<AtomicUsize>,
    script: Arc<Mutex<VecDeque<bool>>>,
    stage: Option<MockStage>,
    focus_z_mm: Option<f64>,
    error_config: ErrorConfig,
    events: Option<EventLog>,
}

impl MockAutofocus {
    /// Autofocus that always succeeds without moving anything.
    pub fn new() -> Self {
        Self {
            runs: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(Mutex::new(VecDeque::new())),
            stage: None,
            focus_z_mm: None,
            error_config: ErrorConfig::none(),
            events: None,
        }
    }

    /// Results returned by the first runs, in order.
    pub fn with_results(self, results: impl IntoIterator<Item = bool>) -> Self {
        self.script.lock().extend(results);
        self
    }

    /// Move `stage` to `focus_z_mm` on every successful run.
    pub fn with_focus(mut self, stage: MockStage, focus_z_mm: f64) -> Self {
        self.stage = Some(stage);
        self.focus_z_mm = Some(focus_z_mm);
        self
    }

    /// Error injection; the operation is `run`.
    pub fn with_error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Shared event log.
    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.events = Some(log);
        self
    }

    /// Number of completed runs (including unsuccessful ones).
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Default for MockAutofocus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AutoFocus for MockAutofocus {
    async fn run(&self) -> Result<bool> {
        self.error_config.check_operation(DRIVER, "run")?;
        let success = self.script.lock().pop_front().unwrap_or(true);

        if success {
            if let (Some(stage), Some(z)) = (&self.stage, self.focus_z_mm) {
                stage.move_z_to(z).await?;
            }
        }

        self.runs.fetch_add(1, Ordering::SeqCst);
        record(&self.events, HardwareEvent::Autofocus { success });
        tracing::debug!(success, "MockAutofocus: run complete");
        Ok(success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_results_then_success() {
        let af = MockAutofocus::new().with_results([false, true]);
        assert!(!af.run().await.unwrap());
        assert!(af.run().await.unwrap());
        assert!(af.run().await.unwrap());
        assert_eq!(af.run_count(), 3);
    }

    #[tokio::test]
    async fn test_success_moves_stage_to_focus() {
        let stage = MockStage::new();
        let af = MockAutofocus::new().with_focus(stage.clone(), 2.25);
        assert!(af.run().await.unwrap());
        assert_eq!(stage.current_position().z_mm, 2.25);
    }
}
