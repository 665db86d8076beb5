//! Mock XYZ microscope stage.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use scope_core::capabilities::{Stage, StagePosition};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::common::events::{record, EventLog, HardwareEvent};
use crate::common::{ErrorConfig, MockMode};

const DRIVER: &str = "mock_stage";

// =============================================================================
// Configuration Structs
// =============================================================================

/// Limit behavior when a target exceeds the travel range
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitBehavior {
    /// Hard stop - return error at limit
    HardStop,
    /// Clamp to limit - move to boundary without error
    Clamp,
}

/// Travel range of one axis in mm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLimits {
    /// Minimum position
    pub min_mm: f64,
    /// Maximum position
    pub max_mm: f64,
    /// What to do outside the range
    pub behavior: LimitBehavior,
}

impl AxisLimits {
    /// Limits that reject out-of-range targets
    pub fn hard_stop(min_mm: f64, max_mm: f64) -> Self {
        Self {
            min_mm,
            max_mm,
            behavior: LimitBehavior::HardStop,
        }
    }

    /// Limits that clamp out-of-range targets
    pub fn clamp(min_mm: f64, max_mm: f64) -> Self {
        Self {
            min_mm,
            max_mm,
            behavior: LimitBehavior::Clamp,
        }
    }

    fn enforce(&self, axis: &str, target: f64) -> Result<f64> {
        match self.behavior {
            LimitBehavior::Clamp => Ok(target.clamp(self.min_mm, self.max_mm)),
            LimitBehavior::HardStop => {
                if target < self.min_mm || target > self.max_mm {
                    Err(anyhow!(
                        "{} position {:.3}mm exceeds limits [{:.3}, {:.3}]mm",
                        axis,
                        target,
                        self.min_mm,
                        self.max_mm
                    ))
                } else {
                    Ok(target)
                }
            }
        }
    }
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug, Default)]
struct StageState {
    position: StagePosition,
    /// Every completed move target, in order
    history: Vec<StagePosition>,
    last_move_distance_mm: f64,
}

// =============================================================================
// MockStage
// =============================================================================

/// Simulated XYZ stage.
///
/// Moves complete instantly in [`MockMode::Instant`]; in
/// [`MockMode::Realistic`] they take `distance / speed` plus a settling delay
/// in `wait_idle`.
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockStage::builder()
///     .xy_limits(AxisLimits::hard_stop(0.0, 120.0))
///     .build();
/// stage.move_to(10.0, 5.0).await?;
/// stage.wait_idle().await?;
/// ```
#[derive(Clone)]
pub struct MockStage {
    state: Arc<Mutex<StageState>>,
    speed_mm_per_sec: f64,
    settling_ms: u64,
    xy_limits: Option<AxisLimits>,
    z_limits: Option<AxisLimits>,
    mode: MockMode,
    error_config: ErrorConfig,
    events: Option<EventLog>,
}

impl MockStage {
    /// Stage at the origin, instant mode, no limits.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder
    pub fn builder() -> MockStageBuilder {
        MockStageBuilder::new()
    }

    /// Current position without going through the async trait.
    pub fn current_position(&self) -> StagePosition {
        self.state.lock().position
    }

    /// Every completed move target so far (XY and Z moves both append).
    pub fn move_history(&self) -> Vec<StagePosition> {
        self.state.lock().history.clone()
    }

    fn motion_time(&self, distance_mm: f64) -> Duration {
        if !self.mode.simulates_timing() || self.speed_mm_per_sec <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(distance_mm.abs() / self.speed_mm_per_sec)
    }

    async fn finish_move(&self, target: StagePosition, distance: f64) {
        let motion = self.motion_time(distance);
        if !motion.is_zero() {
            sleep(motion).await;
        }
        let mut state = self.state.lock();
        state.position = target;
        state.last_move_distance_mm = distance;
        state.history.push(target);
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for MockStage {
    async fn move_to(&self, x_mm: f64, y_mm: f64) -> Result<()> {
        self.error_config.check_operation(DRIVER, "move_xy")?;

        let (x, y) = match &self.xy_limits {
            Some(limits) => (limits.enforce("X", x_mm)?, limits.enforce("Y", y_mm)?),
            None => (x_mm, y_mm),
        };

        let current = self.current_position();
        let distance = (x - current.x_mm).hypot(y - current.y_mm);
        tracing::debug!(x_mm = x, y_mm = y, distance_mm = distance, "MockStage: XY move");

        self.finish_move(StagePosition::new(x, y, current.z_mm), distance)
            .await;
        record(&self.events, HardwareEvent::MoveXy { x_mm: x, y_mm: y });
        Ok(())
    }

    async fn move_z_to(&self, z_mm: f64) -> Result<()> {
        self.error_config.check_operation(DRIVER, "move_z")?;

        let z = match &self.z_limits {
            Some(limits) => limits.enforce("Z", z_mm)?,
            None => z_mm,
        };

        let current = self.current_position();
        let distance = (z - current.z_mm).abs();
        tracing::debug!(z_mm = z, "MockStage: Z move");

        self.finish_move(StagePosition::new(current.x_mm, current.y_mm, z), distance)
            .await;
        record(&self.events, HardwareEvent::MoveZ { z_mm: z });
        Ok(())
    }

    async fn wait_idle(&self) -> Result<()> {
        self.error_config.check_operation(DRIVER, "wait_idle")?;
        if self.mode.simulates_timing() {
            let distance = self.state.lock().last_move_distance_mm;
            if distance > 0.0 {
                sleep(Duration::from_millis(self.settling_ms)).await;
            }
        }
        Ok(())
    }

    async fn position(&self) -> Result<StagePosition> {
        self.error_config.check_operation(DRIVER, "position")?;
        Ok(self.current_position())
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for MockStage with fluent API
pub struct MockStageBuilder {
    initial_position: StagePosition,
    speed_mm_per_sec: f64,
    settling_ms: u64,
    xy_limits: Option<AxisLimits>,
    z_limits: Option<AxisLimits>,
    mode: MockMode,
    error_config: ErrorConfig,
    events: Option<EventLog>,
}

impl MockStageBuilder {
    /// Defaults: origin, 10 mm/s, 50 ms settling, instant mode
    pub fn new() -> Self {
        Self {
            initial_position: StagePosition::default(),
            speed_mm_per_sec: 10.0,
            settling_ms: 50,
            xy_limits: None,
            z_limits: None,
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
            events: None,
        }
    }

    /// Starting position
    pub fn initial_position(mut self, position: StagePosition) -> Self {
        self.initial_position = position;
        self
    }

    /// Motion speed for realistic mode
    pub fn speed_mm_per_sec(mut self, speed: f64) -> Self {
        self.speed_mm_per_sec = speed;
        self
    }

    /// Settling delay applied by `wait_idle` in realistic mode
    pub fn settling_ms(mut self, ms: u64) -> Self {
        self.settling_ms = ms;
        self
    }

    /// XY travel limits
    pub fn xy_limits(mut self, limits: AxisLimits) -> Self {
        self.xy_limits = Some(limits);
        self
    }

    /// Z travel limits
    pub fn z_limits(mut self, limits: AxisLimits) -> Self {
        self.z_limits = Some(limits);
        self
    }

    /// Timing mode
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Error injection; operations are `move_xy`, `move_z`, `wait_idle`, `position`
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Shared event log
    pub fn event_log(mut self, log: EventLog) -> Self {
        self.events = Some(log);
        self
    }

    /// Build the stage
    pub fn build(self) -> MockStage {
        MockStage {
            state: Arc::new(Mutex::new(StageState {
                position: self.initial_position,
                ..Default::default()
            })),
            speed_mm_per_sec: self.speed_mm_per_sec,
            settling_ms: self.settling_ms,
            xy_limits: self.xy_limits,
            z_limits: self.z_limits,
            mode: self.mode,
            error_config: self.error_config,
            events: self.events,
        }
    }
}

impl Default for MockStageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;
    use scope_core::error::{DriverError, DriverErrorKind};

    #[tokio::test]
    async fn test_move_updates_position_and_history() {
        let stage = MockStage::new();
        stage.move_to(10.0, 5.0).await.unwrap();
        stage.move_z_to(1.5).await.unwrap();
        stage.wait_idle().await.unwrap();

        let pos = stage.position().await.unwrap();
        assert_eq!(pos, StagePosition::new(10.0, 5.0, 1.5));
        assert_eq!(stage.move_history().len(), 2);
    }

    #[tokio::test]
    async fn test_hard_stop_limits() {
        let stage = MockStage::builder()
            .xy_limits(AxisLimits::hard_stop(0.0, 100.0))
            .build();
        assert!(stage.move_to(150.0, 0.0).await.is_err());
        assert_eq!(stage.current_position().x_mm, 0.0);
    }

    #[tokio::test]
    async fn test_clamp_limits() {
        let stage = MockStage::builder()
            .z_limits(AxisLimits::clamp(0.0, 5.0))
            .build();
        stage.move_z_to(7.0).await.unwrap();
        assert_eq!(stage.current_position().z_mm, 5.0);
    }

    #[tokio::test]
    async fn test_injected_move_failure_is_driver_error() {
        let stage = MockStage::builder()
            .error_config(ErrorConfig::scenario(ErrorScenario::FailOnCall {
                operation: "move_xy",
                call: 2,
            }))
            .build();
        stage.move_to(1.0, 1.0).await.unwrap();
        let err = stage.move_to(2.0, 2.0).await.unwrap_err();
        assert_eq!(DriverError::kind_of(&err), Some(DriverErrorKind::Hardware));
        assert_eq!(stage.current_position().x_mm, 1.0);
    }

    #[tokio::test]
    async fn test_event_log_records_moves() {
        let log = EventLog::new();
        let stage = MockStage::builder().event_log(log.clone()).build();
        stage.move_to(3.0, 4.0).await.unwrap();
        stage.move_z_to(0.2).await.unwrap();
        assert_eq!(
            log.snapshot(),
            vec![
                HardwareEvent::MoveXy {
                    x_mm: 3.0,
                    y_mm: 4.0
                },
                HardwareEvent::MoveZ { z_mm: 0.2 }
            ]
        );
    }
}
