//! Mock software-triggered camera.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use scope_core::capabilities::Camera;
use scope_core::data::Frame;
use scope_core::error::{DriverError, DriverErrorKind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::common::events::{record, EventLog, HardwareEvent};
use crate::common::{ErrorConfig, MockMode};
use crate::pattern::{generate_rgb_pattern, generate_test_pattern};

const DRIVER: &str = "mock_camera";

#[derive(Debug, Default)]
struct CameraCounters {
    triggers: AtomicU64,
    frames: AtomicU64,
    pending: Mutex<u64>,
}

/// Simulated camera.
///
/// Each `trigger` queues one frame; `read_frame` delivers it. Reading with
/// nothing queued fails with a timeout [`DriverError`]. Frames are 16-bit
/// mono (or 16-bit RGB for a color camera) test patterns.
///
/// # Example
///
/// ```rust,ignore
/// let camera = MockCamera::builder(64, 48).build();
/// camera.start_streaming().await?;
/// camera.trigger().await?;
/// let frame = camera.read_frame(Duration::from_millis(100)).await?;
/// ```
#[derive(Clone)]
pub struct MockCamera {
    width: u32,
    height: u32,
    color: bool,
    exposure_ms: f64,
    mode: MockMode,
    streaming: Arc<AtomicBool>,
    counters: Arc<CameraCounters>,
    error_config: ErrorConfig,
    events: Option<EventLog>,
}

impl MockCamera {
    /// Instant-mode mono camera.
    pub fn new(width: u32, height: u32) -> Self {
        Self::builder(width, height).build()
    }

    /// Create a builder
    pub fn builder(width: u32, height: u32) -> MockCameraBuilder {
        MockCameraBuilder::new(width, height)
    }

    /// Successful triggers so far.
    pub fn trigger_count(&self) -> u64 {
        self.counters.triggers.load(Ordering::SeqCst)
    }

    /// Frames delivered so far.
    pub fn frame_count(&self) -> u64 {
        self.counters.frames.load(Ordering::SeqCst)
    }

    /// True between `start_streaming` and `stop_streaming`.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn render(&self, frame_number: u64) -> Frame {
        if self.color {
            Frame::from_rgb16(
                self.width,
                self.height,
                &generate_rgb_pattern(self.width, self.height, frame_number),
            )
        } else {
            Frame::from_u16(
                self.width,
                self.height,
                &generate_test_pattern(self.width, self.height, frame_number),
            )
        }
    }
}

#[async_trait]
impl Camera for MockCamera {
    async fn start_streaming(&self) -> Result<()> {
        self.error_config.check_operation(DRIVER, "start_streaming")?;
        self.streaming.store(true, Ordering::SeqCst);
        tracing::debug!("MockCamera: streaming started");
        Ok(())
    }

    async fn stop_streaming(&self) -> Result<()> {
        self.streaming.store(false, Ordering::SeqCst);
        *self.counters.pending.lock() = 0;
        tracing::debug!("MockCamera: streaming stopped");
        Ok(())
    }

    async fn trigger(&self) -> Result<()> {
        if !self.is_streaming() {
            return Err(DriverError::new(
                DRIVER,
                DriverErrorKind::Configuration,
                "trigger while not streaming",
            )
            .into());
        }
        self.error_config.check_operation(DRIVER, "trigger")?;
        *self.counters.pending.lock() += 1;
        self.counters.triggers.fetch_add(1, Ordering::SeqCst);
        record(&self.events, HardwareEvent::Trigger);
        Ok(())
    }

    async fn read_frame(&self, timeout: Duration) -> Result<Frame> {
        let had_pending = {
            let mut pending = self.counters.pending.lock();
            if *pending > 0 {
                *pending -= 1;
                true
            } else {
                false
            }
        };

        // An injected failure loses the triggered frame, like a dropped readout.
        self.error_config.check_operation(DRIVER, "read_frame")?;

        if !had_pending {
            if self.mode.simulates_timing() {
                sleep(timeout).await;
            }
            return Err(DriverError::timeout(
                DRIVER,
                format!("no frame within {} ms", timeout.as_millis()),
            )
            .into());
        }

        if self.mode.simulates_timing() && self.exposure_ms > 0.0 {
            sleep(Duration::from_secs_f64(self.exposure_ms / 1000.0)).await;
        }

        let frame_number = self.counters.frames.fetch_add(1, Ordering::SeqCst);
        record(&self.events, HardwareEvent::FrameRead { frame_number });
        Ok(self.render(frame_number))
    }

    fn is_color(&self) -> bool {
        self.color
    }
}

/// Builder for MockCamera
pub struct MockCameraBuilder {
    width: u32,
    height: u32,
    color: bool,
    exposure_ms: f64,
    mode: MockMode,
    error_config: ErrorConfig,
    events: Option<EventLog>,
}

impl MockCameraBuilder {
    /// Defaults: mono, 10 ms exposure, instant mode
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: false,
            exposure_ms: 10.0,
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
            events: None,
        }
    }

    /// Deliver RGB frames
    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Simulated exposure for realistic mode
    pub fn exposure_ms(mut self, ms: f64) -> Self {
        self.exposure_ms = ms;
        self
    }

    /// Timing mode
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Error injection; operations are `start_streaming`, `trigger`, `read_frame`
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Shared event log
    pub fn event_log(mut self, log: EventLog) -> Self {
        self.events = Some(log);
        self
    }

    /// Build the camera
    pub fn build(self) -> MockCamera {
        MockCamera {
            width: self.width,
            height: self.height,
            color: self.color,
            exposure_ms: self.exposure_ms,
            mode: self.mode,
            streaming: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(CameraCounters::default()),
            error_config: self.error_config,
            events: self.events,
        }
    }
}
