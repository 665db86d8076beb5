//! Shared hardware event log.
//!
//! Mock devices built with the same [`EventLog`] append to one ordered list,
//! so tests can assert cross-device ordering (autofocus before the first
//! trigger, channel applied before each trigger, ...).

use parking_lot::Mutex;
use std::sync::Arc;

/// One recorded hardware interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareEvent {
    /// Stage XY move completed
    MoveXy {
        /// Target X in mm
        x_mm: f64,
        /// Target Y in mm
        y_mm: f64,
    },
    /// Stage Z move completed
    MoveZ {
        /// Target Z in mm
        z_mm: f64,
    },
    /// Piezo move completed
    PiezoMove {
        /// Target in µm
        position_um: f64,
    },
    /// Channel mode applied
    ChannelApplied {
        /// Channel name
        name: String,
    },
    /// Camera triggered
    Trigger,
    /// Frame delivered by the camera
    FrameRead {
        /// Camera frame counter
        frame_number: u64,
    },
    /// Autofocus routine ran
    Autofocus {
        /// Whether focus was found
        success: bool,
    },
    /// Fluidics hook before a timepoint
    FluidicsBefore {
        /// Timepoint index
        timepoint: usize,
    },
    /// Fluidics hook after a timepoint
    FluidicsAfter {
        /// Timepoint index
        timepoint: usize,
    },
}

/// Cloneable handle to a shared, ordered event list.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<HardwareEvent>>>,
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn record(&self, event: HardwareEvent) {
        self.events.lock().push(event);
    }

    /// Copy of all events so far.
    pub fn snapshot(&self) -> Vec<HardwareEvent> {
        self.events.lock().clone()
    }

    /// Number of events matching `pred`.
    pub fn count(&self, pred: impl Fn(&HardwareEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    /// Index of the first event matching `pred`.
    pub fn position(&self, pred: impl Fn(&HardwareEvent) -> bool) -> Option<usize> {
        self.events.lock().iter().position(|e| pred(e))
    }

    /// Forget all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Record into an optional log.
pub(crate) fn record(log: &Option<EventLog>, event: HardwareEvent) {
    if let Some(log) = log {
        log.record(event);
    }
}
