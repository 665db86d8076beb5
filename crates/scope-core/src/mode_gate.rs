//! Exclusive-access gate for the microscope during acquisition.
//!
//! While a run is active, manual controls (live view, stage jog, channel
//! switching from a UI) must stay away from the hardware. The controller
//! engages the gate before the worker starts and releases it on every exit
//! path.

use std::sync::atomic::{AtomicBool, Ordering};

/// Gate that external controllers consult before touching hardware.
pub trait ModeGate: Send + Sync {
    /// Enter acquisition mode. Returns false if already engaged.
    fn engage(&self) -> bool;

    /// Leave acquisition mode. Safe to call when not engaged.
    fn release(&self);

    /// True while acquisition mode is active.
    fn is_engaged(&self) -> bool;
}

/// Lock-free [`ModeGate`] backed by an atomic flag.
#[derive(Debug, Default)]
pub struct AtomicModeGate {
    engaged: AtomicBool,
}

impl AtomicModeGate {
    /// New, released gate.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModeGate for AtomicModeGate {
    fn engage(&self) -> bool {
        self.engaged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.engaged.store(false, Ordering::Release);
    }

    fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}
