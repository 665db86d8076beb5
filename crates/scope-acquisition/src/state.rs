//! Run state machine.
//!
//! ```text
//! Idle -> Running -> Completed ------------> Idle
//!                 -> Aborting -> Aborted --> Idle
//!                 -> Error --------------> Idle
//! ```
//!
//! Every transition is a compare-and-swap on one `AtomicU8`, so two callers
//! racing to start a run (or to abort one) cannot both win.

use crate::abort::AbortToken;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Controller run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum AcquisitionState {
    /// No run.
    Idle = 0,
    /// Worker is scanning.
    Running = 1,
    /// Abort requested, worker winding down.
    Aborting = 2,
    /// Run finished every position; pipeline drained.
    Completed = 3,
    /// Run stopped by abort; pipeline drained.
    Aborted = 4,
    /// Run stopped by a fatal error; pipeline drained.
    Error = 5,
}

impl AcquisitionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AcquisitionState::Running,
            2 => AcquisitionState::Aborting,
            3 => AcquisitionState::Completed,
            4 => AcquisitionState::Aborted,
            5 => AcquisitionState::Error,
            _ => AcquisitionState::Idle,
        }
    }

    /// True while a run owns the hardware.
    pub fn is_active(self) -> bool {
        matches!(self, AcquisitionState::Running | AcquisitionState::Aborting)
    }
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Running => "running",
            AcquisitionState::Aborting => "aborting",
            AcquisitionState::Completed => "completed",
            AcquisitionState::Aborted => "aborted",
            AcquisitionState::Error => "error",
        };
        write!(f, "{}", label)
    }
}

/// State cell plus the abort token of the current run.
#[derive(Debug)]
pub(crate) struct RunControl {
    state: AtomicU8,
    abort: AbortToken,
}

impl RunControl {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(AcquisitionState::Idle as u8),
            abort: AbortToken::new(),
        }
    }

    pub(crate) fn state(&self) -> AcquisitionState {
        AcquisitionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn transition(&self, from: AcquisitionState, to: AcquisitionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn set(&self, to: AcquisitionState) {
        self.state.store(to as u8, Ordering::SeqCst);
    }

    pub(crate) fn abort_token(&self) -> &AbortToken {
        &self.abort
    }

    /// `Running -> Aborting` and raise the token. False if not running or
    /// already aborting.
    pub(crate) fn request_abort(&self) -> bool {
        if self.transition(AcquisitionState::Running, AcquisitionState::Aborting) {
            self.abort.request();
            tracing::info!("Acquisition abort requested");
            true
        } else {
            false
        }
    }
}

/// Cloneable handle that can abort the controller's current run, e.g. from
/// inside a callback.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    control: Arc<RunControl>,
}

impl AbortHandle {
    pub(crate) fn new(control: Arc<RunControl>) -> Self {
        Self { control }
    }

    /// Request an abort. Idempotent; returns true only for the call that
    /// moved the run to `Aborting`.
    pub fn abort(&self) -> bool {
        self.control.request_abort()
    }

    /// Current run state.
    pub fn state(&self) -> AcquisitionState {
        self.control.state()
    }
}
