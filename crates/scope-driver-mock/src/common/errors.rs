//! Failure injection for mock devices.
//!
//! Each mock calls [`ErrorConfig::check_operation`] before touching its
//! simulated state. Injected failures are [`DriverError`]s with the same
//! kinds a real driver reports, so retry and skip paths in the acquisition
//! loop see realistic errors. Call counters are per operation name and
//! shared between clones.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use scope_core::error::{DriverError, DriverErrorKind};
use std::collections::HashMap;
use std::sync::Arc;

/// A deterministic failure pattern.
#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Succeed `count` times, then fail every call
    FailAfterN {
        /// Operation name, e.g. `"read_frame"`
        operation: &'static str,
        /// Number of successful calls before failing
        count: u32,
    },
    /// Fail the first `times` calls with a timeout, then succeed
    FailFirstN {
        /// Operation name
        operation: &'static str,
        /// Number of initial failures
        times: u32,
    },
    /// Fail exactly the `call`-th invocation (1-based) with a hardware error
    FailOnCall {
        /// Operation name
        operation: &'static str,
        /// 1-based call number
        call: u32,
    },
    /// Every call times out
    Timeout {
        /// Operation name
        operation: &'static str,
    },
    /// The device drops off the bus on its first call and stays gone
    CommunicationLoss,
    /// The device latches a fault code on its first call
    HardwareFault {
        /// Vendor fault code
        code: u32,
    },
}

/// Sticky device condition; every later call fails the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Latched {
    Disconnected,
    Fault(u32),
}

impl Latched {
    fn error(self, device: &str) -> DriverError {
        match self {
            Latched::Disconnected => {
                DriverError::new(device, DriverErrorKind::Communication, "Communication lost")
            }
            Latched::Fault(code) => DriverError::new(
                device,
                DriverErrorKind::Hardware,
                format!("Hardware fault: {}", code),
            ),
        }
    }
}

impl ErrorScenario {
    /// What this scenario does to the `call`-th invocation of `operation`.
    fn apply(&self, device: &str, operation: &str, call: u32) -> Option<Result<DriverError, Latched>> {
        let hardware = |message: String| DriverError::new(device, DriverErrorKind::Hardware, message);
        match *self {
            ErrorScenario::FailAfterN { operation: op, count } if op == operation && call > count => {
                Some(Ok(hardware(format!(
                    "Injected failure after {} successful '{}' calls",
                    count, operation
                ))))
            }
            ErrorScenario::FailFirstN { operation: op, times } if op == operation && call <= times => {
                Some(Ok(DriverError::timeout(
                    device,
                    format!("Injected failure {} of {} on '{}'", call, times, operation),
                )))
            }
            ErrorScenario::FailOnCall { operation: op, call: target }
                if op == operation && call == target =>
            {
                Some(Ok(hardware(format!(
                    "Injected failure on call {} of '{}'",
                    call, operation
                ))))
            }
            ErrorScenario::Timeout { operation: op } if op == operation => Some(Ok(
                DriverError::timeout(device, format!("Operation '{}' timed out", operation)),
            )),
            ErrorScenario::CommunicationLoss => Some(Err(Latched::Disconnected)),
            ErrorScenario::HardwareFault { code } => Some(Err(Latched::Fault(code))),
            _ => None,
        }
    }
}

struct InjectorState {
    calls: HashMap<&'static str, u32>,
    latched: Option<Latched>,
    rng: ChaCha8Rng,
}

impl std::fmt::Debug for InjectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectorState")
            .field("calls", &self.calls)
            .field("latched", &self.latched)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Injector {
    /// Per-operation failure probability; `"*"` covers every operation
    rates: HashMap<&'static str, f64>,
    scenarios: Vec<ErrorScenario>,
    seed: Option<u64>,
    state: Mutex<InjectorState>,
}

fn rng_from(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Failure injection shared by a device and its clones.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    inner: Arc<Injector>,
}

impl ErrorConfig {
    /// Never fail.
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Fail any operation with probability `rate`, optionally seeded.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        Self::build(HashMap::from([("*", rate)]), Vec::new(), seed)
    }

    /// A single scenario.
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios; the first that fires wins.
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Per-operation failure probabilities.
    pub fn with_rates(rates: HashMap<&'static str, f64>) -> Self {
        Self::build(rates, Vec::new(), None)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            inner: Arc::new(Injector {
                rates,
                scenarios,
                seed,
                state: Mutex::new(InjectorState {
                    calls: HashMap::new(),
                    latched: None,
                    rng: rng_from(seed),
                }),
            }),
        }
    }

    /// Count one call of `operation` on `device` and decide whether it fails.
    pub fn check_operation(
        &self,
        device: &str,
        operation: &'static str,
    ) -> Result<(), DriverError> {
        let injector = &*self.inner;
        let mut state = injector.state.lock();

        if let Some(latched) = state.latched {
            return Err(latched.error(device));
        }

        let counter = state.calls.entry(operation).or_insert(0);
        *counter += 1;
        let call = *counter;

        for scenario in &injector.scenarios {
            match scenario.apply(device, operation, call) {
                Some(Ok(err)) => return Err(err),
                Some(Err(latched)) => {
                    state.latched = Some(latched);
                    return Err(latched.error(device));
                }
                None => {}
            }
        }

        let rate = injector
            .rates
            .get(operation)
            .or_else(|| injector.rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        let fails = rate >= 1.0 || (rate > 0.0 && state.rng.gen::<f64>() < rate);
        if fails {
            return Err(DriverError::new(
                device,
                DriverErrorKind::Hardware,
                format!("Random failure on operation '{}'", operation),
            ));
        }
        Ok(())
    }

    /// Clear call counters and latched faults, and reseed.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.calls.clear();
        state.latched = None;
        state.rng = rng_from(self.inner.seed);
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
