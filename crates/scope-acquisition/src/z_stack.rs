//! Z-level planning.
//!
//! A stack is an arithmetic sequence `start + i * step` for `i` in `0..nz`.
//! For stage stacks the values are absolute stage millimetres; for piezo
//! stacks they are offsets in millimetres from the piezo position at the start
//! of the FOV.

use crate::parameters::{AcquisitionParameters, ZStacking};

/// Arithmetic z sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZStackPlan {
    /// First level (mm)
    pub start_mm: f64,
    /// Signed step (mm)
    pub step_mm: f64,
    /// Number of levels
    pub levels: usize,
}

impl ZStackPlan {
    /// Absolute stage levels for a FOV focused at `focus_z_mm`.
    ///
    /// An explicit z-range replaces the focus position as origin: its min for
    /// `FromBottom`, its max for `FromTop`, its midpoint for `FromCenter`.
    pub fn for_stage(params: &AcquisitionParameters, focus_z_mm: f64) -> Self {
        let origin = match (params.z_range, params.z_stacking) {
            (Some(range), ZStacking::FromBottom) => range.min_mm,
            (Some(range), ZStacking::FromTop) => range.max_mm,
            (Some(range), ZStacking::FromCenter) => (range.min_mm + range.max_mm) / 2.0,
            (None, _) => focus_z_mm,
        };
        Self::around(origin, params)
    }

    /// Offsets from the piezo position at FOV start.
    pub fn for_piezo(params: &AcquisitionParameters) -> Self {
        Self::around(0.0, params)
    }

    fn around(origin: f64, params: &AcquisitionParameters) -> Self {
        let dz = params.delta_z_mm;
        let levels = params.nz.max(1);
        let (start_mm, step_mm) = match params.z_stacking {
            ZStacking::FromBottom => (origin, dz),
            ZStacking::FromTop => (origin, -dz),
            ZStacking::FromCenter => {
                let below = ((levels - 1) as f64 / 2.0).round();
                (origin - dz * below, dz)
            }
        };
        Self {
            start_mm,
            step_mm,
            levels,
        }
    }

    /// Level `i`.
    pub fn level(&self, i: usize) -> f64 {
        self.start_mm + self.step_mm * i as f64
    }

    /// All levels in capture order.
    pub fn levels(&self) -> Vec<f64> {
        (0..self.levels).map(|i| self.level(i)).collect()
    }
}
