//! Coordinate planning seam.
//!
//! Region and FOV geometry comes from outside the acquisition core (well-plate
//! navigator, manual region list, tiling planner). The acquisition layer only
//! asks a [`CoordinatePlanner`] for the ordered result once per run.

use serde::{Deserialize, Serialize};

/// One field of view. `z_mm` is `None` when the planner leaves focus to the stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FovCoordinate {
    /// X in mm
    pub x_mm: f64,
    /// Y in mm
    pub y_mm: f64,
    /// Optional focus in mm
    pub z_mm: Option<f64>,
}

impl FovCoordinate {
    /// FOV with an explicit focus position.
    pub fn new(x_mm: f64, y_mm: f64, z_mm: f64) -> Self {
        Self {
            x_mm,
            y_mm,
            z_mm: Some(z_mm),
        }
    }

    /// FOV without a planned focus position.
    pub fn xy(x_mm: f64, y_mm: f64) -> Self {
        Self {
            x_mm,
            y_mm,
            z_mm: None,
        }
    }
}

/// A named scan region with its ordered FOVs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPlan {
    /// Region name (well id or user label), used in file names.
    pub name: String,
    /// Region center (x, y, z) in mm.
    pub center: (f64, f64, f64),
    /// Ordered FOVs.
    pub fovs: Vec<FovCoordinate>,
}

impl RegionPlan {
    /// Build a region.
    pub fn new(name: impl Into<String>, center: (f64, f64, f64), fovs: Vec<FovCoordinate>) -> Self {
        Self {
            name: name.into(),
            center,
            fovs,
        }
    }
}

/// Produces the ordered scan geometry for a run.
///
/// Called once per run, before the worker starts. The returned order is the
/// capture order.
pub trait CoordinatePlanner: Send + Sync {
    /// Compute regions and their FOVs.
    fn compute_scan_positions(&self) -> anyhow::Result<Vec<RegionPlan>>;
}

/// Planner that returns a fixed list of regions.
#[derive(Debug, Clone, Default)]
pub struct FixedPlanner {
    regions: Vec<RegionPlan>,
}

impl FixedPlanner {
    /// Wrap a region list.
    pub fn new(regions: Vec<RegionPlan>) -> Self {
        Self { regions }
    }
}

impl CoordinatePlanner for FixedPlanner {
    fn compute_scan_positions(&self) -> anyhow::Result<Vec<RegionPlan>> {
        Ok(self.regions.clone())
    }
}
