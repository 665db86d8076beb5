//! Planned scan geometry for one run.

use crate::error::{AcquisitionError, AcquisitionResult};
use scope_core::planner::{FovCoordinate, RegionPlan};
use scope_storage::metadata::PlannedCoordinate;
use std::collections::HashSet;

/// Ordered regions and their ordered FOVs, fixed for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPositionInformation {
    regions: Vec<RegionPlan>,
}

impl ScanPositionInformation {
    /// Validate planner output.
    ///
    /// Fails with `InvalidParameters` when there is nothing to image, when a
    /// region has no FOVs, or when two regions share a name (file names would
    /// collide).
    pub fn from_plans(regions: Vec<RegionPlan>) -> AcquisitionResult<Self> {
        if regions.is_empty() {
            return Err(AcquisitionError::InvalidParameters(
                "scan plan has no regions".into(),
            ));
        }

        let mut names = HashSet::new();
        for region in &regions {
            if region.fovs.is_empty() {
                return Err(AcquisitionError::InvalidParameters(format!(
                    "region '{}' has no FOVs",
                    region.name
                )));
            }
            if !names.insert(region.name.as_str()) {
                return Err(AcquisitionError::InvalidParameters(format!(
                    "duplicate region name '{}'",
                    region.name
                )));
            }
            let bad = region
                .fovs
                .iter()
                .any(|f| !(f.x_mm.is_finite() && f.y_mm.is_finite()) || f.z_mm.is_some_and(|z| !z.is_finite()));
            if bad {
                return Err(AcquisitionError::InvalidParameters(format!(
                    "region '{}' has a non-finite coordinate",
                    region.name
                )));
            }
        }

        Ok(Self { regions })
    }

    /// Regions in scan order.
    pub fn regions(&self) -> &[RegionPlan] {
        &self.regions
    }

    /// Region names in scan order.
    pub fn region_names(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.name.as_str())
    }

    /// Number of regions.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// FOVs summed over all regions.
    pub fn total_fovs(&self) -> usize {
        self.regions.iter().map(|r| r.fovs.len()).sum()
    }

    /// FOVs of region `index`, if it exists.
    pub fn fovs(&self, index: usize) -> Option<&[FovCoordinate]> {
        self.regions.get(index).map(|r| r.fovs.as_slice())
    }

    /// One row per planned FOV, for the experiment-level coordinates file.
    pub fn planned_coordinates(&self) -> Vec<PlannedCoordinate> {
        self.regions
            .iter()
            .flat_map(|region| {
                region.fovs.iter().map(move |fov| PlannedCoordinate {
                    region: region.name.clone(),
                    x_mm: fov.x_mm,
                    y_mm: fov.y_mm,
                    z_mm: fov.z_mm,
                })
            })
            .collect()
    }
}
