//! Progress snapshots handed to observers.

use serde::Serialize;

/// Position of the run in the timepoint/region loop.
///
/// `current_region` is 1-based, `current_timepoint` is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverallProgressUpdate {
    /// Region being imaged (1-based)
    pub current_region: usize,
    /// Regions per timepoint
    pub total_regions: usize,
    /// Timepoint being imaged (0-based)
    pub current_timepoint: usize,
    /// Timepoints in the run
    pub total_timepoints: usize,
}

/// FOVs finished in the current region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionProgressUpdate {
    /// FOVs completed (1-based count)
    pub current_fov: usize,
    /// FOVs in the region
    pub region_fovs: usize,
}

impl OverallProgressUpdate {
    /// Ordering key: (timepoint, region).
    pub fn key(&self) -> (usize, usize) {
        (self.current_timepoint, self.current_region)
    }

    /// Fraction of regions started, in [0, 1].
    pub fn fraction(&self) -> f64 {
        let total = self.total_regions * self.total_timepoints;
        if total == 0 {
            return 0.0;
        }
        (self.current_timepoint * self.total_regions + self.current_region) as f64 / total as f64
    }
}
