//! Rectangular grid planner for simulated runs.

use scope_core::planner::{CoordinatePlanner, FovCoordinate, RegionPlan};
use serde::Deserialize;

/// One rectangular region: `nx × ny` FOVs spaced `dx_mm`/`dy_mm` around a center.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GridRegion {
    /// Region name
    pub name: String,
    /// Center X in mm
    pub center_x_mm: f64,
    /// Center Y in mm
    pub center_y_mm: f64,
    /// Center Z in mm
    #[serde(default)]
    pub center_z_mm: f64,
    /// Columns
    #[serde(default = "one")]
    pub nx: usize,
    /// Rows
    #[serde(default = "one")]
    pub ny: usize,
    /// Column spacing in mm
    #[serde(default)]
    pub dx_mm: f64,
    /// Row spacing in mm
    #[serde(default)]
    pub dy_mm: f64,
}

fn one() -> usize {
    1
}

/// Planner producing grid FOVs per region, optionally in an S-pattern
/// (odd rows reversed) and clipped to a stage travel box.
#[derive(Debug, Clone, Default)]
pub struct GridPlanner {
    regions: Vec<GridRegion>,
    serpentine: bool,
    travel: Option<((f64, f64), (f64, f64))>,
}

impl GridPlanner {
    /// Planner over the given regions, row-major, no clipping.
    pub fn new(regions: Vec<GridRegion>) -> Self {
        Self {
            regions,
            serpentine: false,
            travel: None,
        }
    }

    /// Reverse every odd row.
    pub fn serpentine(mut self, serpentine: bool) -> Self {
        self.serpentine = serpentine;
        self
    }

    /// Drop FOVs outside `x_range` × `y_range` (mm).
    pub fn travel_limits(mut self, x_range: (f64, f64), y_range: (f64, f64)) -> Self {
        self.travel = Some((x_range, y_range));
        self
    }

    fn reachable(&self, x: f64, y: f64) -> bool {
        match self.travel {
            Some(((x0, x1), (y0, y1))) => (x0..=x1).contains(&x) && (y0..=y1).contains(&y),
            None => true,
        }
    }

    fn plan_region(&self, region: &GridRegion) -> RegionPlan {
        let width = region.nx.saturating_sub(1) as f64 * region.dx_mm;
        let height = region.ny.saturating_sub(1) as f64 * region.dy_mm;
        let xs: Vec<f64> = (0..region.nx)
            .map(|j| region.center_x_mm - width / 2.0 + j as f64 * region.dx_mm)
            .collect();

        let mut fovs = Vec::with_capacity(region.nx * region.ny);
        for i in 0..region.ny {
            let y = region.center_y_mm - height / 2.0 + i as f64 * region.dy_mm;
            let row: Box<dyn Iterator<Item = &f64>> = if self.serpentine && i % 2 == 1 {
                Box::new(xs.iter().rev())
            } else {
                Box::new(xs.iter())
            };
            fovs.extend(
                row.filter(|&&x| self.reachable(x, y))
                    .map(|&x| FovCoordinate::new(x, y, region.center_z_mm)),
            );
        }

        RegionPlan::new(
            region.name.clone(),
            (region.center_x_mm, region.center_y_mm, region.center_z_mm),
            fovs,
        )
    }
}

impl CoordinatePlanner for GridPlanner {
    fn compute_scan_positions(&self) -> anyhow::Result<Vec<RegionPlan>> {
        let plans: Vec<RegionPlan> = self
            .regions
            .iter()
            .map(|r| self.plan_region(r))
            .filter(|plan| {
                if plan.fovs.is_empty() {
                    tracing::warn!(region = %plan.name, "region has no reachable FOVs, skipped");
                    false
                } else {
                    true
                }
            })
            .collect();
        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(name: &str, nx: usize, ny: usize) -> GridRegion {
        GridRegion {
            name: name.to_string(),
            center_x_mm: 10.0,
            center_y_mm: 20.0,
            center_z_mm: 1.0,
            nx,
            ny,
            dx_mm: 1.0,
            dy_mm: 2.0,
        }
    }

    #[test]
    fn test_grid_is_centered() {
        let plans = GridPlanner::new(vec![region("A1", 3, 1)])
            .compute_scan_positions()
            .unwrap();
        let xs: Vec<f64> = plans[0].fovs.iter().map(|f| f.x_mm).collect();
        assert_eq!(xs, vec![9.0, 10.0, 11.0]);
        assert!(plans[0].fovs.iter().all(|f| f.z_mm == Some(1.0)));
    }

    #[test]
    fn test_serpentine_reverses_odd_rows() {
        let plans = GridPlanner::new(vec![region("A1", 2, 2)])
            .serpentine(true)
            .compute_scan_positions()
            .unwrap();
        let order: Vec<(f64, f64)> = plans[0].fovs.iter().map(|f| (f.x_mm, f.y_mm)).collect();
        assert_eq!(
            order,
            vec![(9.5, 19.0), (10.5, 19.0), (10.5, 21.0), (9.5, 21.0)]
        );
    }

    #[test]
    fn test_unreachable_region_dropped() {
        let plans = GridPlanner::new(vec![region("A1", 2, 2), region("B1", 1, 1)])
            .travel_limits((0.0, 5.0), (0.0, 5.0))
            .compute_scan_positions()
            .unwrap();
        assert!(plans.is_empty());
    }
}
