//! Run file for `scope-acquire`.
//!
//! The file is a superset of [`ScopeConfig`]: the usual `[application]`,
//! `[pipeline]`, `[acquisition]` and `[storage]` tables plus
//! `[simulation]` (which mock devices to build) and `[experiment]` (what to
//! acquire). Environment overrides use the same `SCOPE_` prefix.

use anyhow::{Context, Result};
use scope_acquisition::{
    unique_experiment_id, AcquisitionParameters, ScopeConfig, ZStacking,
};
use scope_core::channel::ChannelMode;
use scope_driver_mock::{GridRegion, MockMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Everything a run file can hold.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Controller settings
    #[serde(flatten)]
    pub scope: ScopeConfig,
    /// Simulated rig
    pub simulation: SimulationConfig,
    /// Acquisition request
    pub experiment: ExperimentConfig,
}

/// Mock devices to assemble.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Instant or realistic device timing
    pub mode: MockMode,
    /// Sensor width in pixels
    pub camera_width: u32,
    /// Sensor height in pixels
    pub camera_height: u32,
    /// RGB sensor
    pub color_camera: bool,
    /// Piezo start position; no piezo when absent
    pub piezo_um: Option<f64>,
    /// Attach a contrast autofocus
    pub contrast_autofocus: bool,
    /// Attach a laser reflection autofocus
    pub laser_autofocus: bool,
    /// Attach a fluidics controller
    pub fluidics: bool,
    /// S-pattern FOV order
    pub serpentine: bool,
    /// Regions to scan
    pub regions: Vec<GridRegion>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mode: MockMode::Instant,
            camera_width: 256,
            camera_height: 256,
            color_camera: false,
            piezo_um: None,
            contrast_autofocus: false,
            laser_autofocus: false,
            fluidics: false,
            serpentine: true,
            regions: vec![GridRegion {
                name: "A1".to_string(),
                center_x_mm: 10.0,
                center_y_mm: 10.0,
                center_z_mm: 1.0,
                nx: 2,
                ny: 2,
                dx_mm: 0.9,
                dy_mm: 0.9,
            }],
        }
    }
}

/// Acquisition request as written in the run file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Base name; a timestamp is appended
    pub name: String,
    /// Output root; `storage.output_dir` when absent
    pub base_path: Option<PathBuf>,
    /// Channels imaged at every z-level
    pub channels: Vec<ChannelMode>,
    /// Z-levels per FOV
    pub nz: usize,
    /// Z step in micrometres
    pub delta_z_um: f64,
    /// Stack direction
    pub z_stacking: ZStacking,
    /// Timepoints
    pub nt: usize,
    /// Timepoint interval in seconds
    pub delta_t_s: f64,
    /// Contrast autofocus
    pub autofocus: bool,
    /// Reflection autofocus
    pub reflection_autofocus: bool,
    /// Step z with the piezo
    pub use_piezo: bool,
    /// Run fluidics hooks
    pub use_fluidics: bool,
    /// Discard frames
    pub skip_saving: bool,
    /// Only visit positions
    pub positions_only: bool,
    /// Preview downsampling factor
    pub downsampled_views: Option<f64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "experiment".to_string(),
            base_path: None,
            channels: vec![ChannelMode::brightfield(0, "BF LED matrix full", 10.0)],
            nz: 1,
            delta_z_um: 1.5,
            z_stacking: ZStacking::FromBottom,
            nt: 1,
            delta_t_s: 0.0,
            autofocus: false,
            reflection_autofocus: false,
            use_piezo: false,
            use_fluidics: false,
            skip_saving: false,
            positions_only: false,
            downsampled_views: None,
        }
    }
}

impl RunConfig {
    /// Defaults, then the file, then `SCOPE_` variables.
    pub fn load(path: &Path) -> Result<Self> {
        let config: RunConfig = ScopeConfig::figment(path)
            .extract()
            .with_context(|| format!("Failed to load run file {}", path.display()))?;
        config
            .scope
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid configuration")?;
        Ok(config)
    }

    /// Build the acquisition request.
    pub fn parameters(&self) -> AcquisitionParameters {
        let exp = &self.experiment;
        let base = exp
            .base_path
            .clone()
            .unwrap_or_else(|| self.scope.storage.output_dir.clone());

        let mut builder = AcquisitionParameters::builder(unique_experiment_id(&exp.name), base)
            .channels(exp.channels.clone())
            .z_stack(exp.nz, exp.delta_z_um / 1000.0, exp.z_stacking)
            .timepoints(exp.nt, exp.delta_t_s)
            .autofocus(exp.autofocus)
            .reflection_autofocus(exp.reflection_autofocus)
            .use_piezo(exp.use_piezo)
            .use_fluidics(exp.use_fluidics)
            .skip_saving(exp.skip_saving)
            .positions_only(exp.positions_only);
        if let Some(first) = self.simulation.regions.first() {
            builder = builder.grid(first.nx, first.dx_mm, first.ny, first.dy_mm);
        }
        if let Some(scaling) = exp.downsampled_views {
            builder = builder.downsampled_views(scaling);
        }
        builder.build()
    }
}
