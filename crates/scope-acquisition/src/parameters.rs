//! Acquisition request.
//!
//! [`AcquisitionParameters`] describes one multi-dimensional run: which
//! channels, how many z-levels and timepoints, which focus aids, and where the
//! images go. The caller builds it with [`AcquisitionParameters::builder`]; the
//! controller validates it and freezes it behind an `Arc` for the whole run.
//!
//! ```rust,ignore
//! let params = AcquisitionParameters::builder(unique_experiment_id("plate 7"), "/data")
//!     .channel(ChannelMode::brightfield(1, "BF LED matrix full", 5.0))
//!     .z_stack(5, 0.0015, ZStacking::FromCenter)
//!     .timepoints(3, 60.0)
//!     .autofocus(true)
//!     .build();
//! ```

use crate::error::{AcquisitionError, AcquisitionResult};
use chrono::{DateTime, Local, Utc};
use scope_core::channel::ChannelMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Longest accepted interval between timepoint starts: 30 days.
pub const MAX_TIMEPOINT_INTERVAL_S: f64 = 30.0 * 24.0 * 3600.0;

/// Where a z-stack starts relative to the FOV focus position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZStacking {
    /// Start at the focus position and step up.
    #[default]
    FromBottom,
    /// Center the stack on the focus position.
    FromCenter,
    /// Start at the focus position and step down.
    FromTop,
}

/// Explicit stack bounds in stage millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZRange {
    /// Lower bound in mm
    pub min_mm: f64,
    /// Upper bound in mm
    pub max_mm: f64,
}

/// Frozen description of one acquisition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParameters {
    /// Experiment directory name below `base_path`.
    pub experiment_id: String,
    /// Output root.
    pub base_path: PathBuf,
    /// Channels imaged at every z-level, in order.
    pub channels: Vec<ChannelMode>,

    /// Grid columns. Carried for the manifest; FOVs come from the planner.
    pub nx: usize,
    /// Grid column spacing in mm. Manifest only.
    pub delta_x_mm: f64,
    /// Grid rows. Manifest only.
    pub ny: usize,
    /// Grid row spacing in mm. Manifest only.
    pub delta_y_mm: f64,

    /// Z-levels per FOV.
    pub nz: usize,
    /// Z step in mm.
    pub delta_z_mm: f64,
    /// Stack placement.
    pub z_stacking: ZStacking,
    /// Explicit stack bounds, overriding the FOV focus as stack origin.
    pub z_range: Option<ZRange>,

    /// Timepoints.
    pub nt: usize,
    /// Interval between timepoint starts, in seconds.
    pub delta_t_s: f64,

    /// Contrast autofocus.
    pub do_autofocus: bool,
    /// Reflection (laser) autofocus. Takes precedence over contrast AF.
    pub do_reflection_autofocus: bool,
    /// Step z with the piezo instead of the stage.
    pub use_piezo: bool,
    /// Run fluidics hooks around each timepoint.
    pub use_fluidics: bool,

    /// Capture without persisting anything.
    pub skip_saving: bool,
    /// Visit every position without imaging. Allows an empty channel list.
    pub positions_only: bool,

    /// Attach a downsampled preview to every capture.
    pub generate_downsampled_views: bool,
    /// Preview scale factor, in (0, 1].
    pub display_resolution_scaling: f64,

    /// Set by the controller when the run starts.
    pub acquisition_start_time: DateTime<Utc>,
}

impl AcquisitionParameters {
    /// Start a builder with single-plane, single-timepoint defaults.
    pub fn builder(
        experiment_id: impl Into<String>,
        base_path: impl Into<PathBuf>,
    ) -> AcquisitionParametersBuilder {
        AcquisitionParametersBuilder::new(experiment_id.into(), base_path.into())
    }

    /// `{base_path}/{experiment_id}`
    pub fn experiment_dir(&self) -> PathBuf {
        self.base_path.join(&self.experiment_id)
    }

    /// Check ranges and combinations.
    pub fn validate(&self) -> AcquisitionResult<()> {
        let invalid = |msg: String| Err(AcquisitionError::InvalidParameters(msg));

        if self.experiment_id.trim().is_empty() {
            return invalid("experiment_id must not be empty".into());
        }
        if self.experiment_id.contains(['/', '\\']) {
            return invalid(format!(
                "experiment_id '{}' must not contain path separators",
                self.experiment_id
            ));
        }
        if !self.skip_saving && self.base_path.as_os_str().is_empty() {
            return invalid("base_path is required unless skip_saving is set".into());
        }

        for (name, count) in [("nx", self.nx), ("ny", self.ny), ("nz", self.nz), ("nt", self.nt)] {
            if count == 0 {
                return invalid(format!("{} must be at least 1", name));
            }
        }

        for (name, value) in [
            ("delta_x_mm", self.delta_x_mm),
            ("delta_y_mm", self.delta_y_mm),
            ("delta_z_mm", self.delta_z_mm),
            ("delta_t_s", self.delta_t_s),
        ] {
            if !value.is_finite() {
                return invalid(format!("{} must be finite, got {}", name, value));
            }
        }

        if self.nz > 1 && self.delta_z_mm <= 0.0 {
            return invalid(format!(
                "delta_z_mm must be positive for a {}-level stack, got {}",
                self.nz, self.delta_z_mm
            ));
        }
        if !(0.0..=MAX_TIMEPOINT_INTERVAL_S).contains(&self.delta_t_s) {
            return invalid(format!(
                "delta_t_s must be in [0, {}], got {}",
                MAX_TIMEPOINT_INTERVAL_S, self.delta_t_s
            ));
        }
        if self.nz.checked_mul(self.channels.len()).is_none() {
            return invalid(format!(
                "{} z-levels of {} channels is too many images per FOV",
                self.nz,
                self.channels.len()
            ));
        }

        if let Some(range) = self.z_range {
            if !(range.min_mm.is_finite() && range.max_mm.is_finite()) {
                return invalid("z_range bounds must be finite".into());
            }
            if range.min_mm > range.max_mm {
                return invalid(format!(
                    "z_range min {} is above max {}",
                    range.min_mm, range.max_mm
                ));
            }
        }

        if self.channels.is_empty() && !self.positions_only {
            return invalid("at least one channel must be selected".into());
        }

        if self.generate_downsampled_views
            && !(self.display_resolution_scaling > 0.0 && self.display_resolution_scaling <= 1.0)
        {
            return invalid(format!(
                "display_resolution_scaling must be in (0, 1], got {}",
                self.display_resolution_scaling
            ));
        }

        Ok(())
    }

    /// Captures per FOV per timepoint.
    pub fn images_per_fov(&self) -> usize {
        if self.positions_only {
            return 0;
        }
        self.nz.saturating_mul(self.channels.len())
    }

    /// Captures of a whole run over `total_fovs` positions, or `None` if the
    /// count does not fit in a `u64`.
    pub fn image_count(&self, total_fovs: usize) -> Option<u64> {
        if self.positions_only {
            return Some(0);
        }
        [self.nz, self.channels.len(), total_fovs]
            .into_iter()
            .try_fold(self.nt as u64, |acc, n| acc.checked_mul(n as u64))
    }
}

/// Experiment id unique to the second: spaces become `_`, then a local
/// timestamp with microseconds is appended.
pub fn unique_experiment_id(name: &str) -> String {
    format!(
        "{}_{}",
        name.replace(' ', "_"),
        Local::now().format("%Y-%m-%d_%H-%M-%S%.6f")
    )
}

/// Builder for [`AcquisitionParameters`].
#[derive(Debug, Clone)]
pub struct AcquisitionParametersBuilder {
    params: AcquisitionParameters,
}

impl AcquisitionParametersBuilder {
    fn new(experiment_id: String, base_path: PathBuf) -> Self {
        Self {
            params: AcquisitionParameters {
                experiment_id,
                base_path,
                channels: Vec::new(),
                nx: 1,
                delta_x_mm: 0.0,
                ny: 1,
                delta_y_mm: 0.0,
                nz: 1,
                delta_z_mm: 0.0,
                z_stacking: ZStacking::FromBottom,
                z_range: None,
                nt: 1,
                delta_t_s: 0.0,
                do_autofocus: false,
                do_reflection_autofocus: false,
                use_piezo: false,
                use_fluidics: false,
                skip_saving: false,
                positions_only: false,
                generate_downsampled_views: false,
                display_resolution_scaling: 1.0,
                acquisition_start_time: Utc::now(),
            },
        }
    }

    /// Append one channel.
    pub fn channel(mut self, channel: ChannelMode) -> Self {
        self.params.channels.push(channel);
        self
    }

    /// Replace the channel list.
    pub fn channels(mut self, channels: impl IntoIterator<Item = ChannelMode>) -> Self {
        self.params.channels = channels.into_iter().collect();
        self
    }

    /// Grid description stored in the manifest.
    pub fn grid(mut self, nx: usize, delta_x_mm: f64, ny: usize, delta_y_mm: f64) -> Self {
        self.params.nx = nx;
        self.params.delta_x_mm = delta_x_mm;
        self.params.ny = ny;
        self.params.delta_y_mm = delta_y_mm;
        self
    }

    /// Z-stack of `nz` levels spaced `delta_z_mm`.
    pub fn z_stack(mut self, nz: usize, delta_z_mm: f64, stacking: ZStacking) -> Self {
        self.params.nz = nz;
        self.params.delta_z_mm = delta_z_mm;
        self.params.z_stacking = stacking;
        self
    }

    /// Explicit stack bounds in mm.
    pub fn z_range(mut self, min_mm: f64, max_mm: f64) -> Self {
        self.params.z_range = Some(ZRange { min_mm, max_mm });
        self
    }

    /// `nt` timepoints started every `delta_t_s` seconds.
    pub fn timepoints(mut self, nt: usize, delta_t_s: f64) -> Self {
        self.params.nt = nt;
        self.params.delta_t_s = delta_t_s;
        self
    }

    /// Contrast autofocus.
    pub fn autofocus(mut self, enabled: bool) -> Self {
        self.params.do_autofocus = enabled;
        self
    }

    /// Reflection autofocus.
    pub fn reflection_autofocus(mut self, enabled: bool) -> Self {
        self.params.do_reflection_autofocus = enabled;
        self
    }

    /// Step z with the piezo.
    pub fn use_piezo(mut self, enabled: bool) -> Self {
        self.params.use_piezo = enabled;
        self
    }

    /// Fluidics hooks per timepoint.
    pub fn use_fluidics(mut self, enabled: bool) -> Self {
        self.params.use_fluidics = enabled;
        self
    }

    /// Do not persist frames or metadata.
    pub fn skip_saving(mut self, skip: bool) -> Self {
        self.params.skip_saving = skip;
        self
    }

    /// Visit positions without imaging.
    pub fn positions_only(mut self, enabled: bool) -> Self {
        self.params.positions_only = enabled;
        self
    }

    /// Attach previews downsampled by `scaling`.
    pub fn downsampled_views(mut self, scaling: f64) -> Self {
        self.params.generate_downsampled_views = true;
        self.params.display_resolution_scaling = scaling;
        self
    }

    /// Finish. Validation happens when the run starts.
    pub fn build(self) -> AcquisitionParameters {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AcquisitionParametersBuilder {
        AcquisitionParameters::builder("exp", "/tmp/scope")
            .channel(ChannelMode::brightfield(1, "BF LED matrix full", 5.0))
    }

    #[test]
    fn test_defaults_validate() {
        let params = base().build();
        assert!(params.validate().is_ok());
        assert_eq!(params.images_per_fov(), 1);
        assert_eq!(params.experiment_dir(), PathBuf::from("/tmp/scope/exp"));
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let cases = [
            base().z_stack(3, 0.0, ZStacking::FromBottom).build(),
            base().timepoints(0, 1.0).build(),
            base().timepoints(2, -1.0).build(),
            base().timepoints(2, 1e20).build(),
            base().timepoints(2, MAX_TIMEPOINT_INTERVAL_S + 1.0).build(),
            base().z_stack(2, f64::NAN, ZStacking::FromTop).build(),
            base().z_range(2.0, 1.0).build(),
            base().channels([]).build(),
            base().downsampled_views(0.0).build(),
            AcquisitionParameters::builder("a/b", "/tmp")
                .channel(ChannelMode::brightfield(1, "BF", 1.0))
                .build(),
        ];
        for params in cases {
            assert!(
                matches!(params.validate(), Err(AcquisitionError::InvalidParameters(_))),
                "{:?} should be rejected",
                params
            );
        }
    }

    #[test]
    fn test_image_count() {
        let params = base()
            .z_stack(3, 0.001, ZStacking::FromBottom)
            .timepoints(4, 1.0)
            .build();
        assert_eq!(params.image_count(5), Some(60));
        assert_eq!(params.image_count(0), Some(0));

        let huge = base().timepoints(usize::MAX, 0.0).build();
        assert_eq!(huge.image_count(usize::MAX), None);

        let params = base().timepoints(2, MAX_TIMEPOINT_INTERVAL_S).build();
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_positions_only_allows_no_channels() {
        let params = AcquisitionParameters::builder("exp", "/tmp")
            .positions_only(true)
            .build();
        assert!(params.validate().is_ok());
        assert_eq!(params.images_per_fov(), 0);
    }

    #[test]
    fn test_skip_saving_allows_empty_base_path() {
        let params = AcquisitionParameters::builder("exp", "")
            .channel(ChannelMode::brightfield(1, "BF", 1.0))
            .skip_saving(true)
            .build();
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_unique_experiment_id() {
        let id = unique_experiment_id("my plate 3");
        assert!(id.starts_with("my_plate_3_"));
        assert!(!id.contains(' '));
        // YYYY-MM-DD_HH-MM-SS.ffffff
        let stamp = &id["my_plate_3_".len()..];
        assert_eq!(stamp.len(), 26);
        assert_eq!(&stamp[19..20], ".");
    }

    #[test]
    fn test_manifest_serialization() {
        let params = base().z_stack(3, 0.001, ZStacking::FromCenter).build();
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["nz"], 3);
        assert_eq!(json["z_stacking"], "from_center");
        assert_eq!(json["channels"][0]["name"], "BF LED matrix full");
    }
}
