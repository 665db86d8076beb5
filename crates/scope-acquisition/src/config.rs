//! Configuration System using Figment
//!
//! Strongly-typed settings for the acquisition controller, loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `SCOPE_`, nested keys separated by
//!    a double underscore (`SCOPE_PIPELINE__QUEUE_CAPACITY=16`)
//!
//! Every field has a default, so an empty file is a valid configuration.
//!
//! # Example
//! ```no_run
//! use scope_acquisition::config::ScopeConfig;
//!
//! let config = ScopeConfig::load_from("config/scope.toml")?;
//! println!("Workers: {}", config.pipeline.workers);
//! # Ok::<(), figment::Error>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use scope_storage::{ColorReduction, ImageFormat, PostProcessing, SaveOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SCOPE_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Persistence pool settings
    pub pipeline: PipelineConfig,
    /// Scan loop tunables
    pub acquisition: AcquisitionConfig,
    /// Output format settings
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rust-scope".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Job queue and writer pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bounded queue capacity; the scan blocks when it is full
    pub queue_capacity: usize,
    /// Writer pool size
    pub workers: usize,
    /// How long the pool may keep writing after the scan ends
    pub drain_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: scope_storage::DEFAULT_QUEUE_CAPACITY,
            workers: scope_storage::DEFAULT_WORKERS,
            drain_timeout_ms: 30_000,
        }
    }
}

impl PipelineConfig {
    /// Drain timeout as a Duration.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// What to do when autofocus does not lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutofocusPolicy {
    /// Record the miss and image at the current focus.
    #[default]
    Continue,
    /// Record the miss and skip the rest of the region.
    SkipRegion,
}

/// Scan loop tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Extra trigger/read attempts per frame
    pub camera_retries: u32,
    /// `read_frame` timeout
    pub frame_timeout_ms: u64,
    /// Autofocus miss handling
    pub autofocus_policy: AutofocusPolicy,
    /// Contrast autofocus runs on every k-th FOV
    pub fovs_per_autofocus: usize,
    /// Settle time after an X move
    pub stabilization_x_ms: u64,
    /// Settle time after a Y move
    pub stabilization_y_ms: u64,
    /// Settle time after a Z move
    pub stabilization_z_ms: u64,
    /// Settle time after a piezo move
    pub piezo_delay_ms: u64,
    /// Abort at the next FOV once any save job has failed
    pub abort_on_failed_jobs: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            camera_retries: 2,
            frame_timeout_ms: 5_000,
            autofocus_policy: AutofocusPolicy::Continue,
            fovs_per_autofocus: 3,
            stabilization_x_ms: 25,
            stabilization_y_ms: 25,
            stabilization_z_ms: 20,
            piezo_delay_ms: 20,
            abort_on_failed_jobs: false,
        }
    }
}

impl AcquisitionConfig {
    /// `read_frame` timeout as a Duration.
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// Settle time after an XY move (the longer of the two axes).
    pub fn xy_settle(&self) -> Duration {
        Duration::from_millis(self.stabilization_x_ms.max(self.stabilization_y_ms))
    }

    /// Settle time after a Z move.
    pub fn z_settle(&self) -> Duration {
        Duration::from_millis(self.stabilization_z_ms)
    }

    /// Settle time after a piezo move.
    pub fn piezo_settle(&self) -> Duration {
        Duration::from_millis(self.piezo_delay_ms)
    }
}

/// Output format settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Default output root when the caller gives none
    pub output_dir: PathBuf,
    /// Format for 8-bit frames; 16-bit frames are always TIFF
    pub image_format: ImageFormat,
    /// Tint fluorescence frames with their excitation color
    pub pseudo_color: bool,
    /// Reduction for RGB brightfield frames
    pub color_reduction: ColorReduction,
    /// Zero padding of indices in file names
    pub file_id_padding: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            image_format: ImageFormat::Tiff,
            pseudo_color: false,
            color_reduction: ColorReduction::KeepRgb,
            file_id_padding: scope_storage::DEFAULT_FILE_ID_PADDING,
        }
    }
}

impl StorageConfig {
    /// Save options for one experiment directory.
    pub fn save_options(&self, experiment_dir: impl Into<PathBuf>) -> SaveOptions {
        SaveOptions {
            experiment_dir: experiment_dir.into(),
            image_format: self.image_format,
            file_id_padding: self.file_id_padding,
            post_processing: PostProcessing {
                color_reduction: self.color_reduction,
                pseudo_color: self.pseudo_color,
            },
        }
    }
}

impl ScopeConfig {
    /// Defaults, then the TOML file at `path`, then `SCOPE_` environment
    /// variables. Callers that extend the file with their own sections can
    /// extract from this figment directly.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(ScopeConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and extract.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.pipeline.queue_capacity == 0 {
            return Err("pipeline.queue_capacity must be at least 1".to_string());
        }
        if self.pipeline.workers == 0 {
            return Err("pipeline.workers must be at least 1".to_string());
        }

        if self.acquisition.fovs_per_autofocus == 0 {
            return Err("acquisition.fovs_per_autofocus must be at least 1".to_string());
        }
        if self.acquisition.frame_timeout_ms == 0 {
            return Err("acquisition.frame_timeout_ms must be positive".to_string());
        }

        if !(1..=9).contains(&self.storage.file_id_padding) {
            return Err(format!(
                "Invalid file_id_padding {}. Must be 1-9",
                self.storage.file_id_padding
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScopeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.queue_capacity, 64);
        assert_eq!(config.storage.file_id_padding, 3);
        assert_eq!(config.acquisition.autofocus_policy, AutofocusPolicy::Continue);
    }

    #[test]
    fn test_load_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "scope.toml",
                r#"
                [application]
                log_level = "debug"

                [pipeline]
                workers = 4

                [acquisition]
                autofocus_policy = "skip_region"

                [storage]
                image_format = "png"
                color_reduction = "rgb2_gray"
                "#,
            )?;
            jail.set_env("SCOPE_PIPELINE__QUEUE_CAPACITY", "8");

            let config = ScopeConfig::load_from("scope.toml")?;
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.pipeline.workers, 4);
            assert_eq!(config.pipeline.queue_capacity, 8);
            assert_eq!(config.pipeline.drain_timeout_ms, 30_000);
            assert_eq!(
                config.acquisition.autofocus_policy,
                AutofocusPolicy::SkipRegion
            );
            assert_eq!(config.storage.image_format, ImageFormat::Png);
            assert_eq!(config.storage.color_reduction, ColorReduction::Rgb2Gray);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_| {
            let config = ScopeConfig::load_from("does-not-exist.toml")?;
            assert_eq!(config, ScopeConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_validation_errors() {
        let mut config = ScopeConfig::default();
        config.application.log_level = "verbose".into();
        assert!(config.validate().unwrap_err().contains("log_level"));

        let mut config = ScopeConfig::default();
        config.pipeline.workers = 0;
        assert!(config.validate().is_err());

        let mut config = ScopeConfig::default();
        config.storage.file_id_padding = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_options_from_storage() {
        let storage = StorageConfig {
            pseudo_color: true,
            ..StorageConfig::default()
        };
        let options = storage.save_options("/data/exp");
        assert_eq!(options.experiment_dir, PathBuf::from("/data/exp"));
        assert!(options.post_processing.pseudo_color);
    }
}
