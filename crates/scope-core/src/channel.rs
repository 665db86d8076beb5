//! Channel modes: named illumination + exposure configurations.

use serde::{Deserialize, Serialize};

/// Illumination source driving a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IlluminationSource {
    /// Transmitted-light LED matrix (brightfield, DPC, darkfield).
    LedMatrix,
    /// Fluorescence excitation laser or LED at a wavelength in nm.
    Fluorescence {
        /// Excitation wavelength in nanometres.
        wavelength_nm: u32,
    },
    /// Any other source, identified by its controller channel number.
    Other {
        /// Controller channel number.
        channel: u32,
    },
}

/// A named illumination/exposure configuration (e.g. "Fluorescence 488 nm Ex").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMode {
    /// Stable identifier from the channel configuration store.
    pub id: u32,
    /// Display name, also used in file names.
    pub name: String,
    /// Camera exposure time in milliseconds.
    pub exposure_time_ms: f64,
    /// Camera analog gain.
    #[serde(default)]
    pub analog_gain: f64,
    /// Illumination source.
    pub illumination_source: IlluminationSource,
    /// Illumination intensity in percent.
    #[serde(default = "default_intensity")]
    pub illumination_intensity: f64,
    /// Per-channel focus offset in micrometres (applied for single-plane acquisitions).
    #[serde(default)]
    pub z_offset_um: Option<f64>,
    /// Optional display color as 0xRRGGBB.
    #[serde(default)]
    pub display_color: Option<u32>,
}

fn default_intensity() -> f64 {
    50.0
}

impl ChannelMode {
    /// Create a channel with default gain/intensity and no offset.
    pub fn new(
        id: u32,
        name: impl Into<String>,
        exposure_time_ms: f64,
        illumination_source: IlluminationSource,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            exposure_time_ms,
            analog_gain: 0.0,
            illumination_source,
            illumination_intensity: default_intensity(),
            z_offset_um: None,
            display_color: None,
        }
    }

    /// Brightfield channel on the LED matrix.
    pub fn brightfield(id: u32, name: impl Into<String>, exposure_time_ms: f64) -> Self {
        Self::new(id, name, exposure_time_ms, IlluminationSource::LedMatrix)
    }

    /// Fluorescence channel at the given excitation wavelength.
    pub fn fluorescence(
        id: u32,
        name: impl Into<String>,
        wavelength_nm: u32,
        exposure_time_ms: f64,
    ) -> Self {
        Self::new(
            id,
            name,
            exposure_time_ms,
            IlluminationSource::Fluorescence { wavelength_nm },
        )
    }

    /// Set the focus offset.
    pub fn with_z_offset_um(mut self, offset_um: f64) -> Self {
        self.z_offset_um = Some(offset_um);
        self
    }

    /// Set the display color.
    pub fn with_display_color(mut self, rgb: u32) -> Self {
        self.display_color = Some(rgb);
        self
    }

    /// Name with spaces replaced by underscores, for file names.
    pub fn file_label(&self) -> String {
        self.name.replace(' ', "_")
    }

    /// Excitation wavelength for fluorescence channels.
    pub fn wavelength_nm(&self) -> Option<u32> {
        match self.illumination_source {
            IlluminationSource::Fluorescence { wavelength_nm } => Some(wavelength_nm),
            _ => None,
        }
    }

    /// True for channels lit by the brightfield LED matrix.
    pub fn is_brightfield(&self) -> bool {
        matches!(self.illumination_source, IlluminationSource::LedMatrix)
    }
}
