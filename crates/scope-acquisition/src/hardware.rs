//! Device bundle driven by one run.

use crate::error::{AcquisitionError, AcquisitionResult};
use crate::parameters::AcquisitionParameters;
use scope_core::capabilities::{AutoFocus, Camera, ChannelConfigurator, Fluidics, Piezo, Stage};
use std::sync::Arc;

/// The devices an acquisition needs. Optional devices are only required when
/// the parameters ask for them.
#[derive(Clone)]
pub struct Microscope {
    /// XYZ stage
    pub stage: Arc<dyn Stage>,
    /// Camera
    pub camera: Arc<dyn Camera>,
    /// Illumination and exposure switching
    pub channels: Arc<dyn ChannelConfigurator>,
    /// Fast z actuator
    pub piezo: Option<Arc<dyn Piezo>>,
    /// Image-based autofocus
    pub contrast_autofocus: Option<Arc<dyn AutoFocus>>,
    /// Reflection (laser) autofocus
    pub laser_autofocus: Option<Arc<dyn AutoFocus>>,
    /// Liquid handling
    pub fluidics: Option<Arc<dyn Fluidics>>,
}

impl Microscope {
    /// Bundle with the required devices only.
    pub fn new(
        stage: Arc<dyn Stage>,
        camera: Arc<dyn Camera>,
        channels: Arc<dyn ChannelConfigurator>,
    ) -> Self {
        Self {
            stage,
            camera,
            channels,
            piezo: None,
            contrast_autofocus: None,
            laser_autofocus: None,
            fluidics: None,
        }
    }

    /// Add a piezo.
    pub fn with_piezo(mut self, piezo: Arc<dyn Piezo>) -> Self {
        self.piezo = Some(piezo);
        self
    }

    /// Add contrast autofocus.
    pub fn with_contrast_autofocus(mut self, af: Arc<dyn AutoFocus>) -> Self {
        self.contrast_autofocus = Some(af);
        self
    }

    /// Add laser autofocus.
    pub fn with_laser_autofocus(mut self, af: Arc<dyn AutoFocus>) -> Self {
        self.laser_autofocus = Some(af);
        self
    }

    /// Add fluidics.
    pub fn with_fluidics(mut self, fluidics: Arc<dyn Fluidics>) -> Self {
        self.fluidics = Some(fluidics);
        self
    }

    /// Fail with `InvalidParameters` if `params` needs a device this bundle lacks.
    pub fn check_supports(&self, params: &AcquisitionParameters) -> AcquisitionResult<()> {
        let missing = |what: &str| {
            Err(AcquisitionError::InvalidParameters(format!(
                "{} requested but no {} is configured",
                what, what
            )))
        };
        if params.use_piezo && self.piezo.is_none() {
            return missing("piezo");
        }
        if params.do_reflection_autofocus && self.laser_autofocus.is_none() {
            return missing("laser autofocus");
        }
        if params.do_autofocus && !params.do_reflection_autofocus && self.contrast_autofocus.is_none()
        {
            return missing("contrast autofocus");
        }
        if params.use_fluidics && self.fluidics.is_none() {
            return missing("fluidics");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Microscope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Microscope")
            .field("piezo", &self.piezo.is_some())
            .field("contrast_autofocus", &self.contrast_autofocus.is_some())
            .field("laser_autofocus", &self.laser_autofocus.is_some())
            .field("fluidics", &self.fluidics.is_some())
            .finish_non_exhaustive()
    }
}
