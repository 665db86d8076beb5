//! RGB composites of the LED-matrix brightfield sub-channels.
//!
//! LED-matrix illuminators image color brightfield as three monochrome
//! exposures (`BF LED matrix full_R`, `_G`, `_B`). When all three are captured
//! at one z-level, an [`RgbCompositeJob`] interleaves them into one RGB image
//! saved next to the single-channel files as
//! `{region}_{fov}_{z}_BF_LED_matrix_full_RGB.{ext}`.

use crate::image_writer::ImageWriter;
use crate::job::{ImageName, Job, JobContext, JobError, JobImage, JobOutput, SaveOptions};
use scope_core::data::{Frame, PixelFormat};
use scope_core::error::{ScopeError, ScopeResult};
use std::path::PathBuf;
use uuid::Uuid;

/// Channel names of the red, green and blue planes, in that order.
pub const RGB_SOURCE_CHANNELS: [&str; 3] = [
    "BF LED matrix full_R",
    "BF LED matrix full_G",
    "BF LED matrix full_B",
];

/// File label of the composite image.
pub const RGB_COMPOSITE_LABEL: &str = "BF_LED_matrix_full_RGB";

/// Plane index (0 = R, 1 = G, 2 = B) of a channel name, if it is one of the
/// composite sources.
pub fn rgb_plane_of(channel_name: &str) -> Option<usize> {
    RGB_SOURCE_CHANNELS
        .iter()
        .position(|name| *name == channel_name)
}

/// Interleave three mono planes of equal geometry into one RGB frame.
pub fn merge_rgb(red: &Frame, green: &Frame, blue: &Frame) -> ScopeResult<Frame> {
    let planes = [red, green, blue];
    for plane in planes {
        plane.validate()?;
        if plane.is_color() {
            return Err(ScopeError::Processing(format!(
                "RGB composite needs mono planes, got {:?}",
                plane.pixel_format
            )));
        }
        if (plane.width, plane.height, plane.pixel_format)
            != (red.width, red.height, red.pixel_format)
        {
            return Err(ScopeError::Processing(format!(
                "RGB planes differ: {}x{} {:?} vs {}x{} {:?}",
                red.width,
                red.height,
                red.pixel_format,
                plane.width,
                plane.height,
                plane.pixel_format
            )));
        }
    }

    let sample = red.pixel_format.bytes_per_sample();
    let format = match red.pixel_format {
        PixelFormat::Mono16 => PixelFormat::Rgb48,
        _ => PixelFormat::Rgb24,
    };
    let mut data = Vec::with_capacity(red.data.len() * 3);
    for ((r, g), b) in red
        .data
        .chunks_exact(sample)
        .zip(green.data.chunks_exact(sample))
        .zip(blue.data.chunks_exact(sample))
    {
        data.extend_from_slice(r);
        data.extend_from_slice(g);
        data.extend_from_slice(b);
    }
    Ok(Frame::from_bytes(red.width, red.height, format, data))
}

/// Merge and write the RGB composite of one z-level.
#[derive(Debug, Clone)]
pub struct RgbCompositeJob {
    id: Uuid,
    capture_index: u64,
    planes: [JobImage; 3],
    name: ImageName,
    options: SaveOptions,
}

impl RgbCompositeJob {
    /// `planes` are red, green, blue. The channel label of `name` is replaced
    /// with [`RGB_COMPOSITE_LABEL`].
    pub fn new(
        capture_index: u64,
        planes: [JobImage; 3],
        mut name: ImageName,
        options: SaveOptions,
    ) -> Self {
        name.channel_label = RGB_COMPOSITE_LABEL.to_string();
        Self {
            id: Uuid::new_v4(),
            capture_index,
            planes,
            name,
            options,
        }
    }

    /// Path the composite will be written to.
    pub fn target_path(&self, composite: &Frame) -> PathBuf {
        self.name.path(
            &self.options.experiment_dir,
            self.options.file_id_padding,
            self.options.image_format.resolve_for(composite),
        )
    }
}

impl Job for RgbCompositeJob {
    fn id(&self) -> Uuid {
        self.id
    }

    fn capture_index(&self) -> u64 {
        self.capture_index
    }

    fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
        let [red, green, blue] = &self.planes;
        let composite = merge_rgb(red.frame(), green.frame(), blue.frame())
            .map_err(|e| JobError::Failed(e.to_string()))?;

        let format = self.options.image_format.resolve_for(&composite);
        let path = self.target_path(&composite);
        if ctx.is_cancelled() {
            return Err(JobError::Abandoned);
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| JobError::Failed(format!("create {:?}: {}", dir, e)))?;
        }
        ImageWriter::write_frame(&composite, format, &path)
            .map_err(|e| JobError::Failed(format!("{:#}", e)))?;
        tracing::debug!(path = ?path, "Wrote RGB composite");

        Ok(JobOutput { path })
    }
}
