//! Image file export for captured frames.
//!
//! 16-bit data is always written as TIFF, the only format here that keeps the
//! full bit depth for both mono and RGB. 8-bit data goes to the configured
//! format.
//!
//! ```rust,ignore
//! use scope_storage::image_writer::{ImageFormat, ImageWriter};
//!
//! let format = ImageFormat::Png.resolve_for(&frame);
//! ImageWriter::write_frame(&frame, format, "A1_000_000_BF.png")?;
//! ```

use anyhow::{anyhow, Context, Result};
use image::ExtendedColorType;
use scope_core::data::{Frame, PixelFormat};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// On-disk image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Tagged Image File Format
    #[default]
    Tiff,
    /// Portable Network Graphics
    Png,
    /// Windows bitmap
    Bmp,
    /// JPEG (lossy)
    Jpeg,
}

impl ImageFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Tiff => "tiff",
            ImageFormat::Png => "png",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    /// Format actually used for `frame`: TIFF for 16-bit data, `self` otherwise.
    pub fn resolve_for(self, frame: &Frame) -> ImageFormat {
        if frame.pixel_format.is_16bit() {
            ImageFormat::Tiff
        } else {
            self
        }
    }

    fn codec(self) -> image::ImageFormat {
        match self {
            ImageFormat::Tiff => image::ImageFormat::Tiff,
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tif" | "tiff" => Ok(ImageFormat::Tiff),
            "png" => Ok(ImageFormat::Png),
            "bmp" => Ok(ImageFormat::Bmp),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            other => Err(format!("unsupported image format '{}'", other)),
        }
    }
}

fn color_type(format: PixelFormat) -> ExtendedColorType {
    match format {
        PixelFormat::Mono8 => ExtendedColorType::L8,
        PixelFormat::Mono16 => ExtendedColorType::L16,
        PixelFormat::Rgb24 => ExtendedColorType::Rgb8,
        PixelFormat::Rgb48 => ExtendedColorType::Rgb16,
    }
}

/// Frame export.
pub struct ImageWriter;

impl ImageWriter {
    /// Write a single frame to `path` in `format`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Frame dimensions don't match data size
    /// - A 16-bit frame is paired with a non-TIFF format
    /// - File cannot be created
    /// - Encoding fails
    pub fn write_frame<P: AsRef<Path>>(frame: &Frame, format: ImageFormat, path: P) -> Result<()> {
        let path = path.as_ref();
        frame
            .validate()
            .with_context(|| format!("Refusing to write {:?}", path))?;

        if frame.pixel_format.is_16bit() {
            if format != ImageFormat::Tiff {
                return Err(anyhow!(
                    "16-bit frames must be written as TIFF, not {:?}",
                    format
                ));
            }
            return Self::write_16bit_tiff(frame, path);
        }

        match format {
            ImageFormat::Tiff => Self::write_8bit_tiff(frame, path),
            other => {
                image::save_buffer_with_format(
                    path,
                    &frame.data,
                    frame.width,
                    frame.height,
                    color_type(frame.pixel_format),
                    other.codec(),
                )
                .with_context(|| format!("Failed to encode {:?} to {:?}", other, path))?;
                tracing::debug!(path = ?path, format = ?other, "Wrote 8-bit image");
                Ok(())
            }
        }
    }

    fn write_8bit_tiff(frame: &Frame, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        let writer = BufWriter::new(file);

        image::codecs::tiff::TiffEncoder::new(writer)
            .encode(
                &frame.data,
                frame.width,
                frame.height,
                color_type(frame.pixel_format),
            )
            .with_context(|| format!("Failed to encode TIFF to {:?}", path))?;

        tracing::debug!(
            path = ?path,
            dimensions = format!("{}x{}", frame.width, frame.height),
            bit_depth = 8,
            "Wrote 8-bit TIFF"
        );
        Ok(())
    }

    fn write_16bit_tiff(frame: &Frame, path: &Path) -> Result<()> {
        // The encoder expects native-endian sample bytes; frames store LE.
        let bytes: Vec<u8> = frame
            .samples_u16()
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();

        let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        let writer = BufWriter::new(file);

        image::codecs::tiff::TiffEncoder::new(writer)
            .encode(
                &bytes,
                frame.width,
                frame.height,
                color_type(frame.pixel_format),
            )
            .with_context(|| format!("Failed to encode 16-bit TIFF to {:?}", path))?;

        tracing::debug!(
            path = ?path,
            dimensions = format!("{}x{}", frame.width, frame.height),
            bit_depth = 16,
            "Wrote 16-bit TIFF"
        );
        Ok(())
    }
}
