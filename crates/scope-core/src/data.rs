use crate::error::{ScopeError, ScopeResult};
use serde::{Deserialize, Serialize};

/// Pixel layout of a [`Frame`].
///
/// Multi-byte samples are stored Little Endian. Color formats are interleaved
/// RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit grayscale, 1 byte per pixel.
    Mono8,
    /// 12/16-bit grayscale, 2 bytes per pixel.
    Mono16,
    /// 8-bit RGB, 3 bytes per pixel.
    Rgb24,
    /// 16-bit RGB, 6 bytes per pixel.
    Rgb48,
}

impl PixelFormat {
    /// Samples per pixel (1 for mono, 3 for RGB).
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::Mono16 => 1,
            PixelFormat::Rgb24 | PixelFormat::Rgb48 => 3,
        }
    }

    /// Bytes per sample.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::Rgb24 => 1,
            PixelFormat::Mono16 | PixelFormat::Rgb48 => 2,
        }
    }

    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        self.channels() * self.bytes_per_sample()
    }

    /// True for RGB formats.
    pub fn is_color(self) -> bool {
        self.channels() == 3
    }

    /// True for 16-bit sample formats.
    pub fn is_16bit(self) -> bool {
        self.bytes_per_sample() == 2
    }
}

/// Represents a single image frame.
///
/// # Storage
/// Data is stored as a raw byte vector (`Vec<u8>`).
/// - 8-bit images: 1 byte per sample.
/// - 12/16-bit images: 2 bytes per sample, Little Endian.
///
/// Use [`Frame::samples_u16`] to read 16-bit data.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Pixel layout
    pub pixel_format: PixelFormat,

    /// Raw pixel data
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a new grayscale frame from 16-bit pixel data.
    ///
    /// Copies the data into a byte vector.
    pub fn from_u16(width: u32, height: u32, pixels: &[u16]) -> Self {
        Self {
            width,
            height,
            pixel_format: PixelFormat::Mono16,
            data: u16_to_le_bytes(pixels),
        }
    }

    /// Create a new grayscale frame from 8-bit pixel data.
    pub fn from_u8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixel_format: PixelFormat::Mono8,
            data,
        }
    }

    /// Create an interleaved RGB frame from 16-bit samples.
    pub fn from_rgb16(width: u32, height: u32, samples: &[u16]) -> Self {
        Self {
            width,
            height,
            pixel_format: PixelFormat::Rgb48,
            data: u16_to_le_bytes(samples),
        }
    }

    /// Create a frame from raw byte data with an explicit pixel format.
    ///
    /// Call [`Frame::validate`] before trusting the geometry.
    pub fn from_bytes(width: u32, height: u32, pixel_format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixel_format,
            data,
        }
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes implied by width, height and pixel format.
    pub fn expected_len(&self) -> ScopeResult<usize> {
        self.pixel_count()
            .checked_mul(self.pixel_format.bytes_per_pixel())
            .ok_or(ScopeError::SizeOverflow {
                context: "frame byte length",
            })
    }

    /// Check the buffer length against the declared geometry.
    pub fn validate(&self) -> ScopeResult<()> {
        let expected = self.expected_len()?;
        if self.data.len() != expected {
            return Err(ScopeError::FrameSizeMismatch {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// True for RGB frames.
    pub fn is_color(&self) -> bool {
        self.pixel_format.is_color()
    }

    /// Decode all samples as u16 (8-bit samples are widened).
    pub fn samples_u16(&self) -> Vec<u16> {
        if self.pixel_format.is_16bit() {
            self.data
                .chunks_exact(2)
                .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
                .collect()
        } else {
            self.data.iter().map(|&v| v as u16).collect()
        }
    }

    /// Get the first sample of pixel (x, y) as u32.
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let idx = (y as usize * self.width as usize + x as usize)
            * self.pixel_format.bytes_per_pixel();

        if self.pixel_format.is_16bit() {
            let bytes = [*self.data.get(idx)?, *self.data.get(idx + 1)?];
            Some(u16::from_le_bytes(bytes) as u32)
        } else {
            self.data.get(idx).map(|&v| v as u32)
        }
    }

    /// Calculate mean sample value.
    pub fn mean(&self) -> f64 {
        let samples = self.samples_u16();
        if samples.is_empty() {
            return 0.0;
        }
        let sum: u64 = samples.iter().map(|&v| v as u64).sum();
        sum as f64 / samples.len() as f64
    }

    /// Nearest-neighbour downsample by `scale` (0 < scale <= 1).
    ///
    /// Used for display previews; a scale of 1.0 (or anything out of range)
    /// returns a plain copy.
    pub fn downsample(&self, scale: f64) -> Frame {
        if !(scale > 0.0 && scale < 1.0) {
            return self.clone();
        }
        let out_w = ((self.width as f64 * scale).round() as u32).max(1);
        let out_h = ((self.height as f64 * scale).round() as u32).max(1);
        let bpp = self.pixel_format.bytes_per_pixel();
        let mut data = Vec::with_capacity(out_w as usize * out_h as usize * bpp);

        for oy in 0..out_h {
            let sy = ((oy as u64 * self.height as u64) / out_h as u64) as usize;
            for ox in 0..out_w {
                let sx = ((ox as u64 * self.width as u64) / out_w as u64) as usize;
                let start = (sy * self.width as usize + sx) * bpp;
                match self.data.get(start..start + bpp) {
                    Some(px) => data.extend_from_slice(px),
                    None => data.extend(std::iter::repeat(0u8).take(bpp)),
                }
            }
        }

        Frame {
            width: out_w,
            height: out_h,
            pixel_format: self.pixel_format,
            data,
        }
    }
}

fn u16_to_le_bytes(samples: &[u16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_frame_roundtrip_and_get() {
        let frame = Frame::from_u16(2, 2, &[0, 1000, 2000, 65535]);
        assert_eq!(frame.data.len(), 8);
        assert!(frame.validate().is_ok());
        assert_eq!(frame.get(1, 0), Some(1000));
        assert_eq!(frame.get(1, 1), Some(65535));
        assert_eq!(frame.get(2, 0), None);
    }

    #[test]
    fn test_validate_rejects_short_buffer() {
        let frame = Frame::from_bytes(4, 4, PixelFormat::Mono16, vec![0; 10]);
        match frame.validate() {
            Err(ScopeError::FrameSizeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_mean() {
        let frame = Frame::from_u8(2, 2, vec![0, 10, 20, 30]);
        assert!((frame.mean() - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_downsample_halves_dimensions() {
        let pixels: Vec<u16> = (0..16).collect();
        let frame = Frame::from_u16(4, 4, &pixels);
        let small = frame.downsample(0.5);
        assert_eq!((small.width, small.height), (2, 2));
        assert!(small.validate().is_ok());
        assert_eq!(small.get(0, 0), Some(0));
        assert_eq!(small.get(1, 1), Some(10));
    }

    #[test]
    fn test_rgb_frame_is_color() {
        let frame = Frame::from_rgb16(1, 1, &[1, 2, 3]);
        assert!(frame.is_color());
        assert_eq!(frame.expected_len().ok(), Some(6));
    }
}
