//! Per-frame post-processing applied before encoding.
//!
//! Two optional steps, in order:
//! 1. Color reduction of RGB brightfield frames to a single channel.
//! 2. Pseudo-coloring of mono frames with the channel's excitation color.

use scope_core::channel::ChannelMode;
use scope_core::data::{Frame, PixelFormat};
use scope_core::error::{ScopeError, ScopeResult};
use serde::{Deserialize, Serialize};

/// How RGB brightfield frames are saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorReduction {
    /// Keep all three channels.
    #[default]
    KeepRgb,
    /// ITU-R BT.601 luma (0.299 R + 0.587 G + 0.114 B).
    Rgb2Gray,
    /// Keep the green channel only.
    GreenChannelOnly,
}

/// Display color (0xRRGGBB) for an excitation wavelength.
pub fn pseudo_color_for_wavelength(wavelength_nm: u32) -> Option<u32> {
    match wavelength_nm {
        405 => Some(0x20ADF8),
        488 => Some(0x1FFF00),
        561 => Some(0xFFCF00),
        638 => Some(0xFF0000),
        730 => Some(0x770000),
        _ => None,
    }
}

/// Excitation wavelength of a channel, from its source or, failing that,
/// from an "NNN nm" token in its name.
pub fn channel_wavelength(channel: &ChannelMode) -> Option<u32> {
    channel.wavelength_nm().or_else(|| {
        let words: Vec<&str> = channel.name.split_whitespace().collect();
        words
            .windows(2)
            .find(|w| w[1] == "nm")
            .and_then(|w| w[0].parse().ok())
    })
}

/// True for channels whose color frames are subject to [`ColorReduction`].
pub fn is_brightfield_channel(channel: &ChannelMode) -> bool {
    channel.is_brightfield() || channel.name.contains("BF LED matrix")
}

/// Reduce an RGB frame to mono. Mono frames are returned unchanged.
pub fn reduce_color(frame: &Frame, policy: ColorReduction) -> ScopeResult<Frame> {
    if !frame.is_color() || policy == ColorReduction::KeepRgb {
        return Ok(frame.clone());
    }
    frame.validate()?;

    let samples = frame.samples_u16();
    let mono: Vec<u16> = samples
        .chunks_exact(3)
        .map(|px| match policy {
            ColorReduction::GreenChannelOnly => px[1],
            _ => {
                let y = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
                y.round().min(u16::MAX as f64) as u16
            }
        })
        .collect();

    Ok(match frame.pixel_format {
        PixelFormat::Rgb48 => Frame::from_u16(frame.width, frame.height, &mono),
        _ => Frame::from_u8(
            frame.width,
            frame.height,
            mono.iter().map(|&v| v.min(255) as u8).collect(),
        ),
    })
}

/// Turn a mono frame into RGB tinted with `rgb` (0xRRGGBB), or plain gray
/// replication when `rgb` is `None`. Color frames are returned unchanged.
pub fn pseudo_color(frame: &Frame, rgb: Option<u32>) -> ScopeResult<Frame> {
    if frame.is_color() {
        return Ok(frame.clone());
    }
    frame.validate()?;

    let ratios = match rgb {
        Some(hex) => [
            ((hex >> 16) & 0xFF) as f64 / 255.0,
            ((hex >> 8) & 0xFF) as f64 / 255.0,
            (hex & 0xFF) as f64 / 255.0,
        ],
        None => [1.0, 1.0, 1.0],
    };

    let samples = frame.samples_u16();
    let mut out = Vec::with_capacity(samples.len() * 3);
    for v in samples {
        for r in ratios {
            out.push((v as f64 * r) as u16);
        }
    }

    match frame.pixel_format {
        PixelFormat::Mono16 => Ok(Frame::from_rgb16(frame.width, frame.height, &out)),
        PixelFormat::Mono8 => Ok(Frame::from_bytes(
            frame.width,
            frame.height,
            PixelFormat::Rgb24,
            out.into_iter().map(|v| v as u8).collect(),
        )),
        other => Err(ScopeError::Processing(format!(
            "cannot pseudo-color {:?} frame",
            other
        ))),
    }
}

/// Post-processing switches for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostProcessing {
    /// Reduction applied to RGB brightfield frames.
    pub color_reduction: ColorReduction,
    /// Tint mono frames with the channel color.
    pub pseudo_color: bool,
}

impl PostProcessing {
    /// Apply both steps for a frame captured in `channel`.
    pub fn apply(&self, frame: &Frame, channel: &ChannelMode) -> ScopeResult<Frame> {
        let reduced = if frame.is_color() && is_brightfield_channel(channel) {
            reduce_color(frame, self.color_reduction)?
        } else {
            frame.clone()
        };

        if self.pseudo_color {
            let color = channel_wavelength(channel).and_then(pseudo_color_for_wavelength);
            pseudo_color(&reduced, color)
        } else {
            Ok(reduced)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wavelength_from_name() {
        let ch = ChannelMode::brightfield(9, "Fluorescence 561 nm Ex", 10.0);
        assert_eq!(channel_wavelength(&ch), Some(561));
        let bf = ChannelMode::brightfield(1, "BF LED matrix full", 10.0);
        assert_eq!(channel_wavelength(&bf), None);
    }

    #[test]
    fn test_green_channel_only() {
        let frame = Frame::from_rgb16(2, 1, &[10, 20, 30, 40, 50, 60]);
        let mono = reduce_color(&frame, ColorReduction::GreenChannelOnly).unwrap();
        assert_eq!(mono.pixel_format, PixelFormat::Mono16);
        assert_eq!(mono.samples_u16(), vec![20, 50]);
    }

    #[test]
    fn test_rgb2gray_luma() {
        let frame = Frame::from_rgb16(1, 1, &[1000, 1000, 1000]);
        let mono = reduce_color(&frame, ColorReduction::Rgb2Gray).unwrap();
        assert_eq!(mono.samples_u16(), vec![1000]);
    }

    #[test]
    fn test_pseudo_color_488() {
        let frame = Frame::from_u16(1, 1, &[1000]);
        let rgb = pseudo_color(&frame, pseudo_color_for_wavelength(488)).unwrap();
        assert_eq!(rgb.pixel_format, PixelFormat::Rgb48);
        // 0x1F = 31, 0xFF = 255, 0x00 = 0
        assert_eq!(rgb.samples_u16(), vec![121, 1000, 0]);
    }

    #[test]
    fn test_pseudo_color_unknown_wavelength_replicates_gray() {
        let frame = Frame::from_u8(2, 1, vec![7, 9]);
        let rgb = pseudo_color(&frame, None).unwrap();
        assert_eq!(rgb.pixel_format, PixelFormat::Rgb24);
        assert_eq!(rgb.data, vec![7, 7, 7, 9, 9, 9]);
    }

    #[test]
    fn test_reduction_only_for_brightfield() {
        let frame = Frame::from_rgb16(1, 1, &[1, 2, 3]);
        let post = PostProcessing {
            color_reduction: ColorReduction::GreenChannelOnly,
            pseudo_color: false,
        };
        let fluo = ChannelMode::fluorescence(2, "Fluorescence 488 nm Ex", 488, 10.0);
        assert!(post.apply(&frame, &fluo).unwrap().is_color());
        let bf = ChannelMode::brightfield(1, "BF LED matrix full", 10.0);
        assert!(!post.apply(&frame, &bf).unwrap().is_color());
    }
}
