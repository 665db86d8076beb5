//! One captured frame and where it came from.

use chrono::{DateTime, Utc};
use scope_core::capabilities::StagePosition;
use scope_core::channel::ChannelMode;
use scope_core::data::Frame;
use scope_storage::ImageName;
use std::sync::Arc;

/// Frame plus capture context, shared with observers and the save job.
#[derive(Debug, Clone)]
pub struct CaptureInfo {
    /// Camera frame.
    pub frame: Arc<Frame>,
    /// Downsampled preview when the run asks for one.
    pub preview: Option<Arc<Frame>>,
    /// Channel the frame was taken in.
    pub channel: ChannelMode,
    /// Index of `channel` in the run's channel list.
    pub channel_index: usize,
    /// Stage position at trigger time.
    pub position: StagePosition,
    /// Piezo position in µm, when the stack is driven by the piezo.
    pub z_piezo_um: Option<f64>,
    /// Z-level index within the stack.
    pub z_level: usize,
    /// Region name.
    pub region: String,
    /// Region index in scan order.
    pub region_index: usize,
    /// FOV index within the region.
    pub fov: usize,
    /// Timepoint index.
    pub timepoint: usize,
    /// Timepoints in the run.
    pub total_timepoints: usize,
    /// Z-levels per stack.
    pub total_z_levels: usize,
    /// Channels per z-level.
    pub total_channels: usize,
    /// Frame arrival time.
    pub capture_time: DateTime<Utc>,
    /// Run-wide sequence number, starting at 0.
    pub capture_index: u64,
}

impl CaptureInfo {
    /// File naming key for this capture.
    pub fn image_name(&self) -> ImageName {
        ImageName {
            timepoint: self.timepoint,
            region: self.region.clone(),
            fov: self.fov,
            z_level: self.z_level,
            channel_label: self.channel.file_label(),
        }
    }

    /// `{region}_{fov:0P}_{z:0P}_{channel_label}`
    pub fn file_id(&self, padding: usize) -> String {
        self.image_name().file_stem(padding)
    }
}
