use std::{path::PathBuf, time::Duration};

use dm_depth::FrameEncoding;
use dm_types::ImageType;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct CaptureConfig {
    /// The folder in which to save captured frames. Each mission gets its own
    /// subfolder named after the time it started.
    pub save_path: PathBuf,

    /// Frames per second.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    #[serde(default)]
    pub encoding: FrameEncoding,

    #[serde(default = "default_camera_name")]
    pub camera_name: String,

    #[serde(default = "default_image_type")]
    pub image_type: ImageType,

    /// Also ask for a scene image with every depth frame. The vehicle returns
    /// both from one query; the scene image is not kept.
    #[serde(default = "default_request_scene")]
    pub request_scene: bool,

    pub preview: Option<PreviewConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PreviewConfig {
    /// GStreamer element that displays the frames.
    #[serde(default = "default_sink")]
    pub sink: String,
}

impl CaptureConfig {
    /// Time between the starts of two captures.
    pub fn interval(&self) -> Option<Duration> {
        if self.frame_rate.is_finite() && self.frame_rate > 0.0 {
            Some(Duration::from_secs_f64(1.0 / self.frame_rate))
        } else {
            None
        }
    }
}

fn default_frame_rate() -> f64 {
    0.5
}

fn default_camera_name() -> String {
    "1".into()
}

fn default_image_type() -> ImageType {
    ImageType::DepthVis
}

fn default_request_scene() -> bool {
    true
}

fn default_sink() -> String {
    "autovideosink".into()
}
