use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Position in the vehicle's local North-East-Down frame, in meters. `z` grows
/// downward, so climbing makes it more negative.
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Whether the vehicle's nose is locked to its direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivetrainMode {
    MaxDegreeOfFreedom,
    ForwardOnly,
}

impl DrivetrainMode {
    /// Numeric value used on the wire by the vehicle controller.
    pub fn code(self) -> i32 {
        match self {
            DrivetrainMode::MaxDegreeOfFreedom => 0,
            DrivetrainMode::ForwardOnly => 1,
        }
    }
}

/// Heading policy during a motion command. When `is_rate` is set,
/// `yaw_or_rate` is a rate in degrees per second, otherwise an absolute angle
/// in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YawMode {
    pub is_rate: bool,
    pub yaw_or_rate: f32,
}

impl Default for YawMode {
    fn default() -> Self {
        Self {
            is_rate: true,
            yaw_or_rate: 0.0,
        }
    }
}

/// An offboard velocity command that holds altitude `z` while moving
/// laterally at (`vx`, `vy`) for up to `duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityZ {
    pub vx: f32,
    pub vy: f32,
    pub z: f32,
    pub duration: Duration,
    pub drivetrain: DrivetrainMode,
    pub yaw_mode: YawMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Scene,
    DepthPlanar,
    DepthPerspective,
    DepthVis,
    DisparityNormalized,
    Segmentation,
    SurfaceNormals,
    Infrared,
}

impl ImageType {
    pub fn code(self) -> i32 {
        match self {
            ImageType::Scene => 0,
            ImageType::DepthPlanar => 1,
            ImageType::DepthPerspective => 2,
            ImageType::DepthVis => 3,
            ImageType::DisparityNormalized => 4,
            ImageType::Segmentation => 5,
            ImageType::SurfaceNormals => 6,
            ImageType::Infrared => 7,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => ImageType::Scene,
            1 => ImageType::DepthPlanar,
            2 => ImageType::DepthPerspective,
            3 => ImageType::DepthVis,
            4 => ImageType::DisparityNormalized,
            5 => ImageType::Segmentation,
            6 => ImageType::SurfaceNormals,
            7 => ImageType::Infrared,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub camera_name: String,
    pub image_type: ImageType,
    pub pixels_as_float: bool,
    pub compress: bool,
}

impl ImageRequest {
    /// Uncompressed float image, the form depth data is requested in.
    pub fn float(camera_name: impl Into<String>, image_type: ImageType) -> Self {
        Self {
            camera_name: camera_name.into(),
            image_type,
            pixels_as_float: true,
            compress: false,
        }
    }

    pub fn bytes(camera_name: impl Into<String>, image_type: ImageType) -> Self {
        Self {
            camera_name: camera_name.into(),
            image_type,
            pixels_as_float: false,
            compress: false,
        }
    }
}

/// One image returned by the vehicle. Float payloads are flattened row-major
/// in sensor scan order, `width * height` values long.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageResponse {
    pub camera_name: String,
    pub image_type: Option<ImageType>,
    pub width: u32,
    pub height: u32,
    /// Capture-source timestamp, nanoseconds.
    pub time_stamp: u64,
    pub pixels_as_float: bool,
    pub image_data_float: Vec<f32>,
    pub image_data_uint8: Vec<u8>,
    pub message: String,
}
