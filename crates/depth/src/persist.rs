use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::*;

use crate::DepthFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameEncoding {
    /// Normalized 8-bit grayscale PNG, for looking at.
    Visual,
    /// Headerless little-endian `f32` with a JSON sidecar, for processing.
    #[default]
    RawFloat,
}

impl FrameEncoding {
    pub fn extension(self) -> &'static str {
        match self {
            FrameEncoding::Visual => "png",
            FrameEncoding::RawFloat => "f32",
        }
    }
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode frame: {reason}")]
    Encode { reason: String },
}

/// Describes the layout of a raw float file, saved next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
    pub rows: usize,
    pub cols: usize,
    pub encoding: FrameEncoding,
}

/// Writes `frame` into `dir` as `<timestamp>.<ext>` and returns the path of
/// the image file. The frame itself is left untouched.
pub async fn persist(
    frame: &DepthFrame,
    dir: &Path,
    encoding: FrameEncoding,
) -> Result<PathBuf, PersistError> {
    let path = dir.join(format!("{}.{}", frame.timestamp(), encoding.extension()));

    match encoding {
        FrameEncoding::Visual => {
            let bytes = encode_png(frame)?;
            write(&path, &bytes).await?;
        }
        FrameEncoding::RawFloat => {
            let bytes: Vec<u8> = frame
                .sensor_order()
                .into_iter()
                .flat_map(|p| p.to_le_bytes())
                .collect();
            write(&path, &bytes).await?;

            let metadata = FrameMetadata {
                timestamp: frame.timestamp(),
                width: frame.width(),
                height: frame.height(),
                rows: frame.rows(),
                cols: frame.cols(),
                encoding,
            };
            let json = serde_json::to_vec_pretty(&metadata).map_err(|err| {
                PersistError::Encode {
                    reason: err.to_string(),
                }
            })?;

            let sidecar = path.with_extension("json");
            write(&sidecar, &json).await?;
        }
    }

    debug!("saved frame {} to {}", frame.timestamp(), path.display());

    Ok(path)
}

fn encode_png(frame: &DepthFrame) -> Result<Vec<u8>, PersistError> {
    let image = GrayImage::from_raw(frame.cols() as u32, frame.rows() as u32, frame.normalized())
        .ok_or_else(|| PersistError::Encode {
            reason: "pixel buffer does not match frame dimensions".into(),
        })?;

    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|err| PersistError::Encode {
            reason: err.to_string(),
        })?;

    Ok(bytes.into_inner())
}

async fn write(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| PersistError::Write {
            path: path.to_owned(),
            source,
        })
}
