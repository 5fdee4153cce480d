use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{width}x{height} frame needs {expected} pixels, got {actual}")]
    ShapeMismatch {
        expected: usize,
        actual: usize,
        width: u32,
        height: u32,
    },
}

/// A decoded depth image.
///
/// The sensor delivers `width * height` floats. Source index `i` lands at
/// `(row = i % width, col = i / width)`, so the image has `width` rows and
/// `height` columns and `get(row, col) == flat[col * width + row]`. Pixels
/// are stored row-major in that orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    width: u32,
    height: u32,
    timestamp: u64,
    pixels: Vec<f32>,
}

/// Reshapes a flat sensor buffer into a [`DepthFrame`].
pub fn decode(
    flat: &[f32],
    width: u32,
    height: u32,
    timestamp: u64,
) -> Result<DepthFrame, DecodeError> {
    let expected = width as usize * height as usize;

    if width == 0 || height == 0 || flat.len() != expected {
        return Err(DecodeError::ShapeMismatch {
            expected,
            actual: flat.len(),
            width,
            height,
        });
    }

    let (rows, cols) = (width as usize, height as usize);
    let mut pixels = vec![0.0; expected];

    for (i, &value) in flat.iter().enumerate() {
        let (row, col) = (i % rows, i / rows);
        pixels[row * cols + col] = value;
    }

    Ok(DepthFrame {
        width,
        height,
        timestamp,
        pixels,
    })
}

impl DepthFrame {
    /// Width reported by the sensor.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height reported by the sensor.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn rows(&self) -> usize {
        self.width as usize
    }

    pub fn cols(&self) -> usize {
        self.height as usize
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows() && col < self.cols() {
            Some(self.pixels[row * self.cols() + col])
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let cols = self.cols();
        self.pixels.get(row * cols..(row + 1) * cols)
    }

    /// All pixels, row-major.
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// The pixels back in the order the sensor delivered them: `height` lines
    /// of `width` values.
    pub fn sensor_order(&self) -> Vec<f32> {
        let (rows, cols) = (self.rows(), self.cols());

        (0..self.pixels.len())
            .map(|i| self.pixels[(i % rows) * cols + i / rows])
            .collect()
    }

    /// An 8-bit copy stretched so the smallest finite depth maps to 0 and the
    /// largest to 255. Non-finite pixels become 0, and so does every pixel of
    /// a frame without contrast.
    pub fn normalized(&self) -> Vec<u8> {
        let (min, max) = self
            .pixels
            .iter()
            .copied()
            .filter(|p| p.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), p| {
                (min.min(p), max.max(p))
            });

        let range = max - min;
        if !range.is_finite() || range <= 0.0 {
            return vec![0; self.pixels.len()];
        }

        self.pixels
            .iter()
            .map(|&p| {
                if p.is_finite() {
                    ((p - min) / range * 255.0).round() as u8
                } else {
                    0
                }
            })
            .collect()
    }
}
