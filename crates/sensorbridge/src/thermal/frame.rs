//! 8x8 thermal frames.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, SensorError};

/// Rows and columns of a frame.
pub const GRID_SIZE: usize = 8;

/// Pixels in a frame.
pub const PIXEL_COUNT: usize = GRID_SIZE * GRID_SIZE;

/// One frame from an 8x8 thermopile array, in degrees Celsius.
///
/// `pixels[row][col]`, row-major as the sensor reports them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FrameJson", into = "FrameJson")]
pub struct ThermalFrame {
    pixels: [[f32; GRID_SIZE]; GRID_SIZE],
}

impl TryFrom<FrameJson> for ThermalFrame {
    type Error = Error;

    fn try_from(json: FrameJson) -> Result<Self> {
        match json {
            FrameJson::Flat(values) => Self::from_slice(&values),
            FrameJson::Rows(rows) => {
                if rows.len() != GRID_SIZE || rows.iter().any(|r| r.len() != GRID_SIZE) {
                    return Err(Error::InvalidFrame(format!(
                        "expected {GRID_SIZE} rows of {GRID_SIZE} values"
                    )));
                }
                Self::from_slice(&rows.concat())
            }
        }
    }
}

impl From<ThermalFrame> for FrameJson {
    fn from(frame: ThermalFrame) -> Self {
        Self::Rows(frame.pixels.iter().map(|row| row.to_vec()).collect())
    }
}

/// Summary statistics of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameStats {
    /// Hottest pixel.
    pub max: f32,
    /// Coldest pixel.
    pub min: f32,
    /// Mean over all pixels.
    pub mean: f32,
}

/// Accepted JSON layouts for a frame. Frames serialise as rows.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum FrameJson {
    Flat(Vec<f32>),
    Rows(Vec<Vec<f32>>),
}

impl ThermalFrame {
    /// Build a frame from rows.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is not finite.
    pub fn from_rows(pixels: [[f32; GRID_SIZE]; GRID_SIZE]) -> Result<Self> {
        if let Some(bad) = pixels.iter().flatten().find(|t| !t.is_finite()) {
            return Err(Error::InvalidFrame(format!("pixel value {bad} is not finite")));
        }
        Ok(Self { pixels })
    }

    /// Build a frame from 64 values in row-major order.
    ///
    /// # Errors
    ///
    /// Returns an error if `values` does not hold exactly 64 finite numbers.
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        if values.len() != PIXEL_COUNT {
            return Err(Error::InvalidFrame(format!(
                "expected {PIXEL_COUNT} pixels, got {}",
                values.len()
            )));
        }
        let mut pixels = [[0.0; GRID_SIZE]; GRID_SIZE];
        for (row, chunk) in pixels.iter_mut().zip(values.chunks_exact(GRID_SIZE)) {
            row.copy_from_slice(chunk);
        }
        Self::from_rows(pixels)
    }

    /// A frame with every pixel at `temperature`.
    #[must_use]
    pub fn uniform(temperature: f32) -> Self {
        Self {
            pixels: [[temperature; GRID_SIZE]; GRID_SIZE],
        }
    }

    /// Parse a frame from JSON: 64 numbers, or 8 rows of 8.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or has the wrong shape.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str::<FrameJson>(json)?.try_into()
    }

    /// Read a frame from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// The pixel at `row`, `col`.
    ///
    /// # Panics
    ///
    /// Panics if either index is 8 or more.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.pixels[row][col]
    }

    /// Mutable access to a pixel.
    pub fn set(&mut self, row: usize, col: usize, temperature: f32) {
        self.pixels[row][col] = temperature;
    }

    /// The rows of the frame.
    #[must_use]
    pub fn rows(&self) -> &[[f32; GRID_SIZE]; GRID_SIZE] {
        &self.pixels
    }

    /// Iterate over `(row, col, temperature)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.pixels.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().map(move |(c, &t)| (r, c, t))
        })
    }

    /// Max, min and mean over all pixels.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> FrameStats {
        let mut max = f32::NEG_INFINITY;
        let mut min = f32::INFINITY;
        let mut sum = 0.0_f32;
        for &t in self.pixels.iter().flatten() {
            max = max.max(t);
            min = min.min(t);
            sum += t;
        }
        FrameStats {
            max,
            min,
            mean: sum / PIXEL_COUNT as f32,
        }
    }
}

/// A source of thermal frames.
pub trait ThermalSensor: Send + 'static {
    /// The name of this sensor (for logging).
    fn name(&self) -> &'static str;

    /// Read one frame. May block on the bus.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Transient`] for bus glitches worth retrying.
    fn read_frame(&mut self) -> std::result::Result<ThermalFrame, SensorError>;
}
