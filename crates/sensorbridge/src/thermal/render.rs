//! Turning a frame into an annotated JPEG.
//!
//! The 8x8 frame is normalised, upscaled with cubic convolution so the
//! corner samples land exactly on the corner pixels, coloured with the
//! inferno map and labelled with either the hottest temperature or an alert
//! with a box around the hot region.

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use tracing::{debug, warn};

use super::detect::{BoundingBox, Detection};
use super::frame::{ThermalFrame, GRID_SIZE};
use crate::config::ThermalConfig;
use crate::error::Result;

const RED: Rgb<u8> = Rgb([255, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

const LABEL_X: i32 = 10;
const LABEL_Y: i32 = 10;
const ALERT_SCALE: f32 = 24.0;
const MAX_SCALE: f32 = 20.0;
const BOX_THICKNESS: u32 = 3;

/// Inferno colour map anchors, evenly spaced over [0, 1].
const INFERNO: [[u8; 3]; 11] = [
    [0, 0, 4],
    [22, 11, 57],
    [66, 10, 104],
    [106, 23, 110],
    [147, 38, 103],
    [188, 55, 84],
    [221, 81, 58],
    [243, 120, 25],
    [252, 165, 10],
    [246, 215, 70],
    [252, 255, 164],
];

/// Renders frames into labelled images.
pub struct Renderer {
    size: u32,
    quality: u8,
    alert_text: String,
    font: Option<Font<'static>>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("size", &self.size)
            .field("quality", &self.quality)
            .field("alert_text", &self.alert_text)
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl Renderer {
    /// Create a renderer producing `size` x `size` images.
    #[must_use]
    pub fn new(size: u32, quality: u8, alert_text: impl Into<String>) -> Self {
        Self {
            size: size.max(GRID_SIZE as u32),
            quality: quality.clamp(1, 100),
            alert_text: alert_text.into(),
            font: None,
        }
    }

    /// Use `font` for labels.
    #[must_use]
    pub fn with_font(mut self, font: Font<'static>) -> Self {
        self.font = Some(font);
        self
    }

    /// Create a renderer from configuration, loading the label font.
    ///
    /// A missing or unreadable font is logged and labels are skipped.
    #[must_use]
    pub fn from_config(config: &ThermalConfig) -> Self {
        let renderer = Self::new(config.image_size, config.jpeg_quality, &config.alert_text);
        match load_font(&config.font_path) {
            Some(font) => renderer.with_font(font),
            None => {
                warn!(
                    "Font {} not usable, images will have no labels",
                    config.font_path.display()
                );
                renderer
            }
        }
    }

    /// Whether labels will be drawn.
    #[must_use]
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Render a frame and its detection into an RGB image.
    #[must_use]
    pub fn render(&self, frame: &ThermalFrame, detection: &Detection) -> RgbImage {
        let norm = normalize(frame);
        let field = upscale(&norm, self.size as usize);

        let mut img = RgbImage::from_fn(self.size, self.size, |x, y| {
            inferno(field[y as usize * self.size as usize + x as usize])
        });

        if detection.fire {
            self.draw_label(&mut img, RED, ALERT_SCALE, &self.alert_text);
            if let Some(bbox) = detection.bbox {
                self.draw_box(&mut img, bbox);
            }
        } else {
            let label = format!("Max: {:.2}°C", detection.max);
            self.draw_label(&mut img, WHITE, MAX_SCALE, &label);
        }
        img
    }

    /// Render a frame and encode it as JPEG.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn render_jpeg(&self, frame: &ThermalFrame, detection: &Detection) -> Result<Vec<u8>> {
        let img = self.render(frame, detection);
        encode_jpeg(&img, self.quality)
    }

    fn draw_label(&self, img: &mut RgbImage, color: Rgb<u8>, size: f32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(img, color, LABEL_X, LABEL_Y, Scale::uniform(size), font, text);
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn draw_box(&self, img: &mut RgbImage, bbox: BoundingBox) {
        let x = cell_edge(self.size, bbox.col_min);
        let y = cell_edge(self.size, bbox.row_min);
        let width = cell_edge(self.size, bbox.col_max + 1) - x;
        let height = cell_edge(self.size, bbox.row_max + 1) - y;

        for inset in 0..BOX_THICKNESS {
            if width <= 2 * inset || height <= 2 * inset {
                break;
            }
            let rect = Rect::at((x + inset) as i32, (y + inset) as i32)
                .of_size(width - 2 * inset, height - 2 * inset);
            draw_hollow_rect_mut(img, rect, RED);
        }
    }
}

/// Pixel offset of sensor cell boundary `index` in a `size` wide image,
/// rounded to the nearest pixel. Boundary `GRID_SIZE` is the far edge.
#[allow(clippy::cast_possible_truncation)]
fn cell_edge(size: u32, index: usize) -> u32 {
    let grid = GRID_SIZE as u32;
    (index.min(GRID_SIZE) as u32 * size + grid / 2) / grid
}

fn load_font(path: &Path) -> Option<Font<'static>> {
    let bytes = std::fs::read(path)
        .map_err(|e| debug!("cannot read font {}: {e}", path.display()))
        .ok()?;
    Font::try_from_vec(bytes)
}

/// Encode an RGB image as JPEG.
///
/// # Errors
///
/// Returns an error if the encoder fails.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)?;
    Ok(buf)
}

/// Scale a frame to [0, 1] using its own min and max.
#[must_use]
pub fn normalize(frame: &ThermalFrame) -> [[f32; GRID_SIZE]; GRID_SIZE] {
    let stats = frame.stats();
    let range = stats.max - stats.min;
    let range = if range > 0.0 { range } else { 1.0 };

    let mut out = [[0.0; GRID_SIZE]; GRID_SIZE];
    for (r, c, t) in frame.iter() {
        out[r][c] = (t - stats.min) / range;
    }
    out
}

/// Keys cubic convolution kernel with a = -0.5.
fn cubic_weight(x: f32) -> f32 {
    const A: f32 = -0.5;
    let x = x.abs();
    if x <= 1.0 {
        ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
    } else {
        0.0
    }
}

/// Source index and the four tap weights for each output coordinate.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn taps(out_len: usize) -> Vec<(usize, [f32; 4])> {
    let last = (GRID_SIZE - 1) as f32;
    let denom = out_len.saturating_sub(1).max(1) as f32;
    (0..out_len)
        .map(|i| {
            let s = i as f32 * last / denom;
            let base = (s.floor() as usize).min(GRID_SIZE - 1);
            let frac = s - base as f32;
            let weights = [
                cubic_weight(frac + 1.0),
                cubic_weight(frac),
                cubic_weight(1.0 - frac),
                cubic_weight(2.0 - frac),
            ];
            (base, weights)
        })
        .collect()
}

fn sample(values: &[f32; GRID_SIZE], base: usize, weights: &[f32; 4]) -> f32 {
    weights
        .iter()
        .enumerate()
        .map(|(k, w)| {
            let idx = (base + k).saturating_sub(1).min(GRID_SIZE - 1);
            values[idx] * w
        })
        .sum()
}

/// Bicubic upscale of a normalised grid to `size` x `size`, row-major,
/// clamped to [0, 1].
#[must_use]
pub fn upscale(grid: &[[f32; GRID_SIZE]; GRID_SIZE], size: usize) -> Vec<f32> {
    let taps = taps(size);

    // Horizontal pass: 8 rows of `size` samples, then transpose to columns.
    let mut columns = vec![[0.0_f32; GRID_SIZE]; size];
    for (r, row) in grid.iter().enumerate() {
        for (x, (base, weights)) in taps.iter().enumerate() {
            columns[x][r] = sample(row, *base, weights);
        }
    }

    let mut out = vec![0.0_f32; size * size];
    for (y, (base, weights)) in taps.iter().enumerate() {
        for (x, column) in columns.iter().enumerate() {
            out[y * size + x] = sample(column, *base, weights).clamp(0.0, 1.0);
        }
    }
    out
}

/// Map a value in [0, 1] onto the inferno colour map.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn inferno(value: f32) -> Rgb<u8> {
    let steps = (INFERNO.len() - 1) as f32;
    let pos = value.clamp(0.0, 1.0) * steps;
    let lo = (pos.floor() as usize).min(INFERNO.len() - 2);
    let frac = pos - lo as f32;

    let mut rgb = [0u8; 3];
    for (channel, out) in rgb.iter_mut().enumerate() {
        let a = f32::from(INFERNO[lo][channel]);
        let b = f32::from(INFERNO[lo + 1][channel]);
        *out = (a + (b - a) * frac).round() as u8;
    }
    Rgb(rgb)
}
