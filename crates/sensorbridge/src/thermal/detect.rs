//! Rule-based fire detection on a single frame.
//!
//! Three rules are tried in order and the first that applies decides:
//!
//! 1. **Absolute**: the hottest pixel reaches `absolute_fire_threshold`.
//! 2. **Cluster**: at least `cluster_pixel_count_min` pixels reach
//!    `cluster_pixel_temp`; fire if the hottest pixel is at least
//!    `cluster_differential_factor` times the frame mean.
//! 3. **Isolated**: exactly one pixel reaches `cluster_pixel_temp` and it is
//!    at least `single_pixel_temp`; fire if enough of its 8-neighbours are
//!    more than `neighbor_delta_temp` above the ambient background.

use serde::Serialize;

use super::frame::{ThermalFrame, GRID_SIZE};
use crate::config::DetectionConfig;

/// Inclusive pixel bounds of the hot region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    /// First hot row.
    pub row_min: usize,
    /// Last hot row.
    pub row_max: usize,
    /// First hot column.
    pub col_min: usize,
    /// Last hot column.
    pub col_max: usize,
}

impl BoundingBox {
    fn enclosing(pixels: &[(usize, usize)]) -> Option<Self> {
        let (&(r0, c0), rest) = pixels.split_first()?;
        let mut bbox = Self {
            row_min: r0,
            row_max: r0,
            col_min: c0,
            col_max: c0,
        };
        for &(r, c) in rest {
            bbox.row_min = bbox.row_min.min(r);
            bbox.row_max = bbox.row_max.max(r);
            bbox.col_min = bbox.col_min.min(c);
            bbox.col_max = bbox.col_max.max(c);
        }
        Some(bbox)
    }
}

/// Which rule decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStage {
    /// Hottest pixel over the absolute threshold.
    Absolute,
    /// Several hot pixels, judged against the frame mean.
    Cluster,
    /// One hot pixel, judged by its neighbours.
    Isolated,
    /// No rule applied.
    NoCandidate,
}

impl std::fmt::Display for DetectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Cluster => write!(f, "cluster"),
            Self::Isolated => write!(f, "isolated"),
            Self::NoCandidate => write!(f, "no candidate"),
        }
    }
}

/// The verdict for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    /// Whether fire was detected.
    pub fire: bool,
    /// Hot region, set only when `fire` is true.
    pub bbox: Option<BoundingBox>,
    /// Hottest pixel.
    pub max: f32,
    /// Coldest pixel.
    pub min: f32,
    /// Mean over all pixels.
    pub mean: f32,
    /// The deciding rule.
    pub stage: DetectionStage,
}

/// Applies the detection rules with a fixed set of thresholds.
#[derive(Debug, Clone, Default)]
pub struct FireDetector {
    config: DetectionConfig,
}

impl FireDetector {
    /// Create a detector with the given thresholds.
    #[must_use]
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// The thresholds in use.
    #[must_use]
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Classify one frame.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn detect(&self, frame: &ThermalFrame) -> Detection {
        let cfg = &self.config;
        let stats = frame.stats();

        let mut hot: Vec<(usize, usize)> = frame
            .iter()
            .filter(|&(_, _, t)| t >= cfg.cluster_pixel_temp)
            .map(|(r, c, _)| (r, c))
            .collect();

        let (fire, stage) = if stats.max >= cfg.absolute_fire_threshold {
            hot = frame
                .iter()
                .filter(|&(_, _, t)| t == stats.max)
                .map(|(r, c, _)| (r, c))
                .collect();
            (true, DetectionStage::Absolute)
        } else if hot.len() >= cfg.cluster_pixel_count_min {
            (
                stats.max >= stats.mean * cfg.cluster_differential_factor,
                DetectionStage::Cluster,
            )
        } else if let [(row, col)] = hot[..] {
            if frame.get(row, col) >= cfg.single_pixel_temp {
                let ambient = self.ambient(frame, stats.mean);
                let warm = warm_neighbors(frame, row, col, ambient + cfg.neighbor_delta_temp);
                (warm >= cfg.min_hot_neighbors, DetectionStage::Isolated)
            } else {
                (false, DetectionStage::NoCandidate)
            }
        } else {
            (false, DetectionStage::NoCandidate)
        };

        Detection {
            fire,
            bbox: if fire {
                BoundingBox::enclosing(&hot)
            } else {
                None
            },
            max: stats.max,
            min: stats.min,
            mean: stats.mean,
            stage,
        }
    }

    /// Mean of the background pixels, or `fallback` if every pixel is warm.
    #[allow(clippy::cast_precision_loss)]
    fn ambient(&self, frame: &ThermalFrame, fallback: f32) -> f32 {
        let (sum, count) = frame
            .iter()
            .filter(|&(_, _, t)| t < self.config.ambient_ceiling)
            .fold((0.0_f32, 0_usize), |(s, n), (_, _, t)| (s + t, n + 1));
        if count == 0 {
            fallback
        } else {
            sum / count as f32
        }
    }
}

/// Count in-bounds 8-neighbours of `(row, col)` hotter than `threshold`.
fn warm_neighbors(frame: &ThermalFrame, row: usize, col: usize, threshold: f32) -> usize {
    let rows = row.saturating_sub(1)..=(row + 1).min(GRID_SIZE - 1);
    rows.flat_map(|r| {
        (col.saturating_sub(1)..=(col + 1).min(GRID_SIZE - 1)).map(move |c| (r, c))
    })
    .filter(|&(r, c)| (r, c) != (row, col) && frame.get(r, c) > threshold)
    .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> FireDetector {
        FireDetector::default()
    }

    #[test]
    fn test_cool_frame() {
        let detection = detector().detect(&ThermalFrame::uniform(22.0));
        assert!(!detection.fire);
        assert_eq!(detection.stage, DetectionStage::NoCandidate);
        assert_eq!(detection.bbox, None);
        assert_eq!(detection.max, 22.0);
        assert_eq!(detection.min, 22.0);
    }

    #[test]
    fn test_absolute_threshold() {
        let mut frame = ThermalFrame::uniform(25.0);
        frame.set(3, 4, 180.0);
        frame.set(6, 1, 100.0);

        let detection = detector().detect(&frame);
        assert!(detection.fire);
        assert_eq!(detection.stage, DetectionStage::Absolute);
        // Only the hottest pixel is boxed.
        assert_eq!(
            detection.bbox,
            Some(BoundingBox {
                row_min: 3,
                row_max: 3,
                col_min: 4,
                col_max: 4
            })
        );
    }

    #[test]
    fn test_absolute_threshold_boxes_every_tied_maximum() {
        let mut frame = ThermalFrame::uniform(25.0);
        frame.set(1, 6, 210.0);
        frame.set(5, 2, 210.0);
        frame.set(4, 4, 209.5);

        let detection = detector().detect(&frame);
        assert!(detection.fire);
        assert_eq!(detection.stage, DetectionStage::Absolute);
        assert_eq!(
            detection.bbox,
            Some(BoundingBox {
                row_min: 1,
                row_max: 5,
                col_min: 2,
                col_max: 6
            })
        );
    }

    #[test]
    fn test_absolute_threshold_is_inclusive() {
        let mut frame = ThermalFrame::uniform(25.0);
        frame.set(0, 0, 150.0);
        let detection = detector().detect(&frame);
        assert!(detection.fire);
        assert_eq!(detection.stage, DetectionStage::Absolute);
    }

    #[test]
    fn test_cluster_fire() {
        let mut frame = ThermalFrame::uniform(25.0);
        frame.set(2, 2, 90.0);
        frame.set(2, 3, 85.0);
        frame.set(3, 2, 70.0);

        let detection = detector().detect(&frame);
        assert!(detection.fire);
        assert_eq!(detection.stage, DetectionStage::Cluster);
        assert_eq!(
            detection.bbox,
            Some(BoundingBox {
                row_min: 2,
                row_max: 3,
                col_min: 2,
                col_max: 3
            })
        );
    }

    #[test]
    fn test_cluster_without_differential() {
        // Everything is hot, so the max is not far above the mean.
        let mut frame = ThermalFrame::uniform(70.0);
        frame.set(0, 0, 80.0);

        let detection = detector().detect(&frame);
        assert!(!detection.fire);
        assert_eq!(detection.stage, DetectionStage::Cluster);
        assert_eq!(detection.bbox, None);
    }

    #[test]
    fn test_isolated_pixel_with_warm_neighbors() {
        let mut frame = ThermalFrame::uniform(25.0);
        frame.set(4, 4, 80.0);
        // ambient = 25, neighbours must exceed 45
        frame.set(3, 4, 50.0);
        frame.set(5, 5, 60.0);

        let detection = detector().detect(&frame);
        assert!(detection.fire);
        assert_eq!(detection.stage, DetectionStage::Isolated);
        assert_eq!(
            detection.bbox,
            Some(BoundingBox {
                row_min: 4,
                row_max: 4,
                col_min: 4,
                col_max: 4
            })
        );
    }

    #[test]
    fn test_isolated_pixel_without_neighbors() {
        let mut frame = ThermalFrame::uniform(25.0);
        frame.set(4, 4, 80.0);
        frame.set(3, 4, 50.0);

        let detection = detector().detect(&frame);
        assert!(!detection.fire);
        assert_eq!(detection.stage, DetectionStage::Isolated);
    }

    #[test]
    fn test_isolated_pixel_below_single_threshold() {
        let mut frame = ThermalFrame::uniform(25.0);
        frame.set(4, 4, 70.0);
        frame.set(3, 4, 60.0);
        frame.set(5, 4, 60.0);

        let detection = detector().detect(&frame);
        assert!(!detection.fire);
        assert_eq!(detection.stage, DetectionStage::NoCandidate);
    }

    #[test]
    fn test_isolated_pixel_in_corner() {
        let mut frame = ThermalFrame::uniform(20.0);
        frame.set(0, 0, 100.0);
        frame.set(0, 1, 50.0);
        frame.set(1, 1, 50.0);

        let detection = detector().detect(&frame);
        assert!(detection.fire);
        assert_eq!(detection.stage, DetectionStage::Isolated);
    }

    #[test]
    fn test_ambient_falls_back_to_mean() {
        // No pixel is below the ambient ceiling.
        let mut frame = ThermalFrame::uniform(45.0);
        frame.set(4, 4, 100.0);
        frame.set(4, 3, 60.0);
        frame.set(4, 5, 60.0);

        let detector = detector();
        assert_eq!(detector.ambient(&frame, 99.0), 99.0);

        // mean is about 46.3, so neighbours must exceed ~66.3
        let detection = detector.detect(&frame);
        assert!(!detection.fire);
        assert_eq!(detection.stage, DetectionStage::Isolated);
    }

    #[test]
    fn test_warm_neighbors_bounds() {
        let frame = ThermalFrame::uniform(50.0);
        assert_eq!(warm_neighbors(&frame, 0, 0, 40.0), 3);
        assert_eq!(warm_neighbors(&frame, 0, 4, 40.0), 5);
        assert_eq!(warm_neighbors(&frame, 4, 4, 40.0), 8);
        assert_eq!(warm_neighbors(&frame, 7, 7, 50.0), 0);
    }

    #[test]
    fn test_custom_thresholds() {
        let detector = FireDetector::new(DetectionConfig {
            absolute_fire_threshold: 60.0,
            ..DetectionConfig::default()
        });
        let mut frame = ThermalFrame::uniform(25.0);
        frame.set(1, 1, 61.0);

        let detection = detector.detect(&frame);
        assert!(detection.fire);
        assert_eq!(detection.stage, DetectionStage::Absolute);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(DetectionStage::Cluster.to_string(), "cluster");
        assert_eq!(DetectionStage::NoCandidate.to_string(), "no candidate");
    }
}
