//! Simulated sensors for running the pipelines without hardware.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::climate::Hygrometer;
use crate::error::SensorError;
use crate::record::ClimateReading;
use crate::thermal::{ThermalFrame, ThermalSensor};

/// A DHT22 stand-in: a slow random walk with occasional failed reads.
#[derive(Debug)]
pub struct SimulatedHygrometer {
    rng: StdRng,
    reading: ClimateReading,
    failure_rate: f64,
}

impl SimulatedHygrometer {
    /// Create a simulator seeded from the OS.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a reproducible simulator.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            reading: ClimateReading {
                temperature_c: 27.0,
                humidity: 70.0,
            },
            failure_rate: 0.1,
        }
    }

    /// Probability that a read fails the way a real DHT22 often does.
    #[must_use]
    pub fn failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }
}

impl Default for SimulatedHygrometer {
    fn default() -> Self {
        Self::new()
    }
}

impl Hygrometer for SimulatedHygrometer {
    fn name(&self) -> &'static str {
        "simulated-dht22"
    }

    fn read(&mut self) -> Result<ClimateReading, SensorError> {
        if self.rng.gen_bool(self.failure_rate) {
            return Err(SensorError::Transient(
                "checksum did not validate".to_string(),
            ));
        }
        let r = &mut self.reading;
        r.temperature_c = (r.temperature_c + self.rng.gen_range(-0.3..=0.3)).clamp(15.0, 40.0);
        r.humidity = (r.humidity + self.rng.gen_range(-1.0..=1.0)).clamp(20.0, 99.0);
        Ok(*r)
    }
}

/// An AMG88xx stand-in: room-temperature noise with an occasional hot spot.
#[derive(Debug)]
pub struct SimulatedThermalCamera {
    rng: StdRng,
    ambient: f32,
    fire_probability: f64,
}

impl SimulatedThermalCamera {
    /// Create a simulator seeded from the OS.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a reproducible simulator.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            ambient: 26.0,
            fire_probability: 0.2,
        }
    }

    /// Probability that a frame contains a hot spot.
    #[must_use]
    pub fn fire_probability(mut self, probability: f64) -> Self {
        self.fire_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Generate one frame.
    pub fn next_frame(&mut self) -> ThermalFrame {
        let mut frame = ThermalFrame::uniform(self.ambient);
        for row in 0..8 {
            for col in 0..8 {
                let noise: f32 = self.rng.gen_range(-0.75..=0.75);
                frame.set(row, col, self.ambient + noise);
            }
        }

        if self.rng.gen_bool(self.fire_probability) {
            // 2x2 hot spot, hottest in its top-left corner.
            let row = self.rng.gen_range(0..7);
            let col = self.rng.gen_range(0..7);
            let peak: f32 = self.rng.gen_range(90.0..=220.0);
            frame.set(row, col, peak);
            frame.set(row, col + 1, peak * 0.8);
            frame.set(row + 1, col, peak * 0.75);
            frame.set(row + 1, col + 1, peak * 0.7);
        }
        frame
    }
}

impl Default for SimulatedThermalCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl ThermalSensor for SimulatedThermalCamera {
    fn name(&self) -> &'static str {
        "simulated-amg88xx"
    }

    fn read_frame(&mut self) -> Result<ThermalFrame, SensorError> {
        Ok(self.next_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thermal::FireDetector;

    #[test]
    fn test_hygrometer_random_walk() {
        let mut sensor = SimulatedHygrometer::with_seed(7).failure_rate(0.0);
        let first = sensor.read().unwrap();
        let second = sensor.read().unwrap();

        assert!((15.0..=40.0).contains(&first.temperature_c));
        assert!((20.0..=99.0).contains(&first.humidity));
        assert!((second.temperature_c - first.temperature_c).abs() <= 0.31);
        assert!((second.humidity - first.humidity).abs() <= 1.01);
    }

    #[test]
    fn test_hygrometer_always_failing() {
        let mut sensor = SimulatedHygrometer::with_seed(1).failure_rate(1.0);
        let err = sensor.read().unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_camera_quiet_frames() {
        let mut camera = SimulatedThermalCamera::with_seed(3).fire_probability(0.0);
        let detector = FireDetector::default();
        for _ in 0..20 {
            let frame = camera.read_frame().unwrap();
            let stats = frame.stats();
            assert!(stats.max < 27.0 && stats.min > 25.0);
            assert!(!detector.detect(&frame).fire);
        }
    }

    #[test]
    fn test_camera_fire_frames_are_detected() {
        let mut camera = SimulatedThermalCamera::with_seed(5).fire_probability(1.0);
        let detector = FireDetector::default();
        for _ in 0..20 {
            let detection = detector.detect(&camera.next_frame());
            assert!(detection.fire, "{detection:?}");
            assert!(detection.bbox.is_some());
        }
    }

    #[test]
    fn test_seeded_cameras_agree() {
        let mut a = SimulatedThermalCamera::with_seed(11);
        let mut b = SimulatedThermalCamera::with_seed(11);
        assert_eq!(a.next_frame(), b.next_frame());
    }
}
