//! Physical sensors behind the [`Hygrometer`] and [`ThermalSensor`] traits.
//!
//! The drivers live in `sensorbridge-linux`; on other platforms opening a
//! device fails with [`Error::Platform`].

use crate::climate::Hygrometer;
use crate::config::{ClimateConfig, ThermalConfig};
use crate::error::{Error, Result};
use crate::thermal::ThermalSensor;

/// Open the DHT22 described by `config`.
///
/// # Errors
///
/// Returns an error if the device is missing or the platform has no driver.
pub fn open_hygrometer(config: &ClimateConfig) -> Result<Box<dyn Hygrometer>> {
    imp::open_hygrometer(config)
}

/// Open the AMG88xx described by `config`.
///
/// # Errors
///
/// Returns an error if the bus cannot be opened or the platform has no driver.
pub fn open_thermal_camera(config: &ThermalConfig) -> Result<Box<dyn ThermalSensor>> {
    imp::open_thermal_camera(config)
}

/// Name of the platform the drivers were built for.
#[must_use]
pub fn platform_name() -> &'static str {
    imp::platform_name()
}

#[cfg(target_os = "linux")]
mod imp {
    use sensorbridge_linux::{Amg88xx, Dht22, Dht22Error};
    use tracing::info;

    use super::{ClimateConfig, Error, Hygrometer, Result, ThermalConfig, ThermalSensor};
    use crate::error::SensorError;
    use crate::record::ClimateReading;
    use crate::thermal::ThermalFrame;

    struct Dht22Hygrometer(Dht22);

    impl Hygrometer for Dht22Hygrometer {
        fn name(&self) -> &'static str {
            "dht22"
        }

        fn read(&mut self) -> std::result::Result<ClimateReading, SensorError> {
            let sample = self.0.read().map_err(|e| {
                if e.is_transient() || matches!(e, Dht22Error::InvalidValue { .. }) {
                    SensorError::Transient(e.to_string())
                } else {
                    SensorError::Device(e.to_string())
                }
            })?;
            Ok(ClimateReading {
                temperature_c: sample.temperature_c,
                humidity: sample.humidity,
            })
        }
    }

    struct Amg88xxCamera(Amg88xx);

    impl ThermalSensor for Amg88xxCamera {
        fn name(&self) -> &'static str {
            "amg88xx"
        }

        fn read_frame(&mut self) -> std::result::Result<ThermalFrame, SensorError> {
            let pixels = self
                .0
                .read_pixels()
                .map_err(|e| SensorError::Transient(e.to_string()))?;
            ThermalFrame::from_rows(pixels).map_err(|e| SensorError::Device(e.to_string()))
        }
    }

    pub(super) fn open_hygrometer(config: &ClimateConfig) -> Result<Box<dyn Hygrometer>> {
        let sensor =
            Dht22::open(&config.device).map_err(|e| Error::sensor_open("dht22", e.to_string()))?;
        info!("DHT22 opened at {}", sensor.device_dir().display());
        Ok(Box::new(Dht22Hygrometer(sensor)))
    }

    pub(super) fn open_thermal_camera(config: &ThermalConfig) -> Result<Box<dyn ThermalSensor>> {
        let sensor = Amg88xx::open(config.i2c_bus, config.i2c_address)
            .map_err(|e| Error::sensor_open("amg88xx", e.to_string()))?;
        info!(
            "AMG88xx opened on bus {} at {:#04x}",
            config.i2c_bus,
            sensor.address()
        );
        Ok(Box::new(Amg88xxCamera(sensor)))
    }

    pub(super) fn platform_name() -> &'static str {
        sensorbridge_linux::platform_name()
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use super::{ClimateConfig, Error, Hygrometer, Result, ThermalConfig, ThermalSensor};

    pub(super) fn open_hygrometer(_config: &ClimateConfig) -> Result<Box<dyn Hygrometer>> {
        Err(Error::platform(
            "the DHT22 driver is only available on Linux; use --simulate",
        ))
    }

    pub(super) fn open_thermal_camera(_config: &ThermalConfig) -> Result<Box<dyn ThermalSensor>> {
        Err(Error::platform(
            "the AMG88xx driver is only available on Linux; use --simulate",
        ))
    }

    pub(super) fn platform_name() -> &'static str {
        std::env::consts::OS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_hygrometer_fails() {
        let config = ClimateConfig {
            device: "/nonexistent/iio:device9".into(),
            ..ClimateConfig::default()
        };
        assert!(open_hygrometer(&config).is_err());
    }

    #[test]
    fn test_platform_name() {
        assert!(!platform_name().is_empty());
    }
}
