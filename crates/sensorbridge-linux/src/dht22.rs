//! DHT22 humidity/temperature sensor.
//!
//! The sensor is read through the kernel `dht11` IIO driver, which also
//! handles the DHT22 (enable it with `dtoverlay=dht11,gpiopin=24`). The
//! driver does the single-wire bit timing in kernel space and exposes the
//! last conversion as milli-units under `/sys/bus/iio/devices/iio:deviceN`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

/// Temperature channel in milli-degrees Celsius.
const TEMPERATURE_FILE: &str = "in_temp_input";

/// Relative humidity channel in milli-percent.
const HUMIDITY_FILE: &str = "in_humidityrelative_input";

/// `EIO`: the driver saw a bad checksum or a short pulse train.
const ERRNO_EIO: i32 = 5;

/// `ETIMEDOUT`: the sensor did not answer the start signal.
const ERRNO_ETIMEDOUT: i32 = 110;

/// Errors reported by the DHT22 driver.
#[derive(Debug, Error)]
pub enum Dht22Error {
    /// The IIO device directory does not exist.
    #[error("DHT22 device not found at {0} (is the dht11 overlay enabled?)")]
    NotFound(PathBuf),

    /// The read failed in a way that usually succeeds on retry.
    #[error("DHT22 read failed: {0}")]
    Transient(String),

    /// The channel contained something other than an integer.
    #[error("invalid DHT22 value in {file}: {value:?}")]
    InvalidValue {
        /// The channel file that was read.
        file: &'static str,
        /// The raw contents.
        value: String,
    },

    /// Any other I/O error.
    #[error("DHT22 I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Dht22Error {
    /// Check whether the error is one of the routine DHT read glitches.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// One temperature/humidity sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dht22Sample {
    /// Temperature in degrees Celsius.
    pub temperature_c: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
}

/// A DHT22 sensor exposed through the IIO subsystem.
#[derive(Debug, Clone)]
pub struct Dht22 {
    device_dir: PathBuf,
}

impl Dht22 {
    /// Open the sensor at the given IIO device directory.
    ///
    /// # Errors
    ///
    /// Returns [`Dht22Error::NotFound`] if the directory does not exist.
    pub fn open(device_dir: impl AsRef<Path>) -> Result<Self, Dht22Error> {
        let device_dir = device_dir.as_ref().to_path_buf();
        if !device_dir.join(TEMPERATURE_FILE).exists() {
            return Err(Dht22Error::NotFound(device_dir));
        }
        Ok(Self { device_dir })
    }

    /// Get the IIO device directory.
    #[must_use]
    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }

    /// Trigger a conversion and read both channels.
    ///
    /// # Errors
    ///
    /// Returns [`Dht22Error::Transient`] for checksum and timeout failures,
    /// which are common with this sensor and should simply be retried later.
    pub fn read(&self) -> Result<Dht22Sample, Dht22Error> {
        let temperature = self.read_channel(TEMPERATURE_FILE)?;
        let humidity = self.read_channel(HUMIDITY_FILE)?;
        let sample = Dht22Sample {
            temperature_c: milli_to_unit(temperature),
            humidity: milli_to_unit(humidity),
        };
        trace!(?sample, "DHT22 sample");
        Ok(sample)
    }

    fn read_channel(&self, file: &'static str) -> Result<i64, Dht22Error> {
        let raw = fs::read_to_string(self.device_dir.join(file)).map_err(classify_io_error)?;
        parse_milli(file, &raw)
    }
}

fn classify_io_error(err: io::Error) -> Dht22Error {
    match err.raw_os_error() {
        Some(ERRNO_EIO | ERRNO_ETIMEDOUT) => Dht22Error::Transient(err.to_string()),
        _ if err.kind() == io::ErrorKind::TimedOut => Dht22Error::Transient(err.to_string()),
        _ => Dht22Error::Io(err),
    }
}

fn parse_milli(file: &'static str, raw: &str) -> Result<i64, Dht22Error> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| Dht22Error::InvalidValue {
            file,
            value: raw.to_string(),
        })
}

#[allow(clippy::cast_precision_loss)]
fn milli_to_unit(value: i64) -> f32 {
    (value as f64 / 1000.0) as f32
}
