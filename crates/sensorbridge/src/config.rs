//! Configuration management for sensorbridge.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "sensorbridge";

/// Environment variable prefix.
const ENV_PREFIX: &str = "SENSORBRIDGE_";

/// Absolute key path: `/segment/segment`, no `.`, `$`, `#`, `[` or `]`.
const DB_PATH_PATTERN: &str = r"^(/[^/.$#\[\]]+)+$";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SENSORBRIDGE_`, sections
///    separated by `__`, e.g. `SENSORBRIDGE_THERMAL__INTERVAL_MS=500`)
/// 2. TOML config file at `~/.config/sensorbridge/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Realtime database configuration.
    pub database: DatabaseConfig,
    /// Humidity/temperature pipeline configuration.
    pub climate: ClimateConfig,
    /// Autopilot telemetry bridge configuration.
    pub telemetry: TelemetryConfig,
    /// Thermal fire-detection pipeline configuration.
    pub thermal: ThermalConfig,
}

/// Realtime database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Base URL of the database.
    pub url: String,
    /// Database secret or ID token, sent as the `auth` query parameter.
    pub auth_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Humidity/temperature pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    /// Run this pipeline as part of `run`.
    pub enabled: bool,
    /// IIO device directory of the DHT22.
    pub device: PathBuf,
    /// Seconds between readings.
    pub interval_secs: u64,
    /// Database path readings are written under.
    pub path: String,
}

/// Autopilot telemetry bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Run this pipeline as part of `run`.
    pub enabled: bool,
    /// MAVLink connection string (`tcpout:host:port`, `udpin:addr:port`,
    /// `serial:/dev/ttyACM0:115200`).
    pub connection: String,
    /// Database path snapshots are written under.
    pub path: String,
    /// Seconds between snapshot writes.
    pub flush_interval_secs: u64,
    /// Seconds to wait for the first heartbeat.
    pub heartbeat_timeout_secs: u64,
    /// Requested ATTITUDE interval in microseconds.
    pub attitude_interval_us: u32,
    /// Requested `GLOBAL_POSITION_INT` interval in microseconds.
    pub position_interval_us: u32,
    /// Requested `SYS_STATUS` interval in microseconds.
    pub sys_status_interval_us: u32,
}

/// Thermal fire-detection pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    /// Run this pipeline as part of `run`.
    pub enabled: bool,
    /// Endpoint annotated images are posted to.
    pub upload_url: String,
    /// Milliseconds between frames.
    pub interval_ms: u64,
    /// Upload timeout in milliseconds.
    pub upload_timeout_ms: u64,
    /// I2C bus number of the AMG88xx.
    pub i2c_bus: u8,
    /// I2C address of the AMG88xx.
    pub i2c_address: u16,
    /// Width and height of the rendered image in pixels.
    pub image_size: u32,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
    /// TrueType font used for the image labels.
    pub font_path: PathBuf,
    /// Label drawn when fire is detected.
    pub alert_text: String,
    /// Fire detection thresholds.
    pub detection: DetectionConfig,
}

/// Fire detection thresholds, all temperatures in degrees Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Any pixel at or above this is fire.
    pub absolute_fire_threshold: f32,
    /// Minimum number of hot pixels that form a cluster.
    pub cluster_pixel_count_min: usize,
    /// Temperature at which a pixel counts as hot.
    pub cluster_pixel_temp: f32,
    /// A cluster is fire if the hottest pixel is this many times the mean.
    pub cluster_differential_factor: f32,
    /// A lone hot pixel must be at least this hot to be considered.
    pub single_pixel_temp: f32,
    /// Neighbours must exceed the ambient temperature by this much.
    pub neighbor_delta_temp: f32,
    /// Pixels below this are treated as background.
    pub ambient_ceiling: f32,
    /// Warm neighbours needed to confirm a lone hot pixel.
    pub min_hot_neighbors: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "https://dht22raspi-default-rtdb.asia-southeast1.firebasedatabase.app/"
                .to_string(),
            auth_token: None,
            timeout_secs: 10,
        }
    }
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
            interval_secs: 10,
            path: "/sensor/dht22".to_string(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            connection: "tcpout:192.168.26.28:5762".to_string(),
            path: "/pixhawk/telemetry".to_string(),
            flush_interval_secs: 5,
            heartbeat_timeout_secs: 30,
            attitude_interval_us: 500_000,    // 2 Hz
            position_interval_us: 500_000,    // 2 Hz
            sys_status_interval_us: 1_000_000, // 1 Hz
        }
    }
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            upload_url: "https://thermal-vision-nextjs.vercel.app/api/upload".to_string(),
            interval_ms: 1000,
            upload_timeout_ms: 2000,
            i2c_bus: 1,
            i2c_address: 0x69,
            image_size: 256,
            jpeg_quality: 75,
            font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
            alert_text: "!!! API TERDETEKSI !!!".to_string(),
            detection: DetectionConfig::default(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            absolute_fire_threshold: 150.0,
            cluster_pixel_count_min: 2,
            cluster_pixel_temp: 65.0,
            cluster_differential_factor: 1.5,
            single_pixel_temp: 75.0,
            neighbor_delta_temp: 20.0,
            ambient_ceiling: 40.0,
            min_hot_neighbors: 2,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file at `config_path`, or the default path (if exists)
    /// 3. Environment variables (prefixed with `SENSORBRIDGE_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(Error::config("database.url must not be empty"));
        }
        if self.database.timeout_secs == 0 {
            return Err(Error::config("database.timeout_secs must be greater than 0"));
        }

        let path_re = Regex::new(DB_PATH_PATTERN)
            .map_err(|e| Error::internal(format!("database path pattern: {e}")))?;
        for (name, path) in [
            ("climate.path", &self.climate.path),
            ("telemetry.path", &self.telemetry.path),
        ] {
            if !path_re.is_match(path) {
                return Err(Error::config(format!(
                    "{name} must be an absolute key path without '.', '$', '#', '[' or ']': {path}"
                )));
            }
        }

        if self.climate.interval_secs == 0 {
            return Err(Error::config("climate.interval_secs must be greater than 0"));
        }

        if self.telemetry.connection.trim().is_empty() {
            return Err(Error::config("telemetry.connection must not be empty"));
        }
        if self.telemetry.flush_interval_secs == 0 {
            return Err(Error::config(
                "telemetry.flush_interval_secs must be greater than 0",
            ));
        }
        if self.telemetry.heartbeat_timeout_secs == 0 {
            return Err(Error::config(
                "telemetry.heartbeat_timeout_secs must be greater than 0",
            ));
        }

        if self.thermal.upload_url.trim().is_empty() {
            return Err(Error::config("thermal.upload_url must not be empty"));
        }
        if self.thermal.interval_ms == 0 {
            return Err(Error::config("thermal.interval_ms must be greater than 0"));
        }
        if self.thermal.upload_timeout_ms == 0 {
            return Err(Error::config(
                "thermal.upload_timeout_ms must be greater than 0",
            ));
        }
        if self.thermal.image_size < 8 {
            return Err(Error::config(format!(
                "thermal.image_size ({}) must be at least 8",
                self.thermal.image_size
            )));
        }
        if !(1..=100).contains(&self.thermal.jpeg_quality) {
            return Err(Error::config(format!(
                "thermal.jpeg_quality ({}) must be between 1 and 100",
                self.thermal.jpeg_quality
            )));
        }

        self.thermal.detection.validate()
    }
}

impl DatabaseConfig {
    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ClimateConfig {
    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl TelemetryConfig {
    /// Get the flush interval as a Duration.
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Get the heartbeat timeout as a Duration.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

impl ThermalConfig {
    /// Get the frame interval as a Duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Get the upload timeout as a Duration.
    #[must_use]
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }
}

impl DetectionConfig {
    /// Validate the detection thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error if any threshold is non-positive or not finite.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("absolute_fire_threshold", self.absolute_fire_threshold),
            ("cluster_pixel_temp", self.cluster_pixel_temp),
            ("cluster_differential_factor", self.cluster_differential_factor),
            ("single_pixel_temp", self.single_pixel_temp),
            ("neighbor_delta_temp", self.neighbor_delta_temp),
            ("ambient_ceiling", self.ambient_ceiling),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::config(format!(
                    "thermal.detection.{name} must be a positive number, got {value}"
                )));
            }
        }
        if self.cluster_pixel_count_min < 2 {
            return Err(Error::config(
                "thermal.detection.cluster_pixel_count_min must be at least 2",
            ));
        }
        if self.min_hot_neighbors == 0 || self.min_hot_neighbors > 8 {
            return Err(Error::config(
                "thermal.detection.min_hot_neighbors must be between 1 and 8",
            ));
        }
        Ok(())
    }
}
