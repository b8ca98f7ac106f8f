//! Error types for sensorbridge.
//!
//! This module defines all error types used throughout the sensorbridge crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by sensor drivers.
///
/// DHT-style sensors fail routinely (bad checksum, missed start pulse); those
/// are reported as [`SensorError::Transient`] and are retried on the next poll.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// A read failed but the next one will probably succeed.
    #[error("transient sensor failure: {0}")]
    Transient(String),

    /// The device is missing, misconfigured, or returned nonsense.
    #[error("sensor device error: {0}")]
    Device(String),
}

impl SensorError {
    /// Check if this is a routine, retryable failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The main error type for sensorbridge operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Sensor Errors ===
    /// A sensor could not be opened.
    #[error("failed to open sensor '{name}': {message}")]
    SensorOpen {
        /// Name of the sensor.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    /// A sensor read failed.
    #[error(transparent)]
    Sensor(#[from] SensorError),

    /// Frame data did not have the expected shape.
    #[error("invalid thermal frame: {0}")]
    InvalidFrame(String),

    // === Telemetry Errors ===
    /// The autopilot link failed.
    #[error("telemetry link error: {0}")]
    Telemetry(String),

    /// The telemetry link closed.
    #[error("telemetry link closed")]
    LinkClosed,

    // === Remote Service Errors ===
    /// A database path was malformed.
    #[error("invalid database path '{path}': {reason}")]
    InvalidPath {
        /// The offending path or segment.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // === Image Errors ===
    /// Image encoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read a file.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// Path that couldn't be read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Platform Errors ===
    /// Platform-specific operation failed.
    #[error("platform error: {0}")]
    Platform(String),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for sensorbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new platform error.
    #[must_use]
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new telemetry link error.
    #[must_use]
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    /// Create a sensor open error.
    #[must_use]
    pub fn sensor_open(name: &'static str, message: impl Into<String>) -> Self {
        Self::SensorOpen {
            name,
            message: message.into(),
        }
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Check if this error is a routine sensor glitch that should only be
    /// logged as a warning.
    #[must_use]
    pub fn is_transient_sensor_error(&self) -> bool {
        matches!(self, Self::Sensor(e) if e.is_transient())
    }

    /// Check if this error means the telemetry link is gone.
    #[must_use]
    pub fn is_link_closed(&self) -> bool {
        matches!(self, Self::LinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::LinkClosed;
        assert_eq!(err.to_string(), "telemetry link closed");

        let err = Error::platform("test error");
        assert_eq!(err.to_string(), "platform error: test error");
    }

    #[test]
    fn test_sensor_error_transient() {
        assert!(SensorError::Transient("checksum".into()).is_transient());
        assert!(!SensorError::Device("missing".into()).is_transient());
    }

    #[test]
    fn test_is_transient_sensor_error() {
        let err: Error = SensorError::Transient("checksum".into()).into();
        assert!(err.is_transient_sensor_error());

        let err: Error = SensorError::Device("gone".into()).into();
        assert!(!err.is_transient_sensor_error());

        assert!(!Error::LinkClosed.is_transient_sensor_error());
    }

    #[test]
    fn test_sensor_error_is_transparent() {
        let err: Error = SensorError::Transient("checksum did not validate".into()).into();
        assert_eq!(
            err.to_string(),
            "transient sensor failure: checksum did not validate"
        );
    }

    #[test]
    fn test_is_link_closed() {
        assert!(Error::LinkClosed.is_link_closed());
        assert!(!Error::telemetry("timeout").is_link_closed());
    }

    #[test]
    fn test_sensor_open_error() {
        let err = Error::sensor_open("dht22", "device not found");
        let msg = err.to_string();
        assert!(msg.contains("dht22"));
        assert!(msg.contains("device not found"));
    }

    #[test]
    fn test_telemetry_error() {
        let err = Error::telemetry("connection refused");
        assert_eq!(
            err.to_string(),
            "telemetry link error: connection refused"
        );
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_invalid_path_display() {
        let err = Error::InvalidPath {
            path: "a.b".to_string(),
            reason: "forbidden character",
        };
        let msg = err.to_string();
        assert!(msg.contains("a.b"));
        assert!(msg.contains("forbidden character"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::config("invalid interval");
        assert!(err.to_string().contains("invalid interval"));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = Error::timeout("waiting for heartbeat");
        assert!(err.to_string().contains("waiting for heartbeat"));
    }

    #[test]
    fn test_file_read_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::FileRead {
            path: PathBuf::from("/root/frame.json"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/frame.json"));
    }
}
