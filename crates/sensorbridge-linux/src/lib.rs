//! Linux-specific hardware drivers for sensorbridge
//!
//! This crate talks to the physical sensors attached to a Raspberry Pi class
//! board: the DHT22 humidity/temperature sensor (through the kernel IIO
//! driver) and the AMG88xx 8x8 thermal array (over `/dev/i2c-*`).

#![cfg(target_os = "linux")]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod amg88xx;
pub mod dht22;

pub use amg88xx::{Amg88xx, Amg88xxError, GRID_SIZE, PIXEL_COUNT};
pub use dht22::{Dht22, Dht22Error, Dht22Sample};

/// Initialize Linux-specific components.
///
/// # Errors
///
/// Returns an error if initialization fails.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!("Initializing Linux hardware components");
    Ok(())
}

/// Get platform name
#[must_use]
pub fn platform_name() -> &'static str {
    "Linux"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert!(init().is_ok());
    }

    #[test]
    fn test_platform_name() {
        assert_eq!(platform_name(), "Linux");
    }
}
