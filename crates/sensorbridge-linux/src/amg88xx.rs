//! Panasonic AMG88xx (Grid-EYE) 8x8 thermal array over I2C.

use std::thread;
use std::time::Duration;

use rppal::i2c::I2c;
use thiserror::Error;
use tracing::debug;

/// Side length of the sensor grid.
pub const GRID_SIZE: usize = 8;

/// Number of pixels in one frame.
pub const PIXEL_COUNT: usize = GRID_SIZE * GRID_SIZE;

// Register map.
const REG_PCTL: u8 = 0x00;
const REG_RST: u8 = 0x01;
const REG_FPSC: u8 = 0x02;
const REG_INTC: u8 = 0x03;
const REG_PIXEL_OFFSET: u8 = 0x80;

const PCTL_NORMAL_MODE: u8 = 0x00;
const RST_INITIAL_RESET: u8 = 0x3F;
const FPSC_10FPS: u8 = 0x00;
const INTC_DISABLED: u8 = 0x00;

/// Degrees Celsius per pixel LSB.
const PIXEL_RESOLUTION: f32 = 0.25;

/// Errors reported by the AMG88xx driver.
#[derive(Debug, Error)]
pub enum Amg88xxError {
    /// The I2C bus could not be opened or a transfer failed.
    #[error("AMG88xx I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),
}

/// An AMG88xx sensor on an I2C bus.
#[derive(Debug)]
pub struct Amg88xx {
    i2c: I2c,
    address: u16,
}

impl Amg88xx {
    /// Default I2C address (AD_SELECT pulled high, as on most breakouts).
    pub const DEFAULT_ADDRESS: u16 = 0x69;

    /// Open the sensor and put it into normal mode at 10 frames per second.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus cannot be opened or the sensor does not
    /// acknowledge the configuration writes.
    pub fn open(bus: u8, address: u16) -> Result<Self, Amg88xxError> {
        let mut i2c = I2c::with_bus(bus)?;
        i2c.set_slave_address(address)?;

        i2c.smbus_write_byte(REG_PCTL, PCTL_NORMAL_MODE)?;
        i2c.smbus_write_byte(REG_RST, RST_INITIAL_RESET)?;
        i2c.smbus_write_byte(REG_INTC, INTC_DISABLED)?;
        i2c.smbus_write_byte(REG_FPSC, FPSC_10FPS)?;

        // First frame is ready after the reset settles.
        thread::sleep(Duration::from_millis(100));

        debug!(bus, address = %format!("{address:#04x}"), "AMG88xx initialized");
        Ok(Self { i2c, address })
    }

    /// Get the I2C address of this sensor.
    #[must_use]
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Read one frame, row-major, in degrees Celsius.
    ///
    /// # Errors
    ///
    /// Returns an error if the I2C transfer fails.
    pub fn read_pixels(&mut self) -> Result<[[f32; GRID_SIZE]; GRID_SIZE], Amg88xxError> {
        let mut buf = [0u8; PIXEL_COUNT * 2];
        self.i2c.write_read(&[REG_PIXEL_OFFSET], &mut buf)?;
        Ok(decode_frame(&buf))
    }
}

/// Decode the 128-byte pixel block into an 8x8 grid.
#[must_use]
pub fn decode_frame(buf: &[u8; PIXEL_COUNT * 2]) -> [[f32; GRID_SIZE]; GRID_SIZE] {
    let mut frame = [[0.0; GRID_SIZE]; GRID_SIZE];
    for (i, pair) in buf.chunks_exact(2).enumerate() {
        let raw = u16::from_le_bytes([pair[0], pair[1]]);
        frame[i / GRID_SIZE][i % GRID_SIZE] = pixel_to_celsius(raw);
    }
    frame
}

/// Convert a 12-bit two's complement pixel value.
#[must_use]
pub fn pixel_to_celsius(raw: u16) -> f32 {
    let value = i16::try_from(raw & 0x0FFF).unwrap_or(0);
    let signed = if value & 0x0800 != 0 {
        value - 0x1000
    } else {
        value
    };
    f32::from(signed) * PIXEL_RESOLUTION
}
