//! Timestamp-keyed records.
//!
//! Every pipeline that writes to the realtime database stores one record per
//! transmission under `<base>/<YYYY-MM-DD>/<HH:MM:SS>`, using the device's
//! local wall-clock time. This module defines those keys and the record
//! payloads.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Date/time key pair for one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Day component, `YYYY-MM-DD`.
    pub date: String,
    /// Time component, `HH:MM:SS`.
    pub time: String,
}

impl RecordKey {
    /// Key for the current local time.
    #[must_use]
    pub fn now() -> Self {
        Self::at(&Local::now())
    }

    /// Key for the given instant in its own time zone.
    #[must_use]
    pub fn at<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        Self::from_naive(&instant.naive_local())
    }

    /// Key for a wall-clock time.
    #[must_use]
    pub fn from_naive(wall_clock: &NaiveDateTime) -> Self {
        Self {
            date: wall_clock.format("%Y-%m-%d").to_string(),
            time: wall_clock.format("%H:%M:%S").to_string(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.date, self.time)
    }
}

/// One humidity/temperature reading.
///
/// Serialized with the field names and one-decimal string formatting the
/// dashboard reading `/sensor/dht22` expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    /// Temperature in degrees Celsius.
    pub temperature_c: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
}

#[derive(Serialize)]
struct ClimateRecord {
    suhu: String,
    kelembapan: String,
}

impl Serialize for ClimateReading {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ClimateRecord {
            suhu: format!("{:.1}", self.temperature_c),
            kelembapan: format!("{:.1}", self.humidity),
        }
        .serialize(serializer)
    }
}

impl std::fmt::Display for ClimateReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "temperature {:.1}°C | humidity {:.1}%",
            self.temperature_c, self.humidity
        )
    }
}

/// Autopilot state accumulated between two database writes.
///
/// Only the fields reported since the last write are serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Roll in degrees, two decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll: Option<String>,
    /// Pitch in degrees, two decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<String>,
    /// Latitude in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    /// Longitude in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// Battery voltage in volts.
    #[serde(rename = "volt_baterai", skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,
}

impl TelemetrySnapshot {
    /// Record an attitude report given in radians.
    pub fn set_attitude(&mut self, roll_rad: f32, pitch_rad: f32) {
        self.roll = Some(format!("{:.2}", roll_rad.to_degrees()));
        self.pitch = Some(format!("{:.2}", pitch_rad.to_degrees()));
    }

    /// Record a position report in 1e-7 degrees.
    pub fn set_position(&mut self, lat_e7: i32, lon_e7: i32) {
        self.lat = Some(f64::from(lat_e7) / 1e7);
        self.lon = Some(f64::from(lon_e7) / 1e7);
    }

    /// Record a battery voltage in millivolts.
    pub fn set_battery_millivolts(&mut self, millivolts: u16) {
        self.battery_voltage = Some(f64::from(millivolts) / 1000.0);
    }

    /// Check if nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
