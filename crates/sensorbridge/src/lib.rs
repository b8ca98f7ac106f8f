//! `sensorbridge` - Forward field sensor data to cloud services
//!
//! This library provides three acquisition pipelines for a Raspberry Pi class
//! board: a DHT22 humidity/temperature poller and a MAVLink telemetry bridge
//! that write to a realtime database, and an AMG88xx fire detector that posts
//! annotated thermal images to a web endpoint.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod climate;
pub mod config;
pub mod database;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod monitor;
pub mod record;
pub mod simulate;
pub mod telemetry;
pub mod thermal;

#[cfg(test)]
mod testutil;

pub use climate::{ClimatePoller, Hygrometer};
pub use config::Config;
pub use database::{DbPath, DryRunSink, RealtimeDatabase, RecordSink};
pub use error::{Error, Result, SensorError};
pub use logging::init_logging;
pub use monitor::{PipelineHandle, PipelineKind, PipelineManager, PipelineStatus};
pub use record::{ClimateReading, RecordKey, TelemetrySnapshot};
pub use telemetry::TelemetryBridge;
pub use thermal::{Detection, FireDetector, ThermalFrame, ThermalPipeline, ThermalSensor};
