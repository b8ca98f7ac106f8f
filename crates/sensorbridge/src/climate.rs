//! Humidity/temperature pipeline.
//!
//! Reads a DHT22-class sensor on a fixed interval and stores each reading
//! under `<path>/<date>/<time>` in the realtime database.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::ClimateConfig;
use crate::database::{DbPath, RecordSink};
use crate::error::{Error, Result, SensorError};
use crate::monitor::PipelineHandle;
use crate::record::{ClimateReading, RecordKey};

/// A humidity/temperature sensor.
pub trait Hygrometer: Send + 'static {
    /// The name of this sensor (for logging).
    fn name(&self) -> &'static str;

    /// Take one reading. May block for the duration of the conversion.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Transient`] for routine read glitches.
    fn read(&mut self) -> std::result::Result<ClimateReading, SensorError>;
}

/// Poll loop for a [`Hygrometer`].
pub struct ClimatePoller {
    sensor: Option<Box<dyn Hygrometer>>,
    sink: Arc<dyn RecordSink>,
    base: DbPath,
    interval: Duration,
}

impl std::fmt::Debug for ClimatePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClimatePoller")
            .field("sensor", &self.sensor.as_ref().map(|s| s.name()))
            .field("sink", &self.sink.name())
            .field("base", &self.base)
            .field("interval", &self.interval)
            .finish()
    }
}

impl ClimatePoller {
    /// Create a poller writing under `base`.
    #[must_use]
    pub fn new(
        sensor: Box<dyn Hygrometer>,
        sink: Arc<dyn RecordSink>,
        base: DbPath,
        interval: Duration,
    ) -> Self {
        Self {
            sensor: Some(sensor),
            sink,
            base,
            interval,
        }
    }

    /// Create a poller from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured database path is invalid.
    pub fn from_config(
        sensor: Box<dyn Hygrometer>,
        sink: Arc<dyn RecordSink>,
        config: &ClimateConfig,
    ) -> Result<Self> {
        let base = DbPath::parse(&config.path)?;
        Ok(Self::new(
            sensor,
            sink,
            base,
            config.interval(),
        ))
    }

    /// Read the sensor once and store the reading.
    ///
    /// Returns the path the reading was written to.
    ///
    /// # Errors
    ///
    /// Returns the sensor error or the database error of this attempt.
    pub async fn poll_once(&mut self) -> Result<DbPath> {
        let reading = self.read_sensor().await?;
        info!("{reading}");

        let key = RecordKey::now();
        let path = self.base.child(&key.date)?.child(&key.time)?;
        self.sink.set(&path, serde_json::to_value(reading)?).await?;
        Ok(path)
    }

    /// Run until the handle is stopped.
    ///
    /// Every failure is logged and the loop continues with the next reading.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; the signature leaves room for fatal
    /// conditions.
    pub async fn run(mut self, handle: PipelineHandle) -> Result<()> {
        info!(
            path = %self.base,
            interval_secs = self.interval.as_secs(),
            sink = self.sink.name(),
            "Climate pipeline started: records go to {}/<date>/<time>",
            self.base
        );

        loop {
            match self.poll_once().await {
                Ok(path) => {
                    info!("==> Reading stored at {path}");
                    handle.record_transmitted();
                }
                Err(e) if e.is_transient_sensor_error() => {
                    warn!("Failed to read sensor: {e}");
                    handle.record_failure();
                }
                Err(e) => {
                    error!("Climate iteration failed: {e}");
                    handle.record_failure();
                }
            }
            handle.record_iteration();

            if !handle.sleep(self.interval).await {
                break;
            }
        }

        info!("Climate pipeline stopped");
        Ok(())
    }

    async fn read_sensor(&mut self) -> Result<ClimateReading> {
        let mut sensor = self
            .sensor
            .take()
            .ok_or_else(|| Error::internal("hygrometer lost after a failed read"))?;

        let (sensor, reading) = tokio::task::spawn_blocking(move || {
            let reading = sensor.read();
            (sensor, reading)
        })
        .await
        .map_err(|e| Error::internal(format!("sensor read task failed: {e}")))?;
        self.sensor = Some(sensor);

        let reading = reading?;
        if !reading.temperature_c.is_finite() || !reading.humidity.is_finite() {
            debug!(?reading, "discarding non-finite reading");
            return Err(SensorError::Transient("sensor returned no value".to_string()).into());
        }
        Ok(reading)
    }
}
