//! Autopilot telemetry bridge.
//!
//! Messages from the flight controller are folded into a
//! [`TelemetrySnapshot`] which is flushed to the realtime database on a fixed
//! interval, independently of message arrival.

pub mod aggregate;
pub mod link;

use std::sync::Arc;
use std::time::Duration;

use mavlink::common::MavMessage;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub use link::{MavLink, StreamRequest, Target};

use crate::config::TelemetryConfig;
use crate::database::{DbPath, RecordSink};
use crate::error::{Error, Result};
use crate::monitor::PipelineHandle;
use crate::record::{RecordKey, TelemetrySnapshot};

/// Flushes aggregated telemetry to a [`RecordSink`].
pub struct TelemetryBridge {
    sink: Arc<dyn RecordSink>,
    base: DbPath,
    flush_interval: Duration,
    snapshot: TelemetrySnapshot,
}

impl std::fmt::Debug for TelemetryBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryBridge")
            .field("sink", &self.sink.name())
            .field("base", &self.base)
            .field("flush_interval", &self.flush_interval)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

impl TelemetryBridge {
    /// Create a bridge writing under `base`.
    #[must_use]
    pub fn new(sink: Arc<dyn RecordSink>, base: DbPath, flush_interval: Duration) -> Self {
        Self {
            sink,
            base,
            flush_interval,
            snapshot: TelemetrySnapshot::default(),
        }
    }

    /// Create a bridge from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured database path is invalid.
    pub fn from_config(sink: Arc<dyn RecordSink>, config: &TelemetryConfig) -> Result<Self> {
        let base = DbPath::parse(&config.path)?;
        Ok(Self::new(
            sink,
            base,
            config.flush_interval(),
        ))
    }

    /// The data gathered since the last successful flush.
    #[must_use]
    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    /// Fold one message into the pending snapshot.
    pub fn ingest(&mut self, msg: &MavMessage) -> bool {
        aggregate::apply(&mut self.snapshot, msg)
    }

    /// Write the pending snapshot, if any.
    ///
    /// Returns the path written, or `None` if there was nothing to send. On
    /// failure the snapshot is kept for the next attempt.
    ///
    /// # Errors
    ///
    /// Returns the database error.
    pub async fn flush(&mut self) -> Result<Option<DbPath>> {
        if self.snapshot.is_empty() {
            return Ok(None);
        }

        let key = RecordKey::now();
        let path = self.base.child(&key.date)?.child(&key.time)?;
        let value = serde_json::to_value(&self.snapshot)?;
        self.sink.set(&path, value.clone()).await?;

        info!("Sent to {path}: {value}");
        self.snapshot = TelemetrySnapshot::default();
        Ok(Some(path))
    }

    /// Run until the handle is stopped or the message stream ends.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkClosed`] when the sender side of `messages` is
    /// dropped, which happens when the link to the autopilot is lost.
    pub async fn run(
        mut self,
        mut messages: mpsc::Receiver<MavMessage>,
        handle: PipelineHandle,
    ) -> Result<()> {
        info!(
            path = %self.base,
            flush_secs = self.flush_interval.as_secs(),
            sink = self.sink.name(),
            "Telemetry bridge started"
        );

        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        let outcome = loop {
            tokio::select! {
                () = handle.stopped() => break Ok(()),
                msg = messages.recv() => match msg {
                    Some(msg) => {
                        self.ingest(&msg);
                    }
                    None => break Err(Error::LinkClosed),
                },
                _ = ticker.tick() => {
                    match self.flush().await {
                        Ok(Some(_)) => handle.record_transmitted(),
                        Ok(None) => info!("Waiting for telemetry data..."),
                        Err(e) => {
                            error!("Failed to send telemetry: {e}");
                            handle.record_failure();
                        }
                    }
                    handle.record_iteration();
                }
            }
        };

        if !self.snapshot.is_empty() {
            debug!(snapshot = ?self.snapshot, "unsent telemetry discarded");
        }
        info!("Telemetry bridge stopped");
        outcome
    }
}

/// Connect to the autopilot, request streams and bridge until stopped.
///
/// # Errors
///
/// Returns an error if the link cannot be established, no heartbeat arrives
/// in time, or the link is lost while running.
pub async fn run_link(
    config: &TelemetryConfig,
    sink: Arc<dyn RecordSink>,
    handle: PipelineHandle,
) -> Result<()> {
    let bridge = TelemetryBridge::from_config(sink, config)?;

    let mut link = MavLink::connect(&config.connection).await?;
    tokio::select! {
        result = link.wait_heartbeat(config.heartbeat_timeout()) => { result?; }
        () = handle.stopped() => return Ok(()),
    }
    link.request_streams(&StreamRequest::from_config(config))
        .await?;

    let messages = link.spawn_reader()?;
    bridge.run(messages, handle).await
}
