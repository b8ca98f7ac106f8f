//! MAVLink connection to the flight controller.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mavlink::common::{MavCmd, MavMessage, COMMAND_LONG_DATA};
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader, MavlinkVersion, Message};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::config::TelemetryConfig;
use crate::error::{Error, Result};

/// ATTITUDE message id.
pub const MSG_ID_ATTITUDE: u32 = 30;

/// `GLOBAL_POSITION_INT` message id.
pub const MSG_ID_GLOBAL_POSITION_INT: u32 = 33;

/// `SYS_STATUS` message id.
pub const MSG_ID_SYS_STATUS: u32 = 1;

/// System id we identify as (ground control station range).
const GCS_SYSTEM_ID: u8 = 255;

/// Component id we identify as.
const GCS_COMPONENT_ID: u8 = 190;

/// Capacity of the channel between the reader thread and the bridge.
const CHANNEL_CAPACITY: usize = 256;

type Connection = Box<dyn MavConnection<MavMessage> + Send + Sync>;

/// The system/component a command is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// Autopilot system id.
    pub system: u8,
    /// Autopilot component id.
    pub component: u8,
}

/// A message stream to request from the autopilot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    /// MAVLink message id.
    pub message_id: u32,
    /// Interval between messages in microseconds.
    pub interval_us: u32,
}

impl StreamRequest {
    /// The streams the bridge needs, at the configured rates.
    #[must_use]
    pub fn from_config(config: &TelemetryConfig) -> Vec<Self> {
        vec![
            Self {
                message_id: MSG_ID_ATTITUDE,
                interval_us: config.attitude_interval_us,
            },
            Self {
                message_id: MSG_ID_GLOBAL_POSITION_INT,
                interval_us: config.position_interval_us,
            },
            Self {
                message_id: MSG_ID_SYS_STATUS,
                interval_us: config.sys_status_interval_us,
            },
        ]
    }
}

/// Build a `MAV_CMD_SET_MESSAGE_INTERVAL` command.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn message_interval_command(target: Target, request: StreamRequest) -> MavMessage {
    MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
        target_system: target.system,
        target_component: target.component,
        command: MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
        confirmation: 0,
        param1: request.message_id as f32,
        param2: request.interval_us as f32,
        param3: 0.0,
        param4: 0.0,
        param5: 0.0,
        param6: 0.0,
        param7: 0.0,
    })
}

/// An open link to the autopilot.
pub struct MavLink {
    conn: Arc<Connection>,
    address: String,
    target: Option<Target>,
    sequence: u8,
}

impl std::fmt::Debug for MavLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MavLink")
            .field("address", &self.address)
            .field("target", &self.target)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl MavLink {
    /// Open a connection.
    ///
    /// `address` uses the `mavlink` crate syntax: `tcpout:host:port`,
    /// `tcpin:addr:port`, `udpin:addr:port`, `udpout:host:port` or
    /// `serial:/dev/ttyACM0:115200`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(address: &str) -> Result<Self> {
        info!("Connecting to autopilot at {address}...");
        let owned = address.to_string();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let mut conn = mavlink::connect::<MavMessage>(&owned)
                .map_err(|e| Error::telemetry(format!("cannot connect to {owned}: {e}")))?;
            conn.set_protocol_version(MavlinkVersion::V2);
            Ok(conn)
        })
        .await
        .map_err(|e| Error::internal(format!("connect task failed: {e}")))??;

        Ok(Self {
            conn: Arc::new(conn),
            address: address.to_string(),
            target: None,
            sequence: 0,
        })
    }

    /// Wait for the first HEARTBEAT and remember its sender.
    ///
    /// The read loop runs on its own thread and gives up at the deadline or
    /// as soon as this future is dropped, so an abandoned wait never keeps
    /// the runtime alive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no heartbeat arrives within `timeout`,
    /// or a link error if the connection fails.
    pub async fn wait_heartbeat(&mut self, timeout: Duration) -> Result<Target> {
        let conn = Arc::clone(&self.conn);
        let cancel = CancelOnDrop::default();
        let flag = Arc::clone(&cancel.0);
        let deadline = Instant::now() + timeout;
        let (tx, rx) = oneshot::channel();

        thread::Builder::new()
            .name("mavlink-heartbeat".to_string())
            .spawn(move || {
                // The receiver is gone if the wait was abandoned.
                let _ = tx.send(read_heartbeat(&**conn, deadline, &flag));
            })?;

        let expired = || Error::timeout(format!("waiting for heartbeat from {}", self.address));
        let target = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(Some(target)))) => target,
            Ok(Ok(Ok(None))) | Err(_) => return Err(expired()),
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(_)) => return Err(Error::internal("heartbeat reader exited")),
        };

        info!(
            system = target.system,
            component = target.component,
            "Heartbeat received, link established"
        );
        self.target = Some(target);
        Ok(target)
    }

    /// Ask the autopilot to stream the given messages.
    ///
    /// # Errors
    ///
    /// Returns an error if no heartbeat has been seen yet or a send fails.
    pub async fn request_streams(&mut self, requests: &[StreamRequest]) -> Result<()> {
        let target = self
            .target
            .ok_or_else(|| Error::telemetry("no heartbeat received yet"))?;

        for request in requests {
            let msg = message_interval_command(target, *request);
            self.send(msg).await?;
            debug!(
                message_id = request.message_id,
                interval_us = request.interval_us,
                "requested message interval"
            );
        }
        info!("MAV_CMD_SET_MESSAGE_INTERVAL sent for {} streams", requests.len());
        Ok(())
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn send(&mut self, msg: MavMessage) -> Result<()> {
        let header = MavHeader {
            system_id: GCS_SYSTEM_ID,
            component_id: GCS_COMPONENT_ID,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            conn.send(&header, &msg)
                .map(|_| ())
                .map_err(|e| Error::telemetry(format!("send failed: {e}")))
        })
        .await
        .map_err(|e| Error::internal(format!("send task failed: {e}")))?
    }

    /// Start a reader thread that forwards every received message.
    ///
    /// The channel closes when the link is lost; the thread exits when the
    /// receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn_reader(&self) -> Result<mpsc::Receiver<MavMessage>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let conn = Arc::clone(&self.conn);
        let address = self.address.clone();

        thread::Builder::new()
            .name("mavlink-reader".to_string())
            .spawn(move || loop {
                match conn.recv() {
                    Ok((_, msg)) => {
                        if tx.blocking_send(msg).is_err() {
                            debug!("telemetry receiver dropped, reader exiting");
                            return;
                        }
                    }
                    Err(e) if is_link_lost(&e) => {
                        warn!("Link to {address} lost: {e}");
                        return;
                    }
                    Err(e) => trace!("unreadable frame: {e}"),
                }
            })?;

        Ok(rx)
    }
}

/// Sets its flag when dropped.
#[derive(Debug, Default)]
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Read until a HEARTBEAT arrives.
///
/// Returns `Ok(None)` once `deadline` passes or `cancel` is set. Read
/// timeouts on the connection count as a poll tick.
fn read_heartbeat(
    conn: &(dyn MavConnection<MavMessage> + Send + Sync),
    deadline: Instant,
    cancel: &AtomicBool,
) -> Result<Option<Target>> {
    while !cancel.load(Ordering::Relaxed) && Instant::now() < deadline {
        match conn.recv() {
            Ok((header, MavMessage::HEARTBEAT(_))) => {
                return Ok(Some(Target {
                    system: header.system_id,
                    component: header.component_id,
                }));
            }
            Ok((_, msg)) => trace!(msg = msg.message_name(), "before heartbeat"),
            Err(e) if is_link_lost(&e) => return Err(Error::LinkClosed),
            Err(e) => trace!("no heartbeat yet: {e}"),
        }
    }
    Ok(None)
}

fn is_link_lost(err: &MessageReadError) -> bool {
    match err {
        MessageReadError::Io(e) => matches!(
            e.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected
        ),
        MessageReadError::Parse(_) => false,
    }
}
