//! Folding MAVLink messages into a [`TelemetrySnapshot`].

use mavlink::common::MavMessage;
use mavlink::Message;
use tracing::trace;

use crate::record::TelemetrySnapshot;

/// Update `snapshot` from one message.
///
/// Returns `true` if the message carried a field the snapshot tracks.
pub fn apply(snapshot: &mut TelemetrySnapshot, msg: &MavMessage) -> bool {
    match msg {
        MavMessage::ATTITUDE(data) => {
            snapshot.set_attitude(data.roll, data.pitch);
            true
        }
        MavMessage::GLOBAL_POSITION_INT(data) => {
            snapshot.set_position(data.lat, data.lon);
            true
        }
        MavMessage::SYS_STATUS(data) => {
            snapshot.set_battery_millivolts(data.voltage_battery);
            true
        }
        other => {
            trace!(msg = other.message_name(), "ignored");
            false
        }
    }
}
