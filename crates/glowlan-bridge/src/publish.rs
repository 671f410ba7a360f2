//! State publication boundary.
//!
//! The engine is transport only; whatever owns user-facing state (a bus
//! client, a UI, a test harness) implements [`StatePublisher`] and receives
//! a call every time a device reports state or a command optimistically
//! updates it. Calls must not block: they run on session tasks and the
//! command worker.

use glowmesh_packet::DeviceStatusRecord;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Sink for device state changes. Fire-and-forget on both methods.
pub trait StatePublisher: Send + Sync {
    /// A device reported, or is assumed to have, this state.
    fn publish(&self, device_id: u8, record: &DeviceStatusRecord);

    /// A device's reachability changed.
    fn publish_availability(&self, device_id: u8, online: bool);
}

/// One publication, as carried by [`ChannelPublisher`] and recorded by
/// [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// New state for one device.
    Status {
        /// Mesh-local device id.
        device_id: u8,
        /// The full record; replaces any previous state.
        record: DeviceStatusRecord,
    },
    /// Reachability change for one device.
    Availability {
        /// Mesh-local device id.
        device_id: u8,
        /// Whether the mesh currently sees the device.
        online: bool,
    },
}

/// Publisher that forwards every event over an unbounded channel.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<StateEvent>,
}

impl ChannelPublisher {
    /// Create the publisher and the receiving end for the consumer.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelPublisher { tx }, rx)
    }
}

impl StatePublisher for ChannelPublisher {
    fn publish(&self, device_id: u8, record: &DeviceStatusRecord) {
        // A dropped receiver means nobody is listening; the registry still
        // holds the state, so nothing is lost.
        let _ = self.tx.send(StateEvent::Status {
            device_id,
            record: *record,
        });
    }

    fn publish_availability(&self, device_id: u8, online: bool) {
        let _ = self.tx.send(StateEvent::Availability { device_id, online });
    }
}

/// Publisher that keeps every event in memory, for tests.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<StateEvent>>,
}

impl RecordingPublisher {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far, in order.
    pub fn events(&self) -> Vec<StateEvent> {
        self.events.lock().clone()
    }
}

impl StatePublisher for RecordingPublisher {
    fn publish(&self, device_id: u8, record: &DeviceStatusRecord) {
        self.events.lock().push(StateEvent::Status {
            device_id,
            record: *record,
        });
    }

    fn publish_availability(&self, device_id: u8, online: bool) {
        self.events
            .lock()
            .push(StateEvent::Availability { device_id, online });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glowmesh_packet::ColorMode;

    fn record(device_id: u8) -> DeviceStatusRecord {
        DeviceStatusRecord {
            device_id,
            online: true,
            on: true,
            brightness: 50,
            mode: ColorMode::White { temp: 20 },
        }
    }

    #[test]
    fn test_channel_publisher_forwards_events() {
        let (publisher, mut rx) = ChannelPublisher::new();
        publisher.publish(3, &record(3));
        publisher.publish_availability(3, false);

        assert_eq!(
            rx.try_recv().unwrap(),
            StateEvent::Status {
                device_id: 3,
                record: record(3)
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StateEvent::Availability {
                device_id: 3,
                online: false
            }
        );
    }

    #[test]
    fn test_channel_publisher_survives_dropped_receiver() {
        let (publisher, rx) = ChannelPublisher::new();
        drop(rx);
        publisher.publish(1, &record(1));
    }

    #[test]
    fn test_recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::new();
        publisher.publish_availability(1, true);
        publisher.publish(1, &record(1));

        let events = publisher.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StateEvent::Availability { .. }));
        assert!(matches!(events[1], StateEvent::Status { .. }));
    }
}
