//! Sequential command lane.
//!
//! The vendor firmware misbehaves when commands overlap, so everything
//! funnels through one worker: a request is picked up only after the
//! previous one resolved or failed. Expected state is published the moment
//! a request is accepted; the device corrects it later through its normal
//! status reports if reality disagrees.

use std::sync::Arc;

use glowmesh_packet::{ColorMode, CommandTarget, DeviceCommand, DeviceStatusRecord};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::CommandError;
use crate::groups::push_group_state_to_switches;
use crate::metric_names;
use crate::publish::StatePublisher;
use crate::registry::Registry;
use crate::session::SessionHandle;

/// Requests the bridge accepts from its callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRequest {
    /// Switch one device on or off.
    SetPower {
        device_id: u8,
        on: bool,
    },
    /// Set brightness 0 to 100. Zero counts as off.
    SetBrightness {
        device_id: u8,
        level: u8,
    },
    /// Put the device in tunable-white mode at the given position.
    SetColorTemp {
        device_id: u8,
        temp: u8,
    },
    /// Put the device in RGB mode.
    SetRgb {
        device_id: u8,
        r: u8,
        g: u8,
        b: u8,
    },
    /// Switch a whole group, then sync its wall switches.
    SetGroupPower {
        group_id: u8,
        on: bool,
    },
    /// Ask any connected endpoint for a full mesh status dump.
    RefreshMesh,
}

struct QueueEntry {
    request: DeviceRequest,
    reply: oneshot::Sender<Result<(), CommandError>>,
}

/// Strictly ordered command lane over all sessions.
#[derive(Clone)]
pub struct CommandQueue {
    tx: mpsc::Sender<QueueEntry>,
}

impl CommandQueue {
    /// Spawn the queue worker. Requires a Tokio runtime.
    pub fn start(registry: Arc<Registry>, publisher: Arc<dyn StatePublisher>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(worker(rx, registry, publisher));
        CommandQueue { tx }
    }

    /// Submit a request and wait for its outcome.
    pub async fn submit(&self, request: DeviceRequest) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueueEntry { request, reply })
            .await
            .map_err(|_| CommandError::SessionClosed)?;
        rx.await.map_err(|_| CommandError::SessionClosed)?
    }
}

async fn worker(
    mut rx: mpsc::Receiver<QueueEntry>,
    registry: Arc<Registry>,
    publisher: Arc<dyn StatePublisher>,
) {
    while let Some(entry) = rx.recv().await {
        let result = run_request(&registry, publisher.as_ref(), entry.request).await;
        if let Err(err) = &result {
            metrics::counter!(metric_names::COMMANDS_FAILED).increment(1);
            warn!(request = ?entry.request, error = %err, "command failed");
        }
        // Submitter may have gone away; the queue advances regardless.
        let _ = entry.reply.send(result);
    }
}

async fn run_request(
    registry: &Registry,
    publisher: &dyn StatePublisher,
    request: DeviceRequest,
) -> Result<(), CommandError> {
    publish_optimistic(registry, publisher, request);
    let command = to_device_command(request);
    let session = route_for(registry, request).ok_or(CommandError::NotControllable)?;
    session.send_command(command).await?;
    if let DeviceRequest::SetGroupPower { group_id, on } = request {
        push_group_state_to_switches(registry, group_id, on).await;
    }
    Ok(())
}

fn to_device_command(request: DeviceRequest) -> DeviceCommand {
    match request {
        DeviceRequest::SetPower { device_id, on } => DeviceCommand::SetPower {
            target: CommandTarget::Device(device_id),
            on,
        },
        DeviceRequest::SetBrightness { device_id, level } => DeviceCommand::SetBrightness {
            target: CommandTarget::Device(device_id),
            level,
        },
        DeviceRequest::SetColorTemp { device_id, temp } => DeviceCommand::SetColorTemp {
            target: CommandTarget::Device(device_id),
            temp,
        },
        DeviceRequest::SetRgb { device_id, r, g, b } => DeviceCommand::SetRgb {
            target: CommandTarget::Device(device_id),
            r,
            g,
            b,
        },
        DeviceRequest::SetGroupPower { group_id, on } => DeviceCommand::SetPower {
            target: CommandTarget::Group(group_id),
            on,
        },
        DeviceRequest::RefreshMesh => DeviceCommand::QueryMeshInfo,
    }
}

/// Device commands prefer the session that last reported the device; group
/// and mesh-wide requests go to any endpoint.
fn route_for(registry: &Registry, request: DeviceRequest) -> Option<SessionHandle> {
    match request {
        DeviceRequest::SetPower { device_id, .. }
        | DeviceRequest::SetBrightness { device_id, .. }
        | DeviceRequest::SetColorTemp { device_id, .. }
        | DeviceRequest::SetRgb { device_id, .. } => {
            registry.route(device_id).or_else(|| registry.any_session())
        }
        DeviceRequest::SetGroupPower { .. } | DeviceRequest::RefreshMesh => registry.any_session(),
    }
}

/// Feed the expected outcome straight back to subscribers. Availability is
/// never guessed; only sessions report it.
fn publish_optimistic(registry: &Registry, publisher: &dyn StatePublisher, request: DeviceRequest) {
    match request {
        DeviceRequest::SetPower { device_id, on } => {
            let mut record = registry.status_or_default(device_id);
            record.on = on;
            store_and_publish(registry, publisher, record);
        }
        DeviceRequest::SetBrightness { device_id, level } => {
            let mut record = registry.status_or_default(device_id);
            record.brightness = level.min(100);
            record.on = level > 0;
            store_and_publish(registry, publisher, record);
        }
        DeviceRequest::SetColorTemp { device_id, temp } => {
            let mut record = registry.status_or_default(device_id);
            record.mode = ColorMode::White {
                temp: temp.min(100),
            };
            record.on = true;
            store_and_publish(registry, publisher, record);
        }
        DeviceRequest::SetRgb { device_id, r, g, b } => {
            let mut record = registry.status_or_default(device_id);
            record.mode = ColorMode::Rgb { r, g, b };
            record.on = true;
            store_and_publish(registry, publisher, record);
        }
        DeviceRequest::SetGroupPower { group_id, on } => {
            let members = registry
                .model()
                .group(group_id)
                .map(|group| group.members.clone())
                .unwrap_or_default();
            for device_id in members {
                let mut record = registry.status_or_default(device_id);
                record.on = on;
                store_and_publish(registry, publisher, record);
            }
        }
        DeviceRequest::RefreshMesh => {}
    }
}

fn store_and_publish(
    registry: &Registry,
    publisher: &dyn StatePublisher,
    record: DeviceStatusRecord,
) {
    registry.update_status(record);
    publisher.publish(record.device_id, &record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{RecordingPublisher, StateEvent};
    use crate::session::SessionRequest;
    use glowlan_model::{BridgeConfig, DeviceEntry, DeviceKind, Group};
    use parking_lot::Mutex;

    fn group_model() -> BridgeConfig {
        BridgeConfig {
            devices: vec![
                DeviceEntry {
                    id: 1,
                    name: "lamp".into(),
                    kind: DeviceKind::Bulb,
                },
                DeviceEntry {
                    id: 2,
                    name: "wall".into(),
                    kind: DeviceKind::Switch,
                },
                DeviceEntry {
                    id: 3,
                    name: "panel".into(),
                    kind: DeviceKind::WallController,
                },
            ],
            groups: vec![Group {
                id: 4,
                name: "living room".into(),
                members: vec![1, 2, 3],
                is_subgroup: false,
            }],
            ..BridgeConfig::default()
        }
    }

    /// Scripted endpoint that logs commands and answers from a list.
    fn scripted_session(
        registry: &Registry,
        replies: Vec<Result<(), CommandError>>,
    ) -> Arc<Mutex<Vec<DeviceCommand>>> {
        let (tx, mut rx) = mpsc::channel(8);
        registry.record_session(SessionHandle::new(9, tx));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            let mut replies = replies.into_iter();
            while let Some(request) = rx.recv().await {
                if let SessionRequest::SendCommand { command, reply } = request {
                    log.lock().push(command);
                    let _ = reply.send(replies.next().unwrap_or(Ok(())));
                }
            }
        });
        seen
    }

    #[tokio::test]
    async fn test_no_session_yields_not_controllable() {
        let registry = Arc::new(Registry::new(BridgeConfig::default()));
        let publisher = Arc::new(RecordingPublisher::new());
        let queue = CommandQueue::start(Arc::clone(&registry), publisher.clone());

        let result = queue
            .submit(DeviceRequest::SetPower {
                device_id: 1,
                on: true,
            })
            .await;
        assert_eq!(result, Err(CommandError::NotControllable));

        // Expected state went out even though the send failed.
        let events = publisher.events();
        assert!(events.iter().any(|event| matches!(
            event,
            StateEvent::Status { device_id: 1, record } if record.on
        )));
    }

    #[tokio::test]
    async fn test_failing_command_does_not_block_next() {
        let registry = Arc::new(Registry::new(BridgeConfig::default()));
        let publisher = Arc::new(RecordingPublisher::new());
        scripted_session(&registry, vec![Err(CommandError::AckTimeout), Ok(())]);

        let queue = CommandQueue::start(Arc::clone(&registry), publisher.clone());
        let first = queue
            .submit(DeviceRequest::SetPower {
                device_id: 1,
                on: true,
            })
            .await;
        let second = queue
            .submit(DeviceRequest::SetPower {
                device_id: 1,
                on: false,
            })
            .await;

        assert_eq!(first, Err(CommandError::AckTimeout));
        assert_eq!(second, Ok(()));
    }

    #[tokio::test]
    async fn test_group_power_pushes_switches() {
        let registry = Arc::new(Registry::new(group_model()));
        let publisher = Arc::new(RecordingPublisher::new());
        let seen = scripted_session(&registry, Vec::new());

        let queue = CommandQueue::start(Arc::clone(&registry), publisher.clone());
        queue
            .submit(DeviceRequest::SetGroupPower {
                group_id: 4,
                on: true,
            })
            .await
            .unwrap();

        // Group frame first, then a direct push per switch-type member.
        // The bulb never gets a direct frame.
        let commands = seen.lock().clone();
        assert_eq!(
            commands,
            vec![
                DeviceCommand::SetPower {
                    target: CommandTarget::Group(4),
                    on: true,
                },
                DeviceCommand::SetPower {
                    target: CommandTarget::Device(2),
                    on: true,
                },
                DeviceCommand::SetPower {
                    target: CommandTarget::Device(3),
                    on: true,
                },
            ]
        );

        // Optimistic publication covered every member.
        let events = publisher.events();
        for device_id in [1u8, 2, 3] {
            assert!(events.iter().any(|event| matches!(
                event,
                StateEvent::Status { device_id: id, record } if *id == device_id && record.on
            )));
        }
        assert_eq!(registry.status_or_default(1).on, true);
    }

    #[tokio::test]
    async fn test_brightness_zero_counts_as_off() {
        let registry = Arc::new(Registry::new(BridgeConfig::default()));
        let publisher = Arc::new(RecordingPublisher::new());
        scripted_session(&registry, Vec::new());

        let queue = CommandQueue::start(Arc::clone(&registry), publisher.clone());
        queue
            .submit(DeviceRequest::SetBrightness {
                device_id: 1,
                level: 0,
            })
            .await
            .unwrap();

        let record = registry.status_or_default(1);
        assert!(!record.on);
        assert_eq!(record.brightness, 0);
    }

    #[tokio::test]
    async fn test_rgb_implies_on() {
        let registry = Arc::new(Registry::new(BridgeConfig::default()));
        let publisher = Arc::new(RecordingPublisher::new());
        scripted_session(&registry, Vec::new());

        let queue = CommandQueue::start(Arc::clone(&registry), publisher.clone());
        queue
            .submit(DeviceRequest::SetRgb {
                device_id: 1,
                r: 255,
                g: 0,
                b: 64,
            })
            .await
            .unwrap();

        let record = registry.status_or_default(1);
        assert!(record.on);
        assert_eq!(record.mode, ColorMode::Rgb { r: 255, g: 0, b: 64 });
    }
}
