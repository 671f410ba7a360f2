//! Group state helpers.
//!
//! Groups fan out inside the mesh, but switch-type devices keep their own
//! relay state and stay silent after group-scoped frames. The sync pass
//! here pushes the group outcome at each switch directly so faceplates do
//! not drift from the lights they control.

use glowlan_model::{BridgeConfig, Group};
use glowmesh_packet::{CommandTarget, DeviceCommand};
use tracing::{debug, warn};

use crate::registry::Registry;

/// A group counts as on when any member is on.
pub fn aggregate_power(group: &Group, registry: &Registry) -> bool {
    group
        .members
        .iter()
        .any(|device_id| registry.status_or_default(*device_id).on)
}

/// First top-level group containing the device. Subgroups are wiring
/// detail inside the vendor app and never stand for a room.
pub fn area_of(model: &BridgeConfig, device_id: u8) -> Option<&Group> {
    model
        .groups
        .iter()
        .find(|group| !group.is_subgroup && group.contains(device_id))
}

/// Push `on` at every switch-type member of the group. Returns how many
/// switches took the state.
pub async fn push_group_state_to_switches(registry: &Registry, group_id: u8, on: bool) -> usize {
    let model = registry.model();
    let group = match model.group(group_id) {
        Some(group) => group,
        None => {
            warn!(group = group_id, "group power for unknown group");
            return 0;
        }
    };
    let switches: Vec<u8> = group
        .members
        .iter()
        .copied()
        .filter(|member| {
            model
                .device(*member)
                .map(|entry| entry.kind.is_switch())
                .unwrap_or(false)
        })
        .collect();

    let mut synced = 0;
    for device_id in switches {
        let session = match registry.route(device_id).or_else(|| registry.any_session()) {
            Some(session) => session,
            None => {
                warn!(device = device_id, "no session to sync switch");
                continue;
            }
        };
        let command = DeviceCommand::SetPower {
            target: CommandTarget::Device(device_id),
            on,
        };
        match session.send_command(command).await {
            Ok(()) => synced += 1,
            Err(err) => {
                warn!(device = device_id, error = %err, "switch sync failed");
            }
        }
    }
    if synced > 0 {
        debug!(group = group_id, synced, "switch state pushed");
    }
    synced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionHandle, SessionRequest};
    use glowlan_model::{DeviceEntry, DeviceKind};
    use glowmesh_packet::{ColorMode, DeviceStatusRecord};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn record(device_id: u8, on: bool) -> DeviceStatusRecord {
        DeviceStatusRecord {
            device_id,
            online: true,
            on,
            brightness: 50,
            mode: ColorMode::White { temp: 20 },
        }
    }

    #[test]
    fn test_aggregate_any_member_on() {
        let registry = Registry::new(BridgeConfig::default());
        let group = Group {
            id: 1,
            name: "room".into(),
            members: vec![1, 2],
            is_subgroup: false,
        };

        assert!(!aggregate_power(&group, &registry));
        registry.update_status(record(2, true));
        assert!(aggregate_power(&group, &registry));
        registry.update_status(record(2, false));
        assert!(!aggregate_power(&group, &registry));
    }

    #[test]
    fn test_area_skips_subgroups() {
        let model = BridgeConfig {
            groups: vec![
                Group {
                    id: 1,
                    name: "wiring".into(),
                    members: vec![5],
                    is_subgroup: true,
                },
                Group {
                    id: 2,
                    name: "kitchen".into(),
                    members: vec![5],
                    is_subgroup: false,
                },
            ],
            ..BridgeConfig::default()
        };

        assert_eq!(area_of(&model, 5).map(|g| g.id), Some(2));
        assert!(area_of(&model, 9).is_none());
    }

    #[tokio::test]
    async fn test_push_targets_only_switches() {
        let model = BridgeConfig {
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
        };
        let registry = Registry::new(model);

        let (tx, mut rx) = mpsc::channel(8);
        registry.record_session(SessionHandle::new(1, tx));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                if let SessionRequest::SendCommand { command, reply } = request {
                    log.lock().push(command);
                    let _ = reply.send(Ok(()));
                }
            }
        });

        let synced = push_group_state_to_switches(&registry, 4, false).await;

        assert_eq!(synced, 2);
        assert_eq!(
            seen.lock().clone(),
            vec![
                DeviceCommand::SetPower {
                    target: CommandTarget::Device(2),
                    on: false,
                },
                DeviceCommand::SetPower {
                    target: CommandTarget::Device(3),
                    on: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_group_syncs_nothing() {
        let registry = Registry::new(BridgeConfig::default());
        assert_eq!(push_group_state_to_switches(&registry, 42, true).await, 0);
    }
}
