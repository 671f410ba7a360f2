//! Device table entries.

use serde::{Deserialize, Serialize};

/// Kind of Glowmesh hardware behind a device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Color or tunable-white lamp.
    Bulb,
    /// On/off outlet.
    Plug,
    /// In-wall relay switch.
    Switch,
    /// Battery-powered scene controller.
    WallController,
}

impl DeviceKind {
    /// Switch-type devices stay silent after group-scoped commands; group
    /// sync pushes the resulting state to them directly.
    pub fn is_switch(self) -> bool {
        matches!(self, DeviceKind::Switch | DeviceKind::WallController)
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Bulb => write!(f, "bulb"),
            DeviceKind::Plug => write!(f, "plug"),
            DeviceKind::Switch => write!(f, "switch"),
            DeviceKind::WallController => write!(f, "wall_controller"),
        }
    }
}

/// One configured device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Mesh-local id, as reported in status structs.
    pub id: u8,
    /// Human-readable name.
    pub name: String,
    /// Hardware kind.
    pub kind: DeviceKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_classification() {
        assert!(!DeviceKind::Bulb.is_switch());
        assert!(!DeviceKind::Plug.is_switch());
        assert!(DeviceKind::Switch.is_switch());
        assert!(DeviceKind::WallController.is_switch());
    }

    #[test]
    fn test_kind_yaml_names() {
        let entry: DeviceEntry =
            serde_yaml::from_str("{ id: 7, name: Hall, kind: wall_controller }")
                .expect("should parse");
        assert_eq!(entry.kind, DeviceKind::WallController);
        assert_eq!(entry.kind.to_string(), "wall_controller");
    }
}
