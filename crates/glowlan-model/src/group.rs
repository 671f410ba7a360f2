//! Group table entries.

use serde::{Deserialize, Serialize};

/// A mesh group of devices.
///
/// Regular groups double as display areas: a device's area label is the
/// first non-subgroup it belongs to. Subgroups exist for scenes and are
/// skipped when resolving area labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Mesh-local group id. Bit 15 is reserved for wire addressing and must
    /// stay clear here.
    pub id: u8,
    /// Display name.
    pub name: String,
    /// Member device ids, in display order.
    pub members: Vec<u8>,
    /// Whether this is a scene subgroup rather than a room.
    #[serde(default)]
    pub is_subgroup: bool,
}

impl Group {
    /// Whether the given device belongs to this group.
    pub fn contains(&self, device_id: u8) -> bool {
        self.members.contains(&device_id)
    }
}
