//! Command payload builders (cloud → device).
//!
//! Commands travel as the body of a data-channel segment. Every body starts
//! with an opcode byte; targeted opcodes follow it with a 16-bit target id
//! (little-endian) where bit 15 selects group addressing.

use crate::{
    DataSegment, Packet, COLOR_MODE_RGB, COLOR_MODE_WHITE, ENDPOINT_LEN, GROUP_TARGET_FLAG,
    OP_MESH_INFO, OP_SET_BRIGHTNESS, OP_SET_COLOR, OP_SET_POWER, PRELUDE_LEN,
};

/// Addressing target of a command: one device or a mesh group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTarget {
    /// A single device by mesh-local id.
    Device(u8),
    /// Every member of a mesh group.
    Group(u8),
}

impl CommandTarget {
    /// Raw 16-bit target field; groups set the high flag bit.
    pub fn to_wire(self) -> u16 {
        match self {
            CommandTarget::Device(id) => u16::from(id),
            CommandTarget::Group(id) => u16::from(id) | GROUP_TARGET_FLAG,
        }
    }
}

/// Commands the bridge can address to devices behind an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Switch the target on or off.
    SetPower {
        /// Device or group to address.
        target: CommandTarget,
        /// Desired power state.
        on: bool,
    },

    /// Set brightness.
    SetBrightness {
        /// Device or group to address.
        target: CommandTarget,
        /// Brightness 0–100; larger values are clamped.
        level: u8,
    },

    /// Set a tunable-white color temperature.
    SetColorTemp {
        /// Device or group to address.
        target: CommandTarget,
        /// Warm-to-cool position 0–100; larger values are clamped.
        temp: u8,
    },

    /// Set an RGB color.
    SetRgb {
        /// Device or group to address.
        target: CommandTarget,
        /// Red channel.
        r: u8,
        /// Green channel.
        g: u8,
        /// Blue channel.
        b: u8,
    },

    /// Ask the endpoint to dump status structs for every device behind it.
    QueryMeshInfo,
}

impl DeviceCommand {
    /// Encode the inner command body.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);

        match self {
            DeviceCommand::SetPower { target, on } => {
                buf.push(OP_SET_POWER);
                buf.extend_from_slice(&target.to_wire().to_le_bytes());
                buf.push(u8::from(*on));
            }

            DeviceCommand::SetBrightness { target, level } => {
                buf.push(OP_SET_BRIGHTNESS);
                buf.extend_from_slice(&target.to_wire().to_le_bytes());
                buf.push((*level).min(100));
            }

            DeviceCommand::SetColorTemp { target, temp } => {
                buf.push(OP_SET_COLOR);
                buf.extend_from_slice(&target.to_wire().to_le_bytes());
                buf.push(COLOR_MODE_WHITE);
                buf.push((*temp).min(100));
            }

            DeviceCommand::SetRgb { target, r, g, b } => {
                buf.push(OP_SET_COLOR);
                buf.extend_from_slice(&target.to_wire().to_le_bytes());
                buf.push(COLOR_MODE_RGB);
                buf.push(*r);
                buf.push(*g);
                buf.push(*b);
            }

            DeviceCommand::QueryMeshInfo => {
                buf.push(OP_MESH_INFO);
            }
        }

        buf
    }

    /// Target the command addresses, if it has one.
    pub fn target(&self) -> Option<CommandTarget> {
        match self {
            DeviceCommand::SetPower { target, .. }
            | DeviceCommand::SetBrightness { target, .. }
            | DeviceCommand::SetColorTemp { target, .. }
            | DeviceCommand::SetRgb { target, .. } => Some(*target),
            DeviceCommand::QueryMeshInfo => None,
        }
    }

    /// Build the data-channel packet carrying this command.
    pub fn to_packet(self, endpoint: [u8; ENDPOINT_LEN], msg_id: u16) -> Packet {
        let body = self.encode_body();
        let prelude = command_prelude(body.len());
        Packet::Data(DataSegment::new(endpoint, msg_id, prelude, body))
    }
}

/// Prelude for an outbound command segment: flag byte, body length
/// (big-endian), two reserved bytes.
pub fn command_prelude(body_len: usize) -> [u8; PRELUDE_LEN] {
    let len = body_len as u16;
    [0x00, (len >> 8) as u8, (len & 0xFF) as u8, 0x00, 0x00]
}
