//! Protocol constants
//!
//! Frame type bytes, inner-segment markers, and command opcodes observed on
//! the wire between Glowmesh devices and the vendor cloud. The protocol is
//! undocumented; everything here comes from packet captures.

// ============================================================================
// Frame Types (device → cloud unless noted)
// ============================================================================

/// Handshake announcing the device and its queue id. First frame on a
/// connection.
pub const FRAME_HANDSHAKE: u8 = 0x23;
/// Bulk status report carrying packed per-device structs.
pub const FRAME_DEVICE_INFO: u8 = 0x43;
/// Data channel (bidirectional): commands, command acks, mesh-info replies.
pub const FRAME_DATA: u8 = 0x73;
/// Unsolicited status broadcast with a 0x7E-delimited inner segment.
pub const FRAME_STATUS_BROADCAST: u8 = 0x83;
/// Keepalive ping.
pub const FRAME_HEARTBEAT: u8 = 0xD3;

/// Every request type acks at `type + 0x05` (0x23→0x28, 0x73→0x78, ...).
pub const ACK_TYPE_OFFSET: u8 = 0x05;

/// Ack frame type for a request frame type.
pub const fn ack_type(frame_type: u8) -> u8 {
    frame_type + ACK_TYPE_OFFSET
}

/// Handshake ack (0x28).
pub const ACK_HANDSHAKE: u8 = ack_type(FRAME_HANDSHAKE);
/// Device-info ack (0x48).
pub const ACK_DEVICE_INFO: u8 = ack_type(FRAME_DEVICE_INFO);
/// Data-channel ack (0x78).
pub const ACK_DATA: u8 = ack_type(FRAME_DATA);
/// Status-broadcast ack (0x88).
pub const ACK_STATUS_BROADCAST: u8 = ack_type(FRAME_STATUS_BROADCAST);
/// Heartbeat ack (0xD8).
pub const ACK_HEARTBEAT: u8 = ack_type(FRAME_HEARTBEAT);

// ============================================================================
// Framing
// ============================================================================

/// Fixed frame header size: type(1) + reserved(2) + length(2).
pub const HEADER_SIZE: usize = 5;

/// Hard cap on a declared payload length. Devices never send frames anywhere
/// near this; a larger declaration marks the header as corrupt.
pub const MAX_FRAME_PAYLOAD: usize = 4096;

/// Corrupt-header recoveries tolerated before the reassembly buffer is
/// discarded wholesale.
pub const MAX_RECOVERY_ATTEMPTS: u32 = 64;

/// Delimiter byte bracketing the inner segment of data-channel and
/// status-broadcast payloads.
pub const SEGMENT_MARKER: u8 = 0x7E;

/// Endpoint (queue id) width inside data-channel and status-broadcast
/// payloads.
pub const ENDPOINT_LEN: usize = 5;

/// Inner prelude width: the bytes between the opening marker and the
/// checksummed body.
pub const PRELUDE_LEN: usize = 5;

/// Default checksum offset: summation starts this many bytes past the first
/// segment marker (one marker byte plus the prelude).
pub const DEFAULT_CHECKSUM_OFFSET: usize = 6;

// ============================================================================
// Inner Command Opcodes (cloud → device)
// ============================================================================

/// Set a device or group on/off.
pub const OP_SET_POWER: u8 = 0xD0;
/// Set brightness (0–100).
pub const OP_SET_BRIGHTNESS: u8 = 0xD2;
/// Set color: a mode byte selects white temperature or an RGB triplet.
pub const OP_SET_COLOR: u8 = 0xE2;
/// Request a mesh-info dump of every device behind this endpoint.
pub const OP_MESH_INFO: u8 = 0x52;

/// Mode byte for [`OP_SET_COLOR`]: RGB triplet follows.
pub const COLOR_MODE_RGB: u8 = 0x04;
/// Mode byte for [`OP_SET_COLOR`]: white temperature follows.
pub const COLOR_MODE_WHITE: u8 = 0x05;

/// Bit set in a 16-bit command target to address a mesh group instead of a
/// single device.
pub const GROUP_TARGET_FLAG: u16 = 0x8000;
