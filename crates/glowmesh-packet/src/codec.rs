//! Packet encoding and decoding.
//!
//! One tagged enum covers every frame type the cloud protocol uses; unknown
//! type bytes decode to [`Packet::Unknown`] so callers can log and drop them
//! without losing the stream.
//!
//! ## Payload Layouts
//!
//! | Frame              | Type | Payload                                          |
//! |--------------------|------|--------------------------------------------------|
//! | Handshake          | 0x23 | queue id (5) + opaque firmware blob              |
//! | HandshakeAck       | 0x28 | two zero bytes                                   |
//! | DeviceInfo         | 0x43 | packed 19-byte status structs                    |
//! | DeviceInfoAck      | 0x48 | empty                                            |
//! | Data               | 0x73 | endpoint (5) + msg id (2 LE) + pad (1) + segment |
//! | DataAck            | 0x78 | endpoint (5) + msg id (2 LE)                     |
//! | StatusBroadcast    | 0x83 | endpoint (5) + msg id (2 LE) + segment           |
//! | StatusBroadcastAck | 0x88 | endpoint (5) + msg id (2 LE)                     |
//! | Heartbeat          | 0xD3 | empty                                            |
//! | HeartbeatAck       | 0xD8 | empty                                            |
//!
//! The inner segment of data-channel and status-broadcast frames is
//! `0x7E [prelude:5] [body…] [checksum:1] 0x7E` where
//! `checksum == sum(body) mod 256`. A checksum mismatch never fails the
//! decode; it is recorded on the segment for the caller to police.

use crate::{
    encode_frame, PacketError, RawFrame, ACK_DATA, ACK_DEVICE_INFO, ACK_HANDSHAKE, ACK_HEARTBEAT,
    ACK_STATUS_BROADCAST, ENDPOINT_LEN, FRAME_DATA, FRAME_DEVICE_INFO, FRAME_HANDSHAKE,
    FRAME_HEARTBEAT, FRAME_STATUS_BROADCAST, PRELUDE_LEN, SEGMENT_MARKER,
};

// ============================================================================
// Inner Segment
// ============================================================================

/// Decoded inner segment of a data-channel or status-broadcast frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    /// 5-byte endpoint (queue id) prefix.
    pub endpoint: [u8; ENDPOINT_LEN],
    /// Message id, little-endian on the wire.
    pub msg_id: u16,
    /// 5 prelude bytes between the opening marker and the body, excluded
    /// from the checksum.
    pub prelude: [u8; PRELUDE_LEN],
    /// Checksummed body bytes.
    pub body: Vec<u8>,
    /// Transmitted checksum byte.
    pub checksum: u8,
    /// Whether the transmitted checksum matches the body.
    pub checksum_valid: bool,
}

impl DataSegment {
    /// Build a segment with the checksum computed from the body.
    pub fn new(
        endpoint: [u8; ENDPOINT_LEN],
        msg_id: u16,
        prelude: [u8; PRELUDE_LEN],
        body: Vec<u8>,
    ) -> Self {
        let checksum = body_checksum(&body);
        DataSegment {
            endpoint,
            msg_id,
            prelude,
            body,
            checksum,
            checksum_valid: true,
        }
    }
}

/// Sum of the body bytes modulo 256.
pub fn body_checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Recompute the inner checksum over a raw frame payload.
///
/// Locates the first and last `0x7E` markers, then sums the bytes starting
/// `offset_after_start` past the first marker up to but excluding the
/// checksum byte before the trailing marker. Returns `None` when two
/// distinct markers cannot be found or the offset lands past the checksum
/// byte.
pub fn inner_checksum(payload: &[u8], offset_after_start: usize) -> Option<u8> {
    let first = payload.iter().position(|b| *b == SEGMENT_MARKER)?;
    let last = payload.iter().rposition(|b| *b == SEGMENT_MARKER)?;
    if last < first + 2 {
        return None;
    }
    let start = first + offset_after_start;
    if start > last - 1 {
        return None;
    }
    Some(body_checksum(&payload[start..last - 1]))
}

// ============================================================================
// Packets
// ============================================================================

/// A decoded frame of the Glowmesh cloud protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Device greeting announcing its queue id (0x23).
    Handshake {
        /// Queue id the device expects commands addressed to.
        queue_id: [u8; ENDPOINT_LEN],
        /// Firmware/model blob after the queue id, kept opaque.
        blob: Vec<u8>,
    },
    /// Server reply accepting a handshake (0x28).
    HandshakeAck,
    /// Bulk status report of packed 19-byte device structs (0x43).
    DeviceInfo {
        /// Raw packed structs, decoded separately by the status decoder.
        payload: Vec<u8>,
    },
    /// Server receipt for a device-info report (0x48).
    DeviceInfoAck,
    /// Data-channel frame: commands outbound, command replies inbound (0x73).
    Data(DataSegment),
    /// Device receipt for a data-channel frame (0x78).
    DataAck {
        /// Endpoint the receipt came from.
        endpoint: [u8; ENDPOINT_LEN],
        /// Message id being acknowledged.
        msg_id: u16,
    },
    /// Unsolicited status broadcast (0x83).
    StatusBroadcast(DataSegment),
    /// Server receipt for a status broadcast (0x88).
    StatusBroadcastAck {
        /// Endpoint echoed back to the device.
        endpoint: [u8; ENDPOINT_LEN],
        /// Message id echoed back to the device.
        msg_id: u16,
    },
    /// Keepalive ping (0xD3).
    Heartbeat,
    /// Keepalive reply (0xD8).
    HeartbeatAck,
    /// Frame type outside the fixed set, preserved for logging.
    Unknown {
        /// Type byte as received.
        frame_type: u8,
        /// Payload as received.
        payload: Vec<u8>,
    },
}

impl Packet {
    /// Frame type byte this packet travels under.
    pub fn frame_type(&self) -> u8 {
        match self {
            Packet::Handshake { .. } => FRAME_HANDSHAKE,
            Packet::HandshakeAck => ACK_HANDSHAKE,
            Packet::DeviceInfo { .. } => FRAME_DEVICE_INFO,
            Packet::DeviceInfoAck => ACK_DEVICE_INFO,
            Packet::Data(_) => FRAME_DATA,
            Packet::DataAck { .. } => ACK_DATA,
            Packet::StatusBroadcast(_) => FRAME_STATUS_BROADCAST,
            Packet::StatusBroadcastAck { .. } => ACK_STATUS_BROADCAST,
            Packet::Heartbeat => FRAME_HEARTBEAT,
            Packet::HeartbeatAck => ACK_HEARTBEAT,
            Packet::Unknown { frame_type, .. } => *frame_type,
        }
    }

    /// Encode the frame payload without the 5-byte header.
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Packet::Handshake { queue_id, blob } => {
                let mut buf = Vec::with_capacity(ENDPOINT_LEN + blob.len());
                buf.extend_from_slice(queue_id);
                buf.extend_from_slice(blob);
                buf
            }
            Packet::HandshakeAck => vec![0, 0],
            Packet::DeviceInfo { payload } => payload.clone(),
            Packet::DeviceInfoAck => Vec::new(),
            Packet::Data(segment) => encode_outer(segment, true),
            Packet::StatusBroadcast(segment) => encode_outer(segment, false),
            Packet::DataAck { endpoint, msg_id }
            | Packet::StatusBroadcastAck { endpoint, msg_id } => {
                let mut buf = Vec::with_capacity(ENDPOINT_LEN + 2);
                buf.extend_from_slice(endpoint);
                buf.extend_from_slice(&msg_id.to_le_bytes());
                buf
            }
            Packet::Heartbeat | Packet::HeartbeatAck => Vec::new(),
            Packet::Unknown { payload, .. } => payload.clone(),
        }
    }

    /// Encode the packet as a complete frame, header included.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        encode_frame(self.frame_type(), &self.encode_payload())
    }

    /// Decode a reassembled frame.
    pub fn decode(frame: &RawFrame) -> Result<Packet, PacketError> {
        Packet::decode_payload(frame.frame_type, &frame.payload)
    }

    /// Decode a frame payload given its type byte.
    pub fn decode_payload(frame_type: u8, payload: &[u8]) -> Result<Packet, PacketError> {
        match frame_type {
            FRAME_HANDSHAKE => decode_handshake(payload),
            ACK_HANDSHAKE => Ok(Packet::HandshakeAck),
            FRAME_DEVICE_INFO => Ok(Packet::DeviceInfo {
                payload: payload.to_vec(),
            }),
            ACK_DEVICE_INFO => Ok(Packet::DeviceInfoAck),
            FRAME_DATA => Ok(Packet::Data(decode_segment(payload, true)?)),
            ACK_DATA => {
                let (endpoint, msg_id) = decode_endpoint_msg_id(payload)?;
                Ok(Packet::DataAck { endpoint, msg_id })
            }
            FRAME_STATUS_BROADCAST => Ok(Packet::StatusBroadcast(decode_segment(payload, false)?)),
            ACK_STATUS_BROADCAST => {
                let (endpoint, msg_id) = decode_endpoint_msg_id(payload)?;
                Ok(Packet::StatusBroadcastAck { endpoint, msg_id })
            }
            FRAME_HEARTBEAT => Ok(Packet::Heartbeat),
            ACK_HEARTBEAT => Ok(Packet::HeartbeatAck),
            other => Ok(Packet::Unknown {
                frame_type: other,
                payload: payload.to_vec(),
            }),
        }
    }
}

/// Encode the outer payload of a data-channel or status-broadcast frame.
/// Only the data channel carries the padding byte before the segment.
fn encode_outer(segment: &DataSegment, pad: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        ENDPOINT_LEN + 2 + usize::from(pad) + PRELUDE_LEN + segment.body.len() + 3,
    );
    buf.extend_from_slice(&segment.endpoint);
    buf.extend_from_slice(&segment.msg_id.to_le_bytes());
    if pad {
        buf.push(0);
    }
    buf.push(SEGMENT_MARKER);
    buf.extend_from_slice(&segment.prelude);
    buf.extend_from_slice(&segment.body);
    buf.push(segment.checksum);
    buf.push(SEGMENT_MARKER);
    buf
}

// ============================================================================
// Decoding Helpers
// ============================================================================

fn decode_handshake(payload: &[u8]) -> Result<Packet, PacketError> {
    if payload.len() < ENDPOINT_LEN {
        return Err(PacketError::too_short(ENDPOINT_LEN, payload.len()));
    }
    let mut queue_id = [0u8; ENDPOINT_LEN];
    queue_id.copy_from_slice(&payload[..ENDPOINT_LEN]);
    Ok(Packet::Handshake {
        queue_id,
        blob: payload[ENDPOINT_LEN..].to_vec(),
    })
}

fn decode_endpoint_msg_id(payload: &[u8]) -> Result<([u8; ENDPOINT_LEN], u16), PacketError> {
    if payload.len() < ENDPOINT_LEN + 2 {
        return Err(PacketError::too_short(ENDPOINT_LEN + 2, payload.len()));
    }
    let mut endpoint = [0u8; ENDPOINT_LEN];
    endpoint.copy_from_slice(&payload[..ENDPOINT_LEN]);
    let msg_id = u16::from_le_bytes([payload[ENDPOINT_LEN], payload[ENDPOINT_LEN + 1]]);
    Ok((endpoint, msg_id))
}

fn decode_segment(payload: &[u8], has_pad: bool) -> Result<DataSegment, PacketError> {
    let start = ENDPOINT_LEN + 2 + usize::from(has_pad);
    // Smallest segment: marker + prelude + checksum + marker.
    let min = start + PRELUDE_LEN + 3;
    if payload.len() < min {
        return Err(PacketError::too_short(min, payload.len()));
    }
    if payload[start] != SEGMENT_MARKER {
        return Err(PacketError::MissingMarkers);
    }
    let last = match payload.iter().rposition(|b| *b == SEGMENT_MARKER) {
        Some(last) if last > start => last,
        _ => return Err(PacketError::MissingMarkers),
    };
    if last < start + PRELUDE_LEN + 2 {
        return Err(PacketError::too_short(min, last + 1));
    }

    let (endpoint, msg_id) = decode_endpoint_msg_id(payload)?;
    let mut prelude = [0u8; PRELUDE_LEN];
    prelude.copy_from_slice(&payload[start + 1..start + 1 + PRELUDE_LEN]);
    let body = payload[start + 1 + PRELUDE_LEN..last - 1].to_vec();
    let checksum = payload[last - 1];
    let checksum_valid = body_checksum(&body) == checksum;

    Ok(DataSegment {
        endpoint,
        msg_id,
        prelude,
        body,
        checksum,
        checksum_valid,
    })
}
