//! Stream framing for the Glowmesh TCP transport.
//!
//! Every frame starts with a 5-byte header followed by the payload:
//!
//! ```text
//! +------+------+------+------+------+------------------+
//! | type | rsv0 | rsv1 | mult | base | payload[0..len]  |
//! +------+------+------+------+------+------------------+
//! ```
//!
//! The payload length is `mult * 256 + base`. A header declaring a length
//! above [`MAX_FRAME_PAYLOAD`] is treated as corrupt: the codec drops the
//! header bytes and rescans, bounded by [`MAX_RECOVERY_ATTEMPTS`] before the
//! whole buffer is abandoned.

use bytes::{Buf, BytesMut};

use crate::{PacketError, HEADER_SIZE, MAX_FRAME_PAYLOAD, MAX_RECOVERY_ATTEMPTS};

/// A complete frame as read off the wire, header already consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame type byte (first header byte).
    pub frame_type: u8,
    /// Payload bytes. The length always matches the header's declared length.
    pub payload: Vec<u8>,
}

/// Encode the 5-byte frame header for a payload of the given length.
pub fn encode_header(frame_type: u8, payload_len: usize) -> Result<[u8; HEADER_SIZE], PacketError> {
    if payload_len > MAX_FRAME_PAYLOAD {
        return Err(PacketError::InvalidLength {
            declared: payload_len,
            max: MAX_FRAME_PAYLOAD,
        });
    }
    Ok([
        frame_type,
        0,
        0,
        (payload_len / 256) as u8,
        (payload_len % 256) as u8,
    ])
}

/// Encode a complete frame: header plus payload.
pub fn encode_frame(frame_type: u8, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    let header = encode_header(frame_type, payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode a frame header: `(frame_type, declared_length)`.
pub fn decode_header(data: &[u8]) -> Result<(u8, usize), PacketError> {
    if data.len() < HEADER_SIZE {
        return Err(PacketError::too_short(HEADER_SIZE, data.len()));
    }
    let declared = data[3] as usize * 256 + data[4] as usize;
    if declared > MAX_FRAME_PAYLOAD {
        return Err(PacketError::InvalidLength {
            declared,
            max: MAX_FRAME_PAYLOAD,
        });
    }
    Ok((data[0], declared))
}

/// Stateful reassembler for the framed byte stream.
///
/// Bytes arrive in arbitrary chunks; [`FrameCodec::feed`] returns every frame
/// completed by the new data, in arrival order. Partial frames stay buffered
/// until the rest arrives.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Corrupt headers dropped since the last successful extraction.
    recovery_attempts: u32,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(MAX_FRAME_PAYLOAD),
            recovery_attempts: 0,
        }
    }

    /// Append received bytes and extract every frame now complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Try to extract one frame from the buffer front.
    ///
    /// Returns `None` when more data is needed. Corrupt headers are dropped
    /// and the scan continues from the following byte; once
    /// [`MAX_RECOVERY_ATTEMPTS`] consecutive headers have been dropped the
    /// buffer is cleared outright so a hostile stream cannot pin memory or
    /// scan time.
    fn next_frame(&mut self) -> Option<RawFrame> {
        loop {
            let (frame_type, declared) = match decode_header(&self.buffer) {
                Ok(header) => header,
                Err(PacketError::TooShort { .. }) => return None,
                Err(_) => {
                    // Corrupt header: drop it and rescan.
                    self.buffer.advance(HEADER_SIZE);
                    self.recovery_attempts += 1;
                    if self.recovery_attempts >= MAX_RECOVERY_ATTEMPTS {
                        self.buffer.clear();
                        self.recovery_attempts = 0;
                        return None;
                    }
                    continue;
                }
            };

            if self.buffer.len() < HEADER_SIZE + declared {
                return None;
            }

            self.buffer.advance(HEADER_SIZE);
            let payload = self.buffer.split_to(declared).to_vec();
            self.recovery_attempts = 0;
            return Some(RawFrame {
                frame_type,
                payload,
            });
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer and reset recovery state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.recovery_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FRAME_DATA, FRAME_HEARTBEAT, FRAME_STATUS_BROADCAST};

    #[test]
    fn test_encode_header_length_split() {
        let header = encode_header(FRAME_DATA, 300).expect("should encode");
        assert_eq!(header, [FRAME_DATA, 0, 0, 1, 44]);

        let header = encode_header(FRAME_HEARTBEAT, 0).expect("should encode");
        assert_eq!(header, [FRAME_HEARTBEAT, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_header() {
        let (frame_type, declared) =
            decode_header(&[FRAME_DATA, 0, 0, 1, 44]).expect("should decode");
        assert_eq!(frame_type, FRAME_DATA);
        assert_eq!(declared, 300);

        assert!(matches!(
            decode_header(&[FRAME_DATA, 0, 0]),
            Err(PacketError::TooShort { .. })
        ));
        assert!(matches!(
            decode_header(&[FRAME_DATA, 0, 0, 0xFF, 0xFF]),
            Err(PacketError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_FRAME_PAYLOAD + 1];
        let err = encode_frame(FRAME_DATA, &payload).expect_err("should reject");
        assert_eq!(
            err,
            PacketError::InvalidLength {
                declared: MAX_FRAME_PAYLOAD + 1,
                max: MAX_FRAME_PAYLOAD,
            }
        );
    }

    #[test]
    fn test_feed_round_trip() {
        let mut codec = FrameCodec::new();

        let payload = b"\x01\x02\x03\x04";
        let encoded = encode_frame(FRAME_DATA, payload).expect("should encode");

        let frames = codec.feed(&encoded);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FRAME_DATA);
        assert_eq!(frames[0].payload, payload);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_feed_empty_payload_frame() {
        let mut codec = FrameCodec::new();

        let encoded = encode_frame(FRAME_HEARTBEAT, &[]).expect("should encode");
        let frames = codec.feed(&encoded);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FRAME_HEARTBEAT);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn test_feed_partial_then_rest() {
        let mut codec = FrameCodec::new();

        let encoded = encode_frame(FRAME_STATUS_BROADCAST, b"status-bytes").expect("should encode");

        // Header split across two feeds, then payload.
        assert!(codec.feed(&encoded[..3]).is_empty());
        assert!(codec.feed(&encoded[3..8]).is_empty());
        let frames = codec.feed(&encoded[8..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"status-bytes");
    }

    #[test]
    fn test_feed_chunking_invariance() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_frame(FRAME_DATA, b"one").expect("should encode"));
        stream.extend_from_slice(&encode_frame(FRAME_HEARTBEAT, &[]).expect("should encode"));
        stream.extend_from_slice(&encode_frame(FRAME_STATUS_BROADCAST, b"two").expect("should encode"));

        let mut whole = FrameCodec::new();
        let expected = whole.feed(&stream);
        assert_eq!(expected.len(), 3);

        let mut trickle = FrameCodec::new();
        let mut got = Vec::new();
        for byte in &stream {
            got.extend(trickle.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(got, expected);
        assert_eq!(trickle.buffered_len(), 0);
    }

    #[test]
    fn test_corrupt_header_recovery() {
        let mut codec = FrameCodec::new();

        // Two bogus headers each declaring 65535 bytes, then a real frame.
        let mut stream = vec![0xFF; 2 * HEADER_SIZE];
        stream.extend_from_slice(&encode_frame(FRAME_DATA, b"ok").expect("should encode"));

        let frames = codec.feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"ok");
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_adversarial_stream_stays_bounded() {
        let mut codec = FrameCodec::new();

        // 10,000 headers all claiming oversized payloads. None may buffer.
        let mut stream = Vec::with_capacity(10_000 * HEADER_SIZE);
        for _ in 0..10_000 {
            stream.extend_from_slice(&[FRAME_DATA, 0, 0, 0xFF, 0xFF]);
        }

        let frames = codec.feed(&stream);
        assert!(frames.is_empty());
        assert!(codec.buffered_len() < HEADER_SIZE);

        // The codec must still accept a valid frame afterwards.
        let frames = codec.feed(&encode_frame(FRAME_DATA, b"after").expect("should encode"));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"after");
    }
}
