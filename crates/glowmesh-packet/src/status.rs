//! Status and mesh-info decoding.
//!
//! Two packed struct layouts appear on the wire, one per firmware
//! generation. Device-info (`0x43`) reports pack 19-byte structs from the
//! start of the frame payload; mesh-info replies (opcode `0x52` in a
//! data-channel or status-broadcast body) pack 24-byte structs after a
//! two-byte opcode/count prefix. The layouts are not interchangeable.
//!
//! Both decoders drop a truncated trailing struct silently; a short tail
//! never poisons the records before it.

use serde::{Deserialize, Serialize};

use crate::OP_MESH_INFO;

/// Size of one packed struct in a device-info report.
pub const DEVICE_INFO_RECORD_LEN: usize = 19;
/// Size of one packed struct in a mesh-info reply body.
pub const MESH_INFO_RECORD_LEN: usize = 24;

// Temperature byte written when a record carries an RGB triplet. Any value
// above 100 has the same meaning on decode.
const RGB_SENTINEL: u8 = 0xFF;

/// Color state of a lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    /// Tunable white; raw temperature byte, 0–100.
    White {
        /// Warm-to-cool position as the firmware reports it.
        temp: u8,
    },
    /// Full color triplet.
    Rgb {
        /// Red channel.
        r: u8,
        /// Green channel.
        g: u8,
        /// Blue channel.
        b: u8,
    },
}

/// One device's state as extracted from a status frame.
///
/// Records replace any previous state wholesale; there is no partial merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatusRecord {
    /// Mesh-local device id.
    pub device_id: u8,
    /// Whether the mesh currently sees the device.
    pub online: bool,
    /// On/off state.
    pub on: bool,
    /// Brightness 0–100; out-of-range raw bytes are clamped.
    pub brightness: u8,
    /// White temperature or RGB color.
    pub mode: ColorMode,
}

/// Decode the packed 19-byte structs of a device-info (`0x43`) payload.
pub fn decode_device_info(payload: &[u8]) -> Vec<DeviceStatusRecord> {
    payload
        .chunks_exact(DEVICE_INFO_RECORD_LEN)
        .map(decode_device_info_record)
        .collect()
}

/// Decode a mesh-info reply body: `[0x52][count]` then 24-byte structs.
///
/// Returns `None` when the body does not start with the mesh-info opcode.
pub fn decode_mesh_info(body: &[u8]) -> Option<Vec<DeviceStatusRecord>> {
    if body.len() < 2 || body[0] != OP_MESH_INFO {
        return None;
    }
    let count = body[1] as usize;
    Some(
        body[2..]
            .chunks_exact(MESH_INFO_RECORD_LEN)
            .take(count)
            .map(decode_mesh_info_record)
            .collect(),
    )
}

// 19-byte layout: id@0, online@3, on@8, brightness@12, temp@15, rgb@16..19.
fn decode_device_info_record(raw: &[u8]) -> DeviceStatusRecord {
    DeviceStatusRecord {
        device_id: raw[0],
        online: raw[3] != 0,
        on: raw[8] != 0,
        brightness: raw[12].min(100),
        mode: decode_color(raw[15], raw[16], raw[17], raw[18]),
    }
}

// 24-byte layout: id@0, online@5, on@9, brightness@13, temp@16, rgb@17..20.
fn decode_mesh_info_record(raw: &[u8]) -> DeviceStatusRecord {
    DeviceStatusRecord {
        device_id: raw[0],
        online: raw[5] != 0,
        on: raw[9] != 0,
        brightness: raw[13].min(100),
        mode: decode_color(raw[16], raw[17], raw[18], raw[19]),
    }
}

// A temperature byte above 100 means the next three bytes are RGB.
fn decode_color(temp: u8, r: u8, g: u8, b: u8) -> ColorMode {
    if temp > 100 {
        ColorMode::Rgb { r, g, b }
    } else {
        ColorMode::White { temp }
    }
}

/// Encode one 19-byte device-info struct. Counterpart of
/// [`decode_device_info`], used when simulating devices.
pub fn encode_device_info_record(record: &DeviceStatusRecord) -> [u8; DEVICE_INFO_RECORD_LEN] {
    let mut raw = [0u8; DEVICE_INFO_RECORD_LEN];
    raw[0] = record.device_id;
    raw[3] = u8::from(record.online);
    raw[8] = u8::from(record.on);
    raw[12] = record.brightness;
    match record.mode {
        ColorMode::White { temp } => raw[15] = temp,
        ColorMode::Rgb { r, g, b } => {
            raw[15] = RGB_SENTINEL;
            raw[16] = r;
            raw[17] = g;
            raw[18] = b;
        }
    }
    raw
}

/// Encode one 24-byte mesh-info struct.
pub fn encode_mesh_info_record(record: &DeviceStatusRecord) -> [u8; MESH_INFO_RECORD_LEN] {
    let mut raw = [0u8; MESH_INFO_RECORD_LEN];
    raw[0] = record.device_id;
    raw[5] = u8::from(record.online);
    raw[9] = u8::from(record.on);
    raw[13] = record.brightness;
    match record.mode {
        ColorMode::White { temp } => raw[16] = temp,
        ColorMode::Rgb { r, g, b } => {
            raw[16] = RGB_SENTINEL;
            raw[17] = r;
            raw[18] = g;
            raw[19] = b;
        }
    }
    raw
}

/// Encode a complete mesh-info reply body.
pub fn encode_mesh_info(records: &[DeviceStatusRecord]) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + records.len() * MESH_INFO_RECORD_LEN);
    body.push(OP_MESH_INFO);
    body.push(records.len() as u8);
    for record in records {
        body.extend_from_slice(&encode_mesh_info_record(record));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_record(device_id: u8) -> DeviceStatusRecord {
        DeviceStatusRecord {
            device_id,
            online: true,
            on: true,
            brightness: 80,
            mode: ColorMode::White { temp: 42 },
        }
    }

    fn rgb_record(device_id: u8) -> DeviceStatusRecord {
        DeviceStatusRecord {
            device_id,
            online: true,
            on: false,
            brightness: 25,
            mode: ColorMode::Rgb { r: 10, g: 20, b: 30 },
        }
    }

    #[test]
    fn test_device_info_two_records() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&encode_device_info_record(&white_record(1)));
        payload.extend_from_slice(&encode_device_info_record(&rgb_record(2)));

        let records = decode_device_info(&payload);
        assert_eq!(records, vec![white_record(1), rgb_record(2)]);
    }

    #[test]
    fn test_device_info_truncated_tail_dropped() {
        let mut payload = encode_device_info_record(&white_record(9)).to_vec();
        payload.extend_from_slice(&[0xEE; 7]);

        let records = decode_device_info(&payload);
        assert_eq!(records, vec![white_record(9)]);
    }

    #[test]
    fn test_device_info_empty_payload() {
        assert!(decode_device_info(&[]).is_empty());
    }

    #[test]
    fn test_brightness_clamped() {
        let mut raw = encode_device_info_record(&white_record(1));
        raw[12] = 180;
        let records = decode_device_info(&raw);
        assert_eq!(records[0].brightness, 100);
    }

    #[test]
    fn test_temp_above_100_selects_rgb() {
        let mut raw = encode_device_info_record(&white_record(1));
        raw[15] = 101;
        raw[16] = 7;
        raw[17] = 8;
        raw[18] = 9;
        let records = decode_device_info(&raw);
        assert_eq!(records[0].mode, ColorMode::Rgb { r: 7, g: 8, b: 9 });
    }

    #[test]
    fn test_mesh_info_round_trip() {
        let expected = vec![white_record(1), rgb_record(2), white_record(3)];
        let body = encode_mesh_info(&expected);

        let records = decode_mesh_info(&body).expect("should decode");
        assert_eq!(records, expected);
    }

    #[test]
    fn test_mesh_info_rejects_other_opcodes() {
        assert!(decode_mesh_info(&[]).is_none());
        assert!(decode_mesh_info(&[0xD0, 0x01, 0x00]).is_none());
    }

    #[test]
    fn test_mesh_info_truncated_struct_dropped() {
        let mut body = encode_mesh_info(&[white_record(1), white_record(2)]);
        body.truncate(2 + MESH_INFO_RECORD_LEN + 10);

        let records = decode_mesh_info(&body).expect("should decode");
        assert_eq!(records, vec![white_record(1)]);
    }

    #[test]
    fn test_mesh_info_count_caps_records() {
        let mut body = encode_mesh_info(&[white_record(1), white_record(2)]);
        body[1] = 1;

        let records = decode_mesh_info(&body).expect("should decode");
        assert_eq!(records, vec![white_record(1)]);
    }
}
