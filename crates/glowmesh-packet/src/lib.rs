//! Glowmesh cloud protocol
//!
//! This crate implements the binary protocol Glowmesh Wi-Fi devices (bulbs,
//! plugs, switches, wall controllers) speak to the vendor cloud. A LAN bridge
//! that impersonates the cloud endpoint uses it to frame, decode, and build
//! the packets devices emit over a plain TCP socket.
//!
//! # Protocol Overview
//!
//! Every message on the wire is a frame: a 5-byte header followed by a
//! payload whose length the header declares.
//!
//! ```text
//! +------+----------+----------+------------+--------------------+
//! | type | reserved | reserved | len_mult   | len_base           |
//! +------+----------+----------+------------+--------------------+
//! | payload[0..len_mult*256 + len_base]                          |
//! +--------------------------------------------------------------+
//! ```
//!
//! Five request types exist: handshake (0x23), device-info (0x43),
//! data-channel (0x73), status-broadcast (0x83), and heartbeat (0xD3). Each
//! acks at `request + 0x05`. Data-channel and status-broadcast payloads
//! carry an inner segment delimited by `0x7E` markers and protected by an
//! additive checksum; the other types are flat.
//!
//! # Example
//!
//! ```rust,ignore
//! use glowmesh_packet::{FrameCodec, Packet};
//!
//! let mut codec = FrameCodec::new();
//! for frame in codec.feed(&received) {
//!     let packet = Packet::decode(&frame)?;
//!     // dispatch on the packet variant
//! }
//! ```
//!
//! The protocol gives no delivery guarantees of its own; reliability
//! (retries, dedup, timeouts) is built above this crate.

mod codec;
mod commands;
mod constants;
mod error;
mod frame;
mod status;

pub use codec::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use status::*;
