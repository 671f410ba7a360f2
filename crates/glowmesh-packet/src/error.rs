//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding Glowmesh frames and packets.
///
/// Checksum mismatches are deliberately not an error: the codec records them
/// on the decoded segment (`checksum_valid`) and leaves the policy to the
/// caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Input ends before the structure it claims to hold.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum length the structure requires.
        expected: usize,
        /// Length actually available.
        actual: usize,
    },

    /// Declared payload length exceeds the protocol cap.
    #[error("invalid declared length {declared} (cap {max})")]
    InvalidLength {
        /// Length the header declares.
        declared: usize,
        /// Hard cap on payload length.
        max: usize,
    },

    /// A 0x7E-delimited inner segment has fewer than two marker bytes.
    #[error("inner segment markers missing")]
    MissingMarkers,
}

impl PacketError {
    /// Shorthand for a [`PacketError::TooShort`].
    pub fn too_short(expected: usize, actual: usize) -> Self {
        PacketError::TooShort { expected, actual }
    }
}
