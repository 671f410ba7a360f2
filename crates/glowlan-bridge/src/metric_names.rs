//! Metric names emitted through the `metrics` facade.
//!
//! The engine only records; installing a recorder (or none) is the
//! embedding application's choice.

/// Frames decoded from device sockets, any type.
pub const FRAMES_RECEIVED: &str = "glowlan_frames_received";
/// Frames written to device sockets, replies and commands alike.
pub const FRAMES_SENT: &str = "glowlan_frames_sent";
/// Inner segments whose checksum did not match; such segments are ignored.
pub const CHECKSUM_FAILURES: &str = "glowlan_checksum_failures";
/// Frames with a type byte outside the known set.
pub const UNKNOWN_FRAMES: &str = "glowlan_unknown_frames";
/// Identical re-sends of unacknowledged command frames.
pub const COMMAND_RETRIES: &str = "glowlan_command_retries";
/// Pending commands evicted without an acknowledgement.
pub const COMMAND_TIMEOUTS: &str = "glowlan_command_timeouts";
/// Commands resolved by a device acknowledgement.
pub const COMMANDS_ACKED: &str = "glowlan_commands_acked";
/// Queue commands that resolved with an error.
pub const COMMANDS_FAILED: &str = "glowlan_commands_failed";
/// Currently connected device sessions.
pub const ACTIVE_SESSIONS: &str = "glowlan_active_sessions";
/// Connections refused because the session limit was reached.
pub const SESSIONS_REFUSED: &str = "glowlan_sessions_refused";
