//! Engine error types.
//!
//! Wire-level decode errors live in `glowmesh-packet`; this module covers
//! the command pipeline and server startup. Command failures reach only the
//! submitter of that command, never other sessions or queued commands.

use thiserror::Error;

/// Terminal outcome of a submitted command that did not succeed.
///
/// Every command handed to the engine resolves exactly once: `Ok(())` when
/// the device acknowledges it, or one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No controllable session is available for the target.
    #[error("no controllable session for the target")]
    NotControllable,

    /// Writing the encoded frame to the socket failed. Not retried.
    #[error("send failed: {reason}")]
    SendFailed {
        /// I/O error text from the failed write.
        reason: String,
    },

    /// The device never acknowledged the frame within the retry budget.
    #[error("no acknowledgement before timeout")]
    AckTimeout,

    /// The session closed while the command was queued or in flight.
    #[error("session closed")]
    SessionClosed,
}

/// Startup and accept-loop failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Home model could not be loaded or validated.
    #[error("model error: {0}")]
    Model(#[from] glowlan_model::ModelError),

    /// Listener-level I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        assert_eq!(
            CommandError::SendFailed {
                reason: "broken pipe".into()
            }
            .to_string(),
            "send failed: broken pipe"
        );
        assert_eq!(
            CommandError::AckTimeout.to_string(),
            "no acknowledgement before timeout"
        );
    }
}
