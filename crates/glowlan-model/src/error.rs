//! Model loading and validation errors.

use thiserror::Error;

/// Errors raised while loading or validating the home model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file does not match the schema.
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Two devices share an id.
    #[error("duplicate device id {id}")]
    DuplicateDevice {
        /// The id defined twice.
        id: u8,
    },

    /// Two groups share an id.
    #[error("duplicate group id {id}")]
    DuplicateGroup {
        /// The id defined twice.
        id: u8,
    },

    /// A group lists a device the device table does not define.
    #[error("group {group} references unknown device {device}")]
    UnknownMember {
        /// Group with the dangling reference.
        group: u8,
        /// Device id that is not in the table.
        device: u8,
    },
}
