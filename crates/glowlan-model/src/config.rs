//! Bridge configuration, loaded once at startup.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DeviceEntry, Group, ModelError};

/// Network tunables for the TCP listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the bridge listens on.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Sessions accepted at once; connections beyond this are refused.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Close a session after this long without any inbound frame (seconds).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_bind() -> SocketAddr {
    // The vendor cloud port; devices are steered here by DNS override.
    SocketAddr::from(([0, 0, 0, 0], 8899))
}

fn default_max_sessions() -> usize {
    16
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// Set the listen address.
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Set the session cap.
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Idle window as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Reliability tunables for outbound commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Resend attempts per command after the initial send.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Resend spacing in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Hard limit waiting for an ack, in seconds. Applies regardless of the
    /// retry budget.
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_interval_ms() -> u64 {
    500
}

fn default_ack_timeout_secs() -> u64 {
    30
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            max_retries: default_max_retries(),
            retry_interval_ms: default_retry_interval_ms(),
            ack_timeout_secs: default_ack_timeout_secs(),
        }
    }
}

impl ProtocolConfig {
    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the resend spacing.
    pub fn with_retry_interval_ms(mut self, retry_interval_ms: u64) -> Self {
        self.retry_interval_ms = retry_interval_ms;
        self
    }

    /// Set the hard ack timeout.
    pub fn with_ack_timeout_secs(mut self, ack_timeout_secs: u64) -> Self {
        self.ack_timeout_secs = ack_timeout_secs;
        self
    }

    /// Resend spacing as a [`Duration`].
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Ack timeout as a [`Duration`].
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

/// Top-level bridge configuration: tunables plus the static home model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// TCP listener tunables.
    #[serde(default)]
    pub server: ServerConfig,

    /// Command reliability tunables.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Device table.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,

    /// Group table.
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl BridgeConfig {
    /// Load and validate a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse and validate a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ModelError> {
        let config: BridgeConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a device by mesh-local id.
    pub fn device(&self, id: u8) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Look up a group by mesh-local id.
    pub fn group(&self, id: u8) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Reject duplicate ids and dangling group members.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut device_ids = HashSet::new();
        for device in &self.devices {
            if !device_ids.insert(device.id) {
                return Err(ModelError::DuplicateDevice { id: device.id });
            }
        }

        let mut group_ids = HashSet::new();
        for group in &self.groups {
            if !group_ids.insert(group.id) {
                return Err(ModelError::DuplicateGroup { id: group.id });
            }
            for member in &group.members {
                if !device_ids.contains(member) {
                    return Err(ModelError::UnknownMember {
                        group: group.id,
                        device: *member,
                    });
                }
            }
        }

        Ok(())
    }
}
