//! Home model and configuration for the Glowlan bridge.
//!
//! The bridge is configured once at startup from a single YAML file holding
//! the network tunables plus the static home model: which device ids exist
//! behind the mesh, what kind of hardware each one is, and how they group.
//!
//! ```yaml
//! server:
//!   bind: "0.0.0.0:8899"
//!   max_sessions: 16
//! protocol:
//!   max_retries: 3
//!   retry_interval_ms: 500
//! devices:
//!   - { id: 1, name: "Ceiling left", kind: bulb }
//!   - { id: 2, name: "Ceiling right", kind: bulb }
//!   - { id: 7, name: "Wall switch", kind: switch }
//! groups:
//!   - { id: 1, name: "Living room", members: [1, 2, 7] }
//!   - { id: 9, name: "Evening scene", members: [1], is_subgroup: true }
//! ```

mod config;
mod device;
mod error;
mod group;

pub use config::*;
pub use device::*;
pub use error::*;
pub use group::*;
