//! LAN bridge engine for Glowmesh smart lighting.
//!
//! The bridge impersonates the vendor cloud on the local network: devices
//! are pointed at it by a DNS override, connect over plain TCP, and get
//! served the handshake and acknowledgement flow the real backend would
//! run. In return the bridge can observe every status report and inject
//! its own commands, with no cloud round trip and no internet dependency.
//!
//! The engine has three seams. A YAML home model describes the devices
//! and groups behind each mesh ([`glowlan_model`]). State flows out
//! through a [`StatePublisher`]. Callers drive devices by submitting
//! [`DeviceRequest`]s to the [`CommandQueue`], which keeps the flaky
//! vendor firmware happy by never letting two commands overlap.

use std::sync::Arc;

use glowlan_model::BridgeConfig;

mod error;
mod groups;
pub mod metric_names;
mod publish;
mod queue;
mod registry;
mod server;
mod session;

pub use error::*;
pub use groups::*;
pub use publish::*;
pub use queue::*;
pub use registry::*;
pub use server::*;
pub use session::*;

/// One assembled bridge: the shared registry, the outbound publisher, and
/// the command lane.
pub struct Bridge {
    registry: Arc<Registry>,
    publisher: Arc<dyn StatePublisher>,
    queue: CommandQueue,
}

impl Bridge {
    /// Assemble a bridge over a loaded model. Spawns the queue worker, so
    /// a Tokio runtime must already be running.
    pub fn new(model: BridgeConfig, publisher: Arc<dyn StatePublisher>) -> Self {
        let registry = Arc::new(Registry::new(model));
        let queue = CommandQueue::start(Arc::clone(&registry), Arc::clone(&publisher));
        Bridge {
            registry,
            publisher,
            queue,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Bind the device listener configured in the model.
    pub async fn bind(&self) -> Result<BridgeServer, BridgeError> {
        BridgeServer::bind(Arc::clone(&self.registry), Arc::clone(&self.publisher)).await
    }
}
