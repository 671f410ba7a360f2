//! TCP accept loop.
//!
//! Devices are steered here by a DNS override for the vendor cloud host.
//! Each accepted connection runs its own [`DeviceSession`] task; the
//! server only counts them and enforces the session cap.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::BridgeError;
use crate::metric_names;
use crate::publish::StatePublisher;
use crate::registry::Registry;
use crate::session::DeviceSession;

/// Listener spawning one session per device connection.
pub struct BridgeServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    publisher: Arc<dyn StatePublisher>,
    next_session_id: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl BridgeServer {
    /// Bind the address from the model.
    pub async fn bind(
        registry: Arc<Registry>,
        publisher: Arc<dyn StatePublisher>,
    ) -> Result<Self, BridgeError> {
        let bind = registry.model().server.bind;
        let listener = TcpListener::bind(bind).await?;
        info!(addr = %listener.local_addr()?, "listening for devices");
        Ok(BridgeServer {
            listener,
            registry,
            publisher,
            next_session_id: AtomicU64::new(1),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound. Differs from the model when it asks for
    /// port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until the shutdown signal flips.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), BridgeError> {
        let max_sessions = self.registry.model().server.max_sessions;
        let idle_timeout = self.registry.model().server.idle_timeout();
        let protocol = self.registry.model().protocol.clone();
        let mut shutdown_rx = shutdown.clone();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                            continue;
                        }
                    };
                    if self.active.load(Ordering::SeqCst) >= max_sessions {
                        metrics::counter!(metric_names::SESSIONS_REFUSED).increment(1);
                        warn!(peer = %peer, max_sessions, "session limit reached, refusing");
                        drop(stream);
                        continue;
                    }
                    let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
                    let (session, requests) = DeviceSession::new(
                        session_id,
                        peer,
                        protocol.clone(),
                        idle_timeout,
                        Arc::clone(&self.registry),
                        Arc::clone(&self.publisher),
                    );
                    let active = Arc::clone(&self.active);
                    let count = active.fetch_add(1, Ordering::SeqCst) + 1;
                    metrics::gauge!(metric_names::ACTIVE_SESSIONS).set(count as f64);
                    info!(session = session_id, peer = %peer, active = count, "device connected");
                    let session_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        session.run(stream, requests, session_shutdown).await;
                        let count = active.fetch_sub(1, Ordering::SeqCst) - 1;
                        metrics::gauge!(metric_names::ACTIVE_SESSIONS).set(count as f64);
                    });
                }
                _ = shutdown_rx.changed() => {
                    info!("accept loop stopping");
                    break;
                }
            }
        }
        Ok(())
    }
}
