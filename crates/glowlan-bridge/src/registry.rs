//! Shared cross-session state.
//!
//! One registry per bridge: the static home model, the last reported record
//! per device, and which live session can reach which device. Everything
//! mutable sits behind one lock with narrow accessors; callers must not
//! assume atomicity across two calls.

use std::collections::HashMap;

use glowlan_model::BridgeConfig;
use glowmesh_packet::{ColorMode, DeviceStatusRecord};
use parking_lot::RwLock;

use crate::session::SessionHandle;

#[derive(Default)]
struct RegistryInner {
    /// Last record per device id, reported or optimistic.
    statuses: HashMap<u8, DeviceStatusRecord>,
    /// Session that last reported each device.
    routes: HashMap<u8, u64>,
    /// Every controllable session, by session id.
    sessions: HashMap<u64, SessionHandle>,
}

/// Process-wide view of the mesh.
pub struct Registry {
    model: BridgeConfig,
    inner: RwLock<RegistryInner>,
}

impl Registry {
    /// Registry over a loaded home model.
    pub fn new(model: BridgeConfig) -> Self {
        Registry {
            model,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// The static home model.
    pub fn model(&self) -> &BridgeConfig {
        &self.model
    }

    /// Last cached record for a device, if it ever reported.
    pub fn status(&self, device_id: u8) -> Option<DeviceStatusRecord> {
        self.inner.read().statuses.get(&device_id).copied()
    }

    /// Cached record, or an offline default for a device never seen.
    pub fn status_or_default(&self, device_id: u8) -> DeviceStatusRecord {
        self.status(device_id).unwrap_or(DeviceStatusRecord {
            device_id,
            online: false,
            on: false,
            brightness: 0,
            mode: ColorMode::White { temp: 0 },
        })
    }

    /// Store a record wholesale. Returns the record it replaced so callers
    /// can detect availability transitions.
    pub fn update_status(&self, record: DeviceStatusRecord) -> Option<DeviceStatusRecord> {
        self.inner.write().statuses.insert(record.device_id, record)
    }

    /// Register a controllable session.
    pub fn record_session(&self, handle: SessionHandle) {
        self.inner.write().sessions.insert(handle.session_id(), handle);
    }

    /// Remember that `session_id` last reported `device_id`.
    pub fn record_route(&self, device_id: u8, session_id: u64) {
        self.inner.write().routes.insert(device_id, session_id);
    }

    /// Session that last reported the device, if it is still registered.
    pub fn route(&self, device_id: u8) -> Option<SessionHandle> {
        let inner = self.inner.read();
        inner
            .routes
            .get(&device_id)
            .and_then(|session_id| inner.sessions.get(session_id))
            .cloned()
    }

    /// Any controllable session. Used when a target has no route of its
    /// own; any endpoint can address the whole mesh.
    pub fn any_session(&self) -> Option<SessionHandle> {
        self.inner.read().sessions.values().next().cloned()
    }

    /// Number of controllable sessions.
    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Forget a session and every route pointing at it.
    pub fn drop_session(&self, session_id: u64) {
        let mut inner = self.inner.write();
        inner.sessions.remove(&session_id);
        inner.routes.retain(|_, routed| *routed != session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRequest;
    use tokio::sync::mpsc;

    fn handle(session_id: u64) -> (SessionHandle, mpsc::Receiver<SessionRequest>) {
        let (tx, rx) = mpsc::channel(8);
        (SessionHandle::new(session_id, tx), rx)
    }

    fn record(device_id: u8, online: bool) -> DeviceStatusRecord {
        DeviceStatusRecord {
            device_id,
            online,
            on: false,
            brightness: 0,
            mode: ColorMode::White { temp: 0 },
        }
    }

    #[test]
    fn test_update_status_returns_previous() {
        let registry = Registry::new(BridgeConfig::default());
        assert_eq!(registry.update_status(record(1, false)), None);
        assert_eq!(
            registry.update_status(record(1, true)),
            Some(record(1, false))
        );
        assert_eq!(registry.status(1), Some(record(1, true)));
        assert_eq!(registry.status(2), None);
    }

    #[test]
    fn test_default_record_is_offline() {
        let registry = Registry::new(BridgeConfig::default());
        let record = registry.status_or_default(9);
        assert_eq!(record.device_id, 9);
        assert!(!record.online);
        assert!(!record.on);
    }

    #[test]
    fn test_route_follows_last_reporter() {
        let registry = Registry::new(BridgeConfig::default());
        let (first, _rx1) = handle(1);
        let (second, _rx2) = handle(2);
        registry.record_session(first);
        registry.record_session(second);

        registry.record_route(7, 1);
        assert_eq!(registry.route(7).map(|h| h.session_id()), Some(1));

        registry.record_route(7, 2);
        assert_eq!(registry.route(7).map(|h| h.session_id()), Some(2));
    }

    #[test]
    fn test_drop_session_clears_routes() {
        let registry = Registry::new(BridgeConfig::default());
        let (only, _rx) = handle(5);
        registry.record_session(only);
        registry.record_route(7, 5);

        registry.drop_session(5);
        assert!(registry.route(7).is_none());
        assert!(registry.any_session().is_none());
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_route_to_unregistered_session_is_none() {
        let registry = Registry::new(BridgeConfig::default());
        registry.record_route(7, 99);
        assert!(registry.route(7).is_none());
    }
}
