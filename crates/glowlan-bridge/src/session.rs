//! Per-connection device session.
//!
//! Every accepted socket gets one `DeviceSession`. The session runs the
//! handshake, acknowledges whatever the device sends, tracks outbound
//! commands until their echo comes back, and retries on a fixed budget.
//! The rest of the bridge only ever talks to a session through its
//! [`SessionHandle`].

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glowlan_model::ProtocolConfig;
use glowmesh_packet::{
    decode_device_info, decode_mesh_info, DataSegment, DeviceCommand, DeviceStatusRecord,
    FrameCodec, Packet, ENDPOINT_LEN,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::WriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::error::CommandError;
use crate::metric_names;
use crate::publish::StatePublisher;
use crate::registry::Registry;

/// How often the session checks its pending commands and idle clock.
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Requests accepted by a running session.
#[derive(Debug)]
pub enum SessionRequest {
    /// Queue a command for the mesh behind this connection.
    SendCommand {
        /// Command to transmit.
        command: DeviceCommand,
        /// Resolved once the device acks, or with the failure reason.
        reply: oneshot::Sender<Result<(), CommandError>>,
    },
    /// Close the connection.
    Shutdown,
}

/// Cheap cloneable address of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: u64,
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    pub(crate) fn new(session_id: u64, tx: mpsc::Sender<SessionRequest>) -> Self {
        SessionHandle { session_id, tx }
    }

    /// Identifier of the session behind this handle.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Queue a command and wait for the device acknowledgement.
    pub async fn send_command(&self, command: DeviceCommand) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::SendCommand { command, reply })
            .await
            .map_err(|_| CommandError::SessionClosed)?;
        rx.await.map_err(|_| CommandError::SessionClosed)?
    }

    /// Ask the session to close its connection.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionRequest::Shutdown).await;
    }
}

/// Lifecycle of a device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, nothing received yet.
    Connecting,
    /// Bytes seen, handshake frame still outstanding.
    Handshaking,
    /// Queue id assigned, reachability unproven.
    Assigned,
    /// Device answers on its queue id; commands may flow.
    Controllable,
    /// Teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::Assigned => "assigned",
            SessionState::Controllable => "controllable",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// An unacknowledged transmission.
struct PendingCommand {
    /// Encoded frame, resent verbatim on retry.
    raw: Vec<u8>,
    command: DeviceCommand,
    created_at: Instant,
    last_sent_at: Instant,
    retry_count: u32,
    max_retries: u32,
    resolver: oneshot::Sender<Result<(), CommandError>>,
}

/// Message id source. The wire field is u16 but ids stay in the low byte,
/// wrapping and skipping anything still awaiting an ack.
struct MsgIdAllocator {
    next: u8,
}

impl MsgIdAllocator {
    fn new() -> Self {
        MsgIdAllocator {
            next: rand::random(),
        }
    }

    fn allocate(&mut self, pending: &HashMap<u16, PendingCommand>) -> u16 {
        loop {
            let id = u16::from(self.next);
            self.next = self.next.wrapping_add(1);
            if !pending.contains_key(&id) {
                return id;
            }
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// State machine for one device connection.
pub struct DeviceSession {
    session_id: u64,
    peer: SocketAddr,
    state: SessionState,
    /// Queue id from the first handshake. Repeat handshakes do not move it.
    queue_id: Option<[u8; ENDPOINT_LEN]>,
    /// Msg id of the reachability probe sent after the handshake.
    probe_msg_id: Option<u16>,
    pending: HashMap<u16, PendingCommand>,
    last_activity: Instant,
    msg_ids: MsgIdAllocator,
    config: ProtocolConfig,
    idle_timeout: Duration,
    handle: SessionHandle,
    registry: Arc<Registry>,
    publisher: Arc<dyn StatePublisher>,
}

impl DeviceSession {
    /// Session over a fresh connection. The returned receiver feeds
    /// [`DeviceSession::run`].
    pub fn new(
        session_id: u64,
        peer: SocketAddr,
        config: ProtocolConfig,
        idle_timeout: Duration,
        registry: Arc<Registry>,
        publisher: Arc<dyn StatePublisher>,
    ) -> (Self, mpsc::Receiver<SessionRequest>) {
        let (tx, rx) = mpsc::channel(256);
        let handle = SessionHandle::new(session_id, tx);
        let session = DeviceSession {
            session_id,
            peer,
            state: SessionState::Connecting,
            queue_id: None,
            probe_msg_id: None,
            pending: HashMap::new(),
            last_activity: Instant::now(),
            msg_ids: MsgIdAllocator::new(),
            config,
            idle_timeout,
            handle,
            registry,
            publisher,
        };
        (session, rx)
    }

    /// Handle for queueing commands into this session.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn queue_id(&self) -> Option<[u8; ENDPOINT_LEN]> {
        self.queue_id
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drive the state machine with one decoded frame. Returns the frames
    /// to write back on the same connection.
    pub fn on_packet(&mut self, packet: Packet) -> Vec<Packet> {
        self.last_activity = Instant::now();
        metrics::counter!(metric_names::FRAMES_RECEIVED).increment(1);
        match packet {
            Packet::Handshake { queue_id, blob: _ } => {
                if matches!(
                    self.state,
                    SessionState::Assigned | SessionState::Controllable
                ) {
                    // Devices re-handshake after wifi hiccups. Keep the
                    // original queue id and just ack again.
                    debug!(
                        session = self.session_id,
                        queue_id = %hex::encode(queue_id),
                        "repeat handshake"
                    );
                    return vec![Packet::HandshakeAck];
                }
                self.queue_id = Some(queue_id);
                self.state = SessionState::Assigned;
                info!(
                    session = self.session_id,
                    peer = %self.peer,
                    queue_id = %hex::encode(queue_id),
                    "device handshake"
                );
                let mut replies = vec![Packet::HandshakeAck];
                if let Some(probe) = self.register_probe() {
                    replies.push(probe);
                }
                replies
            }
            Packet::Heartbeat => vec![Packet::HeartbeatAck],
            Packet::DeviceInfo { payload } => {
                let records = decode_device_info(&payload);
                self.mark_controllable();
                self.apply_records(&records);
                vec![Packet::DeviceInfoAck]
            }
            Packet::Data(segment) => self.on_segment(segment, true),
            Packet::StatusBroadcast(segment) => self.on_segment(segment, false),
            Packet::DataAck { msg_id, .. } => {
                self.on_ack(msg_id);
                Vec::new()
            }
            Packet::Unknown {
                frame_type,
                payload,
            } => {
                metrics::counter!(metric_names::UNKNOWN_FRAMES).increment(1);
                debug!(
                    session = self.session_id,
                    frame_type = %format!("{frame_type:#04x}"),
                    len = payload.len(),
                    "unknown frame dropped"
                );
                Vec::new()
            }
            other => {
                // Server-role frames a device should never originate.
                debug!(
                    session = self.session_id,
                    frame_type = %format!("{:#04x}", other.frame_type()),
                    "unexpected server frame dropped"
                );
                Vec::new()
            }
        }
    }

    /// One data or status segment. Valid segments always get an echo ack;
    /// segments with a bad checksum get nothing at all.
    fn on_segment(&mut self, segment: DataSegment, data_channel: bool) -> Vec<Packet> {
        if !segment.checksum_valid {
            metrics::counter!(metric_names::CHECKSUM_FAILURES).increment(1);
            warn!(
                session = self.session_id,
                msg_id = segment.msg_id,
                body = %hex::encode(&segment.body),
                "segment checksum mismatch, dropping"
            );
            return Vec::new();
        }
        // A reply reusing a pending msg id is the device's acknowledgement.
        if self.pending.contains_key(&segment.msg_id) {
            self.on_ack(segment.msg_id);
        }
        if let Some(records) = decode_mesh_info(&segment.body) {
            self.mark_controllable();
            self.apply_records(&records);
        }
        let ack = if data_channel {
            Packet::DataAck {
                endpoint: segment.endpoint,
                msg_id: segment.msg_id,
            }
        } else {
            Packet::StatusBroadcastAck {
                endpoint: segment.endpoint,
                msg_id: segment.msg_id,
            }
        };
        vec![ack]
    }

    fn on_ack(&mut self, msg_id: u16) {
        let was_probe = self.probe_msg_id == Some(msg_id);
        if let Some(cmd) = self.pending.remove(&msg_id) {
            metrics::counter!(metric_names::COMMANDS_ACKED).increment(1);
            trace!(
                session = self.session_id,
                msg_id,
                command = ?cmd.command,
                "command acknowledged"
            );
            self.resolve(msg_id, cmd, Ok(()));
        }
        if was_probe {
            self.mark_controllable();
        }
    }

    fn resolve(&mut self, msg_id: u16, cmd: PendingCommand, result: Result<(), CommandError>) {
        if self.probe_msg_id == Some(msg_id) {
            self.probe_msg_id = None;
        }
        let _ = cmd.resolver.send(result);
    }

    /// Queue-id probe issued right after the handshake. Tracked like any
    /// command so the sweep retries it; nobody listens for its result.
    fn register_probe(&mut self) -> Option<Packet> {
        let queue_id = self.queue_id?;
        let msg_id = self.msg_ids.allocate(&self.pending);
        let packet = DeviceCommand::QueryMeshInfo.to_packet(queue_id, msg_id);
        let raw = match packet.encode() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(session = self.session_id, error = %err, "probe encode failed");
                return None;
            }
        };
        let (resolver, _) = oneshot::channel();
        let now = Instant::now();
        self.pending.insert(
            msg_id,
            PendingCommand {
                raw,
                command: DeviceCommand::QueryMeshInfo,
                created_at: now,
                last_sent_at: now,
                retry_count: 0,
                max_retries: self.config.max_retries,
                resolver,
            },
        );
        self.probe_msg_id = Some(msg_id);
        Some(packet)
    }

    /// First proof the device answers on its queue id.
    fn mark_controllable(&mut self) {
        if self.state != SessionState::Assigned {
            return;
        }
        self.state = SessionState::Controllable;
        self.registry.record_session(self.handle.clone());
        info!(
            session = self.session_id,
            peer = %self.peer,
            "session controllable"
        );
    }

    fn apply_records(&mut self, records: &[DeviceStatusRecord]) {
        for record in records {
            self.registry.record_route(record.device_id, self.session_id);
            let previous = self.registry.update_status(*record);
            self.publisher.publish(record.device_id, record);
            if previous.map(|p| p.online) != Some(record.online) {
                self.publisher
                    .publish_availability(record.device_id, record.online);
            }
        }
    }

    /// Encode and track a command. Returns the wire bytes, or resolves the
    /// reply immediately when the command cannot be sent at all.
    fn prepare_command(
        &mut self,
        command: DeviceCommand,
        resolver: oneshot::Sender<Result<(), CommandError>>,
    ) -> Option<(u16, Vec<u8>)> {
        let queue_id = match (self.state, self.queue_id) {
            (SessionState::Controllable, Some(queue_id)) => queue_id,
            _ => {
                let _ = resolver.send(Err(CommandError::NotControllable));
                return None;
            }
        };
        let msg_id = self.msg_ids.allocate(&self.pending);
        let raw = match command.to_packet(queue_id, msg_id).encode() {
            Ok(raw) => raw,
            Err(err) => {
                let _ = resolver.send(Err(CommandError::SendFailed {
                    reason: err.to_string(),
                }));
                return None;
            }
        };
        let now = Instant::now();
        self.pending.insert(
            msg_id,
            PendingCommand {
                raw: raw.clone(),
                command,
                created_at: now,
                last_sent_at: now,
                retry_count: 0,
                max_retries: self.config.max_retries,
                resolver,
            },
        );
        trace!(
            session = self.session_id,
            msg_id,
            command = ?command,
            "command queued"
        );
        Some((msg_id, raw))
    }

    /// The write failed before the device could ever ack.
    fn fail_send(&mut self, msg_id: u16, reason: &str) {
        if let Some(cmd) = self.pending.remove(&msg_id) {
            self.resolve(
                msg_id,
                cmd,
                Err(CommandError::SendFailed {
                    reason: reason.to_string(),
                }),
            );
        }
    }

    /// Retry due commands and evict the hopeless ones. Returns the raw
    /// frames to retransmit.
    pub fn sweep(&mut self, now: Instant) -> Vec<Vec<u8>> {
        let mut resend = Vec::new();
        let mut evict = Vec::new();
        for (msg_id, cmd) in self.pending.iter_mut() {
            if now.duration_since(cmd.created_at) >= self.config.ack_timeout() {
                evict.push(*msg_id);
                continue;
            }
            if now.duration_since(cmd.last_sent_at) < self.config.retry_interval() {
                continue;
            }
            if cmd.retry_count < cmd.max_retries {
                cmd.retry_count += 1;
                cmd.last_sent_at = now;
                metrics::counter!(metric_names::COMMAND_RETRIES).increment(1);
                debug!(
                    session = self.session_id,
                    msg_id = *msg_id,
                    attempt = cmd.retry_count,
                    "retrying command"
                );
                resend.push(cmd.raw.clone());
            } else {
                evict.push(*msg_id);
            }
        }
        for msg_id in evict {
            if let Some(cmd) = self.pending.remove(&msg_id) {
                metrics::counter!(metric_names::COMMAND_TIMEOUTS).increment(1);
                warn!(
                    session = self.session_id,
                    msg_id,
                    command = ?cmd.command,
                    "command never acknowledged, giving up"
                );
                self.resolve(msg_id, cmd, Err(CommandError::AckTimeout));
            }
        }
        resend
    }

    fn idle_expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_activity) >= self.idle_timeout
    }

    /// Fail everything in flight and deregister.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;
        // Deregister before failing the in-flight commands, so a caller woken
        // by the failure cannot route a fresh command back to this session.
        self.registry.drop_session(self.session_id);
        for (msg_id, cmd) in std::mem::take(&mut self.pending) {
            self.resolve(msg_id, cmd, Err(CommandError::SessionClosed));
        }
        self.state = SessionState::Closed;
        info!(session = self.session_id, peer = %self.peer, "session closed");
    }

    /// Own the connection until EOF, error, idle expiry, or shutdown.
    pub async fn run(
        mut self,
        mut stream: TcpStream,
        mut requests: mpsc::Receiver<SessionRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut codec = FrameCodec::new();
        let mut buf = [0u8; 2048];
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        let (mut reader, mut writer) = stream.split();

        'conn: loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            debug!(session = self.session_id, "connection closed by peer");
                            break;
                        }
                        Ok(n) => {
                            if self.state == SessionState::Connecting {
                                self.state = SessionState::Handshaking;
                            }
                            for frame in codec.feed(&buf[..n]) {
                                let packet = match Packet::decode(&frame) {
                                    Ok(packet) => packet,
                                    Err(err) => {
                                        debug!(
                                            session = self.session_id,
                                            error = %err,
                                            "undecodable frame dropped"
                                        );
                                        continue;
                                    }
                                };
                                let replies = self.on_packet(packet);
                                if let Err(err) =
                                    write_replies(&mut writer, self.session_id, &replies).await
                                {
                                    warn!(session = self.session_id, error = %err, "write failed");
                                    break 'conn;
                                }
                            }
                        }
                        Err(err) => {
                            warn!(session = self.session_id, error = %err, "read failed");
                            break;
                        }
                    }
                }
                request = requests.recv() => {
                    match request {
                        Some(SessionRequest::SendCommand { command, reply }) => {
                            if let Some((msg_id, raw)) = self.prepare_command(command, reply) {
                                if let Err(err) = send_frame(&mut writer, &raw).await {
                                    self.fail_send(msg_id, &err.to_string());
                                    warn!(
                                        session = self.session_id,
                                        error = %err,
                                        "command write failed"
                                    );
                                    break;
                                }
                            }
                        }
                        Some(SessionRequest::Shutdown) | None => break,
                    }
                }
                _ = ticker.tick() => {
                    let now = Instant::now();
                    for raw in self.sweep(now) {
                        if let Err(err) = send_frame(&mut writer, &raw).await {
                            warn!(session = self.session_id, error = %err, "retry write failed");
                            break 'conn;
                        }
                    }
                    if self.idle_expired(now) {
                        info!(session = self.session_id, peer = %self.peer, "idle timeout");
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        self.close();
    }
}

// ============================================================================
// Socket helpers
// ============================================================================

async fn send_frame(writer: &mut WriteHalf<'_>, raw: &[u8]) -> io::Result<()> {
    writer.write_all(raw).await?;
    writer.flush().await?;
    metrics::counter!(metric_names::FRAMES_SENT).increment(1);
    Ok(())
}

async fn write_replies(
    writer: &mut WriteHalf<'_>,
    session_id: u64,
    replies: &[Packet],
) -> io::Result<()> {
    for reply in replies {
        match reply.encode() {
            Ok(raw) => send_frame(writer, &raw).await?,
            Err(err) => {
                warn!(session = session_id, error = %err, "reply encode failed");
            }
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
