//! The server-side view of one client connection.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

// Layer 3: Internal module imports
use crate::codec::Frame;

/// Why a session was forcibly removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickReason {
    /// A newer session authenticated as the same role.
    DisplacedByLogin,

    /// The client could not keep up with its outbound queue.
    SlowClient,

    /// The server is shutting down.
    ServerShutdown,
}

impl KickReason {
    /// Stable label used in the kick push body and in logs.
    pub fn label(&self) -> &'static str {
        match self {
            KickReason::DisplacedByLogin => "displaced_by_login",
            KickReason::SlowClient => "slow_client",
            KickReason::ServerShutdown => "server_shutdown",
        }
    }
}

/// Outbound delivery errors.
///
/// The write side never queues beyond the connection's buffer: a full
/// buffer is a slow-client error, not an accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// No session holds the target role.
    #[error("no session for role")]
    NoSession,

    /// Session exists but is not active.
    #[error("session is not active")]
    NotActive,

    /// The connection's write buffer is full.
    #[error("client write buffer full")]
    SlowClient,

    /// The connection is gone.
    #[error("connection closed")]
    Closed,
}

/// Session lifecycle.
///
/// ```text
///              connect
///     Active ────────▶ (terminal Closed on kick / unauth disconnect)
///       │ ▲
/// disc. │ │ reconnect(token, within grace)
///       ▼ │
///   Disconnected ──(grace elapsed)──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connection is up.
    Active,

    /// Transport dropped; recoverable within the grace window.
    Disconnected,

    /// Terminal.
    Closed,
}

/// Identity bound to a session after login.
#[derive(Debug, Clone, Default)]
pub struct RoleBinding {
    /// Authenticated account id; empty until authenticated.
    pub account_id: String,

    /// Logical game server id the account logged into.
    pub server_id: u32,

    /// Selected role id; 0 until a role is bound.
    pub role_id: u64,

    /// Display name of the selected role.
    pub role_name: String,

    /// Whether login completed.
    pub authenticated: bool,
}

struct Liveness {
    phase: SessionPhase,
    last_active_at: DateTime<Utc>,
    disconnected_at: Option<DateTime<Utc>>,
}

/// One client connection.
///
/// The session outlives its transport: a drop of the TCP connection
/// parks the session as `Disconnected`, and a reconnect within the grace
/// window re-attaches a fresh transport to the *same* session (same id,
/// same role binding). All outbound traffic funnels through the single
/// bounded writer handle, which is what serializes the write side.
pub struct Session {
    session_id: u64,
    remote_addr: SocketAddr,
    reconnect_token: Uuid,
    created_at: DateTime<Utc>,
    binding: RwLock<RoleBinding>,
    liveness: RwLock<Liveness>,
    writer: RwLock<Option<mpsc::Sender<Frame>>>,
    close_signal: Arc<Notify>,
}

impl Session {
    pub(crate) fn new(session_id: u64, remote_addr: SocketAddr, writer: mpsc::Sender<Frame>) -> Self {
        Self {
            session_id,
            remote_addr,
            reconnect_token: Uuid::new_v4(),
            created_at: Utc::now(),
            binding: RwLock::new(RoleBinding::default()),
            liveness: RwLock::new(Liveness {
                phase: SessionPhase::Active,
                last_active_at: Utc::now(),
                disconnected_at: None,
            }),
            writer: RwLock::new(Some(writer)),
            close_signal: Arc::new(Notify::new()),
        }
    }

    /// Process-unique monotonically increasing id.
    pub fn id(&self) -> u64 {
        self.session_id
    }

    /// Peer address of the (original) transport.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Opaque token accepted by reconnect within the grace window.
    pub fn reconnect_token(&self) -> Uuid {
        self.reconnect_token
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Snapshot of the bound identity.
    pub fn binding(&self) -> RoleBinding {
        self.binding.read().clone()
    }

    /// Bound role id; 0 until a role is selected.
    pub fn role_id(&self) -> u64 {
        self.binding.read().role_id
    }

    /// Whether login completed.
    pub fn is_authenticated(&self) -> bool {
        self.binding.read().authenticated
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.liveness.read().phase
    }

    /// When the transport was lost, if currently disconnected.
    pub fn disconnected_at(&self) -> Option<DateTime<Utc>> {
        self.liveness.read().disconnected_at
    }

    /// Last inbound activity.
    pub fn last_active_at(&self) -> DateTime<Utc> {
        self.liveness.read().last_active_at
    }

    /// Stamp inbound activity.
    pub fn touch(&self) {
        self.liveness.write().last_active_at = Utc::now();
    }

    /// Resolves when the session is closed; used by the connection's
    /// read loop to tear the transport down on kick.
    pub async fn closed(&self) {
        self.close_signal.notified().await;
    }

    /// Queue a frame on the connection's bounded writer.
    ///
    /// # Errors
    ///
    /// [`PushError::NotActive`] off-transport, [`PushError::SlowClient`]
    /// when the write buffer is full, [`PushError::Closed`] when the
    /// writer task is gone.
    pub fn send_frame(&self, frame: Frame) -> Result<(), PushError> {
        if self.phase() != SessionPhase::Active {
            return Err(PushError::NotActive);
        }
        let writer = self.writer.read();
        let Some(sender) = writer.as_ref() else {
            return Err(PushError::NotActive);
        };
        sender.try_send(frame).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => PushError::SlowClient,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }

    pub(crate) fn set_authenticated(&self, account_id: String, server_id: u32) {
        let mut binding = self.binding.write();
        binding.account_id = account_id;
        binding.server_id = server_id;
        binding.authenticated = true;
    }

    pub(crate) fn set_role(&self, role_id: u64, role_name: String) {
        let mut binding = self.binding.write();
        binding.role_id = role_id;
        binding.role_name = role_name;
        binding.authenticated = true;
    }

    pub(crate) fn mark_disconnected(&self) {
        let mut liveness = self.liveness.write();
        liveness.phase = SessionPhase::Disconnected;
        liveness.disconnected_at = Some(Utc::now());
        drop(liveness);
        *self.writer.write() = None;
    }

    /// Re-attach a fresh transport after a reconnect.
    pub(crate) fn reattach(&self, writer: mpsc::Sender<Frame>) {
        *self.writer.write() = Some(writer);
        let mut liveness = self.liveness.write();
        liveness.phase = SessionPhase::Active;
        liveness.disconnected_at = None;
        liveness.last_active_at = Utc::now();
    }

    pub(crate) fn close(&self) {
        self.liveness.write().phase = SessionPhase::Closed;
        *self.writer.write() = None;
        self.close_signal.notify_one();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.session_id)
            .field("remote", &self.remote_addr)
            .field("role", &self.role_id())
            .field("phase", &self.phase())
            .finish()
    }
}
