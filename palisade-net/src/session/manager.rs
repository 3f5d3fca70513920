//! The session manager: live-connection registry.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

// Layer 3: Internal module imports
use super::session::{KickReason, PushError, Session, SessionPhase};
use crate::codec::{system, Frame};
use crate::config::SessionConfig;

/// Owner of every live connection.
///
/// Three indexes, each safe for concurrent use: by session id, by role
/// id (authenticated sessions only), and by reconnect token. At most one
/// active session holds a role; binding a second displaces the first
/// with a [`KickReason::DisplacedByLogin`] kick.
pub struct SessionManager {
    config: SessionConfig,
    next_id: AtomicU64,
    by_id: DashMap<u64, Arc<Session>>,
    by_role: DashMap<u64, u64>,
    by_token: DashMap<Uuid, u64>,
}

impl SessionManager {
    /// Create an empty manager.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(0),
            by_id: DashMap::new(),
            by_role: DashMap::new(),
            by_token: DashMap::new(),
        }
    }

    /// Register a fresh connection.
    ///
    /// Allocates the next session id and a reconnect token, indexes the
    /// session, and returns it in `Active` state.
    pub fn create_session(&self, remote: SocketAddr, writer: mpsc::Sender<Frame>) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(Session::new(id, remote, writer));

        self.by_id.insert(id, Arc::clone(&session));
        self.by_token.insert(session.reconnect_token(), id);

        debug!(session = id, %remote, "session created");
        session
    }

    /// Number of live sessions (active or within reconnect grace).
    pub fn session_count(&self) -> usize {
        self.by_id.len()
    }

    /// Look up by session id.
    pub fn find(&self, session_id: u64) -> Option<Arc<Session>> {
        self.by_id.get(&session_id).map(|s| Arc::clone(s.value()))
    }

    /// Look up the session currently holding a role.
    pub fn find_by_role(&self, role_id: u64) -> Option<Arc<Session>> {
        let session_id = *self.by_role.get(&role_id)?;
        self.find(session_id)
    }

    /// Record a completed account login on a session.
    pub fn authenticate(&self, session: &Arc<Session>, account_id: String, server_id: u32) {
        session.set_authenticated(account_id, server_id);
    }

    /// Bind a role to a session, displacing any previous holder.
    ///
    /// Returns the displaced session, which has already been kicked with
    /// [`KickReason::DisplacedByLogin`].
    pub fn bind_role(
        &self,
        session: &Arc<Session>,
        role_id: u64,
        role_name: String,
    ) -> Option<Arc<Session>> {
        session.set_role(role_id, role_name);
        let previous = self.by_role.insert(role_id, session.id());

        let old_id = previous?;
        if old_id == session.id() {
            return None;
        }
        let displaced = self.find(old_id)?;
        info!(
            role = role_id,
            old_session = old_id,
            new_session = session.id(),
            "role displaced by new login"
        );
        self.kick(&displaced, KickReason::DisplacedByLogin);
        Some(displaced)
    }

    /// Forcibly remove a session.
    ///
    /// Sends a best-effort kick push, removes the session from every
    /// index, and closes the connection. The session never returns from
    /// lookups afterwards.
    pub fn kick(&self, session: &Arc<Session>, reason: KickReason) {
        let body = serde_json::json!({ "reason": reason.label() });
        let frame = Frame::push(
            system::PROTOCOL_ID,
            system::METHOD_KICKED,
            Bytes::from(serde_json::to_vec(&body).unwrap_or_default()),
        );
        if let Err(error) = session.send_frame(frame) {
            debug!(session = session.id(), %error, "kick push not delivered");
        }

        self.remove(session);
        session.close();
        info!(
            session = session.id(),
            reason = reason.label(),
            "session kicked"
        );
    }

    /// Handle a dropped transport.
    ///
    /// Unauthenticated sessions are removed immediately; authenticated
    /// ones are parked as `Disconnected` and kept in the indexes until
    /// the grace window expires.
    pub fn on_disconnect(&self, session: &Arc<Session>) {
        if session.phase() == SessionPhase::Closed {
            // Already kicked; nothing left to do.
            return;
        }
        if !session.is_authenticated() {
            self.remove(session);
            session.close();
            debug!(session = session.id(), "unauthenticated session removed");
            return;
        }
        session.mark_disconnected();
        debug!(
            session = session.id(),
            role = session.role_id(),
            "session disconnected; grace window open"
        );
    }

    /// Recover a disconnected session onto a fresh transport.
    ///
    /// Succeeds only while the session is `Disconnected` and the grace
    /// window has not elapsed; the recovered session keeps its id and
    /// role binding. Returns `None` otherwise.
    pub fn reconnect(&self, token: Uuid, writer: mpsc::Sender<Frame>) -> Option<Arc<Session>> {
        let session_id = *self.by_token.get(&token)?;
        let session = self.find(session_id)?;

        if session.phase() != SessionPhase::Disconnected {
            return None;
        }
        let disconnected_at = session.disconnected_at()?;
        let grace = chrono::Duration::from_std(self.config.reconnect_grace).ok()?;
        if Utc::now().signed_duration_since(disconnected_at) > grace {
            return None;
        }

        session.reattach(writer);
        info!(
            session = session.id(),
            role = session.role_id(),
            "session reconnected within grace"
        );
        Some(session)
    }

    /// Drop a session from the indexes without a kick push.
    ///
    /// Used when a freshly created connection-session is superseded by a
    /// reconnect adoption.
    pub fn discard(&self, session: &Arc<Session>) {
        self.remove(session);
        session.close();
    }

    /// Deliver a frame to the active session holding a role.
    pub fn push(&self, role_id: u64, frame: Frame) -> Result<(), PushError> {
        let session = self.find_by_role(role_id).ok_or(PushError::NoSession)?;
        session.send_frame(frame)
    }

    /// Deliver a frame to every authenticated active session passing the
    /// filter. Best effort; returns the number of sessions reached.
    pub fn broadcast(&self, frame: &Frame, filter: Option<&dyn Fn(&Session) -> bool>) -> usize {
        let mut delivered = 0;
        for entry in self.by_id.iter() {
            let session = entry.value();
            if !session.is_authenticated() || session.phase() != SessionPhase::Active {
                continue;
            }
            if let Some(filter) = filter {
                if !filter(session) {
                    continue;
                }
            }
            if session.send_frame(frame.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Remove disconnected sessions whose grace window has elapsed.
    ///
    /// Driven by a periodic reap tick, not per-session timers.
    pub fn reap(&self, now: DateTime<Utc>) -> usize {
        let grace = match chrono::Duration::from_std(self.config.reconnect_grace) {
            Ok(grace) => grace,
            Err(_) => return 0,
        };

        let expired: Vec<Arc<Session>> = self
            .by_id
            .iter()
            .filter(|entry| {
                let session = entry.value();
                session.phase() == SessionPhase::Disconnected
                    && session
                        .disconnected_at()
                        .is_some_and(|at| now.signed_duration_since(at) > grace)
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let count = expired.len();
        for session in expired {
            self.remove(&session);
            session.close();
            debug!(
                session = session.id(),
                role = session.role_id(),
                "grace elapsed; session reaped"
            );
        }
        count
    }

    /// Kick every remaining session; used on server shutdown.
    pub fn shutdown_all(&self, reason: KickReason) {
        let sessions: Vec<Arc<Session>> = self
            .by_id
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        if !sessions.is_empty() {
            warn!(count = sessions.len(), "closing all sessions");
        }
        for session in sessions {
            self.kick(&session, reason);
        }
    }

    fn remove(&self, session: &Arc<Session>) {
        self.by_id.remove(&session.id());
        self.by_token.remove(&session.reconnect_token());
        let role_id = session.role_id();
        if role_id != 0 {
            // Only unlink the role if this session still holds it; a
            // displacing login may already have re-pointed the slot.
            self.by_role
                .remove_if(&role_id, |_, holder| *holder == session.id());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager(grace: Duration) -> SessionManager {
        SessionManager::new(SessionConfig {
            reconnect_grace: grace,
            ..Default::default()
        })
    }

    fn connect(manager: &SessionManager) -> (Arc<Session>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(16);
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        (manager.create_session(addr, tx), rx)
    }

    #[test]
    fn test_session_ids_are_monotonic() {
        let manager = manager(Duration::from_secs(30));
        let (s1, _rx1) = connect(&manager);
        let (s2, _rx2) = connect(&manager);
        assert!(s2.id() > s1.id());
        assert_eq!(manager.session_count(), 2);
    }

    #[test]
    fn test_bind_role_indexes_session() {
        let manager = manager(Duration::from_secs(30));
        let (session, _rx) = connect(&manager);

        assert!(manager.bind_role(&session, 42, "hero".to_string()).is_none());
        assert!(session.is_authenticated());
        assert_eq!(manager.find_by_role(42).unwrap().id(), session.id());
    }

    #[tokio::test]
    async fn test_second_login_displaces_first() {
        let manager = manager(Duration::from_secs(30));
        let (s1, mut rx1) = connect(&manager);
        let (s2, _rx2) = connect(&manager);

        manager.bind_role(&s1, 7, "hero".to_string());
        let displaced = manager.bind_role(&s2, 7, "hero".to_string());

        assert_eq!(displaced.unwrap().id(), s1.id());
        assert_eq!(manager.find_by_role(7).unwrap().id(), s2.id());
        assert_eq!(s1.phase(), SessionPhase::Closed);
        assert!(manager.find(s1.id()).is_none());

        // The displaced session got the kick push before closing.
        let kick = rx1.recv().await.unwrap();
        assert_eq!(kick.seq_id, 0);
        assert_eq!(kick.protocol_id, system::PROTOCOL_ID);
        assert_eq!(kick.method_id, system::METHOD_KICKED);
        let body: serde_json::Value = serde_json::from_slice(&kick.body).unwrap();
        assert_eq!(body["reason"], "displaced_by_login");
    }

    #[test]
    fn test_unauthenticated_disconnect_removes_immediately() {
        let manager = manager(Duration::from_secs(30));
        let (session, _rx) = connect(&manager);

        manager.on_disconnect(&session);
        assert!(manager.find(session.id()).is_none());
        assert_eq!(session.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_reconnect_within_grace_keeps_identity() {
        let manager = manager(Duration::from_secs(30));
        let (session, _rx) = connect(&manager);
        manager.bind_role(&session, 9, "mage".to_string());
        let token = session.reconnect_token();

        manager.on_disconnect(&session);
        assert_eq!(session.phase(), SessionPhase::Disconnected);

        let (tx2, _rx2) = mpsc::channel(16);
        let recovered = manager.reconnect(token, tx2).unwrap();
        assert_eq!(recovered.id(), session.id());
        assert_eq!(recovered.role_id(), 9);
        assert!(recovered.is_authenticated());
        assert_eq!(recovered.phase(), SessionPhase::Active);
    }

    #[test]
    fn test_reconnect_after_grace_rejected() {
        let manager = manager(Duration::ZERO);
        let (session, _rx) = connect(&manager);
        manager.bind_role(&session, 9, "mage".to_string());
        let token = session.reconnect_token();

        manager.on_disconnect(&session);
        std::thread::sleep(Duration::from_millis(20));

        let (tx2, _rx2) = mpsc::channel(16);
        assert!(manager.reconnect(token, tx2).is_none());
    }

    #[test]
    fn test_reconnect_unknown_token_rejected() {
        let manager = manager(Duration::from_secs(30));
        let (tx, _rx) = mpsc::channel(16);
        assert!(manager.reconnect(Uuid::new_v4(), tx).is_none());
    }

    #[test]
    fn test_reap_removes_expired_sessions() {
        let manager = manager(Duration::ZERO);
        let (session, _rx) = connect(&manager);
        manager.bind_role(&session, 3, "rogue".to_string());
        manager.on_disconnect(&session);

        std::thread::sleep(Duration::from_millis(20));
        let reaped = manager.reap(Utc::now());

        assert_eq!(reaped, 1);
        assert!(manager.find(session.id()).is_none());
        assert!(manager.find_by_role(3).is_none());
        assert_eq!(session.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_reap_keeps_sessions_within_grace() {
        let manager = manager(Duration::from_secs(300));
        let (session, _rx) = connect(&manager);
        manager.bind_role(&session, 3, "rogue".to_string());
        manager.on_disconnect(&session);

        assert_eq!(manager.reap(Utc::now()), 0);
        assert!(manager.find(session.id()).is_some());
    }

    #[tokio::test]
    async fn test_push_reaches_active_role() {
        let manager = manager(Duration::from_secs(30));
        let (session, mut rx) = connect(&manager);
        manager.bind_role(&session, 5, "bard".to_string());

        manager
            .push(5, Frame::push(2, 1, Bytes::from_static(b"hi")))
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().body, Bytes::from_static(b"hi"));

        assert_eq!(
            manager.push(999, Frame::push(2, 1, Bytes::new())),
            Err(PushError::NoSession)
        );
    }

    #[test]
    fn test_push_to_disconnected_is_rejected() {
        let manager = manager(Duration::from_secs(30));
        let (session, _rx) = connect(&manager);
        manager.bind_role(&session, 5, "bard".to_string());
        manager.on_disconnect(&session);

        assert_eq!(
            manager.push(5, Frame::push(2, 1, Bytes::new())),
            Err(PushError::NotActive)
        );
    }

    #[test]
    fn test_broadcast_filters_and_counts() {
        let manager = manager(Duration::from_secs(30));
        let (s1, mut rx1) = connect(&manager);
        let (s2, mut rx2) = connect(&manager);
        let (_unauth, _rx3) = connect(&manager);
        manager.bind_role(&s1, 1, "a".to_string());
        manager.bind_role(&s2, 2, "b".to_string());

        let frame = Frame::push(4, 1, Bytes::new());
        assert_eq!(manager.broadcast(&frame, None), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());

        let only_role_two = |s: &Session| s.role_id() == 2;
        assert_eq!(manager.broadcast(&frame, Some(&only_role_two)), 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_shutdown_all_kicks_everyone() {
        let manager = manager(Duration::from_secs(30));
        let (s1, _rx1) = connect(&manager);
        let (s2, _rx2) = connect(&manager);
        manager.bind_role(&s1, 1, "a".to_string());

        manager.shutdown_all(KickReason::ServerShutdown);
        assert_eq!(manager.session_count(), 0);
        assert_eq!(s1.phase(), SessionPhase::Closed);
        assert_eq!(s2.phase(), SessionPhase::Closed);
    }
}
