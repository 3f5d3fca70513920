//! Entity-side capability handed to entity handlers.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use super::runtime::{EntityMsg, EntityRuntime, Notice};
use crate::codec::Frame;
use crate::session::{PushError, SessionManager};
use palisade_rt::{EntityContext, SendError};

/// What an entity handler may do beyond mutating its own state.
///
/// Wraps the runtime context (dirty flag, stop, peer messaging) and adds
/// the session push capability. A handler may only touch its own state;
/// other entities are reached by value through notices.
pub struct EntityCall<'a, S: Send + Sync + 'static> {
    ctx: &'a mut EntityContext<EntityRuntime<S>>,
    sessions: Arc<SessionManager>,
}

impl<'a, S: Send + Sync + 'static> EntityCall<'a, S> {
    pub(crate) fn new(
        ctx: &'a mut EntityContext<EntityRuntime<S>>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self { ctx, sessions }
    }

    /// Role id of the entity this handler runs for.
    pub fn role_id(&self) -> u64 {
        self.ctx.id()
    }

    /// Record that state changed and must be persisted.
    pub fn mark_dirty(&self) {
        self.ctx.mark_dirty();
    }

    /// Whether a save is pending.
    pub fn is_dirty(&self) -> bool {
        self.ctx.is_dirty()
    }

    /// Stop this entity after the current request (logout flows).
    pub fn stop_self(&mut self) {
        self.ctx.stop_self();
    }

    /// Push a frame to this entity's own session.
    pub fn push(&self, frame: Frame) -> Result<(), PushError> {
        self.sessions.push(self.role_id(), frame)
    }

    /// Push a frame to another role's session.
    pub fn push_to(&self, role_id: u64, frame: Frame) -> Result<(), PushError> {
        self.sessions.push(role_id, frame)
    }

    /// Fire-and-forget a notice to another entity.
    pub fn notify_peer(
        &self,
        target: u64,
        kind: impl Into<String>,
        payload: Value,
    ) -> Result<(), SendError> {
        self.ctx.send_peer(
            target,
            EntityMsg::Notify(Notice {
                kind: kind.into(),
                payload,
            }),
        )
    }

    /// Ask another entity and receive its answer *as a new notice* on
    /// this entity's own mailbox.
    ///
    /// The reply notice carries `reply_kind` and a payload of the shape
    /// `{"ok": bool, "data"|"error": ...}`. Delivery through the mailbox
    /// keeps handler execution strictly serialized; nothing runs inline
    /// when the peer answers.
    pub fn ask_peer(
        &self,
        target: u64,
        kind: impl Into<String>,
        payload: Value,
        reply_kind: impl Into<String>,
    ) {
        let reply_kind = reply_kind.into();
        self.ctx.ask_peer(
            target,
            EntityMsg::Notify(Notice {
                kind: kind.into(),
                payload,
            }),
            move |outcome| {
                let payload = match outcome {
                    Ok(body) => {
                        let data = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
                        serde_json::json!({ "ok": true, "data": data })
                    }
                    Err(error) => {
                        serde_json::json!({ "ok": false, "error": error.to_string() })
                    }
                };
                Some(EntityMsg::Notify(Notice {
                    kind: reply_kind,
                    payload,
                }))
            },
        );
    }
}
