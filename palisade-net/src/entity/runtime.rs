//! The `palisade-rt` behavior carrying gameplay state.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

// Layer 3: Internal module imports
use super::call::EntityCall;
use super::job::EntityJob;
use super::store::{StateStore, StoreError};
use crate::dispatch::{DispatchError, HandlerError, ReplyEnvelope};
use crate::session::SessionManager;
use palisade_rt::{EntityActor, EntityContext};

/// Failures surfaced by the entity behavior.
#[derive(Debug, Error)]
pub enum EntityError {
    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A dispatched job failed.
    #[error("{0}")]
    Dispatch(DispatchError),

    /// A notice handler failed.
    #[error("notice handler failed: {0}")]
    Notify(String),
}

/// Cross-entity message: kind plus an opaque payload.
#[derive(Debug, Clone)]
pub struct Notice {
    /// Application-defined message kind.
    pub kind: String,

    /// Opaque payload.
    pub payload: Value,
}

/// Mailbox payload of a gameplay entity: either a dispatched protocol
/// request or a notice from another entity.
#[derive(Debug)]
pub enum EntityMsg<S: Send + Sync + 'static> {
    /// Decoded protocol request prepared by the dispatcher.
    Job(EntityJob<S>),

    /// Cross-entity notice.
    Notify(Notice),
}

/// Application hook for cross-entity notices.
#[async_trait]
pub trait EntityEvents<S: Send + Sync + 'static>: Send + Sync + 'static {
    /// Handle one notice; the returned value becomes the reply payload
    /// for ask-style notices.
    async fn on_notify(
        &self,
        state: &mut S,
        notice: Notice,
        call: &mut EntityCall<'_, S>,
    ) -> Result<Value, HandlerError> {
        let _ = (state, call);
        let _ = notice;
        Ok(Value::Null)
    }
}

/// Default hook ignoring every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl<S: Send + Sync + 'static> EntityEvents<S> for NoEvents {}

/// The gameplay entity behavior: one resident actor per role id.
///
/// Persistence delegates to the injected [`StateStore`]; protocol
/// requests arrive as pre-decoded [`EntityJob`]s; notices go through the
/// injected [`EntityEvents`] hook.
pub struct EntityRuntime<S: Send + Sync + 'static> {
    store: Arc<dyn StateStore<S>>,
    events: Arc<dyn EntityEvents<S>>,
    sessions: Arc<SessionManager>,
}

impl<S: Send + Sync + 'static> EntityRuntime<S> {
    /// Behavior ignoring cross-entity notices.
    pub fn new(store: Arc<dyn StateStore<S>>, sessions: Arc<SessionManager>) -> Self {
        Self::with_events(store, sessions, Arc::new(NoEvents))
    }

    /// Behavior with an application notice hook.
    pub fn with_events(
        store: Arc<dyn StateStore<S>>,
        sessions: Arc<SessionManager>,
        events: Arc<dyn EntityEvents<S>>,
    ) -> Self {
        Self {
            store,
            events,
            sessions,
        }
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> EntityActor for EntityRuntime<S> {
    type Id = u64;
    type State = S;
    type Request = EntityMsg<S>;
    type Reply = Bytes;
    type Error = EntityError;

    const KIND: &'static str = "player";

    async fn load_state(&self, id: u64) -> Result<Option<S>, EntityError> {
        Ok(self.store.load(id).await?)
    }

    fn fresh_state(&self, id: u64) -> S {
        self.store.fresh(id)
    }

    async fn save_state(&self, id: u64, state: &S) -> Result<(), EntityError> {
        Ok(self.store.save(id, state).await?)
    }

    async fn handle(
        &self,
        state: &mut S,
        message: EntityMsg<S>,
        ctx: &mut EntityContext<Self>,
    ) -> Result<Bytes, EntityError> {
        let mut call = EntityCall::new(ctx, Arc::clone(&self.sessions));
        match message {
            EntityMsg::Job(job) => job
                .execute(state, &mut call)
                .await
                .map_err(EntityError::Dispatch),
            EntityMsg::Notify(notice) => {
                match self.events.on_notify(state, notice, &mut call).await {
                    Ok(value) => Ok(ReplyEnvelope::ok(value).encode()),
                    Err(HandlerError::Rejected { code, message }) => {
                        Ok(ReplyEnvelope::failure(code, message).encode())
                    }
                    Err(HandlerError::Internal(detail)) => Err(EntityError::Notify(detail)),
                }
            }
        }
    }
}
