//! Per-entity capability handed to request handlers.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::warn;

// Layer 3: Internal module imports
use super::lifecycle::EntityVitals;
use super::traits::EntityActor;
use crate::system::{ActorSystem, AskError, SendError};

/// Handler-side view of one entity.
///
/// The context is the only way a handler may touch anything beyond its
/// own `&mut State`: persistence intent (`mark_dirty`), orderly stop
/// (`stop_self`), and messaging to *other* entities. Peer messaging is
/// deliberately indirect - `ask_peer` delivers the reply back through the
/// entity's own mailbox instead of running a continuation inline, so a
/// handler can never re-enter itself or another entity.
pub struct EntityContext<A: EntityActor> {
    id: A::Id,
    vitals: Arc<EntityVitals>,
    system: ActorSystem<A>,
    stop_requested: bool,
}

impl<A: EntityActor> EntityContext<A> {
    pub(crate) fn new(id: A::Id, vitals: Arc<EntityVitals>, system: ActorSystem<A>) -> Self {
        Self {
            id,
            vitals,
            system,
            stop_requested: false,
        }
    }

    /// Id of the entity this handler is running for.
    pub fn id(&self) -> A::Id {
        self.id
    }

    /// Kind tag of the entity ("player").
    pub fn kind(&self) -> &'static str {
        A::KIND
    }

    /// Record that state changed and must be persisted.
    ///
    /// The next save tick will invoke
    /// [`EntityActor::save_state`]; the flag clears only after a save
    /// succeeds.
    pub fn mark_dirty(&self) {
        self.vitals.mark_dirty();
    }

    /// Whether a save is currently pending.
    pub fn is_dirty(&self) -> bool {
        self.vitals.is_dirty()
    }

    /// Ask the runtime to stop this entity after the current request.
    ///
    /// Remaining queued messages are drained according to the system's
    /// [`DrainPolicy`](crate::system::DrainPolicy), then the state is
    /// saved once and the entity is removed.
    pub fn stop_self(&mut self) {
        self.stop_requested = true;
    }

    pub(crate) fn take_stop_request(&mut self) -> bool {
        std::mem::take(&mut self.stop_requested)
    }

    /// Fire-and-forget a request to another entity.
    ///
    /// Non-blocking: a full peer mailbox surfaces as
    /// [`SendError::MailboxFull`] immediately.
    pub fn send_peer(&self, target: A::Id, request: A::Request) -> Result<(), SendError> {
        self.system.send(target, request)
    }

    /// Ask another entity and continue with its reply *as a new message*.
    ///
    /// The continuation runs off-task once the peer replies (or the ask
    /// fails); whatever request it returns is enqueued on this entity's
    /// own mailbox and handled in order like any other message. `None`
    /// drops the outcome.
    pub fn ask_peer<F>(&self, target: A::Id, request: A::Request, continuation: F)
    where
        F: FnOnce(Result<A::Reply, AskError>) -> Option<A::Request> + Send + 'static,
    {
        let system = self.system.clone();
        let own_id = self.id;
        tokio::spawn(async move {
            let outcome = system.ask(target, request).await;
            if let Some(follow_up) = continuation(outcome) {
                if let Err(error) = system.send(own_id, follow_up) {
                    warn!(
                        kind = A::KIND,
                        entity = %own_id,
                        %error,
                        "dropping ask continuation: entity no longer accepts sends"
                    );
                }
            }
        });
    }
}
