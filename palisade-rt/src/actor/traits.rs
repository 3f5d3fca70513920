//! The `EntityActor` behavior trait.
//!
//! An `EntityActor` describes one *kind* of entity (players, guilds,
//! matches). A single behavior value is shared by every live entity of
//! that kind; the runtime owns one mutable `State` per entity id and
//! guarantees that `handle` runs for at most one message at a time per
//! entity, on that entity's own consumer task.

// Layer 1: Standard library imports
use std::error::Error;
use std::fmt::Display;
use std::hash::Hash;

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use super::context::EntityContext;

/// Behavior shared by all entities of one kind.
///
/// The runtime calls `load_state` exactly once per resident entity (the
/// first message addressed to an id triggers it), then feeds requests to
/// `handle` strictly in mailbox order. `save_state` runs on the same
/// consumer task as `handle` and therefore never observes a state value
/// mid-mutation.
///
/// # Associated Types
///
/// - `Id`: entity key; cheap to copy, hashable, printable for logs
/// - `State`: the per-entity mutable value owned by the consumer task
/// - `Request`: the message payload entities of this kind accept
/// - `Reply`: what `handle` produces for ask-style senders
/// - `Error`: failure type for load/save/handle; handler errors are
///   contained to the request, they never kill the entity
///
/// # Example
///
/// ```rust,ignore
/// use palisade_rt::{EntityActor, EntityContext};
/// use async_trait::async_trait;
///
/// struct Wallet;
///
/// #[async_trait]
/// impl EntityActor for Wallet {
///     type Id = u64;
///     type State = u64;
///     type Request = u64;
///     type Reply = u64;
///     type Error = std::io::Error;
///
///     const KIND: &'static str = "wallet";
///
///     async fn load_state(&self, _id: u64) -> Result<Option<u64>, Self::Error> {
///         Ok(None)
///     }
///
///     fn fresh_state(&self, _id: u64) -> u64 {
///         0
///     }
///
///     async fn save_state(&self, _id: u64, _state: &u64) -> Result<(), Self::Error> {
///         Ok(())
///     }
///
///     async fn handle(
///         &self,
///         state: &mut u64,
///         deposit: u64,
///         ctx: &mut EntityContext<Self>,
///     ) -> Result<u64, Self::Error> {
///         *state += deposit;
///         ctx.mark_dirty();
///         Ok(*state)
///     }
/// }
/// ```
#[async_trait]
pub trait EntityActor: Send + Sync + Sized + 'static {
    /// Entity key type.
    type Id: Copy + Eq + Hash + Display + Send + Sync + 'static;

    /// Per-entity mutable state, owned by the entity's consumer task.
    type State: Send + Sync + 'static;

    /// Message payload accepted by entities of this kind.
    type Request: Send + 'static;

    /// Value produced by `handle` and delivered to ask-style senders.
    type Reply: Send + 'static;

    /// Failure type for load, save, and handle.
    type Error: Error + Send + Sync + 'static;

    /// Human-readable kind tag used in logs and monitoring ("player").
    const KIND: &'static str;

    /// Load persisted state for an entity.
    ///
    /// Runs once, before any request is handled. `Ok(None)` means no
    /// record exists yet; the runtime then starts from
    /// [`fresh_state`](Self::fresh_state). `Err` stops the entity before
    /// it ever becomes ready: every queued message is answered with
    /// [`AskError::LoadFailed`](crate::system::AskError::LoadFailed) and
    /// the entity may be re-created by a later send.
    async fn load_state(&self, id: Self::Id) -> Result<Option<Self::State>, Self::Error>;

    /// Produce the initial state for an entity with no persisted record.
    fn fresh_state(&self, id: Self::Id) -> Self::State;

    /// Persist the entity's state.
    ///
    /// Invoked from the periodic save tick while the entity is dirty,
    /// and once more during orderly stop. A failure leaves the dirty
    /// flag set; the next tick retries.
    async fn save_state(&self, id: Self::Id, state: &Self::State) -> Result<(), Self::Error>;

    /// Handle one request.
    ///
    /// Runs exclusively on the entity's consumer task; no other handler
    /// executes for the same entity concurrently. Call
    /// [`EntityContext::mark_dirty`] after mutating state that must be
    /// persisted. Returning `Err` (or panicking) answers the sender with
    /// a handler failure and keeps the entity alive; state mutated
    /// before the failure is *not* rolled back.
    async fn handle(
        &self,
        state: &mut Self::State,
        request: Self::Request,
        ctx: &mut EntityContext<Self>,
    ) -> Result<Self::Reply, Self::Error>;
}
