//! # palisade-rt - Entity Actor Runtime
//!
//! Per-entity single-writer runtime for long-lived game backends: every
//! entity (player, guild, match) is an actor draining a bounded mailbox on
//! its own lightweight task, with lazy state loading, dirty-tracking with
//! periodic persistence, idle eviction, and controlled cross-entity
//! messaging.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use palisade_rt::prelude::*;
//! use async_trait::async_trait;
//!
//! struct Counter;
//!
//! #[async_trait]
//! impl EntityActor for Counter {
//!     type Id = u64;
//!     type State = i64;
//!     type Request = i64;
//!     type Reply = i64;
//!     type Error = std::io::Error;
//!
//!     const KIND: &'static str = "counter";
//!
//!     async fn load_state(&self, _id: u64) -> Result<Option<i64>, Self::Error> {
//!         Ok(None)
//!     }
//!
//!     fn fresh_state(&self, _id: u64) -> i64 {
//!         0
//!     }
//!
//!     async fn save_state(&self, _id: u64, _state: &i64) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!
//!     async fn handle(
//!         &self,
//!         state: &mut i64,
//!         delta: i64,
//!         ctx: &mut EntityContext<Self>,
//!     ) -> Result<i64, Self::Error> {
//!         *state += delta;
//!         ctx.mark_dirty();
//!         Ok(*state)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = ActorSystem::new(RuntimeConfig::default(), Counter);
//!     let total = system.ask(7, 5).await?;
//!     assert_eq!(total, 5);
//!     system.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Guarantees
//!
//! - **Single writer**: entity state is mutated only on the entity's own
//!   consumer task; mailbox order equals handler execution order.
//! - **Bounded admission**: a full mailbox rejects the send immediately,
//!   it never blocks the caller or grows the queue.
//! - **Contained faults**: handler errors and panics are logged, counted,
//!   and answered; the actor keeps running with whatever state it had.
//! - **Dirty persistence**: state changed since the last successful save
//!   is flushed by a periodic tick; save failures are retried on the next
//!   tick and escalated through the [`SystemMonitor`] sink.
//!
//! # Module Organization
//!
//! - [`actor`] - The [`EntityActor`] behavior trait, handler context, and
//!   lifecycle phases
//! - [`mailbox`] - Bounded per-entity message queue
//! - [`message`] - Mailbox envelopes and system directives
//! - [`monitor`] - Observability sink for faults, failed saves, evictions
//! - [`system`] - The [`ActorSystem`]: routing, maintenance ticks, shutdown

pub mod actor;
pub mod mailbox;
pub mod message;
pub mod monitor;
pub mod system;

// Re-export commonly used types
pub use actor::{EntityActor, EntityContext, EntityPhase, EntityVitals};
pub use mailbox::{Mailbox, MailboxError, MailboxSender};
pub use message::{Directive, Envelope, ReplyTo};
pub use monitor::{NoopMonitor, SystemMonitor};
pub use system::{
    ActorSystem, AskError, DrainPolicy, RuntimeConfig, RuntimeConfigBuilder, SendError,
    SystemError,
};

/// Convenience prelude for downstream crates.
pub mod prelude {
    pub use crate::actor::{EntityActor, EntityContext, EntityPhase};
    pub use crate::monitor::{NoopMonitor, SystemMonitor};
    pub use crate::system::{ActorSystem, AskError, RuntimeConfig, SendError};
}
