//! # palisade-net - Gateway Core
//!
//! The network front of the entity runtime: a length-prefixed binary
//! frame codec, a session manager with displacement and
//! reconnect-within-grace, a typed protocol dispatcher with auth/role
//! gating, per-handler rate limits and statistics, and the bridge that
//! runs entity-bound handlers on [`palisade_rt`] actors keyed by the
//! session's role.
//!
//! # Control Flow
//!
//! ```text
//! bytes ──FrameCodec──▶ Frame ──Session──▶ Dispatcher ──┬─ Caller: inline
//!                                                       ├─ Async: task pool
//!                                                       └─ Actor: mailbox of
//!                                                          the role's entity
//!                       reply ◀──Response(seq)──────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`codec`] - Wire frame and the tokio-util codec
//! - [`session`] - Sessions, the session manager, kick/reconnect/reap
//! - [`dispatch`] - Handler registry, gates, rate limits, the pipeline
//! - [`entity`] - The [`palisade_rt`] bridge and the state store contract
//! - [`gateway`] - TCP accept loop and per-connection tasks
//! - [`config`] - The gateway configuration tree

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod gateway;
pub mod session;

// Re-export commonly used types
pub use codec::{system, CodecError, Frame, FrameCodec, FrameKind};
pub use config::{
    DispatcherConfig, GateConfig, GateConfigBuilder, ListenConfig, SecurityConfig, SessionConfig,
};
pub use dispatch::{
    AuthPolicy, CallContext, DispatchError, DispatchRegistry, Dispatcher, EntityProtocolHandler,
    GateMonitor, HandlerDescriptor, HandlerError, HandlerStats, NoopGateMonitor, ProtocolHandler,
    RegistryBuilder, RegistryError, ReplyEnvelope, RunOn, StatsSnapshot,
};
pub use entity::{
    EntityCall, EntityError, EntityEvents, EntityJob, EntityMsg, EntityRuntime, MemoryStore,
    NoEvents, Notice, StateStore, StoreError,
};
pub use gateway::{Gateway, GatewayError, GatewaySinks};
pub use session::{KickReason, PushError, RoleBinding, Session, SessionManager, SessionPhase};
