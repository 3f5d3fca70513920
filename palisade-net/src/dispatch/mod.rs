//! Protocol handler registry and the request pipeline.

mod descriptor;
mod dispatcher;
mod error;
mod handler;
mod limiter;
mod registry;
mod stats;

pub use descriptor::{AuthPolicy, HandlerDescriptor, RunOn};
pub use dispatcher::{Dispatcher, GateMonitor, NoopGateMonitor};
pub use error::{DispatchError, HandlerError, ReplyEnvelope};
pub use handler::{CallContext, EntityProtocolHandler, ProtocolHandler};
pub use limiter::RateWindow;
pub use registry::{DispatchRegistry, RegistryBuilder, RegistryError};
pub use stats::{HandlerStats, StatsSnapshot};

pub(crate) use handler::handler_outcome;
