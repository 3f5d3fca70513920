//! TCP gateway: accept loop and per-connection tasks.

mod server;

pub use server::{Gateway, GatewayError, GatewaySinks};
