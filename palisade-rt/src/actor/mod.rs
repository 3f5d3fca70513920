//! Entity actor behavior, handler context, and lifecycle phases.

mod context;
mod lifecycle;
mod traits;

pub use context::EntityContext;
pub use lifecycle::{EntityPhase, EntityVitals};
pub use traits::EntityActor;
