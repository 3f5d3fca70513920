//! Wire frame and the length-prefixed codec.

mod frame;
mod framer;

pub use frame::{protocol_key, system, Frame, FrameKind, HEADER_LEN};
pub use framer::{CodecError, FrameCodec};
