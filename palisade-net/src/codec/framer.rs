//! Length-prefixed frame codec over a TCP byte stream.
//!
//! Stateless per frame and fragmentation-safe: a partial frame yields
//! "need more bytes", never an error. The length prefix excludes itself,
//! so a well-formed prefix is always `8 + body`.

// Layer 1: Standard library imports
use std::io;

// Layer 2: Third-party crate imports
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

// Layer 3: Internal module imports
use super::frame::{Frame, HEADER_LEN};

/// Default maximum frame length (length field value), 64 KiB.
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024;

/// Errors surfaced by the codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Length prefix exceeds the configured maximum.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// Length prefix too small to contain the frame header.
    #[error("malformed frame: length {len} shorter than header")]
    Malformed { len: usize },

    /// Underlying transport error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Codec for [`Frame`]s: `len:u32 | seq:u32 | proto:u16 | method:u16 | body`.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame: usize,
}

impl FrameCodec {
    /// Codec with an explicit frame size bound.
    pub fn new(max_frame: usize) -> Self {
        Self { max_frame }
    }

    /// Configured bound on the length field.
    pub fn max_frame(&self) -> usize {
        self.max_frame
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        // Need the length prefix first.
        if src.len() < 4 {
            return Ok(None);
        }

        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&src[..4]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len < HEADER_LEN {
            return Err(CodecError::Malformed { len });
        }
        if len > self.max_frame {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame,
            });
        }

        // Partial read; reserve for the rest and wait for more bytes.
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let seq_id = src.get_u32();
        let protocol_id = src.get_u16();
        let method_id = src.get_u16();
        let body: Bytes = src.split_to(len - HEADER_LEN).freeze();

        Ok(Some(Frame {
            seq_id,
            protocol_id,
            method_id,
            body,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        let len = frame.wire_len();
        if len > self.max_frame {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame,
            });
        }

        dst.reserve(4 + len);
        dst.put_u32(len as u32);
        dst.put_u32(frame.seq_id);
        dst.put_u16(frame.protocol_id);
        dst.put_u16(frame.method_id);
        dst.extend_from_slice(&frame.body);
        Ok(())
    }
}
