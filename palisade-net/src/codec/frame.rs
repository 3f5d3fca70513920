//! The network envelope.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use bytes::Bytes;

// Layer 3: Internal module imports
// (none)

/// Size of the frame header after the length prefix: seq + proto + method.
pub const HEADER_LEN: usize = 8;

/// Reserved system protocol (protocol id 0) used by the gateway itself.
pub mod system {
    /// Protocol id of the reserved system protocol.
    pub const PROTOCOL_ID: u16 = 0;

    /// Server push telling the client it was kicked.
    pub const METHOD_KICKED: u16 = 1;

    /// Client request adopting a disconnected session by token.
    pub const METHOD_RECONNECT: u16 = 2;

    /// Composite key of the reconnect request.
    pub const RECONNECT_KEY: u32 = (PROTOCOL_ID as u32) << 8 | METHOD_RECONNECT as u32;
}

/// Frame kind, derived from the sequence id and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Client-to-server request carrying a non-zero `seq_id`.
    Request,
    /// Server-to-client answer reusing the request's `seq_id`.
    Response,
    /// Unsolicited server-to-client frame with `seq_id == 0`.
    Push,
}

/// One protocol message.
///
/// On the wire: `len:u32 | seq:u32 | proto:u16 | method:u16 | body`,
/// all integers unsigned big-endian. `len` counts the header remainder
/// plus the body and excludes the length field itself, so
/// `len == 8 + body.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Request correlation id; 0 for pushes.
    pub seq_id: u32,

    /// Protocol (module) id.
    pub protocol_id: u16,

    /// Method id within the protocol.
    pub method_id: u16,

    /// Opaque body; decoding is per handler.
    pub body: Bytes,
}

impl Frame {
    /// Build a request frame.
    pub fn request(seq_id: u32, protocol_id: u16, method_id: u16, body: Bytes) -> Self {
        Self {
            seq_id,
            protocol_id,
            method_id,
            body,
        }
    }

    /// Build a response reusing the request's sequence id.
    pub fn response(seq_id: u32, protocol_id: u16, method_id: u16, body: Bytes) -> Self {
        Self {
            seq_id,
            protocol_id,
            method_id,
            body,
        }
    }

    /// Build an unsolicited push (`seq_id == 0`).
    pub fn push(protocol_id: u16, method_id: u16, body: Bytes) -> Self {
        Self {
            seq_id: 0,
            protocol_id,
            method_id,
            body,
        }
    }

    /// Composite handler key: `(protocol_id << 8) | method_id`.
    pub fn protocol_key(&self) -> u32 {
        protocol_key(self.protocol_id, self.method_id)
    }

    /// Kind as seen from the server: inbound frames with `seq_id == 0`
    /// are pushes, everything else correlates by sequence id.
    pub fn kind(&self) -> FrameKind {
        if self.seq_id == 0 {
            FrameKind::Push
        } else {
            FrameKind::Request
        }
    }

    /// Encoded length on the wire, excluding the length field.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame(seq={} key={:#06x} body={}B)",
            self.seq_id,
            self.protocol_key(),
            self.body.len()
        )
    }
}

/// Compose a handler key from protocol and method ids.
pub fn protocol_key(protocol_id: u16, method_id: u16) -> u32 {
    (protocol_id as u32) << 8 | method_id as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_key_composition() {
        assert_eq!(protocol_key(1, 1), 0x0101);
        assert_eq!(protocol_key(0x12, 0x34), 0x1234);
        assert_eq!(protocol_key(0, 0), 0);
    }

    #[test]
    fn test_frame_key_matches_free_function() {
        let frame = Frame::request(1, 7, 3, Bytes::new());
        assert_eq!(frame.protocol_key(), protocol_key(7, 3));
    }

    #[test]
    fn test_push_has_zero_seq() {
        let push = Frame::push(2, 1, Bytes::from_static(b"x"));
        assert_eq!(push.seq_id, 0);
        assert_eq!(push.kind(), FrameKind::Push);
    }

    #[test]
    fn test_request_kind() {
        let frame = Frame::request(9, 1, 1, Bytes::new());
        assert_eq!(frame.kind(), FrameKind::Request);
    }

    #[test]
    fn test_wire_len() {
        let frame = Frame::request(1, 1, 1, Bytes::from_static(b"abcd"));
        assert_eq!(frame.wire_len(), 12);
    }

    #[test]
    fn test_reconnect_key() {
        assert_eq!(system::RECONNECT_KEY, 2);
    }
}
