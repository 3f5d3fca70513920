//! Dispatch errors and the reply envelope.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Layer 3: Internal module imports
use palisade_rt::{AskError, SendError};

/// Body of every response the dispatcher produces.
///
/// `code == 0` means success; any other code carries the error class (or
/// a domain-defined rejection). `data` holds the handler's response
/// object on success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyEnvelope {
    /// 0 on success.
    pub code: i32,

    /// Human-readable error context.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,

    /// Handler response payload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,
}

impl ReplyEnvelope {
    /// Success code.
    pub const OK: i32 = 0;

    /// Success envelope; a null payload is omitted.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            code: Self::OK,
            message: None,
            data: if data.is_null() { None } else { Some(data) },
        }
    }

    /// Failure envelope.
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Whether the envelope carries a success.
    pub fn is_ok(&self) -> bool {
        self.code == Self::OK
    }

    /// Serialize to a frame body.
    pub fn encode(&self) -> Bytes {
        Bytes::from(serde_json::to_vec(self).unwrap_or_default())
    }

    /// Parse a frame body.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Request-scoped failures, each mapped to a stable envelope code.
///
/// Every variant is contained to the request: the session stays up and
/// the client receives a typed response.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the key.
    #[error("unknown protocol key {key:#06x}")]
    UnknownProtocol { key: u32 },

    /// The handler requires an authenticated session.
    #[error("authentication required")]
    Unauthorized,

    /// The handler requires a bound role.
    #[error("no role selected")]
    RoleNotSelected,

    /// The per-handler rate limit rejected the request.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The request body could not be decoded.
    #[error("malformed request: {detail}")]
    BadRequest { detail: String },

    /// The target entity's mailbox is full.
    #[error("entity busy, retry later")]
    Busy,

    /// The request deadline expired; a late reply is discarded.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The handler failed; detail is logged under a trace id.
    #[error("internal error")]
    HandlerFailed,

    /// The entity's persisted state could not be loaded.
    #[error("entity state unavailable")]
    LoadFailed,

    /// Hard capacity limits rejected the request.
    #[error("server overloaded")]
    Overloaded,
}

impl DispatchError {
    /// Stable envelope code for this error class.
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::UnknownProtocol { .. } => 1,
            DispatchError::Unauthorized => 2,
            DispatchError::RoleNotSelected => 3,
            DispatchError::RateLimited => 4,
            DispatchError::BadRequest { .. } => 5,
            DispatchError::Busy => 6,
            DispatchError::Timeout(_) => 7,
            DispatchError::HandlerFailed => 8,
            DispatchError::LoadFailed => 9,
            DispatchError::Overloaded => 10,
        }
    }

    /// Failure envelope for this error.
    pub fn envelope(&self) -> ReplyEnvelope {
        ReplyEnvelope::failure(self.code(), self.to_string())
    }
}

impl From<AskError> for DispatchError {
    fn from(error: AskError) -> Self {
        match error {
            AskError::Rejected(SendError::MailboxFull { .. })
            | AskError::Rejected(SendError::ActorStopping) => DispatchError::Busy,
            AskError::Rejected(SendError::SystemOverloaded { .. })
            | AskError::Rejected(SendError::ShuttingDown) => DispatchError::Overloaded,
            AskError::LoadFailed => DispatchError::LoadFailed,
            AskError::HandlerFailed => DispatchError::HandlerFailed,
            AskError::Stopped | AskError::Canceled => DispatchError::Busy,
            AskError::Timeout(deadline) => DispatchError::Timeout(deadline),
        }
    }
}

/// Failures a protocol handler may produce.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Domain-level rejection passed through to the client verbatim.
    #[error("{message}")]
    Rejected { code: i32, message: String },

    /// Unexpected failure; logged with a trace id, the client sees a
    /// generic internal error.
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    /// Domain rejection with an explicit envelope code.
    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Internal failure from any displayable cause.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        Self::Internal(cause.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_ok_roundtrip() {
        let envelope = ReplyEnvelope::ok(serde_json::json!({"pong": true}));
        let decoded = ReplyEnvelope::decode(&envelope.encode()).unwrap();
        assert!(decoded.is_ok());
        assert_eq!(decoded.data.unwrap()["pong"], true);
    }

    #[test]
    fn test_envelope_null_data_omitted() {
        let envelope = ReplyEnvelope::ok(serde_json::Value::Null);
        assert!(envelope.data.is_none());
        let text = String::from_utf8(envelope.encode().to_vec()).unwrap();
        assert!(!text.contains("data"));
        assert!(!text.contains("message"));
    }

    #[test]
    fn test_envelope_failure() {
        let envelope = ReplyEnvelope::failure(4, "slow down");
        assert!(!envelope.is_ok());
        assert_eq!(envelope.code, 4);
        assert_eq!(envelope.message.as_deref(), Some("slow down"));
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            DispatchError::UnknownProtocol { key: 1 },
            DispatchError::Unauthorized,
            DispatchError::RoleNotSelected,
            DispatchError::RateLimited,
            DispatchError::BadRequest {
                detail: "x".to_string(),
            },
            DispatchError::Busy,
            DispatchError::Timeout(Duration::from_secs(5)),
            DispatchError::HandlerFailed,
            DispatchError::LoadFailed,
            DispatchError::Overloaded,
        ];
        let mut codes: Vec<i32> = errors.iter().map(DispatchError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&ReplyEnvelope::OK));
    }

    #[test]
    fn test_ask_error_mapping() {
        let busy: DispatchError = AskError::Rejected(SendError::MailboxFull { capacity: 2 }).into();
        assert!(matches!(busy, DispatchError::Busy));

        let overloaded: DispatchError = AskError::Rejected(SendError::SystemOverloaded {
            current: 1,
            limit: 1,
        })
        .into();
        assert!(matches!(overloaded, DispatchError::Overloaded));

        let load: DispatchError = AskError::LoadFailed.into();
        assert!(matches!(load, DispatchError::LoadFailed));

        let timeout: DispatchError = AskError::Timeout(Duration::from_secs(5)).into();
        assert!(matches!(timeout, DispatchError::Timeout(_)));
    }

    #[test]
    fn test_handler_error_constructors() {
        let rejected = HandlerError::rejected(1001, "not enough gold");
        assert!(matches!(rejected, HandlerError::Rejected { code: 1001, .. }));

        let internal = HandlerError::internal("db down");
        assert_eq!(internal.to_string(), "db down");
    }
}
