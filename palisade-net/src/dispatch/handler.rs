//! Typed handler traits and their type-erased registry adapters.
//!
//! Handlers are plain structs registered explicitly at startup: a typed
//! `Request`/`Response` pair plus a descriptor. The blanket adapters
//! below erase the types at the registry boundary, performing
//! decode-body, invoke, and encode-reply so the pipeline deals in
//! uniform trait objects.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

// Layer 3: Internal module imports
use super::descriptor::HandlerDescriptor;
use super::error::{DispatchError, HandlerError, ReplyEnvelope};
use crate::entity::{EntityCall, EntityJob};
use crate::session::{Session, SessionManager};

/// Request-scoped context handed to stateless handlers.
pub struct CallContext {
    /// The session the request arrived on.
    pub session: Arc<Session>,

    /// Session operations: bind, push, broadcast, kick.
    pub sessions: Arc<SessionManager>,

    /// Sequence id of the request frame.
    pub seq_id: u32,

    /// Composite protocol key of the request.
    pub key: u32,
}

/// A protocol handler without entity state (`Caller` or `Async`).
///
/// Bodies are JSON; an empty body decodes as `null`, so parameterless
/// requests may use `()` as their request type.
///
/// # Example
///
/// ```rust,ignore
/// struct EchoHandler {
///     descriptor: HandlerDescriptor,
/// }
///
/// #[async_trait]
/// impl ProtocolHandler for EchoHandler {
///     type Request = EchoRequest;
///     type Response = EchoRequest;
///
///     fn descriptor(&self) -> &HandlerDescriptor {
///         &self.descriptor
///     }
///
///     async fn call(
///         &self,
///         _ctx: &mut CallContext,
///         request: EchoRequest,
///     ) -> Result<EchoRequest, HandlerError> {
///         Ok(request)
///     }
/// }
/// ```
#[async_trait]
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Typed request body.
    type Request: DeserializeOwned + Send;

    /// Typed response payload.
    type Response: Serialize + Send;

    /// Static metadata; must not change after registration.
    fn descriptor(&self) -> &HandlerDescriptor;

    /// Handle one request.
    async fn call(
        &self,
        ctx: &mut CallContext,
        request: Self::Request,
    ) -> Result<Self::Response, HandlerError>;
}

/// A protocol handler that runs on the role's entity actor (`Actor`).
///
/// Executes on the entity's consumer task with exclusive access to the
/// gameplay state; mark the state dirty through the call when mutating
/// anything that must be persisted.
#[async_trait]
pub trait EntityProtocolHandler<S: Send + Sync + 'static>: Send + Sync + 'static {
    /// Typed request body.
    type Request: DeserializeOwned + Send;

    /// Typed response payload.
    type Response: Serialize + Send;

    /// Static metadata; `run_on` must be [`RunOn::Actor`](super::RunOn::Actor).
    fn descriptor(&self) -> &HandlerDescriptor;

    /// Handle one request against the entity's state.
    async fn call(
        &self,
        state: &mut S,
        call: &mut EntityCall<'_, S>,
        request: Self::Request,
    ) -> Result<Self::Response, HandlerError>;
}

/// Decode a JSON body; an empty body reads as `null`.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, DispatchError> {
    let source: &[u8] = if body.is_empty() { b"null" } else { body };
    serde_json::from_slice(source).map_err(|error| DispatchError::BadRequest {
        detail: error.to_string(),
    })
}

/// Turn a handler result into an encoded reply envelope.
///
/// Domain rejections pass through with their code; internal failures are
/// logged under a fresh trace id and collapse to a generic error.
pub(crate) fn handler_outcome<R: Serialize>(
    name: &'static str,
    result: Result<R, HandlerError>,
) -> Result<Bytes, DispatchError> {
    match result {
        Ok(response) => match serde_json::to_value(response) {
            Ok(value) => Ok(ReplyEnvelope::ok(value).encode()),
            Err(encode_error) => {
                let trace = Uuid::new_v4();
                error!(handler = name, %trace, %encode_error, "response encoding failed");
                Err(DispatchError::HandlerFailed)
            }
        },
        Err(HandlerError::Rejected { code, message }) => {
            Ok(ReplyEnvelope::failure(code, message).encode())
        }
        Err(HandlerError::Internal(detail)) => {
            let trace = Uuid::new_v4();
            error!(handler = name, %trace, detail = %detail, "handler failed");
            Err(DispatchError::HandlerFailed)
        }
    }
}

/// Type-erased stateless handler stored in the registry.
#[async_trait]
pub(crate) trait StatelessRoute: Send + Sync + 'static {
    fn descriptor(&self) -> &HandlerDescriptor;

    async fn invoke(&self, ctx: &mut CallContext, body: Bytes) -> Result<Bytes, DispatchError>;
}

#[async_trait]
impl<H: ProtocolHandler> StatelessRoute for H {
    fn descriptor(&self) -> &HandlerDescriptor {
        ProtocolHandler::descriptor(self)
    }

    async fn invoke(&self, ctx: &mut CallContext, body: Bytes) -> Result<Bytes, DispatchError> {
        let request: H::Request = decode_body(&body)?;
        handler_outcome(
            ProtocolHandler::descriptor(self).name,
            self.call(ctx, request).await,
        )
    }
}

/// Type-erased entity handler stored in the registry.
///
/// Decoding happens here, on the dispatch side, so a malformed body is
/// rejected before anything is enqueued on the entity's mailbox.
pub(crate) trait EntityRoute<S: Send + Sync + 'static>: Send + Sync + 'static {
    fn descriptor(&self) -> &HandlerDescriptor;

    fn prepare(self: Arc<Self>, body: Bytes) -> Result<EntityJob<S>, DispatchError>;
}

impl<S: Send + Sync + 'static, H: EntityProtocolHandler<S>> EntityRoute<S> for H {
    fn descriptor(&self) -> &HandlerDescriptor {
        <H as EntityProtocolHandler<S>>::descriptor(self)
    }

    fn prepare(self: Arc<Self>, body: Bytes) -> Result<EntityJob<S>, DispatchError> {
        let request: H::Request = decode_body(&body)?;
        Ok(EntityJob::from_handler(self, request))
    }
}
