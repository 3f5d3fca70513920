//! Type-erased unit of work enqueued on an entity's mailbox.

// Layer 1: Standard library imports
use std::marker::PhantomData;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;

// Layer 3: Internal module imports
use super::call::EntityCall;
use crate::dispatch::{handler_outcome, DispatchError, EntityProtocolHandler};

/// Erased executor: a handler plus its already-decoded request.
#[async_trait]
trait JobRun<S: Send + Sync + 'static>: Send {
    async fn run(
        self: Box<Self>,
        state: &mut S,
        call: &mut EntityCall<'_, S>,
    ) -> Result<Bytes, DispatchError>;
}

struct TypedJob<S: Send + Sync + 'static, H: EntityProtocolHandler<S>> {
    handler: Arc<H>,
    request: H::Request,
    _state: PhantomData<fn(S)>,
}

#[async_trait]
impl<S: Send + Sync + 'static, H: EntityProtocolHandler<S>> JobRun<S> for TypedJob<S, H> {
    async fn run(
        self: Box<Self>,
        state: &mut S,
        call: &mut EntityCall<'_, S>,
    ) -> Result<Bytes, DispatchError> {
        let this = *self;
        let name = this.handler.descriptor().name;
        handler_outcome(name, this.handler.call(state, call, this.request).await)
    }
}

/// One entity-bound request, ready to execute against the state.
///
/// Built by the dispatcher after decoding; the entity's consumer task
/// runs it with exclusive state access and replies with the encoded
/// envelope.
pub struct EntityJob<S: Send + Sync + 'static> {
    name: &'static str,
    run: Box<dyn JobRun<S>>,
}

impl<S: Send + Sync + 'static> EntityJob<S> {
    pub(crate) fn from_handler<H: EntityProtocolHandler<S>>(
        handler: Arc<H>,
        request: H::Request,
    ) -> Self {
        let name = handler.descriptor().name;
        Self {
            name,
            run: Box::new(TypedJob {
                handler,
                request,
                _state: PhantomData,
            }),
        }
    }

    /// Name of the handler behind this job.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) async fn execute(
        self,
        state: &mut S,
        call: &mut EntityCall<'_, S>,
    ) -> Result<Bytes, DispatchError> {
        self.run.run(state, call).await
    }
}

impl<S: Send + Sync + 'static> std::fmt::Debug for EntityJob<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityJob").field("name", &self.name).finish()
    }
}
