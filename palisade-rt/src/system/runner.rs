//! The per-entity consumer task.
//!
//! One task per resident entity: load, then drain the mailbox one
//! envelope at a time. This task is the only place the entity's state is
//! ever touched, which is what makes the single-writer guarantee hold.

// Layer 1: Standard library
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

// Layer 2: Third-party
use futures::FutureExt;
use tracing::{debug, error, warn};

// Layer 3: Internal
use super::actor_system::ActorSystem;
use super::config::DrainPolicy;
use super::errors::AskError;
use crate::actor::{EntityActor, EntityContext, EntityPhase, EntityVitals};
use crate::mailbox::Mailbox;
use crate::message::{Directive, Envelope};

pub(crate) async fn run<A: EntityActor>(
    system: ActorSystem<A>,
    id: A::Id,
    mut mailbox: Mailbox<A>,
    vitals: Arc<EntityVitals>,
) {
    let behavior = system.behavior();

    vitals.set_phase(EntityPhase::Loading);
    let mut state = match behavior.load_state(id).await {
        Ok(Some(state)) => state,
        Ok(None) => behavior.fresh_state(id),
        Err(error) => {
            error!(kind = A::KIND, entity = %id, %error, "entity state load failed");
            system
                .monitor()
                .entity_load_failed(A::KIND, &id.to_string(), &error.to_string());
            vitals.set_phase(EntityPhase::Stopped);
            system.remove_entity(&id);
            // Everything already queued is answered with the load failure.
            mailbox.close();
            while let Some(envelope) = mailbox.recv().await {
                envelope.reply(Err(AskError::LoadFailed));
            }
            return;
        }
    };

    vitals.set_phase(EntityPhase::Ready);
    vitals.touch();
    debug!(kind = A::KIND, entity = %id, "entity ready");

    let mut ctx = EntityContext::new(id, Arc::clone(&vitals), system.clone());

    while let Some(envelope) = mailbox.recv().await {
        let Envelope {
            directive, reply_to, ..
        } = envelope;
        match directive {
            Directive::Request(request) => {
                vitals.touch();
                let outcome = handle_request(&system, behavior.as_ref(), id, &mut state, request, &mut ctx).await;
                if let Some(sink) = reply_to {
                    let _ = sink.send(outcome);
                }
                if ctx.take_stop_request() {
                    break;
                }
            }
            Directive::Save => flush(&system, behavior.as_ref(), id, &state, &vitals).await,
            Directive::Stop => break,
        }
    }

    // Orderly stop: reject new sends, then deal with what is queued.
    vitals.set_phase(EntityPhase::Stopping);
    mailbox.close();
    let policy = system.config().drain_policy;
    while let Some(envelope) = mailbox.recv().await {
        let Envelope {
            directive, reply_to, ..
        } = envelope;
        match directive {
            Directive::Request(request) => match policy {
                DrainPolicy::Process => {
                    let outcome =
                        handle_request(&system, behavior.as_ref(), id, &mut state, request, &mut ctx)
                            .await;
                    if let Some(sink) = reply_to {
                        let _ = sink.send(outcome);
                    }
                }
                DrainPolicy::Discard => {
                    if let Some(sink) = reply_to {
                        let _ = sink.send(Err(AskError::Stopped));
                    }
                }
            },
            Directive::Save | Directive::Stop => {}
        }
    }

    if vitals.is_dirty() {
        match behavior.save_state(id, &state).await {
            Ok(()) => vitals.clear_dirty(),
            Err(error) => {
                warn!(kind = A::KIND, entity = %id, %error, "final save failed; latest state lost");
                system
                    .monitor()
                    .save_failed(A::KIND, &id.to_string(), &error.to_string());
            }
        }
    }

    vitals.set_phase(EntityPhase::Stopped);
    system.remove_entity(&id);
    debug!(kind = A::KIND, entity = %id, "entity stopped");
}

/// Invoke the user handler with fault containment.
///
/// Errors and panics are contained to the request: logged, counted, and
/// answered as a handler failure. State mutated before the fault is kept.
async fn handle_request<A: EntityActor>(
    system: &ActorSystem<A>,
    behavior: &A,
    id: A::Id,
    state: &mut A::State,
    request: A::Request,
    ctx: &mut EntityContext<A>,
) -> Result<A::Reply, AskError> {
    let invocation = AssertUnwindSafe(behavior.handle(state, request, ctx)).catch_unwind();
    match invocation.await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(error)) => {
            error!(kind = A::KIND, entity = %id, %error, "handler failed");
            system
                .monitor()
                .handler_fault(A::KIND, &id.to_string(), &error.to_string());
            Err(AskError::HandlerFailed)
        }
        Err(panic) => {
            let detail = panic_detail(panic.as_ref());
            error!(kind = A::KIND, entity = %id, detail = %detail, "handler panicked; state kept as-is");
            system
                .monitor()
                .handler_fault(A::KIND, &id.to_string(), &detail);
            Err(AskError::HandlerFailed)
        }
    }
}

/// Persist if dirty; on failure the flag stays set and the next tick retries.
async fn flush<A: EntityActor>(
    system: &ActorSystem<A>,
    behavior: &A,
    id: A::Id,
    state: &A::State,
    vitals: &EntityVitals,
) {
    if !vitals.is_dirty() {
        return;
    }
    match behavior.save_state(id, state).await {
        Ok(()) => {
            vitals.clear_dirty();
            debug!(kind = A::KIND, entity = %id, "entity state saved");
        }
        Err(error) => {
            warn!(kind = A::KIND, entity = %id, %error, "save failed; retrying next tick");
            system
                .monitor()
                .save_failed(A::KIND, &id.to_string(), &error.to_string());
        }
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
