//! The request pipeline.
//!
//! Per request: resolve handler, gate (auth, role, rate), decode,
//! execute per the handler's placement, encode the reply envelope, push
//! a `Response` carrying the request's sequence id. Every failure class
//! short-circuits to a typed response; the session stays up.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use dashmap::DashSet;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::descriptor::RunOn;
use super::error::DispatchError;
use super::handler::{CallContext, StatelessRoute};
use super::registry::{DispatchRegistry, Route, RouteEntry};
use crate::codec::Frame;
use crate::config::DispatcherConfig;
use crate::entity::{EntityMsg, EntityRuntime};
use crate::session::{Session, SessionManager};
use palisade_rt::ActorSystem;

/// Observability sink for the dispatch pipeline.
pub trait GateMonitor: Send + Sync + 'static {
    /// A request exceeded its handler's slow threshold.
    fn slow_request(&self, name: &'static str, key: u32, elapsed: Duration) {
        let _ = (name, key, elapsed);
    }
}

/// Monitor that ignores every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGateMonitor;

impl GateMonitor for NoopGateMonitor {}

/// The protocol dispatcher.
///
/// Cheap to clone; all clones share the registry, the session manager,
/// and the entity system.
pub struct Dispatcher<S: Send + Sync + 'static> {
    inner: Arc<DispatcherInner<S>>,
}

struct DispatcherInner<S: Send + Sync + 'static> {
    registry: DispatchRegistry<S>,
    sessions: Arc<SessionManager>,
    entities: ActorSystem<EntityRuntime<S>>,
    default_timeout: Duration,
    monitor: Arc<dyn GateMonitor>,
    unseen: DashSet<u32>,
}

impl<S: Send + Sync + 'static> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Send + Sync + 'static> Dispatcher<S> {
    /// Dispatcher with the no-op monitor.
    pub fn new(
        registry: DispatchRegistry<S>,
        sessions: Arc<SessionManager>,
        entities: ActorSystem<EntityRuntime<S>>,
        config: &DispatcherConfig,
    ) -> Self {
        Self::with_monitor(registry, sessions, entities, config, Arc::new(NoopGateMonitor))
    }

    /// Dispatcher with an injected monitor sink.
    pub fn with_monitor(
        registry: DispatchRegistry<S>,
        sessions: Arc<SessionManager>,
        entities: ActorSystem<EntityRuntime<S>>,
        config: &DispatcherConfig,
        monitor: Arc<dyn GateMonitor>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                sessions,
                entities,
                default_timeout: config.default_timeout,
                monitor,
                unseen: DashSet::new(),
            }),
        }
    }

    /// The entity system requests are routed onto.
    pub fn entities(&self) -> &ActorSystem<EntityRuntime<S>> {
        &self.inner.entities
    }

    /// Statistics snapshot for one handler key.
    pub fn handler_stats(&self, key: u32) -> Option<super::StatsSnapshot> {
        self.inner.registry.stats(key)
    }

    /// Run one inbound frame through the pipeline.
    ///
    /// Returns quickly: only `Caller` handlers execute inline;
    /// `Async` and `Actor` placements continue on their own tasks and
    /// push the response when done, so responses may complete out of
    /// order (clients correlate by sequence id).
    pub async fn dispatch(&self, session: Arc<Session>, frame: Frame) {
        let seq_id = frame.seq_id;
        let protocol_id = frame.protocol_id;
        let method_id = frame.method_id;
        let key = frame.protocol_key();

        let Some(entry) = self.inner.registry.lookup(key) else {
            if self.inner.unseen.insert(key) {
                warn!(key, "request for unregistered protocol key");
            }
            self.respond(
                &session,
                seq_id,
                protocol_id,
                method_id,
                Err(DispatchError::UnknownProtocol { key }),
            );
            return;
        };

        if let Err(denied) = gate(&entry, &session) {
            self.respond(&session, seq_id, protocol_id, method_id, Err(denied));
            return;
        }

        match &entry.route {
            Route::Stateless(handler) => {
                let handler = Arc::clone(handler);
                if entry.run_on == RunOn::Caller {
                    let started = Instant::now();
                    let outcome = self
                        .invoke_stateless(&handler, Arc::clone(&session), seq_id, key, frame.body)
                        .await;
                    self.finish(
                        &entry,
                        &session,
                        seq_id,
                        protocol_id,
                        method_id,
                        started.elapsed(),
                        outcome,
                    );
                } else {
                    let this = self.clone();
                    let entry = Arc::clone(&entry);
                    tokio::spawn(async move {
                        let started = Instant::now();
                        let outcome = this
                            .invoke_stateless(&handler, Arc::clone(&session), seq_id, key, frame.body)
                            .await;
                        this.finish(
                            &entry,
                            &session,
                            seq_id,
                            protocol_id,
                            method_id,
                            started.elapsed(),
                            outcome,
                        );
                    });
                }
            }
            Route::Entity(route) => {
                // Decode on the dispatch side; a malformed body never
                // reaches the entity's mailbox.
                let job = match Arc::clone(route).prepare(frame.body) {
                    Ok(job) => job,
                    Err(error) => {
                        self.respond(&session, seq_id, protocol_id, method_id, Err(error));
                        return;
                    }
                };

                let role_id = session.role_id();
                let this = self.clone();
                let entry = Arc::clone(&entry);
                tokio::spawn(async move {
                    let started = Instant::now();
                    let outcome = this
                        .inner
                        .entities
                        .ask_within(role_id, EntityMsg::Job(job), this.inner.default_timeout)
                        .await
                        .map_err(DispatchError::from);
                    this.finish(
                        &entry,
                        &session,
                        seq_id,
                        protocol_id,
                        method_id,
                        started.elapsed(),
                        outcome,
                    );
                });
            }
        }
    }

    async fn invoke_stateless(
        &self,
        handler: &Arc<dyn StatelessRoute>,
        session: Arc<Session>,
        seq_id: u32,
        key: u32,
        body: Bytes,
    ) -> Result<Bytes, DispatchError> {
        let mut ctx = CallContext {
            session,
            sessions: Arc::clone(&self.inner.sessions),
            seq_id,
            key,
        };
        let deadline = self.inner.default_timeout;
        match timeout(deadline, handler.invoke(&mut ctx, body)).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(DispatchError::Timeout(deadline)),
        }
    }

    fn finish(
        &self,
        entry: &RouteEntry<S>,
        session: &Session,
        seq_id: u32,
        protocol_id: u16,
        method_id: u16,
        elapsed: Duration,
        outcome: Result<Bytes, DispatchError>,
    ) {
        entry.stats.record(elapsed, outcome.is_ok());
        if elapsed >= entry.slow_threshold {
            warn!(
                handler = entry.name,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow request"
            );
            self.inner.monitor.slow_request(entry.name, entry.key, elapsed);
        }
        self.respond(session, seq_id, protocol_id, method_id, outcome);
    }

    fn respond(
        &self,
        session: &Session,
        seq_id: u32,
        protocol_id: u16,
        method_id: u16,
        outcome: Result<Bytes, DispatchError>,
    ) {
        // One-way frames carry no sequence id to correlate a reply to.
        if seq_id == 0 {
            return;
        }
        let body = match outcome {
            Ok(body) => body,
            Err(error) => error.envelope().encode(),
        };
        let frame = Frame::response(seq_id, protocol_id, method_id, body);
        if let Err(error) = session.send_frame(frame) {
            debug!(session = session.id(), %error, "response not delivered");
        }
    }
}

fn gate<S: Send + Sync + 'static>(entry: &RouteEntry<S>, session: &Session) -> Result<(), DispatchError> {
    if entry.require_auth && !session.is_authenticated() {
        return Err(DispatchError::Unauthorized);
    }
    if entry.require_role && session.role_id() == 0 {
        return Err(DispatchError::RoleNotSelected);
    }
    if let Some(limiter) = &entry.limiter {
        if !limiter.try_acquire() {
            return Err(DispatchError::RateLimited);
        }
    }
    Ok(())
}
