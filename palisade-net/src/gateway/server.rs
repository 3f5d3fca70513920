//! The gateway server.
//!
//! One accept loop; per connection a framed reader driven on its own
//! task and a single writer task draining the session's bounded
//! outbound queue. Read and decode run in parallel across connections;
//! the write side of each connection is the one serialization point.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

// Layer 3: Internal module imports
use crate::codec::{system, Frame, FrameCodec};
use crate::config::GateConfig;
use crate::dispatch::{DispatchError, DispatchRegistry, Dispatcher, GateMonitor, ReplyEnvelope};
use crate::entity::{EntityEvents, EntityRuntime, NoEvents, StateStore};
use crate::session::{KickReason, Session, SessionManager};
use palisade_rt::{ActorSystem, NoopMonitor, SystemMonitor};

/// Gateway startup and shutdown failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Socket setup failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the monitors can observe, bundled for injection.
pub struct GatewaySinks {
    /// Entity runtime incidents.
    pub runtime: Arc<dyn SystemMonitor>,

    /// Dispatch pipeline incidents.
    pub dispatch: Arc<dyn GateMonitor>,
}

impl Default for GatewaySinks {
    fn default() -> Self {
        Self {
            runtime: Arc::new(NoopMonitor),
            dispatch: Arc::new(crate::dispatch::NoopGateMonitor),
        }
    }
}

/// The running gateway.
///
/// Owns the session manager, the entity system, and the dispatcher;
/// composes them over a TCP listener.
pub struct Gateway<S: Send + Sync + 'static> {
    config: GateConfig,
    sessions: Arc<SessionManager>,
    dispatcher: Dispatcher<S>,
    entities: ActorSystem<EntityRuntime<S>>,
    local_addr: SocketAddr,
    running: AtomicBool,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    reap_task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Send + Sync + 'static> Gateway<S> {
    /// Start a gateway with no notice hook and no monitors.
    pub async fn start(
        config: GateConfig,
        registry: DispatchRegistry<S>,
        store: Arc<dyn StateStore<S>>,
    ) -> Result<Arc<Self>, GatewayError> {
        Self::start_with(config, registry, store, Arc::new(NoEvents), GatewaySinks::default()).await
    }

    /// Start a fully wired gateway.
    pub async fn start_with(
        config: GateConfig,
        registry: DispatchRegistry<S>,
        store: Arc<dyn StateStore<S>>,
        events: Arc<dyn EntityEvents<S>>,
        sinks: GatewaySinks,
    ) -> Result<Arc<Self>, GatewayError> {
        config.validate().map_err(GatewayError::Config)?;

        let sessions = Arc::new(SessionManager::new(config.session.clone()));
        let runtime = EntityRuntime::with_events(store, Arc::clone(&sessions), events);
        let entities =
            ActorSystem::with_monitor(config.actor.clone(), runtime, Arc::clone(&sinks.runtime));
        let dispatcher = Dispatcher::with_monitor(
            registry,
            Arc::clone(&sessions),
            entities.clone(),
            &config.dispatcher,
            Arc::clone(&sinks.dispatch),
        );

        let listener =
            TcpListener::bind((config.listen.host.as_str(), config.listen.port)).await?;
        let local_addr = listener.local_addr()?;

        let gateway = Arc::new(Self {
            config,
            sessions,
            dispatcher,
            entities,
            local_addr,
            running: AtomicBool::new(true),
            accept_task: Mutex::new(None),
            reap_task: Mutex::new(None),
        });

        let accept = tokio::spawn(accept_loop(Arc::clone(&gateway), listener));
        *gateway.accept_task.lock() = Some(accept);

        let reap_sessions = Arc::clone(&gateway.sessions);
        let reap_interval = gateway.config.session.reap_interval;
        let reap = tokio::spawn(async move {
            let mut tick = interval(reap_interval);
            loop {
                tick.tick().await;
                reap_sessions.reap(Utc::now());
            }
        });
        *gateway.reap_task.lock() = Some(reap);

        info!(addr = %local_addr, "gateway listening");
        Ok(gateway)
    }

    /// Bound listen address (with the OS-assigned port when configured
    /// with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The session manager.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// The entity system.
    pub fn entities(&self) -> &ActorSystem<EntityRuntime<S>> {
        &self.entities
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    /// Graceful shutdown: stop accepting, close every session, drain
    /// the entity system within its bounded deadline.
    pub async fn shutdown(&self) -> Result<(), GatewayError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("gateway shutting down");

        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.reap_task.lock().take() {
            task.abort();
        }

        self.sessions.shutdown_all(KickReason::ServerShutdown);
        if let Err(error) = self.entities.shutdown().await {
            debug!(%error, "entity system was already stopping");
        }
        Ok(())
    }
}

async fn accept_loop<S: Send + Sync + 'static>(gateway: Arc<Gateway<S>>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                let gateway = Arc::clone(&gateway);
                tokio::spawn(serve_connection(gateway, stream, remote));
            }
            Err(error) => {
                warn!(%error, "accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

async fn serve_connection<S: Send + Sync + 'static>(
    gateway: Arc<Gateway<S>>,
    stream: TcpStream,
    remote: SocketAddr,
) {
    if let Err(error) = stream.set_nodelay(true) {
        debug!(%remote, %error, "set_nodelay failed");
    }

    let codec = FrameCodec::new(gateway.config.max_frame);
    let (read_half, write_half) = stream.into_split();
    let mut reader = tokio_util::codec::FramedRead::new(read_half, codec.clone());

    // Single writer per connection: every outbound frame funnels
    // through this bounded queue, which keeps pushes FIFO.
    let (writer_tx, mut writer_rx) = mpsc::channel::<Frame>(gateway.config.write_buffer);
    let writer_task = tokio::spawn(async move {
        let mut sink = tokio_util::codec::FramedWrite::new(write_half, codec);
        while let Some(frame) = writer_rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut session = gateway.sessions.create_session(remote, writer_tx.clone());
    let idle = gateway.config.session.idle_read_timeout;

    loop {
        let next = tokio::select! {
            // Kicked (displacement, shutdown): tear the transport down.
            () = session.closed() => break,
            next = timeout(idle, reader.next()) => next,
        };

        let frame = match next {
            Err(_elapsed) => {
                debug!(session = session.id(), "idle read timeout");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(error))) => {
                // Framing is lost; the stream cannot be resynchronized.
                warn!(session = session.id(), %error, "frame error, closing connection");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        session.touch();

        if frame.protocol_key() == system::RECONNECT_KEY {
            handle_reconnect(&gateway, &mut session, &writer_tx, &frame);
            continue;
        }

        gateway
            .dispatcher
            .dispatch(Arc::clone(&session), frame)
            .await;
    }

    gateway.sessions.on_disconnect(&session);
    drop(writer_tx);
    // The writer task drains and exits once the session drops its
    // sender (disconnect clears it); no need to await it here.
    let _ = writer_task;
}

#[derive(Debug, Deserialize)]
struct ReconnectRequest {
    token: Uuid,
}

/// Adopt a disconnected session onto this connection.
///
/// Handled by the gateway itself because adoption rebinds the
/// connection's session reference, which no registry handler can do.
fn handle_reconnect<S: Send + Sync + 'static>(
    gateway: &Gateway<S>,
    session: &mut Arc<Session>,
    writer_tx: &mpsc::Sender<Frame>,
    frame: &Frame,
) {
    let respond = |target: &Session, envelope: ReplyEnvelope| {
        if frame.seq_id == 0 {
            return;
        }
        let response = Frame::response(
            frame.seq_id,
            frame.protocol_id,
            frame.method_id,
            envelope.encode(),
        );
        if let Err(error) = target.send_frame(response) {
            debug!(session = target.id(), %error, "reconnect response not delivered");
        }
    };

    let request: ReconnectRequest = match serde_json::from_slice(&frame.body) {
        Ok(request) => request,
        Err(error) => {
            let denied = DispatchError::BadRequest {
                detail: error.to_string(),
            };
            respond(session, denied.envelope());
            return;
        }
    };

    match gateway.sessions.reconnect(request.token, writer_tx.clone()) {
        Some(adopted) => {
            if adopted.id() != session.id() {
                // The placeholder session created at connect is gone.
                gateway.sessions.discard(session);
                *session = adopted;
            }
            respond(
                session,
                ReplyEnvelope::ok(serde_json::json!({
                    "session_id": session.id(),
                    "role_id": session.role_id(),
                })),
            );
        }
        None => {
            debug!("reconnect rejected");
            respond(session, DispatchError::Unauthorized.envelope());
        }
    }
}
