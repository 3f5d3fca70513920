//! Shared fixtures: a small gameplay protocol over the core.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;

use palisade_net::{
    CallContext, DispatchRegistry, EntityCall, EntityProtocolHandler, Frame, FrameCodec,
    HandlerDescriptor, HandlerError, MemoryStore, ProtocolHandler, RegistryBuilder, ReplyEnvelope,
    SecurityConfig,
};

/// Gameplay state carried by the player entity.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub counter: i64,
}

pub fn player_store() -> Arc<MemoryStore<PlayerState>> {
    Arc::new(MemoryStore::new(|_| PlayerState::default()))
}

// ---------------------------------------------------------------------------
// Protocol bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct LoginRequest {
    pub user: String,
    pub role_id: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    pub session_id: u64,
    pub role_id: u64,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EchoRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PingRequest {
    pub delta: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PingResponse {
    pub counter: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HoldRequest {
    pub millis: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `auth.login` (1,1): open, binds the requested role to the session.
pub struct LoginHandler {
    descriptor: HandlerDescriptor,
}

impl LoginHandler {
    pub fn new() -> Self {
        Self {
            descriptor: HandlerDescriptor::new(1, 1, "auth.login").open(),
        }
    }
}

#[async_trait]
impl ProtocolHandler for LoginHandler {
    type Request = LoginRequest;
    type Response = LoginResponse;

    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn call(
        &self,
        ctx: &mut CallContext,
        request: LoginRequest,
    ) -> Result<LoginResponse, HandlerError> {
        if request.user.is_empty() {
            return Err(HandlerError::rejected(1001, "empty user"));
        }
        ctx.sessions
            .authenticate(&ctx.session, request.user.clone(), 1);
        ctx.sessions
            .bind_role(&ctx.session, request.role_id, request.user);
        Ok(LoginResponse {
            session_id: ctx.session.id(),
            role_id: request.role_id,
            token: ctx.session.reconnect_token().to_string(),
        })
    }
}

/// `misc.echo` (1,2): open, returns the request verbatim.
pub struct EchoHandler {
    descriptor: HandlerDescriptor,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self {
            descriptor: HandlerDescriptor::new(1, 2, "misc.echo").open(),
        }
    }
}

#[async_trait]
impl ProtocolHandler for EchoHandler {
    type Request = EchoRequest;
    type Response = EchoRequest;

    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn call(
        &self,
        _ctx: &mut CallContext,
        request: EchoRequest,
    ) -> Result<EchoRequest, HandlerError> {
        Ok(request)
    }
}

/// `misc.limited` (1,3): open, three admissions per second.
pub struct LimitedHandler {
    descriptor: HandlerDescriptor,
}

impl LimitedHandler {
    pub fn new() -> Self {
        Self {
            descriptor: HandlerDescriptor::new(1, 3, "misc.limited")
                .open()
                .rate_limited(3),
        }
    }
}

#[async_trait]
impl ProtocolHandler for LimitedHandler {
    type Request = ();
    type Response = ();

    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn call(&self, _ctx: &mut CallContext, _request: ()) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// `misc.slow` (1,4): open, async pool, sleeps as told.
pub struct SlowHandler {
    descriptor: HandlerDescriptor,
}

impl SlowHandler {
    pub fn new() -> Self {
        Self {
            descriptor: HandlerDescriptor::new(1, 4, "misc.slow").open().on_async(),
        }
    }
}

#[async_trait]
impl ProtocolHandler for SlowHandler {
    type Request = HoldRequest;
    type Response = ();

    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn call(&self, _ctx: &mut CallContext, request: HoldRequest) -> Result<(), HandlerError> {
        sleep(Duration::from_millis(request.millis)).await;
        Ok(())
    }
}

/// `misc.broken` (1,5): open, always fails internally.
pub struct BrokenHandler {
    descriptor: HandlerDescriptor,
}

impl BrokenHandler {
    pub fn new() -> Self {
        Self {
            descriptor: HandlerDescriptor::new(1, 5, "misc.broken").open(),
        }
    }
}

#[async_trait]
impl ProtocolHandler for BrokenHandler {
    type Request = ();
    type Response = ();

    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn call(&self, _ctx: &mut CallContext, _request: ()) -> Result<(), HandlerError> {
        Err(HandlerError::internal("wires crossed"))
    }
}

/// `acct.profile` (2,1): inherits the default auth requirement.
pub struct ProfileHandler {
    descriptor: HandlerDescriptor,
}

impl ProfileHandler {
    pub fn new() -> Self {
        Self {
            descriptor: HandlerDescriptor::new(2, 1, "acct.profile"),
        }
    }
}

#[async_trait]
impl ProtocolHandler for ProfileHandler {
    type Request = ();
    type Response = serde_json::Value;

    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn call(
        &self,
        ctx: &mut CallContext,
        _request: (),
    ) -> Result<serde_json::Value, HandlerError> {
        let binding = ctx.session.binding();
        Ok(serde_json::json!({
            "account": binding.account_id,
            "role": binding.role_id,
        }))
    }
}

/// `player.ping` (2,2): entity-bound counter bump.
pub struct PingHandler {
    descriptor: HandlerDescriptor,
}

impl PingHandler {
    pub fn new() -> Self {
        Self {
            descriptor: HandlerDescriptor::new(2, 2, "player.ping").on_actor(),
        }
    }
}

#[async_trait]
impl EntityProtocolHandler<PlayerState> for PingHandler {
    type Request = PingRequest;
    type Response = PingResponse;

    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn call(
        &self,
        state: &mut PlayerState,
        call: &mut EntityCall<'_, PlayerState>,
        request: PingRequest,
    ) -> Result<PingResponse, HandlerError> {
        state.counter += request.delta;
        call.mark_dirty();
        Ok(PingResponse {
            counter: state.counter,
        })
    }
}

/// `player.hold` (2,3): entity-bound sleep, for busy/timeout tests.
pub struct HoldHandler {
    descriptor: HandlerDescriptor,
}

impl HoldHandler {
    pub fn new() -> Self {
        Self {
            descriptor: HandlerDescriptor::new(2, 3, "player.hold").on_actor(),
        }
    }
}

#[async_trait]
impl EntityProtocolHandler<PlayerState> for HoldHandler {
    type Request = HoldRequest;
    type Response = ();

    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn call(
        &self,
        _state: &mut PlayerState,
        _call: &mut EntityCall<'_, PlayerState>,
        request: HoldRequest,
    ) -> Result<(), HandlerError> {
        sleep(Duration::from_millis(request.millis)).await;
        Ok(())
    }
}

/// Full registry used by the suites.
pub fn full_registry(security: &SecurityConfig) -> DispatchRegistry<PlayerState> {
    RegistryBuilder::new(security)
        .stateless(LoginHandler::new())
        .unwrap()
        .stateless(EchoHandler::new())
        .unwrap()
        .stateless(LimitedHandler::new())
        .unwrap()
        .stateless(SlowHandler::new())
        .unwrap()
        .stateless(BrokenHandler::new())
        .unwrap()
        .stateless(ProfileHandler::new())
        .unwrap()
        .entity(PingHandler::new())
        .unwrap()
        .entity(HoldHandler::new())
        .unwrap()
        .build()
}

// ---------------------------------------------------------------------------
// Frame helpers
// ---------------------------------------------------------------------------

pub fn json_frame<T: Serialize>(seq: u32, protocol_id: u16, method_id: u16, body: &T) -> Frame {
    Frame::request(
        seq,
        protocol_id,
        method_id,
        Bytes::from(serde_json::to_vec(body).unwrap()),
    )
}

pub fn empty_frame(seq: u32, protocol_id: u16, method_id: u16) -> Frame {
    Frame::request(seq, protocol_id, method_id, Bytes::new())
}

/// Sleep until just after the next wall-clock second starts, so a burst
/// of rate-limited requests lands inside one window.
pub async fn align_to_fresh_second() {
    let now = chrono::Utc::now();
    let millis = now.timestamp_subsec_millis() as u64;
    sleep(Duration::from_millis(1010 - millis.min(1000))).await;
}

// ---------------------------------------------------------------------------
// TCP test client
// ---------------------------------------------------------------------------

/// Minimal client speaking the wire protocol.
pub struct TestClient {
    framed: Framed<TcpStream, FrameCodec>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(stream, FrameCodec::default()),
        }
    }

    pub async fn send(&mut self, frame: Frame) {
        self.framed.send(frame).await.unwrap();
    }

    /// Next frame within two seconds.
    pub async fn recv(&mut self) -> Frame {
        timeout(Duration::from_secs(2), self.framed.next())
            .await
            .expect("no frame within deadline")
            .expect("connection closed")
            .expect("frame error")
    }

    /// Next frame, or `None` if the connection closes first.
    pub async fn recv_or_eof(&mut self) -> Option<Frame> {
        match timeout(Duration::from_secs(2), self.framed.next()).await {
            Ok(Some(Ok(frame))) => Some(frame),
            _ => None,
        }
    }

    /// Send a request and wait for the response with the same seq.
    /// Pushes arriving in between are skipped.
    pub async fn round_trip<T: Serialize>(
        &mut self,
        seq: u32,
        protocol_id: u16,
        method_id: u16,
        body: &T,
    ) -> ReplyEnvelope {
        self.send(json_frame(seq, protocol_id, method_id, body)).await;
        loop {
            let frame = self.recv().await;
            if frame.seq_id == seq {
                return ReplyEnvelope::decode(&frame.body).unwrap();
            }
        }
    }

    pub async fn login(&mut self, seq: u32, user: &str, role_id: u64) -> LoginResponse {
        let envelope = self
            .round_trip(
                seq,
                1,
                1,
                &LoginRequest {
                    user: user.to_string(),
                    role_id,
                },
            )
            .await;
        assert_eq!(envelope.code, ReplyEnvelope::OK, "login failed: {envelope:?}");
        serde_json::from_value(envelope.data.unwrap()).unwrap()
    }
}
