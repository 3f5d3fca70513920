//! End-to-end scenarios over a real TCP listener.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use common::{
    align_to_fresh_second, full_registry, player_store, PingRequest, TestClient,
};
use palisade_net::{
    codec::system, Frame, GateConfig, Gateway, MemoryStore, ReplyEnvelope, SecurityConfig,
};
use palisade_net::entity::StateStore;
use common::PlayerState;

async fn start_gateway(config: GateConfig) -> (Arc<Gateway<PlayerState>>, Arc<MemoryStore<PlayerState>>) {
    let store = player_store();
    let registry = full_registry(&SecurityConfig::default());
    let gateway = Gateway::start(
        config,
        registry,
        Arc::clone(&store) as Arc<dyn StateStore<PlayerState>>,
    )
    .await
    .unwrap();
    (gateway, store)
}

fn local_config() -> GateConfig {
    GateConfig::builder()
        .with_listen("127.0.0.1", 0)
        .build()
        .unwrap()
}

// ============================================================================
// Scenario: login then echo on one connection
// ============================================================================

#[tokio::test]
async fn test_login_then_ping_same_connection() {
    let (gateway, _store) = start_gateway(local_config()).await;
    let mut client = TestClient::connect(gateway.local_addr()).await;

    let login = client.login(1, "alice", 701).await;
    assert_eq!(login.role_id, 701);

    let envelope = client.round_trip(2, 2, 2, &PingRequest { delta: 1 }).await;
    assert_eq!(envelope.code, ReplyEnvelope::OK);
    assert_eq!(envelope.data.unwrap()["counter"], 1);

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unauthenticated_request_is_rejected() {
    let (gateway, _store) = start_gateway(local_config()).await;
    let mut client = TestClient::connect(gateway.local_addr()).await;

    let envelope = client.round_trip(1, 2, 1, &()).await;
    assert_eq!(envelope.code, 2);

    gateway.shutdown().await.unwrap();
}

// ============================================================================
// Scenario: kick on second login
// ============================================================================

#[tokio::test]
async fn test_second_login_displaces_first() {
    let (gateway, _store) = start_gateway(local_config()).await;

    let mut first = TestClient::connect(gateway.local_addr()).await;
    first.login(1, "alice", 702).await;

    let mut second = TestClient::connect(gateway.local_addr()).await;
    second.login(1, "alice", 702).await;

    // The displaced client sees the kick push, then its stream ends.
    let kick = first.recv().await;
    assert_eq!(kick.seq_id, 0);
    assert_eq!(kick.protocol_id, system::PROTOCOL_ID);
    assert_eq!(kick.method_id, system::METHOD_KICKED);
    let body: serde_json::Value = serde_json::from_slice(&kick.body).unwrap();
    assert_eq!(body["reason"], "displaced_by_login");
    assert!(first.recv_or_eof().await.is_none());

    // The role now answers on the second connection.
    let envelope = second.round_trip(2, 2, 2, &PingRequest { delta: 5 }).await;
    assert_eq!(envelope.data.unwrap()["counter"], 5);
    assert_eq!(
        gateway.sessions().find_by_role(702).unwrap().id(),
        2,
        "role must point at the second session"
    );

    gateway.shutdown().await.unwrap();
}

// ============================================================================
// Scenario: reconnect within grace
// ============================================================================

#[tokio::test]
async fn test_reconnect_within_grace_keeps_identity() {
    let config = GateConfig::builder()
        .with_listen("127.0.0.1", 0)
        .with_reconnect_grace(Duration::from_secs(30))
        .build()
        .unwrap();
    let (gateway, _store) = start_gateway(config).await;

    let mut first = TestClient::connect(gateway.local_addr()).await;
    let login = first.login(1, "alice", 703).await;
    let envelope = first.round_trip(2, 2, 2, &PingRequest { delta: 4 }).await;
    assert_eq!(envelope.data.unwrap()["counter"], 4);
    drop(first);

    // Give the server a moment to observe the disconnect.
    sleep(Duration::from_millis(100)).await;
    assert!(gateway.sessions().find_by_role(703).is_some());

    let mut second = TestClient::connect(gateway.local_addr()).await;
    let envelope = second
        .round_trip(3, 0, 2, &serde_json::json!({ "token": login.token }))
        .await;
    assert_eq!(envelope.code, ReplyEnvelope::OK);
    let data = envelope.data.unwrap();
    assert_eq!(data["session_id"], login.session_id);
    assert_eq!(data["role_id"], 703);

    // Still authenticated: the entity kept its counter.
    let envelope = second.round_trip(4, 2, 2, &PingRequest { delta: 1 }).await;
    assert_eq!(envelope.data.unwrap()["counter"], 5);

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_after_grace_rejected() {
    let config = GateConfig::builder()
        .with_listen("127.0.0.1", 0)
        .with_reconnect_grace(Duration::from_millis(150))
        .with_reap_interval(Duration::from_millis(50))
        .build()
        .unwrap();
    let (gateway, _store) = start_gateway(config).await;

    let mut first = TestClient::connect(gateway.local_addr()).await;
    let login = first.login(1, "alice", 704).await;
    drop(first);

    sleep(Duration::from_millis(500)).await;
    // The reap tick already removed the parked session.
    assert!(gateway.sessions().find_by_role(704).is_none());

    let mut second = TestClient::connect(gateway.local_addr()).await;
    let envelope = second
        .round_trip(2, 0, 2, &serde_json::json!({ "token": login.token }))
        .await;
    assert_eq!(envelope.code, 2);

    gateway.shutdown().await.unwrap();
}

// ============================================================================
// Scenario: rate limit over the wire
// ============================================================================

#[tokio::test]
async fn test_rate_limit_over_tcp() {
    let (gateway, _store) = start_gateway(local_config()).await;
    let mut client = TestClient::connect(gateway.local_addr()).await;

    align_to_fresh_second().await;
    let mut ok = 0;
    let mut limited = 0;
    for seq in 1..=5 {
        let envelope = client.round_trip(seq, 1, 3, &()).await;
        if envelope.is_ok() {
            ok += 1;
        } else {
            assert_eq!(envelope.code, 4);
            limited += 1;
        }
    }
    assert_eq!(ok, 3);
    assert_eq!(limited, 2);

    sleep(Duration::from_millis(1100)).await;
    for seq in 6..=8 {
        let envelope = client.round_trip(seq, 1, 3, &()).await;
        assert!(envelope.is_ok());
    }

    gateway.shutdown().await.unwrap();
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test]
async fn test_idle_read_timeout_closes_connection() {
    let config = GateConfig::builder()
        .with_listen("127.0.0.1", 0)
        .with_idle_read_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let (gateway, _store) = start_gateway(config).await;

    let mut client = TestClient::connect(gateway.local_addr()).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.sessions().session_count(), 1);

    // Silent client: the server closes and drops the session.
    assert!(client.recv_or_eof().await.is_none());
    sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.sessions().session_count(), 0);

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dirty_state_flushes_to_store() {
    let actor = palisade_rt::RuntimeConfig::builder()
        .with_save_interval(Duration::from_millis(100))
        .build()
        .unwrap();
    let config = GateConfig::builder()
        .with_listen("127.0.0.1", 0)
        .with_actor(actor)
        .build()
        .unwrap();
    let (gateway, store) = start_gateway(config).await;

    let mut client = TestClient::connect(gateway.local_addr()).await;
    client.login(1, "alice", 705).await;
    client.round_trip(2, 2, 2, &PingRequest { delta: 9 }).await;

    // The save tick persists the counter and clears the dirty flag.
    let mut flushed = false;
    for _ in 0..40 {
        if store.get(705).map(|s| s.counter) == Some(9) {
            flushed = true;
            break;
        }
        sleep(Duration::from_millis(25)).await;
    }
    assert!(flushed, "dirty state never reached the store");
    sleep(Duration::from_millis(50)).await;
    assert_eq!(gateway.entities().is_dirty(&705), Some(false));

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_kicks_clients_and_saves() {
    let (gateway, store) = start_gateway(local_config()).await;

    let mut client = TestClient::connect(gateway.local_addr()).await;
    client.login(1, "alice", 706).await;
    client.round_trip(2, 2, 2, &PingRequest { delta: 3 }).await;

    gateway.shutdown().await.unwrap();

    // Kick push with the shutdown reason, then EOF.
    let kick = client.recv().await;
    assert_eq!(kick.method_id, system::METHOD_KICKED);
    let body: serde_json::Value = serde_json::from_slice(&kick.body).unwrap();
    assert_eq!(body["reason"], "server_shutdown");
    assert!(client.recv_or_eof().await.is_none());

    // The entity drain saved the dirty counter.
    assert_eq!(store.get(706).map(|s| s.counter), Some(3));
    assert_eq!(gateway.entities().resident_count(), 0);
}

// ============================================================================
// Frame-level failures
// ============================================================================

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let config = GateConfig::builder()
        .with_listen("127.0.0.1", 0)
        .with_max_frame(64)
        .build()
        .unwrap();
    let (gateway, _store) = start_gateway(config).await;

    let mut client = TestClient::connect(gateway.local_addr()).await;
    // Client-side codec allows what the server will refuse.
    client
        .send(Frame::request(
            1,
            1,
            2,
            bytes::Bytes::from(vec![b'x'; 1024]),
        ))
        .await;

    assert!(client.recv_or_eof().await.is_none());

    gateway.shutdown().await.unwrap();
}
