//! Integration tests for project rooms over real WebSockets.
//!
//! Validates:
//! - Messages reach room peers but never echo back to the sender
//! - `@ai` messages produce exactly one AI reply for the whole room
//! - A missing API key still yields one AI reply carrying the error
//! - Rooms are isolated and removed once empty
//! - The HTTP collaborator endpoints

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use devchat_proto::codec::{self, Event};
use devchat_proto::envelope::AiReplyEnvelope;
use devchat_proto::message::{ChatMessage, MessageKind, Participant};
use devchat_relay::ai::{AiClient, AiError, GenerativeModel};
use devchat_relay::relay::{self, RelayState};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct SummaryModel;

#[async_trait]
impl GenerativeModel for SummaryModel {
    async fn generate_content(&self, prompt: &str) -> Result<String, AiError> {
        Ok(serde_json::json!({ "text": format!("summary of{prompt}") }).to_string())
    }
}

/// Slow model so tests can observe the relay staying responsive.
struct SlowModel;

#[async_trait]
impl GenerativeModel for SlowModel {
    async fn generate_content(&self, _prompt: &str) -> Result<String, AiError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok("late answer".to_string())
    }
}

async fn start_with_model(
    model: Arc<dyn GenerativeModel>,
) -> (std::net::SocketAddr, Arc<RelayState>) {
    let state = Arc::new(RelayState::new(AiClient::with_model(model)));
    let (addr, _handle) = relay::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start relay server");
    (addr, state)
}

async fn connect(addr: std::net::SocketAddr, project: Option<&str>) -> Ws {
    let url = match project {
        Some(p) => format!("ws://{addr}/ws?projectId={p}"),
        None => format!("ws://{addr}/ws"),
    };
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

/// Connects and waits until the relay has registered the new member.
async fn connect_member(
    addr: std::net::SocketAddr,
    state: &RelayState,
    project: &str,
    expected_members: usize,
) -> Ws {
    let ws = connect(addr, Some(project)).await;
    wait_for_members(state, project, expected_members).await;
    ws
}

async fn wait_for_members(state: &RelayState, room: &str, expected: usize) {
    for _ in 0..100 {
        if state.rooms.member_count(room).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room {room} never reached {expected} members");
}

async fn wait_for_rooms(state: &RelayState, expected: usize) {
    for _ in 0..100 {
        if state.rooms.room_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room count never reached {expected}");
}

fn alice() -> Participant {
    Participant::human("alice", "alice@example.com")
}

async fn send_text(ws: &mut Ws, sender: Participant, text: &str) {
    let frame = codec::encode(&Event::ProjectMessage(ChatMessage::text(sender, text))).unwrap();
    ws.send(tungstenite::Message::text(frame)).await.unwrap();
}

async fn recv_event(ws: &mut Ws) -> Event {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("recv timed out")
        .unwrap()
        .unwrap();
    codec::decode(msg.to_text().unwrap()).unwrap()
}

async fn recv_chat(ws: &mut Ws) -> ChatMessage {
    match recv_event(ws).await {
        Event::ProjectMessage(msg) => msg,
        other => panic!("expected ProjectMessage, got {other:?}"),
    }
}

async fn assert_silent(ws: &mut Ws) {
    let next = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(next.is_err(), "expected no frame, got {next:?}");
}

#[tokio::test]
async fn peer_receives_message_sender_does_not() {
    let (addr, state) = start_with_model(Arc::new(SummaryModel)).await;
    let mut a = connect_member(addr, &state, "p1", 1).await;
    let mut b = connect_member(addr, &state, "p1", 2).await;

    send_text(&mut a, alice(), "hello").await;

    let msg = recv_chat(&mut b).await;
    assert_eq!(msg.message, "hello");
    assert_eq!(msg.sender, alice());
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn ai_trigger_replies_once_to_everyone() {
    let (addr, state) = start_with_model(Arc::new(SummaryModel)).await;
    let mut a = connect_member(addr, &state, "p1", 1).await;
    let mut b = connect_member(addr, &state, "p1", 2).await;

    send_text(&mut a, alice(), "@ai summarize this").await;

    // B gets the human message first.
    let human = recv_chat(&mut b).await;
    assert_eq!(human.message, "@ai summarize this");
    assert!(!human.sender.is_ai());

    for ws in [&mut a, &mut b] {
        let reply = recv_chat(ws).await;
        assert!(reply.sender.is_ai());
        assert_eq!(reply.sender.id(), "ai");
        let env = AiReplyEnvelope::from_json(&reply.message).unwrap();
        assert_eq!(env.text, "summary of summarize this");
    }
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn missing_api_key_still_replies_with_error() {
    let (addr, _handle) = relay::start_server("127.0.0.1:0").await.unwrap();
    let mut a = connect(addr, Some("p1")).await;
    let mut b = connect(addr, Some("p1")).await;
    // Let both joins land before sending.
    tokio::time::sleep(Duration::from_millis(100)).await;

    send_text(&mut a, alice(), "@ai hello?").await;

    let _human = recv_chat(&mut b).await;
    for ws in [&mut a, &mut b] {
        let reply = recv_chat(ws).await;
        assert!(reply.sender.is_ai());
        let env = AiReplyEnvelope::from_json(&reply.message).unwrap();
        assert!(env.text.contains("AI Error"), "got: {}", env.text);
    }
}

#[tokio::test]
async fn rooms_are_isolated() {
    let (addr, state) = start_with_model(Arc::new(SummaryModel)).await;
    let mut a = connect_member(addr, &state, "p1", 1).await;
    let mut c = connect_member(addr, &state, "p2", 1).await;

    send_text(&mut a, alice(), "@ai only for p1").await;

    let reply = recv_chat(&mut a).await;
    assert!(reply.sender.is_ai());
    assert_silent(&mut c).await;
}

#[tokio::test]
async fn missing_project_id_joins_default_room() {
    let (addr, state) = start_with_model(Arc::new(SummaryModel)).await;
    let mut a = connect(addr, None).await;
    let mut b = connect(addr, None).await;
    wait_for_members(&state, "default", 2).await;

    send_text(&mut a, alice(), "anyone here?").await;
    assert_eq!(recv_chat(&mut b).await.message, "anyone here?");
}

#[tokio::test]
async fn audio_message_is_relayed() {
    let (addr, state) = start_with_model(Arc::new(SummaryModel)).await;
    let mut a = connect_member(addr, &state, "p1", 1).await;
    let mut b = connect_member(addr, &state, "p1", 2).await;

    let frame = codec::encode(&Event::ProjectMessage(ChatMessage::audio(
        alice(),
        "data:audio/webm;base64,GkXfow==",
    )))
    .unwrap();
    a.send(tungstenite::Message::text(frame)).await.unwrap();

    let msg = recv_chat(&mut b).await;
    assert_eq!(msg.kind(), MessageKind::Audio);
    assert_eq!(msg.audio.as_deref(), Some("data:audio/webm;base64,GkXfow=="));
}

#[tokio::test]
async fn invalid_frame_returns_error_and_is_not_relayed() {
    let (addr, state) = start_with_model(Arc::new(SummaryModel)).await;
    let mut a = connect_member(addr, &state, "p1", 1).await;
    let mut b = connect_member(addr, &state, "p1", 2).await;

    a.send(tungstenite::Message::text(r#"{"event":"project-message","data":{}}"#))
        .await
        .unwrap();

    assert!(matches!(recv_event(&mut a).await, Event::Error { .. }));
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn pending_ai_reply_does_not_block_chat() {
    let (addr, state) = start_with_model(Arc::new(SlowModel)).await;
    let mut a = connect_member(addr, &state, "p1", 1).await;
    let mut b = connect_member(addr, &state, "p1", 2).await;

    send_text(&mut a, alice(), "@ai think hard").await;
    send_text(&mut a, alice(), "meanwhile").await;

    assert_eq!(recv_chat(&mut b).await.message, "@ai think hard");
    assert_eq!(recv_chat(&mut b).await.message, "meanwhile");

    let reply = recv_chat(&mut b).await;
    assert!(reply.sender.is_ai());
    assert_eq!(
        AiReplyEnvelope::from_json(&reply.message).unwrap().text,
        "late answer"
    );
}

#[tokio::test]
async fn room_removed_after_last_disconnect() {
    let (addr, state) = start_with_model(Arc::new(SummaryModel)).await;
    let mut a = connect_member(addr, &state, "p1", 1).await;
    let mut b = connect_member(addr, &state, "p1", 2).await;
    assert_eq!(state.rooms.room_count().await, 1);

    a.close(None).await.unwrap();
    wait_for_members(&state, "p1", 1).await;

    b.close(None).await.unwrap();
    wait_for_rooms(&state, 0).await;
}

#[tokio::test]
async fn reconnect_is_a_fresh_member() {
    let (addr, state) = start_with_model(Arc::new(SummaryModel)).await;
    let mut a = connect_member(addr, &state, "p1", 1).await;
    a.close(None).await.unwrap();
    wait_for_rooms(&state, 0).await;

    let mut a2 = connect_member(addr, &state, "p1", 1).await;
    let mut b = connect_member(addr, &state, "p1", 2).await;
    send_text(&mut b, Participant::human("bob", "bob@example.com"), "welcome back").await;
    assert_eq!(recv_chat(&mut a2).await.message, "welcome back");
}

#[tokio::test]
async fn collaborator_endpoints_return_sample_data() {
    let (addr, _state) = start_with_model(Arc::new(SummaryModel)).await;
    let client = reqwest::Client::new();

    let users: serde_json::Value = client
        .get(format!("http://{addr}/users/all"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(users["users"].as_array().unwrap().len(), 3);
    assert_eq!(users["users"][0]["_id"], "user1");
    assert_eq!(users["users"][0]["email"], "user1@example.com");

    let projects: serde_json::Value = client
        .get(format!("http://{addr}/projects/all"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(projects["projects"], serde_json::json!([]));

    let project: serde_json::Value = client
        .get(format!("http://{addr}/projects/get-project/p42"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(project["project"]["_id"], "p42");
    assert_eq!(project["project"]["name"], "Sample Project");
    assert_eq!(project["project"]["fileTree"], serde_json::json!({}));
}

#[tokio::test]
async fn ai_http_endpoint_returns_envelope() {
    let (addr, _state) = start_with_model(Arc::new(SummaryModel)).await;

    let body = reqwest::Client::new()
        .get(format!("http://{addr}/ai/get-result"))
        .query(&[("prompt", " a diff")])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let env = AiReplyEnvelope::from_json(&body).unwrap();
    assert_eq!(env.text, "summary of a diff");
}
