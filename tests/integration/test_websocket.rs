//! Integration tests for the player event stream.
//!
//! These tests follow a session through `/ws` while driving it over HTTP,
//! including speech capture bridged through the connected client.

mod support;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use support::{spawn_content_server, spawn_player, stage, Player};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use vox_engine::{PlayerEvent, ProgressionState, View};

const RETRY_STATUS: &str = "Could not hear you. Try again.";

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects a WebSocket client to the player.
async fn connect_client(player: &Player) -> WsClient {
    let (ws_stream, _) = connect_async(player.ws_url())
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message from the WebSocket and parses it as a
/// `PlayerEvent`. Answers pings along the way.
async fn receive_event(client: &mut WsClient) -> PlayerEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Skips events until one named `name` arrives.
async fn wait_for_event(client: &mut WsClient, name: &str) -> PlayerEvent {
    loop {
        let event = receive_event(client).await;
        if event.event_name() == name {
            return event;
        }
    }
}

fn is_exercise(view: Option<&View>, exercise_id: &str) -> bool {
    view.and_then(View::as_exercise)
        .is_some_and(|e| e.exercise_id == exercise_id)
}

async fn post(player: &Player, path: &str, body: Value) -> Value {
    Client::new()
        .post(player.url(path))
        .json(&body)
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .unwrap_or(Value::Null)
}

// ============================================================================
// Connection Tests
// ============================================================================

/// Tests that a client receives a snapshot when it connects.
#[tokio::test]
async fn test_client_receives_connected_snapshot() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;

    let mut client = connect_client(&player).await;
    let event = receive_event(&mut client).await;

    let PlayerEvent::Connected(payload) = event else {
        panic!("Expected Connected event, got: {event:?}");
    };
    assert_eq!(payload.snapshot.state, ProgressionState::Idle);
    assert!(payload.snapshot.view.is_none());
}

/// A client connecting mid-stage sees the mounted exercise in its snapshot.
#[tokio::test]
async fn test_late_client_snapshot_shows_exercise() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;
    post(&player, "/api/stage", stage(1)).await;

    let mut client = connect_client(&player).await;
    let PlayerEvent::Connected(payload) = receive_event(&mut client).await else {
        panic!("Expected Connected event");
    };
    assert_eq!(payload.snapshot.index, Some(0));
    assert_eq!(payload.snapshot.total, Some(2));
    let view = payload.snapshot.view.expect("Expected a view");
    assert_eq!(view.as_exercise().map(|e| e.exercise_id.as_str()), Some("e1"));
}

/// Tests that every connected client receives broadcast events.
#[tokio::test]
async fn test_events_reach_every_client() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;

    let mut first = connect_client(&player).await;
    let mut second = connect_client(&player).await;
    receive_event(&mut first).await;
    receive_event(&mut second).await;

    post(&player, "/api/stage", stage(1)).await;

    for client in [&mut first, &mut second] {
        let event = wait_for_event(client, "view").await;
        assert!(matches!(event, PlayerEvent::View(_)), "got {event:?}");
    }
}

// ============================================================================
// Feedback and Speech
// ============================================================================

/// A wrong answer shows feedback that is later cleared by id.
#[tokio::test]
async fn test_feedback_is_cleared_by_id() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;
    let mut client = connect_client(&player).await;
    receive_event(&mut client).await;

    post(&player, "/api/stage", stage(1)).await;
    post(&player, "/api/action", json!({ "control": { "option": 0 } })).await;

    let PlayerEvent::Feedback(feedback) = wait_for_event(&mut client, "feedback").await else {
        panic!("Expected Feedback event");
    };
    assert!(!feedback.correct);
    assert_eq!(feedback.exercise_id, "e1");

    let PlayerEvent::FeedbackCleared(cleared) = wait_for_event(&mut client, "feedback_cleared").await else {
        panic!("Expected FeedbackCleared event");
    };
    assert_eq!(cleared.feedback_id, feedback.feedback_id);
}

/// Plays stage 1 with the connected client doing speech recognition.
#[tokio::test]
async fn test_speech_bridged_through_client() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;
    let mut client = connect_client(&player).await;
    receive_event(&mut client).await;

    post(&player, "/api/stage", stage(1)).await;
    let report = post(&player, "/api/action", json!({ "control": { "option": 1 } })).await;
    assert_eq!(report["step"], "advance");

    let PlayerEvent::Feedback(feedback) = wait_for_event(&mut client, "feedback").await else {
        panic!("Expected Feedback event");
    };
    assert!(feedback.correct);

    // Wait for the pronunciation exercise.
    loop {
        if let PlayerEvent::View(payload) = wait_for_event(&mut client, "view").await {
            if is_exercise(payload.view.as_ref(), "e2") {
                break;
            }
        }
    }

    let report = post(&player, "/api/action", json!({ "control": "mic" })).await;
    assert_eq!(report["step"], "listen");

    let PlayerEvent::ListenRequested(request) = wait_for_event(&mut client, "listen_requested").await else {
        panic!("Expected ListenRequested event");
    };
    assert_eq!(request.language, "es");

    let response = post(
        &player,
        "/api/speech",
        json!({ "requestId": request.request_id, "transcript": "Hola!" }),
    )
    .await;
    assert_eq!(response["accepted"], true);

    let PlayerEvent::StageComplete(complete) = wait_for_event(&mut client, "stage_complete").await else {
        panic!("Expected StageComplete event");
    };
    assert_eq!(complete.location.stage, 1);
    assert_eq!(complete.unlocked, vec![1, 2]);

    // Nobody is waiting for that request any more.
    let response = post(
        &player,
        "/api/speech",
        json!({ "requestId": request.request_id, "transcript": "hola" }),
    )
    .await;
    assert_eq!(response["accepted"], false);
}

/// Without a connected client there is nobody to capture speech.
#[tokio::test]
async fn test_speech_without_client_reenables_mic() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;
    let mut events = player.session.events().subscribe();

    post(&player, "/api/stage", stage(1)).await;
    post(&player, "/api/action", json!({ "control": { "option": 1 } })).await;

    // Any subscriber counts as a speech client, so this one has to go
    // before the microphone is used.
    let mut saw_second_exercise = false;
    while !saw_second_exercise {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Event stream closed");
        if let PlayerEvent::View(payload) = event {
            saw_second_exercise = is_exercise(payload.view.as_ref(), "e2");
        }
    }
    drop(events);

    let report = post(&player, "/api/action", json!({ "control": "mic" })).await;
    assert_eq!(report["step"], "listen");

    let view = timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = player.session.snapshot().await;
            if let Some(exercise) = snapshot.view.as_ref().and_then(View::as_exercise) {
                if exercise.status.as_deref() == Some(RETRY_STATUS) {
                    return exercise.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Capture failure never reached the view");
    assert_eq!(view.exercise_id, "e2");
    assert_eq!(
        player.session.snapshot().await.state,
        ProgressionState::Running {
            index: 1,
            advancing: false
        }
    );
}
