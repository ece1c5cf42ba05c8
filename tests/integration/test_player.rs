//! Integration tests for the player HTTP API.
//!
//! Each test runs a real content server (with a dead gateway in front of a
//! working one) and a real player server, and talks to the player over
//! HTTP the way a front-end would.

mod support;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use support::{spawn_content_server, spawn_player, stage, FixedSpeech, Player};
use tokio::time::{sleep, timeout};
use vox_engine::{ProgressionState, SessionSnapshot};

async fn get(player: &Player, path: &str) -> (StatusCode, Value) {
    let response = Client::new()
        .get(player.url(path))
        .send()
        .await
        .expect("Request failed");
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn post(player: &Player, path: &str, body: Value) -> (StatusCode, Value) {
    let response = Client::new()
        .post(player.url(path))
        .json(&body)
        .send()
        .await
        .expect("Request failed");
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn status(player: &Player) -> SessionSnapshot {
    let (code, body) = get(player, "/api/status").await;
    assert_eq!(code, StatusCode::OK);
    serde_json::from_value(body).expect("Failed to parse snapshot")
}

/// Polls the status endpoint until `done` holds.
async fn wait_for_state(player: &Player, done: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
    timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = status(player).await;
            if done(&snapshot) {
                return snapshot;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timeout waiting for state")
}

// ============================================================================
// Playing a Stage
// ============================================================================

/// Plays stage 1 from start to finish and checks that stage 2 opens.
#[tokio::test]
async fn test_full_stage_over_http() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, Some(Arc::new(FixedSpeech("Hola!")))).await;

    assert_eq!(status(&player).await.state, ProgressionState::Idle);

    let (code, body) = post(&player, "/api/stage", stage(1)).await;
    assert_eq!(code, StatusCode::OK, "{body}");
    assert_eq!(body, json!({ "started": true, "index": 0, "total": 2 }));

    let (_, body) = post(&player, "/api/action", json!({ "control": { "option": 1 } })).await;
    assert_eq!(body["step"], "advance");
    assert_eq!(body["correct"], true);

    wait_for_state(&player, |s| s.index == Some(1)).await;

    let (_, body) = post(&player, "/api/action", json!({ "control": "mic" })).await;
    assert_eq!(body["step"], "listen");

    let done = wait_for_state(&player, |s| s.state == ProgressionState::Complete).await;
    assert_eq!(done.progress.exercise_index, 0);
    assert_eq!(
        done.progress.unlocked_stages["es"]["A1"]["basics"].iter().copied().collect::<Vec<_>>(),
        vec![1, 2]
    );

    let (code, _) = post(&player, "/api/menu/return", json!({})).await;
    assert_eq!(code, StatusCode::OK);
    let (code, body) = post(&player, "/api/stage", stage(2)).await;
    assert_eq!(code, StatusCode::OK, "{body}");
    assert_eq!(body["total"], 1);
}

/// A wrong answer keeps the learner on the same exercise.
#[tokio::test]
async fn test_wrong_answer_stays_on_exercise() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, Some(Arc::new(FixedSpeech("hola")))).await;

    post(&player, "/api/stage", stage(1)).await;
    let (_, body) = post(&player, "/api/action", json!({ "control": { "option": 0 } })).await;
    assert_eq!(body["step"], "retry");
    assert_eq!(body["correct"], false);

    sleep(Duration::from_millis(100)).await;
    let snapshot = status(&player).await;
    assert_eq!(
        snapshot.state,
        ProgressionState::Running {
            index: 0,
            advancing: false
        }
    );
}

// ============================================================================
// Access and Content Failures
// ============================================================================

#[tokio::test]
async fn test_locked_stage_is_forbidden() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;

    let (code, body) = post(&player, "/api/stage", stage(2)).await;
    assert_eq!(code, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "stage_locked");
    assert_eq!(status(&player).await.state, ProgressionState::Idle);
}

#[tokio::test]
async fn test_unlocked_language_opens_every_stage() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;

    let (code, body) = post(&player, "/api/progress/unlock", json!({ "language": "es" })).await;
    assert_eq!(code, StatusCode::OK, "{body}");

    let (code, _) = post(&player, "/api/stage", stage(2)).await;
    assert_eq!(code, StatusCode::OK);
}

/// Every gateway failing is reported as retryable, and the player goes
/// back to the menu.
#[tokio::test]
async fn test_stage_missing_from_every_gateway() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;

    let (code, body) = post(&player, "/api/stage", stage(3)).await;
    assert_eq!(code, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "content_load_failure");
    assert_eq!(body["retryable"], true);
    assert_eq!(status(&player).await.state, ProgressionState::Idle);
}

#[tokio::test]
async fn test_action_without_stage_conflicts() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;

    let (code, body) = post(&player, "/api/action", json!({ "control": "check" })).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "no_active_stage");
}

// ============================================================================
// Menu and Translations
// ============================================================================

#[tokio::test]
async fn test_menu_over_http() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;

    let (code, body) = get(&player, "/api/menu").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["language"], "es");
    let stages = &body["levels"][0]["sections"][0]["stages"];
    assert_eq!(stages[0]["accessible"], true);
    assert_eq!(stages[1]["accessible"], false);
    assert_eq!(stages[2]["accessible"], true);

    let (code, _) = get(&player, "/api/menu?language=de").await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_translation_follows_translation_language() {
    let content = spawn_content_server().await;
    let player = spawn_player(content, None).await;

    let (_, body) = get(&player, "/api/translation/e1").await;
    assert_eq!(body["text"], vox_engine::NO_TRANSLATION);

    let (code, body) = post(&player, "/api/progress/languages", json!({ "translation": "en" })).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["translationLanguage"], "en");

    let (_, body) = get(&player, "/api/translation/e1").await;
    assert_eq!(body["text"], "Which one is the dog?");
    let (_, body) = get(&player, "/api/translation/e2").await;
    assert_eq!(body["text"], vox_engine::NO_TRANSLATION);
}
