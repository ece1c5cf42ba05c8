//! Shared fixtures: a content server with a failing and a working gateway,
//! and a player server wired to it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use vox_content::{HttpFetcher, MediaResolver, SourceConfig};
use vox_engine::{create_router, MemoryStore, PlayerSession, SessionOptions, SpeechToText, Timings};

pub const STAGE_ONE: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
pub const STAGE_TWO: &str = "QmT78zSuBmuS4z925WZfrqQ1qHaJ56DQaTfyMUF7F8ff5o";
/// Listed in the manifest but served by no gateway.
pub const STAGE_GONE: &str = "QmPZ9gcCEpqKTo6aq61g2nXGUhM4iCL3ewB6LDXZCtioEB";

type Documents = Arc<HashMap<String, Value>>;

fn documents() -> HashMap<String, Value> {
    let mut docs = HashMap::new();
    docs.insert(
        "manifest.json".to_string(),
        json!({ "languages": { "es": { "name": "Spanish", "levels": { "A1": { "sections": [{
            "id": "basics",
            "title": "Basics",
            "stages": [
                { "id": 1, "cid": format!("ipfs://{STAGE_ONE}") },
                { "id": 2, "cid": STAGE_TWO, "isFree": false },
                { "id": 3, "cid": STAGE_GONE, "isFree": true }
            ]
        }]}}}}}),
    );
    docs.insert(
        STAGE_ONE.to_string(),
        json!({ "exercises": [
            { "id": "e1", "type": "multiple_choice", "question": "Dog?", "options": ["gato", "perro"], "answer": "perro" },
            { "id": "e2", "type": "pronunciation", "question": "Say hola", "answer": "hola" }
        ]}),
    );
    docs.insert(
        STAGE_TWO.to_string(),
        json!({ "exercises": [
            { "id": "f1", "type": "flashcard", "question": "adiós", "answer": "goodbye" }
        ]}),
    );
    docs.insert(
        "translations/en.json".to_string(),
        json!({ "e1": "Which one is the dog?" }),
    );
    docs
}

async fn serve_document(State(docs): State<Documents>, Path(key): Path<String>) -> Result<Json<Value>, StatusCode> {
    docs.get(&key).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Serves `/cdn/{path}` and `/gateway/{cid}` from the fixture documents;
/// `/missing/{anything}` always answers 404.
pub async fn spawn_content_server() -> SocketAddr {
    let docs: Documents = Arc::new(documents());
    let router = Router::new()
        .route("/cdn/*path", get(serve_document))
        .route("/gateway/*cid", get(serve_document))
        .route("/missing/*rest", get(|| async { StatusCode::NOT_FOUND }))
        .with_state(docs);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Always hears the same thing.
pub struct FixedSpeech(pub &'static str);

impl SpeechToText for FixedSpeech {
    fn listen<'a>(&'a self, _language: &'a str) -> BoxFuture<'a, vox_engine::Result<String>> {
        Box::pin(async move { Ok(self.0.to_string()) })
    }
}

/// A running player.
pub struct Player {
    pub addr: SocketAddr,
    pub session: Arc<PlayerSession>,
}

impl Player {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Starts a player whose content comes from `content`, trying the dead
/// gateway before the working one. Speech goes through the event stream
/// unless `speech` is given.
pub async fn spawn_player(content: SocketAddr, speech: Option<Arc<dyn SpeechToText>>) -> Player {
    let cdn = format!("http://{content}/cdn/");
    let gateways = vec![
        format!("http://{content}/missing/"),
        format!("http://{content}/gateway/"),
    ];
    let fetcher = HttpFetcher::new(SourceConfig::new(cdn.as_str(), gateways.clone()).with_timeout(Duration::from_secs(5)))
        .unwrap();

    let options = SessionOptions::new("manifest.json", MediaResolver::new(cdn, &gateways))
        .with_timings(Timings {
            feedback_ms: 20,
            advance_delay_ms: 40,
            mismatch_revert_ms: 20,
        })
        .with_translation("en", "translations/en.json");
    let store = Arc::new(MemoryStore::new());

    let session = match speech {
        Some(speech) => PlayerSession::with_speech(options, Arc::new(fetcher), store, speech),
        None => PlayerSession::new(options, Arc::new(fetcher), store),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = create_router(Arc::clone(&session));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Player { addr, session }
}

/// The stage request body for stage `number` of the fixture course.
pub fn stage(number: u32) -> Value {
    json!({ "language": "es", "level": "A1", "section": "basics", "stage": number })
}
