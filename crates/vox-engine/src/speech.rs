//! Speech-to-text capability.
//!
//! The player never touches a microphone itself. [`BridgedSpeech`] asks
//! the connected front-end to capture speech (a `listen_requested` event)
//! and waits for the transcript to come back through the HTTP API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Result, VoxError};
use crate::events::{EventBroadcaster, PlayerEvent};

/// Turns spoken audio in `language` into a transcript.
pub trait SpeechToText: Send + Sync {
    /// Captures one utterance.
    ///
    /// Fails with `SpeechUnavailable` when no recognizer exists and with
    /// `SpeechFailure` for everything else (permission, no speech,
    /// timeout).
    fn listen<'a>(&'a self, language: &'a str) -> BoxFuture<'a, Result<String>>;
}

impl<T: SpeechToText + ?Sized> SpeechToText for Arc<T> {
    fn listen<'a>(&'a self, language: &'a str) -> BoxFuture<'a, Result<String>> {
        (**self).listen(language)
    }
}

/// A recognizer that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedSpeech;

impl SpeechToText for UnsupportedSpeech {
    fn listen<'a>(&'a self, _language: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async { Err(VoxError::SpeechUnavailable) })
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<String>>>>>;

/// Delegates capture to the front-end.
///
/// Each request gets an id that travels in the `listen_requested` event;
/// the front-end answers with [`BridgedSpeech::complete`].
#[derive(Debug, Clone)]
pub struct BridgedSpeech {
    events: EventBroadcaster,
    pending: Pending,
    next_id: Arc<AtomicU64>,
}

impl BridgedSpeech {
    /// Creates a bridge that publishes requests through `events`.
    #[must_use]
    pub fn new(events: EventBroadcaster) -> Self {
        Self {
            events,
            pending: Arc::default(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Completes request `request_id`. Returns `false` if nobody is waiting
    /// for it anymore.
    pub fn complete(&self, request_id: u64, result: Result<String>) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&request_id);
        match sender {
            Some(tx) => tx.send(result).is_ok(),
            None => {
                debug!(request_id, "No pending capture for this request");
                false
            }
        }
    }

    /// Number of captures waiting for the front-end.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Removes a request from the pending table when its future goes away,
/// whether it completed, failed, or was dropped by a timeout.
struct PendingGuard {
    pending: Pending,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl SpeechToText for BridgedSpeech {
    fn listen<'a>(&'a self, language: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            if self.events.receiver_count() == 0 {
                return Err(VoxError::SpeechUnavailable);
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, tx);
            let _guard = PendingGuard {
                pending: Arc::clone(&self.pending),
                id,
            };

            debug!(request_id = id, language, "Requesting speech capture");
            self.events.send(PlayerEvent::listen_requested(id, language));

            rx.await
                .unwrap_or_else(|_| Err(VoxError::speech_failure("capture was abandoned")))
        })
    }
}

/// Bounds another recognizer with a timeout.
#[derive(Debug, Clone)]
pub struct TimeoutSpeech<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutSpeech<S> {
    /// Wraps `inner`, failing captures that take longer than `timeout`.
    pub const fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The wrapped recognizer.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: SpeechToText> SpeechToText for TimeoutSpeech<S> {
    fn listen<'a>(&'a self, language: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.inner.listen(language)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(language, timeout_secs = self.timeout.as_secs(), "Speech capture timed out");
                    Err(VoxError::speech_failure("no speech detected before timeout"))
                }
            }
        })
    }
}
