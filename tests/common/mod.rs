//! Shared test utilities
//!
//! Mock collaborators whose results are released through channels, so tests
//! script exactly when each stage's message arrives.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use aura_assistant::config::TimeoutConfig;
use aura_assistant::{Error, Listener, Responder, Result, Speaker, Transcriber, Turn};

/// Timeouts short enough to exercise deadline expiry in a test
#[must_use]
pub fn quick_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        listen_secs: 1,
        respond_secs: 1,
        shutdown_grace_secs: 1,
    }
}

/// Give spawned workers a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

/// Listener returning a fixed utterance immediately
pub struct InstantListener;

#[async_trait]
impl Listener for InstantListener {
    async fn capture_utterance(&self) -> Result<Vec<f32>> {
        Ok(vec![0.1; 16000])
    }

    fn stop(&self) {}
}

/// Transcriber that blocks until the test releases a scripted result
pub struct ScriptedTranscriber {
    rx: Mutex<mpsc::UnboundedReceiver<Result<String>>>,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    /// Returns the transcriber and the sender that releases results
    #[must_use]
    pub fn with_script() -> (Arc<Self>, mpsc::UnboundedSender<Result<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                rx: Mutex::new(rx),
                calls: AtomicUsize::new(0),
            }),
            tx,
        )
    }

    /// How many times `transcribe` has been invoked
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _samples: &[f32]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.rx.lock().await;
        rx.recv()
            .await
            .unwrap_or_else(|| Err(Error::Stt("script exhausted".to_string())))
    }
}

/// Responder that blocks until the test releases a scripted result
pub struct ScriptedResponder {
    rx: Mutex<mpsc::UnboundedReceiver<Result<String>>>,
}

impl ScriptedResponder {
    /// Returns the responder and the sender that releases results
    #[must_use]
    pub fn with_script() -> (Arc<Self>, mpsc::UnboundedSender<Result<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                rx: Mutex::new(rx),
            }),
            tx,
        )
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&self, _history: &[Turn], _new_text: &str) -> Result<String> {
        let mut rx = self.rx.lock().await;
        rx.recv()
            .await
            .unwrap_or_else(|| Err(Error::Llm("script exhausted".to_string())))
    }
}

/// Responder echoing the user's text back
pub struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, _history: &[Turn], new_text: &str) -> Result<String> {
        Ok(format!("echo: {new_text}"))
    }
}

/// Responder that always fails
pub struct FailingResponder;

#[async_trait]
impl Responder for FailingResponder {
    async fn respond(&self, _history: &[Turn], _new_text: &str) -> Result<String> {
        Err(Error::Llm("backend down".to_string()))
    }
}

/// Speaker with optionally gated completion and a stop-call counter
pub struct MockSpeaker {
    gate: Option<Mutex<mpsc::UnboundedReceiver<()>>>,
    stops: AtomicUsize,
    spoken: Mutex<Vec<String>>,
}

impl MockSpeaker {
    /// Speaker whose playback completes immediately
    #[must_use]
    pub fn instant() -> Arc<Self> {
        Arc::new(Self {
            gate: None,
            stops: AtomicUsize::new(0),
            spoken: Mutex::new(Vec::new()),
        })
    }

    /// Speaker whose playback finishes only when the test releases it
    #[must_use]
    pub fn gated() -> (Arc<Self>, mpsc::UnboundedSender<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                gate: Some(Mutex::new(rx)),
                stops: AtomicUsize::new(0),
                spoken: Mutex::new(Vec::new()),
            }),
            tx,
        )
    }

    /// How many times `stop` has been invoked
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Texts passed to `speak`, in order
    pub async fn spoken(&self) -> Vec<String> {
        self.spoken.lock().await.clone()
    }
}

#[async_trait]
impl Speaker for MockSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().await.push(text.to_string());
        if let Some(gate) = &self.gate {
            gate.lock().await.recv().await;
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
