//! Assistant daemon - the embedding application
//!
//! Wires the production collaborators to the orchestrator and runs the
//! fixed-cadence render/input loop: poll key events, drain the wake
//! watcher's triggers, tick the orchestrator, update the face. The loop
//! never blocks on a collaborator; all blocking happens on worker tasks.

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use tokio::sync::{mpsc, watch};

use crate::collaborator::{Listener, Presenter, Responder, Speaker, Transcriber};
use crate::config::Config;
use crate::face::TerminalFace;
use crate::llm::OllamaClient;
use crate::orchestrator::{ConversationState, Orchestrator, Trigger, frame_interval};
use crate::voice::{
    AudioCapture, MicListener, PiperSpeaker, WakeWordDetector, WhisperServer,
    watch_for_wake_phrase,
};
use crate::Result;

/// The Aura assistant - owns the collaborators and the render/input loop
pub struct Assistant {
    config: Config,
}

impl Assistant {
    /// Create a new assistant instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the assistant until quit
    ///
    /// # Errors
    ///
    /// Returns error if a collaborator or the terminal cannot be initialized
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let transcriber: Arc<dyn Transcriber> = Arc::new(WhisperServer::new(&self.config.stt));

        let ollama = OllamaClient::new(&self.config.llm);
        ollama.probe().await;
        let responder: Arc<dyn Responder> = Arc::new(ollama);

        let speaker: Arc<dyn Speaker> = Arc::new(PiperSpeaker::new(&self.config.tts)?);

        // The cpal stream is not Send; it stays here on the control task and
        // workers read through the shared buffer handle
        let mut capture = AudioCapture::new()?;
        capture.start()?;

        let listener: Arc<dyn Listener> = Arc::new(MicListener::new(
            capture.buffer(),
            self.config.audio.clone(),
        ));

        let mut orchestrator = Orchestrator::new(
            listener,
            Arc::clone(&transcriber),
            responder,
            Arc::clone(&speaker),
            self.config.timeouts.clone(),
        );

        let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConversationState::Idle);

        let detector = WakeWordDetector::new(vec![self.config.wake_phrase.clone()]);
        tokio::spawn(watch_for_wake_phrase(
            detector,
            capture.buffer(),
            Arc::clone(&transcriber),
            trigger_tx.clone(),
            state_rx,
        ));

        let ctrl_c_tx = trigger_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = ctrl_c_tx.send(Trigger::Quit);
            }
        });

        let mut face = TerminalFace::new()?;
        face.set_state(ConversationState::Idle);

        tracing::info!(
            wake_phrase = %self.config.wake_phrase,
            fps = self.config.fps,
            "assistant running"
        );

        let mut frames = tokio::time::interval(frame_interval(self.config.fps));
        loop {
            frames.tick().await;

            // Key events first, then wake-watcher triggers, then the tick
            while event::poll(Duration::ZERO)? {
                if let Some(trigger) = read_key_trigger(orchestrator.state())? {
                    orchestrator.on_trigger(trigger);
                }
            }
            while let Ok(trigger) = trigger_rx.try_recv() {
                orchestrator.on_trigger(trigger);
            }

            let state = orchestrator.tick();
            let _ = state_tx.send(state);
            face.set_state(state);

            if orchestrator.is_quitting() {
                break;
            }
        }

        face.restore();
        orchestrator.shutdown().await;
        speaker.stop();
        capture.stop();

        tracing::info!("assistant stopped");
        Ok(())
    }
}

/// Map one pending key event to a trigger
///
/// Space starts a turn, or cancels while the reply is playing; `c` cancels;
/// Esc, `q`, and ctrl-c quit.
fn read_key_trigger(state: ConversationState) -> Result<Option<Trigger>> {
    let Event::Key(key) = event::read()? else {
        return Ok(None);
    };
    if key.kind != KeyEventKind::Press {
        return Ok(None);
    }

    let trigger = match key.code {
        KeyCode::Esc | KeyCode::Char('q') => Some(Trigger::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Trigger::Quit),
        KeyCode::Char('c') => Some(Trigger::Cancel),
        KeyCode::Char(' ') => Some(if state == ConversationState::Speaking {
            Trigger::Cancel
        } else {
            Trigger::Start
        }),
        _ => None,
    };

    Ok(trigger)
}
