//! Conversation orchestrator - the assistant's state machine
//!
//! Sequences listen → transcribe → think → speak off the render thread.
//! One control task owns all state here; stage workers run on their own
//! tasks and communicate back only through the message queue. Staleness is
//! resolved by token comparison, so a slow or abandoned worker can never
//! corrupt a later turn.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::collaborator::{Listener, Responder, Speaker, Transcriber};
use crate::config::TimeoutConfig;
use crate::history::{History, Turn};

/// Spoken when the respond stage fails or times out
const FALLBACK_REPLY: &str = "Sorry, I had trouble thinking about that.";

/// What the assistant is doing right now
///
/// Single source of truth for the presenter. Mutated only by the
/// orchestrator on the control task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// Waiting for a wake phrase or start trigger
    Idle,
    /// Recording and transcribing user speech
    Listening,
    /// The language model is composing a reply
    Thinking,
    /// The reply is being spoken aloud
    Speaking,
}

/// Input events accepted by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Begin a new turn (wake phrase or user-initiated)
    Start,
    /// Abandon the current turn
    Cancel,
    /// Stop accepting triggers and wind down
    Quit,
}

/// A unit of work delegated to a collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Capture an utterance and transcribe it
    Transcribe,
    /// Generate a reply from history + new text
    Respond,
    /// Speak the reply aloud
    Speak,
}

/// Per-turn token minted at the start of each exchange
///
/// A stage result carrying a token other than the current one is stale and
/// is dropped without a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnToken(u64);

/// The in-flight worker call; at most one exists at any instant
#[derive(Debug)]
struct PendingOperation {
    stage: Stage,
    token: TurnToken,
    seq: u64,
    deadline: Option<Instant>,
}

/// Result payload of a finished (or expired) stage
#[derive(Debug)]
pub enum StageOutcome {
    /// Transcription text, possibly empty when nothing was heard
    Transcribed(String),
    /// The assistant's reply text
    Responded(String),
    /// Playback ran to completion
    SpokenToEnd,
    /// The collaborator reported an error
    Failed(String),
    /// The stage deadline elapsed with no result
    TimedOut,
}

/// Message posted to the orchestrator's inbound queue
///
/// Produced by stage workers, and by the orchestrator itself for synthetic
/// timeout events so "stage ended" has a single code path.
#[derive(Debug)]
pub struct StageMessage {
    stage: Stage,
    token: TurnToken,
    seq: u64,
    outcome: StageOutcome,
}

/// Single-owner conversational state machine
///
/// Owns [`ConversationState`] and [`History`]; dispatches each stage to a
/// worker task bound to the current [`TurnToken`] and drains their results
/// in [`tick`]. The embedding loop feeds it triggers and polls it once per
/// frame; neither call ever blocks on a collaborator.
///
/// [`tick`]: Orchestrator::tick
pub struct Orchestrator {
    state: ConversationState,
    history: History,
    listener: Arc<dyn Listener>,
    transcriber: Arc<dyn Transcriber>,
    responder: Arc<dyn Responder>,
    speaker: Arc<dyn Speaker>,
    timeouts: TimeoutConfig,
    tx: mpsc::UnboundedSender<StageMessage>,
    rx: mpsc::UnboundedReceiver<StageMessage>,
    next_token: u64,
    next_seq: u64,
    token: Option<TurnToken>,
    pending: Option<PendingOperation>,
    pending_user_text: Option<String>,
    quitting: bool,
}

impl Orchestrator {
    /// Create an orchestrator in the `Idle` state
    #[must_use]
    pub fn new(
        listener: Arc<dyn Listener>,
        transcriber: Arc<dyn Transcriber>,
        responder: Arc<dyn Responder>,
        speaker: Arc<dyn Speaker>,
        timeouts: TimeoutConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: ConversationState::Idle,
            history: History::new(),
            listener,
            transcriber,
            responder,
            speaker,
            timeouts,
            tx,
            rx,
            next_token: 0,
            next_seq: 0,
            token: None,
            pending: None,
            pending_user_text: None,
            quitting: false,
        }
    }

    /// Current conversation state
    #[must_use]
    pub const fn state(&self) -> ConversationState {
        self.state
    }

    /// Retained conversation history
    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }

    /// Stage of the in-flight worker call, if any
    #[must_use]
    pub fn pending_stage(&self) -> Option<Stage> {
        self.pending.as_ref().map(|p| p.stage)
    }

    /// Whether a quit trigger has been received
    #[must_use]
    pub const fn is_quitting(&self) -> bool {
        self.quitting
    }

    /// Feed one input event to the state machine
    ///
    /// A trigger the current state does not admit is a no-op; in particular
    /// `Start` while a turn is in flight is ignored, which is what keeps the
    /// single-flight invariant trivially true.
    pub fn on_trigger(&mut self, trigger: Trigger) {
        if self.quitting {
            tracing::debug!(?trigger, "trigger ignored, shutting down");
            return;
        }

        match (trigger, self.state) {
            (Trigger::Quit, _) => {
                tracing::info!("quit requested");
                self.quitting = true;
                if self.state == ConversationState::Speaking {
                    self.speaker.stop();
                }
            }
            (Trigger::Start, ConversationState::Idle) => {
                let token = self.mint_token();
                tracing::info!(token = token.0, "turn started");
                self.state = ConversationState::Listening;
                self.dispatch_transcribe(token);
            }
            (Trigger::Cancel, ConversationState::Listening) => {
                tracing::info!("capture cancelled");
                self.listener.stop();
                self.end_turn(ConversationState::Idle);
            }
            (Trigger::Cancel, ConversationState::Speaking) => {
                tracing::info!("playback cancelled");
                self.speaker.stop();
                self.end_turn(ConversationState::Idle);
            }
            (trigger, state) => {
                tracing::debug!(?trigger, ?state, "trigger not admitted in this state");
            }
        }
    }

    /// Drain pending results and expired deadlines, returning the state to
    /// display
    ///
    /// Non-blocking; called once per render frame. Deadline expiry injects a
    /// synthetic [`StageOutcome::TimedOut`] through the same queue path the
    /// workers use.
    pub fn tick(&mut self) -> ConversationState {
        self.expire_deadline();

        while let Ok(message) = self.rx.try_recv() {
            self.apply(message);
        }

        self.state
    }

    /// Wait out the shutdown grace period for an outstanding worker
    ///
    /// Workers are daemonic; their completion is not required for process
    /// exit, so this returns after the grace period regardless.
    pub async fn shutdown(&mut self) {
        self.quitting = true;

        if self.pending.is_none() {
            return;
        }

        let grace = self.timeouts.shutdown_grace();
        match tokio::time::timeout(grace, self.rx.recv()).await {
            Ok(Some(message)) => {
                tracing::debug!(stage = ?message.stage, "outstanding worker finished during shutdown");
            }
            Ok(None) | Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "outstanding worker did not finish within grace period"
                );
            }
        }
    }

    /// Inject a synthetic timeout when the pending operation's deadline has
    /// elapsed
    fn expire_deadline(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        let Some(deadline) = pending.deadline else {
            return;
        };

        if Instant::now() >= deadline {
            tracing::warn!(stage = ?pending.stage, "stage deadline elapsed");
            // Clear the deadline so expiry fires exactly once; the synthetic
            // message drives the actual transition.
            pending.deadline = None;
            let _ = self.tx.send(StageMessage {
                stage: pending.stage,
                token: pending.token,
                seq: pending.seq,
                outcome: StageOutcome::TimedOut,
            });
        }
    }

    /// Apply one queue message, dropping it if stale
    fn apply(&mut self, message: StageMessage) {
        let fresh = self.token == Some(message.token)
            && self
                .pending
                .as_ref()
                .is_some_and(|p| p.seq == message.seq && p.stage == message.stage);

        if !fresh {
            tracing::debug!(
                stage = ?message.stage,
                token = message.token.0,
                seq = message.seq,
                "stale result dropped"
            );
            return;
        }

        let token = message.token;
        match (message.stage, message.outcome) {
            (Stage::Transcribe, StageOutcome::Transcribed(text)) => {
                if text.trim().is_empty() {
                    tracing::info!("nothing heard, returning to idle");
                    self.end_turn(ConversationState::Idle);
                } else {
                    tracing::info!(transcript = %text, "utterance transcribed");
                    self.pending_user_text = Some(text.clone());
                    self.state = ConversationState::Thinking;
                    self.dispatch_respond(token, text);
                }
            }
            (Stage::Transcribe, StageOutcome::Failed(reason)) => {
                tracing::warn!(%reason, "capture/transcription failed");
                self.end_turn(ConversationState::Idle);
            }
            (Stage::Transcribe, StageOutcome::TimedOut) => {
                tracing::warn!("capture timed out");
                self.listener.stop();
                self.end_turn(ConversationState::Idle);
            }
            (Stage::Respond, StageOutcome::Responded(reply)) => {
                tracing::info!(reply = %reply, "reply composed");
                self.complete_turn(&reply);
                self.state = ConversationState::Speaking;
                self.dispatch_speak(token, reply);
            }
            (Stage::Respond, StageOutcome::Failed(reason)) => {
                tracing::warn!(%reason, "responder failed, speaking fallback");
                self.complete_turn(FALLBACK_REPLY);
                self.state = ConversationState::Speaking;
                self.dispatch_speak(token, FALLBACK_REPLY.to_string());
            }
            (Stage::Respond, StageOutcome::TimedOut) => {
                tracing::warn!("responder timed out, speaking fallback");
                self.complete_turn(FALLBACK_REPLY);
                self.state = ConversationState::Speaking;
                self.dispatch_speak(token, FALLBACK_REPLY.to_string());
            }
            (Stage::Speak, StageOutcome::SpokenToEnd) => {
                tracing::info!("playback complete");
                self.end_turn(ConversationState::Idle);
            }
            (Stage::Speak, StageOutcome::Failed(reason)) => {
                tracing::warn!(%reason, "playback failed");
                self.end_turn(ConversationState::Idle);
            }
            (Stage::Speak, StageOutcome::TimedOut) => {
                // The speak stage carries no deadline; nothing injects this.
                tracing::debug!("ignoring timeout for speak stage");
            }
            (stage, outcome) => {
                tracing::debug!(?stage, ?outcome, "mismatched outcome dropped");
            }
        }
    }

    /// Append the completed turn, evicting the oldest beyond the cap
    fn complete_turn(&mut self, reply: &str) {
        let user_text = self.pending_user_text.take().unwrap_or_default();
        self.history.push(Turn::new(user_text, reply));
    }

    /// Invalidate the current token and settle into `state`
    fn end_turn(&mut self, state: ConversationState) {
        self.token = None;
        self.pending = None;
        self.pending_user_text = None;
        self.state = state;
    }

    /// Mint the token for a new turn
    fn mint_token(&mut self) -> TurnToken {
        self.next_token += 1;
        let token = TurnToken(self.next_token);
        self.token = Some(token);
        token
    }

    /// Next worker sequence number
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Dispatch the capture+transcribe worker
    fn dispatch_transcribe(&mut self, token: TurnToken) {
        let seq = self.next_seq();
        self.pending = Some(PendingOperation {
            stage: Stage::Transcribe,
            token,
            seq,
            deadline: Some(Instant::now() + self.timeouts.listen()),
        });

        let listener = Arc::clone(&self.listener);
        let transcriber = Arc::clone(&self.transcriber);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = match listener.capture_utterance().await {
                Ok(samples) => match transcriber.transcribe(&samples).await {
                    Ok(text) => StageOutcome::Transcribed(text),
                    Err(e) => StageOutcome::Failed(e.to_string()),
                },
                Err(e) => StageOutcome::Failed(e.to_string()),
            };
            let _ = tx.send(StageMessage {
                stage: Stage::Transcribe,
                token,
                seq,
                outcome,
            });
        });
    }

    /// Dispatch the respond worker with a dispatch-time history snapshot
    fn dispatch_respond(&mut self, token: TurnToken, user_text: String) {
        let seq = self.next_seq();
        self.pending = Some(PendingOperation {
            stage: Stage::Respond,
            token,
            seq,
            deadline: Some(Instant::now() + self.timeouts.respond()),
        });

        let snapshot = self.history.snapshot();
        let responder = Arc::clone(&self.responder);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = match responder.respond(&snapshot, &user_text).await {
                Ok(reply) => StageOutcome::Responded(reply),
                Err(e) => StageOutcome::Failed(e.to_string()),
            };
            let _ = tx.send(StageMessage {
                stage: Stage::Respond,
                token,
                seq,
                outcome,
            });
        });
    }

    /// Dispatch the speak worker; no deadline, the stop signal is the only
    /// way out
    fn dispatch_speak(&mut self, token: TurnToken, text: String) {
        let seq = self.next_seq();
        self.pending = Some(PendingOperation {
            stage: Stage::Speak,
            token,
            seq,
            deadline: None,
        });

        let speaker = Arc::clone(&self.speaker);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = match speaker.speak(&text).await {
                Ok(()) => StageOutcome::SpokenToEnd,
                Err(e) => StageOutcome::Failed(e.to_string()),
            };
            let _ = tx.send(StageMessage {
                stage: Stage::Speak,
                token,
                seq,
                outcome,
            });
        });
    }
}

/// Frame interval for a given render cadence
#[must_use]
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_millis(1000 / u64::from(fps.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_interval_is_sane() {
        assert_eq!(frame_interval(30), Duration::from_millis(33));
        // Zero cadence clamps rather than dividing by zero
        assert_eq!(frame_interval(0), Duration::from_millis(1000));
    }
}
