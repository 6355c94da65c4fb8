//! Capability traits consumed by the orchestrator
//!
//! Each external engine (speech capture, transcription, inference,
//! synthesis, rendering) sits behind one narrow trait. The orchestrator
//! never sees provider details; degraded behavior is a collaborator-internal
//! concern and surfaces as ordinary success.

use async_trait::async_trait;

use crate::Result;
use crate::history::Turn;
use crate::orchestrator::ConversationState;

/// Captures one utterance from the user
#[async_trait]
pub trait Listener: Send + Sync {
    /// Record a single silence-endpointed utterance
    ///
    /// Blocks (on its worker) until trailing silence or the maximum
    /// utterance length ends the recording.
    ///
    /// # Errors
    ///
    /// Returns error if the capture device fails
    async fn capture_utterance(&self) -> Result<Vec<f32>>;

    /// Best-effort request to end an in-progress capture early
    fn stop(&self);
}

/// Turns captured audio into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe 16 kHz mono samples to text
    ///
    /// # Errors
    ///
    /// Returns error if the transcription backend fails
    async fn transcribe(&self, samples: &[f32]) -> Result<String>;
}

/// Produces the assistant's reply
#[async_trait]
pub trait Responder: Send + Sync {
    /// Generate a reply to `new_text` given prior conversation turns
    ///
    /// `history` is a dispatch-time snapshot; implementations must not
    /// assume it reflects turns completed after the call started.
    ///
    /// # Errors
    ///
    /// Returns error if the inference backend fails
    async fn respond(&self, history: &[Turn], new_text: &str) -> Result<String>;
}

/// Speaks a reply aloud
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Synthesize and play `text`, blocking (on its worker) until playback
    /// completes or [`stop`] is called
    ///
    /// [`stop`]: Speaker::stop
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, text: &str) -> Result<()>;

    /// Halt audible output immediately
    ///
    /// Safe to call concurrently with an in-progress [`speak`].
    ///
    /// [`speak`]: Speaker::speak
    fn stop(&self);
}

/// Renders the assistant's visual state
///
/// Called only from the control loop after a transition; implementations
/// must not block and must tolerate repeated calls with the same state.
pub trait Presenter {
    /// Show the given conversation state
    fn set_state(&mut self, state: ConversationState);
}
