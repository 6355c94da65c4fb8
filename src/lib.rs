//! Aura - voice-driven conversational assistant
//!
//! Listens for a wake phrase, records an utterance, transcribes it, asks a
//! locally hosted language model for a reply, speaks the reply aloud, and
//! renders a reactive face throughout.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │              Render/Input Loop (daemon)           │
//! │   key events  │  wake triggers  │  face drawing   │
//! └───────────────────────┬───────────────────────────┘
//!                         │ triggers / tick
//! ┌───────────────────────▼───────────────────────────┐
//! │           Conversation Orchestrator               │
//! │   state machine │ turn tokens │ history │ queue   │
//! └───────────────────────┬───────────────────────────┘
//!                         │ one worker task per stage
//! ┌───────────────────────▼───────────────────────────┐
//! │                 Collaborators                     │
//! │  Listener │ Transcriber │ Responder │ Speaker     │
//! │   (mic)   │  (whisper)  │  (ollama) │  (piper)    │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! The orchestrator is the only owner of conversational state. Stage
//! workers post typed results to its queue; results from cancelled or
//! superseded turns are discarded by token comparison.

pub mod collaborator;
pub mod config;
pub mod daemon;
pub mod error;
pub mod face;
pub mod history;
pub mod llm;
pub mod orchestrator;
pub mod voice;

pub use collaborator::{Listener, Presenter, Responder, Speaker, Transcriber};
pub use config::Config;
pub use daemon::Assistant;
pub use error::{Error, Result};
pub use history::{History, MAX_TURNS, Turn};
pub use orchestrator::{ConversationState, Orchestrator, Stage, StageOutcome, Trigger};
