//! Bounded conversation history
//!
//! Keeps the most recent exchanges as context for the language model.
//! The cap bounds both prompt size and memory on small hosts.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of turns retained; older turns are evicted first
pub const MAX_TURNS: usize = 20;

/// One user-utterance/assistant-reply exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// What the user said
    pub user_text: String,

    /// What the assistant replied
    pub assistant_text: String,

    /// When the turn completed
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a turn stamped with the current time
    #[must_use]
    pub fn new(user_text: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered sequence of turns capped at [`MAX_TURNS`]
///
/// Appended to only by the orchestrator; workers receive a [`snapshot`]
/// taken at dispatch time and never observe later appends.
///
/// [`snapshot`]: History::snapshot
#[derive(Debug, Default)]
pub struct History {
    turns: VecDeque<Turn>,
}

impl History {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed turn, evicting the oldest beyond the cap
    pub fn push(&mut self, turn: Turn) {
        if self.turns.len() == MAX_TURNS {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Number of retained turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns are retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Clone the retained turns, oldest first
    ///
    /// The returned vector is handed to the respond worker so an in-flight
    /// stage never observes a concurrent append.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// Iterate over retained turns, oldest first
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }
}
