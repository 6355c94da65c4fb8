//! Terminal face presenter
//!
//! Draws an ASCII face with one expression per conversation state and a
//! colored status line. Writes are queued and flushed in one go, so the
//! control loop never blocks here; redraws happen only on state change.

use std::io::{Stdout, Write, stdout};

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{cursor, execute, queue, terminal};

use crate::Result;
use crate::collaborator::Presenter;
use crate::orchestrator::ConversationState;

/// Column where the face and status are drawn
const LEFT_MARGIN: u16 = 4;

/// Row where the face starts
const TOP_MARGIN: u16 = 2;

/// Expression, status label, and status color for a state
const fn face_for(state: ConversationState) -> (&'static [&'static str], &'static str, Color) {
    match state {
        ConversationState::Idle => (
            &[
                r"  _______  ",
                r" /       \ ",
                r"|  -   -  |",
                r"|    u    |",
                r" \_______/ ",
            ],
            "ready",
            Color::Blue,
        ),
        ConversationState::Listening => (
            &[
                r"  _______  ",
                r" /       \ ",
                r"|  o   o  |",
                r"|    o    |",
                r" \_______/ ",
            ],
            "listening",
            Color::Red,
        ),
        ConversationState::Thinking => (
            &[
                r"  _______  ",
                r" /       \ ",
                r"|  ~   ~  |",
                r"|    -    |",
                r" \_______/ ",
            ],
            "thinking",
            Color::Yellow,
        ),
        ConversationState::Speaking => (
            &[
                r"  _______  ",
                r" /       \ ",
                r"|  ^   ^  |",
                r"|    O    |",
                r" \_______/ ",
            ],
            "speaking",
            Color::Green,
        ),
    }
}

/// Renders the assistant's face in the terminal
///
/// Enables raw mode for its lifetime so key presses arrive without a
/// newline; [`restore`] (also run on drop) puts the terminal back.
///
/// [`restore`]: TerminalFace::restore
pub struct TerminalFace {
    out: Stdout,
    last: Option<ConversationState>,
    restored: bool,
}

impl TerminalFace {
    /// Take over the terminal
    ///
    /// # Errors
    ///
    /// Returns error if raw mode cannot be enabled
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut out = stdout();
        execute!(out, cursor::Hide, Clear(ClearType::All))?;

        Ok(Self {
            out,
            last: None,
            restored: false,
        })
    }

    /// Put the terminal back the way it was
    pub fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;

        let _ = execute!(
            self.out,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0),
            cursor::Show
        );
        let _ = terminal::disable_raw_mode();
    }

    fn draw(&mut self, state: ConversationState) -> std::io::Result<()> {
        let (art, label, color) = face_for(state);

        queue!(self.out, Clear(ClearType::All))?;

        for (i, line) in art.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let row = TOP_MARGIN + i as u16;
            queue!(self.out, cursor::MoveTo(LEFT_MARGIN, row), Print(line))?;
        }

        #[allow(clippy::cast_possible_truncation)]
        let status_row = TOP_MARGIN + art.len() as u16 + 1;
        queue!(
            self.out,
            cursor::MoveTo(LEFT_MARGIN, status_row),
            SetForegroundColor(color),
            Print(format!("* {label}")),
            ResetColor,
        )?;

        queue!(
            self.out,
            cursor::MoveTo(LEFT_MARGIN, status_row + 2),
            SetForegroundColor(Color::DarkGrey),
            Print("space: talk   c: cancel   esc: quit"),
            ResetColor,
        )?;

        self.out.flush()
    }
}

impl Presenter for TerminalFace {
    fn set_state(&mut self, state: ConversationState) {
        if self.last == Some(state) {
            return;
        }
        self.last = Some(state);

        if let Err(e) = self.draw(state) {
            tracing::warn!(error = %e, "face draw failed");
        }
    }
}

impl Drop for TerminalFace {
    fn drop(&mut self) {
        self.restore();
    }
}
