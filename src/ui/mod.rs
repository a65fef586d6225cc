// Keyboard front end. Single keys drive the transport, '/' and ':' open a
// one-line prompt for searches and typed commands. Output scrolls as plain
// lines; raw mode is only there so keys arrive without Enter.

mod app;
pub mod commands;
pub mod keys;
pub mod render;

pub use app::{App, Focus};
pub use commands::{looks_like_url, parse_command, track_for, ShellCommand};
pub use keys::{key_action, KeyAction, LineEditor, PromptOutcome};
pub use render::{event_line, library_lines, playlist_lines, status_line, COMMANDS, HELP};

use anyhow::{Context, Result};
use crossterm::{
    cursor, execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io;

/// Raw mode for as long as the guard lives
pub struct RawTerminal {
    _private: (),
}

impl RawTerminal {
    pub fn enter() -> Result<Self> {
        enable_raw_mode().context("personalfm needs an interactive terminal")?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), cursor::Show);
    }
}
