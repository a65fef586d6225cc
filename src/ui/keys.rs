use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What a single key press asks for when no prompt is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Activate,
    TogglePause,
    Next,
    Prev,
    Stop,
    Rescan,
    AddSelected,
    RemoveSelected,
    ToggleShuffle,
    Download,
    CancelDownload,
    Up,
    Down,
    SwitchFocus,
    Search,
    Command,
    List,
    Status,
    Help,
    Quit,
}

pub fn key_action(key: KeyEvent) -> Option<KeyAction> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(KeyAction::Quit),
            _ => None,
        };
    }
    if key.modifiers.contains(KeyModifiers::ALT) {
        return None;
    }

    let action = match key.code {
        KeyCode::Enter => KeyAction::Activate,
        KeyCode::Char(' ') => KeyAction::TogglePause,
        KeyCode::Char('n') => KeyAction::Next,
        KeyCode::Char('p') => KeyAction::Prev,
        KeyCode::Char('s') => KeyAction::Stop,
        KeyCode::Char('r') => KeyAction::Rescan,
        KeyCode::Char('+') => KeyAction::AddSelected,
        KeyCode::Char('-') => KeyAction::RemoveSelected,
        KeyCode::Char('x') => KeyAction::ToggleShuffle,
        KeyCode::Char('d') => KeyAction::Download,
        KeyCode::Char('c') => KeyAction::CancelDownload,
        KeyCode::Up | KeyCode::Char('k') => KeyAction::Up,
        KeyCode::Down | KeyCode::Char('j') => KeyAction::Down,
        KeyCode::Tab => KeyAction::SwitchFocus,
        KeyCode::Char('/') => KeyAction::Search,
        KeyCode::Char(':') => KeyAction::Command,
        KeyCode::Char('l') => KeyAction::List,
        KeyCode::Char('i') => KeyAction::Status,
        KeyCode::Char('?') | KeyCode::Char('h') => KeyAction::Help,
        KeyCode::Char('q') => KeyAction::Quit,
        _ => return None,
    };
    Some(action)
}

#[derive(Debug, PartialEq, Eq)]
pub enum PromptOutcome {
    Editing,
    Submit(String),
    Cancel,
}

/// Single-line input for the search, command and folder prompts
#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: String,
}

impl LineEditor {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self { buffer: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn feed(&mut self, key: KeyEvent) -> PromptOutcome {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => return PromptOutcome::Cancel,
                KeyCode::Char('u') => self.buffer.clear(),
                _ => {}
            }
            return PromptOutcome::Editing;
        }

        match key.code {
            KeyCode::Enter => PromptOutcome::Submit(std::mem::take(&mut self.buffer)),
            KeyCode::Esc => PromptOutcome::Cancel,
            KeyCode::Backspace => {
                self.buffer.pop();
                PromptOutcome::Editing
            }
            KeyCode::Char(c) if !c.is_control() => {
                self.buffer.push(c);
                PromptOutcome::Editing
            }
            _ => PromptOutcome::Editing,
        }
    }
}
