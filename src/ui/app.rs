use super::commands::{parse_command, track_for, ShellCommand};
use super::keys::{key_action, KeyAction, LineEditor, PromptOutcome};
use super::render::{entry_line, event_line, library_lines, playlist_lines, status_line, COMMANDS, HELP};
use super::RawTerminal;
use crate::audio::Track;
use crate::engine::{EngineEvent, EngineHandle, EntryView, Intent};
use crate::library::{Library, PlaylistLoader};
use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyEvent, KeyEventKind};
use crossterm::{
    cursor, queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use futures::StreamExt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Rows printed per listing
const PAGE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Library,
    Playlist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    Search,
    Command,
    Folder,
}

impl PromptKind {
    fn label(self) -> &'static str {
        match self {
            PromptKind::Search => "/",
            PromptKind::Command => ":",
            PromptKind::Folder => "save to: ",
        }
    }
}

struct Prompt {
    kind: PromptKind,
    editor: LineEditor,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Owns the library and the selection state. Everything that touches
/// playback goes to the engine as an intent.
pub struct App {
    handle: EngineHandle,
    loader: Arc<dyn PlaylistLoader>,
    library: Library,
    matches: Vec<Track>,
    focus: Focus,
    library_selected: usize,
    playlist_selected: usize,
    prompt: Option<Prompt>,
    download_directory: PathBuf,
    notices: mpsc::UnboundedSender<String>,
    notices_rx: mpsc::UnboundedReceiver<String>,
    outbox: Vec<String>,
}

impl App {
    pub fn new(
        handle: EngineHandle,
        loader: Arc<dyn PlaylistLoader>,
        library: Library,
        download_directory: PathBuf,
    ) -> Self {
        let (notices, notices_rx) = mpsc::unbounded_channel();
        let matches = library.search("");
        Self {
            handle,
            loader,
            library,
            matches,
            focus: Focus::Library,
            library_selected: 0,
            playlist_selected: 0,
            prompt: None,
            download_directory,
            notices,
            notices_rx,
            outbox: Vec::new(),
        }
    }

    /// Runs until quit, the terminal closing, or the engine stopping
    pub async fn run(mut self, events: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Result<()> {
        let _raw = RawTerminal::enter()?;
        let mut stdout = io::stdout();
        let mut keys = EventStream::new();
        let mut watch = self.handle.watch();

        self.say(format!(
            "personalfm: {} tracks in the library, {} in the playlist. Press ? for keys.",
            self.library.len(),
            self.handle.snapshot().playlist_len
        ));
        self.flush(&mut stdout)?;

        loop {
            let flow = tokio::select! {
                key = keys.next() => match key {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => self.on_key(key),
                    Some(Ok(_)) => Flow::Continue,
                    Some(Err(e)) => {
                        warn!("Terminal input failed: {}", e);
                        Flow::Quit
                    }
                    None => Flow::Quit,
                },
                Some(event) = events.recv() => {
                    if let Some(line) = event_line(&event) {
                        self.say(line);
                    }
                    Flow::Continue
                }
                Some(notice) = self.notices_rx.recv() => {
                    self.say(notice);
                    Flow::Continue
                }
                changed = watch.changed() => match changed {
                    Ok(()) => Flow::Continue,
                    Err(_) => Flow::Quit,
                },
            };

            self.flush(&mut stdout)?;
            if flow == Flow::Quit {
                break;
            }
        }

        debug!("Front end finished");
        Ok(())
    }

    fn on_key(&mut self, key: KeyEvent) -> Flow {
        if let Some(prompt) = self.prompt.as_mut() {
            let kind = prompt.kind;
            return match prompt.editor.feed(key) {
                PromptOutcome::Editing => Flow::Continue,
                PromptOutcome::Cancel => {
                    self.prompt = None;
                    Flow::Continue
                }
                PromptOutcome::Submit(text) => {
                    self.prompt = None;
                    self.on_submit(kind, text)
                }
            };
        }

        match key_action(key) {
            Some(action) => self.on_action(action),
            None => Flow::Continue,
        }
    }

    fn on_action(&mut self, action: KeyAction) -> Flow {
        match action {
            KeyAction::Activate => match self.focus {
                Focus::Library => return self.play_from_library(self.library_selected),
                Focus::Playlist => {
                    if self.playlist_len() == 0 {
                        self.say("Playlist is empty.");
                        return Flow::Continue;
                    }
                    return self.send(Intent::PlayEntry(self.playlist_selected));
                }
            },
            KeyAction::TogglePause => return self.send(Intent::TogglePause),
            KeyAction::Next => return self.send(Intent::Next),
            KeyAction::Prev => return self.send(Intent::Prev),
            KeyAction::Stop => return self.send(Intent::Stop),
            KeyAction::ToggleShuffle => return self.send(Intent::ToggleShuffle),
            KeyAction::CancelDownload => return self.send(Intent::CancelDownload),
            KeyAction::AddSelected => return self.add_from_library(self.library_selected),
            KeyAction::RemoveSelected => {
                let len = self.playlist_len();
                if len == 0 {
                    self.say("Remove: nothing selected.");
                    return Flow::Continue;
                }
                let flow = self.send(Intent::Remove(self.playlist_selected));
                // the row below moves up; removing the last row selects the new last one
                self.playlist_selected = self.playlist_selected.min(len.saturating_sub(2));
                return flow;
            }
            KeyAction::Rescan => self.rescan(),
            KeyAction::Download => {
                self.prompt = Some(Prompt {
                    kind: PromptKind::Folder,
                    editor: LineEditor::with_text(self.download_directory.display().to_string()),
                });
            }
            KeyAction::Search => self.open_prompt(PromptKind::Search),
            KeyAction::Command => self.open_prompt(PromptKind::Command),
            KeyAction::Up => self.move_selection(-1),
            KeyAction::Down => self.move_selection(1),
            KeyAction::SwitchFocus => {
                self.focus = match self.focus {
                    Focus::Library => Focus::Playlist,
                    Focus::Playlist => Focus::Library,
                };
                let header = match self.focus {
                    Focus::Library => format!("Library ({} matches)", self.matches.len()),
                    Focus::Playlist => format!("Playlist ({} entries)", self.playlist_len()),
                };
                self.say(header);
                self.show_selection();
            }
            KeyAction::List => match self.focus {
                Focus::Library => self.list_library(),
                Focus::Playlist => {
                    for line in playlist_lines(&self.handle.snapshot()) {
                        self.say(line);
                    }
                }
            },
            KeyAction::Status => self.say(status_line(&self.handle.snapshot())),
            KeyAction::Help => self.say(HELP),
            KeyAction::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn on_submit(&mut self, kind: PromptKind, text: String) -> Flow {
        match kind {
            PromptKind::Search => {
                self.search(&text);
                Flow::Continue
            }
            PromptKind::Folder => {
                let folder = text.trim();
                if folder.is_empty() {
                    self.say("Download cancelled (empty path).");
                    return Flow::Continue;
                }
                self.send(Intent::Download(PathBuf::from(folder)))
            }
            PromptKind::Command => match parse_command(&text) {
                Ok(Some(command)) => self.run_command(command),
                Ok(None) => Flow::Continue,
                Err(message) => {
                    self.say(message);
                    Flow::Continue
                }
            },
        }
    }

    fn run_command(&mut self, command: ShellCommand) -> Flow {
        match command {
            ShellCommand::Engine(intent) => return self.send(intent),
            ShellCommand::Add(target) => match track_for(&target) {
                Ok(track) => return self.send(Intent::Add(track)),
                Err(message) => self.say(format!("❌ {}", message)),
            },
            ShellCommand::AddFromLibrary(index) => return self.add_from_library(index),
            ShellCommand::PlayFromLibrary(index) => return self.play_from_library(index),
            ShellCommand::Load(url) => self.load_playlist(url),
            ShellCommand::Download(folder) => {
                let folder = folder.unwrap_or_else(|| self.download_directory.clone());
                return self.send(Intent::Download(folder));
            }
            ShellCommand::Find(query) => self.search(&query),
            ShellCommand::Rescan => self.rescan(),
            ShellCommand::List => {
                for line in playlist_lines(&self.handle.snapshot()) {
                    self.say(line);
                }
            }
            ShellCommand::Library => self.list_library(),
            ShellCommand::Status => self.say(status_line(&self.handle.snapshot())),
            ShellCommand::Help => self.say(COMMANDS),
            ShellCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn send(&mut self, intent: Intent) -> Flow {
        match self.handle.send(intent) {
            Ok(()) => Flow::Continue,
            Err(e) => {
                self.say(format!("❌ {}", e));
                Flow::Quit
            }
        }
    }

    fn library_track(&mut self, index: usize) -> Option<Track> {
        let track = self.matches.get(index).cloned();
        if track.is_none() {
            self.say(format!("No library match {} ({} shown)", index + 1, self.matches.len()));
        }
        track
    }

    /// Outside the playlist: its end does not advance anything
    fn play_from_library(&mut self, index: usize) -> Flow {
        match self.library_track(index) {
            Some(track) => self.send(Intent::Play(track)),
            None => Flow::Continue,
        }
    }

    fn add_from_library(&mut self, index: usize) -> Flow {
        let Some(track) = self.library_track(index) else {
            return Flow::Continue;
        };
        self.say(format!("Added to playlist: {}", track.display_title()));
        self.send(Intent::Add(track))
    }

    fn search(&mut self, query: &str) {
        self.matches = self.library.search(query);
        self.library_selected = 0;
        self.focus = Focus::Library;
        self.say(format!("{} matches for '{}'", self.matches.len(), query.trim()));
        self.list_library();
    }

    /// The walk runs in place; the engine keeps playing meanwhile
    fn rescan(&mut self) {
        let library = &mut self.library;
        let scanned = tokio::task::block_in_place(|| library.rescan());
        match scanned {
            Ok(count) => {
                info!("Rescanned {} tracks", count);
                self.matches = self.library.search("");
                self.library_selected = 0;
                self.say(format!("Rescanned local audio files: {} tracks.", count));
            }
            Err(e) => {
                warn!("Rescan failed: {}", e);
                self.say(format!("❌ Rescan failed: {}", e));
            }
        }
    }

    fn load_playlist(&mut self, url: String) {
        self.say(format!("Loading YouTube playlist {} ...", url));
        let loader = self.loader.clone();
        let handle = self.handle.clone();
        let notices = self.notices.clone();
        tokio::spawn(async move {
            let notice = match loader.load(&url).await {
                Ok(tracks) if tracks.is_empty() => "No playlist items found.".to_string(),
                Ok(tracks) => {
                    let count = tracks.len();
                    let _ = handle.send(Intent::LoadPlaylist(tracks));
                    format!("Loaded {} items.", count)
                }
                Err(e) => {
                    warn!("Playlist load failed for {}: {}", url, e);
                    format!("❌ Failed to load playlist: {}", e)
                }
            };
            let _ = notices.send(notice);
        });
    }

    fn open_prompt(&mut self, kind: PromptKind) {
        self.prompt = Some(Prompt {
            kind,
            editor: LineEditor::default(),
        });
    }

    fn playlist_len(&self) -> usize {
        self.handle.snapshot().playlist_len
    }

    fn move_selection(&mut self, delta: isize) {
        let (selected, len) = match self.focus {
            Focus::Library => (&mut self.library_selected, self.matches.len()),
            Focus::Playlist => (&mut self.playlist_selected, self.handle.snapshot().playlist_len),
        };
        if len == 0 {
            return;
        }
        *selected = selected.saturating_add_signed(delta).min(len - 1);
        self.show_selection();
    }

    fn show_selection(&mut self) {
        let line = match self.focus {
            Focus::Library => self
                .matches
                .get(self.library_selected)
                .map(|track| entry_line(self.library_selected, &EntryView::of(track))),
            Focus::Playlist => {
                let snapshot = self.handle.snapshot();
                self.playlist_selected = self.playlist_selected.min(snapshot.entries.len().saturating_sub(1));
                snapshot
                    .entries
                    .get(self.playlist_selected)
                    .map(|entry| entry_line(self.playlist_selected, entry))
            }
        };
        match line {
            Some(line) => self.say(format!("> {}", line)),
            None => self.say("(nothing to select)"),
        }
    }

    fn list_library(&mut self) {
        let from = self.library_selected.saturating_sub(PAGE / 2);
        for line in library_lines(&self.matches, from, PAGE, self.library_selected) {
            self.say(line);
        }
    }

    fn say(&mut self, line: impl Into<String>) {
        self.outbox.push(line.into());
    }

    /// Print pending lines above the prompt, then redraw the prompt
    fn flush(&mut self, out: &mut impl Write) -> io::Result<()> {
        queue!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        for line in self.outbox.drain(..) {
            queue!(out, Print(line.replace('\n', "\r\n")), Print("\r\n"))?;
        }
        if let Some(prompt) = &self.prompt {
            queue!(out, Print(prompt.kind.label()), Print(prompt.editor.text()))?;
        }
        out.flush()
    }
}
