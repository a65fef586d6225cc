// personalfm - terminal player for local folders and YouTube playlists
// Audio output and downloading are left to external tools; this crate
// supervises them and keeps the playlist, transport and download state.

pub mod audio;    // tracks, playlist, progress, the player process
pub mod config;   // settings and tool names
pub mod download; // bulk save-as-MP3 job
pub mod engine;   // intent queue and teardown
pub mod error;
pub mod library;  // library, scanner, yt-dlp and ffprobe collaborators
pub mod process;  // subprocess supervision
pub mod ui;       // keyboard front end

pub use audio::{PlaybackController, PlaybackState, PlaylistModel, Progress, Track};
pub use config::Config;
pub use download::DownloadManager;
pub use engine::{Engine, EngineEvent, EngineHandle, EngineSnapshot, Intent};
pub use error::{EngineError, Result};
