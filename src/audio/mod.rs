pub mod player;
pub mod playlist;
pub mod progress;
pub mod track;

pub use player::{PlaybackController, PlaybackState, PlaybackStatus, PlayerCommand, TrackFinished};
pub use playlist::{PlaylistEntry, PlaylistModel};
pub use progress::{format_mmss, PlaybackClock, Progress};
pub use track::{Track, TrackSource};

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Aac,
    Opus,
    Webm,
    Flac,
    Ogg,
    Wav,
    Unknown,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "m4a" | "mp4" => AudioFormat::M4a,
            "aac" => AudioFormat::Aac,
            "opus" => AudioFormat::Opus,
            "webm" => AudioFormat::Webm,
            "flac" => AudioFormat::Flac,
            "ogg" | "oga" => AudioFormat::Ogg,
            "wav" => AudioFormat::Wav,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(AudioFormat::from_extension)
            .unwrap_or(AudioFormat::Unknown)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, AudioFormat::Unknown)
    }

    /// Already in the download target format, a plain copy is enough
    pub fn is_mp3(&self) -> bool {
        matches!(self, AudioFormat::Mp3)
    }
}
