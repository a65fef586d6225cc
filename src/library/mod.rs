// Collaborators the engine leans on but does not own: the local library,
// loading remote playlists, resolving streams, probing durations.
// The engine only sees the traits; the yt-dlp/ffprobe versions are defaults.

pub mod catalog;
pub mod probe;
pub mod scanner;
pub mod ytdlp;

pub use catalog::{normalize_for_search, squash_spaces, Library, MAX_SHOW};
pub use probe::FfprobeProbe;
pub use scanner::MusicScanner;
pub use ytdlp::{normalize_youtube_url, YtDlpPlaylistLoader, YtDlpResolver};

use crate::audio::Track;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Turns a remote track reference into a URL the player can open directly
#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve(&self, track: &Track) -> Result<String>;
}

/// Expands a playlist URL into remote tracks, in playlist order
#[async_trait]
pub trait PlaylistLoader: Send + Sync {
    async fn load(&self, url: &str) -> anyhow::Result<Vec<Track>>;
}

#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// None when the duration cannot be determined
    async fn probe(&self, path: &Path) -> Option<Duration>;
}
