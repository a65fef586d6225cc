use super::AudioFormat;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    /// Absolute path handed straight to the player
    Local { path: PathBuf },
    /// Watch URL that has to be resolved into a stream before playback
    Remote {
        url: String,
        title: String,
        playlist_title: String,
    },
}

/// A playable item. Identity never changes after construction; the duration
/// is a write-once cell shared by every clone so a late probe result shows up
/// wherever the track is referenced.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: Uuid,
    pub source: TrackSource,
    pub format: AudioFormat,
    duration: Arc<OnceLock<Duration>>,
}

impl Track {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: Uuid::new_v4(),
            format: AudioFormat::from_path(&path),
            source: TrackSource::Local { path },
            duration: Arc::new(OnceLock::new()),
        }
    }

    pub fn remote(title: impl Into<String>, url: impl Into<String>, playlist_title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            // yt-dlp decides the container, we only ever ask it for mp3
            format: AudioFormat::Unknown,
            source: TrackSource::Remote {
                url: url.into(),
                title: title.into(),
                playlist_title: playlist_title.into(),
            },
            duration: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_duration(self, duration: Duration) -> Self {
        self.attach_duration(duration);
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration.get().copied()
    }

    /// Returns false if a duration was already known
    pub fn attach_duration(&self, duration: Duration) -> bool {
        self.duration.set(duration).is_ok()
    }

    pub fn is_local(&self) -> bool {
        matches!(self.source, TrackSource::Local { .. })
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.source {
            TrackSource::Local { path } => Some(path),
            TrackSource::Remote { .. } => None,
        }
    }

    pub fn display_title(&self) -> String {
        match &self.source {
            TrackSource::Local { path } => path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("Unknown")
                .to_string(),
            TrackSource::Remote { title, .. } => title.clone(),
        }
    }

    /// Folder for local files, playlist name for remote items
    pub fn display_context(&self) -> String {
        match &self.source {
            TrackSource::Local { path } => path
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            TrackSource::Remote { playlist_title, .. } => playlist_title.clone(),
        }
    }

    /// File stem for local tracks, title for remote ones - used for output names
    pub fn download_stem(&self) -> String {
        match &self.source {
            TrackSource::Local { path } => path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("track")
                .to_string(),
            TrackSource::Remote { title, .. } => title.clone(),
        }
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_track_display() {
        let track = Track::local("/music/Rock/Song One.flac");
        assert_eq!(track.display_title(), "Song One.flac");
        assert_eq!(track.display_context(), "/music/Rock");
        assert_eq!(track.download_stem(), "Song One");
        assert_eq!(track.format, AudioFormat::Flac);
        assert!(track.is_local());
        assert!(track.duration().is_none());
    }

    #[test]
    fn test_remote_track_display() {
        let track = Track::remote("Live Set", "https://www.youtube.com/watch?v=abc", "Mixes");
        assert_eq!(track.display_title(), "Live Set");
        assert_eq!(track.display_context(), "Mixes");
        assert!(track.local_path().is_none());
    }

    #[test]
    fn test_duration_attaches_once_and_is_shared() {
        let track = Track::local("/music/a.mp3");
        let copy = track.clone();

        assert!(copy.attach_duration(Duration::from_secs(200)));
        assert_eq!(track.duration(), Some(Duration::from_secs(200)));

        // second probe result is ignored
        assert!(!track.attach_duration(Duration::from_secs(5)));
        assert_eq!(copy.duration(), Some(Duration::from_secs(200)));
    }

    #[test]
    fn test_clones_share_identity() {
        let a = Track::local("/music/a.mp3");
        let b = Track::local("/music/a.mp3");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
