// The local library: every scanned file, kept apart from the playlist.
// Tracks are picked from here to play directly or to append to the playlist.

use super::MusicScanner;
use crate::audio::Track;
use anyhow::Result;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::info;

/// Most matches a search hands back
pub const MAX_SHOW: usize = 400;

/// Lowercase, with every run of characters other than ASCII letters and
/// digits collapsed to a single space. "Ed_Sheeran - Live!" -> "ed sheeran live".
pub fn normalize_for_search(text: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let re = SEPARATORS.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));
    re.replace_all(&text.to_lowercase(), " ").trim().to_string()
}

pub fn squash_spaces(text: &str) -> String {
    text.replace(' ', "")
}

struct Indexed {
    track: Track,
    name: String,
    context: String,
    squashed_name: String,
    squashed_context: String,
}

impl Indexed {
    fn new(track: Track) -> Self {
        let name = normalize_for_search(&track.display_title());
        let context = normalize_for_search(&track.display_context());
        Self {
            squashed_name: squash_spaces(&name),
            squashed_context: squash_spaces(&context),
            track,
            name,
            context,
        }
    }

    fn matches(&self, query: &str, squashed: &str) -> bool {
        self.name.contains(query)
            || self.context.contains(query)
            || self.squashed_name.contains(squashed)
            || self.squashed_context.contains(squashed)
    }
}

pub struct Library {
    roots: Vec<PathBuf>,
    scanner: MusicScanner,
    entries: Vec<Indexed>,
}

impl Library {
    /// Empty until the first `rescan`
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            scanner: MusicScanner::new(),
            entries: Vec::new(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walk the roots again and replace the track list. Returns the new count.
    pub fn rescan(&mut self) -> Result<usize> {
        let tracks = self.scanner.scan_directories(&self.roots)?;
        self.replace(tracks);
        info!("Library holds {} tracks", self.entries.len());
        Ok(self.entries.len())
    }

    pub fn replace(&mut self, tracks: Vec<Track>) {
        self.entries = tracks.into_iter().map(Indexed::new).collect();
    }

    /// Tracks whose name or folder contains the query, in library order and
    /// capped at MAX_SHOW. Spaces in the query are optional, so "ed sheeran"
    /// also finds "edsheeran". A blank query lists everything.
    pub fn search(&self, query: &str) -> Vec<Track> {
        let query = normalize_for_search(query);
        if query.is_empty() {
            return self.entries.iter().take(MAX_SHOW).map(|e| e.track.clone()).collect();
        }

        let squashed = squash_spaces(&query);
        self.entries
            .iter()
            .filter(|entry| entry.matches(&query, &squashed))
            .take(MAX_SHOW)
            .map(|entry| entry.track.clone())
            .collect()
    }
}
