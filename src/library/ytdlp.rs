// yt-dlp as stream resolver and playlist loader

use super::{PlaylistLoader, StreamResolver};
use crate::audio::{Track, TrackSource};
use crate::error::{EngineError, Result};
use crate::process::{run_captured, CommandSpec};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

const STREAM_FORMAT: &str = "bestaudio[acodec!=none]/best[acodec!=none]/best";

pub struct YtDlpResolver {
    program: String,
    timeout: Duration,
    grace: Duration,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>, timeout: Duration, grace: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            grace,
        }
    }
}

#[async_trait]
impl StreamResolver for YtDlpResolver {
    async fn resolve(&self, track: &Track) -> Result<String> {
        let url = match &track.source {
            TrackSource::Remote { url, .. } => normalize_youtube_url(url),
            TrackSource::Local { path } => return Ok(path.to_string_lossy().into_owned()),
        };

        let spec = CommandSpec::new(self.program.clone())
            .args(["-f", STREAM_FORMAT, "-g", "--no-warnings"])
            .arg(url.clone());

        let output = run_captured(&spec, self.timeout, self.grace)
            .await
            .map_err(|e| EngineError::ResolveFailed(e.to_string()))?;

        if !output.status.success() {
            let message = tail(&format!("{}{}", output.stdout, output.stderr), 1000);
            warn!("yt-dlp could not resolve {}: {}", url, message);
            return Err(EngineError::ResolveFailed(format!("yt-dlp failed: {}", message)));
        }

        let stream = last_line(&output.stdout)
            .ok_or_else(|| EngineError::ResolveFailed("yt-dlp returned no stream URL".to_string()))?;
        debug!("Resolved {} to a stream", url);
        Ok(stream)
    }
}

pub struct YtDlpPlaylistLoader {
    program: String,
    timeout: Duration,
    grace: Duration,
}

impl YtDlpPlaylistLoader {
    pub fn new(program: impl Into<String>, timeout: Duration, grace: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            grace,
        }
    }
}

#[async_trait]
impl PlaylistLoader for YtDlpPlaylistLoader {
    async fn load(&self, url: &str) -> anyhow::Result<Vec<Track>> {
        let url = normalize_youtube_url(url);
        let spec = CommandSpec::new(self.program.clone())
            .args(["--flat-playlist", "-J", "--no-warnings"])
            .arg(url.clone());

        let output = run_captured(&spec, self.timeout, self.grace).await?;
        if !output.status.success() {
            anyhow::bail!("yt-dlp failed: {}", tail(&output.stderr, 500));
        }

        let tracks = parse_flat_playlist(&output.stdout)?;
        info!("Loaded {} entries from {}", tracks.len(), url);
        Ok(tracks)
    }
}

#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    title: Option<String>,
    #[serde(default)]
    entries: Option<Vec<serde_json::Value>>,
}

/// Parse `yt-dlp --flat-playlist -J` output into remote tracks
pub fn parse_flat_playlist(json: &str) -> anyhow::Result<Vec<Track>> {
    let playlist: FlatPlaylist = serde_json::from_str(json)?;
    let playlist_title = playlist
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "YouTube".to_string());

    let tracks = playlist
        .entries
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| {
            let entry = entry.as_object()?;
            let watch_url = watch_url(entry)?;
            let title = ["title", "id"]
                .iter()
                .find_map(|key| entry.get(*key).and_then(|v| v.as_str()))
                .filter(|t| !t.is_empty())
                .unwrap_or("Unknown");
            Some(Track::remote(title, watch_url, playlist_title.clone()))
        })
        .collect();

    Ok(tracks)
}

type Entry = serde_json::Map<String, serde_json::Value>;

fn text_field<'a>(entry: &'a Entry, key: &str) -> Option<&'a str> {
    entry
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn watch_url(entry: &Entry) -> Option<String> {
    if let Some(page) = text_field(entry, "webpage_url") {
        return Some(normalize_youtube_url(page));
    }

    let reference = text_field(entry, "url").or_else(|| text_field(entry, "id"))?;
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Some(normalize_youtube_url(reference));
    }
    if reference.starts_with("/watch?") || reference.starts_with("watch?") {
        let path = reference.trim_start_matches('/');
        return Some(normalize_youtube_url(&format!("https://www.youtube.com/{}", path)));
    }
    Some(normalize_youtube_url(&format!("https://www.youtube.com/watch?v={}", reference)))
}

/// Adds a missing scheme, lowercases the host and maps YouTube Music links
/// onto www.youtube.com so yt-dlp treats them like regular watch pages.
pub fn normalize_youtube_url(url: &str) -> String {
    static URL_PARTS: OnceLock<Regex> = OnceLock::new();
    let re = URL_PARTS.get_or_init(|| {
        Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?P<host>[^/?#]*)(?P<rest>.*)$")
            .expect("static regex")
    });

    let trimmed = url.trim();
    let with_scheme = if re.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    match re.captures(&with_scheme) {
        Some(caps) => {
            let mut host = caps["host"].to_lowercase();
            if host == "music.youtube.com" {
                host = "www.youtube.com".to_string();
            }
            format!("{}://{}{}", &caps["scheme"], host, &caps["rest"])
        }
        None => trimmed.to_string(),
    }
}

fn last_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}

fn tail(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
