use super::output_stem;
use crate::audio::{Track, TrackSource};
use crate::library::normalize_youtube_url;
use crate::process::CommandSpec;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// What it takes to get one playlist item into the folder as MP3
#[derive(Debug, Clone, PartialEq)]
pub enum ItemAction {
    /// Already MP3, copied in-process
    Copy { from: PathBuf, to: PathBuf },
    /// Converter or downloader invocation
    Run(CommandSpec),
}

/// Decides per item which tool to run. An Err is recorded as that item's failure.
pub trait DownloadBackend: Send + Sync {
    fn plan(&self, number: usize, track: &Track, folder: &Path) -> Result<ItemAction>;
}

/// yt-dlp for remote items, ffmpeg for local non-MP3 files
pub struct ToolchainBackend {
    downloader: String,
    converter: String,
}

impl ToolchainBackend {
    pub fn new(downloader: impl Into<String>, converter: impl Into<String>) -> Self {
        Self {
            downloader: downloader.into(),
            converter: converter.into(),
        }
    }
}

impl DownloadBackend for ToolchainBackend {
    fn plan(&self, number: usize, track: &Track, folder: &Path) -> Result<ItemAction> {
        let stem = output_stem(number, &track.download_stem());

        match &track.source {
            TrackSource::Remote { url, .. } => {
                // yt-dlp picks the extension itself after extracting audio
                let template = folder.join(format!("{}.%(ext)s", stem));
                Ok(ItemAction::Run(
                    CommandSpec::new(self.downloader.clone())
                        .args(["--no-playlist", "-x", "--audio-format", "mp3", "--audio-quality", "0", "-o"])
                        .arg(template.to_string_lossy())
                        .arg(normalize_youtube_url(url)),
                ))
            }
            TrackSource::Local { path } => {
                if !path.exists() {
                    anyhow::bail!("missing file: {}", path.display());
                }

                let out = folder.join(format!("{}.mp3", stem));
                if track.format.is_mp3() {
                    return Ok(ItemAction::Copy {
                        from: path.clone(),
                        to: out,
                    });
                }

                Ok(ItemAction::Run(
                    CommandSpec::new(self.converter.clone())
                        .args(["-y", "-i"])
                        .arg(path.to_string_lossy())
                        .args(["-vn", "-codec:a", "libmp3lame", "-q:a", "0"])
                        .arg(out.to_string_lossy()),
                ))
            }
        }
    }
}
