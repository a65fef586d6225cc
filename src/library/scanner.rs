use crate::audio::{AudioFormat, Track};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Clone, Default)]
pub struct MusicScanner;

impl MusicScanner {
    pub fn new() -> Self {
        Self
    }

    /// Recursive scan. Unreadable entries are skipped rather than failing the
    /// whole scan; results are sorted by folder, then file name.
    pub fn scan_directory<P: AsRef<Path>>(&self, root: P) -> Result<Vec<Track>> {
        let root = root.as_ref().canonicalize()?;
        let mut paths: Vec<PathBuf> = Vec::new();

        for entry in WalkDir::new(&root).follow_links(false).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            // Skip hidden files (dotfiles)
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with('.'))
            {
                continue;
            }

            if AudioFormat::from_path(path).is_supported() {
                paths.push(path.to_path_buf());
            }
        }

        paths.sort_by_cached_key(|p| {
            (
                p.parent().map(|d| d.to_string_lossy().to_lowercase()).unwrap_or_default(),
                p.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default(),
            )
        });

        info!("Found {} audio files under {}", paths.len(), root.display());
        Ok(paths.into_iter().map(Track::local).collect())
    }

    /// Every root in turn; roots that do not exist are skipped
    pub fn scan_directories(&self, roots: &[PathBuf]) -> Result<Vec<Track>> {
        let mut all_tracks = Vec::new();
        for root in roots {
            if root.exists() {
                all_tracks.append(&mut self.scan_directory(root)?);
            } else {
                debug!("Skipping missing directory {}", root.display());
            }
        }
        Ok(all_tracks)
    }
}
