// Bulk "save playlist as MP3" - one background job at a time

pub mod backend;
pub mod manager;

pub use backend::{DownloadBackend, ItemAction, ToolchainBackend};
pub use manager::DownloadManager;

use crate::audio::Track;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    InProgress,
    Done,
    Failed(String),
    Cancelled,
}

impl ItemStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, ItemStatus::Pending | ItemStatus::InProgress)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadItem {
    pub track: Track,
    pub status: ItemStatus,
}

/// Snapshot of the playlist taken when the download starts. Later playlist
/// edits never reach a running job.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub folder: PathBuf,
    pub items: Vec<DownloadItem>,
    pub completed: usize,
}

impl DownloadJob {
    pub fn new(tracks: Vec<Track>, folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            items: tracks
                .into_iter()
                .map(|track| DownloadItem {
                    track,
                    status: ItemStatus::Pending,
                })
                .collect(),
            completed: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }
}

/// The item being worked on, numbered from 1 like the output files
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentItem {
    pub number: usize,
    pub title: String,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub completed: usize,
    pub total: usize,
    pub current: Option<CurrentItem>,
}

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    ItemSettled {
        number: usize,
        total: usize,
        title: String,
        status: ItemStatus,
    },
}

#[derive(Debug, Clone)]
pub struct DownloadSummary {
    pub folder: PathBuf,
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub items: Vec<(String, ItemStatus)>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DownloadSummary {
    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }
}

const MAX_FILENAME_CHARS: usize = 140;

/// Strip characters that are illegal on common filesystems, squeeze
/// whitespace, cap the length
pub fn safe_filename(name: &str) -> String {
    static ILLEGAL: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let illegal = ILLEGAL.get_or_init(|| Regex::new(r#"[\\/:*?"<>|]+"#).expect("static regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("static regex"));

    let replaced = illegal.replace_all(name, "_");
    let squeezed = spaces.replace_all(replaced.trim(), " ");
    let name = squeezed.trim();

    if name.is_empty() {
        return "track".to_string();
    }
    if name.chars().count() > MAX_FILENAME_CHARS {
        let mut cut: String = name.chars().take(MAX_FILENAME_CHARS - 1).collect();
        cut.push('…');
        return cut;
    }
    name.to_string()
}

/// `007 - Title` - numbering keeps playlist order in a plain directory listing
pub fn output_stem(number: usize, title: &str) -> String {
    format!("{:03} - {}", number, safe_filename(title))
}

/// Expand `~`, create the folder if needed and make sure we can write to it
pub fn prepare_folder(path: &Path) -> Result<PathBuf> {
    let folder = match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    };

    let invalid = |reason: String| EngineError::InvalidFolder {
        path: folder.clone(),
        reason,
    };

    std::fs::create_dir_all(&folder).map_err(|e| invalid(e.to_string()))?;
    if !folder.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }

    let c_path = CString::new(folder.as_os_str().as_bytes()).map_err(|e| invalid(e.to_string()))?;
    if unsafe { libc::access(c_path.as_ptr(), libc::W_OK) } != 0 {
        return Err(invalid("not writable".to_string()));
    }

    Ok(folder)
}
