// Error taxonomy shared by the engine and its controllers.
// None of these are fatal - the engine reports them and stays usable.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to start {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("could not resolve stream: {0}")]
    ResolveFailed(String),

    #[error("index {index} out of range (playlist has {len} entries)")]
    OutOfRange { index: usize, len: usize },

    #[error("playlist is empty")]
    Empty,

    #[error("a download is already running")]
    AlreadyRunning,

    #[error("no download running")]
    NoDownload,

    #[error("cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },

    #[error("invalid download folder {}: {reason}", path.display())]
    InvalidFolder { path: PathBuf, reason: String },

    #[error("{program} timed out after {after:?}")]
    TimedOut { program: String, after: Duration },

    #[error("engine has shut down")]
    EngineClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
