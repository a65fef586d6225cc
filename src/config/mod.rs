// Configuration for personalfm
// Tool names and timings, with defaults written out on first run

use crate::audio::PlayerCommand;
use crate::engine::EngineSettings;
use crate::process::find_in_path;
use anyhow::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub player: PlayerConfig,
    pub tools: ToolsConfig,
    pub timing: TimingConfig,
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub resolver: String,
    pub converter: String,
    pub probe: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub kill_grace_ms: u64,
    pub resolve_timeout_secs: u64,
    pub playlist_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub music_directory: PathBuf,
    pub download_directory: PathBuf,
}

impl PlayerConfig {
    pub fn mpv() -> Self {
        Self {
            program: "mpv".to_string(),
            args: ["--no-video", "--quiet", "--audio-display=no"].map(String::from).to_vec(),
        }
    }

    pub fn ffplay() -> Self {
        Self {
            program: "ffplay".to_string(),
            args: ["-nodisp", "-autoexit", "-loglevel", "quiet"].map(String::from).to_vec(),
        }
    }

    /// mpv if it is installed, ffplay otherwise
    pub fn detect() -> Self {
        if find_in_path("mpv").is_none() && find_in_path("ffplay").is_some() {
            debug!("mpv not on PATH, falling back to ffplay");
            return Self::ffplay();
        }
        Self::mpv()
    }

    pub fn command(&self) -> PlayerCommand {
        PlayerCommand::new(self.program.clone(), self.args.clone())
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self::detect()
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            resolver: "yt-dlp".to_string(),
            converter: "ffmpeg".to_string(),
            probe: "ffprobe".to_string(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            kill_grace_ms: 800,
            resolve_timeout_secs: 30,
            playlist_timeout_secs: 25,
            probe_timeout_secs: 2,
            tick_ms: 250,
        }
    }
}

impl TimingConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn playlist_timeout(&self) -> Duration {
        Duration::from_secs(self.playlist_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            kill_grace: self.kill_grace(),
            // a zero interval would make tokio panic
            tick: Duration::from_millis(self.tick_ms.max(10)),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            download_directory: dirs::audio_dir()
                .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
                .unwrap_or_else(|| PathBuf::from("~/Music")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            player: PlayerConfig::default(),
            tools: ToolsConfig::default(),
            timing: TimingConfig::default(),
            library: LibraryConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Read `path`, or write the defaults there if it does not exist yet
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            info!("Wrote default config to {}", path.display());
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> Result<PathBuf> {
        Ok(config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("personalfm"))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tools.resolver, "yt-dlp");
        assert_eq!(config.timing.kill_grace(), Duration::from_millis(800));
        assert_eq!(config.timing.engine_settings().tick, Duration::from_millis(250));
        assert!(["mpv", "ffplay"].contains(&config.player.program.as_str()));
    }

    #[test]
    fn test_missing_file_is_written_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.timing.tick_ms, config.timing.tick_ms);
        assert_eq!(reloaded.player.program, config.player.program);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[player]\nprogram = \"ffplay\"\nargs = [\"-nodisp\"]\n\n[timing]\nkill_grace_ms = 100\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.player.command(), PlayerCommand::new("ffplay", vec!["-nodisp".to_string()]));
        assert_eq!(config.timing.kill_grace_ms, 100);
        assert_eq!(config.timing.resolve_timeout_secs, 30);
        assert_eq!(config.tools.probe, "ffprobe");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is = = not toml").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
