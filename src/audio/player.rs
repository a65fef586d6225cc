use super::progress::{PlaybackClock, Progress};
use super::track::{Track, TrackSource};
use crate::error::{EngineError, Result};
use crate::library::StreamResolver;
use crate::process::{CommandSpec, ProcessHandle, Signal};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Starting,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackState::Idle => "stopped",
            PlaybackState::Starting => "starting",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Media player invocation; the playback target is appended as the last argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PlayerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn spec_for(&self, target: &str) -> CommandSpec {
        CommandSpec::new(self.program.clone())
            .args(self.args.iter().cloned())
            .arg(target)
    }
}

/// A track whose player process exited by itself
#[derive(Debug, Clone)]
pub struct TrackFinished {
    pub track: Track,
    pub exit_code: Option<i32>,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub track: Option<Track>,
    pub elapsed: Duration,
    pub duration: Option<Duration>,
    pub progress: Progress,
    pub finished: Option<TrackFinished>,
}

struct PlaybackSession {
    track: Track,
    process: ProcessHandle,
    clock: PlaybackClock,
}

/// Owns the one and only player process. Starting a track always kills and
/// reaps the previous one first, so two players are never alive together.
pub struct PlaybackController {
    player: PlayerCommand,
    resolver: Arc<dyn StreamResolver>,
    grace: Duration,
    state: PlaybackState,
    session: Option<PlaybackSession>,
}

impl PlaybackController {
    pub fn new(player: PlayerCommand, resolver: Arc<dyn StreamResolver>, grace: Duration) -> Self {
        Self {
            player,
            resolver,
            grace,
            state: PlaybackState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.session.as_ref().map(|session| &session.track)
    }

    pub fn current_pid(&self) -> Option<u32> {
        self.session.as_ref().map(|session| session.process.pid())
    }

    pub fn resolver(&self) -> Arc<dyn StreamResolver> {
        self.resolver.clone()
    }

    /// Resolve (for remote items) and play. Callers that cannot wait for the
    /// resolver use `begin` and `launch` around their own lookup instead.
    pub async fn play(&mut self, track: Track) -> Result<()> {
        self.begin().await;

        let target = match &track.source {
            TrackSource::Local { path } => path.to_string_lossy().into_owned(),
            TrackSource::Remote { url, .. } => {
                debug!("Resolving stream for {}", url);
                match self.resolver.resolve(&track).await {
                    Ok(stream_url) => stream_url,
                    Err(e) => {
                        self.state = PlaybackState::Idle;
                        return Err(e);
                    }
                }
            }
        };

        self.launch(track, &target).await
    }

    /// Stop the current player and mark a start as under way
    pub async fn begin(&mut self) {
        self.stop().await;
        self.state = PlaybackState::Starting;
    }

    /// A start given up before any player was spawned
    pub fn abandon_start(&mut self) {
        if self.session.is_none() {
            self.state = PlaybackState::Idle;
        }
    }

    /// Spawn the player on an already resolved target
    pub async fn launch(&mut self, track: Track, target: &str) -> Result<()> {
        if self.session.is_some() {
            self.stop().await;
        }
        self.state = PlaybackState::Starting;

        let process = match ProcessHandle::start(&self.player.spec_for(target)) {
            Ok(process) => process,
            Err(e) => {
                self.state = PlaybackState::Idle;
                return Err(e);
            }
        };

        info!("Playing '{}' (pid {})", track.display_title(), process.pid());
        self.session = Some(PlaybackSession {
            track,
            process,
            clock: PlaybackClock::start(),
        });
        self.state = PlaybackState::Playing;

        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state != PlaybackState::Playing {
            return Err(self.invalid("pause"));
        }

        if let Some(session) = self.session.as_mut() {
            session.process.signal(Signal::Stop)?;
            session.clock.pause_at(Instant::now());
        }
        self.state = PlaybackState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state != PlaybackState::Paused {
            return Err(self.invalid("resume"));
        }

        if let Some(session) = self.session.as_mut() {
            session.process.signal(Signal::Continue)?;
            session.clock.resume_at(Instant::now());
        }
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Idempotent. Returns the track that was stopped, if any.
    pub async fn stop(&mut self) -> Option<Track> {
        self.state = PlaybackState::Idle;
        let mut session = self.session.take()?;

        if session.process.kill_and_reap(self.grace).await.is_none() {
            warn!("Player pid {} could not be reaped cleanly", session.process.pid());
        }
        info!("Stopped '{}'", session.track.display_title());
        Some(session.track)
    }

    /// Non-blocking. A player that exited on its own moves us to Idle and is
    /// reported once through `finished`.
    pub fn poll_status(&mut self) -> PlaybackStatus {
        let exited = self
            .session
            .as_mut()
            .and_then(|session| session.process.try_status());

        let mut finished = None;
        if let Some(status) = exited {
            if let Some(session) = self.session.take() {
                info!("'{}' finished: {}", session.track.display_title(), status);
                session.process.sweep_group();
                self.state = PlaybackState::Idle;
                finished = Some(TrackFinished {
                    track: session.track,
                    exit_code: status.code(),
                    success: status.success(),
                });
            }
        }

        let now = Instant::now();
        match &self.session {
            Some(session) => {
                let duration = session.track.duration();
                PlaybackStatus {
                    state: self.state,
                    track: Some(session.track.clone()),
                    elapsed: session.clock.elapsed_at(now),
                    duration,
                    progress: session.clock.progress_at(now, duration),
                    finished,
                }
            }
            None => PlaybackStatus {
                state: self.state,
                track: None,
                elapsed: Duration::ZERO,
                duration: None,
                progress: Progress::Unknown,
                finished,
            },
        }
    }

    fn invalid(&self, action: &'static str) -> EngineError {
        EngineError::InvalidState {
            action,
            state: self.state.to_string(),
        }
    }
}
