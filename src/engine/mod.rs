// The one place where intents are applied. Playback, playlist and the
// download job are owned by a single actor task; the UI talks to it through
// an EngineHandle and hears back through events and a snapshot watch.

pub mod signals;

pub use signals::spawn_signal_listener;

use crate::audio::{
    PlaybackController, PlaybackState, PlaybackStatus, PlaylistModel, Progress, Track, TrackFinished,
};
use crate::download::{
    prepare_folder, DownloadBackend, DownloadEvent, DownloadJob, DownloadManager, DownloadProgress, DownloadSummary,
    ItemStatus,
};
use crate::error::{EngineError, Result};
use crate::library::DurationProbe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum Intent {
    Play(Track),
    PlayEntry(usize),
    Pause,
    Resume,
    TogglePause,
    Stop,
    Next,
    Prev,
    ToggleShuffle,
    Add(Track),
    Remove(usize),
    LoadPlaylist(Vec<Track>),
    Download(PathBuf),
    CancelDownload,
    /// Tear everything down, then signal the sender so the process can stop itself
    Suspend(oneshot::Sender<()>),
    Quit,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    TrackStarted(Track),
    TrackFinished(TrackFinished),
    Stopped(Track),
    Paused,
    Resumed,
    ShuffleChanged(bool),
    PlaylistChanged { len: usize },
    DownloadStarted { total: usize, folder: PathBuf },
    DownloadFinished(DownloadSummary),
    Error(String),
    Status(String),
}

/// One playlist row as a display shows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    pub title: String,
    /// Folder of a local file, playlist name of a remote item
    pub context: String,
}

impl EntryView {
    pub fn of(track: &Track) -> Self {
        Self {
            title: track.display_title(),
            context: track.display_context(),
        }
    }
}

/// What a polling display needs, at most one tick stale
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub state: PlaybackState,
    pub title: Option<String>,
    pub elapsed: Duration,
    pub duration: Option<Duration>,
    pub progress: Progress,
    pub shuffle: bool,
    pub playlist_len: usize,
    pub cursor: Option<usize>,
    /// Entries in canonical order
    pub entries: Arc<Vec<EntryView>>,
    pub download: Option<DownloadProgress>,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            title: None,
            elapsed: Duration::ZERO,
            duration: None,
            progress: Progress::Unknown,
            shuffle: false,
            playlist_len: 0,
            cursor: None,
            entries: Arc::default(),
            download: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub kill_grace: Duration,
    pub tick: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            kill_grace: Duration::from_millis(800),
            tick: Duration::from_millis(250),
        }
    }
}

/// Cheap to clone. Once every handle is dropped the engine tears down and exits.
#[derive(Clone)]
pub struct EngineHandle {
    intents: mpsc::UnboundedSender<Intent>,
    snapshot: watch::Receiver<EngineSnapshot>,
}

impl EngineHandle {
    pub fn send(&self, intent: Intent) -> Result<()> {
        self.intents.send(intent).map_err(|_| EngineError::EngineClosed)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot.clone()
    }
}

enum Control {
    Continue,
    Quit,
}

/// A stream lookup running on its own task. Only the newest one counts.
struct PendingResolve {
    generation: u64,
    track: Track,
    from_playlist: bool,
    task: JoinHandle<()>,
}

struct Resolved {
    generation: u64,
    result: Result<String>,
}

pub struct Engine {
    player: PlaybackController,
    playlist: PlaylistModel,
    downloads: DownloadManager,
    download_events: mpsc::UnboundedReceiver<DownloadEvent>,
    probe: Option<Arc<dyn DurationProbe>>,
    probes: JoinSet<()>,
    events: mpsc::UnboundedSender<EngineEvent>,
    snapshot: watch::Sender<EngineSnapshot>,
    settings: EngineSettings,
    titles: Arc<Vec<EntryView>>,
    resolving: Option<PendingResolve>,
    resolve_generation: u64,
    resolved_tx: mpsc::UnboundedSender<Resolved>,
    resolved: mpsc::UnboundedReceiver<Resolved>,
    // the playing track came from the playlist, so its end advances the cursor
    playing_entry: bool,
}

impl Engine {
    pub fn new(
        player: PlaybackController,
        backend: Arc<dyn DownloadBackend>,
        settings: EngineSettings,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (download_tx, download_events) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(EngineSnapshot::default());
        let (resolved_tx, resolved) = mpsc::unbounded_channel();

        let engine = Self {
            player,
            playlist: PlaylistModel::new(),
            downloads: DownloadManager::new(backend, settings.kill_grace).with_events(download_tx),
            download_events,
            probe: None,
            probes: JoinSet::new(),
            events,
            snapshot,
            settings,
            titles: Arc::default(),
            resolving: None,
            resolve_generation: 0,
            resolved_tx,
            resolved,
            playing_entry: false,
        };
        (engine, events_rx)
    }

    /// Local tracks without a duration get probed in the background when they start
    pub fn with_probe(mut self, probe: Arc<dyn DurationProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_tracks(mut self, tracks: Vec<Track>) -> Self {
        self.playlist.load(tracks);
        self.refresh_titles();
        self
    }

    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (intents, intents_rx) = mpsc::unbounded_channel();
        let handle = EngineHandle {
            intents,
            snapshot: self.snapshot.subscribe(),
        };
        let task = tokio::spawn(self.run(intents_rx));
        (handle, task)
    }

    async fn run(mut self, mut intents: mpsc::UnboundedReceiver<Intent>) {
        let mut ticker = tokio::time::interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Engine running");

        loop {
            tokio::select! {
                intent = intents.recv() => {
                    let Some(intent) = intent else {
                        info!("All engine handles dropped");
                        break;
                    };
                    match self.apply(intent).await {
                        Ok(Control::Quit) => break,
                        Ok(Control::Continue) => {}
                        Err(e) => self.report(e),
                    }
                    self.on_tick().await;
                }
                _ = ticker.tick() => self.on_tick().await,
                Some(resolved) = self.resolved.recv() => {
                    self.on_resolved(resolved).await;
                    self.on_tick().await;
                }
                Some(event) = self.download_events.recv() => self.on_download_event(event),
                Some(_) = self.probes.join_next(), if !self.probes.is_empty() => {}
            }
        }

        self.teardown().await;
        info!("Engine stopped");
    }

    async fn apply(&mut self, intent: Intent) -> Result<Control> {
        debug!("Applying {:?}", intent);

        match intent {
            Intent::Play(track) => self.start(track, false).await?,
            Intent::PlayEntry(index) => {
                let track = self.playlist.select(index)?.clone();
                self.start(track, true).await?;
            }
            Intent::Pause => {
                self.player.pause()?;
                self.emit(EngineEvent::Paused);
            }
            Intent::Resume => {
                self.player.resume()?;
                self.emit(EngineEvent::Resumed);
            }
            Intent::TogglePause => match self.player.state() {
                PlaybackState::Paused => {
                    self.player.resume()?;
                    self.emit(EngineEvent::Resumed);
                }
                _ => {
                    self.player.pause()?;
                    self.emit(EngineEvent::Paused);
                }
            },
            Intent::Stop => self.stop_playback().await,
            Intent::Next => match self.playlist.next()? {
                Some(index) => self.start_entry(index).await?,
                None => self.emit(EngineEvent::Status("End of playlist".to_string())),
            },
            Intent::Prev => match self.playlist.previous()? {
                Some(index) => self.start_entry(index).await?,
                None => self.emit(EngineEvent::Status("Start of playlist".to_string())),
            },
            Intent::ToggleShuffle => {
                let on = self.playlist.toggle_shuffle();
                self.emit(EngineEvent::ShuffleChanged(on));
            }
            Intent::Add(track) => {
                self.playlist.add(track);
                self.playlist_changed();
            }
            Intent::Remove(index) => {
                self.playlist.remove(index)?;
                self.playlist_changed();
            }
            Intent::LoadPlaylist(tracks) => {
                self.playlist.load(tracks);
                self.playlist_changed();
            }
            Intent::Download(folder) => self.start_download(folder)?,
            Intent::CancelDownload => {
                self.downloads.cancel()?;
                self.emit(EngineEvent::Status("Cancelling download".to_string()));
            }
            Intent::Suspend(ack) => {
                info!("Suspending");
                self.teardown().await;
                let _ = ack.send(());
            }
            Intent::Quit => {
                info!("Quit requested");
                return Ok(Control::Quit);
            }
        }

        Ok(Control::Continue)
    }

    /// Local files start right away. Remote items are resolved on a separate
    /// task so intents keep flowing; the result comes back through `resolved`.
    async fn start(&mut self, track: Track, from_playlist: bool) -> Result<()> {
        self.cancel_resolve().await;
        self.playing_entry = false;

        if track.is_local() {
            self.player.play(track.clone()).await?;
            self.started(track, from_playlist);
            return Ok(());
        }

        self.player.begin().await;
        self.resolve_generation += 1;
        let generation = self.resolve_generation;
        let resolver = self.player.resolver();
        let results = self.resolved_tx.clone();
        let lookup = track.clone();
        let task = tokio::spawn(async move {
            let result = resolver.resolve(&lookup).await;
            let _ = results.send(Resolved { generation, result });
        });

        debug!("Resolving '{}' (generation {})", track.display_title(), generation);
        self.resolving = Some(PendingResolve {
            generation,
            track,
            from_playlist,
            task,
        });
        Ok(())
    }

    fn started(&mut self, track: Track, from_playlist: bool) {
        self.playing_entry = from_playlist;
        self.probe_duration(&track);
        self.emit(EngineEvent::TrackStarted(track));
    }

    async fn on_resolved(&mut self, resolved: Resolved) {
        if self.resolving.as_ref().map(|pending| pending.generation) != Some(resolved.generation) {
            debug!("Dropping superseded stream lookup {}", resolved.generation);
            return;
        }
        let Some(pending) = self.resolving.take() else {
            return;
        };

        let launched = match resolved.result {
            Ok(url) => self.player.launch(pending.track.clone(), &url).await,
            Err(e) => {
                self.player.abandon_start();
                Err(e)
            }
        };
        match launched {
            Ok(()) => self.started(pending.track, pending.from_playlist),
            Err(e) => self.report(e),
        }
    }

    /// Abort an in-flight lookup. Awaiting the aborted task drops the
    /// resolver's future, which kills that tool's process group.
    async fn cancel_resolve(&mut self) -> Option<Track> {
        let pending = self.resolving.take()?;
        pending.task.abort();
        let _ = pending.task.await;
        self.player.abandon_start();
        debug!("Cancelled stream lookup for '{}'", pending.track.display_title());
        Some(pending.track)
    }

    /// Play the entry the cursor already points at
    async fn start_entry(&mut self, index: usize) -> Result<()> {
        let track = self.playlist.get(index).cloned().ok_or(EngineError::OutOfRange {
            index,
            len: self.playlist.len(),
        })?;
        self.start(track, true).await
    }

    async fn stop_playback(&mut self) {
        self.playing_entry = false;
        let pending = self.cancel_resolve().await;
        if let Some(track) = self.player.stop().await.or(pending) {
            self.emit(EngineEvent::Stopped(track));
        }
    }

    fn probe_duration(&mut self, track: &Track) {
        let (Some(probe), Some(path)) = (self.probe.clone(), track.local_path()) else {
            return;
        };
        if track.duration().is_some() {
            return;
        }

        let path = path.to_path_buf();
        let track = track.clone();
        self.probes.spawn(async move {
            match probe.probe(&path).await {
                Some(duration) => {
                    track.attach_duration(duration);
                    debug!("Learned duration {:?} for {}", duration, path.display());
                }
                None => debug!("No duration for {}", path.display()),
            }
        });
    }

    fn start_download(&mut self, folder: PathBuf) -> Result<()> {
        if self.downloads.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        if self.playlist.is_empty() {
            return Err(EngineError::Empty);
        }

        let folder = prepare_folder(&folder)?;
        let job = DownloadJob::new(self.playlist.snapshot(), folder.clone());
        let total = job.total();
        self.downloads.start(job)?;
        self.emit(EngineEvent::DownloadStarted { total, folder });
        Ok(())
    }

    /// Observe process exits and finished downloads, then publish a snapshot.
    /// Runs on every tick and after every intent.
    async fn on_tick(&mut self) {
        let status = loop {
            let status = self.player.poll_status();
            match status.finished {
                Some(finished) => self.on_track_finished(finished).await,
                None => break status,
            }
        };

        if let Some(summary) = self.downloads.poll_finished().await {
            self.settle_download(summary);
        }

        self.publish(&status);
    }

    async fn on_track_finished(&mut self, finished: TrackFinished) {
        if !finished.success {
            warn!(
                "Player exited with {:?} on '{}'",
                finished.exit_code,
                finished.track.display_title()
            );
        }
        self.emit(EngineEvent::TrackFinished(finished));

        if !std::mem::take(&mut self.playing_entry) {
            return;
        }

        match self.playlist.next() {
            Ok(Some(index)) => {
                if let Err(e) = self.start_entry(index).await {
                    self.report(e);
                }
            }
            Ok(None) => self.emit(EngineEvent::Status("End of playlist".to_string())),
            Err(e) => self.report(e),
        }
    }

    fn on_download_event(&mut self, event: DownloadEvent) {
        let DownloadEvent::ItemSettled {
            number,
            total,
            title,
            status,
        } = event;

        let message = match status {
            ItemStatus::Done => format!("Saved {}/{}: {}", number, total, title),
            ItemStatus::Failed(reason) => format!("Failed {}/{}: {} ({})", number, total, title, reason),
            ItemStatus::Cancelled => format!("Cancelled {}/{}: {}", number, total, title),
            ItemStatus::Pending | ItemStatus::InProgress => return,
        };
        self.emit(EngineEvent::Status(message));
    }

    /// The job task has been joined, so every item event is already queued.
    /// They go out before the summary.
    fn settle_download(&mut self, summary: DownloadSummary) {
        while let Ok(event) = self.download_events.try_recv() {
            self.on_download_event(event);
        }
        self.emit(EngineEvent::DownloadFinished(summary));
    }

    /// Cancel the download, stop the player and any lookup, drop outstanding probes.
    /// Nothing spawned by the engine is alive afterwards.
    async fn teardown(&mut self) {
        if let Some(summary) = self.downloads.shutdown().await {
            self.settle_download(summary);
        }
        self.stop_playback().await;
        self.probes.shutdown().await;

        let status = self.player.poll_status();
        self.publish(&status);
    }

    fn refresh_titles(&mut self) {
        self.titles = Arc::new(
            self.playlist
                .entries()
                .iter()
                .map(|entry| EntryView::of(&entry.track))
                .collect(),
        );
    }

    fn playlist_changed(&mut self) {
        self.refresh_titles();
        self.emit(EngineEvent::PlaylistChanged {
            len: self.playlist.len(),
        });
    }

    fn publish(&self, status: &PlaybackStatus) {
        let snapshot = EngineSnapshot {
            state: status.state,
            title: status
                .track
                .as_ref()
                .or(self.resolving.as_ref().map(|pending| &pending.track))
                .map(Track::display_title),
            elapsed: status.elapsed,
            duration: status.duration,
            progress: status.progress,
            shuffle: self.playlist.is_shuffled(),
            playlist_len: self.playlist.len(),
            cursor: self.playlist.current_index(),
            entries: self.titles.clone(),
            download: self.downloads.progress(),
        };
        self.snapshot.send_replace(snapshot);
    }

    fn report(&self, error: EngineError) {
        warn!("{}", error);
        self.emit(EngineEvent::Error(error.to_string()));
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::tests::{sh_player, FakeResolver};
    use crate::download::ItemAction;
    use crate::library::StreamResolver;
    use crate::process::{pid_alive, run_captured, wait_dead, CommandSpec};
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Instant;

    /// Every item runs a long sleep that records its pid in the folder
    struct SleepingBackend;

    impl DownloadBackend for SleepingBackend {
        fn plan(&self, number: usize, _track: &Track, folder: &Path) -> anyhow::Result<ItemAction> {
            let pid_file = folder.join(format!("item{}.pid", number));
            let script = format!("echo $$ > '{}'; sleep 30", pid_file.display());
            Ok(ItemAction::Run(CommandSpec::new("sh").args(["-c", script.as_str()])))
        }
    }

    /// Every item is a tool that succeeds at once
    struct InstantBackend;

    impl DownloadBackend for InstantBackend {
        fn plan(&self, _number: usize, _track: &Track, _folder: &Path) -> anyhow::Result<ItemAction> {
            Ok(ItemAction::Run(CommandSpec::new("sh").args(["-c", "exit 0"])))
        }
    }

    /// Resolver whose tool records its pid and then hangs
    struct HangingResolver {
        pid_file: PathBuf,
    }

    #[async_trait]
    impl StreamResolver for HangingResolver {
        async fn resolve(&self, _track: &Track) -> Result<String> {
            let script = format!("echo $$ > '{}'; sleep 30", self.pid_file.display());
            let spec = CommandSpec::new("sh").args(["-c", script.as_str()]);
            let output = run_captured(&spec, Duration::from_secs(30), Duration::from_millis(200)).await?;
            Ok(output.stdout)
        }
    }

    fn remote(title: &str) -> Track {
        Track::remote(title, format!("https://www.youtube.com/watch?v={}", title), "Mix")
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            kill_grace: Duration::from_millis(300),
            tick: Duration::from_millis(20),
        }
    }

    fn engine(script: &str, resolver: Arc<dyn StreamResolver>) -> (Engine, mpsc::UnboundedReceiver<EngineEvent>) {
        let player = PlaybackController::new(sh_player(script), resolver, Duration::from_millis(300));
        Engine::new(player, Arc::new(SleepingBackend), settings())
    }

    fn local_tracks(n: usize) -> Vec<Track> {
        (0..n).map(|i| Track::local(format!("/music/{:02}.mp3", i))).collect()
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    async fn wait_for_file(path: &Path) -> u32 {
        for _ in 0..200 {
            if let Ok(text) = std::fs::read_to_string(path) {
                if let Ok(pid) = text.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} never appeared", path.display());
    }

    #[tokio::test]
    async fn test_quit_leaves_nothing_running() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, mut events) = engine("sleep 30", FakeResolver::ok("x"));
        engine = engine.with_tracks(local_tracks(3));

        engine.apply(Intent::PlayEntry(0)).await.unwrap();
        let player_pid = engine.player.current_pid().unwrap();
        engine.apply(Intent::Download(dir.path().to_path_buf())).await.unwrap();
        let tool_pid = wait_for_file(&dir.path().join("item1.pid")).await;

        assert!(matches!(engine.apply(Intent::Quit).await, Ok(Control::Quit)));
        engine.teardown().await;

        assert!(!pid_alive(player_pid));
        assert!(!pid_alive(tool_pid));
        assert_eq!(engine.player.state(), PlaybackState::Idle);
        assert!(!engine.downloads.is_running());

        let seen = drain(&mut events);
        assert!(seen.iter().any(|e| matches!(e, EngineEvent::Stopped(_))));
        let summary = seen
            .iter()
            .find_map(|e| match e {
                EngineEvent::DownloadFinished(summary) => Some(summary.clone()),
                _ => None,
            })
            .expect("download summary");
        assert_eq!(summary.cancelled, 3);
    }

    #[tokio::test]
    async fn test_resolve_failure_reports_error_and_stays_idle() {
        let (engine, mut events) = engine("sleep 30", FakeResolver::failing("video unavailable"));
        let (handle, task) = engine.spawn();

        handle
            .send(Intent::Play(Track::remote("Gone", "https://www.youtube.com/watch?v=gone", "Mix")))
            .unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(EngineEvent::Error(message)) = events.recv().await {
                    return message;
                }
            }
        })
        .await
        .unwrap();
        assert!(message.contains("video unavailable"));
        assert_eq!(handle.snapshot().state, PlaybackState::Idle);
        assert!(handle.snapshot().title.is_none());

        handle.send(Intent::Quit).unwrap();
        task.await.unwrap();
        assert!(matches!(handle.send(Intent::Stop), Err(EngineError::EngineClosed)));
    }

    #[tokio::test]
    async fn test_finished_entry_advances_to_next() {
        let (engine, mut events) = engine("exit 0", FakeResolver::ok("x"));
        let mut engine = engine.with_tracks(local_tracks(3));

        engine.apply(Intent::PlayEntry(0)).await.unwrap();
        for _ in 0..200 {
            engine.on_tick().await;
            if engine.player.state() == PlaybackState::Idle && engine.playlist.current_index() == Some(2) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let seen = drain(&mut events);
        let started = seen.iter().filter(|e| matches!(e, EngineEvent::TrackStarted(_))).count();
        let finished = seen.iter().filter(|e| matches!(e, EngineEvent::TrackFinished(_))).count();
        assert_eq!((started, finished), (3, 3));
        assert!(seen
            .iter()
            .any(|e| matches!(e, EngineEvent::Status(s) if s == "End of playlist")));
    }

    #[tokio::test]
    async fn test_direct_play_does_not_advance() {
        let (engine, _events) = engine("exit 0", FakeResolver::ok("x"));
        let mut engine = engine.with_tracks(local_tracks(2));

        engine.apply(Intent::Play(Track::local("/elsewhere/x.mp3"))).await.unwrap();
        for _ in 0..100 {
            engine.on_tick().await;
            if engine.player.state() == PlaybackState::Idle {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(engine.player.state(), PlaybackState::Idle);
        assert_eq!(engine.playlist.current_index(), None);
    }

    #[tokio::test]
    async fn test_next_clamps_at_last_entry() {
        let (engine, mut events) = engine("sleep 30", FakeResolver::ok("x"));
        let mut engine = engine.with_tracks(local_tracks(2));

        engine.apply(Intent::Next).await.unwrap();
        engine.apply(Intent::Next).await.unwrap();
        let pid = engine.player.current_pid().unwrap();
        engine.apply(Intent::Next).await.unwrap();

        assert_eq!(engine.playlist.current_index(), Some(1));
        assert_eq!(engine.player.current_pid(), Some(pid));
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, EngineEvent::Status(s) if s == "End of playlist")));

        engine.teardown().await;
        assert!(!pid_alive(pid));
    }

    #[tokio::test]
    async fn test_toggle_pause_and_invalid_states() {
        let (engine, _events) = engine("sleep 30", FakeResolver::ok("x"));
        let mut engine = engine.with_tracks(local_tracks(1));

        assert!(matches!(
            engine.apply(Intent::TogglePause).await,
            Err(EngineError::InvalidState { .. })
        ));
        assert!(matches!(engine.apply(Intent::Next).await, Ok(Control::Continue)));

        engine.apply(Intent::TogglePause).await.unwrap();
        assert_eq!(engine.player.state(), PlaybackState::Paused);
        engine.apply(Intent::TogglePause).await.unwrap();
        assert_eq!(engine.player.state(), PlaybackState::Playing);

        engine.teardown().await;
    }

    #[tokio::test]
    async fn test_download_preconditions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, _events) = engine("sleep 30", FakeResolver::ok("x"));

        assert!(matches!(
            engine.apply(Intent::Download(dir.path().to_path_buf())).await,
            Err(EngineError::Empty)
        ));
        assert!(matches!(engine.apply(Intent::CancelDownload).await, Err(EngineError::NoDownload)));

        engine.apply(Intent::Add(Track::local("/music/a.mp3"))).await.unwrap();
        engine.apply(Intent::Download(dir.path().to_path_buf())).await.unwrap();
        assert!(matches!(
            engine.apply(Intent::Download(dir.path().to_path_buf())).await,
            Err(EngineError::AlreadyRunning)
        ));

        engine.teardown().await;
    }

    #[tokio::test]
    async fn test_suspend_tears_down_and_acknowledges() {
        let (engine, _events) = engine("sleep 30", FakeResolver::ok("x"));
        let mut engine = engine.with_tracks(local_tracks(1));
        engine.apply(Intent::PlayEntry(0)).await.unwrap();
        let pid = engine.player.current_pid().unwrap();

        let (ack, done) = oneshot::channel();
        assert!(matches!(engine.apply(Intent::Suspend(ack)).await, Ok(Control::Continue)));
        done.await.unwrap();
        assert!(!pid_alive(pid));

        // still usable afterwards
        engine.apply(Intent::PlayEntry(0)).await.unwrap();
        engine.teardown().await;
    }

    #[tokio::test]
    async fn test_snapshot_follows_playlist_edits() {
        let (engine, mut events) = engine("sleep 30", FakeResolver::ok("x"));
        let (handle, task) = engine.spawn();
        let mut watch = handle.watch();

        handle.send(Intent::LoadPlaylist(local_tracks(4))).unwrap();
        handle.send(Intent::ToggleShuffle).unwrap();
        handle.send(Intent::Remove(0)).unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                watch.changed().await.unwrap();
                let snapshot = watch.borrow().clone();
                if snapshot.playlist_len == 3 && snapshot.shuffle {
                    return snapshot;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(snapshot.cursor, None);
        assert_eq!(snapshot.entries.len(), 3);
        assert_eq!(snapshot.state, PlaybackState::Idle);

        drop(handle);
        task.await.unwrap();
        let seen = drain(&mut events);
        assert!(seen.iter().any(|e| matches!(e, EngineEvent::ShuffleChanged(true))));
        assert!(seen.iter().any(|e| matches!(e, EngineEvent::PlaylistChanged { len: 3 })));
    }

    #[tokio::test]
    async fn test_quit_does_not_wait_for_stream_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("resolver.pid");
        let resolver = Arc::new(HangingResolver {
            pid_file: pid_file.clone(),
        });
        let (engine, _events) = engine("sleep 30", resolver);
        let (handle, task) = engine.spawn();

        handle.send(Intent::Play(remote("slow"))).unwrap();
        let resolver_pid = wait_for_file(&pid_file).await;

        let mut watch = handle.watch();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = watch.borrow_and_update().clone();
                if snapshot.state == PlaybackState::Starting {
                    return snapshot;
                }
                watch.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(snapshot.title.as_deref(), Some("slow"));

        let asked = Instant::now();
        handle.send(Intent::Quit).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(asked.elapsed() < Duration::from_secs(2));
        assert!(wait_dead(resolver_pid, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_later_play_supersedes_pending_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("resolver.pid");
        let (mut engine, mut events) = engine("sleep 30", Arc::new(HangingResolver { pid_file: pid_file.clone() }));

        engine.apply(Intent::Play(remote("first"))).await.unwrap();
        assert_eq!(engine.player.state(), PlaybackState::Starting);
        let resolver_pid = wait_for_file(&pid_file).await;

        engine.apply(Intent::Play(Track::local("/music/x.mp3"))).await.unwrap();
        assert!(engine.resolving.is_none());
        assert_eq!(engine.player.state(), PlaybackState::Playing);
        assert!(wait_dead(resolver_pid, Duration::from_secs(2)).await);

        let started: Vec<String> = drain(&mut events)
            .iter()
            .filter_map(|e| match e {
                EngineEvent::TrackStarted(track) => Some(track.display_title()),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec!["x.mp3"]);

        engine.teardown().await;
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("resolver.pid");
        let (mut engine, mut events) = engine("sleep 30", Arc::new(HangingResolver { pid_file: pid_file.clone() }));

        engine.apply(Intent::Play(remote("pending"))).await.unwrap();
        let resolver_pid = wait_for_file(&pid_file).await;
        engine.apply(Intent::Stop).await.unwrap();

        assert_eq!(engine.player.state(), PlaybackState::Idle);
        assert!(engine.player.current_pid().is_none());
        assert!(wait_dead(resolver_pid, Duration::from_secs(2)).await);
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, EngineEvent::Stopped(track) if track.display_title() == "pending")));
    }

    #[tokio::test]
    async fn test_superseded_lookup_result_is_ignored() {
        let (mut engine, mut events) = engine("sleep 30", FakeResolver::ok("https://stream"));

        engine.apply(Intent::Play(remote("old"))).await.unwrap();
        let stale = engine.resolving.as_ref().unwrap().generation;
        engine.apply(Intent::Play(remote("new"))).await.unwrap();

        engine
            .on_resolved(Resolved {
                generation: stale,
                result: Ok("https://old-stream".to_string()),
            })
            .await;
        assert!(engine.player.current_pid().is_none());
        assert_eq!(engine.player.state(), PlaybackState::Starting);

        // the old task may have answered before it was aborted
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.player.state() != PlaybackState::Playing {
                let next = engine.resolved.recv().await.unwrap();
                engine.on_resolved(next).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(engine.player.state(), PlaybackState::Playing);
        assert_eq!(engine.player.current_track().map(Track::display_title).as_deref(), Some("new"));
        assert!(drain(&mut events)
            .iter()
            .all(|e| !matches!(e, EngineEvent::TrackStarted(track) if track.display_title() == "old")));

        engine.teardown().await;
    }

    #[tokio::test]
    async fn test_item_lines_come_before_download_summary() {
        let dir = tempfile::tempdir().unwrap();
        let player = PlaybackController::new(sh_player("sleep 30"), FakeResolver::ok("x"), Duration::from_millis(300));
        let (engine, mut events) = Engine::new(player, Arc::new(InstantBackend), settings());
        let mut engine = engine.with_tracks(local_tracks(3));

        engine.apply(Intent::Download(dir.path().to_path_buf())).await.unwrap();
        for _ in 0..200 {
            engine.on_tick().await;
            if !engine.downloads.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let lines: Vec<String> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Status(message) => Some(message),
                EngineEvent::DownloadFinished(_) => Some("summary".to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[..3].iter().all(|line| line.starts_with("Saved")));
        assert_eq!(lines[3], "summary");
    }

    #[tokio::test]
    async fn test_snapshot_entries_carry_context() {
        let (engine, _events) = engine("sleep 30", FakeResolver::ok("x"));
        let engine = engine.with_tracks(vec![Track::local("/music/rock/a.mp3"), remote("b")]);
        let status = PlaybackStatus {
            state: PlaybackState::Idle,
            track: None,
            elapsed: Duration::ZERO,
            duration: None,
            progress: Progress::Unknown,
            finished: None,
        };
        engine.publish(&status);

        let snapshot = engine.snapshot.borrow().clone();
        assert_eq!(
            snapshot.entries.as_slice(),
            &[
                EntryView {
                    title: "a.mp3".to_string(),
                    context: "/music/rock".to_string()
                },
                EntryView {
                    title: "b".to_string(),
                    context: "Mix".to_string()
                },
            ]
        );
    }
}
