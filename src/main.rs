use anyhow::Result;
use clap::Parser;
use personalfm::{
    audio::PlaybackController,
    config::Config,
    download::ToolchainBackend,
    engine::{spawn_signal_listener, Engine, Intent},
    library::{FfprobeProbe, Library, PlaylistLoader, YtDlpPlaylistLoader, YtDlpResolver},
    ui::{event_line, App},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "personalfm")]
#[command(about = "Terminal player for local music folders and YouTube playlists")]
struct Args {
    /// Folders to scan into the library (defaults to the configured music directory)
    dirs: Vec<PathBuf>,

    /// YouTube playlist URL to load as the starting playlist
    #[arg(long)]
    playlist: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable developer logging (stderr instead of the log file)
    #[arg(long)]
    dev: bool,
}

fn init_logging(dev: bool) -> Result<Option<WorkerGuard>> {
    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,personalfm=debug"));

    if dev {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_env_filter(base_filter)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(None);
    }

    let log_dir = Config::config_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&log_dir, "personalfm.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::fmt()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(base_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.dev)?;
    info!("personalfm starting up");

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let timing = &config.timing;

    let resolver = Arc::new(YtDlpResolver::new(
        config.tools.resolver.clone(),
        timing.resolve_timeout(),
        timing.kill_grace(),
    ));
    let loader = Arc::new(YtDlpPlaylistLoader::new(
        config.tools.resolver.clone(),
        timing.playlist_timeout(),
        timing.kill_grace(),
    ));
    let probe = Arc::new(FfprobeProbe::new(
        config.tools.probe.clone(),
        timing.probe_timeout(),
        timing.kill_grace(),
    ));
    let backend = Arc::new(ToolchainBackend::new(
        config.tools.resolver.clone(),
        config.tools.converter.clone(),
    ));

    let roots = if args.dirs.is_empty() {
        vec![config.library.music_directory.clone()]
    } else {
        args.dirs.clone()
    };
    let mut library = Library::new(roots);
    println!("Scanning {} ...", display_roots(library.roots()));
    library.rescan()?;

    let playlist = match &args.playlist {
        Some(url) => {
            println!("Loading playlist {} ...", url);
            loader.load(url).await?
        }
        None => Vec::new(),
    };

    let player = PlaybackController::new(config.player.command(), resolver, timing.kill_grace());
    let (engine, mut events) = Engine::new(player, backend, timing.engine_settings());
    let (handle, engine_task) = engine.with_probe(probe).with_tracks(playlist).spawn();
    spawn_signal_listener(handle.clone())?;

    let app = App::new(handle.clone(), loader, library, config.library.download_directory.clone());
    let outcome = app.run(&mut events).await;

    // Quit may already have been sent by a key or a signal
    let _ = handle.send(Intent::Quit);
    drop(handle);
    engine_task.await?;
    while let Ok(event) = events.try_recv() {
        if let Some(line) = event_line(&event) {
            println!("{}", line);
        }
    }

    outcome?;
    info!("personalfm shut down cleanly");
    Ok(())
}

fn display_roots(roots: &[PathBuf]) -> String {
    roots
        .iter()
        .map(|root| root.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
