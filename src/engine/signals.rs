use super::{EngineHandle, Intent};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Route terminal signals into the engine. SIGINT, SIGTERM and SIGHUP quit;
/// SIGTSTP tears down playback and downloads first, then stops the process
/// the way the default handler would have.
pub fn spawn_signal_listener(handle: EngineHandle) -> std::io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut suspend = signal(SignalKind::from_raw(libc::SIGTSTP))?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
                _ = hangup.recv() => "SIGHUP",
                _ = suspend.recv() => {
                    let (ack, done) = oneshot::channel();
                    if handle.send(Intent::Suspend(ack)).is_err() {
                        break;
                    }
                    if done.await.is_err() {
                        warn!("Engine went away during suspend");
                        break;
                    }
                    info!("Suspended");
                    unsafe {
                        libc::raise(libc::SIGSTOP);
                    }
                    info!("Resumed from suspend");
                    continue;
                }
            };

            info!("{} received, shutting down", name);
            let _ = handle.send(Intent::Quit);
            break;
        }
    }))
}
