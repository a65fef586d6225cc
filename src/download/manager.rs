use super::{
    CurrentItem, DownloadBackend, DownloadEvent, DownloadJob, DownloadProgress, DownloadSummary, ItemAction, ItemStatus,
};
use crate::audio::Track;
use crate::error::{EngineError, Result};
use crate::process::ProcessHandle;
use chrono::Utc;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct JobState {
    job: DownloadJob,
    current: Option<usize>,
}

struct ActiveJob {
    state: Arc<Mutex<JobState>>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<DownloadSummary>,
}

/// Owns at most one download job. The worker runs items strictly one after
/// another on a tokio task; progress is shared through a mutex so the display
/// can read it at any time.
pub struct DownloadManager {
    backend: Arc<dyn DownloadBackend>,
    grace: Duration,
    events: Option<mpsc::UnboundedSender<DownloadEvent>>,
    active: Option<ActiveJob>,
}

impl DownloadManager {
    pub fn new(backend: Arc<dyn DownloadBackend>, grace: Duration) -> Self {
        Self {
            backend,
            grace,
            events: None,
            active: None,
        }
    }

    /// Per-item outcomes are also pushed here as they settle
    pub fn with_events(mut self, events: mpsc::UnboundedSender<DownloadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().map_or(false, |active| !active.task.is_finished())
    }

    pub fn start(&mut self, job: DownloadJob) -> Result<()> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        if let Some(stale) = self.active.take() {
            debug!("Discarding unpolled result of a previous download");
            stale.task.abort();
        }

        info!("Starting download of {} items into {}", job.total(), job.folder.display());

        let state = Arc::new(Mutex::new(JobState { job, current: None }));
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_job(
            state.clone(),
            self.backend.clone(),
            cancel_rx,
            self.grace,
            self.events.clone(),
        ));

        self.active = Some(ActiveJob { state, cancel, task });
        Ok(())
    }

    /// Request cancellation. The worker kills the in-flight tool and marks the
    /// rest of the job cancelled; use `poll_finished` or `shutdown` to collect it.
    pub fn cancel(&self) -> Result<()> {
        match &self.active {
            Some(active) if !active.task.is_finished() => {
                info!("Cancelling download");
                let _ = active.cancel.send(true);
                Ok(())
            }
            _ => Err(EngineError::NoDownload),
        }
    }

    pub fn progress(&self) -> Option<DownloadProgress> {
        let active = self.active.as_ref()?;
        let state = lock(&active.state);
        let current = state.current.map(|index| {
            let item = &state.job.items[index];
            CurrentItem {
                number: index + 1,
                title: item.track.display_title(),
                status: item.status.clone(),
            }
        });

        Some(DownloadProgress {
            completed: state.job.completed,
            total: state.job.total(),
            current,
        })
    }

    /// Summary of a job that has finished on its own or after cancel
    pub async fn poll_finished(&mut self) -> Option<DownloadSummary> {
        if !self.active.as_ref()?.task.is_finished() {
            return None;
        }
        let active = self.active.take()?;
        collect(active).await
    }

    /// Cancel whatever is running and wait until its tool has been reaped
    pub async fn shutdown(&mut self) -> Option<DownloadSummary> {
        let active = self.active.take()?;
        let _ = active.cancel.send(true);
        collect(active).await
    }
}

async fn collect(active: ActiveJob) -> Option<DownloadSummary> {
    match active.task.await {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!("Download worker failed: {}", e);
            None
        }
    }
}

fn lock(state: &Mutex<JobState>) -> MutexGuard<'_, JobState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn cancel_requested(cancel: &watch::Receiver<bool>) -> bool {
    // a dropped sender means the manager is gone, nobody is left to collect results
    *cancel.borrow() || cancel.has_changed().is_err()
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if cancel_requested(cancel) {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

async fn run_job(
    state: Arc<Mutex<JobState>>,
    backend: Arc<dyn DownloadBackend>,
    mut cancel: watch::Receiver<bool>,
    grace: Duration,
    events: Option<mpsc::UnboundedSender<DownloadEvent>>,
) -> DownloadSummary {
    let started_at = Utc::now();
    let (folder, tracks): (_, Vec<Track>) = {
        let state = lock(&state);
        (
            state.job.folder.clone(),
            state.job.items.iter().map(|item| item.track.clone()).collect(),
        )
    };
    let total = tracks.len();

    for (index, track) in tracks.iter().enumerate() {
        if cancel_requested(&cancel) {
            break;
        }

        {
            let mut state = lock(&state);
            state.job.items[index].status = ItemStatus::InProgress;
            state.current = Some(index);
        }

        let number = index + 1;
        let status = run_item(backend.as_ref(), number, track, &folder, &mut cancel, grace).await;
        match &status {
            ItemStatus::Done => info!("[{}/{}] saved {}", number, total, track.display_title()),
            ItemStatus::Failed(reason) => warn!("[{}/{}] failed {}: {}", number, total, track.display_title(), reason),
            _ => debug!("[{}/{}] {:?}", number, total, status),
        }

        {
            let mut state = lock(&state);
            if status == ItemStatus::Done {
                state.job.completed += 1;
            }
            state.job.items[index].status = status.clone();
        }

        if let Some(events) = &events {
            let _ = events.send(DownloadEvent::ItemSettled {
                number,
                total,
                title: track.display_title(),
                status: status.clone(),
            });
        }

        if status == ItemStatus::Cancelled {
            break;
        }
    }

    let mut state = lock(&state);
    state.current = None;
    for item in state.job.items.iter_mut().filter(|item| !item.status.is_settled()) {
        item.status = ItemStatus::Cancelled;
    }

    let items: Vec<(String, ItemStatus)> = state
        .job
        .items
        .iter()
        .map(|item| (item.track.display_title(), item.status.clone()))
        .collect();
    let count = |wanted: fn(&ItemStatus) -> bool| items.iter().filter(|(_, status)| wanted(status)).count();

    let summary = DownloadSummary {
        folder: state.job.folder.clone(),
        total,
        done: count(|s| *s == ItemStatus::Done),
        failed: count(|s| matches!(s, ItemStatus::Failed(_))),
        cancelled: count(|s| *s == ItemStatus::Cancelled),
        items,
        started_at,
        finished_at: Utc::now(),
    };

    info!(
        "Download finished: {} saved, {} failed, {} cancelled",
        summary.done, summary.failed, summary.cancelled
    );
    summary
}

async fn run_item(
    backend: &dyn DownloadBackend,
    number: usize,
    track: &Track,
    folder: &Path,
    cancel: &mut watch::Receiver<bool>,
    grace: Duration,
) -> ItemStatus {
    let action = match backend.plan(number, track, folder) {
        Ok(action) => action,
        Err(e) => return ItemStatus::Failed(e.to_string()),
    };

    match action {
        ItemAction::Copy { from, to } => match tokio::fs::copy(&from, &to).await {
            Ok(_) => ItemStatus::Done,
            Err(e) => ItemStatus::Failed(format!("copy failed: {}", e)),
        },
        ItemAction::Run(spec) => {
            let mut process = match ProcessHandle::start(&spec) {
                Ok(process) => process,
                Err(e) => return ItemStatus::Failed(e.to_string()),
            };

            let finished = tokio::select! {
                status = process.wait() => Some(status),
                _ = cancelled(cancel) => None,
            };

            if finished.is_some() {
                process.sweep_group();
            }

            match finished {
                Some(Ok(status)) if status.success() => ItemStatus::Done,
                Some(Ok(status)) => ItemStatus::Failed(format!("{} exited with {}", spec.program, status)),
                Some(Err(e)) => ItemStatus::Failed(e.to_string()),
                None => {
                    process.kill_and_reap(grace).await;
                    ItemStatus::Cancelled
                }
            }
        }
    }
}
