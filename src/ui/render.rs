// Plain-text rendering of snapshots, lists and engine events

use crate::audio::{format_mmss, PlaybackState, Progress, Track};
use crate::download::ItemStatus;
use crate::engine::{EngineEvent, EngineSnapshot, EntryView};

pub const HELP: &str = "\
keys:
  Enter     play the selection (library: just that track, playlist: carry on from it)
  Space     pause / resume
  n / p     next / previous playlist entry
  s         stop
  x         shuffle on / off
  + / -     add the library selection / remove the playlist selection
  Up/Down   move the selection (j / k work too)
  Tab       switch between library and playlist
  l / i     list the focused pane / show what is playing
  /         search the library
  r         rescan the library
  d         save the playlist as MP3
  c         cancel the download
  :         type a command (:help lists them)
  q         quit";

pub const COMMANDS: &str = "\
commands:
  play N          play playlist entry N
  lib [N]         list library matches, or play match N on its own
  add N           append library match N to the playlist
  add TARGET      append a file path or YouTube URL
  rm N            remove playlist entry N
  find [QUERY]    search the library (blank shows everything)
  rescan          scan the music folders again
  load URL        replace the playlist with a YouTube playlist
  dl [FOLDER]     save the playlist as MP3
  pause | stop | next | prev | shuffle | cancel
  ls | status | quit";

pub fn status_line(snapshot: &EngineSnapshot) -> String {
    let icon = match snapshot.state {
        PlaybackState::Playing => "▶️",
        PlaybackState::Paused => "⏸️",
        PlaybackState::Starting => "⏳",
        PlaybackState::Idle => "⏹️",
    };

    let mut line = match &snapshot.title {
        Some(title) => {
            let bar = match snapshot.progress {
                Progress::Known(fraction) => format!(" {:>3}%", (fraction * 100.0).round() as u32),
                Progress::Unknown => String::new(),
            };
            format!(
                "{} {}  {} / {}{}",
                icon,
                title,
                format_mmss(Some(snapshot.elapsed)),
                format_mmss(snapshot.duration),
                bar
            )
        }
        None => format!("{} {}", icon, snapshot.state),
    };

    line.push_str(&format!("  | {} entries", snapshot.playlist_len));
    if snapshot.shuffle {
        line.push_str(", shuffle");
    }
    if let Some(download) = &snapshot.download {
        line.push_str(&format!(" | download {}/{}", download.completed, download.total));
    }
    line
}

/// `  3. title  (context)`
pub fn entry_line(index: usize, entry: &EntryView) -> String {
    if entry.context.is_empty() {
        format!("{:>3}. {}", index + 1, entry.title)
    } else {
        format!("{:>3}. {}  ({})", index + 1, entry.title, entry.context)
    }
}

/// Numbered listing with a marker on the cursor entry
pub fn playlist_lines(snapshot: &EngineSnapshot) -> Vec<String> {
    if snapshot.entries.is_empty() {
        return vec!["(playlist is empty, press + to add the library selection)".to_string()];
    }

    snapshot
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let marker = if snapshot.cursor == Some(index) { ">" } else { " " };
            format!("{} {}", marker, entry_line(index, entry))
        })
        .collect()
}

/// Up to `limit` library matches starting at `from`, with a marker on `selected`
pub fn library_lines(matches: &[Track], from: usize, limit: usize, selected: usize) -> Vec<String> {
    if matches.is_empty() {
        return vec!["(no matching tracks)".to_string()];
    }

    let mut lines: Vec<String> = matches
        .iter()
        .enumerate()
        .skip(from)
        .take(limit)
        .map(|(index, track)| {
            let marker = if index == selected { ">" } else { " " };
            format!("{} {}", marker, entry_line(index, &EntryView::of(track)))
        })
        .collect();

    let shown = from + lines.len();
    if shown < matches.len() {
        lines.push(format!("  ... {} more", matches.len() - shown));
    }
    lines
}

/// Text for one engine event; None for events that need no output
pub fn event_line(event: &EngineEvent) -> Option<String> {
    let line = match event {
        EngineEvent::TrackStarted(track) => format!("▶️ Playing: {}", track.display_title()),
        EngineEvent::TrackFinished(finished) if !finished.success => format!(
            "⚠️ Player stopped on {} (exit code {})",
            finished.track.display_title(),
            finished
                .exit_code
                .map_or_else(|| "none".to_string(), |code| code.to_string())
        ),
        EngineEvent::TrackFinished(_) => return None,
        EngineEvent::Stopped(track) => format!("⏹️ Stopped: {}", track.display_title()),
        EngineEvent::Paused => "⏸️ Paused".to_string(),
        EngineEvent::Resumed => "▶️ Resumed".to_string(),
        EngineEvent::ShuffleChanged(on) => format!("🔀 Shuffle {}", if *on { "on" } else { "off" }),
        EngineEvent::PlaylistChanged { len } => format!("📋 Playlist has {} entries", len),
        EngineEvent::DownloadStarted { total, folder } => {
            format!("⬇️ Saving {} entries to {}", total, folder.display())
        }
        EngineEvent::DownloadFinished(summary) => {
            let failed: Vec<&str> = summary
                .items
                .iter()
                .filter(|(_, status)| matches!(status, ItemStatus::Failed(_)))
                .map(|(title, _)| title.as_str())
                .collect();
            let mut line = format!(
                "✅ Download finished: {} saved, {} failed, {} cancelled in {}",
                summary.done,
                summary.failed,
                summary.cancelled,
                summary.folder.display()
            );
            if !failed.is_empty() {
                line.push_str(&format!(" (failed: {})", failed.join(", ")));
            }
            line
        }
        EngineEvent::Error(message) => format!("❌ {}", message),
        EngineEvent::Status(message) => message.clone(),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TrackFinished;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_status_line() {
        let snapshot = EngineSnapshot {
            state: PlaybackState::Playing,
            title: Some("Song".to_string()),
            elapsed: Duration::from_secs(30),
            duration: Some(Duration::from_secs(180)),
            progress: Progress::Known(30.0 / 180.0),
            playlist_len: 4,
            shuffle: true,
            ..EngineSnapshot::default()
        };
        assert_eq!(status_line(&snapshot), "▶️ Song  00:30 / 03:00  17%  | 4 entries, shuffle");

        let idle = EngineSnapshot::default();
        assert_eq!(status_line(&idle), "⏹️ stopped  | 0 entries");
    }

    #[test]
    fn test_playlist_lines_mark_cursor_and_show_context() {
        let entry = |title: &str, context: &str| EntryView {
            title: title.to_string(),
            context: context.to_string(),
        };
        let snapshot = EngineSnapshot {
            entries: Arc::new(vec![entry("a.mp3", "/music"), entry("Song", "Road Trip")]),
            cursor: Some(1),
            ..EngineSnapshot::default()
        };
        assert_eq!(
            playlist_lines(&snapshot),
            vec!["    1. a.mp3  (/music)", ">   2. Song  (Road Trip)"]
        );
    }

    #[test]
    fn test_library_lines_page() {
        let tracks: Vec<Track> = (0..5).map(|i| Track::local(format!("/m/{}.mp3", i))).collect();
        assert_eq!(
            library_lines(&tracks, 1, 2, 2),
            vec!["    2. 1.mp3  (/m)", ">   3. 2.mp3  (/m)", "  ... 2 more"]
        );
        assert_eq!(library_lines(&[], 0, 10, 0), vec!["(no matching tracks)"]);
    }

    #[test]
    fn test_event_lines() {
        let track = Track::local("/music/a.mp3");
        assert_eq!(
            event_line(&EngineEvent::TrackStarted(track.clone())).unwrap(),
            "▶️ Playing: a.mp3"
        );
        let clean = TrackFinished {
            track: track.clone(),
            exit_code: Some(0),
            success: true,
        };
        assert!(event_line(&EngineEvent::TrackFinished(clean)).is_none());
        let broken = TrackFinished {
            track,
            exit_code: Some(2),
            success: false,
        };
        assert!(event_line(&EngineEvent::TrackFinished(broken)).unwrap().contains("exit code 2"));
    }
}
