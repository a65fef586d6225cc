use std::time::{Duration, Instant};

/// How far into the track we are. `Unknown` means no duration was ever
/// learned - the display animates instead of drawing a bar at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    Known(f64),
    Unknown,
}

impl Progress {
    pub fn from_elapsed(elapsed: Duration, total: Option<Duration>) -> Self {
        match total {
            Some(total) if !total.is_zero() => {
                let fraction = elapsed.as_secs_f64() / total.as_secs_f64();
                Progress::Known(fraction.clamp(0.0, 1.0))
            }
            _ => Progress::Unknown,
        }
    }

    pub fn fraction(&self) -> Option<f64> {
        match self {
            Progress::Known(fraction) => Some(*fraction),
            Progress::Unknown => None,
        }
    }
}

/// Wall clock for one playback session with paused intervals taken out.
/// The `_at` variants take the current instant so callers and tests agree on "now".
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    started: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl PlaybackClock {
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(now: Instant) -> Self {
        Self {
            started: now,
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause_at(&mut self, now: Instant) -> bool {
        if self.paused_at.is_some() {
            return false;
        }
        self.paused_at = Some(now);
        true
    }

    pub fn resume_at(&mut self, now: Instant) -> bool {
        match self.paused_at.take() {
            Some(paused_at) => {
                self.paused_total += now.saturating_duration_since(paused_at);
                true
            }
            None => false,
        }
    }

    /// Frozen at the pause instant while paused
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        let until = self.paused_at.unwrap_or(now);
        until
            .saturating_duration_since(self.started)
            .saturating_sub(self.paused_total)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    pub fn progress_at(&self, now: Instant, total: Option<Duration>) -> Progress {
        Progress::from_elapsed(self.elapsed_at(now), total)
    }
}

/// `MM:SS`, or `??:??` when there is nothing meaningful to show
pub fn format_mmss(duration: Option<Duration>) -> String {
    match duration {
        Some(d) if !d.is_zero() => {
            let total = (d.as_secs_f64() + 0.5) as u64;
            format!("{:02}:{:02}", total / 60, total % 60)
        }
        _ => "??:??".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_fraction_for_known_duration() {
        let t0 = Instant::now();
        let clock = PlaybackClock::started_at(t0);
        let progress = clock.progress_at(t0 + 30 * SECOND, Some(180 * SECOND));

        let fraction = progress.fraction().unwrap();
        assert!((fraction - 0.1667).abs() < 0.001, "fraction was {}", fraction);
    }

    #[test]
    fn test_paused_interval_is_excluded() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::started_at(t0);

        assert!(clock.pause_at(t0 + 30 * SECOND));
        // frozen while paused
        assert_eq!(clock.elapsed_at(t0 + 35 * SECOND), 30 * SECOND);
        assert!(clock.resume_at(t0 + 40 * SECOND));

        assert_eq!(clock.elapsed_at(t0 + 40 * SECOND), 30 * SECOND);
        assert_eq!(clock.elapsed_at(t0 + 45 * SECOND), 35 * SECOND);
    }

    #[test]
    fn test_double_pause_and_stray_resume() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::started_at(t0);
        assert!(!clock.resume_at(t0 + SECOND));
        assert!(clock.pause_at(t0 + 2 * SECOND));
        assert!(!clock.pause_at(t0 + 3 * SECOND));
        assert!(clock.is_paused());
        assert_eq!(clock.elapsed_at(t0 + 10 * SECOND), 2 * SECOND);
    }

    #[test]
    fn test_fraction_is_clamped() {
        let over = Progress::from_elapsed(500 * SECOND, Some(180 * SECOND));
        assert_eq!(over, Progress::Known(1.0));

        let start = Progress::from_elapsed(Duration::ZERO, Some(180 * SECOND));
        assert_eq!(start, Progress::Known(0.0));
    }

    #[test]
    fn test_unknown_duration_never_fabricated() {
        assert_eq!(Progress::from_elapsed(42 * SECOND, None), Progress::Unknown);
        assert_eq!(Progress::from_elapsed(42 * SECOND, Some(Duration::ZERO)), Progress::Unknown);
        assert_eq!(Progress::Unknown.fraction(), None);
    }

    #[test]
    fn test_format_mmss() {
        assert_eq!(format_mmss(Some(Duration::from_secs(185))), "03:05");
        assert_eq!(format_mmss(Some(Duration::from_millis(59_600))), "01:00");
        assert_eq!(format_mmss(Some(Duration::ZERO)), "??:??");
        assert_eq!(format_mmss(None), "??:??");
    }
}
