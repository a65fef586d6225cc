use super::DurationProbe;
use crate::process::{run_captured, CommandSpec};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Duration lookup through ffprobe's container header
pub struct FfprobeProbe {
    program: String,
    timeout: Duration,
    grace: Duration,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>, timeout: Duration, grace: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            grace,
        }
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Option<Duration> {
        let spec = CommandSpec::new(self.program.clone())
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "default=nw=1:nk=1"])
            .arg(path.to_string_lossy());

        match run_captured(&spec, self.timeout, self.grace).await {
            Ok(output) if output.status.success() => parse_probe_output(&output.stdout),
            Ok(output) => {
                debug!("ffprobe exited with {} for {}", output.status, path.display());
                None
            }
            Err(e) => {
                debug!("ffprobe unavailable for {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn parse_probe_output(stdout: &str) -> Option<Duration> {
    let seconds: f64 = stdout.trim().parse().ok()?;
    if seconds.is_finite() && seconds > 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        assert_eq!(parse_probe_output("183.500000\n"), Some(Duration::from_millis(183_500)));
        assert_eq!(parse_probe_output("N/A"), None);
        assert_eq!(parse_probe_output(""), None);
        assert_eq!(parse_probe_output("0"), None);
    }

    #[tokio::test]
    async fn test_probe_failure_is_unknown() {
        let failing = FfprobeProbe::new("false", Duration::from_secs(5), Duration::from_millis(200));
        assert_eq!(failing.probe(Path::new("/music/a.mp3")).await, None);

        let missing = FfprobeProbe::new("no-such-ffprobe", Duration::from_secs(5), Duration::from_millis(200));
        assert_eq!(missing.probe(Path::new("/music/a.mp3")).await, None);
    }
}
