// Subprocess supervision - every external tool (player, resolver, downloader,
// converter, probe) runs through a ProcessHandle so it can always be reaped.
// Each child leads its own process group, signals go to the whole group.

use crate::error::{EngineError, Result};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, error, warn};

/// Program + arguments + working directory for one external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub capture_output: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            capture_output: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Pipe stdout/stderr instead of discarding them
    pub fn captured(mut self) -> Self {
        self.capture_output = true;
        self
    }

    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
    Stop,
    Continue,
}

impl Signal {
    fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
            Signal::Stop => libc::SIGSTOP,
            Signal::Continue => libc::SIGCONT,
        }
    }
}

/// Collected result of a captured tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

pub struct ProcessHandle {
    program: String,
    pid: u32,
    child: Child,
    exit: Option<ExitStatus>,
}

impl ProcessHandle {
    pub fn start(spec: &CommandSpec) -> Result<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .process_group(0);

        if spec.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| EngineError::SpawnFailed {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

        let pid = child.id().ok_or_else(|| EngineError::SpawnFailed {
            program: spec.program.clone(),
            reason: "process vanished before it could be tracked".to_string(),
        })?;

        debug!("Spawned pid {}: {}", pid, spec.display());

        Ok(Self {
            program: spec.program.clone(),
            pid,
            child,
            exit: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Send a signal to the process group. A reaped process is never signalled,
    /// its pid may already belong to someone else.
    pub fn signal(&mut self, sig: Signal) -> Result<()> {
        if self.try_status().is_some() {
            return Ok(());
        }

        let rc = unsafe { libc::killpg(self.pid as libc::pid_t, sig.as_raw()) };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err.into());
        }

        Ok(())
    }

    /// Non-blocking exit check. Collects the status the first time it is seen.
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        if self.exit.is_some() {
            return self.exit;
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("pid {} ({}) exited: {}", self.pid, self.program, status);
                self.exit = Some(status);
                self.exit
            }
            Ok(None) => None,
            Err(e) => {
                warn!("try_wait on pid {} failed: {}", self.pid, e);
                None
            }
        }
    }

    pub fn is_alive(&mut self) -> bool {
        self.try_status().is_none()
    }

    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }

        let status = self.child.wait().await?;
        self.exit = Some(status);
        Ok(status)
    }

    /// SIGKILL whatever is left of the group once the leader has been reaped.
    /// The group id stays reserved while any member is alive, so this cannot
    /// hit an unrelated process. ESRCH means the group is already empty.
    pub fn sweep_group(&self) {
        let rc = unsafe { libc::killpg(self.pid as libc::pid_t, libc::SIGKILL) };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!("Sweeping group {} ({}) failed: {}", self.pid, self.program, err);
            }
        } else {
            debug!("Killed leftover members of group {} ({})", self.pid, self.program);
        }
    }

    /// Terminate, give the group `grace` to exit, then SIGKILL and reap.
    /// Members that outlive the leader are killed as well.
    /// Returns None only if the status could not be collected at all.
    pub async fn kill_and_reap(&mut self, grace: Duration) -> Option<ExitStatus> {
        let status = self.terminate_leader(grace).await;
        self.sweep_group();
        status
    }

    async fn terminate_leader(&mut self, grace: Duration) -> Option<ExitStatus> {
        if let Some(status) = self.try_status() {
            return Some(status);
        }

        debug!("Terminating pid {} ({})", self.pid, self.program);
        if let Err(e) = self.signal(Signal::Terminate) {
            warn!("SIGTERM to pid {} failed: {}", self.pid, e);
        }
        // a stopped group only acts on SIGTERM once continued
        let _ = self.signal(Signal::Continue);

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit = Some(status);
                return Some(status);
            }
            Ok(Err(e)) => warn!("wait on pid {} failed: {}", self.pid, e),
            Err(_) => debug!("pid {} ignored SIGTERM for {:?}, killing", self.pid, grace),
        }

        let _ = self.signal(Signal::Kill);
        if let Err(e) = self.child.kill().await {
            warn!("SIGKILL to pid {} failed: {}", self.pid, e);
        }

        match self.child.wait().await {
            Ok(status) => {
                self.exit = Some(status);
                Some(status)
            }
            Err(e) => {
                error!("Could not reap pid {} ({}): {}", self.pid, self.program, e);
                None
            }
        }
    }
}

/// Dropping a handle that was never reaped kills its whole group. tokio's
/// `kill_on_drop` only reaches the leader and reaps it in the background.
impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.exit.is_none() {
            debug!("Dropping live pid {} ({}), killing its group", self.pid, self.program);
            self.sweep_group();
        }
    }
}

/// Run a tool with captured output to completion. On timeout the tool is
/// killed and reaped before the error is returned.
pub async fn run_captured(spec: &CommandSpec, timeout: Duration, grace: Duration) -> Result<ToolOutput> {
    let spec = spec.clone().captured();
    let mut handle = ProcessHandle::start(&spec)?;
    let stdout = handle.child.stdout.take();
    let stderr = handle.child.stderr.take();

    let outcome = tokio::time::timeout(timeout, async {
        let (stdout, stderr) = tokio::try_join!(read_stream(stdout), read_stream(stderr))?;
        let status = handle.wait().await?;
        Ok::<_, EngineError>(ToolOutput { status, stdout, stderr })
    })
    .await;

    match outcome {
        Ok(Ok(output)) => {
            handle.sweep_group();
            Ok(output)
        }
        Ok(Err(e)) => {
            handle.kill_and_reap(grace).await;
            Err(e)
        }
        Err(_) => {
            warn!("{} timed out after {:?}", spec.program, timeout);
            handle.kill_and_reap(grace).await;
            Err(EngineError::TimedOut {
                program: spec.program.clone(),
                after: timeout,
            })
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Look a binary up on PATH
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// True while `pid` exists and is not a zombie. A killed grandchild is
/// reparented and may linger unreaped, which still counts as dead.
#[cfg(test)]
pub(crate) fn pid_alive(pid: u32) -> bool {
    if unsafe { libc::kill(pid as libc::pid_t, 0) } != 0 {
        return false;
    }
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).unwrap_or_default();
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next());
    !matches!(state, Some('Z') | Some('X'))
}

/// Polls `pid_alive` until it turns false or `within` runs out
#[cfg(test)]
pub(crate) async fn wait_dead(pid: u32, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while pid_alive(pid) {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}
