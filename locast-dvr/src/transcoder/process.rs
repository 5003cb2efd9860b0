//! ffmpeg process supervision.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

/// Errors starting a transcoder.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The binary could not be executed.
    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    /// The process died before it produced a stream.
    #[error("Transcoder exited during startup with {status}: {stderr}")]
    ExitedEarly { status: ExitStatus, stderr: String },

    /// Waiting on the process failed.
    #[error("Transcoder I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Starts one transcoder per stream.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    binary: String,
    launch_grace: Duration,
    stop_timeout: Duration,
}

/// A running transcoder and its output pipes.
pub struct Transcoder {
    pub handle: ProcessHandle,
    pub stdout: ChildStdout,
    pub stderr: Option<ChildStderr>,
}

impl ProcessRunner {
    pub fn new(binary: impl Into<String>, launch_grace: Duration, stop_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            launch_grace,
            stop_timeout,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Arguments that remux `source_uri` to MPEG-TS on stdout.
    pub fn command_args(source_uri: &str) -> Vec<String> {
        ["-i", source_uri, "-codec", "copy", "-f", "mpegts", "pipe:1"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Spawn a transcoder for `source_uri`.
    ///
    /// The process must survive the launch grace window. A non-zero exit
    /// inside the window fails the launch; the process is already reaped
    /// at that point.
    pub async fn start(&self, source_uri: &str) -> Result<Transcoder, LaunchError> {
        let mut child = Command::new(&self.binary)
            .args(Self::command_args(source_uri))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        debug!("Started {} (pid {:?}) for {}", self.binary, child.id(), source_uri);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stdout not captured"))?;
        let mut stderr = child.stderr.take();

        let mut handle = ProcessHandle {
            child,
            status: None,
            stop_timeout: self.stop_timeout,
            cancel: CancellationToken::new(),
        };

        match tokio::time::timeout(self.launch_grace, handle.child.wait()).await {
            Err(_) => {}
            Ok(Ok(status)) if status.success() => {
                debug!("{} finished during startup", self.binary);
                handle.status = Some(status);
            }
            Ok(Ok(status)) => {
                let stderr = match stderr.take() {
                    Some(pipe) => read_tail(pipe).await,
                    None => String::new(),
                };
                warn!("{} exited during startup with {}: {}", self.binary, status, stderr);
                return Err(LaunchError::ExitedEarly { status, stderr });
            }
            Ok(Err(e)) => {
                handle.terminate().await.ok();
                return Err(LaunchError::Io(e));
            }
        }

        Ok(Transcoder {
            handle,
            stdout,
            stderr,
        })
    }

    /// Run `<binary> -version` and return the first line of its output.
    pub async fn probe(&self) -> Result<String, LaunchError> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| LaunchError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(LaunchError::ExitedEarly {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }
}

/// Last line of a dead process's stderr, bounded in time and size.
async fn read_tail(mut pipe: ChildStderr) -> String {
    let mut buf = Vec::new();
    let mut limited = (&mut pipe).take(64 * 1024);
    let read = limited.read_to_end(&mut buf);
    if tokio::time::timeout(Duration::from_millis(200), read).await.is_err() {
        debug!("Timed out reading transcoder stderr");
    }
    String::from_utf8_lossy(&buf)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Owner of a running transcoder process.
pub struct ProcessHandle {
    child: Child,
    status: Option<ExitStatus>,
    stop_timeout: Duration,
    cancel: CancellationToken,
}

impl ProcessHandle {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Token cancelled once the process is being terminated.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the process and reap it.
    ///
    /// Sends SIGTERM, then SIGKILL if the process is still alive after the
    /// stop timeout. Calling this again returns the recorded exit status.
    pub async fn terminate(&mut self) -> io::Result<ExitStatus> {
        self.cancel.cancel();
        if let Some(status) = self.status {
            return Ok(status);
        }
        if let Some(status) = self.child.try_wait()? {
            self.status = Some(status);
            return Ok(status);
        }

        self.send_terminate();
        let status = match tokio::time::timeout(self.stop_timeout, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "Transcoder (pid {:?}) ignored SIGTERM for {:?}, killing",
                    self.child.id(),
                    self.stop_timeout
                );
                self.child.kill().await?;
                self.child.wait().await?
            }
        };
        info!("Transcoder exited with {}", status);
        self.status = Some(status);
        Ok(status)
    }

    #[cfg(unix)]
    fn send_terminate(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.child.id() {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => return,
                Err(e) => debug!("SIGTERM to pid {} failed: {}", pid, e),
            }
        }
        self.child.start_kill().ok();
    }

    #[cfg(not(unix))]
    fn send_terminate(&mut self) {
        self.child.start_kill().ok();
    }
}
