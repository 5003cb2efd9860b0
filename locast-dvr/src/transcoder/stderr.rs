//! Transcoder diagnostics.

use log::{debug, info, trace};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::logging::FFMPEG_TARGET;

/// Forward transcoder stderr to the log until EOF or cancellation.
///
/// Lines are logged at INFO when `verbose` is set and at TRACE otherwise.
/// Progress updates separated by carriage returns are split into lines.
pub fn spawn_stderr_drain(
    stderr: ChildStderr,
    cancel: CancellationToken,
    verbose: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        loop {
            line.clear();
            tokio::select! {
                _ = cancel.cancelled() => break,
                read = reader.read_until(b'\n', &mut line) => match read {
                    Ok(0) => break,
                    Ok(_) => log_line(&String::from_utf8_lossy(&line), verbose),
                    Err(e) => {
                        debug!("Stopped reading transcoder stderr: {}", e);
                        break;
                    }
                },
            }
        }
    })
}

fn log_line(text: &str, verbose: bool) {
    for part in text.split(['\r', '\n']).map(str::trim).filter(|p| !p.is_empty()) {
        if verbose {
            info!(target: FFMPEG_TARGET, "{}", part);
        } else {
            trace!(target: FFMPEG_TARGET, "{}", part);
        }
    }
}
