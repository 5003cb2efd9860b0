//! Transcoder stdout to HTTP body relay.
//!
//! A [`StreamRelay`] reads at most one chunk each time the response body
//! is polled, so a slow client slows the transcoder down through the pipe
//! instead of filling memory. However the stream ends (EOF, read error or
//! the client going away) the process is terminated and reaped before
//! its tuner slot is released, and that cleanup runs exactly once.

use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};
use log::{debug, error, info, warn};
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::task::JoinHandle;

use super::process::{ProcessHandle, Transcoder};
use super::stderr::spawn_stderr_drain;
use crate::tuner::TunerSlot;

/// Everything owned by one active stream.
pub struct StreamSession {
    pub channel_id: String,
    pub source_uri: String,
    handle: ProcessHandle,
    stderr_task: Option<JoinHandle<()>>,
    slot: Option<TunerSlot>,
}

impl StreamSession {
    /// Terminate and reap the transcoder, then give back the tuner slot.
    pub async fn close(mut self, reason: &str) {
        debug!("Closing stream for channel {} from {}", self.channel_id, self.source_uri);
        match self.handle.terminate().await {
            Ok(status) => info!(
                "Stream for channel {} closed ({}), transcoder {}",
                self.channel_id, reason, status
            ),
            Err(e) => error!(
                "Failed to stop transcoder for channel {}: {}",
                self.channel_id, e
            ),
        }
        if let Some(task) = self.stderr_task.take() {
            task.await.ok();
        }
        drop(self.slot.take());
    }
}

/// Result of one read from the transcoder.
#[derive(Debug)]
pub enum RelayChunk {
    Data(Bytes),
    Eof,
    Failed(io::Error),
}

/// Pull-driven relay from transcoder stdout.
pub struct StreamRelay {
    stdout: Option<ChildStdout>,
    buf: BytesMut,
    chunk_size: usize,
    session: Option<StreamSession>,
}

impl StreamRelay {
    /// Wrap a freshly started transcoder. `slot` is held until the
    /// process has been reaped.
    pub fn start(
        transcoder: Transcoder,
        channel_id: &str,
        source_uri: &str,
        slot: Option<TunerSlot>,
        chunk_size: usize,
        verbose: bool,
    ) -> Self {
        let Transcoder {
            handle,
            stdout,
            stderr,
        } = transcoder;
        let stderr_task = stderr.map(|pipe| spawn_stderr_drain(pipe, handle.cancellation(), verbose));

        Self {
            stdout: Some(stdout),
            buf: BytesMut::with_capacity(chunk_size),
            chunk_size: chunk_size.max(1),
            session: Some(StreamSession {
                channel_id: channel_id.to_string(),
                source_uri: source_uri.to_string(),
                handle,
                stderr_task,
                slot,
            }),
        }
    }

    /// Read up to one chunk.
    pub async fn next_chunk(&mut self) -> RelayChunk {
        let Some(stdout) = self.stdout.as_mut() else {
            return RelayChunk::Eof;
        };
        self.buf.reserve(self.chunk_size);
        match (&mut *stdout)
            .take(self.chunk_size as u64)
            .read_buf(&mut self.buf)
            .await
        {
            Ok(0) => RelayChunk::Eof,
            Ok(_) => RelayChunk::Data(self.buf.split().freeze()),
            Err(e) => RelayChunk::Failed(e),
        }
    }

    /// Close the pipe and run session cleanup. Later calls do nothing.
    pub async fn finish(&mut self, reason: &str) {
        self.stdout.take();
        if let Some(session) = self.session.take() {
            session.close(reason).await;
        }
    }

    /// Response body yielding chunks until the stream ends.
    ///
    /// Read errors end the body without an error frame.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
        stream::unfold(Some(self), |state| async move {
            let mut relay = state?;
            match relay.next_chunk().await {
                RelayChunk::Data(bytes) => Some((Ok(bytes), Some(relay))),
                RelayChunk::Eof => {
                    relay.finish("end of stream").await;
                    None
                }
                RelayChunk::Failed(e) => {
                    warn!("Reading transcoder output failed: {}", e);
                    relay.finish("read error").await;
                    None
                }
            }
        })
    }
}

impl Drop for StreamRelay {
    fn drop(&mut self) {
        self.stdout.take();
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(session.close("client disconnected"));
            }
            Err(_) => {
                // No runtime left to reap on; kill_on_drop still kills the child.
                warn!("Dropping stream for channel {} outside a runtime", session.channel_id);
            }
        }
    }
}
