//! Per-stream ffmpeg transcoders.
//!
//! - [`ProcessRunner`]: spawns ffmpeg and supervises its shutdown
//! - [`StreamRelay`]: relays stdout to an HTTP body with guaranteed cleanup
//! - [`spawn_stderr_drain`]: forwards ffmpeg diagnostics to the log

pub mod process;
pub mod relay;
pub mod stderr;

pub use process::{LaunchError, ProcessHandle, ProcessRunner, Transcoder};
pub use relay::{RelayChunk, StreamRelay, StreamSession};
pub use stderr::spawn_stderr_drain;
