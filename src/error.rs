//! Error types surfaced by the response writer.
//!
//! Sink and codec failures keep their [`io::ErrorKind`]; the writer only wraps
//! the original error in a [`DrainError`] that records which drain produced it.

use std::fmt;
use std::io;
use thiserror::Error;

/// The drain operation that was running when a sink or codec error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Emptying the deferred-decision buffer (into the sink or the codec).
    Buffer,
    /// Writing live bytes into the codec stream.
    Stream,
    /// Sync-flushing the codec stream on an explicit flush.
    Flush,
    /// Writing the codec trailer when the response finishes.
    Close,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Buffer => "buffer drain",
            Stage::Stream => "stream write",
            Stage::Flush => "stream flush",
            Stage::Close => "stream close",
        })
    }
}

/// A sink or codec failure annotated with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct DrainError {
    /// Where the failure happened.
    pub stage: Stage,
    /// The underlying sink or codec error.
    #[source]
    pub source: io::Error,
}

/// Misuse of a writer that is no longer accepting bytes.
#[derive(Debug, Error)]
pub enum WriterError {
    /// The response was already finished (or the connection hijacked).
    #[error("response writer is already finished")]
    Finished,
}

impl From<WriterError> for io::Error {
    fn from(err: WriterError) -> Self {
        io::Error::new(io::ErrorKind::BrokenPipe, err)
    }
}

/// Wraps `err` in a [`DrainError`] while keeping its kind.
pub(crate) fn annotate(stage: Stage, err: io::Error) -> io::Error {
    io::Error::new(err.kind(), DrainError { stage, source: err })
}

/// Returns the drain stage recorded on an error returned by the writer, if any.
pub fn drain_stage(err: &io::Error) -> Option<Stage> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<DrainError>())
        .map(|drain| drain.stage)
}
