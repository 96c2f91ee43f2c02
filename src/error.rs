//! Error types for virtual file reads.
//!
//! Hard failures (the call did nothing useful) are [`Error`] values. Soft
//! failures, where some bytes were delivered but not all, are reported through
//! [`Outcome`](crate::reader::Outcome) on a completed request instead.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Position lies beyond the end of the virtual file.
    #[error("offset {offset} is beyond the end of the virtual file ({size} bytes)")]
    OutOfRange { offset: u64, size: u64 },

    /// The range ran past the last part. `transferred` counts the bytes that
    /// were covered before the end was hit.
    #[error("end of file reached after {transferred} bytes")]
    EndOfFile { transferred: u64 },

    #[error("bad alignment: position {position}, length {length}, buffer {buffer:#x} (alignment {alignment})")]
    BadAlignment {
        position: u64,
        length: usize,
        buffer: usize,
        alignment: usize,
    },

    /// Submissions are rejected while a flush is in progress.
    #[error("operation not allowed while flushing")]
    WrongState,

    #[error("timed out waiting for a read to complete")]
    Timeout,

    /// The queue was drained during a flush and nothing is left to hand back.
    #[error("flushing: no pending requests left")]
    Flushing,

    #[error("I/O error: {0}")]
    Io(#[source] anyhow::Error),

    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),

    /// Reads are issued as tokio tasks; there was no runtime to spawn them on.
    #[error("cannot issue reads outside a tokio runtime")]
    NoRuntime,

    #[error("no virtual file loaded")]
    NotLoaded,

    #[error("invalid part table: {0}")]
    InvalidPartTable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Bytes that were delivered before the failure, if the failure carries
    /// a partial result.
    pub fn transferred(&self) -> Option<u64> {
        match self {
            Error::EndOfFile { transferred } => Some(*transferred),
            _ => None,
        }
    }

    /// Whether retrying the same call later can succeed without any change
    /// in state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
