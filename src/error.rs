//! Error types shared by every channel and reactor operation.
//!
//! All fallible operations in this crate return [`Result`]. The error
//! taxonomy is deliberately small: a handful of channel-level conditions
//! that callers are expected to branch on, plus [`Error::Os`] carrying the
//! platform error untouched so callers can inspect the native code.
//!
//! End-of-stream is an error, not a zero byte count: every `*_some`
//! operation that succeeds returns a strictly positive count, and a stream
//! that is exhausted fails with [`Error::EndOfFile`]. This keeps "no data
//! yet" and "no data ever" distinguishable at every call site.

use std::io;

/// The error type for channel and reactor operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The end of the stream or span has been reached.
    #[error("end of file")]
    EndOfFile,

    /// The range passed to a read operation has no space to read into.
    #[error("no space in buffer")]
    NoSpaceInBuffer,

    /// The range passed to a write operation has no data in it.
    #[error("no data in buffer")]
    NoDataInBuffer,

    /// The flags passed to a file channel's `open()` were not valid for
    /// the channel's shape.
    #[error("invalid file channel flags")]
    InvalidFlags,

    /// Attempt to open (or connect) a channel which is already open.
    #[error("channel is already open")]
    AlreadyOpen,

    /// Attempt to use a channel which is not open.
    #[error("channel is not open")]
    NotOpen,

    /// The operation was abandoned because the reactor shut down before
    /// the submission completed.
    #[error("operation cancelled by reactor shutdown")]
    Cancelled,

    /// An operating system error, surfaced verbatim.
    #[error(transparent)]
    Os(#[from] io::Error),
}

impl Error {
    /// Construct an [`Error::Os`] from a raw OS error code (an `errno`
    /// value on POSIX platforms).
    #[must_use]
    pub fn from_raw_os_error(code: i32) -> Self {
        Self::Os(io::Error::from_raw_os_error(code))
    }

    /// Returns true if this error is [`Error::EndOfFile`].
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::EndOfFile)
    }

    /// Returns the underlying OS error, if any.
    #[must_use]
    pub fn os_error(&self) -> Option<&io::Error> {
        match self {
            Self::Os(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the raw OS error code, if this is an OS error that has one.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        self.os_error().and_then(io::Error::raw_os_error)
    }
}

/// A specialized `Result` type for channel and reactor operations.
pub type Result<T> = std::result::Result<T, Error>;
