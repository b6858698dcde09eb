//! Byte-channel capability traits, implementations, and uniform algorithms.
//!
//! A channel is a stateful byte-oriented endpoint. Channels are divided two
//! ways: by direction (read, write, or both) and by access style
//! (sequential, at "the current position", or direct, at an explicit
//! offset). Each capability is one trait, and a concrete channel
//! implements the subset it supports:
//!
//! | Trait | Capability |
//! |---|---|
//! | [`Channel`] | open/close lifecycle |
//! | [`ReadChannel`] | sequential read |
//! | [`WriteChannel`] | sequential write |
//! | [`ReadAtChannel`] | direct read at an offset |
//! | [`WriteAtChannel`] | direct write at an offset |
//!
//! # Operation semantics
//!
//! Every `*_some` operation transfers between one byte and the length of
//! the supplied range, and returns the count actually transferred, which
//! is **strictly positive** on success:
//!
//! - An exhausted stream fails with [`Error::EndOfFile`], never a zero
//!   count.
//! - An empty input range fails with [`Error::NoSpaceInBuffer`] (reads) or
//!   [`Error::NoDataInBuffer`] (writes).
//! - A closed channel fails with [`Error::NotOpen`]; opening an open
//!   channel fails with [`Error::AlreadyOpen`].
//!
//! Partial transfers are normal; use the [`read_all`]/[`write_all`]
//! algorithms to demand completion.
//!
//! Sync and async operations pair up: `read_some`/`async_read_some` and so
//! on. The sync forms never suspend; the async forms suspend at most in
//! the reactor. Channels own their native handle exclusively and are
//! move-only; dropping an open channel releases the handle, but an
//! explicit `close()` is preferred because it surfaces the final error.
//!
//! [`Error::EndOfFile`]: crate::Error::EndOfFile
//! [`Error::NoSpaceInBuffer`]: crate::Error::NoSpaceInBuffer
//! [`Error::NoDataInBuffer`]: crate::Error::NoDataInBuffer
//! [`Error::NotOpen`]: crate::Error::NotOpen
//! [`Error::AlreadyOpen`]: crate::Error::AlreadyOpen

mod file;
mod mem;
mod read;
mod tcp;
mod write;

pub use file::{
    DirectFile, DirectReadFile, DirectWriteFile, FileFlags, SeqFile, SeqReadFile, SeqWriteFile,
};
pub use mem::MemChannel;
pub use read::{async_read_all, async_read_some, async_read_some_at, read_all, read_some,
    read_some_at};
pub use tcp::TcpChannel;
pub use write::{async_write_all, async_write_some, async_write_some_at, write_all, write_some,
    write_some_at};

use crate::error::Result;
use std::future::Future;

/// Cap value meaning "no limit" for the byte-count parameter of the
/// uniform algorithms.
pub const UNLIMITED: u64 = u64::MAX;

/// Base capability: every channel can report and end its open state.
pub trait Channel {
    /// True between a successful open (or connect) and close.
    fn is_open(&self) -> bool;

    /// Closes the channel, surfacing the final flush error.
    ///
    /// Closing a channel that is not open fails with
    /// [`Error::NotOpen`](crate::Error::NotOpen).
    fn close(&mut self) -> Result<()>;

    /// Asynchronous twin of [`close`](Self::close).
    fn async_close(&mut self) -> impl Future<Output = Result<()>>;
}

/// Sequential read capability: reads at the channel's read cursor.
pub trait ReadChannel: Channel {
    /// Reads up to `buf.len()` bytes at the read cursor, advancing it by
    /// the returned count.
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Asynchronous twin of [`read_some`](Self::read_some).
    fn async_read_some(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize>>;
}

/// Sequential write capability: writes at the channel's write cursor.
pub trait WriteChannel: Channel {
    /// Writes up to `buf.len()` bytes at the write cursor, advancing it by
    /// the returned count.
    fn write_some(&mut self, buf: &[u8]) -> Result<usize>;

    /// Asynchronous twin of [`write_some`](Self::write_some).
    fn async_write_some(&mut self, buf: &[u8]) -> impl Future<Output = Result<usize>>;
}

/// Direct read capability: reads at an explicit offset, no cursor.
pub trait ReadAtChannel: Channel {
    /// Reads up to `buf.len()` bytes starting at `offset`.
    fn read_some_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Asynchronous twin of [`read_some_at`](Self::read_some_at).
    fn async_read_some_at(
        &mut self,
        offset: u64,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize>>;
}

/// Direct write capability: writes at an explicit offset, no cursor.
pub trait WriteAtChannel: Channel {
    /// Writes up to `buf.len()` bytes starting at `offset`.
    fn write_some_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize>;

    /// Asynchronous twin of [`write_some_at`](Self::write_some_at).
    fn async_write_some_at(
        &mut self,
        offset: u64,
        buf: &[u8],
    ) -> impl Future<Output = Result<usize>>;
}
