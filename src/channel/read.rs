//! Uniform read algorithms over channels and producer buffers.
//!
//! These free functions connect any readable channel to any
//! [`WritableBuffer`]: each call fills the buffer's first writable range
//! (clamped by the byte cap `n`, usually
//! [`UNLIMITED`](crate::channel::UNLIMITED)) and advances the
//! buffer's producer cursor by exactly the transferred count. The `*_all`
//! form loops until `n` bytes arrived, the buffer ran out of space, or the
//! channel reported an error; it returns the transferred total alongside
//! the terminating result so partial progress survives an error.

use crate::buffer::WritableBuffer;
use crate::channel::{ReadAtChannel, ReadChannel};
use crate::error::{Error, Result};

fn clamp(len: usize, n: u64) -> usize {
    if len as u64 > n {
        n as usize
    } else {
        len
    }
}

/// One read into `buffer`'s first writable range, at most `n` bytes.
pub fn read_some<C, B>(channel: &mut C, buffer: &mut B, n: u64) -> Result<usize>
where
    C: ReadChannel,
    B: WritableBuffer,
{
    let count = {
        let Some(range) = buffer.writable_ranges().next() else {
            return Err(Error::NoSpaceInBuffer);
        };
        let limit = clamp(range.len(), n);
        channel.read_some(&mut range[..limit])?
    };
    buffer.commit(count);
    Ok(count)
}

/// Asynchronous twin of [`read_some`].
pub async fn async_read_some<C, B>(channel: &mut C, buffer: &mut B, n: u64) -> Result<usize>
where
    C: ReadChannel,
    B: WritableBuffer,
{
    let count = {
        let Some(range) = buffer.writable_ranges().next() else {
            return Err(Error::NoSpaceInBuffer);
        };
        let limit = clamp(range.len(), n);
        channel.async_read_some(&mut range[..limit]).await?
    };
    buffer.commit(count);
    Ok(count)
}

/// Reads until `n` bytes arrived, the buffer filled up, or the channel
/// failed.
///
/// Returns the bytes transferred together with the terminating result; on
/// end-of-file the transferred count covers everything that arrived before
/// the stream ended.
pub fn read_all<C, B>(channel: &mut C, buffer: &mut B, n: u64) -> (u64, Result<()>)
where
    C: ReadChannel,
    B: WritableBuffer,
{
    let mut total = 0u64;
    while total < n {
        match read_some(channel, buffer, n - total) {
            Ok(count) => total += count as u64,
            Err(Error::NoSpaceInBuffer) => break,
            Err(err) => return (total, Err(err)),
        }
    }
    (total, Ok(()))
}

/// Asynchronous twin of [`read_all`].
pub async fn async_read_all<C, B>(channel: &mut C, buffer: &mut B, n: u64) -> (u64, Result<()>)
where
    C: ReadChannel,
    B: WritableBuffer,
{
    let mut total = 0u64;
    while total < n {
        match async_read_some(channel, buffer, n - total).await {
            Ok(count) => total += count as u64,
            Err(Error::NoSpaceInBuffer) => break,
            Err(err) => return (total, Err(err)),
        }
    }
    (total, Ok(()))
}

/// One direct read at `offset` into `buffer`'s first writable range.
pub fn read_some_at<C, B>(channel: &mut C, offset: u64, buffer: &mut B, n: u64) -> Result<usize>
where
    C: ReadAtChannel,
    B: WritableBuffer,
{
    let count = {
        let Some(range) = buffer.writable_ranges().next() else {
            return Err(Error::NoSpaceInBuffer);
        };
        let limit = clamp(range.len(), n);
        channel.read_some_at(offset, &mut range[..limit])?
    };
    buffer.commit(count);
    Ok(count)
}

/// Asynchronous twin of [`read_some_at`].
pub async fn async_read_some_at<C, B>(
    channel: &mut C,
    offset: u64,
    buffer: &mut B,
    n: u64,
) -> Result<usize>
where
    C: ReadAtChannel,
    B: WritableBuffer,
{
    let count = {
        let Some(range) = buffer.writable_ranges().next() else {
            return Err(Error::NoSpaceInBuffer);
        };
        let limit = clamp(range.len(), n);
        channel.async_read_some_at(offset, &mut range[..limit]).await?
    };
    buffer.commit(count);
    Ok(count)
}
