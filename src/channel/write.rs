//! Uniform write algorithms over channels and consumer buffers.
//!
//! The mirror image of the read algorithms: each call consumes from the
//! buffer's first readable range (clamped by the byte cap `n`) and
//! advances the buffer's consumer cursor by exactly the transferred count.
//! The `*_all` form keeps going through successive ranges until `n` bytes
//! left, the buffer drained, or the channel failed, returning the
//! transferred total alongside the terminating result.

use crate::buffer::ReadableBuffer;
use crate::channel::{WriteAtChannel, WriteChannel};
use crate::error::{Error, Result};

fn clamp(len: usize, n: u64) -> usize {
    if len as u64 > n {
        n as usize
    } else {
        len
    }
}

/// One write from `buffer`'s first readable range, at most `n` bytes.
pub fn write_some<C, B>(channel: &mut C, buffer: &mut B, n: u64) -> Result<usize>
where
    C: WriteChannel,
    B: ReadableBuffer,
{
    let count = {
        let Some(range) = buffer.readable_ranges().next() else {
            return Err(Error::NoDataInBuffer);
        };
        let limit = clamp(range.len(), n);
        channel.write_some(&range[..limit])?
    };
    buffer.discard(count);
    Ok(count)
}

/// Asynchronous twin of [`write_some`].
pub async fn async_write_some<C, B>(channel: &mut C, buffer: &mut B, n: u64) -> Result<usize>
where
    C: WriteChannel,
    B: ReadableBuffer,
{
    let count = {
        let Some(range) = buffer.readable_ranges().next() else {
            return Err(Error::NoDataInBuffer);
        };
        let limit = clamp(range.len(), n);
        let range = &range[..limit];
        channel.async_write_some(range).await?
    };
    buffer.discard(count);
    Ok(count)
}

/// Writes until `n` bytes left the buffer, the buffer drained, or the
/// channel failed.
///
/// Returns the bytes transferred together with the terminating result, so
/// partial progress survives an error.
pub fn write_all<C, B>(channel: &mut C, buffer: &mut B, n: u64) -> (u64, Result<()>)
where
    C: WriteChannel,
    B: ReadableBuffer,
{
    let mut total = 0u64;
    while total < n {
        match write_some(channel, buffer, n - total) {
            Ok(count) => total += count as u64,
            Err(Error::NoDataInBuffer) => break,
            Err(err) => return (total, Err(err)),
        }
    }
    (total, Ok(()))
}

/// Asynchronous twin of [`write_all`].
pub async fn async_write_all<C, B>(channel: &mut C, buffer: &mut B, n: u64) -> (u64, Result<()>)
where
    C: WriteChannel,
    B: ReadableBuffer,
{
    let mut total = 0u64;
    while total < n {
        match async_write_some(channel, buffer, n - total).await {
            Ok(count) => total += count as u64,
            Err(Error::NoDataInBuffer) => break,
            Err(err) => return (total, Err(err)),
        }
    }
    (total, Ok(()))
}

/// One direct write at `offset` from `buffer`'s first readable range.
pub fn write_some_at<C, B>(channel: &mut C, offset: u64, buffer: &mut B, n: u64) -> Result<usize>
where
    C: WriteAtChannel,
    B: ReadableBuffer,
{
    let count = {
        let Some(range) = buffer.readable_ranges().next() else {
            return Err(Error::NoDataInBuffer);
        };
        let limit = clamp(range.len(), n);
        channel.write_some_at(offset, &range[..limit])?
    };
    buffer.discard(count);
    Ok(count)
}

/// Asynchronous twin of [`write_some_at`].
pub async fn async_write_some_at<C, B>(
    channel: &mut C,
    offset: u64,
    buffer: &mut B,
    n: u64,
) -> Result<usize>
where
    C: WriteAtChannel,
    B: ReadableBuffer,
{
    let count = {
        let Some(range) = buffer.readable_ranges().next() else {
            return Err(Error::NoDataInBuffer);
        };
        let limit = clamp(range.len(), n);
        let range = &range[..limit];
        channel.async_write_some_at(offset, range).await?
    };
    buffer.discard(count);
    Ok(count)
}
