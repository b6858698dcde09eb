//! In-memory channel over a caller-supplied byte span.
//!
//! `MemChannel` gives a borrowed contiguous span the full channel surface:
//! direct operations address the span by offset, sequential operations go
//! through the channel's own read and write cursors. No operation ever
//! suspends; the async twins complete immediately.

use crate::channel::{Channel, ReadAtChannel, ReadChannel, WriteAtChannel, WriteChannel};
use crate::error::{Error, Result};

/// A channel reading and writing a borrowed byte span.
///
/// The span is supplied at [`open`](Self::open) and released at
/// [`close`](Self::close) (or drop). Writes past the end of the span are
/// clamped to the remaining space; operations at or past the end fail with
/// [`Error::EndOfFile`].
#[derive(Debug, Default)]
pub struct MemChannel<'a> {
    span: Option<&'a mut [u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl<'a> MemChannel<'a> {
    /// Creates a channel in the closed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the channel over `span`, resetting both cursors.
    pub fn open(&mut self, span: &'a mut [u8]) -> Result<()> {
        if self.span.is_some() {
            return Err(Error::AlreadyOpen);
        }
        self.span = Some(span);
        self.read_pos = 0;
        self.write_pos = 0;
        Ok(())
    }

    /// Length of the backing span, if open.
    #[must_use]
    pub fn len(&self) -> usize {
        self.span.as_ref().map_or(0, |span| span.len())
    }

    /// True if the channel is closed or the span is zero length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn span(&mut self) -> Result<&mut [u8]> {
        self.span.as_deref_mut().ok_or(Error::NotOpen)
    }
}

impl Channel for MemChannel<'_> {
    fn is_open(&self) -> bool {
        self.span.is_some()
    }

    fn close(&mut self) -> Result<()> {
        if self.span.take().is_none() {
            return Err(Error::NotOpen);
        }
        Ok(())
    }

    async fn async_close(&mut self) -> Result<()> {
        self.close()
    }
}

impl ReadAtChannel for MemChannel<'_> {
    fn read_some_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let span = self.span()?;
        let offset = usize::try_from(offset).map_err(|_| Error::EndOfFile)?;
        if offset >= span.len() {
            return Err(Error::EndOfFile);
        }
        if buf.is_empty() {
            return Err(Error::NoSpaceInBuffer);
        }

        let n = buf.len().min(span.len() - offset);
        buf[..n].copy_from_slice(&span[offset..offset + n]);
        Ok(n)
    }

    async fn async_read_some_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.read_some_at(offset, buf)
    }
}

impl WriteAtChannel for MemChannel<'_> {
    fn write_some_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        let span = self.span()?;
        let offset = usize::try_from(offset).map_err(|_| Error::EndOfFile)?;
        if offset >= span.len() {
            return Err(Error::EndOfFile);
        }
        if buf.is_empty() {
            return Err(Error::NoDataInBuffer);
        }

        // Clamp to the remaining space: a write that straddles the end
        // short-writes rather than failing.
        let n = buf.len().min(span.len() - offset);
        span[offset..offset + n].copy_from_slice(&buf[..n]);
        Ok(n)
    }

    async fn async_write_some_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        self.write_some_at(offset, buf)
    }
}

impl ReadChannel for MemChannel<'_> {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.read_some_at(self.read_pos as u64, buf)?;
        self.read_pos += n;
        Ok(n)
    }

    async fn async_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_some(buf)
    }
}

impl WriteChannel for MemChannel<'_> {
    fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.write_some_at(self.write_pos as u64, buf)?;
        self.write_pos += n;
        Ok(n)
    }

    async fn async_write_some(&mut self, buf: &[u8]) -> Result<usize> {
        self.write_some(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::block_on;

    #[test]
    fn read_some_entire_span_then_eof() {
        let mut backing = *b"ABC";
        let mut channel = MemChannel::new();
        channel.open(&mut backing).expect("open");

        let mut buf = [0u8; 3];
        assert_eq!(channel.read_some(&mut buf).expect("read"), 3);
        assert_eq!(&buf, b"ABC");

        let mut one = [0u8; 1];
        let err = channel.read_some(&mut one).expect_err("exhausted");
        assert!(err.is_eof());
    }

    #[test]
    fn read_some_partial_then_continues() {
        let mut backing = *b"ABC";
        let mut channel = MemChannel::new();
        channel.open(&mut backing).expect("open");

        let mut buf = [0u8; 1];
        for expected in [b'A', b'B', b'C'] {
            assert_eq!(channel.read_some(&mut buf).expect("read"), 1);
            assert_eq!(buf[0], expected);
        }
        assert!(channel.read_some(&mut buf).expect_err("eof").is_eof());
    }

    #[test]
    fn read_past_end_clamps() {
        let mut backing = *b"ABC";
        let mut channel = MemChannel::new();
        channel.open(&mut backing).expect("open");

        let mut buf = [b'X'; 4];
        assert_eq!(channel.read_some(&mut buf).expect("read"), 3);
        assert_eq!(&buf, b"ABCX");
    }

    #[test]
    fn write_some_at_clamps_and_ends() {
        let mut backing = [0u8; 3];
        let mut channel = MemChannel::new();
        channel.open(&mut backing).expect("open");

        assert_eq!(channel.write_some_at(0, b"A").expect("write"), 1);
        assert_eq!(channel.write_some_at(1, b"B").expect("write"), 1);
        assert_eq!(channel.write_some_at(2, b"C").expect("write"), 1);
        let err = channel.write_some_at(3, b"D").expect_err("past end");
        assert!(err.is_eof());

        channel.close().expect("close");
        assert_eq!(&backing, b"ABC");
    }

    #[test]
    fn straddling_write_short_writes() {
        let mut backing = [0u8; 4];
        let mut channel = MemChannel::new();
        channel.open(&mut backing).expect("open");

        assert_eq!(channel.write_some_at(2, b"wxyz").expect("write"), 2);
        channel.close().expect("close");
        assert_eq!(&backing, b"\0\0wx");
    }

    #[test]
    fn direct_write_then_direct_read_round_trips() {
        let mut backing = [0u8; 8];
        let mut channel = MemChannel::new();
        channel.open(&mut backing).expect("open");

        assert_eq!(channel.write_some_at(3, b"abc").expect("write"), 3);
        let mut buf = [0u8; 3];
        assert_eq!(channel.read_some_at(3, &mut buf).expect("read"), 3);
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn sequential_cursors_are_independent() {
        let mut backing = *b"AAAA";
        let mut channel = MemChannel::new();
        channel.open(&mut backing).expect("open");

        assert_eq!(channel.write_some(b"xy").expect("write"), 2);
        let mut buf = [0u8; 2];
        assert_eq!(channel.read_some(&mut buf).expect("read"), 2);
        assert_eq!(&buf, b"xy");
    }

    #[test]
    fn empty_ranges_are_rejected() {
        let mut backing = *b"AB";
        let mut channel = MemChannel::new();
        channel.open(&mut backing).expect("open");

        let mut empty = [0u8; 0];
        assert!(matches!(
            channel.read_some(&mut empty),
            Err(Error::NoSpaceInBuffer)
        ));
        assert!(matches!(
            channel.write_some(&[]),
            Err(Error::NoDataInBuffer)
        ));
    }

    #[test]
    fn lifecycle_errors() {
        let mut backing = *b"A";
        let mut channel = MemChannel::new();
        assert!(matches!(channel.close(), Err(Error::NotOpen)));

        let mut buf = [0u8; 1];
        assert!(matches!(channel.read_some(&mut buf), Err(Error::NotOpen)));

        channel.open(&mut backing).expect("open");
        assert!(channel.is_open());
        channel.close().expect("close");
        assert!(!channel.is_open());
        assert!(matches!(channel.close(), Err(Error::NotOpen)));
    }

    #[test]
    fn open_while_open_fails() {
        let mut first = *b"A";
        let mut second = *b"B";
        let mut channel = MemChannel::new();

        channel.open(&mut first).expect("open");
        let err = channel.open(&mut second).expect_err("double open");
        assert!(matches!(err, Error::AlreadyOpen));
    }

    #[test]
    fn reopen_after_close_is_allowed() {
        let mut first = *b"A";
        let mut second = *b"BC";
        let mut channel = MemChannel::new();

        channel.open(&mut first).expect("open");
        channel.close().expect("close");
        channel.open(&mut second).expect("reopen");
        assert_eq!(channel.len(), 2);
    }

    #[test]
    fn async_twins_complete_immediately() {
        let mut backing = *b"ABC";
        let mut channel = MemChannel::new();
        channel.open(&mut backing).expect("open");

        block_on(async {
            let mut buf = [0u8; 2];
            assert_eq!(channel.async_read_some(&mut buf).await.expect("read"), 2);
            assert_eq!(&buf, b"AB");
            assert_eq!(channel.async_write_some_at(0, b"z").await.expect("write"), 1);
            channel.async_close().await.expect("close");
        });
        assert_eq!(&backing[..1], b"z");
    }
}
