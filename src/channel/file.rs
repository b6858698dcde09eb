//! File channels: sequential and direct access, in read, write, and
//! read-write shapes.
//!
//! Six concrete channel types share one private base:
//!
//! | Shape | Sequential | Direct |
//! |---|---|---|
//! | read-only | [`SeqReadFile`] | [`DirectReadFile`] |
//! | write-only | [`SeqWriteFile`] | [`DirectWriteFile`] |
//! | read-write | [`SeqFile`] | [`DirectFile`] |
//!
//! Sequential channels keep independent read and write cursors; direct
//! channels take the offset per call. A shape's `open` validates the flag
//! set before touching the OS: a read-only shape rejects
//! [`FileFlags::WRITE`], a write-only shape rejects [`FileFlags::READ`],
//! and the read-write shapes imply both. On a failed open the channel
//! stays closed.
//!
//! Synchronous operations issue the syscall directly; asynchronous ones go
//! through the process-global [`Reactor`].

use crate::channel::{Channel, ReadAtChannel, ReadChannel, WriteAtChannel, WriteChannel};
use crate::error::{Error, Result};
use crate::reactor::{sys, Reactor};
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Flag set accepted by the file channels' `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileFlags(u16);

impl FileFlags {
    /// No flags.
    pub const NONE: FileFlags = FileFlags(0);
    /// Open the file for reading.
    pub const READ: FileFlags = FileFlags(1 << 0);
    /// Open the file for writing.
    pub const WRITE: FileFlags = FileFlags(1 << 1);
    /// When opening for writing, truncate existing contents.
    pub const TRUNCATE: FileFlags = FileFlags(1 << 2);
    /// Force every sequential write to the end of the file.
    pub const APPEND: FileFlags = FileFlags(1 << 3);
    /// Allow creating a file that does not exist yet.
    pub const CREATE_NEW: FileFlags = FileFlags(1 << 4);
    /// Allow opening a file that already exists. Implied for read-only
    /// opens.
    pub const OPEN_EXISTING: FileFlags = FileFlags(1 << 5);

    /// True if every flag in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: FileFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Combines flag sets.
    #[must_use]
    pub const fn add(self, other: FileFlags) -> Self {
        FileFlags(self.0 | other.0)
    }
}

impl std::ops::BitOr for FileFlags {
    type Output = FileFlags;

    fn bitor(self, rhs: FileFlags) -> FileFlags {
        self.add(rhs)
    }
}

impl std::ops::BitOrAssign for FileFlags {
    fn bitor_assign(&mut self, rhs: FileFlags) {
        *self = self.add(rhs);
    }
}

/// Maps the portable flag set onto `open(2)` flags, rejecting
/// combinations that make no sense for any shape.
fn to_os_flags(flags: FileFlags) -> Result<i32> {
    let read = flags.contains(FileFlags::READ);
    let write = flags.contains(FileFlags::WRITE);

    let mut os = match (read, write) {
        (true, true) => libc::O_RDWR,
        (true, false) => libc::O_RDONLY,
        (false, true) => libc::O_WRONLY,
        (false, false) => return Err(Error::InvalidFlags),
    };
    os |= libc::O_CLOEXEC;

    if flags.contains(FileFlags::TRUNCATE) {
        if !write {
            return Err(Error::InvalidFlags);
        }
        os |= libc::O_TRUNC;
    }
    if flags.contains(FileFlags::APPEND) && !write {
        return Err(Error::InvalidFlags);
    }

    if write {
        let create_new = flags.contains(FileFlags::CREATE_NEW);
        let open_existing = flags.contains(FileFlags::OPEN_EXISTING);
        match (create_new, open_existing) {
            (true, true) => os |= libc::O_CREAT,
            (true, false) => os |= libc::O_CREAT | libc::O_EXCL,
            (false, true) => {}
            // Writable opens state their disposition explicitly.
            (false, false) => return Err(Error::InvalidFlags),
        }
    }

    Ok(os)
}

const DEFAULT_MODE: u32 = 0o666;

fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::Os(io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL")))
}

/// Shared state of every file channel shape.
#[derive(Debug, Default)]
struct FileBase {
    fd: Option<OwnedFd>,
    append: bool,
    read_pos: u64,
    write_pos: u64,
}

impl FileBase {
    fn fd(&self) -> Result<RawFd> {
        self.fd.as_ref().map(AsRawFd::as_raw_fd).ok_or(Error::NotOpen)
    }

    fn open_sync(&mut self, path: &Path, flags: FileFlags) -> Result<()> {
        if self.fd.is_some() {
            return Err(Error::AlreadyOpen);
        }
        let os_flags = to_os_flags(flags)?;
        let cpath = path_to_cstring(path)?;
        let fd = sys::open(&cpath, os_flags, DEFAULT_MODE)?;
        self.adopt(fd, flags)
    }

    async fn open_async(&mut self, path: &Path, flags: FileFlags) -> Result<()> {
        if self.fd.is_some() {
            return Err(Error::AlreadyOpen);
        }
        let os_flags = to_os_flags(flags)?;
        let fd = Reactor::global()
            .async_open(path, os_flags, DEFAULT_MODE)
            .await?;
        self.adopt(fd, flags)
    }

    #[allow(unsafe_code)]
    fn adopt(&mut self, fd: RawFd, flags: FileFlags) -> Result<()> {
        // SAFETY: fd was just opened on our behalf and is owned here on.
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        self.append = flags.contains(FileFlags::APPEND);
        self.read_pos = 0;
        self.write_pos = if self.append {
            sys::file_size(owned.as_raw_fd())?
        } else {
            0
        };
        self.fd = Some(owned);
        Ok(())
    }

    fn close_sync(&mut self) -> Result<()> {
        let fd = self.fd.take().ok_or(Error::NotOpen)?;
        sys::close(fd.into_raw_fd())
    }

    async fn close_async(&mut self) -> Result<()> {
        let fd = self.fd.take().ok_or(Error::NotOpen)?;
        Reactor::global().async_close(fd.into_raw_fd()).await
    }

    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoSpaceInBuffer);
        }
        let n = sys::pread(fd, buf, self.read_pos)?;
        if n == 0 {
            return Err(Error::EndOfFile);
        }
        self.read_pos += n as u64;
        Ok(n)
    }

    async fn async_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoSpaceInBuffer);
        }
        let n = Reactor::global().async_pread(fd, buf, self.read_pos).await?;
        if n == 0 {
            return Err(Error::EndOfFile);
        }
        self.read_pos += n as u64;
        Ok(n)
    }

    fn write_cursor(&mut self, fd: RawFd) -> Result<u64> {
        if self.append {
            // Append semantics: the cursor is forced to end-of-file before
            // every write.
            self.write_pos = sys::file_size(fd)?;
        }
        Ok(self.write_pos)
    }

    fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoDataInBuffer);
        }
        let offset = self.write_cursor(fd)?;
        let n = sys::pwrite(fd, buf, offset)?;
        if n == 0 {
            return Err(Error::Os(io::ErrorKind::WriteZero.into()));
        }
        self.write_pos = offset + n as u64;
        Ok(n)
    }

    async fn async_write_some(&mut self, buf: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoDataInBuffer);
        }
        let offset = self.write_cursor(fd)?;
        let n = Reactor::global().async_pwrite(fd, buf, offset).await?;
        if n == 0 {
            return Err(Error::Os(io::ErrorKind::WriteZero.into()));
        }
        self.write_pos = offset + n as u64;
        Ok(n)
    }

    fn read_some_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoSpaceInBuffer);
        }
        let n = sys::pread(fd, buf, offset)?;
        if n == 0 {
            return Err(Error::EndOfFile);
        }
        Ok(n)
    }

    async fn async_read_some_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoSpaceInBuffer);
        }
        let n = Reactor::global().async_pread(fd, buf, offset).await?;
        if n == 0 {
            return Err(Error::EndOfFile);
        }
        Ok(n)
    }

    fn write_some_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoDataInBuffer);
        }
        let n = sys::pwrite(fd, buf, offset)?;
        if n == 0 {
            return Err(Error::Os(io::ErrorKind::WriteZero.into()));
        }
        Ok(n)
    }

    async fn async_write_some_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoDataInBuffer);
        }
        let n = Reactor::global().async_pwrite(fd, buf, offset).await?;
        if n == 0 {
            return Err(Error::Os(io::ErrorKind::WriteZero.into()));
        }
        Ok(n)
    }
}

macro_rules! channel_lifecycle {
    ($type:ty) => {
        impl Channel for $type {
            fn is_open(&self) -> bool {
                self.base.fd.is_some()
            }

            fn close(&mut self) -> Result<()> {
                self.base.close_sync()
            }

            async fn async_close(&mut self) -> Result<()> {
                self.base.close_async().await
            }
        }
    };
}

/// A sequential channel that reads from a file.
#[derive(Debug, Default)]
pub struct SeqReadFile {
    base: FileBase,
}

impl SeqReadFile {
    /// Creates a channel in the closed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `path` for sequential reading.
    ///
    /// [`FileFlags::WRITE`] is rejected with
    /// [`Error::InvalidFlags`](crate::Error::InvalidFlags);
    /// [`FileFlags::READ`] is implied.
    pub fn open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        if flags.contains(FileFlags::WRITE) {
            return Err(Error::InvalidFlags);
        }
        self.base.open_sync(path.as_ref(), flags | FileFlags::READ)
    }

    /// Asynchronous twin of [`open`](Self::open).
    pub async fn async_open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        if flags.contains(FileFlags::WRITE) {
            return Err(Error::InvalidFlags);
        }
        self.base
            .open_async(path.as_ref(), flags | FileFlags::READ)
            .await
    }
}

channel_lifecycle!(SeqReadFile);

impl ReadChannel for SeqReadFile {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.base.read_some(buf)
    }

    async fn async_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.base.async_read_some(buf).await
    }
}

/// A sequential channel that writes to a file.
#[derive(Debug, Default)]
pub struct SeqWriteFile {
    base: FileBase,
}

impl SeqWriteFile {
    /// Creates a channel in the closed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `path` for sequential writing.
    ///
    /// [`FileFlags::READ`] is rejected; [`FileFlags::WRITE`] is implied.
    /// Writable opens must state a disposition: [`FileFlags::CREATE_NEW`],
    /// [`FileFlags::OPEN_EXISTING`], or both for create-or-open.
    pub fn open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        if flags.contains(FileFlags::READ) {
            return Err(Error::InvalidFlags);
        }
        self.base.open_sync(path.as_ref(), flags | FileFlags::WRITE)
    }

    /// Asynchronous twin of [`open`](Self::open).
    pub async fn async_open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        if flags.contains(FileFlags::READ) {
            return Err(Error::InvalidFlags);
        }
        self.base
            .open_async(path.as_ref(), flags | FileFlags::WRITE)
            .await
    }
}

channel_lifecycle!(SeqWriteFile);

impl WriteChannel for SeqWriteFile {
    fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        self.base.write_some(buf)
    }

    async fn async_write_some(&mut self, buf: &[u8]) -> Result<usize> {
        self.base.async_write_some(buf).await
    }
}

/// A sequential channel that reads and writes a file through independent
/// cursors.
#[derive(Debug, Default)]
pub struct SeqFile {
    base: FileBase,
}

impl SeqFile {
    /// Creates a channel in the closed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `path` for reading and writing; both access flags are
    /// implied.
    pub fn open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        self.base
            .open_sync(path.as_ref(), flags | FileFlags::READ | FileFlags::WRITE)
    }

    /// Asynchronous twin of [`open`](Self::open).
    pub async fn async_open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        self.base
            .open_async(path.as_ref(), flags | FileFlags::READ | FileFlags::WRITE)
            .await
    }
}

channel_lifecycle!(SeqFile);

impl ReadChannel for SeqFile {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.base.read_some(buf)
    }

    async fn async_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.base.async_read_some(buf).await
    }
}

impl WriteChannel for SeqFile {
    fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        self.base.write_some(buf)
    }

    async fn async_write_some(&mut self, buf: &[u8]) -> Result<usize> {
        self.base.async_write_some(buf).await
    }
}

/// A direct-access channel that reads a file at explicit offsets.
#[derive(Debug, Default)]
pub struct DirectReadFile {
    base: FileBase,
}

impl DirectReadFile {
    /// Creates a channel in the closed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `path` for direct reading. [`FileFlags::WRITE`] is rejected.
    pub fn open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        if flags.contains(FileFlags::WRITE) {
            return Err(Error::InvalidFlags);
        }
        self.base.open_sync(path.as_ref(), flags | FileFlags::READ)
    }

    /// Asynchronous twin of [`open`](Self::open).
    pub async fn async_open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        if flags.contains(FileFlags::WRITE) {
            return Err(Error::InvalidFlags);
        }
        self.base
            .open_async(path.as_ref(), flags | FileFlags::READ)
            .await
    }
}

channel_lifecycle!(DirectReadFile);

impl ReadAtChannel for DirectReadFile {
    fn read_some_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.base.read_some_at(offset, buf)
    }

    async fn async_read_some_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.base.async_read_some_at(offset, buf).await
    }
}

/// A direct-access channel that writes a file at explicit offsets.
#[derive(Debug, Default)]
pub struct DirectWriteFile {
    base: FileBase,
}

impl DirectWriteFile {
    /// Creates a channel in the closed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `path` for direct writing. [`FileFlags::READ`] is rejected;
    /// a disposition flag is required as for [`SeqWriteFile::open`].
    pub fn open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        if flags.contains(FileFlags::READ) {
            return Err(Error::InvalidFlags);
        }
        self.base.open_sync(path.as_ref(), flags | FileFlags::WRITE)
    }

    /// Asynchronous twin of [`open`](Self::open).
    pub async fn async_open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        if flags.contains(FileFlags::READ) {
            return Err(Error::InvalidFlags);
        }
        self.base
            .open_async(path.as_ref(), flags | FileFlags::WRITE)
            .await
    }
}

channel_lifecycle!(DirectWriteFile);

impl WriteAtChannel for DirectWriteFile {
    fn write_some_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        self.base.write_some_at(offset, buf)
    }

    async fn async_write_some_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        self.base.async_write_some_at(offset, buf).await
    }
}

/// A direct-access channel that reads and writes a file at explicit
/// offsets.
#[derive(Debug, Default)]
pub struct DirectFile {
    base: FileBase,
}

impl DirectFile {
    /// Creates a channel in the closed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `path` for direct reading and writing; both access flags are
    /// implied.
    pub fn open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        self.base
            .open_sync(path.as_ref(), flags | FileFlags::READ | FileFlags::WRITE)
    }

    /// Asynchronous twin of [`open`](Self::open).
    pub async fn async_open(&mut self, path: impl AsRef<Path>, flags: FileFlags) -> Result<()> {
        self.base
            .open_async(path.as_ref(), flags | FileFlags::READ | FileFlags::WRITE)
            .await
    }
}

channel_lifecycle!(DirectFile);

impl ReadAtChannel for DirectFile {
    fn read_some_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.base.read_some_at(offset, buf)
    }

    async fn async_read_some_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.base.async_read_some_at(offset, buf).await
    }
}

impl WriteAtChannel for DirectFile {
    fn write_some_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        self.base.write_some_at(offset, buf)
    }

    async fn async_write_some_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        self.base.async_write_some_at(offset, buf).await
    }
}
