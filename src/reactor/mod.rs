//! The process-wide I/O multiplexer.
//!
//! The reactor owns three things: a worker-pool [`Executor`] that runs
//! continuations and blocking syscalls, a readiness poller that watches
//! socket-like descriptors, and (on Linux, when the kernel cooperates) an
//! io_uring completion backend for file I/O.
//!
//! # Backend selection
//!
//! | Operation | Backend |
//! |---|---|
//! | file open/close/read/write | io_uring when probed usable, else worker pool |
//! | socket recv/send/connect/accept | readiness poller, always |
//!
//! Socket I/O never goes through the completion ring: ring slots are a
//! bounded resource and a long-lived socket wait parked in the ring would
//! starve file submissions. The readiness poller has no such limit.
//!
//! # Lifecycle
//!
//! Most applications use [`Reactor::global`], a lazily started
//! process-global instance. Applications that want explicit control build
//! their own with [`Reactor::new`] and call [`start`](Reactor::start) /
//! [`stop`](Reactor::stop) themselves.
//!
//! # Ordering
//!
//! Operations on the same descriptor are not serialized here; callers that
//! overlap operations on one descriptor must coordinate. Completion order
//! is OS completion order, which may differ from submission order.

mod blocking;
mod poller;
pub(crate) mod sys;

#[cfg(all(target_os = "linux", feature = "io-uring"))]
mod uring;

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::task;
use poller::Direction;
use socket2::SockAddr;
use std::ffi::CString;
use std::future::Future;
use std::io;
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

#[cfg(all(target_os = "linux", feature = "io-uring"))]
use uring::UringDriver;

/// The submission-queue depth of the completion backend, re-exported for
/// callers sizing concurrent submission bursts.
#[cfg(all(target_os = "linux", feature = "io-uring"))]
pub const COMPLETION_QUEUE_DEPTH: u32 = uring::QUEUE_DEPTH;

static GLOBAL: OnceLock<Arc<Reactor>> = OnceLock::new();

/// Process-wide I/O multiplexer: executor, readiness poller, and optional
/// completion backend.
pub struct Reactor {
    executor: Executor,
    poller: Arc<poller::PollerDriver>,
    #[cfg(all(target_os = "linux", feature = "io-uring"))]
    uring: Option<UringDriver>,
    threads: usize,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Reactor {
    /// Builds a reactor with one worker per hardware thread.
    pub fn new() -> Result<Self> {
        let threads = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        Self::with_threads(threads)
    }

    /// Builds a reactor with an explicit worker count.
    pub fn with_threads(threads: usize) -> Result<Self> {
        #[cfg(all(target_os = "linux", feature = "io-uring"))]
        let uring = match UringDriver::probe() {
            Ok(driver) => {
                if driver.is_none() {
                    tracing::debug!("file I/O will use the worker-pool backend");
                }
                driver
            }
            Err(err) => return Err(Error::Os(err)),
        };

        Ok(Self {
            executor: Executor::new(),
            poller: Arc::new(poller::PollerDriver::new().map_err(Error::Os)?),
            #[cfg(all(target_os = "linux", feature = "io-uring"))]
            uring,
            threads: threads.max(1),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// The process-global reactor, started on first use.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| {
            let reactor = Self::new().expect("failed to build global reactor");
            reactor.start().expect("failed to start global reactor");
            Arc::new(reactor)
        }))
    }

    /// Starts worker threads and the platform drivers. Idempotent.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.executor.start(self.threads);
        self.poller.start().map_err(Error::Os)?;
        #[cfg(all(target_os = "linux", feature = "io-uring"))]
        if let Some(uring) = &self.uring {
            uring.start().map_err(Error::Os)?;
        }
        tracing::debug!(workers = self.threads, "reactor started");
        Ok(())
    }

    /// Shuts the reactor down: the completion backend first (pending
    /// submissions fail with [`Error::Cancelled`]), then the poller thread,
    /// then the worker pool is joined.
    pub fn stop(&self) {
        if !self.started.load(Ordering::Acquire) || self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        #[cfg(all(target_os = "linux", feature = "io-uring"))]
        if let Some(uring) = &self.uring {
            uring.stop();
        }
        self.poller.stop();
        self.executor.stop();
        tracing::debug!("reactor stopped");
    }

    /// The reactor's worker-pool executor.
    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Enqueues a callable onto the worker pool.
    pub fn post<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.executor.post(work);
    }

    /// Schedules a detached task on the worker pool.
    pub fn detach<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        task::detach(&self.executor, future);
    }

    /// Drives a future to completion on the calling thread.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        task::block_on(future)
    }

    /// Runs a blocking closure on the worker pool, resolving with its
    /// result.
    pub fn unblock<T, F>(&self, f: F) -> impl Future<Output = Result<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        blocking::unblock(&self.executor, f)
    }

    /// Registers a socket-like descriptor with the readiness poller.
    ///
    /// Registering a descriptor that is already associated with this
    /// reactor is a no-op.
    pub fn associate(&self, fd: RawFd) -> Result<()> {
        self.poller.associate(fd)
    }

    /// Removes a descriptor from the readiness poller.
    pub fn deassociate(&self, fd: RawFd) {
        self.poller.deassociate(fd);
    }

    /*
     * File primitives. Counts are raw OS semantics; channels layered on
     * top canonicalize zero-length reads into end-of-file.
     */

    /// Opens `path` with raw OS flags and mode, resolving to the new fd.
    pub async fn async_open(&self, path: &Path, flags: i32, mode: u32) -> Result<RawFd> {
        let cpath = path_to_cstring(path)?;

        #[cfg(all(target_os = "linux", feature = "io-uring"))]
        if let Some(uring) = &self.uring {
            return uring.open(cpath, flags, mode).await;
        }

        blocking::unblock(&self.executor, move || sys::open(&cpath, flags, mode)).await
    }

    /// Closes a descriptor, surfacing the final flush error if any.
    pub async fn async_close(&self, fd: RawFd) -> Result<()> {
        #[cfg(all(target_os = "linux", feature = "io-uring"))]
        if let Some(uring) = &self.uring {
            return uring.close(fd).await;
        }

        blocking::unblock(&self.executor, move || sys::close(fd)).await
    }

    /// Reads at the file's own cursor.
    pub async fn async_read(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize> {
        let data = self.file_read(fd, buf.len(), None).await?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Reads at an explicit offset.
    pub async fn async_pread(&self, fd: RawFd, buf: &mut [u8], offset: u64) -> Result<usize> {
        let data = self.file_read(fd, buf.len(), Some(offset)).await?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Writes at the file's own cursor.
    pub async fn async_write(&self, fd: RawFd, buf: &[u8]) -> Result<usize> {
        self.file_write(fd, buf.to_vec(), None).await
    }

    /// Writes at an explicit offset.
    pub async fn async_pwrite(&self, fd: RawFd, buf: &[u8], offset: u64) -> Result<usize> {
        self.file_write(fd, buf.to_vec(), Some(offset)).await
    }

    async fn file_read(&self, fd: RawFd, len: usize, offset: Option<u64>) -> Result<Vec<u8>> {
        #[cfg(all(target_os = "linux", feature = "io-uring"))]
        if let Some(uring) = &self.uring {
            return uring.read(fd, len, offset).await;
        }

        blocking::unblock(&self.executor, move || {
            let mut buf = vec![0u8; len];
            let n = match offset {
                Some(offset) => sys::pread(fd, &mut buf, offset)?,
                None => sys::read(fd, &mut buf)?,
            };
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    async fn file_write(&self, fd: RawFd, data: Vec<u8>, offset: Option<u64>) -> Result<usize> {
        #[cfg(all(target_os = "linux", feature = "io-uring"))]
        if let Some(uring) = &self.uring {
            return uring.write(fd, data, offset).await;
        }

        blocking::unblock(&self.executor, move || match offset {
            Some(offset) => sys::pwrite(fd, &data, offset),
            None => sys::write(fd, &data),
        })
        .await
    }

    /*
     * Socket primitives. Always readiness-driven; the descriptor must be
     * nonblocking and associated with this reactor.
     */

    /// Receives into `buf`, suspending until the socket is readable.
    pub async fn async_recv(&self, fd: RawFd, buf: &mut [u8], flags: i32) -> Result<usize> {
        loop {
            match sys::recv(fd, buf, flags) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.poller.ready(fd, Direction::Read).await?;
                }
                Err(err) => return Err(Error::Os(err)),
            }
        }
    }

    /// Sends from `buf`, suspending until the socket is writable.
    pub async fn async_send(&self, fd: RawFd, buf: &[u8], flags: i32) -> Result<usize> {
        loop {
            match sys::send(fd, buf, flags) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.poller.ready(fd, Direction::Write).await?;
                }
                Err(err) => return Err(Error::Os(err)),
            }
        }
    }

    /// Connects a nonblocking socket, suspending until the handshake
    /// resolves. Success is the unit value.
    pub async fn async_connect(&self, fd: RawFd, addr: &SockAddr) -> Result<()> {
        match sys::connect(fd, addr) {
            Ok(()) => return Ok(()),
            Err(err)
                if matches!(
                    err.raw_os_error(),
                    Some(libc::EINPROGRESS | libc::EALREADY)
                ) => {}
            Err(err) => return Err(Error::Os(err)),
        }

        self.poller.ready(fd, Direction::Write).await?;

        match sys::take_socket_error(fd)? {
            None => Ok(()),
            Some(err) => Err(Error::Os(err)),
        }
    }

    /// Accepts a connection, suspending until one is pending. Resolves to
    /// the accepted descriptor and the peer address.
    pub async fn async_accept(&self, fd: RawFd) -> Result<(RawFd, SockAddr)> {
        loop {
            match sys::accept(fd) {
                Ok(pair) => return Ok(pair),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.poller.ready(fd, Direction::Read).await?;
                }
                Err(err) => return Err(Error::Os(err)),
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("Reactor");
        dbg.field("threads", &self.threads)
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("stopped", &self.stopped.load(Ordering::Relaxed));
        #[cfg(all(target_os = "linux", feature = "io-uring"))]
        dbg.field("completion_backend", &self.uring.is_some());
        dbg.finish_non_exhaustive()
    }
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::Os(io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL")))
}
