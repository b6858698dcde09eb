//! io_uring completion backend for file I/O (Linux only, feature-gated).
//!
//! A dedicated completion thread owns the ring: it blocks in
//! `submit_and_wait`, drains completions, and re-submits. Submitting tasks
//! never touch the ring; they append a prepared submission entry to a
//! pending deque (guarded by the submission mutex) and nudge the thread
//! through an eventfd that keeps a poll entry armed at all times. The
//! thread drains the deque into the submission queue after every completion
//! batch, which is also what absorbs submission bursts deeper than the
//! ring: entries wait in the deque until queue slots free up.
//!
//! Shutdown is a NOP entry with null user data; on seeing it the thread
//! fails everything still in the deque with `ECANCELED` and returns.
//!
//! Transfer buffers and path strings are owned by the per-operation record
//! (`OpState`), which stays alive via the user-data reference until the
//! completion is reaped, so a task dropped mid-flight never exposes freed
//! memory to the kernel.
//!
//! NOTE: This module uses unsafe to push SQEs and manage the eventfd. The
//! safety invariants are documented inline.

#![allow(unsafe_code)]

use crate::error::{Error, Result};
use io_uring::{opcode, squeue, types, IoUring, Probe};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ffi::CString;
use std::future::Future;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::JoinHandle;

/// Ring size; submissions beyond this depth queue in the pending deque.
pub(crate) const QUEUE_DEPTH: u32 = 512;

/// User data of the always-armed eventfd poll entry.
const WAKE_USER_DATA: u64 = u64::MAX;

/// User data of the shutdown sentinel.
const SHUTDOWN_USER_DATA: u64 = 0;

/// Offset value that makes READ/WRITE use the file's own cursor
/// (requires the `RW_CUR_POS` ring feature, checked at probe time).
const CURRENT_POSITION: u64 = u64::MAX;

struct OpInner {
    done: bool,
    result: i32,
    waker: Option<Waker>,
    // Owned transfer buffer; the SQE points into it.
    buf: Option<Vec<u8>>,
    // Owned path string for OPENAT; the SQE points into it.
    path: Option<CString>,
}

/// Per-operation completion record shared between the submitting task and
/// the completion thread. The mutex is the happens-before fence between
/// completion and resumption.
struct OpState {
    inner: Mutex<OpInner>,
}

impl OpState {
    fn new(buf: Option<Vec<u8>>, path: Option<CString>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(OpInner {
                done: false,
                result: 0,
                waker: None,
                buf,
                path,
            }),
        })
    }

    fn complete(&self, result: i32) {
        let mut inner = self.inner.lock();
        inner.done = true;
        inner.result = result;
        let waker = inner.waker.take();
        drop(inner);
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// A submission entry waiting for ring space, with its user data kept
/// alongside so shutdown can reclaim the operation reference.
struct PendingEntry {
    entry: squeue::Entry,
    user_data: u64,
}

struct Shared {
    // The submission mutex: guards the deque feeding the ring.
    pending: Mutex<VecDeque<PendingEntry>>,
    wake_fd: OwnedFd,
}

impl Shared {
    fn enqueue(&self, entry: squeue::Entry, user_data: u64) {
        self.pending
            .lock()
            .push_back(PendingEntry { entry, user_data });
        self.notify();
    }

    fn notify(&self) {
        let bytes = 1u64.to_ne_bytes();
        // SAFETY: wake_fd is a valid eventfd owned by this struct. A full
        // counter fails with EAGAIN, which still leaves the fd readable.
        let _ = unsafe {
            libc::write(
                self.wake_fd.as_raw_fd(),
                bytes.as_ptr().cast::<libc::c_void>(),
                bytes.len(),
            )
        };
    }

    fn drain_wake_fd(&self) {
        let mut buf = [0u8; 8];
        loop {
            // SAFETY: wake_fd is a valid nonblocking eventfd.
            let n = unsafe {
                libc::read(
                    self.wake_fd.as_raw_fd(),
                    buf.as_mut_ptr().cast::<libc::c_void>(),
                    buf.len(),
                )
            };
            if n < 0 {
                break;
            }
        }
    }
}

/// io_uring driver: completion thread plus the shared submission deque.
pub(crate) struct UringDriver {
    shared: Arc<Shared>,
    // Held here between probe and start(), then moved into the thread.
    ring: Mutex<Option<IoUring>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl UringDriver {
    /// Probes the kernel and builds a driver, or returns `Ok(None)` when
    /// io_uring is unavailable or missing the features this backend
    /// depends on.
    pub(crate) fn probe() -> io::Result<Option<Self>> {
        let ring = match IoUring::new(QUEUE_DEPTH) {
            Ok(ring) => ring,
            Err(err) if err.kind() == io::ErrorKind::Unsupported => return Ok(None),
            Err(err)
                if matches!(
                    err.raw_os_error(),
                    Some(libc::ENOSYS | libc::EPERM | libc::ENOMEM)
                ) =>
            {
                return Ok(None)
            }
            Err(err) => return Err(err),
        };

        let params = ring.params();
        if !params.is_feature_nodrop() || !params.is_feature_rw_cur_pos() {
            tracing::debug!("io_uring missing NODROP/RW_CUR_POS, falling back");
            return Ok(None);
        }

        let mut probe = Probe::new();
        if ring.submitter().register_probe(&mut probe).is_err() {
            return Ok(None);
        }
        let required = [
            opcode::Nop::CODE,
            opcode::OpenAt::CODE,
            opcode::Close::CODE,
            opcode::Read::CODE,
            opcode::Write::CODE,
        ];
        if required.iter().any(|&code| !probe.is_supported(code)) {
            tracing::debug!("io_uring missing required opcodes, falling back");
            return Ok(None);
        }

        let wake_fd = create_eventfd()?;
        Ok(Some(Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(VecDeque::new()),
                wake_fd,
            }),
            ring: Mutex::new(Some(ring)),
            thread: Mutex::new(None),
        }))
    }

    /// Starts the completion thread.
    pub(crate) fn start(&self) -> io::Result<()> {
        let ring = self
            .ring
            .lock()
            .take()
            .expect("uring driver started twice");
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("chanio-uring".into())
            .spawn(move || completion_loop(ring, &shared))?;
        *self.thread.lock() = Some(handle);
        tracing::debug!(depth = QUEUE_DEPTH, "io_uring backend started");
        Ok(())
    }

    /// Enqueues the shutdown sentinel and joins the completion thread.
    pub(crate) fn stop(&self) {
        self.shared.enqueue(
            opcode::Nop::new().build().user_data(SHUTDOWN_USER_DATA),
            SHUTDOWN_USER_DATA,
        );
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        tracing::debug!("io_uring backend stopped");
    }

    pub(crate) async fn open(&self, path: CString, flags: i32, mode: u32) -> Result<RawFd> {
        let op = OpState::new(None, Some(path));
        let path_ptr = op
            .inner
            .lock()
            .path
            .as_ref()
            .expect("path slot filled above")
            .as_ptr();
        let entry = opcode::OpenAt::new(types::Fd(libc::AT_FDCWD), path_ptr)
            .flags(flags)
            .mode(mode)
            .build();

        let fd = OpFuture::new(&self.shared, op, entry).await?;
        Ok(fd)
    }

    pub(crate) async fn close(&self, fd: RawFd) -> Result<()> {
        let op = OpState::new(None, None);
        let entry = opcode::Close::new(types::Fd(fd)).build();
        OpFuture::new(&self.shared, op, entry).await?;
        Ok(())
    }

    /// Reads up to `len` bytes, returning the filled buffer.
    ///
    /// `offset` of `None` reads at the file's own cursor.
    pub(crate) async fn read(
        &self,
        fd: RawFd,
        len: usize,
        offset: Option<u64>,
    ) -> Result<Vec<u8>> {
        let op = OpState::new(Some(vec![0u8; len]), None);
        let buf_ptr = op
            .inner
            .lock()
            .buf
            .as_mut()
            .expect("buffer slot filled above")
            .as_mut_ptr();
        let entry = opcode::Read::new(types::Fd(fd), buf_ptr, len as u32)
            .offset(offset.unwrap_or(CURRENT_POSITION))
            .build();

        let n = OpFuture::new(&self.shared, Arc::clone(&op), entry).await? as usize;
        let mut buf = op.inner.lock().buf.take().expect("buffer still owned");
        buf.truncate(n);
        Ok(buf)
    }

    /// Writes the owned buffer, returning the number of bytes accepted.
    ///
    /// `offset` of `None` writes at the file's own cursor.
    pub(crate) async fn write(
        &self,
        fd: RawFd,
        data: Vec<u8>,
        offset: Option<u64>,
    ) -> Result<usize> {
        let len = data.len();
        let op = OpState::new(Some(data), None);
        let buf_ptr = op
            .inner
            .lock()
            .buf
            .as_ref()
            .expect("buffer slot filled above")
            .as_ptr();
        let entry = opcode::Write::new(types::Fd(fd), buf_ptr, len as u32)
            .offset(offset.unwrap_or(CURRENT_POSITION))
            .build();

        let n = OpFuture::new(&self.shared, op, entry).await?;
        Ok(n as usize)
    }
}

impl std::fmt::Debug for UringDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UringDriver")
            .field("pending", &self.shared.pending.lock().len())
            .finish_non_exhaustive()
    }
}

/// Reclaims the operation reference handed to the kernel as user data.
///
/// SAFETY: `data` must be a pointer produced by `Arc::into_raw` on an
/// `OpState`, reclaimed exactly once.
unsafe fn from_user_data(data: u64) -> Arc<OpState> {
    unsafe { Arc::from_raw(data as *const OpState) }
}

/// Awaits the completion of one submission entry.
///
/// The entry is not handed to the driver until the first poll, so an
/// unawaited operation submits nothing.
struct OpFuture<'a> {
    shared: &'a Shared,
    op: Arc<OpState>,
    entry: Option<squeue::Entry>,
}

impl<'a> OpFuture<'a> {
    fn new(shared: &'a Shared, op: Arc<OpState>, entry: squeue::Entry) -> Self {
        Self {
            shared,
            op,
            entry: Some(entry),
        }
    }
}

impl Future for OpFuture<'_> {
    type Output = Result<i32>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        {
            let mut inner = self.op.inner.lock();
            if inner.done {
                let res = inner.result;
                return Poll::Ready(if res >= 0 {
                    Ok(res)
                } else if res == -libc::ECANCELED {
                    Err(Error::Cancelled)
                } else {
                    Err(Error::from_raw_os_error(-res))
                });
            }
            inner.waker = Some(cx.waker().clone());
        }
        if let Some(entry) = self.entry.take() {
            // One strong reference travels with the kernel until the
            // completion is reaped.
            let user_data = Arc::into_raw(Arc::clone(&self.op)) as u64;
            self.shared.enqueue(entry.user_data(user_data), user_data);
        }
        Poll::Pending
    }
}

fn completion_loop(mut ring: IoUring, shared: &Shared) {
    arm_wake_poll(&mut ring, shared);

    loop {
        match ring.submit_and_wait(1) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::error!(error = %err, "io_uring submit_and_wait failed");
                return;
            }
        }

        let completions: Vec<(u64, i32)> = ring
            .completion()
            .map(|cqe| (cqe.user_data(), cqe.result()))
            .collect();

        let mut shutdown = false;
        let mut rearm_wake = false;
        for (user_data, result) in &completions {
            match *user_data {
                SHUTDOWN_USER_DATA => shutdown = true,
                WAKE_USER_DATA => {
                    shared.drain_wake_fd();
                    rearm_wake = true;
                }
                data => {
                    // SAFETY: every non-sentinel user data carries exactly
                    // one reference handed over at submission time.
                    let op = unsafe { from_user_data(data) };
                    op.complete(*result);
                }
            }
        }
        tracing::trace!(completions = completions.len(), "completion batch");

        if shutdown {
            fail_pending(shared);
            return;
        }

        if rearm_wake {
            arm_wake_poll(&mut ring, shared);
        }

        // Submit at least once per completion batch, draining whatever the
        // queue has room for.
        drain_pending(&mut ring, shared);
    }
}

fn arm_wake_poll(ring: &mut IoUring, shared: &Shared) {
    let entry = opcode::PollAdd::new(
        types::Fd(shared.wake_fd.as_raw_fd()),
        libc::POLLIN as u32,
    )
    .build()
    .user_data(WAKE_USER_DATA);

    // SAFETY: the poll entry references only the eventfd, which the driver
    // owns for its whole lifetime.
    let pushed = unsafe { ring.submission().push(&entry).is_ok() };
    if !pushed {
        shared.pending.lock().push_front(PendingEntry {
            entry,
            user_data: WAKE_USER_DATA,
        });
    }
    let _ = ring.submit();
}

fn drain_pending(ring: &mut IoUring, shared: &Shared) {
    let mut pending = shared.pending.lock();
    let before = pending.len();
    while let Some(front) = pending.front() {
        // SAFETY: buffers and paths referenced by the entry are owned by
        // the operation's OpState and outlive the submission.
        let pushed = unsafe { ring.submission().push(&front.entry).is_ok() };
        if pushed {
            pending.pop_front();
        } else {
            break;
        }
    }
    if before > 0 {
        tracing::trace!(
            submitted = before - pending.len(),
            queued = pending.len(),
            "drained pending submissions"
        );
    }
    drop(pending);
    let _ = ring.submit();
}

/// Fails every queued-but-unsubmitted operation with `ECANCELED`.
fn fail_pending(shared: &Shared) {
    let drained: Vec<PendingEntry> = shared.pending.lock().drain(..).collect();
    for pending in drained {
        match pending.user_data {
            SHUTDOWN_USER_DATA | WAKE_USER_DATA => {}
            data => {
                // SAFETY: non-sentinel user data carries one reference.
                let op = unsafe { from_user_data(data) };
                op.complete(-libc::ECANCELED);
            }
        }
    }
}

fn create_eventfd() -> io::Result<OwnedFd> {
    // SAFETY: eventfd returns a fresh descriptor that we immediately own.
    let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd is newly created and owned by this function.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
