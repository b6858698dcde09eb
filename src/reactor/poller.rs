//! Readiness driver for socket-like file descriptors.
//!
//! Wraps the `polling` crate (epoll on Linux, kqueue on the BSDs, IOCP on
//! Windows) behind an fd-keyed registration table. A dedicated event thread
//! blocks in `Poller::wait` and wakes the tasks whose descriptors became
//! ready; the tasks then retry their non-blocking syscall.
//!
//! Registrations are one-shot: delivery disarms the descriptor and the next
//! [`PollerDriver::ready`] call re-arms it. One waker slot is kept per
//! direction per descriptor; callers serialize concurrent operations on the
//! same descriptor themselves.

#![allow(unsafe_code)]

use crate::error::{Error, Result};
use parking_lot::Mutex;
use polling::{Event as PollEvent, Events, Poller};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::JoinHandle;

/// Direction of interest for a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Read,
    Write,
}

struct Entry {
    fd: RawFd,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

#[derive(Default)]
struct Sources {
    by_fd: HashMap<RawFd, usize>,
    by_token: HashMap<usize, Entry>,
    next_token: usize,
}

/// Readiness poller plus its registration table and event thread.
pub(crate) struct PollerDriver {
    poller: Arc<Poller>,
    sources: Mutex<Sources>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PollerDriver {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            poller: Arc::new(Poller::new()?),
            sources: Mutex::new(Sources::default()),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        })
    }

    /// Starts the event thread.
    pub(crate) fn start(self: &Arc<Self>) -> io::Result<()> {
        self.running.store(true, Ordering::Release);
        let driver = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("chanio-poller".into())
            .spawn(move || driver.event_loop())?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Stops the event thread and joins it.
    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.poller.notify();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Registers `fd` with the poller, initially with no interest.
    ///
    /// Registering an fd that is already associated with this driver is a
    /// no-op.
    pub(crate) fn associate(&self, fd: RawFd) -> Result<()> {
        let mut sources = self.sources.lock();
        if sources.by_fd.contains_key(&fd) {
            return Ok(());
        }

        let token = sources.next_token;
        sources.next_token += 1;

        // SAFETY: the fd stays registered only while its owning channel is
        // open; close() deassociates before releasing the descriptor.
        unsafe {
            self.poller.add(fd, PollEvent::none(token))?;
        }

        sources.by_fd.insert(fd, token);
        sources.by_token.insert(
            token,
            Entry {
                fd,
                read_waker: None,
                write_waker: None,
            },
        );
        Ok(())
    }

    /// Removes `fd` from the poller. Unknown descriptors are ignored.
    pub(crate) fn deassociate(&self, fd: RawFd) {
        let mut sources = self.sources.lock();
        if let Some(token) = sources.by_fd.remove(&fd) {
            sources.by_token.remove(&token);
            // SAFETY: fd is still open here; callers deassociate before close.
            let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
            let _ = self.poller.delete(borrowed);
        }
    }

    /// Returns a future that resolves once `fd` is ready in `direction`.
    pub(crate) fn ready(&self, fd: RawFd, direction: Direction) -> ReadyFuture<'_> {
        ReadyFuture {
            driver: self,
            fd,
            direction,
            armed: false,
        }
    }

    fn arm(&self, fd: RawFd, direction: Direction, waker: Waker) -> Result<()> {
        let mut sources = self.sources.lock();
        let Some(&token) = sources.by_fd.get(&fd) else {
            // The channel was closed while the operation was in flight.
            return Err(Error::NotOpen);
        };
        let entry = sources
            .by_token
            .get_mut(&token)
            .expect("token table out of sync");

        match direction {
            Direction::Read => entry.read_waker = Some(waker),
            Direction::Write => entry.write_waker = Some(waker),
        }

        let mut event = PollEvent::none(token);
        event.readable = entry.read_waker.is_some();
        event.writable = entry.write_waker.is_some();

        // SAFETY: fd is alive; it is still present in the registration table.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        self.poller.modify(borrowed, event)?;
        Ok(())
    }

    fn event_loop(&self) {
        let mut events = Events::new();
        loop {
            events.clear();
            match self.poller.wait(&mut events, None) {
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::error!(error = %err, "poller wait failed");
                    return;
                }
            }

            if !self.running.load(Ordering::Acquire) {
                return;
            }

            let mut wakers = Vec::new();
            {
                let mut sources = self.sources.lock();
                for event in events.iter() {
                    let Some(entry) = sources.by_token.get_mut(&event.key) else {
                        continue;
                    };
                    // Errors and hangups surface as readiness in both
                    // directions so the retried syscall reports them.
                    if event.readable {
                        wakers.extend(entry.read_waker.take());
                    }
                    if event.writable {
                        wakers.extend(entry.write_waker.take());
                    }
                    // One-shot delivery disarmed the whole registration;
                    // a waiter parked in the other direction must be
                    // re-armed or its wakeup is lost.
                    if entry.read_waker.is_some() || entry.write_waker.is_some() {
                        let mut interest = PollEvent::none(event.key);
                        interest.readable = entry.read_waker.is_some();
                        interest.writable = entry.write_waker.is_some();
                        // SAFETY: fd is alive while present in the table.
                        let borrowed = unsafe { BorrowedFd::borrow_raw(entry.fd) };
                        if let Err(err) = self.poller.modify(borrowed, interest) {
                            tracing::warn!(error = %err, "re-arm failed");
                        }
                    }
                }
            }
            for waker in wakers {
                waker.wake();
            }
        }
    }
}

impl std::fmt::Debug for PollerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerDriver")
            .field("registrations", &self.sources.lock().by_fd.len())
            .finish_non_exhaustive()
    }
}

/// Future returned by [`PollerDriver::ready`].
///
/// The first poll arms the registration and suspends; any later poll means
/// the waker fired (or the caller re-polled spuriously) and resolves, after
/// which the caller retries its syscall and re-arms on `WouldBlock`.
pub(crate) struct ReadyFuture<'a> {
    driver: &'a PollerDriver,
    fd: RawFd,
    direction: Direction,
    armed: bool,
}

impl Future for ReadyFuture<'_> {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.armed {
            return Poll::Ready(Ok(()));
        }
        self.driver
            .arm(self.fd, self.direction, cx.waker().clone())?;
        self.armed = true;
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn driver() -> Arc<PollerDriver> {
        let driver = Arc::new(PollerDriver::new().expect("create poller"));
        driver.start().expect("start poller");
        driver
    }

    #[test]
    fn associate_is_idempotent() {
        let driver = driver();
        let (a, _b) = UnixStream::pair().expect("socketpair");
        driver.associate(a.as_raw_fd()).expect("first associate");
        driver.associate(a.as_raw_fd()).expect("second associate");
        driver.deassociate(a.as_raw_fd());
        driver.stop();
    }

    #[test]
    fn ready_on_unassociated_fd_fails_not_open() {
        let driver = driver();
        let (a, _b) = UnixStream::pair().expect("socketpair");
        let err = crate::task::block_on(driver.ready(a.as_raw_fd(), Direction::Read))
            .expect_err("must fail");
        assert!(matches!(err, Error::NotOpen));
        driver.stop();
    }

    #[test]
    fn readable_wakes_when_peer_writes() {
        let driver = driver();
        let (a, mut b) = UnixStream::pair().expect("socketpair");
        a.set_nonblocking(true).expect("nonblocking");
        driver.associate(a.as_raw_fd()).expect("associate");

        let fd = a.as_raw_fd();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            b.write_all(b"x").expect("peer write");
            b
        });

        crate::task::block_on(driver.ready(fd, Direction::Read)).expect("readable");

        let _b = writer.join().expect("writer join");
        driver.deassociate(fd);
        driver.stop();
    }

    #[test]
    fn writable_is_immediate_on_fresh_socket() {
        let driver = driver();
        let (a, _b) = UnixStream::pair().expect("socketpair");
        a.set_nonblocking(true).expect("nonblocking");
        driver.associate(a.as_raw_fd()).expect("associate");

        crate::task::block_on(driver.ready(a.as_raw_fd(), Direction::Write))
            .expect("writable");

        driver.deassociate(a.as_raw_fd());
        driver.stop();
    }

    #[test]
    fn stop_terminates_event_thread() {
        let driver = driver();
        driver.stop();
        assert!(driver.thread.lock().is_none());
    }
}
