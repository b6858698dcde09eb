//! Worker-pool executor used by the reactor to run continuations.
//!
//! The executor is a plain FIFO work queue drained by a configurable number
//! of OS threads. Completion handlers, detached tasks, and blocking file
//! operations all run here; the reactor's platform threads never execute
//! user code themselves, they only enqueue it.
//!
//! Panic isolation: a panicking work item is caught at the worker boundary
//! and logged. Worker threads survive user panics; nothing unwinds into the
//! reactor's completion machinery.

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A unit of work posted to the executor.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// FIFO work queue drained by a pool of worker threads.
///
/// Cloning an `Executor` is cheap and yields a handle to the same queue.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

struct Inner {
    queue: SegQueue<Work>,
    // Guards nothing by itself; pairs with `available` so idle workers can
    // park until new work or shutdown is signalled.
    mutex: Mutex<()>,
    available: Condvar,
    shutdown: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    /// Creates an executor with an empty queue and no threads running.
    ///
    /// Call [`start`](Self::start) before posting work that must make
    /// progress; work posted earlier is retained and drained once threads
    /// come up.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: SegQueue::new(),
                mutex: Mutex::new(()),
                available: Condvar::new(),
                shutdown: AtomicBool::new(false),
                threads: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Starts `count` worker threads draining the queue.
    ///
    /// A count of zero is promoted to one.
    pub fn start(&self, count: usize) {
        let count = count.max(1);
        let mut threads = self.inner.threads.lock();
        for n in 0..count {
            let inner = Arc::clone(&self.inner);
            let handle = thread::Builder::new()
                .name(format!("chanio-worker-{n}"))
                .spawn(move || worker_loop(&inner))
                .expect("failed to spawn worker thread");
            threads.push(handle);
        }
        tracing::debug!(workers = count, "executor started");
    }

    /// Enqueues a callable onto the worker pool.
    ///
    /// Work posted after [`stop`](Self::stop) is silently dropped.
    pub fn post<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        self.inner.queue.push(Box::new(work));
        let _guard = self.inner.mutex.lock();
        self.inner.available.notify_one();
    }

    /// Signals shutdown and joins all worker threads.
    ///
    /// Work already dequeued runs to completion; work still queued when the
    /// workers observe the shutdown flag is dropped unexecuted.
    pub fn stop(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            let _guard = self.inner.mutex.lock();
            self.inner.available.notify_all();
        }
        let handles = std::mem::take(&mut *self.inner.threads.lock());
        for handle in handles {
            let _ = handle.join();
        }
        tracing::debug!("executor stopped");
    }

    /// Number of work items waiting to be picked up.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("pending", &self.inner.queue.len())
            .field("shutdown", &self.inner.shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn worker_loop(inner: &Inner) {
    loop {
        if let Some(work) = inner.queue.pop() {
            if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
                tracing::error!("work item panicked; worker continues");
            }
            continue;
        }

        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }

        let mut guard = inner.mutex.lock();
        // Re-check under the lock so a post() between pop() and lock() is
        // not missed.
        if inner.queue.is_empty() && !inner.shutdown.load(Ordering::Acquire) {
            inner.available.wait(&mut guard);
        }
    }
}
