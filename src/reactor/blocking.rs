//! Worker-pool dispatcher for blocking file syscalls.
//!
//! On platforms (or kernels) without a usable completion port, file I/O is
//! executed by posting the blocking syscall onto the reactor's worker pool.
//! The calling task suspends; when the syscall returns, the worker fills
//! the shared slot and wakes the task.
//!
//! The closure owns everything it touches (paths, transfer buffers), so a
//! task dropped mid-operation leaves nothing dangling: the worker simply
//! completes into a slot nobody reads.

use crate::error::Result;
use crate::executor::Executor;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

struct Slot<T> {
    result: Option<Result<T>>,
    waker: Option<Waker>,
}

/// Future resolving to the return value of a closure run on the worker pool.
pub(crate) struct Unblock<T> {
    slot: Arc<Mutex<Slot<T>>>,
    submit: Option<Box<dyn FnOnce() + Send + 'static>>,
}

/// Runs `f` on the executor and resolves with its result.
///
/// The closure is not dispatched until the future is first polled; an
/// unawaited operation performs no work.
pub(crate) fn unblock<T, F>(executor: &Executor, f: F) -> Unblock<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Slot {
        result: None,
        waker: None,
    }));

    let executor = executor.clone();
    let work_slot = Arc::clone(&slot);
    let submit = Box::new(move || {
        executor.post(move || {
            let result = f();
            let mut guard = work_slot.lock();
            guard.result = Some(result);
            if let Some(waker) = guard.waker.take() {
                drop(guard);
                waker.wake();
            }
        });
    });

    Unblock {
        slot,
        submit: Some(submit),
    }
}

impl<T> Future for Unblock<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        {
            let mut slot = self.slot.lock();
            if let Some(result) = slot.result.take() {
                return Poll::Ready(result);
            }
            slot.waker = Some(cx.waker().clone());
        }
        if let Some(submit) = self.submit.take() {
            submit();
        }
        Poll::Pending
    }
}
