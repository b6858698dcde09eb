//! Task execution primitives: `block_on` and `detach`.
//!
//! A task in this crate is any `Future`: it is created suspended, runs no
//! work until polled, and awaiting a sub-future resumes it inline as part
//! of the parent's state machine. The two entry points here cover the two
//! ways a top-level task is started:
//!
//! - [`block_on`] drives a future on the calling thread, parking between
//!   wakes, and returns its output. This is the synchronous-wait start.
//! - [`detach`] hands a future to an [`Executor`] and returns immediately.
//!   The task drives itself: each wake re-posts a poll of the task onto
//!   the executor, and the frame is dropped when the future completes.
//!
//! A detached task's panic is caught by the executor's worker boundary and
//! logged; it never unwinds into reactor threads. `block_on` propagates
//! panics to the caller, as a synchronous call would.

use crate::executor::Executor;
use parking_lot::{Condvar, Mutex};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

/// Drives `future` to completion on the current thread.
///
/// The thread parks while the future is pending and is unparked by the
/// future's waker, which may fire from any reactor or worker thread.
pub fn block_on<F: Future>(future: F) -> F::Output {
    let parker = Arc::new(Parker::default());
    let waker = Waker::from(Arc::clone(&parker));
    let mut cx = Context::from_waker(&waker);

    let mut future = std::pin::pin!(future);
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(output) => return output,
            Poll::Pending => parker.park(),
        }
    }
}

/// Schedules `future` on `executor` and returns immediately.
///
/// The result is discarded; the task frame frees itself once the future
/// completes. Use [`block_on`] when the output matters.
pub fn detach<F>(executor: &Executor, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = Arc::new(DetachedTask {
        future: Mutex::new(Some(Box::pin(future))),
        executor: executor.clone(),
        scheduled: AtomicBool::new(true),
    });
    schedule(task);
}

#[derive(Default)]
struct Parker {
    woken: Mutex<bool>,
    unparked: Condvar,
}

impl Parker {
    fn park(&self) {
        let mut woken = self.woken.lock();
        while !*woken {
            self.unparked.wait(&mut woken);
        }
        *woken = false;
    }
}

impl Wake for Parker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let mut woken = self.woken.lock();
        *woken = true;
        self.unparked.notify_one();
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct DetachedTask {
    // None once the future has completed; the frame is freed right there.
    future: Mutex<Option<BoxFuture>>,
    executor: Executor,
    // Collapses redundant wakes into a single queued poll.
    scheduled: AtomicBool,
}

impl DetachedTask {
    fn run(self: &Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);

        let mut slot = self.future.lock();
        let Some(future) = slot.as_mut() else {
            return;
        };

        let waker = Waker::from(Arc::clone(self));
        let mut cx = Context::from_waker(&waker);
        if future.as_mut().poll(&mut cx).is_ready() {
            *slot = None;
        }
    }
}

impl Wake for DetachedTask {
    fn wake(self: Arc<Self>) {
        if !self.scheduled.swap(true, Ordering::AcqRel) {
            schedule(self);
        }
    }

    fn wake_by_ref(self: &Arc<Self>) {
        Arc::clone(self).wake();
    }
}

fn schedule(task: Arc<DetachedTask>) {
    let executor = task.executor.clone();
    executor.post(move || task.run());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::poll_fn;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn wait_for<F: Fn() -> bool>(cond: F) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(std::time::Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn block_on_ready_future() {
        assert_eq!(block_on(async { 7 }), 7);
    }

    #[test]
    fn block_on_parks_until_woken() {
        let mut polls = 0;
        let value = block_on(poll_fn(move |cx| {
            polls += 1;
            if polls < 3 {
                // Wake from another thread after a delay so the caller
                // actually parks in between.
                let waker = cx.waker().clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(10));
                    waker.wake();
                });
                Poll::Pending
            } else {
                Poll::Ready(polls)
            }
        }));
        assert_eq!(value, 3);
    }

    #[test]
    fn future_is_lazy_until_started() {
        let effect = Arc::new(AtomicUsize::new(0));
        let task = {
            let effect = Arc::clone(&effect);
            async move {
                effect.fetch_add(1, Ordering::SeqCst);
            }
        };

        // Constructing the future runs nothing.
        thread::sleep(Duration::from_millis(10));
        assert_eq!(effect.load(Ordering::SeqCst), 0);

        block_on(task);
        assert_eq!(effect.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_runs_to_completion() {
        let executor = Executor::new();
        executor.start(2);

        let effect = Arc::new(AtomicUsize::new(0));
        {
            let effect = Arc::clone(&effect);
            detach(&executor, async move {
                effect.fetch_add(1, Ordering::SeqCst);
            });
        }

        wait_for(|| effect.load(Ordering::SeqCst) == 1);
        executor.stop();
    }

    #[test]
    fn detached_task_survives_suspension() {
        let executor = Executor::new();
        executor.start(2);

        let effect = Arc::new(AtomicUsize::new(0));
        {
            let effect = Arc::clone(&effect);
            detach(&executor, async move {
                // Suspend once, resumed by a foreign thread.
                let mut suspended = false;
                poll_fn(|cx| {
                    if suspended {
                        Poll::Ready(())
                    } else {
                        suspended = true;
                        let waker = cx.waker().clone();
                        thread::spawn(move || {
                            thread::sleep(Duration::from_millis(5));
                            waker.wake();
                        });
                        Poll::Pending
                    }
                })
                .await;
                effect.fetch_add(1, Ordering::SeqCst);
            });
        }

        wait_for(|| effect.load(Ordering::SeqCst) == 1);
        executor.stop();
    }

    #[test]
    fn nested_awaits_complete_inline() {
        async fn inner(depth: usize) -> usize {
            if depth == 0 {
                0
            } else {
                Box::pin(inner(depth - 1)).await + 1
            }
        }
        // Deep await chains complete without any scheduler involvement.
        assert_eq!(block_on(inner(512)), 512);
    }
}
