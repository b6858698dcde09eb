//! Submission-pressure scenario: far more simultaneous file operations
//! than the completion backend's queue depth.

use chanio::{block_on, Reactor};
use std::io::Write as _;
use std::os::fd::IntoRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

const TASKS: usize = 1024;
const CHUNK: usize = 4096;

struct Gate {
    done: Mutex<usize>,
    all_done: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            done: Mutex::new(0),
            all_done: Condvar::new(),
        }
    }

    fn arrive(&self) {
        let mut done = self.done.lock().unwrap();
        *done += 1;
        if *done == TASKS {
            self.all_done.notify_all();
        }
    }

    fn wait(&self) {
        let done = self.done.lock().unwrap();
        let (done, timeout) = self
            .all_done
            .wait_timeout_while(done, Duration::from_secs(60), |done| *done < TASKS)
            .unwrap();
        assert!(!timeout.timed_out(), "stalled at {} of {TASKS}", *done);
    }
}

/// 1,024 detached tasks each read 4 KiB from one file at once. The
/// completion ring holds 512 entries; everything beyond that must queue
/// and drain, and none of the reads may fail with a queue-full error.
#[test]
fn thousand_reads_through_a_bounded_queue() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    let contents: Vec<u8> = (0..CHUNK).map(|i| (i % 239) as u8).collect();
    file.write_all(&contents).expect("seed");

    // Keep the descriptor alive for the whole test, independent of the
    // NamedTempFile handle.
    let fd = file
        .reopen()
        .expect("reopen")
        .into_raw_fd();

    let reactor = Reactor::global();
    let gate = Arc::new(Gate::new());
    let failures = Arc::new(AtomicUsize::new(0));

    for _ in 0..TASKS {
        let task_reactor = Arc::clone(&reactor);
        let gate = Arc::clone(&gate);
        let failures = Arc::clone(&failures);
        let expected = contents.clone();
        reactor.detach(async move {
            let mut buf = vec![0u8; CHUNK];
            match task_reactor.async_pread(fd, &mut buf, 0).await {
                Ok(n) if n == CHUNK && buf == expected => {}
                _ => {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
            }
            gate.arrive();
        });
    }

    gate.wait();
    assert_eq!(failures.load(Ordering::SeqCst), 0);

    block_on(async {
        reactor.async_close(fd).await.expect("close");
    });
}
