//! Chanio: uniform asynchronous byte-channel I/O over files, sockets, and
//! memory.
//!
//! # Overview
//!
//! Chanio gives every byte-stream endpoint the same statically-typed
//! surface: a channel implements the capability traits it supports
//! (sequential/direct x read/write), each operation has a synchronous and
//! an asynchronous form, and uniform algorithms connect channels to
//! producer/consumer buffers. Asynchronous operations are plain futures
//! driven by a process-wide reactor that multiplexes OS completion and
//! readiness notifications onto a worker pool.
//!
//! # Core guarantees
//!
//! - **Lazy tasks**: a future runs no work until awaited, blocked on, or
//!   detached; awaiting a sub-future resumes it inline without scheduler
//!   involvement or stack growth.
//! - **Positive counts**: every successful `*_some` transfer is at least
//!   one byte; exhausted streams fail with `EndOfFile` instead of
//!   returning zero.
//! - **One owner per handle**: channels exclusively own their native
//!   descriptor and are move-only; close is explicit and surfaces the
//!   final error.
//! - **Backend transparency**: file I/O rides io_uring where the kernel
//!   offers a usable ring and falls back to the worker pool otherwise;
//!   socket I/O is always readiness-driven. Callers cannot tell the
//!   difference.
//!
//! # Module structure
//!
//! - [`error`]: the error taxonomy shared by every operation
//! - [`executor`]: the worker-pool executor running continuations
//! - [`task`]: `block_on` and `detach` entry points
//! - [`reactor`]: the process-wide multiplexer and its async primitives
//! - [`channel`]: capability traits, file/memory/TCP channels, algorithms
//! - [`buffer`]: the producer/consumer buffer contract and `FixedBuffer`
//! - [`net`]: socket addresses and name resolution
//!
//! # Example
//!
//! ```no_run
//! use chanio::channel::{Channel, FileFlags, ReadChannel, SeqReadFile};
//! use chanio::task;
//!
//! fn main() -> chanio::Result<()> {
//!     task::block_on(async {
//!         let mut file = SeqReadFile::new();
//!         file.async_open("/etc/hosts", FileFlags::NONE).await?;
//!
//!         let mut buf = [0u8; 512];
//!         loop {
//!             match file.async_read_some(&mut buf).await {
//!                 Ok(n) => print!("{}", String::from_utf8_lossy(&buf[..n])),
//!                 Err(err) if err.is_eof() => break,
//!                 Err(err) => return Err(err),
//!             }
//!         }
//!         file.async_close().await
//!     })
//! }
//! ```

#![deny(unsafe_code)]
#![allow(async_fn_in_trait)]

pub mod buffer;
pub mod channel;
pub mod error;
pub mod executor;
pub mod net;
pub mod reactor;
pub mod task;

pub use buffer::{FixedBuffer, ReadableBuffer, RingBuffer, WritableBuffer};
pub use channel::{
    Channel, ReadAtChannel, ReadChannel, WriteAtChannel, WriteChannel, UNLIMITED,
};
pub use error::{Error, Result};
pub use reactor::Reactor;
pub use task::{block_on, detach};
