//! Thin POSIX syscall wrappers used by the reactor backends and the
//! synchronous channel paths.
//!
//! Every wrapper retries `EINTR` and converts failures into
//! [`Error::Os`](crate::Error::Os) carrying the raw errno.

#![allow(unsafe_code)]

use crate::error::{Error, Result};
use std::ffi::CString;
use std::os::fd::RawFd;

fn last_os_error() -> Error {
    Error::Os(std::io::Error::last_os_error())
}

/// `open(2)` with the given flags and mode.
pub(crate) fn open(path: &CString, flags: i32, mode: u32) -> Result<RawFd> {
    loop {
        // SAFETY: path is a valid NUL-terminated string for the duration of
        // the call.
        let fd = unsafe { libc::open(path.as_ptr(), flags, mode as libc::c_uint) };
        if fd >= 0 {
            return Ok(fd);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(Error::Os(err));
        }
    }
}

/// `close(2)`. Not retried on `EINTR`: the descriptor state is unspecified
/// after an interrupted close, so retrying risks closing a reused fd.
pub(crate) fn close(fd: RawFd) -> Result<()> {
    // SAFETY: the caller owns fd and does not use it after this call.
    let ret = unsafe { libc::close(fd) };
    if ret == 0 {
        Ok(())
    } else {
        Err(last_os_error())
    }
}

/// `pread(2)` at the given offset.
pub(crate) fn pread(fd: RawFd, buf: &mut [u8], offset: u64) -> Result<usize> {
    loop {
        // SAFETY: buf is valid writable memory of the given length.
        let n = unsafe {
            libc::pread(
                fd,
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                offset as libc::off_t,
            )
        };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(Error::Os(err));
        }
    }
}

/// `pwrite(2)` at the given offset.
pub(crate) fn pwrite(fd: RawFd, buf: &[u8], offset: u64) -> Result<usize> {
    loop {
        // SAFETY: buf is valid readable memory of the given length.
        let n = unsafe {
            libc::pwrite(
                fd,
                buf.as_ptr().cast::<libc::c_void>(),
                buf.len(),
                offset as libc::off_t,
            )
        };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(Error::Os(err));
        }
    }
}

/// `read(2)` at the file's own cursor.
pub(crate) fn read(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    loop {
        // SAFETY: buf is valid writable memory of the given length.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast::<libc::c_void>(), buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(Error::Os(err));
        }
    }
}

/// `write(2)` at the file's own cursor.
pub(crate) fn write(fd: RawFd, buf: &[u8]) -> Result<usize> {
    loop {
        // SAFETY: buf is valid readable memory of the given length.
        let n = unsafe { libc::write(fd, buf.as_ptr().cast::<libc::c_void>(), buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(Error::Os(err));
        }
    }
}

/// `recv(2)`, returning `WouldBlock` untouched for the readiness loop to
/// interpret.
pub(crate) fn recv(fd: RawFd, buf: &mut [u8], flags: i32) -> std::io::Result<usize> {
    loop {
        // SAFETY: buf is valid writable memory of the given length.
        let n =
            unsafe { libc::recv(fd, buf.as_mut_ptr().cast::<libc::c_void>(), buf.len(), flags) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// `send(2)`. `MSG_NOSIGNAL` is added so a closed peer surfaces as `EPIPE`
/// instead of killing the process.
pub(crate) fn send(fd: RawFd, buf: &[u8], flags: i32) -> std::io::Result<usize> {
    #[cfg(target_os = "linux")]
    let flags = flags | libc::MSG_NOSIGNAL;

    loop {
        // SAFETY: buf is valid readable memory of the given length.
        let n = unsafe { libc::send(fd, buf.as_ptr().cast::<libc::c_void>(), buf.len(), flags) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// `connect(2)` against a prepared socket address.
pub(crate) fn connect(fd: RawFd, addr: &socket2::SockAddr) -> std::io::Result<()> {
    // SAFETY: addr holds a valid sockaddr of the advertised length.
    let ret = unsafe { libc::connect(fd, addr.as_ptr().cast::<libc::sockaddr>(), addr.len()) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// `accept(2)`, returning the accepted descriptor and the peer address.
/// `WouldBlock` is returned untouched for the readiness loop to interpret.
pub(crate) fn accept(fd: RawFd) -> std::io::Result<(RawFd, socket2::SockAddr)> {
    // SAFETY: the closure initialises at most `len` bytes of the sockaddr
    // storage and reports the true length back through `len`.
    let (accepted, addr) = unsafe {
        socket2::SockAddr::try_init(|storage, len| loop {
            let ret = libc::accept(fd, storage.cast::<libc::sockaddr>(), len);
            if ret >= 0 {
                return Ok(ret);
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err);
            }
        })?
    };
    Ok((accepted, addr))
}

/// Reads and clears `SO_ERROR`, reporting the deferred connect result.
pub(crate) fn take_socket_error(fd: RawFd) -> crate::error::Result<Option<std::io::Error>> {
    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: err/len describe a valid c_int out-parameter.
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            std::ptr::addr_of_mut!(err).cast::<libc::c_void>(),
            &mut len,
        )
    };
    if ret != 0 {
        return Err(last_os_error());
    }
    if err == 0 {
        Ok(None)
    } else {
        Ok(Some(std::io::Error::from_raw_os_error(err)))
    }
}

/// Size of the file behind `fd`, via `lseek(2)` to the end.
///
/// The file's own cursor is not used by the channels (they keep explicit
/// positions), so moving it here is harmless.
pub(crate) fn file_size(fd: RawFd) -> Result<u64> {
    // SAFETY: fd is a valid open descriptor.
    let end = unsafe { libc::lseek(fd, 0, libc::SEEK_END) };
    if end < 0 {
        return Err(last_os_error());
    }
    Ok(end as u64)
}

/// Blocks until `fd` is ready in the given direction, via `poll(2)`.
///
/// Used by the synchronous socket paths; the asynchronous paths go through
/// the readiness driver instead.
pub(crate) fn poll_wait(fd: RawFd, write: bool) -> std::io::Result<()> {
    let events = if write { libc::POLLOUT } else { libc::POLLIN };
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    loop {
        // SAFETY: pfd is a valid pollfd for the duration of the call.
        let ret = unsafe { libc::poll(&mut pfd, 1, -1) };
        if ret >= 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}
