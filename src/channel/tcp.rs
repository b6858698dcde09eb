//! Connection-oriented TCP byte channel.
//!
//! A `TcpChannel` owns one stream socket. Connecting binds a fresh
//! nonblocking socket to the unspecified address of the peer's family,
//! associates it with the process-global [`Reactor`]'s readiness poller,
//! and then drives the platform's asynchronous connect. All socket I/O is
//! readiness-driven; nothing goes through the completion ring.
//!
//! A zero-byte read means the peer closed the connection and is reported
//! as [`Error::EndOfFile`](crate::Error::EndOfFile) on both the
//! synchronous and asynchronous paths.

use crate::channel::{Channel, ReadChannel, WriteChannel};
use crate::error::{Error, Result};
use crate::reactor::{sys, Reactor};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};

/// A byte channel over one TCP connection.
#[derive(Debug, Default)]
pub struct TcpChannel {
    socket: Option<Socket>,
}

impl TcpChannel {
    /// Creates a channel in the closed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts an already-connected socket (an accepted connection),
    /// making it nonblocking and associating it with the reactor.
    pub fn from_socket(socket: Socket) -> Result<Self> {
        socket.set_nonblocking(true).map_err(Error::Os)?;
        Reactor::global().associate(socket.as_raw_fd())?;
        Ok(Self {
            socket: Some(socket),
        })
    }

    /// Connects to `addr`, suspending until the handshake resolves.
    ///
    /// The channel must be closed; a connected channel fails with
    /// [`Error::AlreadyOpen`](crate::Error::AlreadyOpen).
    pub async fn async_connect(&mut self, addr: SocketAddr) -> Result<()> {
        if self.socket.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let socket = new_stream_socket(addr)?;
        socket.set_nonblocking(true).map_err(Error::Os)?;
        socket
            .bind(&SockAddr::from(unspecified_of(addr)))
            .map_err(Error::Os)?;

        let reactor = Reactor::global();
        let fd = socket.as_raw_fd();
        reactor.associate(fd)?;

        match reactor.async_connect(fd, &SockAddr::from(addr)).await {
            Ok(()) => {
                self.socket = Some(socket);
                Ok(())
            }
            Err(err) => {
                reactor.deassociate(fd);
                Err(err)
            }
        }
    }

    /// Synchronous twin of [`async_connect`](Self::async_connect).
    pub fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        if self.socket.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let socket = new_stream_socket(addr)?;
        socket
            .bind(&SockAddr::from(unspecified_of(addr)))
            .map_err(Error::Os)?;
        socket.connect(&SockAddr::from(addr)).map_err(Error::Os)?;
        socket.set_nonblocking(true).map_err(Error::Os)?;

        Reactor::global().associate(socket.as_raw_fd())?;
        self.socket = Some(socket);
        Ok(())
    }

    /// The peer's address, if connected.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket.as_ref().ok_or(Error::NotOpen)?;
        let addr = socket.peer_addr().map_err(Error::Os)?;
        addr.as_socket().ok_or_else(|| {
            Error::Os(io::Error::new(
                io::ErrorKind::InvalidData,
                "non-inet peer address",
            ))
        })
    }

    fn fd(&self) -> Result<RawFd> {
        self.socket
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(Error::NotOpen)
    }
}

fn new_stream_socket(addr: SocketAddr) -> Result<Socket> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(Error::Os)
}

fn unspecified_of(addr: SocketAddr) -> SocketAddr {
    let ip = match addr {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}

impl Channel for TcpChannel {
    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn close(&mut self) -> Result<()> {
        let socket = self.socket.take().ok_or(Error::NotOpen)?;
        Reactor::global().deassociate(socket.as_raw_fd());
        sys::close(socket.into_raw_fd())
    }

    async fn async_close(&mut self) -> Result<()> {
        let socket = self.socket.take().ok_or(Error::NotOpen)?;
        let reactor = Reactor::global();
        reactor.deassociate(socket.as_raw_fd());
        reactor.async_close(socket.into_raw_fd()).await
    }
}

impl ReadChannel for TcpChannel {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoSpaceInBuffer);
        }
        loop {
            match sys::recv(fd, buf, 0) {
                Ok(0) => return Err(Error::EndOfFile),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    sys::poll_wait(fd, false).map_err(Error::Os)?;
                }
                Err(err) => return Err(Error::Os(err)),
            }
        }
    }

    async fn async_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoSpaceInBuffer);
        }
        let n = Reactor::global().async_recv(fd, buf, 0).await?;
        if n == 0 {
            return Err(Error::EndOfFile);
        }
        Ok(n)
    }
}

impl WriteChannel for TcpChannel {
    fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoDataInBuffer);
        }
        loop {
            match sys::send(fd, buf, 0) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    sys::poll_wait(fd, true).map_err(Error::Os)?;
                }
                Err(err) => return Err(Error::Os(err)),
            }
        }
    }

    async fn async_write_some(&mut self, buf: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        if buf.is_empty() {
            return Err(Error::NoDataInBuffer);
        }
        Reactor::global().async_send(fd, buf, 0).await
    }
}
