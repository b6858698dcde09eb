//! Socket addresses and name resolution.
//!
//! Channels only ever observe an address's family and its byte-exact
//! native form; [`Address`] is the `socket2` sockaddr wrapper that carries
//! both. Plain [`std::net::SocketAddr`] values convert into it with
//! `From`, and [`make_address`] parses textual addresses.
//!
//! Name resolution runs the platform resolver on the reactor's worker
//! pool, since `getaddrinfo` has no portable asynchronous form.

mod resolve;

pub use resolve::{resolve, resolve_one};

use crate::error::{Error, Result};
use std::io;
use std::net::{IpAddr, SocketAddr};

/// An opaque socket address: family plus byte-exact native `sockaddr`.
pub type Address = socket2::SockAddr;

/// Parses a textual address.
///
/// Accepts a bare IPv4 or IPv6 literal (port 0) or a full socket form
/// (`1.2.3.4:80`, `[::1]:80`).
pub fn make_address(text: &str) -> Result<Address> {
    if let Ok(ip) = text.parse::<IpAddr>() {
        return Ok(Address::from(SocketAddr::new(ip, 0)));
    }
    text.parse::<SocketAddr>()
        .map(Address::from)
        .map_err(|_| parse_error(text))
}

/// Parses an IP literal and attaches an explicit port.
pub fn make_address_with_port(text: &str, port: u16) -> Result<Address> {
    let ip = text.parse::<IpAddr>().map_err(|_| parse_error(text))?;
    Ok(Address::from(SocketAddr::new(ip, port)))
}

/// The native address family (`AF_INET`, `AF_INET6`, ...).
#[must_use]
pub fn address_family(addr: &Address) -> i32 {
    i32::from(addr.family())
}

/// Formats an address for display: the bare IP when no port is set, the
/// full socket form otherwise.
pub fn address_str(addr: &Address) -> Result<String> {
    let socket = addr.as_socket().ok_or_else(|| {
        Error::Os(io::Error::new(
            io::ErrorKind::InvalidData,
            "non-inet address",
        ))
    })?;
    if socket.port() == 0 {
        Ok(socket.ip().to_string())
    } else {
        Ok(socket.to_string())
    }
}

fn parse_error(text: &str) -> Error {
    Error::Os(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("invalid address: {text}"),
    ))
}
