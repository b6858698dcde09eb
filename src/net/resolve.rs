//! Asynchronous name resolution on the worker pool.

use crate::error::{Error, Result};
use crate::reactor::Reactor;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// Resolves `host:port` to socket addresses, blocking a worker thread
/// rather than the caller.
pub async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let query = (host.to_owned(), port);
    Reactor::global()
        .unblock(move || {
            let addrs: Vec<SocketAddr> = query.to_socket_addrs().map_err(Error::Os)?.collect();
            Ok(addrs)
        })
        .await
}

/// Resolves `host:port` and returns the first address.
pub async fn resolve_one(host: &str, port: u16) -> Result<SocketAddr> {
    resolve(host, port).await?.into_iter().next().ok_or_else(|| {
        Error::Os(io::Error::new(
            io::ErrorKind::NotFound,
            "name resolved to no addresses",
        ))
    })
}
