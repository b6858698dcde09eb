//! TCP channel scenarios: echo round trips and reactor-driven accept.

use chanio::channel::{Channel, ReadChannel, TcpChannel, WriteChannel};
use chanio::{block_on, Reactor};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{Read as _, Write as _};
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, FromRawFd};

/// Client writes N bytes, the peer echoes them, client reads N bytes:
/// bytes received equal bytes sent, then the closed peer yields
/// end-of-file.
#[test]
fn echo_bytes_survive_round_trip() {
    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i * 31 % 255) as u8).collect();

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let expected = payload.len();
    let peer = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut echoed = 0;
        let mut buf = [0u8; 8192];
        while echoed < expected {
            let n = stream.read(&mut buf).expect("peer read");
            stream.write_all(&buf[..n]).expect("peer echo");
            echoed += n;
        }
    });

    block_on(async {
        let mut channel = TcpChannel::new();
        channel.async_connect(addr).await.expect("connect");

        let mut sent = 0;
        while sent < payload.len() {
            sent += channel
                .async_write_some(&payload[sent..])
                .await
                .expect("write");
        }

        let mut received = Vec::with_capacity(payload.len());
        let mut buf = [0u8; 8192];
        while received.len() < payload.len() {
            let n = channel.async_read_some(&mut buf).await.expect("read");
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, payload);

        let err = channel
            .async_read_some(&mut buf)
            .await
            .expect_err("peer closed");
        assert!(err.is_eof());

        channel.async_close().await.expect("close");
    });

    peer.join().expect("peer join");
}

/// The server side built from the reactor's accept primitive and
/// `TcpChannel::from_socket`.
#[test]
fn reactor_accept_serves_a_channel_client() {
    let listener = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).expect("socket");
    listener
        .bind(&"127.0.0.1:0".parse::<SocketAddr>().unwrap().into())
        .expect("bind");
    listener.listen(8).expect("listen");
    listener.set_nonblocking(true).expect("nonblocking");

    let addr = listener
        .local_addr()
        .expect("local addr")
        .as_socket()
        .expect("inet addr");

    let reactor = Reactor::global();
    reactor
        .associate(listener.as_raw_fd())
        .expect("associate listener");

    // Client runs on its own thread with plain std sockets.
    let client = std::thread::spawn(move || {
        let mut stream = std::net::TcpStream::connect(addr).expect("connect");
        stream.write_all(b"ping").expect("send");
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).expect("recv");
        assert_eq!(&buf, b"pong");
    });

    block_on(async {
        let (fd, peer_addr) = reactor
            .async_accept(listener.as_raw_fd())
            .await
            .expect("accept");
        assert!(peer_addr.as_socket().is_some());

        // SAFETY: fd was just accepted on our behalf and is owned from
        // here on.
        let socket = unsafe { Socket::from_raw_fd(fd) };
        let mut channel = TcpChannel::from_socket(socket).expect("adopt");

        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < 4 {
            filled += channel.async_read_some(&mut buf[filled..]).await.expect("read");
        }
        assert_eq!(&buf, b"ping");

        let mut sent = 0;
        while sent < 4 {
            sent += channel.async_write_some(&b"pong"[sent..]).await.expect("write");
        }

        channel.async_close().await.expect("close");
    });

    client.join().expect("client join");
    reactor.deassociate(listener.as_raw_fd());
    drop(listener);
}

/// Sync and async paths interoperate on one connection.
#[test]
fn sync_write_async_read() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let peer = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).expect("peer read");
        assert_eq!(&buf, b"mixed");
        stream.write_all(b"paths").expect("peer write");
    });

    let mut channel = TcpChannel::new();
    channel.connect(addr).expect("connect");

    let mut sent = 0;
    while sent < 5 {
        sent += channel.write_some(&b"mixed"[sent..]).expect("write");
    }

    block_on(async {
        let mut buf = [0u8; 5];
        let mut filled = 0;
        while filled < 5 {
            filled += channel.async_read_some(&mut buf[filled..]).await.expect("read");
        }
        assert_eq!(&buf, b"paths");
    });

    channel.close().expect("close");
    peer.join().expect("peer join");
}
