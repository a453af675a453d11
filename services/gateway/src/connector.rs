//! Non-blocking outbound TCP connect.
//!
//! `std::net::TcpStream::connect` resolves and connects synchronously, which
//! would block the tick for the lifetime of a TCP handshake. A connect is
//! started on a raw non-blocking socket and polled to completion across
//! ticks instead, the same way the accept and data paths are polled rather
//! than awaited (§5).

use std::io;
use std::net::{SocketAddr, TcpStream};

use socket2::{Domain, Protocol, Socket, Type};

/// Outcome of polling a connect attempt this tick.
pub enum ConnectPoll {
    /// Still in progress; poll again next tick.
    Pending,
    /// The handshake completed; here is the connected stream.
    Connected(TcpStream),
    /// The handshake failed.
    Failed(io::Error),
}

/// Starts a non-blocking connect. Returns immediately; the caller polls the
/// returned socket with [`poll_connect`] on subsequent ticks.
pub fn start_connect(addr: SocketAddr) -> io::Result<Socket> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    match socket.connect(&addr.into()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => return Err(e),
    }
    Ok(socket)
}

/// Checks whether a connect started by [`start_connect`] has completed.
pub fn poll_connect(socket: &Socket) -> ConnectPoll {
    match socket.take_error() {
        Ok(Some(err)) => return ConnectPoll::Failed(err),
        Ok(None) => {}
        Err(err) => return ConnectPoll::Failed(err),
    }
    match socket.peer_addr() {
        Ok(_) => {
            let cloned = match socket.try_clone() {
                Ok(s) => s,
                Err(e) => return ConnectPoll::Failed(e),
            };
            ConnectPoll::Connected(cloned.into())
        }
        Err(e)
            if e.kind() == io::ErrorKind::NotConnected
                || e.kind() == io::ErrorKind::WouldBlock =>
        {
            ConnectPoll::Pending
        }
        Err(e) => ConnectPoll::Failed(e),
    }
}
