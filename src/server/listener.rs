//! Listening socket setup.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use crate::error::{ServerError, ServerResult};

/// Resolve a `host:port` listen address to the first socket address.
pub(crate) fn resolve(listen: &str) -> ServerResult<SocketAddr> {
    listen
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ServerError::InvalidAddress {
            address: listen.to_string(),
        })
}

/// Bind a non-blocking listener, optionally with SO_REUSEADDR.
pub(crate) fn bind(addr: SocketAddr, reuse_address: bool) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(reuse_address)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;

    Ok(socket.into())
}
