//! Byte-stream transports used by the clients.
//!
//! The clients never open sockets themselves. They ask a connector for a
//! stream and then only read, write and shut it down:
//!
//! - [`Connector`] / [`Stream`]: blocking, implemented by [`TcpConnector`]
//!   over `std::net::TcpStream`.
//! - [`AsyncConnector`]: suspending, implemented by [`TokioConnector`] over
//!   `tokio::net::TcpStream`. Its streams are plain `AsyncRead + AsyncWrite`.
//!
//! Tests substitute scripted connectors to inject failures.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A connected, blocking byte stream.
pub trait Stream: Read + Write {
    /// Bound subsequent reads. `None` blocks until data or end of stream.
    ///
    /// A read that runs out of time fails with `WouldBlock` or `TimedOut`.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Shut both directions down ahead of dropping the stream.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Stream for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Opens blocking streams to a remote endpoint.
pub trait Connector {
    type Stream: Stream;

    /// Make one connection attempt.
    fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// Plain TCP connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Opens suspending streams to a remote endpoint.
#[async_trait]
pub trait AsyncConnector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Make one connection attempt.
    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// Plain TCP connector for the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioConnector;

#[async_trait]
impl AsyncConnector for TokioConnector {
    type Stream = tokio::net::TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<tokio::net::TcpStream> {
        let stream = tokio::net::TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// True for the error kinds a bounded read reports when it runs out of time.
pub(crate) fn is_read_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
