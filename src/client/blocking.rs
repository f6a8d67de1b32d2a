//! Blocking client.

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::{debug, error, trace, warn};

use super::{remaining, DEFAULT_DELIMITER, DEFAULT_RECEIVE_BYTES, DEFAULT_RECEIVE_TIMEOUT};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::framing::DelimiterBuffer;
use crate::transport::{is_read_timeout, Connector, Stream, TcpConnector};

/// A TCP client whose calls block the calling thread.
///
/// The client starts disconnected. After [`connect`](Self::connect) it stays
/// connected until [`close`](Self::close) or a transport error.
pub struct TcpClient<C: Connector = TcpConnector> {
    host: String,
    port: u16,
    config: ClientConfig,
    connector: C,
    stream: Option<C::Stream>,
    buffer: DelimiterBuffer,
}

impl TcpClient<TcpConnector> {
    /// Create a disconnected client with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(host, port, ClientConfig::default())
    }

    /// Create a disconnected client with the given settings.
    pub fn with_config(host: impl Into<String>, port: u16, config: ClientConfig) -> Self {
        Self::with_connector(host, port, config, TcpConnector)
    }
}

impl<C: Connector> TcpClient<C> {
    /// Create a disconnected client that opens its streams through `connector`.
    pub fn with_connector(
        host: impl Into<String>,
        port: u16,
        config: ClientConfig,
        connector: C,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            config,
            connector,
            stream: None,
            buffer: DelimiterBuffer::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn auto_reconnect(&self) -> bool {
        self.config.auto_reconnect
    }

    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        self.config.auto_reconnect = enabled;
    }

    /// Bytes received past the last returned record, earliest first.
    pub fn buffered(&self) -> &[Bytes] {
        self.buffer.chunks()
    }

    /// Try to connect until it succeeds or `timeout` has passed.
    ///
    /// Attempts are spaced by the configured retry interval. Returns
    /// immediately when already connected.
    pub fn connect(&mut self, timeout: Duration) -> ClientResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let start = Instant::now();
        while start.elapsed() < timeout {
            match self.connector.connect(&self.host, self.port) {
                Ok(stream) => {
                    debug!(host = %self.host, port = self.port, "Connected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    error!(
                        host = %self.host,
                        port = self.port,
                        error = %e,
                        "error creating a connection, trying again"
                    );
                    thread::sleep(self.config.retry_interval);
                }
            }
        }

        Err(ClientError::ConnectTimeout {
            host: self.host.clone(),
            port: self.port,
            timeout,
        })
    }

    /// Write all of `data`.
    ///
    /// Does nothing when disconnected. A transport error disconnects the
    /// client and, with auto-reconnect on, reconnects; only a failed
    /// reconnect is reported.
    pub fn send(&mut self, data: &[u8]) -> ClientResult<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        match stream.write_all(data) {
            Ok(()) => {
                trace!(bytes = data.len(), "Sent");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "error send data");
                self.on_transport_error()
            }
        }
    }

    /// Read whatever is available, up to `max_bytes`.
    ///
    /// Returns empty bytes when disconnected, when the peer closed the
    /// stream, or after a transport error (which disconnects the client and
    /// possibly reconnects it).
    pub fn receive(&mut self, max_bytes: usize) -> ClientResult<Bytes> {
        self.read_chunk(max_bytes, None)
    }

    /// Read until `delimiter` and return everything before it.
    ///
    /// Bytes after the delimiter stay buffered and start the next record.
    /// Fails with [`ClientError::FramingTimeout`] when no delimiter arrives
    /// within `timeout`; already received bytes stay buffered in that case.
    ///
    /// [`AsyncTcpClient::receive_until`](super::AsyncTcpClient::receive_until)
    /// runs the same loop.
    pub fn receive_until(
        &mut self,
        max_bytes: usize,
        delimiter: &[u8],
        timeout: Duration,
    ) -> ClientResult<Bytes> {
        if delimiter.is_empty() {
            return Err(ClientError::InvalidDelimiter);
        }

        let start = Instant::now();
        while let Some(left) = remaining(start, timeout) {
            let chunk = self.read_chunk(max_bytes, Some(left))?;
            if chunk.is_empty() {
                break;
            }
            if let Some(record) = self.buffer.push(chunk, delimiter) {
                return Ok(record);
            }
        }

        Err(ClientError::FramingTimeout {
            timeout,
            buffered: self.buffer.len(),
        })
    }

    /// [`receive_until`](Self::receive_until) with a newline delimiter, 4096
    /// byte chunks and a one second window.
    pub fn receive_line(&mut self) -> ClientResult<Bytes> {
        self.receive_until(DEFAULT_RECEIVE_BYTES, DEFAULT_DELIMITER, DEFAULT_RECEIVE_TIMEOUT)
    }

    /// Close the connection if one is open.
    pub fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        if let Err(e) = stream.shutdown() {
            debug!(error = %e, "Shutdown failed");
        }
        debug!(host = %self.host, port = self.port, "Closed");
    }

    /// One read bounded by `limit`. A read that runs out of time yields an
    /// empty chunk and leaves the connection alone.
    fn read_chunk(&mut self, max_bytes: usize, limit: Option<Duration>) -> ClientResult<Bytes> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(Bytes::new());
        };

        let mut buf = BytesMut::zeroed(max_bytes);
        let result = stream
            .set_read_timeout(limit)
            .and_then(|()| stream.read(&mut buf));

        match result {
            Ok(n) => {
                trace!(bytes = n, "Received");
                buf.truncate(n);
                Ok(buf.freeze())
            }
            Err(e) if limit.is_some() && is_read_timeout(&e) => Ok(Bytes::new()),
            Err(e) => {
                error!(error = %e, "error receiving data");
                self.on_transport_error()?;
                Ok(Bytes::new())
            }
        }
    }

    fn on_transport_error(&mut self) -> ClientResult<()> {
        self.stream = None;
        if !self.config.auto_reconnect {
            return Ok(());
        }
        warn!(host = %self.host, port = self.port, "reconnecting ...");
        self.connect(self.config.connect_timeout)
    }
}

impl<C: Connector> std::fmt::Debug for TcpClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.is_connected())
            .field("auto_reconnect", &self.config.auto_reconnect)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
