//! Async client for the tokio runtime.
//!
//! Mirrors [`TcpClient`](super::TcpClient) call for call; only the waiting
//! differs. Reads in `receive_until` are bounded with `tokio::time::timeout`
//! so other tasks keep running while this one waits.

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, trace, warn};

use super::{remaining, DEFAULT_DELIMITER, DEFAULT_RECEIVE_BYTES, DEFAULT_RECEIVE_TIMEOUT};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::framing::DelimiterBuffer;
use crate::transport::{AsyncConnector, TokioConnector};

/// A TCP client whose calls suspend instead of blocking.
pub struct AsyncTcpClient<C: AsyncConnector = TokioConnector> {
    host: String,
    port: u16,
    config: ClientConfig,
    connector: C,
    stream: Option<C::Stream>,
    buffer: DelimiterBuffer,
}

impl AsyncTcpClient<TokioConnector> {
    /// Create a disconnected client with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(host, port, ClientConfig::default())
    }

    /// Create a disconnected client with the given settings.
    pub fn with_config(host: impl Into<String>, port: u16, config: ClientConfig) -> Self {
        Self::with_connector(host, port, config, TokioConnector)
    }
}

impl<C: AsyncConnector> AsyncTcpClient<C> {
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
    pub async fn connect(&mut self, timeout: Duration) -> ClientResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let start = Instant::now();
        while start.elapsed() < timeout {
            match self.connector.connect(&self.host, self.port).await {
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
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }

        Err(ClientError::ConnectTimeout {
            host: self.host.clone(),
            port: self.port,
            timeout,
        })
    }

    /// Write all of `data`. Same failure policy as the blocking client.
    pub async fn send(&mut self, data: &[u8]) -> ClientResult<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        match stream.write_all(data).await {
            Ok(()) => {
                trace!(bytes = data.len(), "Sent");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "error send data");
                self.on_transport_error().await
            }
        }
    }

    /// Read whatever is available, up to `max_bytes`.
    pub async fn receive(&mut self, max_bytes: usize) -> ClientResult<Bytes> {
        self.read_chunk(max_bytes, None).await
    }

    /// Read until `delimiter` and return everything before it.
    ///
    /// See [`TcpClient::receive_until`](super::TcpClient::receive_until); the
    /// two loops are kept identical.
    pub async fn receive_until(
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
            let chunk = self.read_chunk(max_bytes, Some(left)).await?;
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

    /// `receive_until` with a newline delimiter, 4096 byte chunks and a one
    /// second window.
    pub async fn receive_line(&mut self) -> ClientResult<Bytes> {
        self.receive_until(DEFAULT_RECEIVE_BYTES, DEFAULT_DELIMITER, DEFAULT_RECEIVE_TIMEOUT)
            .await
    }

    /// Close the connection if one is open.
    pub async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "Shutdown failed");
        }
        debug!(host = %self.host, port = self.port, "Closed");
    }

    async fn read_chunk(
        &mut self,
        max_bytes: usize,
        limit: Option<Duration>,
    ) -> ClientResult<Bytes> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(Bytes::new());
        };

        let mut buf = BytesMut::zeroed(max_bytes);
        let result = match limit {
            Some(limit) => match tokio::time::timeout(limit, stream.read(&mut buf)).await {
                Ok(result) => result,
                Err(_) => return Ok(Bytes::new()),
            },
            None => stream.read(&mut buf).await,
        };

        match result {
            Ok(n) => {
                trace!(bytes = n, "Received");
                buf.truncate(n);
                Ok(buf.freeze())
            }
            Err(e) => {
                error!(error = %e, "error receiving data");
                self.on_transport_error().await?;
                Ok(Bytes::new())
            }
        }
    }

    async fn on_transport_error(&mut self) -> ClientResult<()> {
        self.stream = None;
        if !self.config.auto_reconnect {
            return Ok(());
        }
        warn!(host = %self.host, port = self.port, "reconnecting ...");
        self.connect(self.config.connect_timeout).await
    }
}

impl<C: AsyncConnector> std::fmt::Debug for AsyncTcpClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTcpClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.is_connected())
            .field("auto_reconnect", &self.config.auto_reconnect)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
