//! Error types for the client and the echo server.
//!
//! Transport-level `std::io::Error`s from send/receive never appear here:
//! the clients absorb them into a state change (and an optional reconnect).
//! What callers see is one of the named conditions below.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by [`TcpClient`](crate::TcpClient) and
/// [`AsyncTcpClient`](crate::AsyncTcpClient).
#[derive(Error, Debug)]
pub enum ClientError {
    /// No connection could be established within the retry window.
    ///
    /// The client is left disconnected; call `connect` again to retry.
    #[error("timeout while connecting to {host}:{port} after {timeout:?}")]
    ConnectTimeout {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Length of the retry window.
        timeout: Duration,
    },

    /// No delimiter was seen within the receive window.
    ///
    /// The partially received bytes stay buffered for the next call.
    #[error("timeout while receiving data after {timeout:?} ({buffered} bytes buffered)")]
    FramingTimeout {
        /// Length of the receive window.
        timeout: Duration,
        /// Bytes held in the pending buffer when the window closed.
        buffered: usize,
    },

    /// An empty delimiter can never be matched.
    #[error("delimiter must not be empty")]
    InvalidDelimiter,
}

impl ClientError {
    /// True for either of the two timeout conditions.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectTimeout { .. } | ClientError::FramingTimeout { .. }
        )
    }
}

/// Errors surfaced by [`EchoServer`](crate::EchoServer).
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listen address did not resolve.
    #[error("invalid listen address '{address}'")]
    InvalidAddress {
        /// Address as configured.
        address: String,
    },

    /// Creating or binding the listening socket failed.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address as configured.
        address: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// `start_server` was called on a server that already started.
    #[error("server already started")]
    AlreadyStarted,

    /// Any other socket, poll or thread spawn failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
