//! tcp-fixture: a reconnecting TCP client and a recording echo server.
//!
//! Meant for integration tests of code that talks to the network:
//! - [`TcpClient`] / [`AsyncTcpClient`]: connect with retries, send, receive,
//!   and receive delimiter-terminated records with carry-over of the bytes
//!   that follow the delimiter. Transport errors turn into a disconnect and
//!   an optional automatic reconnect instead of surfacing to the caller.
//! - [`EchoServer`]: echoes every chunk back and keeps the most recent one
//!   for the test to inspect.
//!
//! ```no_run
//! use std::time::Duration;
//! use tcp_fixture::{EchoServer, TcpClient};
//!
//! let mut server = EchoServer::bind("127.0.0.1:0")?;
//! server.start_server()?;
//!
//! let mut client = TcpClient::new("127.0.0.1", server.local_addr().port());
//! client.connect(Duration::from_secs(10))?;
//! client.send(b"Test\nmessage")?;
//! assert_eq!(&client.receive_line()?[..], b"Test");
//! assert_eq!(&server.last_received()[..], b"Test\nmessage");
//!
//! client.close();
//! server.stop_server();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod server;
pub mod transport;

pub use client::{AsyncTcpClient, TcpClient};
pub use config::{ClientConfig, ServerConfig};
pub use error::{ClientError, ClientResult, ServerError, ServerResult};
pub use framing::DelimiterBuffer;
pub use server::{EchoServer, Recorder};
