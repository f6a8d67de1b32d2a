//! Reconnecting TCP clients.
//!
//! Two variants with identical semantics:
//! - [`TcpClient`]: every call blocks the calling thread.
//! - [`AsyncTcpClient`]: every call suspends on the tokio runtime.
//!
//! Both follow the same rules:
//! - `send`/`receive` on a disconnected client do nothing and return empty.
//! - A transport error during `send`/`receive` disconnects the client, then
//!   either reconnects (auto-reconnect on) or is swallowed.
//! - `receive_until` feeds chunks into a [`DelimiterBuffer`] until a
//!   delimiter shows up or its own timeout expires.
//!
//! The `receive_until` loop exists once per variant and the two copies
//! must stay in lockstep: same window via `remaining`, same stop on an
//! empty chunk, same error.
//!
//! [`DelimiterBuffer`]: crate::framing::DelimiterBuffer

mod asynchronous;
mod blocking;

pub use asynchronous::AsyncTcpClient;
pub use blocking::TcpClient;

use std::time::{Duration, Instant};

/// Default chunk size for `receive` and `receive_until`.
pub const DEFAULT_RECEIVE_BYTES: usize = 4096;

/// Default record delimiter.
pub const DEFAULT_DELIMITER: &[u8] = b"\n";

/// Default window for `receive_until`.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Time left in a window opened at `start`, or `None` once it has closed.
///
/// A zero-length window is closed from the start.
fn remaining(start: Instant, timeout: Duration) -> Option<Duration> {
    timeout
        .checked_sub(start.elapsed())
        .filter(|left| !left.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::server::EchoServer;
    use bytes::Bytes;

    #[test]
    fn test_remaining() {
        let start = Instant::now();
        assert!(remaining(start, Duration::ZERO).is_none());
        assert!(remaining(start, Duration::from_secs(60)).is_some());

        let past = Instant::now() - Duration::from_millis(50);
        assert!(remaining(past, Duration::from_millis(10)).is_none());
    }

    #[tokio::test]
    async fn test_variants_frame_identically() {
        let mut server = EchoServer::bind("127.0.0.1:0").unwrap();
        server.start_server().unwrap();
        let port = server.local_addr().port();
        let window = Duration::from_millis(300);

        let mut async_client = AsyncTcpClient::new("127.0.0.1", port);
        async_client.connect(Duration::from_secs(5)).await.unwrap();
        async_client.send(b"one|two|three").await.unwrap();
        let async_first = async_client.receive_until(4096, b"|", window).await.unwrap();
        let async_second = async_client.receive_until(4096, b"|", window).await.unwrap();
        let async_tail = async_client.receive_until(4096, b"|", window).await.unwrap_err();
        async_client.close().await;

        let (blocking_first, blocking_second, blocking_tail) =
            tokio::task::spawn_blocking(move || {
                let mut client = TcpClient::new("127.0.0.1", port);
                client.connect(Duration::from_secs(5)).unwrap();
                client.send(b"one|two|three").unwrap();
                let first = client.receive_until(4096, b"|", window).unwrap();
                let second = client.receive_until(4096, b"|", window).unwrap();
                let tail = client.receive_until(4096, b"|", window).unwrap_err();
                client.close();
                (first, second, tail)
            })
            .await
            .unwrap();

        assert_eq!(async_first, Bytes::from_static(b"one"));
        assert_eq!(async_first, blocking_first);
        assert_eq!(async_second, Bytes::from_static(b"two"));
        assert_eq!(async_second, blocking_second);
        assert_eq!(async_tail.to_string(), blocking_tail.to_string());
        assert!(async_tail.is_timeout());

        server.stop_server();
    }
}
