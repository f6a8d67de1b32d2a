//! Threaded TCP echo server that records the last message it received.
//!
//! One accept thread polls the listener with mio; every accepted connection
//! gets its own handler thread that echoes each chunk back and publishes it
//! to the [`Recorder`]. Observers read the recorder through
//! [`EchoServer::last_received`].
//!
//! Stopping clears the liveness flag, wakes the accept poll through a mio
//! `Waker` and shuts the accepted sockets down so blocked handlers return
//! at once. Handlers also re-check the flag every poll interval.

mod listener;
mod recorder;

pub use recorder::Recorder;

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::transport::is_read_timeout;

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);

/// Shortest wait a handler may use; zero would disable the read timeout.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Echo server instance
pub struct EchoServer {
    local_addr: SocketAddr,
    /// Bound but not yet handed to the accept thread.
    listener: Option<TcpListener>,
    shared: Arc<Shared>,
    accept_thread: Option<JoinHandle<()>>,
    waker: Option<Waker>,
}

/// State shared between the server handle, the accept thread and the
/// connection handlers.
struct Shared {
    alive: AtomicBool,
    recorder: Arc<Recorder>,
    connections: Mutex<Slab<ConnectionEntry>>,
    receive_bytes: usize,
    poll_interval: Duration,
}

/// An accepted connection as seen by `stop_server`.
struct ConnectionEntry {
    /// Clone of the handler's socket, used to unblock it on stop.
    stream: TcpStream,
    handle: Option<JoinHandle<()>>,
}

impl Shared {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn connections(&self) -> MutexGuard<'_, Slab<ConnectionEntry>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_connection(&self, id: usize) {
        let mut connections = self.connections();
        if connections.contains(id) {
            connections.remove(id);
        }
    }
}

impl EchoServer {
    /// Bind the listening socket. Nothing is accepted before
    /// [`start_server`](Self::start_server).
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let addr = listener::resolve(&config.listen)?;
        let listener =
            listener::bind(addr, config.reuse_address).map_err(|source| ServerError::Bind {
                address: config.listen.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(
            address = %local_addr,
            receive_bytes = config.receive_bytes,
            reuse_address = config.reuse_address,
            "Echo server bound"
        );

        let shared = Shared {
            alive: AtomicBool::new(false),
            recorder: Arc::new(Recorder::new()),
            connections: Mutex::new(Slab::new()),
            receive_bytes: config.receive_bytes.max(1),
            poll_interval: config.poll_interval.max(MIN_POLL_INTERVAL),
        };

        Ok(Self {
            local_addr,
            listener: Some(listener),
            shared: Arc::new(shared),
            accept_thread: None,
            waker: None,
        })
    }

    /// Bind `listen` with default settings.
    pub fn bind(listen: &str) -> ServerResult<Self> {
        Self::new(ServerConfig {
            listen: listen.to_string(),
            ..Default::default()
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True between `start_server` and `stop_server`.
    pub fn is_running(&self) -> bool {
        self.accept_thread.is_some()
    }

    /// Start accepting and echoing connections on a background thread.
    pub fn start_server(&mut self) -> ServerResult<()> {
        let listener = self.listener.take().ok_or(ServerError::AlreadyStarted)?;

        let poll = Poll::new()?;
        poll.registry().register(
            &mut SourceFd(&listener.as_raw_fd()),
            LISTENER_TOKEN,
            Interest::READABLE,
        )?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;

        self.shared.alive.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("echo-accept".to_string())
            .spawn(move || accept_loop(poll, listener, shared))?;

        self.accept_thread = Some(handle);
        self.waker = Some(waker);
        info!(address = %self.local_addr, "Echo server started");
        Ok(())
    }

    /// Stop accepting, close all connections, join every thread and release
    /// the listening socket. Calling it again does nothing.
    pub fn stop_server(&mut self) {
        self.shared.alive.store(false, Ordering::Release);
        let was_bound = self.listener.take().is_some();

        // The waker's fd must outlive the poll it wakes.
        let waker = self.waker.take();
        if let Some(waker) = waker.as_ref() {
            if let Err(e) = waker.wake() {
                warn!(error = %e, "Failed to wake accept loop");
            }
        }

        let was_running = match self.accept_thread.take() {
            Some(handle) => {
                if handle.join().is_err() {
                    error!("Accept thread panicked");
                }
                true
            }
            None => false,
        };
        drop(waker);

        let entries: Vec<ConnectionEntry> = self.shared.connections().drain().collect();
        for entry in entries {
            if let Err(e) = entry.stream.shutdown(Shutdown::Both) {
                debug!(error = %e, "Connection shutdown failed");
            }
            if let Some(handle) = entry.handle {
                if handle.join().is_err() {
                    error!("Connection handler panicked");
                }
            }
        }

        if was_running || was_bound {
            info!(address = %self.local_addr, "Echo server stopped");
        }
    }

    /// Wait for the next recorded message and take it.
    pub fn last_received(&self) -> Bytes {
        self.shared.recorder.take()
    }

    /// Like [`last_received`](Self::last_received) but gives up after
    /// `timeout`.
    pub fn last_received_timeout(&self, timeout: Duration) -> Option<Bytes> {
        self.shared.recorder.take_timeout(timeout)
    }

    /// Take the recorded message if there is one.
    pub fn try_last_received(&self) -> Option<Bytes> {
        self.shared.recorder.try_take()
    }

    /// Record `message` as if it had been received.
    pub fn add(&self, message: Bytes) {
        self.shared.recorder.add(message);
    }

    /// Shared handle to the recorder, for observers on other threads.
    pub fn recorder(&self) -> Arc<Recorder> {
        Arc::clone(&self.shared.recorder)
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.stop_server();
    }
}

impl std::fmt::Debug for EchoServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoServer")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

fn accept_loop(mut poll: Poll, listener: TcpListener, shared: Arc<Shared>) {
    let mut events = Events::with_capacity(64);

    while shared.is_alive() {
        if let Err(e) = poll.poll(&mut events, Some(shared.poll_interval)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            error!(error = %e, "Poll failed, accept loop exiting");
            break;
        }

        for event in events.iter() {
            if event.token() == LISTENER_TOKEN {
                accept_connections(&listener, &shared);
            }
        }
    }

    debug!("Accept loop stopped");
}

fn accept_connections(listener: &TcpListener, shared: &Arc<Shared>) {
    while shared.is_alive() {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = spawn_handler(stream, peer, shared) {
                    warn!(peer = %peer, error = %e, "Failed to start connection handler");
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Accept error: {}", e);
                break;
            }
        }
    }
}

fn spawn_handler(stream: TcpStream, peer: SocketAddr, shared: &Arc<Shared>) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(shared.poll_interval))?;

    let id = shared.connections().insert(ConnectionEntry {
        stream: stream.try_clone()?,
        handle: None,
    });

    let worker = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("echo-conn-{id}"))
        .spawn(move || {
            match handle_connection(stream, &worker) {
                Ok(()) => debug!(conn_id = id, peer = %peer, "Connection closed"),
                Err(e) => debug!(conn_id = id, peer = %peer, error = %e, "Connection error"),
            }
            worker.remove_connection(id);
        });

    match spawned {
        Ok(handle) => {
            // The handler may already have finished and removed itself.
            if let Some(entry) = shared.connections().get_mut(id) {
                entry.handle = Some(handle);
            }
            debug!(conn_id = id, peer = %peer, "Accepted connection");
            Ok(())
        }
        Err(e) => {
            shared.remove_connection(id);
            Err(e)
        }
    }
}

/// Echo every chunk back and record it until the peer leaves or the server
/// stops.
fn handle_connection(mut stream: TcpStream, shared: &Shared) -> io::Result<()> {
    let mut buf = vec![0u8; shared.receive_bytes];

    while shared.is_alive() {
        let n = match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(ref e) if is_read_timeout(e) || e.kind() == io::ErrorKind::Interrupted => {
                continue
            }
            Err(e) => return Err(e),
        };

        // Observers see a chunk no later than its sender does.
        let message = Bytes::copy_from_slice(&buf[..n]);
        shared.recorder.add(message.clone());
        stream.write_all(&message)?;
        trace!(bytes = n, "Echoed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn test_config() -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:0".to_string(),
            receive_bytes: 4096,
            reuse_address: true,
            poll_interval: Duration::from_millis(50),
        }
    }

    fn started(config: ServerConfig) -> EchoServer {
        let mut server = EchoServer::new(config).unwrap();
        server.start_server().unwrap();
        server
    }

    fn echo(stream: &mut TcpStream, message: &[u8]) -> Vec<u8> {
        stream.write_all(message).unwrap();
        let mut echoed = vec![0u8; message.len()];
        stream.read_exact(&mut echoed).unwrap();
        echoed
    }

    #[test]
    fn test_server_creation() {
        let server = EchoServer::new(test_config()).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(!server.is_running());
        assert!(server.try_last_received().is_none());
    }

    #[test]
    fn test_invalid_listen_address() {
        let config = ServerConfig {
            listen: "nowhere".to_string(),
            ..test_config()
        };
        assert!(matches!(
            EchoServer::new(config),
            Err(ServerError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_echo_and_record() {
        let mut server = started(test_config());
        let mut stream = TcpStream::connect(server.local_addr()).unwrap();

        assert_eq!(echo(&mut stream, b"Test message"), b"Test message");
        assert_eq!(server.last_received(), Bytes::from_static(b"Test message"));

        server.stop_server();
    }

    #[test]
    fn test_records_most_recent_chunk() {
        let mut server = started(test_config());
        let mut stream = TcpStream::connect(server.local_addr()).unwrap();

        echo(&mut stream, b"first");
        echo(&mut stream, b"second");
        assert_eq!(server.last_received(), Bytes::from_static(b"second"));
        assert!(server.try_last_received().is_none());

        server.stop_server();
    }

    #[test]
    fn test_chunks_limited_to_receive_bytes() {
        let config = ServerConfig {
            receive_bytes: 4,
            ..test_config()
        };
        let mut server = started(config);
        let mut stream = TcpStream::connect(server.local_addr()).unwrap();

        assert_eq!(echo(&mut stream, b"abcdefgh"), b"abcdefgh");
        let last = server.last_received_timeout(Duration::from_secs(2)).unwrap();
        assert!(last.len() <= 4);

        server.stop_server();
    }

    #[test]
    fn test_multiple_connections() {
        let mut server = started(test_config());
        let mut a = TcpStream::connect(server.local_addr()).unwrap();
        let mut b = TcpStream::connect(server.local_addr()).unwrap();

        assert_eq!(echo(&mut a, b"from a"), b"from a");
        assert_eq!(echo(&mut b, b"from b"), b"from b");
        assert_eq!(server.last_received(), Bytes::from_static(b"from b"));

        server.stop_server();
    }

    #[test]
    fn test_add_overwrites() {
        let server = EchoServer::new(test_config()).unwrap();
        server.add(Bytes::from_static(b"one"));
        server.add(Bytes::from_static(b"two"));
        assert_eq!(server.last_received(), Bytes::from_static(b"two"));
    }

    #[test]
    fn test_start_twice() {
        let mut server = started(test_config());
        assert!(matches!(
            server.start_server(),
            Err(ServerError::AlreadyStarted)
        ));
        server.stop_server();
    }

    #[test]
    fn test_stop_is_prompt_with_idle_connection() {
        let config = ServerConfig {
            poll_interval: Duration::from_secs(5),
            ..test_config()
        };
        let mut server = started(config);
        let mut stream = TcpStream::connect(server.local_addr()).unwrap();
        echo(&mut stream, b"hello");

        let start = Instant::now();
        server.stop_server();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!server.is_running());

        // The handler shut the connection down.
        let mut buf = [0u8; 8];
        assert!(matches!(stream.read(&mut buf), Ok(0) | Err(_)));
    }

    #[test]
    fn test_stop_is_prompt_without_connections() {
        let config = ServerConfig {
            poll_interval: Duration::from_secs(5),
            ..test_config()
        };
        let mut server = started(config);
        thread::sleep(Duration::from_millis(100));

        let start = Instant::now();
        server.stop_server();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!server.is_running());
    }

    #[test]
    fn test_stop_releases_listener() {
        let mut server = started(test_config());
        let addr = server.local_addr();
        server.stop_server();
        server.stop_server();

        let config = ServerConfig {
            listen: addr.to_string(),
            ..test_config()
        };
        let mut again = started(config);
        let mut stream = TcpStream::connect(addr).unwrap();
        assert_eq!(echo(&mut stream, b"again"), b"again");
        again.stop_server();
    }

    #[test]
    fn test_stop_without_start() {
        let mut server = EchoServer::new(test_config()).unwrap();
        server.stop_server();
        assert!(matches!(
            server.start_server(),
            Err(ServerError::AlreadyStarted)
        ));
    }
}
