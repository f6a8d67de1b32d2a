//! tcp-fixture: recording echo server and reconnecting client
//!
//! Subcommands:
//! - `serve`: run the echo server until Ctrl-C, logging every recorded chunk
//! - `send`: connect, send one message and print the echo (or the first
//!   delimited record of it)
//!
//! Configuration via CLI arguments or TOML file.

mod cli;

use bytes::Bytes;
use clap::Parser;
use cli::{CliArgs, Command, Settings};
use std::sync::Arc;
use std::time::Duration;
use tcp_fixture::client::DEFAULT_RECEIVE_BYTES;
use tcp_fixture::{AsyncTcpClient, ClientConfig, ClientResult, EchoServer, Recorder, TcpClient};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();
    let settings = Settings::load(&cli)?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Command::Serve { .. } => serve(settings),
        Command::Send {
            message,
            address,
            delimiter,
            timeout_ms,
            use_async,
        } => {
            let address = address.unwrap_or_else(|| settings.server.listen.clone());
            let (host, port) = cli::split_address(&address)
                .ok_or_else(|| format!("invalid address '{address}'"))?;
            let request = Request {
                host,
                port,
                message: message.into_bytes(),
                delimiter: delimiter.map(|d| cli::unescape(&d)),
                timeout: Duration::from_millis(timeout_ms),
            };

            let reply = if use_async {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(send_async(&request, settings.client))?
            } else {
                send_blocking(&request, settings.client)?
            };

            println!("{}", String::from_utf8_lossy(&reply));
            Ok(())
        }
    }
}

/// Run the echo server until Ctrl-C.
fn serve(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = EchoServer::new(settings.server)?;
    server.start_server()?;
    info!(address = %server.local_addr(), "Press Ctrl-C to stop");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let recorder = server.recorder();
    runtime.block_on(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = log_recorded(recorder) => Ok(()),
        }
    })?;

    info!("Shutting down");
    server.stop_server();
    Ok(())
}

/// Log every chunk the server records.
async fn log_recorded(recorder: Arc<Recorder>) {
    loop {
        let recorder = Arc::clone(&recorder);
        let taken =
            tokio::task::spawn_blocking(move || recorder.take_timeout(Duration::from_millis(500)))
                .await;
        match taken {
            Ok(Some(message)) => info!(
                bytes = message.len(),
                message = %String::from_utf8_lossy(&message),
                "Recorded"
            ),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Recorder task failed");
                return;
            }
        }
    }
}

/// One `send` invocation.
struct Request {
    host: String,
    port: u16,
    message: Vec<u8>,
    delimiter: Option<Vec<u8>>,
    timeout: Duration,
}

fn send_blocking(request: &Request, config: ClientConfig) -> ClientResult<Bytes> {
    let connect_timeout = config.connect_timeout;
    let mut client = TcpClient::with_config(request.host.clone(), request.port, config);
    client.connect(connect_timeout)?;
    client.send(&request.message)?;

    let reply = match &request.delimiter {
        Some(delimiter) => client.receive_until(DEFAULT_RECEIVE_BYTES, delimiter, request.timeout),
        None => client.receive(DEFAULT_RECEIVE_BYTES),
    };
    client.close();
    reply
}

async fn send_async(request: &Request, config: ClientConfig) -> ClientResult<Bytes> {
    let connect_timeout = config.connect_timeout;
    let mut client = AsyncTcpClient::with_config(request.host.clone(), request.port, config);
    client.connect(connect_timeout).await?;
    client.send(&request.message).await?;

    let reply = match &request.delimiter {
        Some(delimiter) => {
            client
                .receive_until(DEFAULT_RECEIVE_BYTES, delimiter, request.timeout)
                .await
        }
        None => client.receive(DEFAULT_RECEIVE_BYTES).await,
    };
    client.close().await;
    reply
}
