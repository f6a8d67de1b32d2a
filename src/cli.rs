//! Command-line interface for the `tcp-fixture` binary.
//!
//! Values given on the command line take precedence over the TOML file,
//! which takes precedence over built-in defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tcp_fixture::config::{ConfigError, TomlConfig};
use tcp_fixture::{ClientConfig, ServerConfig};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "tcp-fixture")]
#[command(version)]
#[command(about = "Recording TCP echo server and reconnecting client", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the echo server until Ctrl-C
    Serve {
        /// Address to bind to (e.g., 127.0.0.1:12345)
        #[arg(short = 'l', long)]
        listen: Option<String>,

        /// Maximum bytes read and echoed per chunk
        #[arg(short = 'b', long)]
        receive_bytes: Option<usize>,
    },
    /// Send one message and print what comes back
    Send {
        /// Message to send
        message: String,

        /// Server address (defaults to the configured listen address)
        #[arg(short = 'a', long)]
        address: Option<String>,

        /// Print only the first record ending in this delimiter
        /// (escapes \n, \r, \t and \0 are understood)
        #[arg(short = 'd', long)]
        delimiter: Option<String>,

        /// Receive window for --delimiter, in milliseconds
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        /// Use the async client
        #[arg(long = "async")]
        use_async: bool,
    },
}

/// Final resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub log_level: String,
}

impl Settings {
    /// Merge CLI args over the optional TOML file.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let toml_config = match &cli.config {
            Some(path) => TomlConfig::from_file(path)?,
            None => TomlConfig::default(),
        };

        let log_level = cli
            .log_level
            .clone()
            .unwrap_or(toml_config.logging.level);

        let mut server = ServerConfig::from(toml_config.server);
        if let Command::Serve {
            listen,
            receive_bytes,
        } = &cli.command
        {
            if let Some(listen) = listen {
                server.listen = listen.clone();
            }
            if let Some(receive_bytes) = receive_bytes {
                server.receive_bytes = *receive_bytes;
            }
        }

        Ok(Settings {
            server,
            client: ClientConfig::from(toml_config.client),
            log_level,
        })
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
pub fn split_address(address: &str) -> Option<(String, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

/// Turn `\n`, `\r`, `\t`, `\0` and `\\` escapes into bytes.
pub fn unescape(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut utf8 = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some(other) => {
                out.push(b'\\');
                let mut utf8 = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut utf8).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    out
}
