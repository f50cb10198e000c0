//! Command line interface for the `netview` diagnostic binary.
//!
//! The binary connects to a monitoring server, issues one request and
//! prints the reply. It shares its argument definition with the build script
//! that renders the man page.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `netview` binary.
#[derive(Debug, Parser)]
#[command(
    name = "netview",
    version,
    about = "Send a request to a netview monitoring server"
)]
pub struct Cli {
    /// Server as `host:port` (`[addr]:port` for IPv6); overrides `--host`
    /// and `--port`.
    #[arg(short, long, env = "NETVIEW_SERVER")]
    pub server: Option<String>,
    /// Server host name or address.
    #[arg(long, env = "NETVIEW_HOST", default_value = "127.0.0.1")]
    pub host: String,
    /// Server port.
    #[arg(short, long, env = "NETVIEW_PORT", default_value_t = 9100)]
    pub port: u16,
    /// Action to invoke.
    #[arg(short, long, default_value = "ping")]
    pub action: String,
    /// Request parameter as `key=value`; values that parse as JSON are sent as
    /// JSON, anything else as a string.
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
    /// Request timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// Keep running and print server-pushed messages until interrupted.
    #[arg(short, long)]
    pub watch: bool,
    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}
