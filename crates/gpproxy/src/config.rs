//! Command-line and environment configuration

use clap::Parser;
use eyre::{Result, WrapErr};
use std::net::{IpAddr, SocketAddr};

/// Gas price JSON-RPC gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "gpproxy")]
#[command(about = "Transparent HTTP and WebSocket gateway for a single Ethereum JSON-RPC node")]
#[command(version)]
pub struct Config {
    /// Address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8545")]
    pub port: u16,

    /// Upstream node HTTP endpoint
    /// Example: --node-url https://mainnet.infura.io/v3/<key>
    #[arg(long, env = "NODE_URL")]
    pub node_url: String,

    /// Upstream node WebSocket endpoint (derived from --node-url when omitted)
    #[arg(long, env = "NODE_WS_URL")]
    pub node_ws_url: Option<String>,

    /// Also write logs to a daily rolling file under the temp directory
    #[arg(long, env = "GPPROXY_LOG_FILE")]
    pub log_file: bool,

    /// Verbosity level (repeat for more: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    /// Socket address the gateway listens on
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr =
            self.host.parse().wrap_err_with(|| format!("invalid listen host {:?}", self.host))?;
        Ok(SocketAddr::from((ip, self.port)))
    }

    /// The configured WebSocket endpoint, or one derived from the HTTP endpoint
    pub fn ws_url(&self) -> String {
        match &self.node_ws_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => derive_ws_url(&self.node_url),
        }
    }

    /// `RUST_LOG` level implied by the `-v` count
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Guesses a node's WebSocket endpoint from its HTTP endpoint
///
/// `http` becomes `ws` (so `https` becomes `wss`), and Infura's `/v3` path is moved
/// under `/ws/v3`. Purely textual; the result is validated when the node is built.
pub fn derive_ws_url(http_url: &str) -> String {
    let ws = http_url.replacen("http", "ws", 1);
    if ws.contains("infura.io/v3") {
        ws.replacen("infura.io/v3", "infura.io/ws/v3", 1)
    } else {
        ws
    }
}
