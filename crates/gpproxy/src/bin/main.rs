// gpproxy - Ethereum JSON-RPC Gateway
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! gpproxy
//!
//! Serves the gas price gateway in front of the node named by `--node-url`.

use clap::Parser;
use eyre::Result;
use gpproxy::{Config, ProxyServerBuilder};
use gpproxy_common::init_logging;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenv::dotenv();
    let config = Config::parse();

    // Set RUST_LOG based on verbosity
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", config.log_level());
    }

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging("gpproxy", config.log_file)?;

    let addr = config.listen_addr()?;
    let server = ProxyServerBuilder::from_config(config).build()?;
    info!("Starting gpproxy on {}", addr);

    tokio::select! {
        result = server.clone().serve(addr) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            server.shutdown();
        }
    }

    Ok(())
}
