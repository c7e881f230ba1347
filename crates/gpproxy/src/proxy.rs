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

//! Gateway server: wiring the node, the router and the listener together

use crate::{
    api,
    config::{derive_ws_url, Config},
    metrics::MetricsRegistry,
    node::Node,
};
use axum::Router;
use eyre::{eyre, Result};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::info;

/// Builder for [`ProxyServer`]
#[derive(Debug, Clone, Default)]
pub struct ProxyServerBuilder {
    node_url: Option<String>,
    node_ws_url: Option<String>,
}

impl ProxyServerBuilder {
    /// Create a new builder with no upstream configured
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the upstream addresses from a parsed [`Config`]
    pub fn from_config(config: Config) -> Self {
        let node_ws_url = config.ws_url();
        Self { node_url: Some(config.node_url), node_ws_url: Some(node_ws_url) }
    }

    /// Set the upstream node's HTTP endpoint
    pub fn node_url(mut self, url: impl Into<String>) -> Self {
        self.node_url = Some(url.into());
        self
    }

    /// Set the upstream node's WebSocket endpoint
    ///
    /// When unset, it is derived from the HTTP endpoint with [`derive_ws_url`].
    pub fn node_ws_url(mut self, url: impl Into<String>) -> Self {
        self.node_ws_url = Some(url.into());
        self
    }

    /// Validate the upstream addresses and build the server
    pub fn build(self) -> Result<ProxyServer> {
        let node_url = self.node_url.ok_or_else(|| eyre!("no upstream node url configured"))?;
        let node_ws_url = self.node_ws_url.unwrap_or_else(|| derive_ws_url(&node_url));
        ProxyServer::new(&node_url, &node_ws_url)
    }
}

/// The gateway: one upstream [`Node`] served behind the routes in [`api`]
///
/// ```no_run
/// # use gpproxy::ProxyServerBuilder;
/// # async fn example() -> eyre::Result<()> {
/// let server = ProxyServerBuilder::new().node_url("http://127.0.0.1:8545").build()?;
/// server.serve("127.0.0.1:8080".parse()?).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ProxyServer {
    node: Arc<Node>,
    metrics: MetricsRegistry,
    shutdown_tx: broadcast::Sender<()>,
}

impl ProxyServer {
    fn new(node_url: &str, node_ws_url: &str) -> Result<Self> {
        let metrics = MetricsRegistry::new();
        let node = Node::with_metrics(node_url, node_ws_url, metrics.metrics().clone())?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self { node: Arc::new(node), metrics, shutdown_tx })
    }

    /// The upstream node requests are forwarded to
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Metrics served on `/metrics`
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// The gateway's routes, ready to be served
    pub fn router(&self) -> Router {
        api::router(Arc::clone(&self.node), self.metrics.clone())
    }

    /// Asks a running [`ProxyServer::serve`] to stop accepting connections
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Binds `addr` and serves until [`ProxyServer::shutdown`] is called
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_listener(listener).await
    }

    /// Serves on an already bound listener until [`ProxyServer::shutdown`] is called
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let app = self.router();
        info!("gpproxy listening on {}", listener.local_addr()?);

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Shutdown signal received, stopping server gracefully");
            })
            .await?;

        Ok(())
    }
}
