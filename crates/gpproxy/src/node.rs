//! The upstream node behind the gateway
//!
//! [`NodeService`] is the one seam the router talks to: a request/response path
//! and a duplex-stream path. [`Node`] implements it with an [`HttpForwarder`] and a
//! [`WsForwarder`] sharing nothing but their read-only configuration, so a single
//! instance serves any number of concurrent calls without locking.

use crate::{
    error::GatewayError, http_forwarder::HttpForwarder, metrics::Metrics, ws_forwarder::WsForwarder,
};
use axum::{
    extract::{ws::WebSocketUpgrade, Request},
    response::Response,
};
use reqwest::Url;
use std::future::Future;
use tracing::info;

/// Capabilities the router needs from an upstream node
pub trait NodeService: Send + Sync + 'static {
    /// Forwards one HTTP exchange to the node
    fn proxy_http(&self, request: Request) -> impl Future<Output = Response> + Send;

    /// Upgrades the caller and relays the WebSocket stream to the node
    fn proxy_ws(
        &self,
        upgrade: WebSocketUpgrade,
        request: Request,
    ) -> impl Future<Output = Response> + Send;
}

/// A single upstream JSON-RPC node reachable over HTTP and WebSocket
#[derive(Debug, Clone)]
pub struct Node {
    http: HttpForwarder,
    ws: WsForwarder,
}

impl Node {
    /// Validates both upstream addresses and builds the forwarders
    ///
    /// # Arguments
    /// * `http_url` - Address of the node's HTTP endpoint (`http` or `https`)
    /// * `ws_url` - Address of the node's WebSocket endpoint (`ws` or `wss`)
    ///
    /// # Returns
    /// [`GatewayError::InvalidAddress`] if either address is unusable
    pub fn new(http_url: &str, ws_url: &str) -> Result<Self, GatewayError> {
        Self::with_metrics(http_url, ws_url, Metrics::default())
    }

    /// Same as [`Node::new`], reporting into `metrics`
    pub fn with_metrics(http_url: &str, ws_url: &str, metrics: Metrics) -> Result<Self, GatewayError> {
        let http_url = parse_upstream(http_url, "http", &["http", "https"])?;
        let ws_url = parse_upstream(ws_url, "ws", &["ws", "wss"])?;
        info!("Upstream node: http={} ws={}", http_url, ws_url);

        Ok(Self {
            http: HttpForwarder::new(http_url, metrics.clone())?,
            ws: WsForwarder::new(ws_url, metrics)?,
        })
    }

    /// Upstream HTTP address
    pub fn http_url(&self) -> &Url {
        self.http.upstream()
    }

    /// Upstream WebSocket address
    pub fn ws_url(&self) -> &Url {
        self.ws.upstream()
    }
}

impl NodeService for Node {
    async fn proxy_http(&self, request: Request) -> Response {
        self.http.forward(request).await
    }

    async fn proxy_ws(&self, upgrade: WebSocketUpgrade, request: Request) -> Response {
        self.ws.forward(upgrade, request).await
    }
}

fn parse_upstream(address: &str, kind: &'static str, schemes: &[&str]) -> Result<Url, GatewayError> {
    let invalid = |reason: String| GatewayError::InvalidAddress {
        kind,
        address: address.to_string(),
        reason,
    };

    let url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(format!("unsupported scheme {:?}, expected one of {schemes:?}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_addresses_are_accepted() {
        let cases = [
            ("http://127.0.0.1:8545", "ws://127.0.0.1:8546"),
            ("https://mainnet.infura.io/v3/key", "wss://mainnet.infura.io/ws/v3/key"),
            ("http://localhost/", "ws://localhost/ws"),
        ];

        for (http, ws) in cases {
            let node = Node::new(http, ws).unwrap_or_else(|e| panic!("{http} / {ws}: {e}"));
            assert_eq!(node.http_url().as_str().trim_end_matches('/'), http.trim_end_matches('/'));
            assert_eq!(node.ws_url().scheme(), Url::parse(ws).unwrap().scheme());
        }
    }

    #[test]
    fn test_malformed_addresses_are_rejected() {
        let cases = [
            ("", "ws://127.0.0.1:8546"),
            ("http://127.0.0.1:8545", ""),
            ("not a url", "ws://127.0.0.1:8546"),
            ("http://", "ws://127.0.0.1:8546"),
            ("http://127.0.0.1:99999", "ws://127.0.0.1:8546"),
            ("localhost:8545", "ws://127.0.0.1:8546"),
            ("ws://127.0.0.1:8545", "ws://127.0.0.1:8546"),
            ("http://127.0.0.1:8545", "http://127.0.0.1:8546"),
        ];

        for (http, ws) in cases {
            let result = Node::new(http, ws);
            assert!(
                matches!(result, Err(GatewayError::InvalidAddress { .. })),
                "expected InvalidAddress for {http:?} / {ws:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_invalid_address_names_the_offending_upstream() {
        let error = Node::new("http://127.0.0.1:8545", "nope").unwrap_err();
        match error {
            GatewayError::InvalidAddress { kind, address, .. } => {
                assert_eq!(kind, "ws");
                assert_eq!(address, "nope");
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
