//! Gateway metrics exposed on `/metrics`
//!
//! Counters are plain atomics behind `Arc`s, so a [`Metrics`] handle is cheap to
//! clone into every forwarder. The registry itself is only read after startup.

use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::sync::Arc;

/// Content type of the OpenMetrics text exposition
pub const METRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

type Labels = Vec<(String, String)>;

/// Direction of a relayed WebSocket frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDirection {
    /// Frames sent by the caller towards the upstream node
    ClientToBackend,
    /// Frames sent by the upstream node towards the caller
    BackendToClient,
}

impl RelayDirection {
    /// Label value used in metrics and logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientToBackend => "client_to_backend",
            Self::BackendToClient => "backend_to_client",
        }
    }
}

/// Handles to every counter the gateway updates
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    http_requests: Family<Labels, Counter>,
    upstream_errors: Family<Labels, Counter>,
    ws_connections: Gauge,
    ws_frames: Family<Labels, Counter>,
}

impl Metrics {
    /// Creates the gateway metrics and registers them under the `gpproxy` prefix
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        let sub_reg = registry.sub_registry_with_prefix("gpproxy");

        sub_reg.register(
            "http_requests",
            "Requests served by the gateway grouped by route and status",
            metrics.http_requests.clone(),
        );
        sub_reg.register(
            "upstream_errors",
            "Failures reaching the upstream node grouped by transport",
            metrics.upstream_errors.clone(),
        );
        sub_reg.register(
            "ws_connections",
            "WebSocket exchanges currently being relayed",
            metrics.ws_connections.clone(),
        );
        sub_reg.register(
            "ws_frames",
            "WebSocket frames relayed grouped by direction",
            metrics.ws_frames.clone(),
        );

        metrics
    }

    /// Counts one routed request
    pub fn record_request(&self, route: &str, status: u16) {
        self.http_requests
            .get_or_create(&vec![
                ("route".to_string(), route.to_string()),
                ("status".to_string(), status.to_string()),
            ])
            .inc();
    }

    /// Counts one failure to reach the upstream over `transport`
    pub fn record_upstream_error(&self, transport: &str) {
        self.upstream_errors.get_or_create(&vec![("transport".to_string(), transport.to_string())]).inc();
    }

    /// Counts one relayed WebSocket frame
    pub fn record_frame(&self, direction: RelayDirection) {
        self.ws_frames
            .get_or_create(&vec![("direction".to_string(), direction.as_str().to_string())])
            .inc();
    }

    /// Marks a WebSocket exchange as relaying until the returned guard is dropped
    pub fn track_ws_connection(&self) -> ConnectionGuard {
        self.ws_connections.inc();
        ConnectionGuard { gauge: self.ws_connections.clone() }
    }

    /// Number of WebSocket exchanges currently relaying
    pub fn active_ws_connections(&self) -> i64 {
        self.ws_connections.get()
    }

    /// Total frames relayed in `direction`
    pub fn frames(&self, direction: RelayDirection) -> u64 {
        self.ws_frames
            .get_or_create(&vec![("direction".to_string(), direction.as_str().to_string())])
            .get()
    }
}

/// Decrements the active connection gauge on drop
#[derive(Debug)]
pub struct ConnectionGuard {
    gauge: Gauge,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Registry plus the handles registered in it
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    metrics: Metrics,
}

impl MetricsRegistry {
    /// Creates a registry holding the gateway metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::register(&mut registry);
        Self { registry: Arc::new(registry), metrics }
    }

    /// Handles to update the registered metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Encodes the registry in the OpenMetrics text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
