//! HTTP surface of the gateway
//!
//! | Path | Method | Handler |
//! |---|---|---|
//! | `/` | any | raw passthrough to the node |
//! | `/eth/gasprice` | any | normalized, then passed through |
//! | `/ws` | GET + upgrade | WebSocket relay to the node |
//! | `/metrics` | GET | OpenMetrics exposition |
//! | `/healthz` | GET | liveness, never touches the node |

use crate::{
    error::error_response,
    metrics::{Metrics, MetricsRegistry, METRICS_CONTENT_TYPE},
    node::NodeService,
    normalize::normalize_gas_price_request,
};
use axum::{
    extract::{ws::WebSocketUpgrade, MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Body returned by `/healthz`
pub const HEALTHY: &str = "ok";

/// State shared by every handler
pub struct ApiState<N> {
    node: Arc<N>,
    metrics: MetricsRegistry,
}

// Derived Clone would require `N: Clone`.
impl<N> Clone for ApiState<N> {
    fn clone(&self) -> Self {
        Self { node: Arc::clone(&self.node), metrics: self.metrics.clone() }
    }
}

/// Builds the gateway's routes on top of `node`
pub fn router<N: NodeService>(node: Arc<N>, metrics: MetricsRegistry) -> Router {
    let request_metrics = metrics.metrics().clone();

    Router::new()
        .route("/", any(proxy_http::<N>))
        .route("/eth/gasprice", any(gas_price::<N>))
        .route("/ws", get(proxy_ws::<N>))
        .route("/metrics", get(render_metrics::<N>))
        .route("/healthz", get(healthz))
        .route_layer(middleware::from_fn_with_state(request_metrics, record_request))
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { node, metrics })
}

async fn proxy_http<N: NodeService>(State(state): State<ApiState<N>>, request: Request) -> Response {
    state.node.proxy_http(request).await
}

async fn gas_price<N: NodeService>(State(state): State<ApiState<N>>, request: Request) -> Response {
    match normalize_gas_price_request(request).await {
        Ok(request) => state.node.proxy_http(request).await,
        Err(e) => {
            warn!("Rejected gas price request: {}", e);
            e.into_response()
        }
    }
}

async fn proxy_ws<N: NodeService>(
    State(state): State<ApiState<N>>,
    upgrade: WebSocketUpgrade,
    request: Request,
) -> Response {
    state.node.proxy_ws(upgrade, request).await
}

async fn render_metrics<N: NodeService>(State(state): State<ApiState<N>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("metrics: {e}")),
    }
}

async fn healthz() -> &'static str {
    HEALTHY
}

async fn record_request(State(metrics): State<Metrics>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let response = next.run(request).await;
    metrics.record_request(&route, response.status().as_u16());
    response
}
