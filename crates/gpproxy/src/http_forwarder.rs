//! HTTP reverse-proxy path
//!
//! Every request is sent to the upstream's configured URL as-is: the inbound path
//! and query are dropped, the body is streamed through, and the upstream's status,
//! headers and body are streamed back. Transport failures never leak to the caller
//! as a broken response; they become a 500 JSON error envelope.

use crate::{error::GatewayError, metrics::Metrics};
use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use reqwest::{redirect::Policy, Client, Url};
use std::net::SocketAddr;
use tracing::{debug, warn};

pub(crate) const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub(crate) const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub(crate) const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Headers that only describe a single hop and must not be forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwards single request/response exchanges to the HTTP upstream
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    upstream: Url,
    host: HeaderValue,
    client: Client,
    metrics: Metrics,
}

impl HttpForwarder {
    /// Creates a forwarder targeting `upstream`
    ///
    /// The client never follows redirects and never decompresses bodies, so the
    /// caller receives exactly what the upstream sent.
    pub fn new(upstream: Url, metrics: Metrics) -> Result<Self, GatewayError> {
        let host = host_header(&upstream, "http")?;
        let client = Client::builder().redirect(Policy::none()).build().map_err(GatewayError::Client)?;
        Ok(Self { upstream, host, client, metrics })
    }

    /// The upstream URL every request is sent to
    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// Forwards `request` and returns the upstream's response, or the error envelope
    pub async fn forward(&self, request: Request) -> Response {
        match self.try_forward(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Upstream {} unreachable: {}", self.upstream, e);
                self.metrics.record_upstream_error("http");
                e.into_response()
            }
        }
    }

    async fn try_forward(&self, request: Request) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let client_addr = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0);

        let mut headers = parts.headers;
        let inbound_host = headers
            .get(header::HOST)
            .cloned()
            .or_else(|| parts.uri.authority().and_then(|a| HeaderValue::from_str(a.as_str()).ok()));
        strip_hop_by_hop(&mut headers);

        if let Some(host) = inbound_host {
            headers.insert(X_FORWARDED_HOST, host);
        }
        if let Some(addr) = client_addr {
            append_forwarded_for(&mut headers, addr);
        }
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
        headers.insert(header::HOST, self.host.clone());

        debug!(method = %parts.method, from = %parts.uri, to = %self.upstream, "Forwarding HTTP request");

        let outbound_body = if body.is_end_stream() {
            reqwest::Body::from(Bytes::new())
        } else {
            reqwest::Body::wrap_stream(body.into_data_stream())
        };

        let upstream_response = self
            .client
            .request(parts.method, self.upstream.clone())
            .headers(headers)
            .body(outbound_body)
            .send()
            .await?;

        let status = upstream_response.status();
        let mut response_headers = upstream_response.headers().clone();
        strip_hop_by_hop(&mut response_headers);
        debug!(%status, "Upstream responded");

        let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// `host[:port]` of `url`, as it should appear in a `Host` header
pub(crate) fn host_header(url: &Url, kind: &'static str) -> Result<HeaderValue, GatewayError> {
    let host = url.host_str().ok_or_else(|| GatewayError::InvalidAddress {
        kind,
        address: url.to_string(),
        reason: "missing host".to_string(),
    })?;
    let value = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).map_err(|e| GatewayError::InvalidAddress {
        kind,
        address: url.to_string(),
        reason: e.to_string(),
    })
}

/// Removes hop-by-hop headers, including any listed in `Connection`.
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

/// Appends `addr` to `X-Forwarded-For`, keeping earlier proxies' entries.
pub(crate) fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let client_ip = addr.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {client_ip}"),
        None => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
