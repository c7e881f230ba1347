//! WebSocket proxy path
//!
//! Each inbound upgrade gets its own backend connection, dialled *before* the
//! client is upgraded so that an unreachable node shows up as a failed handshake
//! rather than an accepted socket that immediately dies. Once both sides are open
//! the frames are relayed in both directions until either side goes away.
//!
//! ```text
//! Idle -> Upgrading -> Relaying -> Closed
//!             |                      ^
//!             +---- dial failed -----+
//! ```

use crate::{
    error::{error_chain, error_response},
    http_forwarder::{append_forwarded_for, host_header, X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO},
    metrics::{Metrics, RelayDirection},
    GatewayError,
};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Request,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use reqwest::Url;
use std::{fmt::Display, net::SocketAddr, time::Duration};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        client::IntoClientRequest,
        protocol::{frame::coding::CloseCode, CloseFrame as BackendCloseFrame},
        Message as BackendMessage,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

/// Connection to the upstream node
pub type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the close handshake of each side during teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Inbound headers copied onto the backend handshake
const COPIED_HEADERS: &[&str] = &["origin", "cookie", "sec-websocket-protocol", "user-agent"];

/// Relays WebSocket exchanges to the upstream node
#[derive(Debug, Clone)]
pub struct WsForwarder {
    upstream: Url,
    host: HeaderValue,
    metrics: Metrics,
}

impl WsForwarder {
    /// Creates a forwarder targeting `upstream`
    pub fn new(upstream: Url, metrics: Metrics) -> Result<Self, GatewayError> {
        let host = host_header(&upstream, "ws")?;
        Ok(Self { upstream, host, metrics })
    }

    /// The upstream URL every exchange connects to
    ///
    /// Path, query and fragment all come from the configured address; the inbound
    /// request's own path is never used.
    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// Dials the backend, then upgrades the caller and relays frames between them
    pub async fn forward(&self, upgrade: WebSocketUpgrade, request: Request) -> Response {
        let backend_request = match self.backend_request(&request) {
            Ok(backend_request) => backend_request,
            Err(e) => {
                warn!("Failed to build backend handshake for {}: {}", self.upstream, e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, error_chain(&e));
            }
        };

        debug!(to = %self.upstream, "Dialing WebSocket backend");
        let (backend, handshake) = match connect_async(backend_request).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!("Couldn't dial WebSocket backend {}: {}", self.upstream, e);
                self.metrics.record_upstream_error("ws");
                return handshake_rejection(e);
            }
        };

        // Offer the caller whatever subprotocol the backend settled on.
        let upgrade = match handshake
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
        {
            Some(protocol) => upgrade.protocols([protocol.to_owned()]),
            None => upgrade,
        };

        let metrics = self.metrics.clone();
        upgrade
            .on_failed_upgrade(|e| warn!("Client WebSocket upgrade failed: {}", e))
            .on_upgrade(move |client| relay(client, backend, metrics))
    }

    /// Handshake request for the backend, carrying the caller's identifying headers
    pub fn backend_request(&self, request: &Request) -> Result<tungstenite::handshake::client::Request, tungstenite::Error> {
        let mut backend_request = self.upstream.as_str().into_client_request()?;
        let inbound = request.headers();
        let outbound = backend_request.headers_mut();

        for name in COPIED_HEADERS {
            for value in inbound.get_all(*name) {
                outbound.append(HeaderName::from_static(*name), value.clone());
            }
        }
        copy_forwarded_for(inbound, outbound);
        if let Some(addr) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(outbound, addr.0);
        }
        if let Some(host) = inbound.get(header::HOST) {
            outbound.insert(X_FORWARDED_HOST, host.clone());
        }
        outbound.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
        outbound.insert(header::HOST, self.host.clone());

        Ok(backend_request)
    }
}

fn copy_forwarded_for(inbound: &HeaderMap, outbound: &mut HeaderMap) {
    if let Some(prior) = inbound.get(X_FORWARDED_FOR) {
        outbound.insert(X_FORWARDED_FOR, prior.clone());
    }
}

/// Response for a backend that could not be reached or refused the handshake.
///
/// Nothing has been upgraded yet, so a plain HTTP status is still possible, but
/// no JSON body is promised.
fn handshake_rejection(error: tungstenite::Error) -> Response {
    match error {
        tungstenite::Error::Http(response) => {
            let body = response.body().clone().unwrap_or_default();
            (response.status(), body).into_response()
        }
        _ => (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response(),
    }
}

/// How one relay direction ended
#[derive(Debug)]
enum RelayEnd {
    /// A close frame went through
    Closed,
    /// The source ran out of frames without a close frame
    Eof,
    /// Reading from the source failed
    Read(String),
    /// Writing to the destination failed
    Write(String),
}

/// Relays frames between `client` and `backend` until either direction ends.
///
/// Both directions are polled by a single `select!`, so the first to finish
/// cancels the other one. Teardown then closes each side once and drops it.
pub async fn relay(client: WebSocket, backend: BackendStream, metrics: Metrics) {
    let _active = metrics.track_ws_connection();
    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let (direction, end) = tokio::select! {
        end = pump(&mut client_rx, &mut backend_tx, RelayDirection::ClientToBackend, &metrics) => {
            (RelayDirection::ClientToBackend, end)
        }
        end = pump(&mut backend_rx, &mut client_tx, RelayDirection::BackendToClient, &metrics) => {
            (RelayDirection::BackendToClient, end)
        }
    };

    match &end {
        RelayEnd::Closed | RelayEnd::Eof => {
            debug!(direction = direction.as_str(), ?end, "WebSocket relay finished")
        }
        RelayEnd::Read(_) | RelayEnd::Write(_) => {
            warn!(direction = direction.as_str(), ?end, "WebSocket relay failed")
        }
    }

    // Errors here only mean the peer is already gone.
    let _ = timeout(CLOSE_TIMEOUT, client_tx.close()).await;
    let _ = timeout(CLOSE_TIMEOUT, backend_tx.close()).await;
}

/// Forwards frames from `source` to `sink`, one at a time, until the first close
/// frame, error, or end of stream.
async fn pump<F, S, K, ReadErr, WriteErr>(
    source: &mut S,
    sink: &mut K,
    direction: RelayDirection,
    metrics: &Metrics,
) -> RelayEnd
where
    F: Frame,
    S: Stream<Item = Result<F, ReadErr>> + Unpin,
    K: Sink<F::Peer, Error = WriteErr> + Unpin,
    ReadErr: Display,
    WriteErr: Display,
{
    while let Some(next) = source.next().await {
        let frame = match next {
            Ok(frame) => frame,
            Err(e) => return RelayEnd::Read(e.to_string()),
        };
        let closing = frame.is_close();
        let Some(frame) = frame.into_peer() else { continue };

        if let Err(e) = sink.send(frame).await {
            return RelayEnd::Write(e.to_string());
        }
        metrics.record_frame(direction);

        if closing {
            return RelayEnd::Closed;
        }
    }
    RelayEnd::Eof
}

/// A WebSocket message that can be re-sent on the other side of the relay
trait Frame: Sized {
    /// Message type of the opposite connection
    type Peer;

    /// Whether this is a close frame
    fn is_close(&self) -> bool;

    /// Same frame in the opposite connection's representation, if it has one
    fn into_peer(self) -> Option<Self::Peer>;
}

impl Frame for Message {
    type Peer = BackendMessage;

    fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    fn into_peer(self) -> Option<BackendMessage> {
        match self {
            Self::Text(text) => Some(BackendMessage::Text(text.as_str().into())),
            Self::Binary(data) => Some(BackendMessage::Binary(data)),
            Self::Ping(data) => Some(BackendMessage::Ping(data)),
            // The backend's ping was already answered on this hop.
            Self::Pong(_) => None,
            Self::Close(frame) => Some(BackendMessage::Close(frame.map(|frame| BackendCloseFrame {
                code: CloseCode::from(frame.code),
                reason: frame.reason.as_str().into(),
            }))),
        }
    }
}

impl Frame for BackendMessage {
    type Peer = Message;

    fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    fn into_peer(self) -> Option<Message> {
        match self {
            Self::Text(text) => Some(Message::Text(text.as_str().into())),
            Self::Binary(data) => Some(Message::Binary(data)),
            Self::Ping(data) => Some(Message::Ping(data)),
            // The client's ping was already answered on this hop.
            Self::Pong(_) => None,
            Self::Close(frame) => Some(Message::Close(frame.map(|frame| CloseFrame {
                code: frame.code.into(),
                reason: frame.reason.as_str().into(),
            }))),
            // Raw frames are only produced when writing.
            Self::Frame(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, Bytes};

    fn forwarder(url: &str) -> WsForwarder {
        WsForwarder::new(Url::parse(url).unwrap(), Metrics::default()).unwrap()
    }

    #[test]
    fn test_backend_request_targets_configured_address() {
        let forwarder = forwarder("ws://node.local:8546/ws/v3/key?token=abc");
        let inbound = Request::builder()
            .uri("/ws?ignored=1")
            .header(header::HOST, "gateway.local:8545")
            .header(header::ORIGIN, "https://dapp.example")
            .header(header::SEC_WEBSOCKET_PROTOCOL, "json-rpc")
            .body(Body::empty())
            .unwrap();

        let request = forwarder.backend_request(&inbound).unwrap();
        assert_eq!(request.uri().path(), "/ws/v3/key");
        assert_eq!(request.uri().query(), Some("token=abc"));
        assert_eq!(request.headers()[header::HOST], "node.local:8546");
        assert_eq!(request.headers()[X_FORWARDED_HOST], "gateway.local:8545");
        assert_eq!(request.headers()[X_FORWARDED_PROTO], "http");
        assert_eq!(request.headers()[header::ORIGIN], "https://dapp.example");
        assert_eq!(request.headers()[header::SEC_WEBSOCKET_PROTOCOL], "json-rpc");
    }

    #[test]
    fn test_backend_request_records_client_address() {
        let forwarder = forwarder("ws://node.local/");
        let mut inbound = Request::builder()
            .uri("/ws")
            .header(X_FORWARDED_FOR, "192.168.1.1")
            .body(Body::empty())
            .unwrap();
        inbound.extensions_mut().insert(ConnectInfo("10.0.0.7:40000".parse::<SocketAddr>().unwrap()));

        let request = forwarder.backend_request(&inbound).unwrap();
        assert_eq!(request.headers()[X_FORWARDED_FOR], "192.168.1.1, 10.0.0.7");
    }

    #[test]
    fn test_text_and_close_frames_survive_conversion() {
        let text = Message::Text(r#"{"method":"eth_gasPrice"}"#.into()).into_peer().unwrap();
        assert_eq!(text, BackendMessage::Text(r#"{"method":"eth_gasPrice"}"#.into()));

        let close = Message::Close(Some(CloseFrame { code: 1001, reason: "going away".into() }));
        assert!(close.is_close());
        match close.into_peer().unwrap() {
            BackendMessage::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 1001);
                assert_eq!(frame.reason.as_str(), "going away");
            }
            other => panic!("expected close frame, got {other:?}"),
        }

        let back = BackendMessage::Binary(vec![1u8, 2, 3].into()).into_peer().unwrap();
        assert!(matches!(back, Message::Binary(data) if data == Bytes::from_static(&[1, 2, 3])));
    }

    #[test]
    fn test_pings_are_relayed_but_pongs_are_not() {
        let ping = Message::Ping(Bytes::from_static(b"hi")).into_peer();
        assert!(matches!(ping, Some(BackendMessage::Ping(data)) if data == Bytes::from_static(b"hi")));
        assert!(Message::Pong(Bytes::from_static(b"hi")).into_peer().is_none());

        let ping = BackendMessage::Ping(Bytes::from_static(b"hi")).into_peer();
        assert!(matches!(ping, Some(Message::Ping(data)) if data == Bytes::from_static(b"hi")));
        assert!(BackendMessage::Pong(Bytes::from_static(b"hi")).into_peer().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_rejects_upgrade() {
        let error = tungstenite::Error::ConnectionClosed;
        let response = handshake_rejection(error);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
