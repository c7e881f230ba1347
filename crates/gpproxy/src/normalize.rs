//! Gas-price shortcut request rewriting
//!
//! `/eth/gasprice` accepts any verb and an optional body. Before the request is
//! handed to the HTTP forwarder its body is turned into a complete JSON-RPC
//! request whose method defaults to [`GAS_PRICE_METHOD`], and the verb is forced to
//! POST, so the upstream sees exactly what a regular RPC client would send.

use crate::{
    error::NormalizeError,
    rpc::{RpcRequest, GAS_PRICE_METHOD},
};
use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, HeaderValue, Method},
};
use tracing::debug;

/// Largest shortcut body the gateway is willing to buffer
pub const MAX_RPC_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Rewrites a shortcut request in place of the original one
///
/// An absent, blank or `null` body is treated as `{}`. Everything else about the
/// request (URI, headers other than the framing ones, extensions) is left untouched.
pub async fn normalize_gas_price_request(request: Request) -> Result<Request, NormalizeError> {
    let (mut parts, body) = request.into_parts();

    let raw = to_bytes(body, MAX_RPC_BODY_BYTES).await.map_err(NormalizeError::Body)?;
    // A blank or literal `null` body is an empty request.
    let mut rpc_request = if raw.iter().all(u8::is_ascii_whitespace) {
        RpcRequest::default()
    } else {
        serde_json::from_slice::<Option<RpcRequest>>(&raw)?.unwrap_or_default()
    };

    if rpc_request.method.is_empty() {
        rpc_request.method = GAS_PRICE_METHOD.to_string();
    }
    debug!(method = %rpc_request.method, verb = %parts.method, "Normalized gas price request");

    let bytes = rpc_request.to_bytes()?;
    parts.method = Method::POST;
    parts.headers.remove(header::TRANSFER_ENCODING);
    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));

    Ok(Request::from_parts(parts, Body::from(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn request(method: Method, body: impl Into<Body>) -> Request {
        Request::builder().method(method).uri("/eth/gasprice").body(body.into()).unwrap()
    }

    async fn forwarded_body(request: Request) -> Value {
        let body = to_bytes(request.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_empty_body_defaults_to_gas_price() {
        let normalized = normalize_gas_price_request(request(Method::POST, Body::empty())).await.unwrap();
        assert_eq!(*normalized.method(), Method::POST);

        let body = forwarded_body(normalized).await;
        assert_eq!(body["method"], GAS_PRICE_METHOD);
        assert_eq!(body["params"], json!([]));
    }

    #[tokio::test]
    async fn test_get_is_coerced_to_post() {
        let normalized = normalize_gas_price_request(request(Method::GET, Body::empty())).await.unwrap();
        assert_eq!(*normalized.method(), Method::POST);
        assert_eq!(normalized.uri().path(), "/eth/gasprice");
    }

    #[tokio::test]
    async fn test_empty_and_explicit_method_are_equivalent() {
        let empty = normalize_gas_price_request(request(Method::POST, "  \n")).await.unwrap();
        let explicit =
            normalize_gas_price_request(request(Method::POST, r#"{"method":"eth_gasPrice"}"#))
                .await
                .unwrap();

        assert_eq!(forwarded_body(empty).await, forwarded_body(explicit).await);
    }

    #[tokio::test]
    async fn test_explicit_method_is_preserved() {
        let raw = r#"{"jsonrpc":"2.0","id":4,"method":"eth_blockNumber","params":[]}"#;
        let normalized = normalize_gas_price_request(request(Method::POST, raw)).await.unwrap();

        let body = forwarded_body(normalized).await;
        assert_eq!(body, json!({"jsonrpc": "2.0", "id": 4, "method": "eth_blockNumber", "params": []}));
    }

    #[tokio::test]
    async fn test_null_fields_default_to_gas_price() {
        for raw in [r#"{"method":null}"#, r#"{"id":null,"jsonrpc":null}"#, "null"] {
            let normalized = normalize_gas_price_request(request(Method::POST, raw)).await.unwrap();
            let body = forwarded_body(normalized).await;
            assert_eq!(body["method"], GAS_PRICE_METHOD, "body {raw}");
            assert_eq!(body["id"], 0, "body {raw}");
        }
    }

    #[tokio::test]
    async fn test_other_headers_are_untouched() {
        let original = Request::builder()
            .method(Method::GET)
            .uri("/eth/gasprice")
            .header("x-client", "wallet")
            .body(Body::empty())
            .unwrap();
        let normalized = normalize_gas_price_request(original).await.unwrap();

        assert_eq!(normalized.headers()["x-client"], "wallet");
        assert!(!normalized.headers().contains_key(header::CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_content_length_matches_new_body() {
        let original = request(Method::POST, "{}");
        let normalized = normalize_gas_price_request(original).await.unwrap();

        let declared: usize = normalized.headers()[header::CONTENT_LENGTH].to_str().unwrap().parse().unwrap();
        let body = to_bytes(normalized.into_body(), usize::MAX).await.unwrap();
        assert_eq!(declared, body.len());
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let result = normalize_gas_price_request(request(Method::POST, "{not json")).await;
        assert!(matches!(result, Err(NormalizeError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let huge = vec![b' '; MAX_RPC_BODY_BYTES + 1];
        let result = normalize_gas_price_request(request(Method::POST, huge)).await;
        assert!(matches!(result, Err(NormalizeError::Body(_))));
    }
}
