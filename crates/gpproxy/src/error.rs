//! Error types and the JSON error envelope
//!
//! Every failure a caller can observe over HTTP is rendered as
//! `{"error": "<message>"}` with a JSON content type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::error::Error as StdError;
use thiserror::Error;

/// Errors raised while setting up or running the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// An upstream address could not be used
    #[error("node: invalid {kind} address {address:?}: {reason}")]
    InvalidAddress {
        /// Which upstream the address is for (`http` or `ws`)
        kind: &'static str,
        /// The address as configured
        address: String,
        /// Why it was rejected
        reason: String,
    },

    /// The HTTP upstream could not be reached or did not answer
    #[error("{}", error_chain(.0))]
    Upstream(#[from] reqwest::Error),

    /// The outbound HTTP client could not be built
    #[error("node: failed to build http client: {0}")]
    Client(reqwest::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
    }
}

/// Errors raised while normalizing a gas-price shortcut request
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The request body could not be read
    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),

    /// The request body is not a JSON-RPC request
    #[error("invalid rpc request: {0}")]
    InvalidRequest(#[from] serde_json::Error),
}

impl IntoResponse for NormalizeError {
    fn into_response(self) -> Response {
        error_response(StatusCode::BAD_REQUEST, self.to_string())
    }
}

/// Renders the JSON error envelope
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Joins an error with all of its sources, `outer: inner: root`.
pub(crate) fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;
    use std::{fmt, io};

    #[derive(Debug)]
    struct Wrapper(io::Error);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "error sending request")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let error = Wrapper(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        assert_eq!(error_chain(&error), "error sending request: connection refused");
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let response = error_response(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["content-type"], "application/json");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({"error": "boom"}));
    }

    #[tokio::test]
    async fn test_normalize_error_is_bad_request() {
        let parse_error = serde_json::from_str::<Value>("{").unwrap_err();
        let response = NormalizeError::from(parse_error).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
