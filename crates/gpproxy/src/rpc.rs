//! JSON-RPC message shapes
//!
//! The gateway is payload-agnostic on every route except `/eth/gasprice`, where it
//! has to look inside the request to default the method. These types are only as
//! strict as that rewrite needs: unknown fields are ignored and missing ones fall
//! back to their zero values.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Method injected by the gas-price shortcut when the client did not name one
pub const GAS_PRICE_METHOD: &str = "eth_gasPrice";

/// Ethereum JSON-RPC request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Request identifier, `0` when the client sent none
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: u64,
    /// Protocol version string, left empty when the client sent none
    #[serde(default, deserialize_with = "null_as_default")]
    pub jsonrpc: String,
    /// Method name, empty when the client sent none
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    /// Positional parameters
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Creates a request for `method` with no id, version or params
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into(), ..Default::default() }
    }

    /// Serializes the request to its JSON wire form
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Treats an explicit `null` the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ethereum JSON-RPC response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Identifier of the request this answers
    #[serde(default)]
    pub id: u64,
    /// Protocol version string
    #[serde(default)]
    pub jsonrpc: String,
    /// Call result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Call failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Builds a successful response echoing the id and version of `request`
    pub fn success(request: &RpcRequest, result: impl Into<Value>) -> Self {
        Self {
            id: request.id,
            jsonrpc: request.jsonrpc.clone(),
            result: Some(result.into()),
            error: None,
        }
    }

    /// Builds a failed response echoing the id and version of `request`
    pub fn failure(request: &RpcRequest, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: request.id,
            jsonrpc: request.jsonrpc.clone(),
            result: None,
            error: Some(RpcError { code, message: message.into() }),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code
    pub code: i64,
    /// Human readable description
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_fall_back_to_zero_values() {
        let request: RpcRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, RpcRequest::default());

        let value: Value = serde_json::from_slice(&request.to_bytes().unwrap()).unwrap();
        assert_eq!(value, json!({"id": 0, "jsonrpc": "", "method": "", "params": []}));
    }

    #[test]
    fn test_full_request_is_preserved() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "eth_getBalance",
            "params": ["0x0000000000000000000000000000000000000001", "latest"]
        });
        let request: RpcRequest = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(request.id, 7);
        assert_eq!(request.params.len(), 2);

        let reparsed: Value = serde_json::from_slice(&request.to_bytes().unwrap()).unwrap();
        assert_eq!(reparsed, raw);
    }

    #[test]
    fn test_null_fields_are_treated_as_absent() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"id":null,"jsonrpc":null,"method":null,"params":null}"#)
                .unwrap();
        assert_eq!(request, RpcRequest::default());

        let request: RpcRequest =
            serde_json::from_str(r#"{"method":"eth_gasPrice","params":null}"#).unwrap();
        assert_eq!(request.method, GAS_PRICE_METHOD);
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_string_id_is_rejected() {
        assert!(serde_json::from_str::<RpcRequest>(r#"{"id":"abc"}"#).is_err());
    }

    #[test]
    fn test_response_omits_absent_result_and_error() {
        let request = RpcRequest { id: 3, jsonrpc: "2.0".into(), ..RpcRequest::new(GAS_PRICE_METHOD) };

        let ok = serde_json::to_value(RpcResponse::success(&request, "0xbeef")).unwrap();
        assert_eq!(ok, json!({"id": 3, "jsonrpc": "2.0", "result": "0xbeef"}));

        let failed = serde_json::to_value(RpcResponse::failure(&request, -32601, "nope")).unwrap();
        assert_eq!(
            failed,
            json!({"id": 3, "jsonrpc": "2.0", "error": {"code": -32601, "message": "nope"}})
        );
    }

    #[test]
    fn test_response_accepts_bare_result() {
        let response: RpcResponse = serde_json::from_str(r#"{"result":"0xbeef"}"#).unwrap();
        assert_eq!(response.result, Some(json!("0xbeef")));
        assert!(response.error.is_none());
    }
}
