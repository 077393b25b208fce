//! JSON-RPC 2.0 envelope used on the stdio wire.
//!
//! Payloads and error objects come from `rmcp::model`. The envelope is local because a parse
//! error has to be answered with a `null` id, which `rmcp::model::RequestId` cannot carry.

use rmcp::model::ErrorData;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Incoming request. `id` is kept verbatim (number, string, or null).
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    /// Parse one input line. Only JSON objects are accepted as envelopes.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

/// Outgoing response; exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorData>,
}

impl RpcResponse {
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Value, error: ErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// `tools/call` params. A missing `name` reads as the empty string and falls through to the
/// tool lookup. `arguments` distinguishes absent (`None`) from an explicit `null`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "present")]
    pub arguments: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
