//! Line-oriented JSON-RPC loop over a byte stream pair.
//!
//! One request per input line, one response per request, written in request order and flushed
//! before the next line is read. Blank lines get no response. Tool calls run to completion before
//! the next line is read, so a slow upstream stalls the whole stream.

use crate::error::{Result, ServerError};
use crate::rpc::{CallToolParams, RpcRequest, RpcResponse};
use rmcp::model::{
    ErrorCode, ErrorData, Implementation, InitializeResult, ListToolsResult, ProtocolVersion,
    ServerCapabilities, ToolsCapability,
};
use serde::Serialize;
use serde_json::Value;
use specmill_openapi_tools::executor::ToolExecutor;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};

pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::V_2025_06_18;
pub const SERVER_NAME: &str = "specmill";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Dispatcher {
    executor: ToolExecutor,
}

impl Dispatcher {
    #[must_use]
    pub fn new(executor: ToolExecutor) -> Self {
        Self { executor }
    }

    /// Serve requests until `reader` reaches end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns an error if reading a line or writing a response fails.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(ServerError::Read)?;
            if n == 0 {
                break;
            }

            let response = match std::str::from_utf8(&buf) {
                Ok(line) => self.handle_line(line).await,
                Err(_) => Some(parse_error()),
            };
            if let Some(response) = response {
                write_response(&mut writer, &response).await?;
            }
        }

        tracing::info!("Input closed; shutting down");
        Ok(())
    }

    /// Handle one raw input line. Returns `None` for blank lines.
    pub async fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match RpcRequest::parse(line) {
            Some(request) => Some(self.handle_request(request).await),
            None => Some(parse_error()),
        }
    }

    pub async fn handle_request(&self, request: RpcRequest) -> RpcResponse {
        tracing::debug!(method = %request.method, id = %request.id, "Handling request");

        match request.method.as_str() {
            "initialize" => Self::handle_initialize(request.id),
            "tools/list" => self.handle_list_tools(request.id),
            "tools/call" => self.handle_call_tool(request.id, request.params).await,
            other => {
                tracing::warn!(method = %other, "Unknown method");
                RpcResponse::failure(
                    request.id,
                    ErrorData::new(ErrorCode::METHOD_NOT_FOUND, "Method not found", None),
                )
            }
        }
    }

    fn handle_initialize(id: Value) -> RpcResponse {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                ..Default::default()
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: None,
                version: SERVER_VERSION.to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: None,
        };
        respond(id, &result)
    }

    fn handle_list_tools(&self, id: Value) -> RpcResponse {
        let result = ListToolsResult::with_all_items(self.executor.registry().tools().to_vec());
        respond(id, &result)
    }

    async fn handle_call_tool(&self, id: Value, params: Option<Value>) -> RpcResponse {
        let params: CallToolParams =
            match serde_json::from_value(params.unwrap_or(Value::Null)) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Invalid tools/call params: {e}");
                    return RpcResponse::failure(
                        id,
                        ErrorData::invalid_params("Invalid params", None),
                    );
                }
            };

        match self.executor.execute(&params.name, params.arguments).await {
            Ok(result) => respond(id, &result),
            Err(e) => {
                tracing::warn!(tool = %params.name, "Tool call failed: {e}");
                RpcResponse::failure(id, ErrorData::internal_error(e.to_string(), None))
            }
        }
    }
}

fn parse_error() -> RpcResponse {
    tracing::warn!("Failed to parse request line");
    RpcResponse::failure(Value::Null, ErrorData::parse_error("Parse error", None))
}

fn respond<T: Serialize>(id: Value, result: &T) -> RpcResponse {
    match serde_json::to_value(result) {
        Ok(v) => RpcResponse::success(id, v),
        Err(e) => RpcResponse::failure(
            id,
            ErrorData::internal_error(format!("failed to encode result: {e}"), None),
        ),
    }
}

async fn write_response<W>(writer: &mut W, response: &RpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer.write_all(&line).await.map_err(ServerError::Write)?;
    writer.flush().await.map_err(ServerError::Write)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use specmill_openapi_tools::config::ToolSourceConfig;
    use specmill_openapi_tools::generator::ToolRegistry;
    use specmill_openapi_tools::spec::parse_spec;
    use std::sync::Arc;

    const SPEC: &str = r#"
openapi: "3.0.0"
info:
  title: Petstore
  version: "1"
paths:
  /pets:
    get:
      operationId: listPets
      summary: List all pets
  /pets/{petId}:
    get:
      operationId: showPetById
      parameters:
        - name: petId
          in: path
          required: true
          schema: { type: string }
"#;

    fn dispatcher() -> Dispatcher {
        let spec = parse_spec(SPEC, "inline").unwrap();
        let registry = Arc::new(ToolRegistry::generate(Arc::new(spec)).unwrap());
        Dispatcher::new(ToolExecutor::new(registry, &ToolSourceConfig::default()))
    }

    async fn call(d: &Dispatcher, line: &str) -> Value {
        let resp = d.handle_line(line).await.expect("response");
        serde_json::to_value(resp).unwrap()
    }

    #[tokio::test]
    async fn initialize_ignores_client_protocol_version() {
        let d = dispatcher();
        let resp = call(
            &d,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"c","version":"0"}}}"#,
        )
        .await;
        assert_eq!(resp["id"], json!(1));
        assert_eq!(resp["result"]["protocolVersion"], json!("2025-06-18"));
        assert_eq!(resp["result"]["capabilities"], json!({"tools": {}}));
        assert_eq!(resp["result"]["serverInfo"]["name"], json!("specmill"));
        assert!(resp.get("error").is_none());
    }

    #[tokio::test]
    async fn tools_list_returns_generation_order() {
        let d = dispatcher();
        let resp = call(&d, r#"{"jsonrpc":"2.0","id":"list","method":"tools/list"}"#).await;
        assert_eq!(resp["id"], json!("list"));
        let names: Vec<_> = resp["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["listPets", "showPetById"]);
        assert_eq!(
            resp["result"]["tools"][1]["inputSchema"]["required"],
            json!(["petId"])
        );
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let d = dispatcher();
        let resp = call(&d, r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#).await;
        assert_eq!(resp["error"]["code"], json!(-32601));
        assert_eq!(resp["id"], json!(3));
        assert!(resp.get("result").is_none());
    }

    #[tokio::test]
    async fn malformed_line_is_parse_error_with_null_id() {
        let d = dispatcher();
        let resp = call(&d, r#"{"jsonrpc":"2.0","id":9,"method":"#).await;
        assert_eq!(resp["error"]["code"], json!(-32700));
        assert_eq!(resp["error"]["message"], json!("Parse error"));
        assert_eq!(resp["id"], Value::Null);
    }

    #[tokio::test]
    async fn blank_lines_get_no_response() {
        let d = dispatcher();
        assert!(d.handle_line("").await.is_none());
        assert!(d.handle_line("   \r").await.is_none());
    }

    #[tokio::test]
    async fn tools_call_with_bad_params_is_invalid_params() {
        let d = dispatcher();
        for params in [r#""#, r#","params":"x""#, r#","params":{"name":5}"#] {
            let line = format!(r#"{{"jsonrpc":"2.0","id":4,"method":"tools/call"{params}}}"#);
            let resp = call(&d, &line).await;
            assert_eq!(resp["error"]["code"], json!(-32602), "params {params:?}");
        }
    }

    #[tokio::test]
    async fn tools_call_without_name_looks_up_empty_tool() {
        let d = dispatcher();
        for params in [r#"{}"#, r#"{"arguments":{}}"#] {
            let line = format!(
                r#"{{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{params}}}"#
            );
            let resp = call(&d, &line).await;
            assert_eq!(resp["error"]["code"], json!(-32603), "params {params}");
            assert_eq!(resp["error"]["message"], json!("tool not found: "));
        }
    }

    #[tokio::test]
    async fn tools_call_without_arguments_is_invalid_arguments() {
        let d = dispatcher();
        let resp = call(
            &d,
            r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"listPets"}}"#,
        )
        .await;
        assert_eq!(resp["error"]["code"], json!(-32603));
        assert!(
            resp["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("invalid arguments")
        );
    }

    #[tokio::test]
    async fn tools_call_with_null_arguments_reaches_request_building() {
        // No base URL is configured, so the call fails later, at URL construction.
        let d = dispatcher();
        let resp = call(
            &d,
            r#"{"jsonrpc":"2.0","id":10,"method":"tools/call","params":{"name":"listPets","arguments":null}}"#,
        )
        .await;
        assert_eq!(resp["error"]["code"], json!(-32603));
        assert!(
            resp["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("failed to create request")
        );
    }

    #[tokio::test]
    async fn tools_call_unknown_tool_is_internal_error() {
        let d = dispatcher();
        let resp = call(
            &d,
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
        )
        .await;
        assert_eq!(resp["error"]["code"], json!(-32603));
        assert_eq!(resp["error"]["message"], json!("tool not found: nope"));
    }

    #[tokio::test]
    async fn tools_call_with_non_object_arguments_is_internal_error() {
        let d = dispatcher();
        let resp = call(
            &d,
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"listPets","arguments":"x"}}"#,
        )
        .await;
        assert_eq!(resp["error"]["code"], json!(-32603));
        assert!(
            resp["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("invalid arguments")
        );
    }

    #[tokio::test]
    async fn serve_writes_one_line_per_request_in_order() {
        let d = dispatcher();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
            "\n\n",
            "garbage\n",
            r#"{"jsonrpc":"2.0","id":"two","method":"tools/list"}"#,
            "\r\n",
            r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#,
        );
        let mut out: Vec<u8> = Vec::new();
        d.serve(input.as_bytes(), &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["id"], json!(1));
        assert_eq!(lines[1]["error"]["code"], json!(-32700));
        assert_eq!(lines[2]["id"], json!("two"));
        assert!(lines[2]["result"]["tools"].is_array());
        assert_eq!(lines[3]["id"], Value::Null);
        assert_eq!(lines[3]["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn serve_answers_invalid_utf8_with_parse_error() {
        let d = dispatcher();
        let input: &[u8] = b"\xff\xfe\n";
        let mut out: Vec<u8> = Vec::new();
        d.serve(input, &mut out).await.unwrap();
        let resp: Value = serde_json::from_slice(out.trim_ascii_end()).unwrap();
        assert_eq!(resp["error"]["code"], json!(-32700));
    }
}
