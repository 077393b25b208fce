//! Tool execution: turn a tool call into one outbound HTTP request.
//!
//! Path parameters are substituted into the path template, query parameters are appended to the
//! URL, and a `body` argument (when the operation accepts a JSON body) is sent as the JSON payload.
//! Arguments that match none of these are ignored. Any completed HTTP exchange counts as success,
//! whatever its status code; only transport-level failures are errors.

use crate::config::ToolSourceConfig;
use crate::error::{OpenApiToolsError, Result};
use crate::generator::{BODY_ARGUMENT, ResolvedOperation, ToolRegistry};
use crate::spec::{HttpMethod, ParameterLocation};
use reqwest::{Client, Method};
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Executes tool calls against the HTTP API described by the registry's spec.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    client: Client,
    base_url: String,
    timeout: Option<Duration>,
}

#[derive(Debug)]
struct PreparedRequest {
    method: Method,
    url: Url,
    body: Option<Value>,
}

impl ToolExecutor {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, config: &ToolSourceConfig) -> Self {
        let base_url = config.base_url_for(registry.spec());
        Self {
            registry,
            client: Client::new(),
            base_url,
            timeout: config.timeout(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a tool call. An explicit `null` for `arguments` is treated as `{}`; absent
    /// arguments are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the tool name is unknown
    /// - `arguments` is absent or is neither an object nor `null`
    /// - the request method or URL is invalid
    /// - the outbound HTTP exchange fails (connection error or timeout)
    pub async fn execute(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        let operation = self
            .registry
            .resolve(name)
            .ok_or_else(|| OpenApiToolsError::ToolNotFound(name.to_string()))?;

        let arguments = match arguments {
            None => {
                return Err(OpenApiToolsError::InvalidArguments(
                    "missing arguments object".to_string(),
                ));
            }
            Some(Value::Null) => JsonObject::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(OpenApiToolsError::InvalidArguments(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )));
            }
        };

        let prepared = self.prepare(&operation, arguments)?;
        tracing::debug!(
            tool = %name,
            method = %prepared.method,
            url = %redact_url(&prepared.url),
            "Calling upstream"
        );

        let mut request = self.client.request(prepared.method, prepared.url);
        if let Some(body) = &prepared.body {
            request = request.json(body);
        }
        if let Some(t) = self.timeout {
            request = request.timeout(t);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OpenApiToolsError::Transport(sanitize_reqwest_error(&e)))?;
        let status = response.status();
        tracing::debug!(tool = %name, status = status.as_u16(), "Upstream responded");

        Ok(CallToolResult::success(vec![Content::text(format!(
            "HTTP {} response received",
            status.as_u16()
        ))]))
    }

    fn prepare(
        &self,
        operation: &ResolvedOperation<'_>,
        mut arguments: JsonObject,
    ) -> Result<PreparedRequest> {
        let params = &operation.operation.parameters;

        let mut path = operation.path.to_string();
        for param in params
            .iter()
            .filter(|p| p.location == ParameterLocation::Path)
        {
            if let Some(value) = arguments.remove(&param.name) {
                let placeholder = format!("{{{}}}", param.name);
                path = path.replacen(&placeholder, &value_to_string(&value), 1);
            }
        }

        let raw = format!("{}{}", self.base_url, path);
        let mut url = Url::parse(&raw)
            .map_err(|e| OpenApiToolsError::RequestConstruction(format!("invalid URL '{raw}': {e}")))?;

        let query: Vec<(String, String)> = params
            .iter()
            .filter(|p| p.location == ParameterLocation::Query)
            .filter_map(|p| {
                arguments
                    .remove(&p.name)
                    .map(|value| (p.name.clone(), value_to_string(&value)))
            })
            .collect();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let accepts_body = operation
            .operation
            .request_body
            .as_ref()
            .is_some_and(|b| b.json_schema().is_some());
        let body = if accepts_body {
            arguments.remove(BODY_ARGUMENT)
        } else {
            None
        };

        if !arguments.is_empty() {
            tracing::debug!(
                ignored = ?arguments.keys().collect::<Vec<_>>(),
                "Ignoring unrecognized tool arguments"
            );
        }

        Ok(PreparedRequest {
            method: resolve_http_method(operation.method)?,
            url,
            body,
        })
    }
}

fn resolve_http_method(method: HttpMethod) -> Result<Method> {
    Method::from_bytes(method.as_str().to_uppercase().as_bytes())
        .map_err(|e| OpenApiToolsError::RequestConstruction(format!("invalid method: {e}")))
}

/// Convert a JSON value to a string for URL parameters.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    // Best-effort: drop credentials + query + fragment.
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    if e.is_timeout() {
        msg = format!("timed out: {msg}");
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_spec;
    use serde_json::json;
    use specmill_test_support::{Upstream, pick_unused_port, spawn_upstream};
    use std::time::Duration;

    const SPEC: &str = r#"
openapi: "3.0.0"
info:
  title: Petstore
  version: "1"
servers:
  - url: http://127.0.0.1:1
paths:
  /pets:
    get:
      operationId: listPets
      parameters:
        - name: limit
          in: query
          schema: { type: integer }
        - name: tag
          in: query
          schema: { type: string }
    post:
      operationId: createPet
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              properties:
                name: { type: string }
  /pets/{petId}:
    get:
      operationId: showPetById
      parameters:
        - name: petId
          in: path
          required: true
          schema: { type: string }
        - name: petId
          in: header
    delete:
      operationId: deletePet
      parameters:
        - name: petId
          in: path
          required: true
  /missing:
    get:
      operationId: missingThing
"#;

    fn executor(base_url: Option<String>) -> ToolExecutor {
        let spec = parse_spec(SPEC, "inline").unwrap();
        let registry = Arc::new(ToolRegistry::generate(Arc::new(spec)).unwrap());
        ToolExecutor::new(
            registry,
            &ToolSourceConfig {
                base_url,
                timeout_secs: Some(10),
            },
        )
    }

    fn prepare(executor: &ToolExecutor, name: &str, args: Value) -> PreparedRequest {
        let op = executor.registry().resolve(name).unwrap();
        let Value::Object(args) = args else {
            panic!("args must be an object")
        };
        executor.prepare(&op, args).unwrap()
    }

    fn text_of(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).unwrap();
        value["content"][0]["text"].as_str().unwrap().to_string()
    }

    const WAIT: Duration = Duration::from_secs(5);

    async fn upstream_executor() -> (Upstream, ToolExecutor) {
        let upstream = spawn_upstream().await.unwrap();
        let exec = executor(Some(upstream.base_url.clone()));
        (upstream, exec)
    }

    #[test]
    fn base_url_defaults_to_first_server() {
        assert_eq!(executor(None).base_url(), "http://127.0.0.1:1");
        assert_eq!(
            executor(Some("http://localhost:8080/api".into())).base_url(),
            "http://localhost:8080/api"
        );
    }

    #[test]
    fn path_parameters_are_substituted() {
        let exec = executor(Some("http://localhost/api".into()));
        let req = prepare(&exec, "showPetById", json!({"petId": "42"}));
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.url.as_str(), "http://localhost/api/pets/42");
        assert!(req.body.is_none());
    }

    #[test]
    fn non_string_values_use_their_textual_form() {
        let exec = executor(None);
        let req = prepare(&exec, "deletePet", json!({"petId": 7}));
        assert_eq!(req.method, Method::DELETE);
        assert_eq!(req.url.path(), "/pets/7");

        let req = prepare(&exec, "listPets", json!({"limit": 10, "tag": true}));
        assert_eq!(req.url.query(), Some("limit=10&tag=true"));
    }

    #[test]
    fn query_parameters_are_appended_and_unknown_arguments_ignored() {
        let exec = executor(None);
        let req = prepare(
            &exec,
            "listPets",
            json!({"limit": 5, "unknown": "x", "body": {"a": 1}}),
        );
        assert_eq!(req.url.query(), Some("limit=5"));
        assert!(req.body.is_none());
    }

    #[test]
    fn missing_path_argument_leaves_placeholder() {
        let exec = executor(None);
        let req = prepare(&exec, "showPetById", json!({}));
        assert_eq!(req.url.path(), "/pets/%7BpetId%7D");
    }

    #[test]
    fn body_argument_is_forwarded_for_json_bodies() {
        let exec = executor(None);
        let req = prepare(&exec, "createPet", json!({"body": {"name": "rex"}}));
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.body, Some(json!({"name": "rex"})));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let err = executor(None)
            .execute("nope", Some(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::ToolNotFound(_)));
        assert_eq!(err.to_string(), "tool not found: nope");
    }

    #[tokio::test]
    async fn non_object_arguments_are_rejected() {
        let err = executor(None)
            .execute("listPets", Some(json!(["a"])))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn absent_arguments_are_rejected_but_null_is_empty() {
        let exec = executor(Some(String::new()));
        let err = exec.execute("listPets", None).await.unwrap_err();
        assert!(matches!(err, OpenApiToolsError::InvalidArguments(_)));

        let err = exec
            .execute("listPets", Some(Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::RequestConstruction(_)));
    }

    #[tokio::test]
    async fn empty_base_url_is_a_request_construction_error() {
        let exec = executor(Some(String::new()));
        let err = exec
            .execute("listPets", Some(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::RequestConstruction(_)));
    }

    #[tokio::test]
    async fn connection_failure_is_a_transport_error() {
        let port = pick_unused_port().unwrap();
        let exec = executor(Some(format!("http://127.0.0.1:{port}")));
        let err = exec
            .execute("listPets", Some(json!({"limit": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::Transport(_)));
        assert!(!err.to_string().contains("limit=1"));
    }

    #[tokio::test]
    async fn get_pet_by_id_reports_status() {
        let (mut upstream, exec) = upstream_executor().await;

        let result = exec
            .execute("showPetById", Some(json!({"petId": "42"})))
            .await
            .unwrap();
        assert_eq!(text_of(&result), "HTTP 200 response received");

        let req = upstream.next_request(WAIT).await.unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/pets/42");
    }

    #[tokio::test]
    async fn body_and_query_reach_upstream() {
        let (mut upstream, exec) = upstream_executor().await;

        exec.execute("listPets", Some(json!({"limit": 3, "tag": "dog"})))
            .await
            .unwrap();
        let req = upstream.next_request(WAIT).await.unwrap();
        assert_eq!(req.query.as_deref(), Some("limit=3&tag=dog"));

        exec.execute("createPet", Some(json!({"body": {"name": "rex"}})))
            .await
            .unwrap();
        let req = upstream.next_request(WAIT).await.unwrap();
        assert_eq!(req.method, "POST");
        let sent: Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(sent, json!({"name": "rex"}));
    }

    #[tokio::test]
    async fn error_status_is_still_a_completed_exchange() {
        let (_upstream, exec) = upstream_executor().await;

        let result = exec
            .execute("missingThing", Some(json!({})))
            .await
            .unwrap();
        assert_eq!(text_of(&result), "HTTP 404 response received");
    }
}
