//! `OpenAPI` operation → MCP tool generation.
//!
//! Every operation with a non-empty `operationId` becomes one tool named after it. The registry
//! keeps the tools in generation order together with an index back to the originating
//! `(path, method)` so that `tools/call` can find the operation again.

use crate::error::{OpenApiToolsError, Result};
use crate::schema::SchemaTranslator;
use crate::spec::{HttpMethod, OpenApiSpec, Operation, Parameter, ParameterLocation};
use rmcp::model::{JsonObject, Tool};
use serde_json::{Value, json};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// Argument name carrying the JSON request body.
pub const BODY_ARGUMENT: &str = "body";

#[derive(Debug, Clone, PartialEq, Eq)]
struct OperationKey {
    path: String,
    method: HttpMethod,
}

/// An operation looked up by tool name.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedOperation<'a> {
    pub path: &'a str,
    pub method: HttpMethod,
    pub operation: &'a Operation,
}

/// Immutable set of generated tools for one spec.
#[derive(Debug)]
pub struct ToolRegistry {
    spec: Arc<OpenApiSpec>,
    tools: Vec<Tool>,
    index: HashMap<String, OperationKey>,
}

impl ToolRegistry {
    /// Generate one tool per identified operation.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::DuplicateTool`] if two operations share an `operationId`.
    pub fn generate(spec: Arc<OpenApiSpec>) -> Result<Self> {
        let translator = SchemaTranslator::new(&spec);
        let mut tools = Vec::new();
        let mut index: HashMap<String, OperationKey> = HashMap::new();

        for (path, path_item) in &spec.paths {
            for (method, operation) in path_item.operations() {
                if operation.operation_id.is_empty() {
                    tracing::debug!(
                        "Skipping {} {}: no operationId",
                        method.as_str().to_uppercase(),
                        path
                    );
                    continue;
                }

                let name = operation.operation_id.clone();
                let key = OperationKey {
                    path: path.clone(),
                    method,
                };
                if let Some(previous) = index.insert(name.clone(), key) {
                    return Err(OpenApiToolsError::DuplicateTool(format!(
                        "operationId '{name}' is used by both {} {} and {} {}",
                        previous.method.as_str().to_uppercase(),
                        previous.path,
                        method.as_str().to_uppercase(),
                        path
                    )));
                }

                let description = tool_description(operation, method, path);
                let input_schema = build_input_schema(&translator, operation);
                tools.push(Tool::new(name, description, Arc::new(input_schema)));
            }
        }

        tracing::info!(
            "Generated {} tools from OpenAPI spec '{}'",
            tools.len(),
            spec.info.title
        );

        Ok(Self { spec, tools, index })
    }

    /// Tools in generation order.
    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn spec(&self) -> &OpenApiSpec {
        &self.spec
    }

    /// Find the operation behind a tool name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<ResolvedOperation<'_>> {
        let key = self.index.get(name)?;
        let (path, item) = self.spec.paths.get_key_value(&key.path)?;
        let operation = item.operation(key.method)?;
        Some(ResolvedOperation {
            path,
            method: key.method,
            operation,
        })
    }
}

/// Headline is the summary (or `METHOD path`); a description follows on its own line.
#[must_use]
pub fn tool_description(operation: &Operation, method: HttpMethod, path: &str) -> String {
    let mut desc = if operation.summary.is_empty() {
        format!("{} {}", method.as_str().to_uppercase(), path)
    } else {
        operation.summary.clone()
    };
    if !operation.description.is_empty() {
        desc.push('\n');
        desc.push_str(&operation.description);
    }
    desc
}

/// Tool argument name for a parameter. Path and query parameters keep their name; others are
/// prefixed with their location.
#[must_use]
pub fn argument_name(param: &Parameter) -> Cow<'_, str> {
    match param.location {
        ParameterLocation::Path | ParameterLocation::Query => Cow::Borrowed(&param.name),
        other => Cow::Owned(format!("{}_{}", other.as_str(), param.name)),
    }
}

/// Build the tool input schema for an operation.
#[must_use]
pub fn build_input_schema(translator: &SchemaTranslator<'_>, operation: &Operation) -> JsonObject {
    let mut properties = JsonObject::new();
    let mut required: Vec<String> = Vec::new();

    for param in &operation.parameters {
        let mut prop_schema = translator
            .translate(param.schema.as_ref())
            .unwrap_or_else(|| json!({ "type": "string" }));
        // The parameter's description wins over the schema's, even when empty.
        if let Some(obj) = prop_schema.as_object_mut() {
            obj.insert(
                "description".to_string(),
                Value::String(param.description.clone()),
            );
        }

        let name = argument_name(param).into_owned();
        if param.required {
            required.push(name.clone());
        }
        properties.insert(name, prop_schema);
    }

    if let Some(body) = &operation.request_body
        && let Some(body_schema) = translator.translate(body.json_schema())
    {
        properties.insert(BODY_ARGUMENT.to_string(), body_schema);
        if body.required {
            required.push(BODY_ARGUMENT.to_string());
        }
    }

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    schema
}
