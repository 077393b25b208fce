//! `OpenAPI` schema → tool input-schema translation.
//!
//! `$ref`s are resolved against `components.schemas` only and are best-effort: anything that
//! cannot be resolved degrades to `{"type": "object"}` instead of failing generation.

use crate::spec::{OpenApiSpec, Schema};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};

/// Nesting limit for a single translation; deeper nodes degrade like an unresolved `$ref`.
pub const MAX_SCHEMA_DEPTH: usize = 64;

/// Translates schema nodes of one document.
#[derive(Debug, Clone, Copy)]
pub struct SchemaTranslator<'a> {
    schemas: Option<&'a IndexMap<String, Schema>>,
}

impl<'a> SchemaTranslator<'a> {
    #[must_use]
    pub fn new(spec: &'a OpenApiSpec) -> Self {
        Self {
            schemas: spec.components.as_ref().map(|c| &c.schemas),
        }
    }

    /// Translate an optional schema node. `None` in, `None` out.
    #[must_use]
    pub fn translate(&self, schema: Option<&Schema>) -> Option<Value> {
        let schema = schema?;
        let mut expanding = Vec::new();
        Some(self.translate_node(schema, &mut expanding, 0))
    }

    fn translate_node(
        &self,
        schema: &Schema,
        expanding: &mut Vec<&'a str>,
        depth: usize,
    ) -> Value {
        if depth >= MAX_SCHEMA_DEPTH {
            tracing::warn!(depth, "schema nesting exceeds limit; truncating to object");
            return degraded();
        }

        if let Some(reference) = schema.reference.as_deref().filter(|r| !r.is_empty()) {
            return self.translate_reference(reference, expanding, depth);
        }

        let mut out = Map::new();
        out.insert("type".to_string(), json!(schema.schema_type));
        if !schema.format.is_empty() {
            out.insert("format".to_string(), json!(schema.format));
        }
        if !schema.description.is_empty() {
            out.insert("description".to_string(), json!(schema.description));
        }
        if !schema.enumeration.is_empty() {
            out.insert("enum".to_string(), Value::Array(schema.enumeration.clone()));
        }

        match schema.schema_type.as_str() {
            "object" if !schema.properties.is_empty() => {
                let properties: Map<String, Value> = schema
                    .properties
                    .iter()
                    .map(|(name, prop)| {
                        (name.clone(), self.translate_node(prop, expanding, depth + 1))
                    })
                    .collect();
                out.insert("properties".to_string(), Value::Object(properties));
                if !schema.required.is_empty() {
                    out.insert("required".to_string(), json!(schema.required));
                }
            }
            "array" => {
                if let Some(items) = &schema.items {
                    out.insert(
                        "items".to_string(),
                        self.translate_node(items, expanding, depth + 1),
                    );
                }
            }
            _ => {}
        }

        Value::Object(out)
    }

    fn translate_reference(
        &self,
        reference: &str,
        expanding: &mut Vec<&'a str>,
        depth: usize,
    ) -> Value {
        let Some((name, target)) = self.lookup(reference) else {
            tracing::debug!(reference, "unresolved $ref; using object schema");
            return degraded();
        };

        if expanding.contains(&name) {
            tracing::warn!(reference, "cyclic $ref; using object schema");
            return degraded();
        }

        expanding.push(name);
        let out = self.translate_node(target, expanding, depth + 1);
        expanding.pop();
        out
    }

    /// Resolve `.../schemas/<Name>` against the component schema table.
    fn lookup(&self, reference: &str) -> Option<(&'a str, &'a Schema)> {
        let segments: Vec<&str> = reference.split('/').collect();
        let [.., container, name] = segments.as_slice() else {
            return None;
        };
        if *container != "schemas" {
            return None;
        }
        let (key, schema) = self.schemas?.get_key_value(*name)?;
        Some((key.as_str(), schema))
    }
}

fn degraded() -> Value {
    json!({ "type": "object" })
}
