//! `OpenAPI` → MCP tooling for specmill.
//!
//! Loads an `OpenAPI` document, derives one MCP tool per identified operation, and executes tool
//! calls as outbound HTTP requests. The JSON-RPC surface lives in the `specmill` binary crate.

pub mod config;
pub mod error;
pub mod executor;
pub mod generator;
pub mod schema;
pub mod spec;
