use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::spec::OpenApiSpec;

/// Runtime settings for a spec-backed tool source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSourceConfig {
    /// Override base URL from spec.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-call timeout in seconds. `None` or `0` waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ToolSourceConfig {
    /// Effective outbound call timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            None | Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        }
    }

    /// Base URL prefixed to every request path: the override if set, else the spec's first server.
    #[must_use]
    pub fn base_url_for(&self, spec: &OpenApiSpec) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| spec.first_server_url().to_string())
    }
}
