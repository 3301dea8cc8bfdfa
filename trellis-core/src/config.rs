//! Graph Configuration
//!
//! Settings a graph is created with. Every field has a default, so a JSON
//! document only needs the keys it changes:
//!
//! ```json
//! { "name": "pricing", "debug": true, "default_input_policy": "add_one" }
//! ```

use serde::{Deserialize, Serialize};

use crate::graph::MissingInputPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Name used in logs and snapshots.
    pub name: String,

    /// Log every node evaluation at `debug` instead of `trace`.
    pub debug: bool,

    /// Policy for nodes that don't set their own.
    pub default_input_policy: MissingInputPolicy,

    /// Prefix of inputs created by the missing-input policy.
    pub input_prefix: String,

    /// Key of the output of source nodes and base key of paired outputs.
    pub output_name: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            name: "graph".to_string(),
            debug: false,
            default_input_policy: MissingInputPolicy::Reject,
            input_prefix: "input".to_string(),
            output_name: "result".to_string(),
        }
    }
}

impl GraphConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_input_policy(mut self, policy: MissingInputPolicy) -> Self {
        self.default_input_policy = policy;
        self
    }
}
