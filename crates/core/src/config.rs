//! Graph configuration.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Settings fixed when a graph is built.
///
/// Missing fields take their defaults, so `{}` is a valid document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Return a tuple even when the graph has a single end node.
    pub force_tuple_output: bool,
    /// Check boundary tensors and transform outputs against declared shapes.
    pub check_shapes: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            force_tuple_output: false,
            check_shapes: true,
        }
    }
}

impl GraphConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json).map_err(|e| GraphError::Config {
            reason: e.to_string(),
        })
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string(self).map_err(|e| GraphError::Config {
            reason: e.to_string(),
        })
    }

    pub fn with_force_tuple_output(mut self, force: bool) -> Self {
        self.force_tuple_output = force;
        self
    }

    pub fn with_check_shapes(mut self, check: bool) -> Self {
        self.check_shapes = check;
        self
    }
}
