//! Serializable graph descriptions.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::node::{Node, NodeKind};
use crate::shape::Shape;

/// One node as it appears in a [`GraphSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub name: String,
    /// `input`, `condition`, `output` or `node`
    pub kind: String,
    /// Transform name, for transform nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    pub input_shapes: Vec<Shape>,
    pub condition_shapes: Vec<Shape>,
    pub output_shapes: Vec<Shape>,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        let transform = match node.kind() {
            NodeKind::Transform(t) => Some(t.name().to_string()),
            _ => None,
        };
        Self {
            name: node.name().to_string(),
            kind: node.kind().label().to_string(),
            transform,
            input_shapes: node.input_shapes().to_vec(),
            condition_shapes: node.condition_shapes().to_vec(),
            output_shapes: node.output_shapes().to_vec(),
        }
    }
}

/// One data edge: output `from_slot` of `from` feeds input `to_slot` of `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSummary {
    pub from: String,
    pub from_slot: usize,
    pub to: String,
    pub to_slot: usize,
}

/// Structure of a built graph: nodes in declaration order, data edges,
/// boundary node names and the execution order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: Vec<NodeSummary>,
    pub edges: Vec<EdgeSummary>,
    pub execution_order: Vec<String>,
    pub inputs: Vec<String>,
    pub conditions: Vec<String>,
    pub outputs: Vec<String>,
}

impl GraphSummary {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(self).map_err(|e| GraphError::Config {
            reason: e.to_string(),
        })
    }

    /// Number of transform nodes.
    pub fn transform_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.transform.is_some()).count()
    }
}
