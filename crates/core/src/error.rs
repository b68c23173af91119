//! # Error Types
//!
//! Every failure in a flow graph is fail-fast: construction errors abort
//! graph assembly, execution errors abort the call at the first offending
//! node. Errors carry the node name so that a broken transform in a large
//! graph can be located without a debugger.

use thiserror::Error;

use crate::node::{EdgeRef, NodeId};
use crate::shape::Shape;

/// Errors for graph construction and execution.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------
    /// The input specification of a node could not be canonicalized.
    #[error("cannot parse inputs provided to node '{node}': {reason}")]
    MalformedInputs { node: String, reason: String },

    /// A node referenced a handle that does not belong to this builder.
    #[error("node '{node}' references unknown node {id}")]
    UnknownNode { node: String, id: NodeId },

    /// An input edge points past the producer's outputs.
    #[error("node '{producer}' has no output slot {slot} (it has {count})")]
    InvalidSlot {
        producer: String,
        slot: usize,
        count: usize,
    },

    /// An output slot was wired to a second consumer.
    #[error("output {slot} of node '{producer}' is already consumed by '{consumer}'")]
    SlotAlreadyConsumed {
        producer: String,
        slot: usize,
        consumer: String,
    },

    /// A boundary node was given inputs or conditions it does not accept.
    #[error("{kind} node '{node}' does not accept {what}")]
    BoundaryViolation {
        node: String,
        kind: &'static str,
        what: &'static str,
    },

    /// A condition reference does not point to a condition node.
    #[error("node '{node}' uses '{condition}' as a condition, but it is not a condition node")]
    NotAConditionNode { node: String, condition: String },

    /// The graph has no input nodes.
    #[error("no input nodes specified")]
    NoInputs,

    /// The graph has no output nodes.
    #[error("no output nodes specified")]
    NoOutputs,

    /// An output slot is never consumed, so it cannot be inverted.
    #[error("output {slot} of node '{node}' is not consumed by any node")]
    DanglingOutput { node: String, slot: usize },

    /// An input node cannot reach any output node.
    #[error("input node {node} is not connected to any output")]
    DisconnectedInput { node: String },

    /// The dependency graph contains a cycle.
    #[error("graph is cyclic: {remaining} dependency edges could not be resolved")]
    Cyclic { remaining: usize },

    /// A transform rejected the shapes it was built for.
    #[error("invalid shapes: {reason}")]
    InvalidShapes { reason: String },

    /// A transform was configured with unusable parameters.
    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------
    /// Wrong number of tensors passed to the graph.
    #[error("expected {expected} {what} tensors, got {got}")]
    ArityMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Boundary tensors disagree on the batch size.
    #[error("tensor for '{node}' has batch size {got}, expected {expected}")]
    BatchMismatch {
        node: String,
        expected: usize,
        got: usize,
    },

    /// A tensor does not have the declared per-sample shape.
    #[error("tensor for '{node}' has sample shape {got}, expected {expected}")]
    TensorShapeMismatch {
        node: String,
        expected: Shape,
        got: Shape,
    },

    /// A transform returned the wrong number of output tensors.
    #[error("node '{node}' returned {got} output tensors, but should return {expected}")]
    OutputCountMismatch {
        node: String,
        expected: usize,
        got: usize,
    },

    /// Jacobian tracking was requested but the transform returned none.
    #[error("node '{node}' returned no log-Jacobian, but Jacobian tracking is enabled")]
    MissingJacobian { node: String },

    /// Jacobian tracking was disabled but the transform returned one.
    #[error("node '{node}' returned a log-Jacobian, but Jacobian tracking is disabled")]
    UnexpectedJacobian { node: String },

    /// The log-Jacobian is not one scalar per batch element.
    #[error("node '{node}' returned a log-Jacobian of length {got}, expected {expected} (one per batch element)")]
    JacobianShape {
        node: String,
        expected: usize,
        got: usize,
    },

    /// A required edge value was never produced.
    #[error("no value for edge {edge}")]
    MissingEdgeValue { edge: EdgeRef },

    /// A transform failed; `source` is its own error.
    #[error("node '{node}': {source}")]
    Node {
        node: String,
        #[source]
        source: Box<GraphError>,
    },

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------
    /// A configuration document could not be read.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl GraphError {
    /// Shorthand for [`GraphError::InvalidShapes`].
    pub fn invalid_shapes(reason: impl Into<String>) -> Self {
        GraphError::InvalidShapes {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`GraphError::InvalidParameter`].
    pub fn invalid_parameter(reason: impl Into<String>) -> Self {
        GraphError::InvalidParameter {
            reason: reason.into(),
        }
    }

    /// Attach a node name to an error raised by that node's transform.
    pub fn in_node(self, node: impl Into<String>) -> Self {
        GraphError::Node {
            node: node.into(),
            source: Box::new(self),
        }
    }

    /// Strip [`GraphError::Node`] wrappers and return the innermost error.
    pub fn root_cause(&self) -> &GraphError {
        match self {
            GraphError::Node { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_node_wraps_and_unwraps() {
        let err = GraphError::invalid_shapes("expected 1 input").in_node("coupling");
        assert_eq!(
            err.to_string(),
            "node 'coupling': invalid shapes: expected 1 input"
        );
        assert_eq!(
            err.root_cause(),
            &GraphError::InvalidShapes {
                reason: "expected 1 input".into()
            }
        );
    }

    #[test]
    fn test_messages_name_the_node() {
        let err = GraphError::OutputCountMismatch {
            node: "split".into(),
            expected: 2,
            got: 1,
        };
        assert!(err.to_string().contains("'split'"));
        assert!(err.to_string().contains("should return 2"));

        let err = GraphError::MissingJacobian {
            node: "scale".into(),
        };
        assert!(err.to_string().contains("'scale'"));
    }
}
