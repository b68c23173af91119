//! # The Transform Contract
//!
//! A flow graph does not know any concrete transformation. Each
//! [`Transform`](crate::node::NodeKind::Transform) node wraps a value
//! implementing [`InvertibleTransform`], built once at construction time by a
//! factory that sees the node's input (and condition) shapes.
//!
//! ## Construction
//!
//! ```text
//! factory(input_shapes, condition_shapes?) -> transform
//! transform.output_shapes(input_shapes)    -> output_shapes
//! ```
//!
//! ## Execution
//!
//! ```text
//! transform.evaluate(inputs, conditions, direction, jac) -> (outputs, log_jac?)
//! ```
//!
//! `outputs` must hold one tensor per edge the node produces in that
//! direction, and `log_jac` must be present exactly when `jac` is set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::shape::Shape;
use crate::tensor::{LogJacobian, Tensor};

/// Which way data flows through the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Data to latent: inputs to outputs.
    #[default]
    Forward,
    /// Latent to data: outputs to inputs.
    Backward,
}

impl Direction {
    /// True for [`Direction::Backward`].
    pub fn is_backward(self) -> bool {
        matches!(self, Direction::Backward)
    }

    /// The opposite direction.
    pub fn reversed(self) -> Direction {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// What a transform returns from one evaluation.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// One tensor per produced edge, in slot order.
    pub outputs: Vec<Tensor>,
    /// Log-determinant of the Jacobian, present iff tracking was requested.
    pub log_jac: Option<LogJacobian>,
}

impl TransformOutput {
    pub fn new(outputs: Vec<Tensor>, log_jac: Option<LogJacobian>) -> Self {
        Self { outputs, log_jac }
    }
}

/// A reversible transformation with a fixed number of inputs and outputs.
///
/// Implementations must be pure with respect to `evaluate`: the graph may call
/// it any number of times, in either direction.
pub trait InvertibleTransform: fmt::Debug {
    /// Per-sample output shapes for the given per-sample input shapes.
    ///
    /// Called once, when the owning node is constructed.
    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, GraphError>;

    /// Run the transform.
    ///
    /// In [`Direction::Forward`] `inputs` are the node's inputs and the result
    /// holds its outputs; in [`Direction::Backward`] it is the other way round.
    /// `conditions` is empty for unconditioned nodes.
    fn evaluate(
        &self,
        inputs: &[Tensor],
        conditions: &[Tensor],
        direction: Direction,
        jac: bool,
    ) -> Result<TransformOutput, GraphError>;

    /// Short name used in node descriptions.
    fn name(&self) -> &str {
        "Transform"
    }
}

/// Boxed transform factory as stored by a pending node.
pub(crate) type TransformFactory = Box<
    dyn FnOnce(&[Shape], Option<&[Shape]>) -> Result<Box<dyn InvertibleTransform>, GraphError>,
>;

/// Erase the concrete transform type of a factory.
pub(crate) fn boxed_factory<F, T>(factory: F) -> TransformFactory
where
    F: FnOnce(&[Shape], Option<&[Shape]>) -> Result<T, GraphError> + 'static,
    T: InvertibleTransform + 'static,
{
    Box::new(move |inputs: &[Shape], conditions: Option<&[Shape]>| {
        factory(inputs, conditions).map(|t| Box::new(t) as Box<dyn InvertibleTransform>)
    })
}
