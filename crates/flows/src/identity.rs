//! Identity transform.

use flowgraph_core::{Direction, GraphError, InvertibleTransform, Shape, Tensor, TransformOutput};

use crate::ops::volume_preserving;

/// Passes every input through unchanged; log-Jacobian is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Identity {
    /// Accepts any number of inputs and ignores conditions.
    pub fn factory() -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<Identity, GraphError> {
        |_: &[Shape], _: Option<&[Shape]>| Ok(Identity)
    }
}

impl InvertibleTransform for Identity {
    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, GraphError> {
        Ok(input_shapes.to_vec())
    }

    fn evaluate(
        &self,
        inputs: &[Tensor],
        _conditions: &[Tensor],
        _direction: Direction,
        jac: bool,
    ) -> Result<TransformOutput, GraphError> {
        Ok(TransformOutput::new(
            inputs.to_vec(),
            volume_preserving(inputs, jac),
        ))
    }

    fn name(&self) -> &str {
        "Identity"
    }
}
