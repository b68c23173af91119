//! Elementwise scaling by a constant factor.

use ndarray::Array1;

use flowgraph_core::tensor::batch_size;
use flowgraph_core::{Direction, GraphError, InvertibleTransform, Shape, Tensor, TransformOutput};

use crate::ops::single_input;

/// `y = a·x` with a fixed, non-zero factor `a`.
///
/// Each sample of `n` elements contributes `n·ln|a|` to the log-Jacobian
/// (negated backward).
#[derive(Debug, Clone)]
pub struct Scale {
    factor: f32,
    numel: usize,
}

impl Scale {
    pub fn factory(factor: f32) -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<Scale, GraphError> {
        move |inputs: &[Shape], _: Option<&[Shape]>| Scale::new(factor, inputs)
    }

    /// Build for the given input shapes (exactly one).
    pub fn new(factor: f32, input_shapes: &[Shape]) -> Result<Self, GraphError> {
        if factor == 0.0 || !factor.is_finite() {
            return Err(GraphError::invalid_parameter(format!(
                "scale factor must be finite and non-zero, got {factor}"
            )));
        }
        let [shape] = input_shapes else {
            return Err(GraphError::invalid_shapes(format!(
                "Scale takes one input, got {}",
                input_shapes.len()
            )));
        };
        Ok(Self {
            factor,
            numel: shape.numel(),
        })
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Forward log-determinant for one sample.
    pub fn log_abs_det(&self) -> f32 {
        self.numel as f32 * self.factor.abs().ln()
    }
}

impl InvertibleTransform for Scale {
    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, GraphError> {
        Ok(input_shapes.to_vec())
    }

    fn evaluate(
        &self,
        inputs: &[Tensor],
        _conditions: &[Tensor],
        direction: Direction,
        jac: bool,
    ) -> Result<TransformOutput, GraphError> {
        let x = single_input(inputs)?;
        let (y, log_det) = match direction {
            Direction::Forward => (x * self.factor, self.log_abs_det()),
            Direction::Backward => (x / self.factor, -self.log_abs_det()),
        };
        let log_jac = jac.then(|| Array1::from_elem(batch_size(x), log_det));
        Ok(TransformOutput::new(vec![y], log_jac))
    }

    fn name(&self) -> &str {
        "Scale"
    }
}
