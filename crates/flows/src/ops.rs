//! # Feature-Axis Operations
//!
//! Helpers shared by the transforms. Tensors are batch-first, so the first
//! *feature* axis is axis 1; splitting and concatenation happen there.

use ndarray::{concatenate, Array1, Axis, Slice};

use flowgraph_core::tensor::batch_size;
use flowgraph_core::{GraphError, LogJacobian, Shape, Tensor};

/// First axis after the batch axis.
pub const FEATURE_AXIS: Axis = Axis(1);

/// Split `x` along the feature axis into consecutive sections.
pub fn split_features(x: &Tensor, sections: &[usize]) -> Result<Vec<Tensor>, GraphError> {
    let len = feature_len(x)?;
    let total: usize = sections.iter().sum();
    if total != len {
        return Err(GraphError::invalid_shapes(format!(
            "cannot split {len} features into sections {sections:?}"
        )));
    }

    let mut start = 0;
    let parts = sections
        .iter()
        .map(|&n| {
            let part = x
                .slice_axis(FEATURE_AXIS, Slice::from(start..start + n))
                .to_owned();
            start += n;
            part
        })
        .collect();
    Ok(parts)
}

/// Concatenate tensors along the feature axis.
pub fn concat_features(parts: &[Tensor]) -> Result<Tensor, GraphError> {
    let views: Vec<_> = parts.iter().map(|t| t.view()).collect();
    concatenate(FEATURE_AXIS, &views)
        .map_err(|e| GraphError::invalid_shapes(format!("cannot concatenate features: {e}")))
}

/// Length of the feature axis of a batched tensor.
pub fn feature_len(x: &Tensor) -> Result<usize, GraphError> {
    if x.ndim() < 2 {
        return Err(GraphError::invalid_shapes(format!(
            "expected a tensor with a feature axis, got rank {}",
            x.ndim()
        )));
    }
    Ok(x.len_of(FEATURE_AXIS))
}

/// The one input tensor of a single-input transform.
pub(crate) fn single_input(inputs: &[Tensor]) -> Result<&Tensor, GraphError> {
    match inputs {
        [x] => Ok(x),
        _ => Err(GraphError::ArityMismatch {
            what: "input",
            expected: 1,
            got: inputs.len(),
        }),
    }
}

/// The one input shape of a single-input transform, which must have a
/// feature axis.
pub(crate) fn single_feature_shape<'a>(
    transform: &str,
    input_shapes: &'a [Shape],
) -> Result<&'a Shape, GraphError> {
    match input_shapes {
        [shape] if shape.rank() >= 1 => Ok(shape),
        [shape] => Err(GraphError::invalid_shapes(format!(
            "{transform} needs a feature axis, got sample shape {shape}"
        ))),
        _ => Err(GraphError::invalid_shapes(format!(
            "{transform} takes one input, got {}",
            input_shapes.len()
        ))),
    }
}

/// Zero log-Jacobian sized from the first tensor, if tracking is on.
pub(crate) fn volume_preserving(tensors: &[Tensor], jac: bool) -> Option<LogJacobian> {
    jac.then(|| Array1::zeros(tensors.first().map(batch_size).unwrap_or(0)))
}

/// Reproducible pseudo-random numbers for weight initialization.
///
/// Linear congruential generator, x_{n+1} = a·x_n + 1 (mod 2^64).
#[derive(Debug, Clone)]
pub(crate) struct Lcg {
    state: u64,
}

impl Lcg {
    pub(crate) fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        self.state
    }

    /// Uniform in [-1, 1].
    pub(crate) fn uniform(&mut self) -> f32 {
        ((self.next_u64() >> 33) as f32 / (u32::MAX as f32 / 2.0)) * 2.0 - 1.0
    }

    /// Uniform integer in `0..n` (`n > 0`).
    pub(crate) fn below(&mut self, n: usize) -> usize {
        ((self.next_u64() >> 33) % n as u64) as usize
    }
}
