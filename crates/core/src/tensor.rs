//! Batched tensors as they travel along graph edges.
//!
//! Tensor math is delegated to `ndarray`. Axis 0 is always the batch.

use ndarray::{Array1, ArrayD, Axis};

use crate::shape::Shape;

/// A batch of samples; axis 0 is the batch axis.
pub type Tensor = ArrayD<f32>;

/// Log-determinant of the Jacobian, one value per batch element.
pub type LogJacobian = Array1<f32>;

/// Number of samples in a batched tensor (0 for a rank-0 array).
pub fn batch_size(tensor: &Tensor) -> usize {
    if tensor.ndim() == 0 {
        0
    } else {
        tensor.len_of(Axis(0))
    }
}

/// Per-sample shape of a batched tensor.
pub fn sample_shape(tensor: &Tensor) -> Shape {
    Shape::from(tensor.shape().get(1..).unwrap_or(&[]))
}

/// A zero log-Jacobian for `batch` samples.
pub fn zero_log_jacobian(batch: usize) -> LogJacobian {
    Array1::zeros(batch)
}
