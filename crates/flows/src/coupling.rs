//! # Affine Coupling
//!
//! RealNVP-style coupling block on vector samples. The input is split into
//! `x1` (first half) and `x2` (second half); `x1` passes through unchanged
//! and parameterizes an affine map of `x2`:
//!
//! ```text
//! h  = [x1, c_1, ..., c_k]
//! s  = clamp · tanh(Ws · h)
//! t  = Wt · h
//! y2 = x2 · exp(s) + t            (backward: x2 = (y2 - t) · exp(-s))
//! ```
//!
//! The Jacobian is triangular, so its log-determinant is `Σ s` per sample.
//! Because `y1 = x1`, the backward pass can recompute `h` from its input.
//!
//! The conditioner is a single linear layer with fixed weights; there is
//! no training here.

use ndarray::{concatenate, s, Array2, ArrayView2, Axis, Ix2};

use flowgraph_core::{Direction, GraphError, InvertibleTransform, Shape, Tensor, TransformOutput};

use crate::ops::{single_input, Lcg};

/// Affine coupling with a linear conditioner.
#[derive(Debug, Clone)]
pub struct AffineCoupling {
    /// Length of the pass-through half `x1`.
    split: usize,
    /// `(len(x2), len(h))`
    ws: Array2<f32>,
    /// `(len(x2), len(h))`
    wt: Array2<f32>,
    clamp: f32,
}

/// Sizes derived from the input and condition shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    split: usize,
    transformed: usize,
    conditioner: usize,
}

impl Layout {
    fn new(input_shapes: &[Shape], condition_shapes: &[Shape]) -> Result<Self, GraphError> {
        let len = match input_shapes {
            [shape] if shape.rank() == 1 && shape.numel() >= 2 => shape.numel(),
            _ => {
                return Err(GraphError::invalid_shapes(format!(
                    "AffineCoupling takes one vector input of length >= 2, got {}",
                    flowgraph_core::shape::display_shapes(input_shapes)
                )))
            }
        };
        if let Some(bad) = condition_shapes.iter().find(|c| c.rank() != 1) {
            return Err(GraphError::invalid_shapes(format!(
                "AffineCoupling conditions must be vectors, got {bad}"
            )));
        }
        let split = len / 2;
        let cond: usize = condition_shapes.iter().map(Shape::numel).sum();
        Ok(Self {
            split,
            transformed: len - split,
            conditioner: split + cond,
        })
    }
}

impl AffineCoupling {
    /// Coupling with reproducible pseudo-random weights drawn from `seed`.
    pub fn factory(
        clamp: f32,
        seed: u64,
    ) -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<AffineCoupling, GraphError> {
        move |inputs: &[Shape], conditions: Option<&[Shape]>| {
            let layout = Layout::new(inputs, conditions.unwrap_or(&[]))?;
            let mut rng = Lcg::new(seed);
            let dims = (layout.transformed, layout.conditioner);
            let ws = Array2::from_shape_fn(dims, |_| 0.5 * rng.uniform());
            let wt = Array2::from_shape_fn(dims, |_| 0.5 * rng.uniform());
            AffineCoupling::new(ws, wt, clamp, inputs, conditions.unwrap_or(&[]))
        }
    }

    /// Coupling with explicit conditioner weights.
    pub fn with_weights(
        ws: Array2<f32>,
        wt: Array2<f32>,
        clamp: f32,
    ) -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<AffineCoupling, GraphError> {
        move |inputs: &[Shape], conditions: Option<&[Shape]>| {
            AffineCoupling::new(ws, wt, clamp, inputs, conditions.unwrap_or(&[]))
        }
    }

    pub fn new(
        ws: Array2<f32>,
        wt: Array2<f32>,
        clamp: f32,
        input_shapes: &[Shape],
        condition_shapes: &[Shape],
    ) -> Result<Self, GraphError> {
        if !(clamp > 0.0 && clamp.is_finite()) {
            return Err(GraphError::invalid_parameter(format!(
                "clamp must be positive and finite, got {clamp}"
            )));
        }
        let layout = Layout::new(input_shapes, condition_shapes)?;
        let expected = [layout.transformed, layout.conditioner];
        for (name, w) in [("Ws", &ws), ("Wt", &wt)] {
            if w.shape() != expected {
                return Err(GraphError::invalid_parameter(format!(
                    "{name} has shape {:?}, expected {expected:?}",
                    w.shape()
                )));
            }
        }
        Ok(Self {
            split: layout.split,
            ws,
            wt,
            clamp,
        })
    }

    /// `(s, t)` for a batch of conditioner inputs `h`.
    fn scale_and_shift(&self, h: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
        let clamp = self.clamp;
        let s = h.dot(&self.ws.t()).mapv(|v| clamp * v.tanh());
        let t = h.dot(&self.wt.t());
        (s, t)
    }
}

fn as_matrix(tensor: &Tensor) -> Result<ArrayView2<'_, f32>, GraphError> {
    tensor
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|e| GraphError::invalid_shapes(format!("expected batched vectors: {e}")))
}

fn shape_error(e: ndarray::ShapeError) -> GraphError {
    GraphError::invalid_shapes(e.to_string())
}

impl InvertibleTransform for AffineCoupling {
    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, GraphError> {
        Ok(input_shapes.to_vec())
    }

    fn evaluate(
        &self,
        inputs: &[Tensor],
        conditions: &[Tensor],
        direction: Direction,
        jac: bool,
    ) -> Result<TransformOutput, GraphError> {
        let x = as_matrix(single_input(inputs)?)?;
        let width = self.split + self.ws.nrows();
        if x.ncols() != width {
            return Err(GraphError::invalid_shapes(format!(
                "AffineCoupling expects {width} features, got {}",
                x.ncols()
            )));
        }
        let x1 = x.slice(s![.., ..self.split]);
        let x2 = x.slice(s![.., self.split..]);

        let mut parts = vec![x1];
        for c in conditions {
            parts.push(as_matrix(c)?);
        }
        let h = concatenate(Axis(1), &parts).map_err(shape_error)?;
        if h.ncols() != self.ws.ncols() {
            return Err(GraphError::invalid_shapes(format!(
                "AffineCoupling conditioner expects {} features, got {}",
                self.ws.ncols(),
                h.ncols()
            )));
        }
        let (s, t) = self.scale_and_shift(&h);

        let (y2, sign) = match direction {
            Direction::Forward => (&x2 * &s.mapv(f32::exp) + &t, 1.0f32),
            Direction::Backward => ((&x2 - &t) * &s.mapv(|v| (-v).exp()), -1.0f32),
        };
        let y = concatenate(Axis(1), &[x1, y2.view()])
            .map_err(shape_error)?
            .into_dyn();
        let log_jac = jac.then(|| s.sum_axis(Axis(1)) * sign);

        Ok(TransformOutput::new(vec![y], log_jac))
    }

    fn name(&self) -> &str {
        "AffineCoupling"
    }
}
