//! # Shapes - Per-Sample Tensor Dimensions
//!
//! Every edge in a flow graph carries a tensor whose leading axis is the
//! batch. A [`Shape`] describes everything *after* that axis, so `(2,)`
//! means "a batch of 2-vectors" and `()` means "a batch of scalars".
//!
//! Shapes are checked at two points:
//!
//! - **Construction**: a node's input shapes are read from its producers'
//!   output shapes, and its own output shapes come from its transform.
//! - **Execution**: boundary tensors and transform outputs are compared
//!   against the declared shapes (see `GraphConfig::check_shapes`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dimensions of a single sample (the batch axis is not included).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape {
    /// Dimension sizes (empty = scalar, [n] = vector, [m, n] = matrix, etc.)
    pub dims: Vec<usize>,
}

impl Shape {
    /// Create a shape from its dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Create a scalar shape (0-dimensional).
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    /// Create a vector shape (1-dimensional).
    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    /// Create a matrix shape (2-dimensional).
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    /// Number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements in one sample.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Size of the first feature axis, if there is one.
    pub fn leading(&self) -> Option<usize> {
        self.dims.first().copied()
    }

    /// Copy of this shape with the first feature axis replaced.
    ///
    /// Scalars have no feature axis and are returned unchanged.
    pub fn with_leading(&self, len: usize) -> Shape {
        let mut dims = self.dims.clone();
        if let Some(first) = dims.first_mut() {
            *first = len;
        }
        Shape { dims }
    }

    /// Shape of a batched tensor with `batch` samples of this shape.
    pub fn batched(&self, batch: usize) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.dims.len() + 1);
        dims.push(batch);
        dims.extend_from_slice(&self.dims);
        dims
    }

    /// Check if this shape can be wired to another.
    pub fn is_compatible(&self, other: &Shape) -> bool {
        self == other
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self { dims }
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self {
            dims: dims.to_vec(),
        }
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self {
            dims: dims.to_vec(),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dims.as_slice() {
            [] => write!(f, "()"),
            [single] => write!(f, "({single},)"),
            dims => write!(
                f,
                "({})",
                dims.iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Render a list of shapes as `[(2,), (3, 4)]`.
pub fn display_shapes(shapes: &[Shape]) -> String {
    format!(
        "[{}]",
        shapes
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.numel(), 1);
        assert_eq!(s.to_string(), "()");
    }

    #[test]
    fn test_vector_shape() {
        let v = Shape::vector(10);
        assert_eq!(v.rank(), 1);
        assert_eq!(v.numel(), 10);
        assert_eq!(v.to_string(), "(10,)");
    }

    #[test]
    fn test_matrix_shape() {
        let m = Shape::matrix(3, 4);
        assert_eq!(m.rank(), 2);
        assert_eq!(m.numel(), 12);
        assert_eq!(m.to_string(), "(3, 4)");
    }

    #[test]
    fn test_leading_axis() {
        let m = Shape::matrix(3, 4);
        assert_eq!(m.leading(), Some(3));
        assert_eq!(m.with_leading(5), Shape::matrix(5, 4));
        assert_eq!(Shape::scalar().leading(), None);
        assert_eq!(Shape::scalar().with_leading(5), Shape::scalar());
    }

    #[test]
    fn test_batched_dims() {
        assert_eq!(Shape::from([2, 3]).batched(8), vec![8, 2, 3]);
        assert_eq!(Shape::scalar().batched(4), vec![4]);
    }

    #[test]
    fn test_shape_compatibility() {
        let a = Shape::vector(10);
        let b = Shape::from(vec![10]);
        let c = Shape::vector(20);

        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
    }

    #[test]
    fn test_display_shapes() {
        let shapes = vec![Shape::vector(2), Shape::matrix(3, 4)];
        assert_eq!(display_shapes(&shapes), "[(2,), (3, 4)]");
        assert_eq!(display_shapes(&[]), "[]");
    }

    #[test]
    fn test_serde_transparent() {
        let s: Shape = serde_json::from_str("[2, 3]").unwrap();
        assert_eq!(s, Shape::matrix(2, 3));
        assert_eq!(serde_json::to_string(&s).unwrap(), "[2,3]");
    }
}
