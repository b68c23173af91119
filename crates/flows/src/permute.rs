//! Fixed permutation of the first feature axis.

use flowgraph_core::{Direction, GraphError, InvertibleTransform, Shape, Tensor, TransformOutput};

use crate::ops::{feature_len, single_feature_shape, single_input, volume_preserving, Lcg, FEATURE_AXIS};

/// Reorders features: output feature `i` is input feature `perm[i]`.
#[derive(Debug, Clone)]
pub struct Permute {
    perm: Vec<usize>,
    inverse: Vec<usize>,
}

impl Permute {
    /// Use an explicit permutation.
    pub fn factory(
        perm: Vec<usize>,
    ) -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<Permute, GraphError> {
        move |inputs: &[Shape], _: Option<&[Shape]>| Permute::new(perm, inputs)
    }

    /// Reverse the feature order.
    pub fn reverse() -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<Permute, GraphError> {
        |inputs: &[Shape], _: Option<&[Shape]>| {
            let n = feature_count(inputs)?;
            Permute::new((0..n).rev().collect(), inputs)
        }
    }

    /// A reproducible shuffle (Fisher-Yates) drawn from `seed`.
    pub fn random(seed: u64) -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<Permute, GraphError> {
        move |inputs: &[Shape], _: Option<&[Shape]>| {
            let n = feature_count(inputs)?;
            let mut rng = Lcg::new(seed);
            let mut perm: Vec<usize> = (0..n).collect();
            for i in (1..n).rev() {
                perm.swap(i, rng.below(i + 1));
            }
            Permute::new(perm, inputs)
        }
    }

    pub fn new(perm: Vec<usize>, input_shapes: &[Shape]) -> Result<Self, GraphError> {
        let n = feature_count(input_shapes)?;
        if perm.len() != n {
            return Err(GraphError::invalid_parameter(format!(
                "permutation of length {} for {n} features",
                perm.len()
            )));
        }

        let mut inverse = vec![usize::MAX; n];
        for (i, &p) in perm.iter().enumerate() {
            match inverse.get_mut(p) {
                Some(slot) if *slot == usize::MAX => *slot = i,
                _ => {
                    return Err(GraphError::invalid_parameter(format!(
                        "{perm:?} is not a permutation of 0..{n}"
                    )))
                }
            }
        }
        Ok(Self { perm, inverse })
    }

    pub fn permutation(&self) -> &[usize] {
        &self.perm
    }
}

fn feature_count(input_shapes: &[Shape]) -> Result<usize, GraphError> {
    Ok(single_feature_shape("Permute", input_shapes)?
        .leading()
        .unwrap_or(0))
}

impl InvertibleTransform for Permute {
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
        let index = match direction {
            Direction::Forward => &self.perm,
            Direction::Backward => &self.inverse,
        };
        let len = feature_len(x)?;
        if len != index.len() {
            return Err(GraphError::invalid_shapes(format!(
                "permutation of {} features applied to {len}",
                index.len()
            )));
        }
        let y = x.select(FEATURE_AXIS, index);
        Ok(TransformOutput::new(vec![y], volume_preserving(inputs, jac)))
    }

    fn name(&self) -> &str {
        "Permute"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_permute_and_invert() {
        let permute = Permute::new(vec![2, 0, 1], &[Shape::vector(3)]).unwrap();
        let x = array![[10.0f32, 20.0, 30.0]].into_dyn();

        let fwd = permute.evaluate(&[x.clone()], &[], Direction::Forward, true).unwrap();
        assert_eq!(fwd.outputs[0], array![[30.0f32, 10.0, 20.0]].into_dyn());
        assert_eq!(fwd.log_jac, Some(array![0.0f32]));

        let bwd = permute.evaluate(&fwd.outputs, &[], Direction::Backward, true).unwrap();
        assert_eq!(bwd.outputs[0], x);
    }

    #[test]
    fn test_rejects_non_permutations() {
        let shapes = [Shape::vector(3)];
        assert!(Permute::new(vec![0, 0, 1], &shapes).is_err());
        assert!(Permute::new(vec![0, 1, 3], &shapes).is_err());
        assert!(matches!(
            Permute::new(vec![0, 1], &shapes),
            Err(GraphError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_reverse() {
        let permute = Permute::reverse()(&[Shape::vector(4)], None).unwrap();
        assert_eq!(permute.permutation(), &[3, 2, 1, 0]);
    }

    #[test]
    fn test_random_is_a_reproducible_permutation() {
        let a = Permute::random(42)(&[Shape::vector(8)], None).unwrap();
        let b = Permute::random(42)(&[Shape::vector(8)], None).unwrap();
        assert_eq!(a.permutation(), b.permutation());

        let mut sorted = a.permutation().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_permutes_matrix_rows() {
        let permute = Permute::reverse()(&[Shape::matrix(2, 2)], None).unwrap();
        let x = array![[[1.0f32, 2.0], [3.0, 4.0]]].into_dyn();
        let out = permute.evaluate(&[x], &[], Direction::Forward, false).unwrap();
        assert_eq!(out.outputs[0], array![[[3.0f32, 4.0], [1.0, 2.0]]].into_dyn());
    }
}
