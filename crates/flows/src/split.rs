//! # Split and Concat
//!
//! Structural transforms on the first feature axis. [`Split`] turns one
//! edge into several; [`Concat`] joins several edges into one. Each is the
//! other's inverse and neither changes volume.

use flowgraph_core::{Direction, GraphError, InvertibleTransform, Shape, Tensor, TransformOutput};

use crate::ops::{
    concat_features, single_feature_shape, single_input, split_features, volume_preserving,
};

// ============================================================================
// Split
// ============================================================================

/// Split one input into consecutive sections of its first feature axis.
#[derive(Debug, Clone)]
pub struct Split {
    sections: Vec<usize>,
}

impl Split {
    /// Split into sections of the given lengths.
    pub fn factory(
        sections: Vec<usize>,
    ) -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<Split, GraphError> {
        move |inputs: &[Shape], _: Option<&[Shape]>| Split::new(sections, inputs)
    }

    /// Split into two halves; an odd extra element goes to the second half.
    pub fn halves() -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<Split, GraphError> {
        |inputs: &[Shape], _: Option<&[Shape]>| {
            let len = single_feature_shape("Split", inputs)?
                .leading()
                .unwrap_or(0);
            Split::new(vec![len / 2, len - len / 2], inputs)
        }
    }

    /// Split into `parts` sections of equal length.
    pub fn even(parts: usize) -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<Split, GraphError> {
        move |inputs: &[Shape], _: Option<&[Shape]>| {
            let len = single_feature_shape("Split", inputs)?
                .leading()
                .unwrap_or(0);
            if parts == 0 || len % parts != 0 {
                return Err(GraphError::invalid_shapes(format!(
                    "cannot split {len} features into {parts} equal parts"
                )));
            }
            Split::new(vec![len / parts; parts], inputs)
        }
    }

    pub fn new(sections: Vec<usize>, input_shapes: &[Shape]) -> Result<Self, GraphError> {
        let shape = single_feature_shape("Split", input_shapes)?;
        if sections.is_empty() || sections.contains(&0) {
            return Err(GraphError::invalid_parameter(format!(
                "split sections must be non-empty and positive, got {sections:?}"
            )));
        }
        let total: usize = sections.iter().sum();
        if Some(total) != shape.leading() {
            return Err(GraphError::invalid_shapes(format!(
                "sections {sections:?} cover {total} features, input has shape {shape}"
            )));
        }
        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[usize] {
        &self.sections
    }
}

impl InvertibleTransform for Split {
    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, GraphError> {
        let shape = single_feature_shape("Split", input_shapes)?;
        Ok(self
            .sections
            .iter()
            .map(|&n| shape.with_leading(n))
            .collect())
    }

    fn evaluate(
        &self,
        inputs: &[Tensor],
        _conditions: &[Tensor],
        direction: Direction,
        jac: bool,
    ) -> Result<TransformOutput, GraphError> {
        let outputs = match direction {
            Direction::Forward => split_features(single_input(inputs)?, &self.sections)?,
            Direction::Backward => {
                if inputs.len() != self.sections.len() {
                    return Err(GraphError::ArityMismatch {
                        what: "section",
                        expected: self.sections.len(),
                        got: inputs.len(),
                    });
                }
                vec![concat_features(inputs)?]
            }
        };
        Ok(TransformOutput::new(outputs, volume_preserving(inputs, jac)))
    }

    fn name(&self) -> &str {
        "Split"
    }
}

// ============================================================================
// Concat
// ============================================================================

/// Concatenate all inputs along their first feature axis.
///
/// Inputs must agree on every axis after the first feature axis.
#[derive(Debug, Clone)]
pub struct Concat {
    sections: Vec<usize>,
}

impl Concat {
    pub fn factory() -> impl FnOnce(&[Shape], Option<&[Shape]>) -> Result<Concat, GraphError> {
        |inputs: &[Shape], _: Option<&[Shape]>| Concat::new(inputs)
    }

    pub fn new(input_shapes: &[Shape]) -> Result<Self, GraphError> {
        let Some(first) = input_shapes.first() else {
            return Err(GraphError::invalid_shapes("Concat needs at least one input"));
        };
        let mut sections = Vec::with_capacity(input_shapes.len());
        for shape in input_shapes {
            match shape.leading() {
                Some(n) if shape.dims.get(1..) == first.dims.get(1..) => sections.push(n),
                _ => {
                    return Err(GraphError::invalid_shapes(format!(
                        "cannot concatenate {} along the first feature axis",
                        flowgraph_core::shape::display_shapes(input_shapes)
                    )))
                }
            }
        }
        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[usize] {
        &self.sections
    }
}

impl InvertibleTransform for Concat {
    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, GraphError> {
        let first = input_shapes
            .first()
            .ok_or_else(|| GraphError::invalid_shapes("Concat needs at least one input"))?;
        Ok(vec![first.with_leading(self.sections.iter().sum())])
    }

    fn evaluate(
        &self,
        inputs: &[Tensor],
        _conditions: &[Tensor],
        direction: Direction,
        jac: bool,
    ) -> Result<TransformOutput, GraphError> {
        let outputs = match direction {
            Direction::Forward => vec![concat_features(inputs)?],
            Direction::Backward => split_features(single_input(inputs)?, &self.sections)?,
        };
        Ok(TransformOutput::new(outputs, volume_preserving(inputs, jac)))
    }

    fn name(&self) -> &str {
        "Concat"
    }
}
