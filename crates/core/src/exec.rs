//! # Forward / Backward Execution
//!
//! One call to [`ReversibleGraph::run`] is a sequential walk over the
//! precomputed execution order, forwards for [`Direction::Forward`] and
//! reversed for [`Direction::Backward`]. The only state is local to the call:
//!
//! - **Edge values**: `EdgeRef -> Tensor`, seeded with the boundary tensors.
//! - **Log-Jacobian**: running per-sample sum, present when `jac` is set.
//!
//! ## Edge routing
//!
//! Forward, a node reads its own input edges and writes `(node, k)` for each
//! output `k`. Backward, a node reads the edges recorded in its consumer list,
//! i.e. the values its consumers wrote for the corresponding input slots, and
//! writes `(node, j)` for each of its inputs `j`. Conditions are always read
//! from `(condition node, 0)`.
//!
//! ## Contract checks
//!
//! Every transform result is checked before it enters the table: output
//! count, per-sample shapes (when `check_shapes` is on), and presence and
//! length of the log-Jacobian.

use std::collections::HashMap;

use crate::error::GraphError;
use crate::graph::ReversibleGraph;
use crate::node::{EdgeRef, Node, NodeId, NodeKind};
use crate::shape::Shape;
use crate::tensor::{batch_size, sample_shape, zero_log_jacobian, LogJacobian, Tensor};
use crate::transform::{Direction, InvertibleTransform, TransformOutput};

/// Flags for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub direction: Direction,
    /// Accumulate the log-determinant of the Jacobian.
    pub jac: bool,
    /// Return the whole edge-value table instead of the end tensors.
    pub intermediate_outputs: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Forward,
            jac: true,
            intermediate_outputs: false,
        }
    }
}

impl RunOptions {
    /// Forward with Jacobian tracking.
    pub fn forward() -> Self {
        Self::default()
    }

    /// Backward with Jacobian tracking.
    pub fn backward() -> Self {
        Self {
            direction: Direction::Backward,
            ..Self::default()
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_jacobian(mut self, jac: bool) -> Self {
        self.jac = jac;
        self
    }

    pub fn with_intermediate_outputs(mut self, intermediate: bool) -> Self {
        self.intermediate_outputs = intermediate;
        self
    }
}

/// Tensor value of every edge touched by one execution.
#[derive(Debug, Clone, Default)]
pub struct EdgeValues {
    values: HashMap<EdgeRef, Tensor>,
}

impl EdgeValues {
    pub fn get(&self, edge: EdgeRef) -> Option<&Tensor> {
        self.values.get(&edge)
    }

    pub fn contains(&self, edge: EdgeRef) -> bool {
        self.values.contains_key(&edge)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EdgeRef, &Tensor)> {
        self.values.iter()
    }

    pub fn into_inner(self) -> HashMap<EdgeRef, Tensor> {
        self.values
    }

    fn insert(&mut self, edge: EdgeRef, tensor: Tensor) {
        self.values.insert(edge, tensor);
    }

    fn require(&self, edge: EdgeRef) -> Result<&Tensor, GraphError> {
        self.values
            .get(&edge)
            .ok_or(GraphError::MissingEdgeValue { edge })
    }
}

/// Result tensors of one execution.
#[derive(Debug, Clone)]
pub enum GraphOutput {
    /// Exactly one end node and no forced tuple output.
    Single(Tensor),
    /// One tensor per end node, in declaration order.
    Tuple(Vec<Tensor>),
    /// The full edge-value table.
    Intermediate(EdgeValues),
}

impl GraphOutput {
    /// The single result, if this is [`GraphOutput::Single`].
    pub fn single(&self) -> Option<&Tensor> {
        match self {
            GraphOutput::Single(t) => Some(t),
            _ => None,
        }
    }

    /// End tensors as a slice (`None` for the intermediate table).
    pub fn tensors(&self) -> Option<&[Tensor]> {
        match self {
            GraphOutput::Single(t) => Some(std::slice::from_ref(t)),
            GraphOutput::Tuple(ts) => Some(ts),
            GraphOutput::Intermediate(_) => None,
        }
    }

    /// End tensors by value (`None` for the intermediate table).
    pub fn into_tensors(self) -> Option<Vec<Tensor>> {
        match self {
            GraphOutput::Single(t) => Some(vec![t]),
            GraphOutput::Tuple(ts) => Some(ts),
            GraphOutput::Intermediate(_) => None,
        }
    }

    pub fn edge_values(&self) -> Option<&EdgeValues> {
        match self {
            GraphOutput::Intermediate(values) => Some(values),
            _ => None,
        }
    }
}

/// Output of [`ReversibleGraph::run`].
#[derive(Debug, Clone)]
pub struct Execution {
    pub output: GraphOutput,
    /// Summed log-Jacobian, `None` when tracking was disabled.
    pub log_jac: Option<LogJacobian>,
}

impl ReversibleGraph {
    /// Run the graph.
    ///
    /// `inputs` match the input nodes for [`Direction::Forward`] and the
    /// output nodes for [`Direction::Backward`]; `conditions` match the
    /// condition nodes.
    pub fn run(
        &self,
        inputs: &[Tensor],
        conditions: &[Tensor],
        options: RunOptions,
    ) -> Result<Execution, GraphError> {
        let direction = options.direction;
        let (starts, ends, what) = match direction {
            Direction::Forward => (&self.inputs, &self.outputs, "input"),
            Direction::Backward => (&self.outputs, &self.inputs, "output"),
        };
        check_arity(what, starts.len(), inputs.len())?;
        check_arity("condition", self.conditions.len(), conditions.len())?;

        let batch = inputs.first().map(batch_size).unwrap_or(0);
        let mut values = EdgeValues::default();
        for (&id, tensor) in starts
            .iter()
            .zip(inputs)
            .chain(self.conditions.iter().zip(conditions))
        {
            self.check_boundary(self.node_ref(id)?, tensor, batch)?;
            values.insert(id.out(0), tensor.clone());
        }

        let mut log_jac = options.jac.then(|| zero_log_jacobian(batch));

        let walk: Box<dyn Iterator<Item = &NodeId>> = match direction {
            Direction::Forward => Box::new(self.order.iter()),
            Direction::Backward => Box::new(self.order.iter().rev()),
        };
        for &id in walk {
            let node = self.node_ref(id)?;
            let Some(transform) = node.transform() else {
                continue;
            };
            self.step(node, transform, &mut values, &mut log_jac, options, batch)?;
        }

        // An end node forwards the single value that reaches it.
        for &id in ends {
            let node = self.node_ref(id)?;
            let source = match direction {
                Direction::Forward => node.inputs.first().copied(),
                Direction::Backward => node.consumers.first().copied().flatten(),
            }
            .ok_or(GraphError::MissingEdgeValue { edge: id.out(0) })?;
            let value = values.require(source)?.clone();
            values.insert(id.out(0), value);
        }

        let output = if options.intermediate_outputs {
            GraphOutput::Intermediate(values)
        } else {
            let mut tensors = ends
                .iter()
                .map(|id| {
                    values
                        .values
                        .remove(&id.out(0))
                        .ok_or(GraphError::MissingEdgeValue { edge: id.out(0) })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if tensors.len() == 1 && !self.config.force_tuple_output {
                GraphOutput::Single(tensors.swap_remove(0))
            } else {
                GraphOutput::Tuple(tensors)
            }
        };

        Ok(Execution { output, log_jac })
    }

    /// Forward pass with Jacobian tracking.
    pub fn forward(&self, x: &[Tensor], c: &[Tensor]) -> Result<Execution, GraphError> {
        self.run(x, c, RunOptions::forward())
    }

    /// Backward pass with Jacobian tracking.
    pub fn backward(&self, z: &[Tensor], c: &[Tensor]) -> Result<Execution, GraphError> {
        self.run(z, c, RunOptions::backward())
    }

    fn node_ref(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.node(id).ok_or_else(|| GraphError::UnknownNode {
            node: "graph".into(),
            id,
        })
    }

    fn check_boundary(&self, node: &Node, tensor: &Tensor, batch: usize) -> Result<(), GraphError> {
        let got = batch_size(tensor);
        if got != batch {
            return Err(GraphError::BatchMismatch {
                node: node.name.clone(),
                expected: batch,
                got,
            });
        }
        if !self.config.check_shapes {
            return Ok(());
        }
        let expected = match node.kind {
            NodeKind::Output => node.input_shapes.first(),
            _ => node.output_shapes.first(),
        };
        match expected {
            Some(expected) => check_sample_shape(&node.name, expected, tensor),
            None => Ok(()),
        }
    }

    fn step(
        &self,
        node: &Node,
        transform: &dyn InvertibleTransform,
        values: &mut EdgeValues,
        log_jac: &mut Option<LogJacobian>,
        options: RunOptions,
        batch: usize,
    ) -> Result<(), GraphError> {
        let direction = options.direction;
        let (sources, produced): (Vec<EdgeRef>, &[Shape]) = match direction {
            Direction::Forward => (node.inputs.clone(), node.output_shapes.as_slice()),
            Direction::Backward => (
                node.consumers.iter().flatten().copied().collect(),
                node.input_shapes.as_slice(),
            ),
        };

        let node_inputs = sources
            .iter()
            .map(|&edge| values.require(edge).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let node_conditions = node
            .conditions
            .iter()
            .map(|c| values.require(c.out(0)).cloned())
            .collect::<Result<Vec<_>, _>>()?;

        log::trace!("{direction} through '{}'", node.name);
        let TransformOutput {
            outputs,
            log_jac: node_jac,
        } = transform
            .evaluate(&node_inputs, &node_conditions, direction, options.jac)
            .map_err(|e| e.in_node(&node.name))?;

        if outputs.len() != produced.len() {
            return Err(GraphError::OutputCountMismatch {
                node: node.name.clone(),
                expected: produced.len(),
                got: outputs.len(),
            });
        }
        if self.config.check_shapes {
            for (tensor, expected) in outputs.iter().zip(produced) {
                check_sample_shape(&node.name, expected, tensor)?;
                let got = batch_size(tensor);
                if got != batch {
                    return Err(GraphError::BatchMismatch {
                        node: node.name.clone(),
                        expected: batch,
                        got,
                    });
                }
            }
        }

        match (log_jac.as_mut(), node_jac) {
            (Some(total), Some(jac)) => {
                if jac.len() != batch {
                    return Err(GraphError::JacobianShape {
                        node: node.name.clone(),
                        expected: batch,
                        got: jac.len(),
                    });
                }
                *total += &jac;
            }
            (Some(_), None) => {
                return Err(GraphError::MissingJacobian {
                    node: node.name.clone(),
                })
            }
            (None, Some(_)) => {
                return Err(GraphError::UnexpectedJacobian {
                    node: node.name.clone(),
                })
            }
            (None, None) => {}
        }

        for (slot, tensor) in outputs.into_iter().enumerate() {
            values.insert(node.id.out(slot), tensor);
        }
        Ok(())
    }
}

fn check_arity(what: &'static str, expected: usize, got: usize) -> Result<(), GraphError> {
    if expected != got {
        return Err(GraphError::ArityMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

fn check_sample_shape(node: &str, expected: &Shape, tensor: &Tensor) -> Result<(), GraphError> {
    let got = sample_shape(tensor);
    if tensor.ndim() == 0 || &got != expected {
        return Err(GraphError::TensorShapeMismatch {
            node: node.to_string(),
            expected: expected.clone(),
            got,
        });
    }
    Ok(())
}
