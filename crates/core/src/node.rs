//! # Nodes and Edge References
//!
//! A node is one vertex of a flow graph. It records:
//!
//! - the edges it reads ([`EdgeRef`] = producer + output slot),
//! - the condition nodes it is conditioned on,
//! - for each of its own output slots, the edge of the consumer that reads it,
//! - its input, condition and output shapes,
//! - its [`NodeKind`]: a boundary marker or a wrapped transform.
//!
//! Nodes are declared with a [`NodeSpec`] and added to a
//! [`GraphBuilder`](crate::graph::GraphBuilder), which owns them in an arena
//! and hands out [`NodeId`] handles.

use std::fmt;

use petgraph::graph::NodeIndex;

use crate::error::GraphError;
use crate::shape::{display_shapes, Shape};
use crate::transform::{boxed_factory, InvertibleTransform, TransformFactory};

/// Opaque handle of a node inside one builder / graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    /// Position of the node in declaration order.
    pub fn index(self) -> usize {
        self.0.index()
    }

    /// Reference to output `slot` of this node.
    pub fn out(self, slot: usize) -> EdgeRef {
        EdgeRef::new(self, slot)
    }
}

impl From<NodeIndex> for NodeId {
    fn from(index: NodeIndex) -> Self {
        NodeId(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.index())
    }
}

/// One tensor-valued output: `(producer, output slot)`.
///
/// During backward execution the same pair names the tensor a node produces
/// for its input `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeRef {
    pub node: NodeId,
    pub slot: usize,
}

impl EdgeRef {
    pub fn new(node: NodeId, slot: usize) -> Self {
        Self { node, slot }
    }
}

impl From<(NodeId, usize)> for EdgeRef {
    fn from((node, slot): (NodeId, usize)) -> Self {
        EdgeRef { node, slot }
    }
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.slot)
    }
}

/// The ways a node's inputs may be given.
///
/// All forms are canonicalized to an ordered list of edges:
/// a bare node means its output 0, a single pair becomes a one-element list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inputs {
    Node(NodeId),
    Edge(EdgeRef),
    Edges(Vec<EdgeRef>),
}

impl Inputs {
    /// No inputs at all (only boundary sources have none).
    pub fn none() -> Self {
        Inputs::Edges(Vec::new())
    }

    /// The canonical ordered edge list.
    pub fn canonicalize(self) -> Vec<EdgeRef> {
        match self {
            Inputs::Node(node) => vec![node.out(0)],
            Inputs::Edge(edge) => vec![edge],
            Inputs::Edges(edges) => edges,
        }
    }
}

impl From<NodeId> for Inputs {
    fn from(node: NodeId) -> Self {
        Inputs::Node(node)
    }
}

impl From<EdgeRef> for Inputs {
    fn from(edge: EdgeRef) -> Self {
        Inputs::Edge(edge)
    }
}

impl From<(NodeId, usize)> for Inputs {
    fn from(pair: (NodeId, usize)) -> Self {
        Inputs::Edge(pair.into())
    }
}

impl From<Vec<EdgeRef>> for Inputs {
    fn from(edges: Vec<EdgeRef>) -> Self {
        Inputs::Edges(edges)
    }
}

impl From<&[EdgeRef]> for Inputs {
    fn from(edges: &[EdgeRef]) -> Self {
        Inputs::Edges(edges.to_vec())
    }
}

impl<const N: usize> From<[EdgeRef; N]> for Inputs {
    fn from(edges: [EdgeRef; N]) -> Self {
        Inputs::Edges(edges.to_vec())
    }
}

impl From<Vec<(NodeId, usize)>> for Inputs {
    fn from(pairs: Vec<(NodeId, usize)>) -> Self {
        Inputs::Edges(pairs.into_iter().map(EdgeRef::from).collect())
    }
}

/// What a node is.
///
/// Boundary kinds carry no transform; their shape inference is fixed.
pub enum NodeKind {
    /// Graph input (forward) / result (backward) with a declared sample shape.
    Input { shape: Shape },
    /// External conditioning tensor with a declared sample shape.
    Condition { shape: Shape },
    /// Graph output (forward) / start (backward).
    Output,
    /// A node wrapping a reversible transform.
    Transform(Box<dyn InvertibleTransform>),
}

impl NodeKind {
    /// Short label used in names and descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Input { .. } => "input",
            NodeKind::Condition { .. } => "condition",
            NodeKind::Output => "output",
            NodeKind::Transform(_) => "node",
        }
    }

    /// True for input, condition and output nodes.
    pub fn is_boundary(&self) -> bool {
        !matches!(self, NodeKind::Transform(_))
    }

    /// The wrapped transform, if any.
    pub fn transform(&self) -> Option<&dyn InvertibleTransform> {
        match self {
            NodeKind::Transform(t) => Some(t.as_ref()),
            _ => None,
        }
    }

    /// Shape inference for this kind of node.
    ///
    /// Boundary kinds answer directly and reject what they cannot take;
    /// transforms are asked through their contract.
    pub fn compute_output_shapes(
        &self,
        node: &str,
        input_shapes: &[Shape],
        condition_shapes: &[Shape],
    ) -> Result<Vec<Shape>, GraphError> {
        let reject = |what: &'static str| GraphError::BoundaryViolation {
            node: node.to_string(),
            kind: self.label(),
            what,
        };
        match self {
            NodeKind::Input { shape } | NodeKind::Condition { shape } => {
                if !condition_shapes.is_empty() {
                    return Err(reject("conditions"));
                }
                if !input_shapes.is_empty() {
                    return Err(reject("inputs"));
                }
                Ok(vec![shape.clone()])
            }
            NodeKind::Output => {
                if !condition_shapes.is_empty() {
                    return Err(reject("conditions"));
                }
                Ok(Vec::new())
            }
            NodeKind::Transform(t) => t
                .output_shapes(input_shapes)
                .map_err(|e| e.in_node(node)),
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Input { shape } => f.debug_struct("Input").field("shape", shape).finish(),
            NodeKind::Condition { shape } => {
                f.debug_struct("Condition").field("shape", shape).finish()
            }
            NodeKind::Output => write!(f, "Output"),
            NodeKind::Transform(t) => f.debug_tuple("Transform").field(t).finish(),
        }
    }
}

/// A constructed node.
#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) inputs: Vec<EdgeRef>,
    pub(crate) conditions: Vec<NodeId>,
    /// Entry `k` is the consumer edge `(consumer, consumer input slot)` that
    /// reads output `k`.
    pub(crate) consumers: Vec<Option<EdgeRef>>,
    pub(crate) input_shapes: Vec<Shape>,
    pub(crate) condition_shapes: Vec<Shape>,
    pub(crate) output_shapes: Vec<Shape>,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The wrapped transform (`None` for boundary nodes).
    pub fn transform(&self) -> Option<&dyn InvertibleTransform> {
        self.kind.transform()
    }

    /// Input edges in slot order.
    pub fn inputs(&self) -> &[EdgeRef] {
        &self.inputs
    }

    /// Condition nodes in order.
    pub fn conditions(&self) -> &[NodeId] {
        &self.conditions
    }

    /// Consumer edge of each output slot (`None` while still unconnected).
    pub fn consumers(&self) -> &[Option<EdgeRef>] {
        &self.consumers
    }

    pub fn input_shapes(&self) -> &[Shape] {
        &self.input_shapes
    }

    pub fn condition_shapes(&self) -> &[Shape] {
        &self.condition_shapes
    }

    pub fn output_shapes(&self) -> &[Shape] {
        &self.output_shapes
    }

    /// Number of output slots.
    pub fn num_outputs(&self) -> usize {
        self.output_shapes.len()
    }

    /// Reference to output `slot` of this node.
    pub fn output(&self, slot: usize) -> EdgeRef {
        self.id.out(slot)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            NodeKind::Input { .. } => "InputNode",
            NodeKind::Condition { .. } => "ConditionNode",
            NodeKind::Output => "OutputNode",
            NodeKind::Transform(_) => "Node",
        };
        let transform = self.transform().map(|t| t.name()).unwrap_or("");
        write!(
            f,
            "{kind} '{}'({} -> {transform} -> {})",
            self.name,
            display_shapes(&self.input_shapes),
            display_shapes(&self.output_shapes)
        )
    }
}

/// Declaration of a node, consumed by
/// [`GraphBuilder::add`](crate::graph::GraphBuilder::add).
pub struct NodeSpec {
    pub(crate) kind: SpecKind,
    pub(crate) inputs: Inputs,
    pub(crate) conditions: Vec<NodeId>,
    pub(crate) name: Option<String>,
}

pub(crate) enum SpecKind {
    Input(Shape),
    Condition(Shape),
    Output,
    Transform(TransformFactory),
}

impl NodeSpec {
    /// A graph input with the given sample shape.
    pub fn input(shape: impl Into<Shape>) -> Self {
        Self::boundary(SpecKind::Input(shape.into()), Inputs::none())
    }

    /// A conditioning input with the given sample shape.
    pub fn condition(shape: impl Into<Shape>) -> Self {
        Self::boundary(SpecKind::Condition(shape.into()), Inputs::none())
    }

    /// A graph output reading one edge.
    pub fn output(inputs: impl Into<Inputs>) -> Self {
        Self::boundary(SpecKind::Output, inputs.into())
    }

    /// A transform node.
    ///
    /// `factory` receives the input shapes and, if the node has conditions,
    /// the condition shapes.
    pub fn transform<F, T>(inputs: impl Into<Inputs>, factory: F) -> Self
    where
        F: FnOnce(&[Shape], Option<&[Shape]>) -> Result<T, GraphError> + 'static,
        T: InvertibleTransform + 'static,
    {
        Self {
            kind: SpecKind::Transform(boxed_factory(factory)),
            inputs: inputs.into(),
            conditions: Vec::new(),
            name: None,
        }
    }

    fn boundary(kind: SpecKind, inputs: Inputs) -> Self {
        Self {
            kind,
            inputs,
            conditions: Vec::new(),
            name: None,
        }
    }

    /// Condition this node on the given condition nodes.
    pub fn with_conditions(mut self, conditions: impl IntoIterator<Item = NodeId>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// Give the node a name for lookup and error messages.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn label(&self) -> &'static str {
        match self.kind {
            SpecKind::Input(_) => "input",
            SpecKind::Condition(_) => "condition",
            SpecKind::Output => "output",
            SpecKind::Transform(_) => "node",
        }
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("kind", &self.label())
            .field("inputs", &self.inputs)
            .field("conditions", &self.conditions)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: usize) -> NodeId {
        NodeId(NodeIndex::new(i))
    }

    #[test]
    fn test_bare_node_means_slot_zero() {
        let edges = Inputs::from(id(3)).canonicalize();
        assert_eq!(edges, vec![EdgeRef::new(id(3), 0)]);
    }

    #[test]
    fn test_single_pair_becomes_singleton() {
        let edges = Inputs::from((id(1), 2)).canonicalize();
        assert_eq!(edges, vec![EdgeRef::new(id(1), 2)]);
    }

    #[test]
    fn test_pair_list_is_kept() {
        let edges = Inputs::from(vec![(id(1), 0), (id(2), 1)]).canonicalize();
        assert_eq!(edges, vec![id(1).out(0), id(2).out(1)]);
        assert!(Inputs::none().canonicalize().is_empty());
    }

    #[test]
    fn test_edge_display() {
        assert_eq!(id(4).out(1).to_string(), "#4:1");
    }

    #[test]
    fn test_boundary_shape_inference() {
        let input = NodeKind::Input {
            shape: Shape::vector(4),
        };
        assert_eq!(
            input.compute_output_shapes("x", &[], &[]).unwrap(),
            vec![Shape::vector(4)]
        );
        assert!(matches!(
            input.compute_output_shapes("x", &[], &[Shape::vector(1)]),
            Err(GraphError::BoundaryViolation {
                what: "conditions",
                ..
            })
        ));
        assert!(matches!(
            input.compute_output_shapes("x", &[Shape::vector(1)], &[]),
            Err(GraphError::BoundaryViolation { what: "inputs", .. })
        ));

        let output = NodeKind::Output;
        assert!(output
            .compute_output_shapes("y", &[Shape::vector(4)], &[])
            .unwrap()
            .is_empty());
        assert!(output
            .compute_output_shapes("y", &[Shape::vector(4)], &[Shape::scalar()])
            .is_err());
    }
}
