//! # Reversible Graphs
//!
//! [`GraphBuilder`] is the node arena used while a flow is being declared.
//! Nodes must be added producers first: a node's shapes are fixed when it is
//! added, from shapes its producers already know.
//!
//! [`GraphBuilder::build`] validates the finished arena and turns it into an
//! immutable [`ReversibleGraph`]:
//!
//! - boundary nodes are detected by kind, in declaration order,
//! - every produced edge must be consumed exactly once,
//! - the execution order is computed by [`topological_order`].
//!
//! ## Example
//!
//! ```rust
//! use flowgraph_core::{GraphBuilder, NodeSpec, Shape};
//!
//! let mut builder = GraphBuilder::new();
//! let x = builder.add(NodeSpec::input([2]).named("x")).unwrap();
//! let z = builder.add(NodeSpec::output(x).named("z")).unwrap();
//! let graph = builder.build().unwrap();
//!
//! assert_eq!(graph.input_shapes(), vec![Shape::vector(2)]);
//! assert_eq!(graph.node_by_name("z").map(|n| n.id()), Some(z));
//! ```

use std::collections::HashSet;
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::exec::RunOptions;
use crate::node::{EdgeRef, Node, NodeId, NodeKind, NodeSpec, SpecKind};
use crate::shape::Shape;
use crate::summary::{EdgeSummary, GraphSummary, NodeSummary};
use crate::tensor::Tensor;
use crate::topo::topological_order;
use crate::transform::{Direction, InvertibleTransform, TransformOutput};

/// A data edge in the arena: output `from_slot` of the source node feeds
/// input `to_slot` of the target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Wire {
    pub(crate) from_slot: usize,
    pub(crate) to_slot: usize,
}

impl Wire {
    pub(crate) fn new(from_slot: usize, to_slot: usize) -> Self {
        Self { from_slot, to_slot }
    }
}

/// Arena in which the nodes of a graph are declared.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: DiGraph<Node, Wire>,
    config: GraphConfig,
}

impl GraphBuilder {
    /// Create an empty builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` for the graph this builder produces.
    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Look up a node that has already been added.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id.0)
    }

    /// Number of nodes added so far.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Add a node.
    ///
    /// Resolves the input edges against already-added producers, builds the
    /// transform for the resulting shapes, and registers the new node as the
    /// consumer of each edge it reads.
    pub fn add(&mut self, spec: NodeSpec) -> Result<NodeId, GraphError> {
        let id = NodeId(NodeIndex::new(self.graph.node_count()));
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", spec.label(), id.index()));
        let NodeSpec {
            kind,
            inputs,
            conditions,
            ..
        } = spec;

        let is_transform = matches!(kind, SpecKind::Transform(_));
        if !is_transform && !conditions.is_empty() {
            let kind = match kind {
                SpecKind::Input(_) => "input",
                SpecKind::Condition(_) => "condition",
                _ => "output",
            };
            return Err(GraphError::BoundaryViolation {
                node: name,
                kind,
                what: "conditions",
            });
        }

        let inputs = inputs.canonicalize();
        match kind {
            SpecKind::Transform(_) if inputs.is_empty() => {
                return Err(GraphError::MalformedInputs {
                    node: name,
                    reason: "a transform node needs at least one input".into(),
                });
            }
            SpecKind::Output if inputs.len() != 1 => {
                return Err(GraphError::MalformedInputs {
                    node: name,
                    reason: format!("an output node takes exactly one input, got {}", inputs.len()),
                });
            }
            _ => {}
        }

        let input_shapes = self.resolve_inputs(&name, &inputs)?;
        let condition_shapes = self.resolve_conditions(&name, &conditions)?;

        let kind = match kind {
            SpecKind::Input(shape) => NodeKind::Input { shape },
            SpecKind::Condition(shape) => NodeKind::Condition { shape },
            SpecKind::Output => NodeKind::Output,
            SpecKind::Transform(factory) => {
                let condition_arg = if conditions.is_empty() {
                    None
                } else {
                    Some(condition_shapes.as_slice())
                };
                let transform =
                    factory(input_shapes.as_slice(), condition_arg).map_err(|e| e.in_node(&name))?;
                NodeKind::Transform(transform)
            }
        };
        let output_shapes = kind.compute_output_shapes(&name, &input_shapes, &condition_shapes)?;

        let node = Node {
            id,
            name,
            inputs: inputs.clone(),
            conditions,
            consumers: vec![None; output_shapes.len()],
            input_shapes,
            condition_shapes,
            output_shapes,
            kind,
        };
        log::debug!("adding {node}");
        let index = self.graph.add_node(node);
        debug_assert_eq!(index, id.0);

        for (to_slot, edge) in inputs.iter().enumerate() {
            if let Some(consumer) = self
                .graph
                .node_weight_mut(edge.node.0)
                .and_then(|producer| producer.consumers.get_mut(edge.slot))
            {
                *consumer = Some(EdgeRef::new(id, to_slot));
            }
            self.graph
                .add_edge(edge.node.0, id.0, Wire::new(edge.slot, to_slot));
        }

        Ok(id)
    }

    /// Shapes of the edges a new node reads; checks that every edge exists
    /// and is still free.
    fn resolve_inputs(&self, name: &str, inputs: &[EdgeRef]) -> Result<Vec<Shape>, GraphError> {
        let mut seen = HashSet::new();
        let mut shapes = Vec::with_capacity(inputs.len());

        for &edge in inputs {
            let producer = self.lookup(name, edge.node)?;
            if matches!(producer.kind, NodeKind::Condition { .. }) {
                return Err(GraphError::MalformedInputs {
                    node: name.to_string(),
                    reason: format!(
                        "condition node '{}' can only be used as a condition",
                        producer.name
                    ),
                });
            }
            let shape = producer
                .output_shapes
                .get(edge.slot)
                .ok_or_else(|| GraphError::InvalidSlot {
                    producer: producer.name.clone(),
                    slot: edge.slot,
                    count: producer.output_shapes.len(),
                })?;

            let taken_by = match producer.consumers.get(edge.slot).copied().flatten() {
                Some(existing) => Some(self.name_of(existing.node)),
                None if !seen.insert(edge) => Some(name.to_string()),
                None => None,
            };
            if let Some(consumer) = taken_by {
                return Err(GraphError::SlotAlreadyConsumed {
                    producer: producer.name.clone(),
                    slot: edge.slot,
                    consumer,
                });
            }

            shapes.push(shape.clone());
        }

        Ok(shapes)
    }

    fn resolve_conditions(
        &self,
        name: &str,
        conditions: &[NodeId],
    ) -> Result<Vec<Shape>, GraphError> {
        conditions
            .iter()
            .map(|&id| {
                let node = self.lookup(name, id)?;
                match &node.kind {
                    NodeKind::Condition { shape } => Ok(shape.clone()),
                    _ => Err(GraphError::NotAConditionNode {
                        node: name.to_string(),
                        condition: node.name.clone(),
                    }),
                }
            })
            .collect()
    }

    fn lookup(&self, name: &str, id: NodeId) -> Result<&Node, GraphError> {
        self.graph
            .node_weight(id.0)
            .ok_or_else(|| GraphError::UnknownNode {
                node: name.to_string(),
                id,
            })
    }

    fn name_of(&self, id: NodeId) -> String {
        self.graph
            .node_weight(id.0)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Validate the arena and compute the execution order.
    pub fn build(self) -> Result<ReversibleGraph, GraphError> {
        let GraphBuilder { graph, config } = self;

        let collect = |pred: fn(&NodeKind) -> bool| -> Vec<NodeId> {
            graph
                .node_indices()
                .filter(|&i| pred(&graph[i].kind))
                .map(NodeId)
                .collect()
        };
        let inputs = collect(|k| matches!(k, NodeKind::Input { .. }));
        let conditions = collect(|k| matches!(k, NodeKind::Condition { .. }));
        let outputs = collect(|k| matches!(k, NodeKind::Output));

        if inputs.is_empty() {
            return Err(GraphError::NoInputs);
        }
        if outputs.is_empty() {
            return Err(GraphError::NoOutputs);
        }

        // Inputs are left to the scheduler, which reports them as disconnected.
        for node in graph.node_weights() {
            if !matches!(node.kind, NodeKind::Transform(_)) {
                continue;
            }
            if let Some(slot) = node.consumers.iter().position(Option::is_none) {
                return Err(GraphError::DanglingOutput {
                    node: node.name.clone(),
                    slot,
                });
            }
        }

        let input_indices: Vec<NodeIndex> = inputs.iter().map(|n| n.0).collect();
        let output_indices: Vec<NodeIndex> = outputs.iter().map(|n| n.0).collect();
        let order: Vec<NodeId> = topological_order(&graph, &input_indices, &output_indices)?
            .into_iter()
            .map(NodeId)
            .collect();

        for &c in &conditions {
            let used = graph
                .node_weights()
                .any(|n| n.conditions.contains(&c));
            if !used {
                log::warn!("condition node '{}' is not used by any node", graph[c.0].name);
            }
        }

        log::debug!(
            "built graph: {} inputs, {} conditions, {} outputs, {} scheduled nodes",
            inputs.len(),
            conditions.len(),
            outputs.len(),
            order.len()
        );

        Ok(ReversibleGraph {
            graph,
            inputs,
            conditions,
            outputs,
            order,
            config,
        })
    }
}

/// A validated, immutable flow graph.
#[derive(Debug)]
pub struct ReversibleGraph {
    pub(crate) graph: DiGraph<Node, Wire>,
    pub(crate) inputs: Vec<NodeId>,
    pub(crate) conditions: Vec<NodeId>,
    pub(crate) outputs: Vec<NodeId>,
    pub(crate) order: Vec<NodeId>,
    pub(crate) config: GraphConfig,
}

impl ReversibleGraph {
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id.0)
    }

    /// All nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Scheduled nodes, producers before consumers.
    ///
    /// Condition nodes are not scheduled: their values are supplied by the
    /// caller in both directions.
    pub fn execution_order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn input_nodes(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn condition_nodes(&self) -> &[NodeId] {
        &self.conditions
    }

    pub fn output_nodes(&self) -> &[NodeId] {
        &self.outputs
    }

    /// Sample shapes expected by the input nodes.
    pub fn input_shapes(&self) -> Vec<Shape> {
        self.boundary_shapes(&self.inputs, |n| n.output_shapes.first())
    }

    /// Sample shapes expected by the condition nodes.
    pub fn condition_shapes(&self) -> Vec<Shape> {
        self.boundary_shapes(&self.conditions, |n| n.output_shapes.first())
    }

    /// Sample shapes produced at the output nodes.
    pub fn output_shapes(&self) -> Vec<Shape> {
        self.boundary_shapes(&self.outputs, |n| n.input_shapes.first())
    }

    fn boundary_shapes(&self, ids: &[NodeId], pick: fn(&Node) -> Option<&Shape>) -> Vec<Shape> {
        ids.iter()
            .filter_map(|id| self.node(*id).and_then(pick).cloned())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of data edges (condition links are not counted).
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// First node with the given name, in declaration order.
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes().find(|n| n.name == name)
    }

    /// Transform of the first node with the given name.
    pub fn transform_by_name(&self, name: &str) -> Option<&dyn InvertibleTransform> {
        self.node_by_name(name).and_then(Node::transform)
    }

    /// Serializable description of the graph.
    pub fn summary(&self) -> GraphSummary {
        let names = |ids: &[NodeId]| -> Vec<String> {
            ids.iter()
                .filter_map(|id| self.node(*id).map(|n| n.name.clone()))
                .collect()
        };
        let name_of = |index: NodeIndex| {
            self.graph
                .node_weight(index)
                .map(|n| n.name.clone())
                .unwrap_or_default()
        };
        let edges = self
            .graph
            .raw_edges()
            .iter()
            .map(|edge| EdgeSummary {
                from: name_of(edge.source()),
                from_slot: edge.weight.from_slot,
                to: name_of(edge.target()),
                to_slot: edge.weight.to_slot,
            })
            .collect();
        GraphSummary {
            nodes: self.nodes().map(NodeSummary::from).collect(),
            edges,
            execution_order: names(&self.order),
            inputs: names(&self.inputs),
            conditions: names(&self.conditions),
            outputs: names(&self.outputs),
        }
    }
}

impl fmt::Display for ReversibleGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ReversibleGraph({} nodes, {} edges)",
            self.node_count(),
            self.edge_count()
        )?;
        for node in self.order.iter().filter_map(|id| self.node(*id)) {
            writeln!(f, "  {node}")?;
        }
        Ok(())
    }
}

/// A whole graph can be a node of a larger graph.
impl InvertibleTransform for ReversibleGraph {
    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, GraphError> {
        let expected = self.input_shapes();
        if input_shapes != expected.as_slice() {
            return Err(GraphError::invalid_shapes(format!(
                "nested graph expects inputs {}, got {}",
                crate::shape::display_shapes(&expected),
                crate::shape::display_shapes(input_shapes)
            )));
        }
        Ok(self.output_shapes())
    }

    fn evaluate(
        &self,
        inputs: &[Tensor],
        conditions: &[Tensor],
        direction: Direction,
        jac: bool,
    ) -> Result<TransformOutput, GraphError> {
        let options = RunOptions {
            direction,
            jac,
            intermediate_outputs: false,
        };
        let execution = self.run(inputs, conditions, options)?;
        let outputs = execution.output.into_tensors().unwrap_or_default();
        Ok(TransformOutput::new(outputs, execution.log_jac))
    }

    fn name(&self) -> &str {
        "ReversibleGraph"
    }
}
