//! # Construction Tests
//!
//! Tests for building graphs:
//! - Input canonicalization and shape propagation
//! - Consumer registration on producers
//! - Boundary node rules
//! - Structural validation at build time
//! - Lookup by name

use flowgraph_core::{
    Direction, EdgeRef, GraphBuilder, GraphConfig, GraphError, Inputs, InvertibleTransform,
    NodeKind, NodeSpec, Shape, Tensor, TransformOutput,
};

/// Passes every input through unchanged.
#[derive(Debug)]
struct PassThrough;

impl InvertibleTransform for PassThrough {
    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, GraphError> {
        Ok(input_shapes.to_vec())
    }

    fn evaluate(
        &self,
        inputs: &[Tensor],
        _conditions: &[Tensor],
        _direction: Direction,
        _jac: bool,
    ) -> Result<TransformOutput, GraphError> {
        Ok(TransformOutput::new(inputs.to_vec(), None))
    }

    fn name(&self) -> &str {
        "PassThrough"
    }
}

fn pass_through(_: &[Shape], _: Option<&[Shape]>) -> Result<PassThrough, GraphError> {
    Ok(PassThrough)
}

/// Splits a vector into two halves.
#[derive(Debug)]
struct Halves;

impl InvertibleTransform for Halves {
    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, GraphError> {
        match input_shapes {
            [s] if s.rank() == 1 && s.numel() % 2 == 0 => {
                Ok(vec![Shape::vector(s.numel() / 2), Shape::vector(s.numel() / 2)])
            }
            _ => Err(GraphError::invalid_shapes("expected one even-length vector")),
        }
    }

    fn evaluate(
        &self,
        inputs: &[Tensor],
        _conditions: &[Tensor],
        _direction: Direction,
        _jac: bool,
    ) -> Result<TransformOutput, GraphError> {
        Ok(TransformOutput::new(inputs.to_vec(), None))
    }
}

// ============================================================================
// Shape Propagation
// ============================================================================

#[test]
fn test_chain_shape_propagation() {
    let mut builder = GraphBuilder::new();
    let a = builder.add(NodeSpec::input([4]).named("a")).unwrap();
    let b = builder
        .add(NodeSpec::transform(a, pass_through).named("b"))
        .unwrap();
    let c = builder.add(NodeSpec::output(b).named("c")).unwrap();

    let b_node = builder.node(b).unwrap();
    assert_eq!(b_node.input_shapes(), &[Shape::vector(4)]);
    assert_eq!(b_node.output_shapes(), b_node.input_shapes());

    let c_node = builder.node(c).unwrap();
    assert_eq!(c_node.input_shapes(), b_node.output_shapes());
    assert!(c_node.output_shapes().is_empty());
}

#[test]
fn test_factory_sees_condition_shapes_only_when_conditioned() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let seen: Rc<RefCell<Vec<Option<Vec<Shape>>>>> = Rc::default();

    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([2])).unwrap();
    let c = builder.add(NodeSpec::condition([5])).unwrap();

    let log = Rc::clone(&seen);
    let plain = builder
        .add(NodeSpec::transform(x, move |_: &[Shape], cond: Option<&[Shape]>| {
            log.borrow_mut().push(cond.map(<[Shape]>::to_vec));
            Ok(PassThrough)
        }))
        .unwrap();

    let log = Rc::clone(&seen);
    let conditioned = builder
        .add(
            NodeSpec::transform(plain, move |_: &[Shape], cond: Option<&[Shape]>| {
                log.borrow_mut().push(cond.map(<[Shape]>::to_vec));
                Ok(PassThrough)
            })
            .with_conditions([c]),
        )
        .unwrap();

    assert_eq!(*seen.borrow(), vec![None, Some(vec![Shape::vector(5)])]);
    let node = builder.node(conditioned).unwrap();
    assert_eq!(node.conditions(), &[c]);
    assert_eq!(node.condition_shapes(), &[Shape::vector(5)]);
}

#[test]
fn test_transform_shape_errors_name_the_node() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([3])).unwrap();
    let err = builder
        .add(NodeSpec::transform(x, |_: &[Shape], _: Option<&[Shape]>| Ok(Halves)).named("halves"))
        .unwrap_err();

    match &err {
        GraphError::Node { node, source } => {
            assert_eq!(node, "halves");
            assert!(matches!(**source, GraphError::InvalidShapes { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Input Canonicalization & Registration
// ============================================================================

#[test]
fn test_all_input_forms_resolve_to_edges() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([4])).unwrap();
    let split = builder
        .add(NodeSpec::transform(x, |_: &[Shape], _: Option<&[Shape]>| Ok(Halves)))
        .unwrap();

    // (node, slot) pair
    let left = builder
        .add(NodeSpec::transform((split, 0), pass_through))
        .unwrap();
    // explicit EdgeRef list
    let merged = builder
        .add(NodeSpec::transform(vec![left.out(0), split.out(1)], pass_through))
        .unwrap();

    let node = builder.node(merged).unwrap();
    assert_eq!(node.inputs(), &[EdgeRef::new(left, 0), EdgeRef::new(split, 1)]);
    assert_eq!(node.input_shapes(), &[Shape::vector(2), Shape::vector(2)]);
    assert_eq!(node.output(1), EdgeRef::new(merged, 1));
}

#[test]
fn test_consumers_are_registered_per_slot() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([4])).unwrap();
    let split = builder
        .add(NodeSpec::transform(x, |_: &[Shape], _: Option<&[Shape]>| Ok(Halves)))
        .unwrap();

    // Consume slot 1 before slot 0: registration follows the slot, not the order.
    let second = builder.add(NodeSpec::output((split, 1))).unwrap();
    let first = builder.add(NodeSpec::output((split, 0))).unwrap();

    let node = builder.node(split).unwrap();
    assert_eq!(
        node.consumers(),
        &[Some(EdgeRef::new(first, 0)), Some(EdgeRef::new(second, 0))]
    );
    assert_eq!(
        builder.node(x).unwrap().consumers(),
        &[Some(EdgeRef::new(split, 0))]
    );
}

#[test]
fn test_slot_cannot_be_consumed_twice() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([2]).named("x")).unwrap();
    builder
        .add(NodeSpec::transform(x, pass_through).named("first"))
        .unwrap();
    let err = builder
        .add(NodeSpec::transform(x, pass_through).named("second"))
        .unwrap_err();

    assert_eq!(
        err,
        GraphError::SlotAlreadyConsumed {
            producer: "x".into(),
            slot: 0,
            consumer: "first".into(),
        }
    );
}

#[test]
fn test_same_edge_twice_in_one_node() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([2]).named("x")).unwrap();
    let err = builder
        .add(NodeSpec::transform(vec![x.out(0), x.out(0)], pass_through).named("dup"))
        .unwrap_err();
    assert!(matches!(err, GraphError::SlotAlreadyConsumed { consumer, .. } if consumer == "dup"));
}

#[test]
fn test_invalid_slot() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([2]).named("x")).unwrap();
    let err = builder.add(NodeSpec::output((x, 3))).unwrap_err();
    assert_eq!(
        err,
        GraphError::InvalidSlot {
            producer: "x".into(),
            slot: 3,
            count: 1,
        }
    );
}

#[test]
fn test_unknown_node_handle() {
    let mut other = GraphBuilder::new();
    other.add(NodeSpec::input([1])).unwrap();
    let foreign = other.add(NodeSpec::input([1])).unwrap();

    let mut builder = GraphBuilder::new();
    builder.add(NodeSpec::input([1])).unwrap();
    let err = builder.add(NodeSpec::output(foreign)).unwrap_err();
    assert!(matches!(err, GraphError::UnknownNode { id, .. } if id == foreign));
}

#[test]
fn test_malformed_input_lists() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([2])).unwrap();
    let y = builder.add(NodeSpec::input([2])).unwrap();

    let err = builder
        .add(NodeSpec::transform(Inputs::none(), pass_through))
        .unwrap_err();
    assert!(matches!(err, GraphError::MalformedInputs { .. }));

    let err = builder
        .add(NodeSpec::output(vec![x.out(0), y.out(0)]))
        .unwrap_err();
    assert!(matches!(err, GraphError::MalformedInputs { .. }));
}

// ============================================================================
// Boundary Nodes
// ============================================================================

#[test]
fn test_boundary_nodes_reject_conditions() {
    let mut builder = GraphBuilder::new();
    let c = builder.add(NodeSpec::condition([3])).unwrap();
    let x = builder.add(NodeSpec::input([2])).unwrap();

    let err = builder
        .add(NodeSpec::input([2]).with_conditions([c]).named("bad_in"))
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::BoundaryViolation {
            node: "bad_in".into(),
            kind: "input",
            what: "conditions",
        }
    );

    let err = builder
        .add(NodeSpec::output(x).with_conditions([c]))
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::BoundaryViolation { kind: "output", .. }
    ));

    let err = builder
        .add(NodeSpec::condition([1]).with_conditions([c]))
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::BoundaryViolation {
            kind: "condition",
            ..
        }
    ));
}

#[test]
fn test_condition_node_is_not_a_data_input() {
    let mut builder = GraphBuilder::new();
    let c = builder.add(NodeSpec::condition([3])).unwrap();
    let err = builder.add(NodeSpec::transform(c, pass_through)).unwrap_err();
    assert!(matches!(err, GraphError::MalformedInputs { .. }));
}

#[test]
fn test_conditions_must_be_condition_nodes() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([2]).named("x")).unwrap();
    let y = builder.add(NodeSpec::input([2]).named("y")).unwrap();
    let err = builder
        .add(
            NodeSpec::transform(x, pass_through)
                .with_conditions([y])
                .named("t"),
        )
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::NotAConditionNode {
            node: "t".into(),
            condition: "y".into(),
        }
    );
}

// ============================================================================
// Build-time Validation
// ============================================================================

#[test]
fn test_build_detects_boundaries_in_declaration_order() {
    let mut builder = GraphBuilder::new();
    let c = builder.add(NodeSpec::condition([1]).named("c")).unwrap();
    let x1 = builder.add(NodeSpec::input([2]).named("x1")).unwrap();
    let x2 = builder.add(NodeSpec::input([3]).named("x2")).unwrap();
    let t = builder
        .add(NodeSpec::transform(vec![x2.out(0), x1.out(0)], pass_through).with_conditions([c]))
        .unwrap();
    let z2 = builder.add(NodeSpec::output((t, 1)).named("z2")).unwrap();
    let z1 = builder.add(NodeSpec::output((t, 0)).named("z1")).unwrap();
    let graph = builder.build().unwrap();

    assert_eq!(graph.input_nodes(), &[x1, x2]);
    assert_eq!(graph.condition_nodes(), &[c]);
    assert_eq!(graph.output_nodes(), &[z2, z1]);
    assert_eq!(graph.input_shapes(), vec![Shape::vector(2), Shape::vector(3)]);
    assert_eq!(graph.condition_shapes(), vec![Shape::vector(1)]);
    assert_eq!(graph.output_shapes(), vec![Shape::vector(2), Shape::vector(3)]);
}

#[test]
fn test_no_inputs_or_outputs() {
    let builder = GraphBuilder::new();
    assert_eq!(builder.build().unwrap_err(), GraphError::NoInputs);

    let mut builder = GraphBuilder::new();
    builder.add(NodeSpec::input([1])).unwrap();
    assert_eq!(builder.build().unwrap_err(), GraphError::NoOutputs);
}

#[test]
fn test_unreachable_input_fails() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([2]).named("x")).unwrap();
    builder.add(NodeSpec::input([2]).named("stray")).unwrap();
    builder.add(NodeSpec::output(x)).unwrap();

    match builder.build().unwrap_err() {
        GraphError::DisconnectedInput { node } => assert!(node.contains("stray")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_dangling_output_slot_fails() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([4])).unwrap();
    let split = builder
        .add(NodeSpec::transform(x, |_: &[Shape], _: Option<&[Shape]>| Ok(Halves)).named("split"))
        .unwrap();
    builder.add(NodeSpec::output((split, 0))).unwrap();

    assert_eq!(
        builder.build().unwrap_err(),
        GraphError::DanglingOutput {
            node: "split".into(),
            slot: 1,
        }
    );
}

#[test]
fn test_execution_order_is_topological() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([4])).unwrap();
    let split = builder
        .add(NodeSpec::transform(x, |_: &[Shape], _: Option<&[Shape]>| Ok(Halves)))
        .unwrap();
    let left = builder
        .add(NodeSpec::transform((split, 0), pass_through))
        .unwrap();
    let right = builder
        .add(NodeSpec::transform((split, 1), pass_through))
        .unwrap();
    let merged = builder
        .add(NodeSpec::transform(vec![left.out(0), right.out(0)], pass_through))
        .unwrap();
    let z1 = builder.add(NodeSpec::output((merged, 0))).unwrap();
    let z2 = builder.add(NodeSpec::output((merged, 1))).unwrap();
    let graph = builder.build().unwrap();

    let order = graph.execution_order();
    assert_eq!(order.len(), graph.node_count());
    let pos = |id| order.iter().position(|&n| n == id).unwrap();

    for node in graph.nodes() {
        for edge in node.inputs() {
            assert!(pos(edge.node) < pos(node.id()));
        }
    }
    assert_eq!(pos(x), 0);
    assert!(pos(z1) > pos(merged) && pos(z2) > pos(merged));

    // reversed, every consumer comes before its producer
    let reversed: Vec<_> = order.iter().rev().copied().collect();
    let rpos = |id| reversed.iter().position(|&n| n == id).unwrap();
    for node in graph.nodes() {
        for consumer in node.consumers().iter().flatten() {
            assert!(rpos(consumer.node) < rpos(node.id()));
        }
    }
}

// ============================================================================
// Lookup & Description
// ============================================================================

#[test]
fn test_lookup_by_name() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([2]).named("x")).unwrap();
    let t = builder
        .add(NodeSpec::transform(x, pass_through).named("flow"))
        .unwrap();
    builder.add(NodeSpec::output(t).named("z")).unwrap();
    let graph = builder.build().unwrap();

    assert_eq!(graph.node_by_name("flow").map(|n| n.id()), Some(t));
    assert_eq!(
        graph.transform_by_name("flow").map(|t| t.name().to_string()),
        Some("PassThrough".to_string())
    );
    assert!(graph.node_by_name("missing").is_none());
    assert!(graph.transform_by_name("missing").is_none());
    // boundary nodes have no transform
    assert!(graph.node_by_name("x").is_some());
    assert!(graph.transform_by_name("x").is_none());
}

#[test]
fn test_lookup_returns_first_declared_match() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([2]).named("dup")).unwrap();
    let t = builder
        .add(NodeSpec::transform(x, pass_through).named("dup"))
        .unwrap();
    builder.add(NodeSpec::output(t)).unwrap();
    let graph = builder.build().unwrap();

    let found = graph.node_by_name("dup").unwrap();
    assert_eq!(found.id(), x);
    assert!(matches!(found.kind(), NodeKind::Input { .. }));
}

#[test]
fn test_default_names_and_display() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([2])).unwrap();
    let t = builder.add(NodeSpec::transform(x, pass_through)).unwrap();
    let z = builder.add(NodeSpec::output(t)).unwrap();
    let graph = builder.build().unwrap();

    assert_eq!(graph.node(x).unwrap().name(), "input_0");
    assert_eq!(graph.node(t).unwrap().name(), "node_1");
    assert_eq!(graph.node(z).unwrap().name(), "output_2");
    assert_eq!(
        graph.node(t).unwrap().to_string(),
        "Node 'node_1'([(2,)] -> PassThrough -> [(2,)])"
    );

    let rendered = graph.to_string();
    assert!(rendered.starts_with("ReversibleGraph(3 nodes, 2 edges)"));
    assert!(rendered.contains("OutputNode 'output_2'"));
}

#[test]
fn test_summary_json() {
    let mut builder = GraphBuilder::new().with_config(GraphConfig::default());
    let x = builder.add(NodeSpec::input([2]).named("x")).unwrap();
    let t = builder
        .add(NodeSpec::transform(x, pass_through).named("flow"))
        .unwrap();
    builder.add(NodeSpec::output(t).named("z")).unwrap();
    let graph = builder.build().unwrap();

    let summary = graph.summary();
    assert_eq!(summary.execution_order, vec!["x", "flow", "z"]);
    assert_eq!(summary.inputs, vec!["x"]);
    assert_eq!(summary.outputs, vec!["z"]);
    assert_eq!(summary.transform_count(), 1);

    let json = summary.to_json().unwrap();
    assert!(json.contains("\"transform\": \"PassThrough\""));
    assert!(json.contains("\"edges\""));
    let back: flowgraph_core::GraphSummary = serde_json::from_str(&json).unwrap();
    assert_eq!(back, summary);
}

#[test]
fn test_summary_edges_record_slots() {
    let mut builder = GraphBuilder::new();
    let x = builder.add(NodeSpec::input([4]).named("x")).unwrap();
    let h = builder
        .add(NodeSpec::transform(x, |_: &[Shape], _: Option<&[Shape]>| Ok(Halves)).named("halves"))
        .unwrap();
    builder.add(NodeSpec::output((h, 1)).named("second")).unwrap();
    builder.add(NodeSpec::output((h, 0)).named("first")).unwrap();
    let graph = builder.build().unwrap();

    let edges: Vec<_> = graph
        .summary()
        .edges
        .into_iter()
        .map(|e| (e.from, e.from_slot, e.to, e.to_slot))
        .collect();
    assert_eq!(
        edges,
        vec![
            ("x".to_string(), 0, "halves".to_string(), 0),
            ("halves".to_string(), 1, "second".to_string(), 0),
            ("halves".to_string(), 0, "first".to_string(), 0),
        ]
    );
}
