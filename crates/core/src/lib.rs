//! # Flowgraph Core - Invertible Computation Graphs
//!
//! This crate builds and runs graphs of reversible transformations, the
//! skeleton of a normalizing flow:
//!
//! - **Nodes**: boundary markers or wrapped transforms, wired by
//!   [`EdgeRef`]s (producer + output slot)
//! - **Scheduling**: Kahn's algorithm from the outputs back to the inputs,
//!   rejecting cycles and disconnected inputs
//! - **Execution**: one walk over the order, forward (data → latent) or
//!   backward (latent → data), summing per-sample log-Jacobians
//!
//! Concrete transforms are not part of this crate; anything implementing
//! [`InvertibleTransform`] can be wrapped in a node.
//!
//! ## Example
//!
//! ```rust
//! use flowgraph_core::{GraphBuilder, NodeSpec, RunOptions, Tensor};
//! use ndarray::IxDyn;
//!
//! let mut builder = GraphBuilder::new();
//! let x = builder.add(NodeSpec::input([3]).named("x")).unwrap();
//! builder.add(NodeSpec::output(x).named("z")).unwrap();
//! let graph = builder.build().unwrap();
//!
//! let batch = Tensor::ones(IxDyn(&[4, 3]));
//! let result = graph.run(&[batch.clone()], &[], RunOptions::forward()).unwrap();
//! assert_eq!(result.output.single(), Some(&batch));
//! ```

pub mod config;
pub mod error;
pub mod exec;
pub mod graph;
pub mod node;
pub mod shape;
pub mod summary;
pub mod tensor;
pub mod topo;
pub mod transform;

// Re-export key types at crate root for convenience
pub use config::GraphConfig;
pub use error::GraphError;
pub use exec::{EdgeValues, Execution, GraphOutput, RunOptions};
pub use graph::{GraphBuilder, ReversibleGraph};
pub use node::{EdgeRef, Inputs, Node, NodeId, NodeKind, NodeSpec};
pub use shape::Shape;
pub use summary::{EdgeSummary, GraphSummary, NodeSummary};
pub use tensor::{LogJacobian, Tensor};
pub use topo::topological_order;
pub use transform::{Direction, InvertibleTransform, TransformOutput};
