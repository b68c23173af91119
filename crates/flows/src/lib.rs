//! # Flows - Reference Invertible Transforms
//!
//! Building blocks for normalizing flows on top of `flowgraph-core`. Every
//! transform implements [`InvertibleTransform`](flowgraph_core::InvertibleTransform)
//! and exposes a `factory(..)` constructor that can be handed to
//! [`NodeSpec::transform`](flowgraph_core::NodeSpec::transform); the graph
//! calls it with the node's input and condition shapes.
//!
//! ## Modules
//!
//! - [`identity`] - pass-through
//! - [`scale`] - elementwise scaling by a constant
//! - [`split`] - split and concatenate along the first feature axis
//! - [`permute`] - fixed feature permutations
//! - [`coupling`] - affine coupling blocks, optionally conditioned
//! - [`numerical`] - finite-difference log-Jacobian and round-trip checks
//! - [`ops`] - feature-axis helpers
//!
//! ## Example
//!
//! ```rust
//! use flowgraph_core::{GraphBuilder, NodeSpec};
//! use flowgraph_flows::{AffineCoupling, Permute};
//! use ndarray::array;
//!
//! let mut builder = GraphBuilder::new();
//! let x = builder.add(NodeSpec::input([4])).unwrap();
//! let a = builder.add(NodeSpec::transform(x, AffineCoupling::factory(2.0, 1))).unwrap();
//! let p = builder.add(NodeSpec::transform(a, Permute::reverse())).unwrap();
//! let b = builder.add(NodeSpec::transform(p, AffineCoupling::factory(2.0, 2))).unwrap();
//! builder.add(NodeSpec::output(b)).unwrap();
//! let flow = builder.build().unwrap();
//!
//! let x = array![[0.1f32, 0.2, 0.3, 0.4]].into_dyn();
//! let z = flow.forward(&[x.clone()], &[]).unwrap();
//! let back = flow.backward(&z.output.into_tensors().unwrap(), &[]).unwrap();
//! assert!(back.output.single().unwrap().abs_diff_eq(&x, 1e-5));
//! ```

pub mod coupling;
pub mod identity;
pub mod numerical;
pub mod ops;
pub mod permute;
pub mod scale;
pub mod split;

pub use coupling::AffineCoupling;
pub use identity::Identity;
pub use numerical::{
    check_log_jacobian, check_round_trip, log_jacobian_numerical, JacobianCheckError,
};
pub use permute::Permute;
pub use scale::Scale;
pub use split::{Concat, Split};
