//! Control Flow Graph (CFG) construction.
//!
//! The CFG is derived from an [`SsaFunction`](crate::analysis::ssa::SsaFunction):
//! one node per block, with edges from terminators and from protected blocks to
//! their exception handlers. It implements the generic traits in
//! [`crate::utils::graph`], so traversal algorithms apply directly.
//!
//! # Key Components
//!
//! - [`ControlFlowGraph`] - The graph itself
//! - [`CfgEdge`] - Edge with target and kind
//! - [`CfgEdgeKind`] - Unconditional, conditional or exceptional flow

mod edge;
mod graph;

pub use edge::{CfgEdge, CfgEdgeKind};
pub use graph::ControlFlowGraph;
