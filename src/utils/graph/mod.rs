//! Generic directed graph infrastructure for program analysis.
//!
//! The graph module is organized into:
//!
//! - **Core Types**: [`NodeId`] is the strongly-typed node identifier
//! - **Traits**: [`GraphBase`], [`Successors`], [`Predecessors`] and [`RootedGraph`]
//!   let algorithms work with different graph types
//! - **Algorithms**: traversal orders in [`algorithms`]
//!
//! The control flow graph in [`crate::analysis::cfg`] implements the traits. The
//! builder operation graphs use their own arena, since their nodes are rewritten
//! in place by the muncher.

pub mod algorithms;
mod node;
mod traits;

pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
