//! Graph algorithms.
//!
//! Only traversal orders are needed by the analyses in this crate: the dataflow
//! solver seeds its worklist in reverse postorder, and tests use preorder walks.

mod traversal;

pub use traversal::{dfs, postorder, reverse_postorder, DfsIterator};
