//! Data flow analysis framework for SSA form.
//!
//! This module provides a generic engine for computing properties that
//! propagate forward along control flow edges.
//!
//! # Architecture
//!
//! The framework is built around three core abstractions:
//!
//! - **Lattice**: The domain of abstract values with a join operation
//! - **Analysis**: Transfer functions and boundary conditions
//! - **Solver**: Iteratively computes fixpoints using a worklist algorithm
//!
//! Transfer functions may fail. A failure stops the solver and is reported as
//! [`SolveOutcome::Failed`]; some analyses use that as their answer.
//!
//! # Thread Safety
//!
//! All types in this module are `Send` and `Sync` when the lattice is.

mod framework;
mod lattice;
mod solver;

pub use framework::{AnalysisResults, DataFlowAnalysis, SolveOutcome, Transfer};
pub use lattice::JoinSemiLattice;
pub use solver::DataFlowSolver;
