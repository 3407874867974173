//! Program analysis infrastructure.
//!
//! This module provides the foundations the optimization passes in
//! [`crate::compiler`] are built on. It builds upon the generic graph
//! infrastructure in [`crate::utils::graph`].
//!
//! # Architecture
//!
//! The analysis module is organized into focused sub-modules:
//!
//! - [`ssa`] - The SSA intermediate representation and its test builder
//! - [`cfg`] - Control flow graph view over an SSA function
//! - [`dataflow`] - Forward dataflow engine (lattice, analysis trait, solver)
//! - [`defuse`] - Def-use index over an SSA function
//!
//! # Usage
//!
//! ```rust
//! use builderfold::analysis::{
//!     ssa::{SsaFunctionBuilder, SsaType},
//!     ControlFlowGraph, DefUseIndex,
//! };
//!
//! let ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
//!     let cond = f.arg(0);
//!     f.block(0, |b| b.branch(cond, 1, 2));
//!     f.block(1, |b| b.ret());
//!     f.block(2, |b| b.ret());
//! });
//!
//! ssa.verify()?;
//! let cfg = ControlFlowGraph::from_ssa(&ssa);
//! let index = DefUseIndex::build(&ssa);
//! assert_eq!(cfg.exits().len(), 2);
//! assert_eq!(index.use_count(ssa.variables()[0].id()), 1);
//! # Ok::<(), builderfold::Error>(())
//! ```

pub mod cfg;
pub mod dataflow;
pub mod defuse;
pub mod ssa;

// Re-export primary types at module level
pub use cfg::{CfgEdge, CfgEdgeKind, ControlFlowGraph};
pub use dataflow::{
    AnalysisResults, DataFlowAnalysis, DataFlowSolver, JoinSemiLattice, SolveOutcome, Transfer,
};
pub use defuse::DefUseIndex;
pub use ssa::{
    ConstValue, MethodRef, PhiNode, SsaBlock, SsaFunction, SsaFunctionBuilder, SsaInstruction,
    SsaOp, SsaType, SsaVarId, TypeRef,
};
