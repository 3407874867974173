//! # builderfold Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the builderfold library. Import this module to get quick access to the essential
//! types for building SSA functions and running the builder-chain pass over them.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all builderfold operations
pub use crate::Error;

/// The result type used throughout builderfold
pub use crate::Result;

// ================================================================================================
// SSA Intermediate Representation
// ================================================================================================

/// Functions, blocks, instructions and values
pub use crate::analysis::{
    ConstValue, MethodRef, PhiNode, SsaBlock, SsaFunction, SsaFunctionBuilder, SsaInstruction,
    SsaOp, SsaType, SsaVarId, TypeRef,
};

/// Field references and variable metadata
pub use crate::analysis::ssa::{FieldRef, VariableOrigin};

// ================================================================================================
// Analyses
// ================================================================================================

/// Control flow, def-use and the dataflow engine
pub use crate::analysis::{
    ControlFlowGraph, DataFlowAnalysis, DataFlowSolver, DefUseIndex, JoinSemiLattice,
    SolveOutcome, Transfer,
};

// ================================================================================================
// Compiler Pipeline
// ================================================================================================

/// Pass infrastructure
pub use crate::compiler::{
    CompilerContext, EventKind, EventLog, MethodId, OptimizerConfig, PassScheduler, SsaPass,
};

/// Builder-chain optimization
pub use crate::compiler::{
    BuilderChainOptimizer, BuilderChainPass, BuilderOracle, DefaultBuilderOracle,
};
