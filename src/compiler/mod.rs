//! Compiler infrastructure for SSA-based code transformations.
//!
//! This module sits on top of [`crate::analysis`] and hosts the optimization
//! passes:
//!
//! - [`crate::analysis`] - SSA IR, CFG, dataflow engine, def-use index
//! - [`compiler`](self) - pass trait, scheduler, events, builder-chain pass
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompilerContext              Shared per-run state               │
//! │    ├─ SSA functions           (DashMap<MethodId, SsaFunction>)   │
//! │    ├─ OptimizerConfig         (enable flag, debug methods)       │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler               Fixpoint execution                  │
//! │    ├─ Methods in parallel     (rayon, one owner per method)      │
//! │    └─ Repeat until stable     (max / stable iteration limits)    │
//! │                                                                  │
//! │  SsaPass trait               Interface for all passes            │
//! │    ├─ should_run()            Cheap per-method pre-check         │
//! │    ├─ run_on_method()         Per-method transformation          │
//! │    ├─ initialize()            One-time setup before pipeline     │
//! │    └─ finalize()              Cleanup after pipeline completes   │
//! │                                                                  │
//! │  BuilderChainPass            StringBuilder/StringBuffer folding  │
//! │    ├─ Escape/alias analysis   (imbl-backed dataflow)             │
//! │    ├─ Operation graphs        (one DAG per builder value)        │
//! │    ├─ Muncher                 (bounded-round peepholes)          │
//! │    └─ Applier                 (the only IR mutation)             │
//! │                                                                  │
//! │  EventLog                    Change tracking and diagnostics     │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use builderfold::{
//!     analysis::SsaFunctionBuilder,
//!     compiler::{BuilderChainPass, CompilerContext, MethodId, PassScheduler},
//! };
//!
//! let ctx = CompilerContext::new();
//! ctx.add_method(
//!     MethodId::new(1),
//!     SsaFunctionBuilder::new(0).build_with(|f| f.block(0, |b| b.ret())),
//! );
//!
//! let mut scheduler = PassScheduler::from_config(&ctx.config);
//! scheduler.add_pass(Box::new(BuilderChainPass::new()));
//! let iterations = scheduler.run_pipeline(&ctx)?;
//! assert_eq!(iterations, 1);
//! # Ok::<(), builderfold::Error>(())
//! ```

mod config;
mod context;
mod events;
mod pass;
mod passes;
mod scheduler;

pub use config::OptimizerConfig;
pub use context::{CompilerContext, MethodId};
pub use events::{DerivedStats, Event, EventBuilder, EventKind, EventLog};
pub use pass::SsaPass;
pub use passes::builders::{
    apply_actions, construct_site, is_loop_mutated, may_contain_builder, ActionMap,
    AppendReachability, AppliedChange, ApplySummary, BuilderAction,
    BuilderChainOptimizer, BuilderChainPass, BuilderGraphs, BuilderOracle, ConcatOperand,
    DefaultBuilderOracle, EscapeAnalysis, EscapeState, GraphBuilder, InitOrAppend, InstrSite,
    MunchResult, MunchingState, OpGraph, OpNode, OpNodeId, OpNodeKind, BUILDER_CLASSES,
    DEFAULT_MUNCHING_ROUNDS,
};
pub use scheduler::PassScheduler;
