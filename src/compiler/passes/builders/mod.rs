//! Builder-chain optimization.
//!
//! Folds `StringBuilder`/`StringBuffer` chains whose content is known at
//! compile time:
//!
//! ```text
//! v0 = new StringBuilder              v3 = "ab"
//! call StringBuilder::<init>(v0)
//! v1 = "a"                       =>
//! callvirt append(String)(v0, v1)
//! v2 = "b"
//! callvirt append(String)(v0, v2)
//! v3 = callvirt toString()(v0)
//! ```
//!
//! # Pipeline
//!
//! 1. [`EscapeAnalysis`] computes, per block, which builder values are live,
//!    which escaped, and how they alias each other.
//! 2. [`GraphBuilder`] turns every builder value into an acyclic graph of
//!    operations ([`OpGraph`]), with markers for escapes, inspections,
//!    control-flow splits and loops.
//! 3. Builders that are materialized are checked for appends running more
//!    than once per allocation ([`is_loop_mutated`]).
//! 4. [`MunchingState`] applies small peephole rules to the graphs for a
//!    bounded number of rounds, recording an [`ActionMap`].
//! 5. [`apply_actions`] performs the recorded actions on the IR.
//!
//! Anything the analysis does not understand is treated as an escape, so the
//! pass never raises on unusual input; it just leaves the builder alone.
//!
//! # Usage
//!
//! ```rust
//! use builderfold::{
//!     analysis::{MethodRef, SsaFunctionBuilder, SsaOp, SsaType, TypeRef},
//!     compiler::BuilderChainOptimizer,
//! };
//!
//! let sb = TypeRef::new("StringBuilder");
//! let append = MethodRef::instance(sb.clone(), "append", vec![SsaType::string()], SsaType::Void);
//! let to_string = MethodRef::instance(sb.clone(), "toString", vec![], SsaType::string());
//!
//! let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
//!     f.block(0, |b| {
//!         let v = b.new_obj(&sb);
//!         b.call_void(MethodRef::constructor(sb.clone(), vec![]), &[v]);
//!         let x = b.const_str("a");
//!         b.callvirt_void(append.clone(), &[v, x]);
//!         let s = b.callvirt(to_string.clone(), &[v]);
//!         b.ret_val(s);
//!     });
//! });
//!
//! assert!(BuilderChainOptimizer::new().optimize(&mut ssa)?);
//! assert!(ssa
//!     .iter_instructions()
//!     .all(|(_, _, instr)| !matches!(instr.op(), SsaOp::NewObj { .. })));
//! # Ok::<(), builderfold::Error>(())
//! ```

mod action;
mod applier;
mod escape;
mod graph;
mod muncher;
mod node;
mod oracle;
mod reachability;

use std::sync::Arc;

pub use action::{ActionMap, BuilderAction, ConcatOperand};
pub use applier::{apply_actions, AppliedChange, ApplySummary};
pub use escape::{EscapeAnalysis, EscapeState};
pub use graph::{BuilderGraphs, GraphBuilder};
pub use muncher::{MunchResult, MunchingState};
pub use node::{InitOrAppend, InstrSite, OpGraph, OpNode, OpNodeId, OpNodeKind};
pub use oracle::{BuilderOracle, DefaultBuilderOracle, BUILDER_CLASSES};
pub use reachability::{construct_site, is_loop_mutated, AppendReachability};

use crate::{
    analysis::{
        dataflow::{DataFlowSolver, JoinSemiLattice},
        ControlFlowGraph, DefUseIndex, SsaFunction, SsaOp,
    },
    compiler::{pass::SsaPass, CompilerContext, EventKind, EventLog, MethodId},
    Error, Result,
};

/// Default number of muncher rounds.
pub const DEFAULT_MUNCHING_ROUNDS: usize = 3;

/// Runs the builder-chain optimization on single functions.
#[derive(Clone)]
pub struct BuilderChainOptimizer {
    oracle: Arc<dyn BuilderOracle>,
    rounds: usize,
}

impl Default for BuilderChainOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl BuilderChainOptimizer {
    /// Creates an optimizer for the standard builder classes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            oracle: Arc::new(DefaultBuilderOracle::new()),
            rounds: DEFAULT_MUNCHING_ROUNDS,
        }
    }

    /// Sets the maximum number of muncher rounds.
    #[must_use]
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    /// Replaces the classifier deciding what counts as a builder operation.
    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn BuilderOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Returns the maximum number of muncher rounds.
    #[must_use]
    pub const fn rounds(&self) -> usize {
        self.rounds
    }

    /// Optimizes `ssa` in place.
    ///
    /// Returns `true` if the function was changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the optimizer was configured with
    /// zero rounds.
    pub fn optimize(&self, ssa: &mut SsaFunction) -> Result<bool> {
        self.run(ssa, None, &EventLog::new())
    }

    /// Optimizes `ssa` in place, recording every change in `events`.
    ///
    /// # Arguments
    ///
    /// * `ssa` - The function to optimize.
    /// * `method` - Method the events are attributed to, if any.
    /// * `events` - Log receiving one event per change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the optimizer was configured with
    /// zero rounds.
    pub fn run(
        &self,
        ssa: &mut SsaFunction,
        method: Option<MethodId>,
        events: &EventLog,
    ) -> Result<bool> {
        if self.rounds == 0 {
            return Err(Error::InvalidConfig(
                "builder munching needs at least one round".to_string(),
            ));
        }
        let oracle = self.oracle.as_ref();
        if !ssa
            .iter_instructions()
            .any(|(_, _, instr)| oracle.is_construct(instr.op()))
        {
            return Ok(false);
        }

        let cfg = ControlFlowGraph::from_ssa(ssa);
        let index = DefUseIndex::build(ssa);
        let Some(escape) = DataFlowSolver::new(EscapeAnalysis::new(oracle))
            .solve(ssa, &cfg)
            .into_results()
        else {
            log::debug!("escape analysis failed, leaving builders alone");
            return Ok(false);
        };

        let graphs = GraphBuilder::new(oracle, ssa, &cfg, &index, &escape).build();
        if graphs.is_empty() {
            return Ok(false);
        }
        debug_assert!(
            graphs
                .roots
                .keys()
                .all(|value| escape.out_states.iter().any(|state| state.is_live(*value))),
            "every graph root is a live builder"
        );

        let joined = escape
            .out_states
            .iter()
            .fold(EscapeState::default(), |acc, state| acc.join(state));
        let mut state = MunchingState::new(oracle, ssa, &index, graphs);
        for (value, construct) in state.loop_check_candidates() {
            let aliases = joined.alias_closure(value).into_iter().collect();
            if is_loop_mutated(oracle, ssa, &cfg, construct, aliases) {
                state.mark_loop_mutated(value);
            }
        }
        let rounds = state.munch(self.rounds);
        let result = state.finish(rounds);
        log::trace!(
            "builder munching finished after {} round(s) with {} action(s)",
            result.rounds,
            result.actions.len()
        );
        if result.actions.is_empty() {
            return Ok(false);
        }

        let summary = apply_actions(ssa, &result.actions, &result.fresh_values);
        debug_assert!(ssa.verify().is_ok(), "builder rewrite left malformed IR");

        for change in &summary.changes {
            let event = events.record(change.kind);
            let event = match method {
                Some(method) => event.at(method, change.site.index),
                None => event,
            };
            event.message(change.site.to_string());
        }
        for _ in 0..summary.phis_removed {
            let event = events.record(EventKind::PhiRemoved);
            if let Some(method) = method {
                event.method(method);
            }
        }
        Ok(summary.changed())
    }
}

/// Returns `true` if `ssa` may contain a builder: it allocates something or
/// makes a virtual call.
#[must_use]
pub fn may_contain_builder(ssa: &SsaFunction) -> bool {
    ssa.iter_instructions().any(|(_, _, instr)| {
        matches!(instr.op(), SsaOp::NewObj { .. } | SsaOp::CallVirt { .. })
    })
}

/// Builder-chain optimization pass.
///
/// Runs [`BuilderChainOptimizer`] on every method, unless the optimization is
/// disabled in [`crate::compiler::OptimizerConfig`] or the method is compiled
/// in debug mode.
#[derive(Clone, Default)]
pub struct BuilderChainPass {
    optimizer: BuilderChainOptimizer,
}

impl BuilderChainPass {
    /// Creates a new builder-chain pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pass around a configured optimizer.
    #[must_use]
    pub fn with_optimizer(optimizer: BuilderChainOptimizer) -> Self {
        Self { optimizer }
    }
}

impl SsaPass for BuilderChainPass {
    fn name(&self) -> &'static str {
        "builder-chain"
    }

    fn description(&self) -> &'static str {
        "Folds StringBuilder/StringBuffer chains with known content into constants"
    }

    fn should_run(&self, method: MethodId, ctx: &CompilerContext) -> bool {
        if !ctx.config.enable_builder_optimization || ctx.config.is_debug(method) {
            return false;
        }
        ctx.methods
            .get(&method)
            .is_some_and(|ssa| may_contain_builder(&ssa))
    }

    fn initialize(&mut self, ctx: &CompilerContext) -> Result<()> {
        self.optimizer = self
            .optimizer
            .clone()
            .with_rounds(ctx.config.munching_rounds);
        Ok(())
    }

    fn run_on_method(
        &self,
        ssa: &mut SsaFunction,
        method: MethodId,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        let events = EventLog::new();
        let changed = self.optimizer.run(ssa, Some(method), &events)?;
        if changed {
            log::debug!("{}: {method} changed ({} events)", self.name(), events.len());
            ctx.events.merge(events);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{MethodRef, SsaFunctionBuilder, SsaType, TypeRef},
        compiler::OptimizerConfig,
    };

    fn sb() -> TypeRef {
        TypeRef::new("StringBuilder")
    }

    fn chain() -> SsaFunction {
        let append = MethodRef::instance(sb(), "append", vec![SsaType::string()], SsaType::Void);
        let to_string = MethodRef::instance(sb(), "toString", vec![], SsaType::string());
        SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let v = b.new_obj(&sb());
                b.call_void(MethodRef::constructor(sb(), vec![]), &[v]);
                let x = b.const_str("x");
                b.callvirt_void(append.clone(), &[v, x]);
                let y = b.const_str("y");
                b.callvirt_void(append, &[v, y]);
                let s = b.callvirt(to_string, &[v]);
                b.ret_val(s);
            });
        })
    }

    #[test]
    fn test_optimize_folds_chain() -> Result<()> {
        let mut ssa = chain();
        let events = EventLog::new();
        assert!(BuilderChainOptimizer::new().run(&mut ssa, None, &events)?);

        assert_eq!(events.count(EventKind::ConstantFolded), 1);
        assert_eq!(events.count(EventKind::BuilderRemoved), 1);
        let constants: Vec<_> = ssa
            .iter_instructions()
            .filter_map(|(_, _, instr)| match instr.op() {
                SsaOp::Const { value, .. } => value.as_str().map(str::to_string),
                _ => None,
            })
            .collect();
        assert!(constants.contains(&"xy".to_string()));
        assert!(ssa.iter_instructions().all(|(_, _, instr)| !instr.op().is_invoke()));
        Ok(())
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let mut ssa = chain();
        let result = BuilderChainOptimizer::new().with_rounds(0).optimize(&mut ssa);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_second_run_is_noop() -> Result<()> {
        let mut ssa = chain();
        let optimizer = BuilderChainOptimizer::new();
        assert!(optimizer.optimize(&mut ssa)?);
        let after = ssa.clone();
        assert!(!optimizer.optimize(&mut ssa)?);
        assert_eq!(format!("{ssa:?}"), format!("{after:?}"));
        Ok(())
    }

    #[test]
    fn test_pass_respects_debug_methods() {
        let method = MethodId::new(3);
        let ctx = CompilerContext::with_config(OptimizerConfig::default().with_debug_method(method));
        ctx.add_method(method, chain());
        ctx.add_method(MethodId::new(4), chain());

        let pass = BuilderChainPass::new();
        assert!(!pass.should_run(method, &ctx));
        assert!(pass.should_run(MethodId::new(4), &ctx));
    }

    #[test]
    fn test_pass_skips_methods_without_candidates() {
        let ctx = CompilerContext::new();
        let method = MethodId::new(1);
        ctx.add_method(
            method,
            SsaFunctionBuilder::new(0).build_with(|f| f.block(0, |b| b.ret())),
        );
        assert!(!BuilderChainPass::new().should_run(method, &ctx));
    }
}
