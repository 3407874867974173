//! Loop mutation check.
//!
//! A chain built by appends that run more than once per allocation cannot be
//! replaced by a single constant, even when every append adds a constant:
//!
//! ```text
//! sb = new StringBuilder()
//! loop:
//!   sb.append("x")        // content depends on the trip count
//! s = sb.toString()
//! ```
//!
//! The operation graph cannot see this because back edges are not part of it.
//! This analysis walks the CFG instead, carrying the set of append sites
//! executed on the current builder instance. Reaching an append whose site is
//! already in the set means the append repeats on the same instance, and the
//! transfer fails. The allocation starts a fresh instance and a
//! materialization consumes the content built so far; both reset the set.

use rustc_hash::FxHashSet;

use crate::{
    analysis::{
        dataflow::{DataFlowAnalysis, DataFlowSolver, Transfer},
        ControlFlowGraph, SsaFunction, SsaInstruction, SsaOp, SsaVarId,
    },
    compiler::passes::builders::{node::InstrSite, oracle::BuilderOracle},
};

/// Forward analysis tracking the append sites executed on one builder.
pub struct AppendReachability<'a> {
    oracle: &'a dyn BuilderOracle,
    construct: InstrSite,
    aliases: FxHashSet<SsaVarId>,
}

impl<'a> AppendReachability<'a> {
    /// Creates the analysis for the builder allocated at `construct`.
    ///
    /// `aliases` holds every value that may denote the builder.
    #[must_use]
    pub fn new(
        oracle: &'a dyn BuilderOracle,
        construct: InstrSite,
        aliases: FxHashSet<SsaVarId>,
    ) -> Self {
        Self {
            oracle,
            construct,
            aliases,
        }
    }

    fn is_alias(&self, value: SsaVarId) -> bool {
        self.aliases.contains(&value)
    }
}

impl DataFlowAnalysis for AppendReachability<'_> {
    type Lattice = imbl::HashSet<InstrSite>;

    fn boundary(&self, _ssa: &SsaFunction) -> Self::Lattice {
        imbl::HashSet::new()
    }

    fn initial(&self, _ssa: &SsaFunction) -> Self::Lattice {
        imbl::HashSet::new()
    }

    fn transfer_instruction(
        &self,
        block_id: usize,
        index: usize,
        instr: &SsaInstruction,
        mut state: Self::Lattice,
        _ssa: &SsaFunction,
    ) -> Transfer<Self::Lattice> {
        let site = InstrSite::new(block_id, index);
        if site == self.construct {
            return Transfer::Continue(imbl::HashSet::new());
        }

        let op = instr.op();
        let Some((_, args)) = op.as_invoke() else {
            return Transfer::Continue(state);
        };
        let Some(&receiver) = args.first() else {
            return Transfer::Continue(state);
        };
        if !self.is_alias(receiver) {
            return Transfer::Continue(state);
        }

        if self.oracle.is_append(op) {
            if state.insert(site).is_some() {
                return Transfer::Failed;
            }
        } else if self.oracle.is_materialize(op, receiver) {
            state = imbl::HashSet::new();
        }
        Transfer::Continue(state)
    }
}

/// Returns `true` if an append on the builder allocated at `construct` may
/// run more than once per allocation.
#[must_use]
pub fn is_loop_mutated(
    oracle: &dyn BuilderOracle,
    ssa: &SsaFunction,
    cfg: &ControlFlowGraph,
    construct: InstrSite,
    aliases: FxHashSet<SsaVarId>,
) -> bool {
    let outcome =
        DataFlowSolver::new(AppendReachability::new(oracle, construct, aliases)).solve(ssa, cfg);
    if outcome.is_failed() {
        log::trace!("builder allocated at {construct} is mutated in a loop");
    }
    outcome.is_failed()
}

/// Returns the site of the allocation defining `value`, if it is a builder
/// allocation.
#[must_use]
pub fn construct_site(
    oracle: &dyn BuilderOracle,
    ssa: &SsaFunction,
    value: SsaVarId,
) -> Option<InstrSite> {
    ssa.iter_instructions().find_map(|(block, index, instr)| {
        let op = instr.op();
        (matches!(op, SsaOp::NewObj { dest, .. } if *dest == value) && oracle.is_construct(op))
            .then_some(InstrSite::new(block, index))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{
            ssa::{MethodRef, SsaType, TypeRef},
            SsaFunctionBuilder,
        },
        compiler::passes::builders::oracle::DefaultBuilderOracle,
    };

    fn sb() -> TypeRef {
        TypeRef::new("StringBuilder")
    }

    fn append() -> MethodRef {
        MethodRef::instance(sb(), "append", vec![SsaType::string()], SsaType::Void)
    }

    fn to_string() -> MethodRef {
        MethodRef::instance(sb(), "toString", vec![], SsaType::string())
    }

    fn check(ssa: &SsaFunction, builder: SsaVarId) -> bool {
        let oracle = DefaultBuilderOracle::new();
        let cfg = ControlFlowGraph::from_ssa(ssa);
        let construct = construct_site(&oracle, ssa, builder).expect("builder allocation");
        is_loop_mutated(&oracle, ssa, &cfg, construct, [builder].into_iter().collect())
    }

    #[test]
    fn test_append_in_loop_is_mutated() {
        let mut builder = SsaVarId::new(0);
        let ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
            let cond = f.arg(0);
            f.block(0, |b| {
                builder = b.new_obj(&sb());
                b.jump(1);
            });
            f.block(1, |b| b.branch(cond, 2, 3));
            f.block(2, |b| {
                let x = b.const_str("x");
                b.callvirt_void(append(), &[builder, x]);
                b.jump(1);
            });
            f.block(3, |b| {
                let _ = b.callvirt(to_string(), &[builder]);
                b.ret();
            });
        });
        assert!(check(&ssa, builder));
    }

    #[test]
    fn test_allocation_inside_loop_is_not_mutated() {
        let mut builder = SsaVarId::new(0);
        let ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
            let cond = f.arg(0);
            f.block(0, |b| b.jump(1));
            f.block(1, |b| b.branch(cond, 2, 3));
            f.block(2, |b| {
                builder = b.new_obj(&sb());
                let x = b.const_str("x");
                b.callvirt_void(append(), &[builder, x]);
                let _ = b.callvirt(to_string(), &[builder]);
                b.jump(1);
            });
            f.block(3, |b| b.ret());
        });
        assert!(!check(&ssa, builder));
    }

    #[test]
    fn test_append_retried_from_handler_is_mutated() {
        // The handler re-enters the guarded block, which materializes before leaving
        let mut builder = SsaVarId::new(0);
        let ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                builder = b.new_obj(&sb());
                b.jump(1);
            });
            f.block(1, |b| {
                b.handler(2);
                let x = b.const_str("x");
                b.callvirt_void(append(), &[builder, x]);
                let _ = b.callvirt(to_string(), &[builder]);
                b.jump(3);
            });
            f.block(2, |b| b.jump(1));
            f.block(3, |b| b.ret());
        });
        assert!(check(&ssa, builder));
    }

    #[test]
    fn test_straight_line_is_not_mutated() {
        let mut builder = SsaVarId::new(0);
        let ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                builder = b.new_obj(&sb());
                let x = b.const_str("x");
                b.callvirt_void(append(), &[builder, x]);
                b.callvirt_void(append(), &[builder, x]);
                b.ret();
            });
        });
        assert!(!check(&ssa, builder));
    }
}
