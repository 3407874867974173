//! Worklist-based data flow solver.
//!
//! # Algorithm
//!
//! 1. Initialize every block with the initial (bottom) value
//! 2. Add all reachable blocks to the worklist in reverse postorder
//! 3. While the worklist is non-empty:
//!    a. Remove a block from the worklist
//!    b. Join the boundary (entry only) with the outputs of all predecessors
//!    c. Apply the transfer function to get the output
//!    d. If the output changed, add the successors to the worklist
//!
//! A handler block joins more than the out-states of the blocks it protects:
//! an exception may leave a protected block before its last instruction, so
//! the handler also receives the state in front of every instruction that may
//! throw. Analyses whose state shrinks along a block (a reset at a
//! materialization, for instance) stay sound across handler edges.
//!
//! # Complexity
//!
//! On reducible CFGs the solver converges in a small number of passes over
//! the blocks; total work is O(n * h) where h is the lattice height.

use std::collections::VecDeque;

use crate::{
    analysis::{
        dataflow::{
            framework::{AnalysisResults, DataFlowAnalysis, SolveOutcome, Transfer},
            lattice::JoinSemiLattice,
        },
        ControlFlowGraph, SsaFunction,
    },
    utils::graph::{NodeId, Predecessors, RootedGraph, Successors},
};

/// Worklist-based forward data flow solver.
pub struct DataFlowSolver<A: DataFlowAnalysis> {
    /// The analysis being solved.
    analysis: A,
    /// Input state for each block.
    in_states: Vec<A::Lattice>,
    /// Output state for each block.
    out_states: Vec<A::Lattice>,
    /// State carried to the handlers of each protected block.
    thrown_states: Vec<Option<A::Lattice>>,
    /// Worklist of blocks to process.
    worklist: VecDeque<usize>,
    /// Whether each block is currently in the worklist (for deduplication).
    in_worklist: Vec<bool>,
    /// Number of block visits performed.
    iterations: usize,
}

impl<A: DataFlowAnalysis> DataFlowSolver<A> {
    /// Creates a new solver for the given analysis.
    #[must_use]
    pub fn new(analysis: A) -> Self {
        Self {
            analysis,
            in_states: Vec::new(),
            out_states: Vec::new(),
            thrown_states: Vec::new(),
            worklist: VecDeque::new(),
            in_worklist: Vec::new(),
            iterations: 0,
        }
    }

    /// Solves the analysis to a fixpoint, or reports the block whose
    /// transfer failed.
    pub fn solve(mut self, ssa: &SsaFunction, cfg: &ControlFlowGraph) -> SolveOutcome<A::Lattice> {
        if ssa.block_count() == 0 {
            return SolveOutcome::Fixpoint(AnalysisResults::new(Vec::new(), Vec::new()));
        }

        self.initialize(ssa, cfg);
        if let Err(block) = self.iterate(ssa, cfg) {
            log::trace!(
                "dataflow transfer failed in B{block} after {} iterations",
                self.iterations
            );
            return SolveOutcome::Failed { block };
        }

        SolveOutcome::Fixpoint(AnalysisResults::new(self.in_states, self.out_states))
    }

    /// Returns the number of block visits performed so far.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    fn initialize(&mut self, ssa: &SsaFunction, cfg: &ControlFlowGraph) {
        let num_blocks = ssa.block_count();
        let initial = self.analysis.initial(ssa);

        self.in_states = vec![initial.clone(); num_blocks];
        self.out_states = vec![initial; num_blocks];
        self.thrown_states = vec![None; num_blocks];
        self.in_worklist = vec![false; num_blocks];

        for node in cfg.reverse_postorder() {
            let idx = node.index();
            if idx < num_blocks {
                self.worklist.push_back(idx);
                self.in_worklist[idx] = true;
            }
        }
    }

    /// Runs the worklist to exhaustion; `Err` carries the failing block.
    fn iterate(&mut self, ssa: &SsaFunction, cfg: &ControlFlowGraph) -> Result<(), usize> {
        while let Some(block_idx) = self.worklist.pop_front() {
            self.in_worklist[block_idx] = false;
            self.iterations += 1;

            if self.process(block_idx, ssa, cfg)? {
                for succ in cfg.successors(NodeId::new(block_idx)) {
                    let idx = succ.index();
                    if idx < self.in_worklist.len() && !self.in_worklist[idx] {
                        self.worklist.push_back(idx);
                        self.in_worklist[idx] = true;
                    }
                }
            }
        }
        Ok(())
    }

    /// Processes one block. Returns `true` if its output state changed.
    fn process(
        &mut self,
        block_idx: usize,
        ssa: &SsaFunction,
        cfg: &ControlFlowGraph,
    ) -> Result<bool, usize> {
        let node = NodeId::new(block_idx);
        let mut input = if node == cfg.entry() {
            Some(self.analysis.boundary(ssa))
        } else {
            None
        };
        for pred in cfg.predecessors(node) {
            let pred_out = &self.out_states[pred.index()];
            input = Some(match input {
                None => pred_out.clone(),
                Some(acc) => acc.join(pred_out),
            });

            let protected = ssa
                .block(pred.index())
                .is_some_and(|b| b.handlers().contains(&block_idx));
            let thrown = self.thrown_states[pred.index()].as_ref();
            if let Some(thrown) = thrown.filter(|_| protected) {
                input = input.map(|acc| acc.join(thrown));
            }
        }
        let input = input.unwrap_or_else(|| self.in_states[block_idx].clone());

        let Some(block) = ssa.block(block_idx) else {
            return Ok(false);
        };
        let output = match self.analysis.transfer(block_idx, block, &input, ssa) {
            Transfer::Continue(output) => output,
            Transfer::Failed => return Err(block_idx),
        };
        let thrown = if block.has_catch_handlers() {
            match self.analysis.transfer_thrown(block_idx, block, &input, ssa) {
                Transfer::Continue(thrown) => thrown,
                Transfer::Failed => return Err(block_idx),
            }
        } else {
            None
        };
        self.in_states[block_idx] = input;

        let changed =
            output != self.out_states[block_idx] || thrown != self.thrown_states[block_idx];
        self.out_states[block_idx] = output;
        self.thrown_states[block_idx] = thrown;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        ssa::{SsaFunctionBuilder, SsaInstruction, SsaOp, SsaType},
        MethodRef, SsaVarId, TypeRef,
    };

    /// Tracks which constants are defined on some path; fails on `Throw`.
    struct MayDefine;

    impl DataFlowAnalysis for MayDefine {
        type Lattice = imbl::HashSet<SsaVarId>;

        fn boundary(&self, _ssa: &SsaFunction) -> Self::Lattice {
            imbl::HashSet::new()
        }

        fn initial(&self, _ssa: &SsaFunction) -> Self::Lattice {
            imbl::HashSet::new()
        }

        fn transfer_instruction(
            &self,
            _block_id: usize,
            _index: usize,
            instr: &SsaInstruction,
            mut state: Self::Lattice,
            _ssa: &SsaFunction,
        ) -> Transfer<Self::Lattice> {
            match instr.op() {
                SsaOp::Const { dest, .. } => {
                    state.insert(*dest);
                    Transfer::Continue(state)
                }
                SsaOp::Throw { .. } => Transfer::Failed,
                _ => Transfer::Continue(state),
            }
        }
    }

    #[test]
    fn test_diamond_joins_both_arms() {
        let (mut a, mut b) = (SsaVarId::new(0), SsaVarId::new(0));
        let ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
            let cond = f.arg(0);
            f.block(0, |blk| blk.branch(cond, 1, 2));
            f.block(1, |blk| {
                a = blk.const_i32(1);
                blk.jump(3);
            });
            f.block(2, |blk| {
                b = blk.const_i32(2);
                blk.jump(3);
            });
            f.block(3, |blk| blk.ret());
        });
        let cfg = ControlFlowGraph::from_ssa(&ssa);

        let results = DataFlowSolver::new(MayDefine)
            .solve(&ssa, &cfg)
            .into_results()
            .expect("no throw, so no failure");
        let merged = results.in_state(3).expect("block 3");
        assert!(merged.contains(&a) && merged.contains(&b));
        assert!(!results.in_state(1).expect("block 1").contains(&b));
    }

    #[test]
    fn test_loop_reaches_fixpoint() {
        let mut inner = SsaVarId::new(0);
        let ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
            let cond = f.arg(0);
            f.block(0, |blk| blk.jump(1));
            f.block(1, |blk| blk.branch(cond, 2, 3));
            f.block(2, |blk| {
                inner = blk.const_i32(1);
                blk.jump(1);
            });
            f.block(3, |blk| blk.ret());
        });
        let cfg = ControlFlowGraph::from_ssa(&ssa);

        let results = DataFlowSolver::new(MayDefine)
            .solve(&ssa, &cfg)
            .into_results()
            .expect("fixpoint");
        // Defined in the body, visible at the header via the back edge
        assert!(results.in_state(1).expect("header").contains(&inner));
        assert!(results.in_state(3).expect("exit").contains(&inner));
    }

    #[test]
    fn test_failure_reports_block() {
        let ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |blk| blk.jump(1));
            f.block(1, |blk| {
                let n = blk.const_null();
                blk.throw(n);
            });
        });
        let cfg = ControlFlowGraph::from_ssa(&ssa);

        let outcome = DataFlowSolver::new(MayDefine).solve(&ssa, &cfg);
        assert!(matches!(outcome, SolveOutcome::Failed { block: 1 }));
    }

    /// Tracks constants defined since the last call.
    struct SinceLastCall;

    impl DataFlowAnalysis for SinceLastCall {
        type Lattice = imbl::HashSet<SsaVarId>;

        fn boundary(&self, _ssa: &SsaFunction) -> Self::Lattice {
            imbl::HashSet::new()
        }

        fn initial(&self, _ssa: &SsaFunction) -> Self::Lattice {
            imbl::HashSet::new()
        }

        fn transfer_instruction(
            &self,
            _block_id: usize,
            _index: usize,
            instr: &SsaInstruction,
            mut state: Self::Lattice,
            _ssa: &SsaFunction,
        ) -> Transfer<Self::Lattice> {
            match instr.op() {
                SsaOp::Const { dest, .. } => {
                    state.insert(*dest);
                }
                SsaOp::Call { .. } => state.clear(),
                _ => {}
            }
            Transfer::Continue(state)
        }
    }

    #[test]
    fn test_handler_sees_state_before_throwing_call() {
        let mut pending = SsaVarId::new(0);
        let ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |blk| {
                blk.handler(2);
                pending = blk.const_i32(1);
                blk.call_void(
                    MethodRef::static_method(TypeRef::new("Helper"), "foo", vec![], SsaType::Void),
                    &[],
                );
                blk.jump(1);
            });
            f.block(1, |blk| blk.ret());
            f.block(2, |blk| blk.ret());
        });
        let cfg = ControlFlowGraph::from_ssa(&ssa);

        let results = DataFlowSolver::new(SinceLastCall)
            .solve(&ssa, &cfg)
            .into_results()
            .expect("fixpoint");
        // The out-state was cleared by the call, the handler still sees the constant
        assert!(results.out_state(0).expect("block 0").is_empty());
        assert!(results.in_state(1).expect("block 1").is_empty());
        assert!(results.in_state(2).expect("handler").contains(&pending));
    }

    #[test]
    fn test_unreachable_block_keeps_initial() {
        let ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |blk| blk.ret());
            f.block(1, |blk| {
                let _ = blk.const_i32(5);
                blk.ret();
            });
        });
        let cfg = ControlFlowGraph::from_ssa(&ssa);

        let results = DataFlowSolver::new(MayDefine)
            .solve(&ssa, &cfg)
            .into_results()
            .expect("fixpoint");
        assert!(results.out_state(1).expect("block 1").is_empty());
    }
}
