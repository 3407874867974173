//! Data flow analysis framework trait.
//!
//! This module defines the core abstraction for forward data flow analyses.
//! A specific analysis implements [`DataFlowAnalysis`] by providing boundary
//! and initial states plus per-phi and per-instruction transfer functions;
//! the [`DataFlowSolver`](crate::analysis::dataflow::DataFlowSolver) handles
//! iteration to a fixpoint.

use crate::analysis::{
    dataflow::lattice::JoinSemiLattice,
    ssa::{PhiNode, SsaBlock, SsaFunction, SsaInstruction},
};

/// Result of a transfer function.
///
/// A transfer may give up on the whole analysis. This is not an error: the
/// failure is an answer in its own right (for example "an append reaches
/// itself"), and the solver reports it as [`SolveOutcome::Failed`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transfer<L> {
    /// The state after the phi or instruction.
    Continue(L),

    /// The analysis cannot continue past this point.
    Failed,
}

impl<L> Transfer<L> {
    /// Returns `true` if the transfer failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// A forward data flow analysis over SSA form.
///
/// # Transfer Functions
///
/// `out[B] = transfer(B, in[B])`, where `in[B]` is the join of the boundary
/// state (entry block only) and the out-states of all predecessors. A handler
/// block also joins the [`transfer_thrown`](Self::transfer_thrown) state of
/// every block it protects. The
/// default [`transfer`](Self::transfer) threads the state through the phis of
/// the block and then through each instruction, stopping at the first
/// failure.
///
/// # Example
///
/// ```rust
/// use builderfold::analysis::{
///     dataflow::{DataFlowAnalysis, DataFlowSolver, SolveOutcome, Transfer},
///     ssa::{SsaFunction, SsaFunctionBuilder, SsaInstruction},
///     ControlFlowGraph,
/// };
///
/// /// Collects every variable defined on some path to each block.
/// struct Defined;
///
/// impl DataFlowAnalysis for Defined {
///     type Lattice = imbl::HashSet<usize>;
///
///     fn boundary(&self, _ssa: &SsaFunction) -> Self::Lattice {
///         imbl::HashSet::new()
///     }
///
///     fn initial(&self, _ssa: &SsaFunction) -> Self::Lattice {
///         imbl::HashSet::new()
///     }
///
///     fn transfer_instruction(
///         &self,
///         _block_id: usize,
///         _index: usize,
///         instr: &SsaInstruction,
///         mut state: Self::Lattice,
///         _ssa: &SsaFunction,
///     ) -> Transfer<Self::Lattice> {
///         if let Some(dest) = instr.def() {
///             state.insert(dest.index());
///         }
///         Transfer::Continue(state)
///     }
/// }
///
/// let ssa = SsaFunctionBuilder::new(0).build_with(|f| {
///     f.block(0, |b| {
///         let _ = b.const_i32(1);
///         b.jump(1);
///     });
///     f.block(1, |b| b.ret());
/// });
/// let cfg = ControlFlowGraph::from_ssa(&ssa);
///
/// match DataFlowSolver::new(Defined).solve(&ssa, &cfg) {
///     SolveOutcome::Fixpoint(results) => {
///         assert_eq!(results.in_state(1).map(imbl::HashSet::len), Some(1));
///     }
///     SolveOutcome::Failed { .. } => unreachable!(),
/// }
/// ```
pub trait DataFlowAnalysis {
    /// The lattice type for this analysis.
    type Lattice: JoinSemiLattice;

    /// Returns the state at function entry.
    fn boundary(&self, ssa: &SsaFunction) -> Self::Lattice;

    /// Returns the initial state of every block before iteration.
    ///
    /// This is the bottom element. Blocks unreachable from the entry keep it.
    fn initial(&self, ssa: &SsaFunction) -> Self::Lattice;

    /// Applies the phi nodes at the head of `block`.
    ///
    /// The default leaves the state unchanged.
    fn transfer_phis(
        &self,
        _block_id: usize,
        _phis: &[PhiNode],
        state: Self::Lattice,
        _ssa: &SsaFunction,
    ) -> Transfer<Self::Lattice> {
        Transfer::Continue(state)
    }

    /// Applies a single instruction.
    fn transfer_instruction(
        &self,
        block_id: usize,
        index: usize,
        instr: &SsaInstruction,
        state: Self::Lattice,
        ssa: &SsaFunction,
    ) -> Transfer<Self::Lattice>;

    /// Computes the out-state of a block from its in-state.
    fn transfer(
        &self,
        block_id: usize,
        block: &SsaBlock,
        input: &Self::Lattice,
        ssa: &SsaFunction,
    ) -> Transfer<Self::Lattice> {
        let mut state = match self.transfer_phis(block_id, block.phi_nodes(), input.clone(), ssa)
        {
            Transfer::Continue(state) => state,
            Transfer::Failed => return Transfer::Failed,
        };
        for (index, instr) in block.instructions().iter().enumerate() {
            state = match self.transfer_instruction(block_id, index, instr, state, ssa) {
                Transfer::Continue(state) => state,
                Transfer::Failed => return Transfer::Failed,
            };
        }
        Transfer::Continue(state)
    }

    /// Computes the state carried along the exception handler edges of
    /// `block`: the join of the states in front of every instruction that
    /// may throw, or `None` if none may.
    fn transfer_thrown(
        &self,
        block_id: usize,
        block: &SsaBlock,
        input: &Self::Lattice,
        ssa: &SsaFunction,
    ) -> Transfer<Option<Self::Lattice>> {
        let mut state = match self.transfer_phis(block_id, block.phi_nodes(), input.clone(), ssa)
        {
            Transfer::Continue(state) => state,
            Transfer::Failed => return Transfer::Failed,
        };
        let mut thrown: Option<Self::Lattice> = None;
        for (index, instr) in block.instructions().iter().enumerate() {
            if instr.may_throw() {
                thrown = Some(match thrown {
                    None => state.clone(),
                    Some(acc) => acc.join(&state),
                });
            }
            state = match self.transfer_instruction(block_id, index, instr, state, ssa) {
                Transfer::Continue(state) => state,
                Transfer::Failed => return Transfer::Failed,
            };
        }
        Transfer::Continue(thrown)
    }
}

/// Results of a data flow analysis.
///
/// This provides access to the computed abstract values at block boundaries.
#[derive(Debug, Clone)]
pub struct AnalysisResults<L> {
    /// Input state for each block (before transfer function).
    pub in_states: Vec<L>,
    /// Output state for each block (after transfer function).
    pub out_states: Vec<L>,
}

impl<L> AnalysisResults<L> {
    /// Creates new analysis results with the given states.
    #[must_use]
    pub fn new(in_states: Vec<L>, out_states: Vec<L>) -> Self {
        Self {
            in_states,
            out_states,
        }
    }

    /// Returns the input state for a block, or `None` if out of bounds.
    #[must_use]
    pub fn in_state(&self, block: usize) -> Option<&L> {
        self.in_states.get(block)
    }

    /// Returns the output state for a block, or `None` if out of bounds.
    #[must_use]
    pub fn out_state(&self, block: usize) -> Option<&L> {
        self.out_states.get(block)
    }

    /// Returns the number of blocks in the results.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.in_states.len()
    }
}

/// Outcome of solving an analysis.
#[derive(Debug, Clone)]
pub enum SolveOutcome<L> {
    /// The analysis reached its least fixpoint.
    Fixpoint(AnalysisResults<L>),

    /// A transfer function failed while processing `block`.
    Failed {
        /// The block whose transfer failed.
        block: usize,
    },
}

impl<L> SolveOutcome<L> {
    /// Returns the results if a fixpoint was reached.
    #[must_use]
    pub fn into_results(self) -> Option<AnalysisResults<L>> {
        match self {
            Self::Fixpoint(results) => Some(results),
            Self::Failed { .. } => None,
        }
    }

    /// Returns `true` if the analysis failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
