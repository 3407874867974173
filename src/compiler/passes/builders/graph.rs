//! Construction of the per-builder operation graphs.
//!
//! The CFG is walked depth first. Entering a block replays the escape
//! analysis over its phis and instructions and records, per builder value,
//! the linear run of nodes the block contributes (a root and a tail). Leaving
//! a block links its tails to the roots of its successors, so the nodes end
//! up ordered like the control flow:
//!
//! ```text
//! B0: sb = new; sb.<init>()           construct -> init -> split
//!     if c goto B1 else B2                                  /     \
//! B1: sb.append("a")                                 append("a")  append("b")
//! B2: sb.append("b")
//! ```
//!
//! An exception handler may observe a builder partway through a protected
//! block. Its roots are linked from the node in front of every instruction
//! that may throw instead of from the tail; a throw before the first node of
//! a run is linked through a [`OpNodeKind::SplitReference`] at the head of
//! the run.
//!
//! A successor still on the DFS stack is a loop header reached over a back
//! edge. That edge is not linked; instead the header's roots are wrapped in a
//! [`OpNodeKind::Loop`] node, which keeps every graph acyclic.
//!
//! Values that may denote more than one object (merges, escaped aliases) get
//! marker nodes on each candidate instead of the real operation.

use std::collections::{BTreeMap, VecDeque};

use rustc_hash::FxHashSet;

use crate::{
    analysis::{
        AnalysisResults, ControlFlowGraph, DefUseIndex, SsaFunction, SsaOp, SsaVarId,
    },
    compiler::passes::builders::{
        escape::{EscapeAnalysis, EscapeState},
        node::{InitOrAppend, InstrSite, OpGraph, OpNodeId, OpNodeKind},
        oracle::BuilderOracle,
    },
    utils::graph::{NodeId, RootedGraph, Successors},
};

/// Upper bound on `assume` chains followed when resolving an aliased value.
const MAX_ASSUME_CHAIN: usize = 16;

/// Follows `assume` definitions from `value` to the value they constrain.
pub(crate) fn aliased_value(value: SsaVarId, index: &DefUseIndex) -> SsaVarId {
    let mut current = value;
    for _ in 0..MAX_ASSUME_CHAIN {
        match index.def_op(current) {
            Some(SsaOp::Assume { value, .. }) => current = *value,
            _ => break,
        }
    }
    current
}

/// The operation graphs of every builder value in a function.
#[derive(Debug, Clone, Default)]
pub struct BuilderGraphs {
    /// Arena holding all nodes.
    pub graph: OpGraph,
    /// Root node per builder value, in value order.
    pub roots: BTreeMap<SsaVarId, OpNodeId>,
}

impl BuilderGraphs {
    /// Returns `true` if no builder value has a graph.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Root and tail of the node run each value has in one block.
#[derive(Debug, Default)]
struct BlockGraph {
    roots: BTreeMap<SsaVarId, OpNodeId>,
    tails: BTreeMap<SsaVarId, OpNodeId>,
    /// Per live value, the nodes in front of each instruction that may throw
    /// into a handler; `None` is the start of the block.
    throw_points: BTreeMap<SsaVarId, Vec<Option<OpNodeId>>>,
    part_of_loop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Unseen,
    Active,
    Done,
}

enum Visit {
    Enter(usize),
    Exit(usize),
}

/// Values reached from a builder value: the one the operation applies to and
/// the others that may denote the same object.
#[derive(Debug, Default)]
struct Reached {
    actual: Option<SsaVarId>,
    others: Vec<SsaVarId>,
}

/// Builds [`BuilderGraphs`] from the solved escape analysis.
pub struct GraphBuilder<'a> {
    oracle: &'a dyn BuilderOracle,
    ssa: &'a SsaFunction,
    cfg: &'a ControlFlowGraph,
    index: &'a DefUseIndex,
    escape: &'a AnalysisResults<EscapeState>,
    analysis: EscapeAnalysis<'a>,
    graph: OpGraph,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder over the escape analysis results of `ssa`.
    #[must_use]
    pub fn new(
        oracle: &'a dyn BuilderOracle,
        ssa: &'a SsaFunction,
        cfg: &'a ControlFlowGraph,
        index: &'a DefUseIndex,
        escape: &'a AnalysisResults<EscapeState>,
    ) -> Self {
        Self {
            oracle,
            ssa,
            cfg,
            index,
            escape,
            analysis: EscapeAnalysis::new(oracle),
            graph: OpGraph::new(),
        }
    }

    /// Walks the CFG and returns the graphs rooted at the entry block.
    #[must_use]
    pub fn build(mut self) -> BuilderGraphs {
        let count = self.ssa.block_count();
        if count == 0 {
            return BuilderGraphs::default();
        }

        let mut status = vec![Status::Unseen; count];
        let mut states: Vec<Option<BlockGraph>> = (0..count).map(|_| None).collect();
        let entry = self.cfg.entry().index();
        let mut stack = vec![Visit::Enter(entry)];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(block) => {
                    if status[block] != Status::Unseen {
                        continue;
                    }
                    status[block] = Status::Active;
                    states[block] = Some(self.process(block));
                    stack.push(Visit::Exit(block));
                    let successors: Vec<usize> = self
                        .cfg
                        .successors(NodeId::new(block))
                        .map(NodeId::index)
                        .collect();
                    for succ in successors.into_iter().rev() {
                        if succ < count && status[succ] == Status::Unseen {
                            stack.push(Visit::Enter(succ));
                        }
                    }
                }
                Visit::Exit(block) => {
                    self.join(block, &status, &mut states);
                    status[block] = Status::Done;
                }
            }
        }

        let roots = states[entry].take().map(|state| state.roots).unwrap_or_default();
        log::trace!(
            "built {} builder graph(s) with {} node(s)",
            roots.len(),
            self.graph.len()
        );
        BuilderGraphs {
            graph: self.graph,
            roots,
        }
    }

    /// Creates the nodes of one block.
    fn process(&mut self, block_id: usize) -> BlockGraph {
        let mut local = BlockGraph::default();
        let (ssa, escape) = (self.ssa, self.escape);
        let Some(block) = ssa.block(block_id) else {
            return local;
        };
        let Some(entry_state) = escape.in_state(block_id) else {
            return local;
        };

        let mut state = self.analysis.apply_phis(block.phi_nodes(), entry_state.clone());
        for phi in block.phi_nodes() {
            let result = phi.result();
            if !state.is_live(result) {
                continue;
            }
            let mut reached = Reached::default();
            let seen_escaped = self.visit_all_aliasing(result, &state, &mut reached);
            for alias in reached.others {
                self.push_marker(&mut local, alias, OpNodeKind::Escape);
            }
            if seen_escaped {
                self.push_marker(&mut local, result, OpNodeKind::Escape);
            }
        }

        let guarded = block.has_catch_handlers();
        for (index, instr) in block.instructions().iter().enumerate() {
            let op = instr.op();
            if guarded && op.may_throw() {
                for value in state.live_values() {
                    let point = local.tails.get(&value).copied();
                    let points = local.throw_points.entry(value).or_default();
                    if !points.contains(&point) {
                        points.push(point);
                    }
                }
            }
            let escaping = self.analysis.escaping_values(op, &state, ssa);
            state = self.analysis.apply(op, state, ssa);
            if matches!(op, SsaOp::Assume { .. }) {
                continue;
            }
            let site = InstrSite::new(block_id, index);
            self.create_nodes(&mut local, site, op, &state, &escaping);
        }
        local
    }

    fn create_nodes(
        &mut self,
        local: &mut BlockGraph,
        site: InstrSite,
        op: &SsaOp,
        state: &EscapeState,
        escaping: &[SsaVarId],
    ) {
        let is_live = |value: SsaVarId| state.is_live(value);
        if self.oracle.is_modeled_instruction(op, &is_live) {
            self.create_builder_nodes(local, site, op, state);
        }

        for &value in escaping {
            let reached = self.visit_builder_values(value, state);
            for target in reached.actual.into_iter().chain(reached.others) {
                self.push_marker(local, target, OpNodeKind::Escape);
            }
        }

        if !self.oracle.is_modeled_instruction(op, &is_live) && self.oracle.can_mutate(op) {
            for value in state.escaped_values() {
                let reached = self.visit_builder_values(value, state);
                for target in reached.actual.into_iter().chain(reached.others) {
                    self.push_marker(local, target, OpNodeKind::Mutate { site: Some(site) });
                }
            }
        }
    }

    fn create_builder_nodes(
        &mut self,
        local: &mut BlockGraph,
        site: InstrSite,
        op: &SsaOp,
        state: &EscapeState,
    ) {
        if let SsaOp::NewObj { dest, .. } = op {
            let node = self.graph.add(OpNodeKind::Construct { site });
            self.push(local, *dest, node);
            return;
        }
        let Some((_, args)) = op.as_invoke() else {
            return;
        };
        let Some(&receiver) = args.first() else {
            return;
        };

        if self.oracle.is_init(op) {
            let argument = args.get(1).copied();
            let mut payload = InitOrAppend::new(site, argument);
            payload.constant = self.oracle.known_constant_argument(op, self.index);
            if payload.constant.is_none() && self.oracle.is_string_constructor(op) {
                payload.non_constant =
                    argument.filter(|arg| self.oracle.is_never_null(*arg, self.index));
            }
            let node = self.graph.add(OpNodeKind::Init(payload));
            if let Some(arg) = argument.filter(|_| args.len() == 2) {
                if self.oracle.is_builder_type(self.ssa.var_type(arg)) && state.is_live(arg) {
                    self.insert_implicit_materialize(local, site, arg, node, state);
                }
            }
            let reached = self.visit_builder_values(receiver, state);
            self.push_actual(local, reached.actual, node);
            for other in reached.others {
                self.push_marker(local, other, OpNodeKind::Inspect { site: Some(site) });
            }
        } else if self.oracle.is_append(op) {
            let arg = args[1];
            let mut payload = InitOrAppend::new(site, Some(arg));
            payload.constant = self.oracle.known_constant_argument(op, self.index);
            if payload.constant.is_none()
                && self.oracle.is_append_string(op)
                && self.oracle.is_never_null(arg, self.index)
            {
                payload.non_constant = Some(arg);
            }
            let node = self.graph.add(OpNodeKind::Append(payload));
            let aliased = aliased_value(arg, self.index);
            if self.oracle.is_builder_type(self.ssa.var_type(aliased)) && state.is_live(arg) {
                self.insert_implicit_materialize(local, site, arg, node, state);
            }
            let reached = self.visit_builder_values(receiver, state);
            self.push_actual(local, reached.actual, node);
            for other in reached.others {
                self.push_marker(local, other, OpNodeKind::Mutate { site: Some(site) });
            }
        } else if self.oracle.is_materialize(op, receiver) {
            let dest = op.dest();
            let identity_sensitive = dest.is_some_and(|value| {
                self.oracle
                    .is_identity_sensitive(value, self.ssa, self.index)
            });
            let node = self.graph.add(OpNodeKind::Materialize {
                site,
                dest,
                identity_sensitive,
            });
            let reached = self.visit_builder_values(receiver, state);
            self.push_actual(local, reached.actual, node);
            for other in reached.others {
                self.push_marker(local, other, OpNodeKind::Inspect { site: Some(site) });
            }
        } else {
            let kind = if self.oracle.is_capacity_inspection(op) {
                OpNodeKind::Inspect { site: Some(site) }
            } else {
                OpNodeKind::Mutate { site: Some(site) }
            };
            let reached = self.visit_builder_values(receiver, state);
            for target in reached.actual.into_iter().chain(reached.others) {
                self.push_marker(local, target, kind.clone());
            }
        }
    }

    /// Records that the builder `value` is read by `consumer` of another builder.
    fn insert_implicit_materialize(
        &mut self,
        local: &mut BlockGraph,
        site: InstrSite,
        value: SsaVarId,
        consumer: OpNodeId,
        state: &EscapeState,
    ) {
        let node = self.graph.add(OpNodeKind::ImplicitMaterialize { consumer });
        let reached = self.visit_builder_values(value, state);
        self.push_actual(local, reached.actual, node);
        for other in reached.others {
            self.push_marker(local, other, OpNodeKind::Inspect { site: Some(site) });
        }
        if let Some(payload) = self.graph.node_mut(consumer).kind.init_or_append_mut() {
            payload.implicit_materialize = Some(node);
        }
    }

    fn visit_builder_values(&self, value: SsaVarId, state: &EscapeState) -> Reached {
        let mut reached = Reached::default();
        let mut seen_escaped = self.visit_all_aliasing(value, state, &mut reached);
        seen_escaped |= self.visit_all_aliases(value, state, &mut reached.others);
        if seen_escaped {
            reached.others.extend(state.escaped_values());
        }
        let mut seen = FxHashSet::default();
        reached.others.retain(|v| seen.insert(*v));
        reached
    }

    /// Walks from `value` to the definitions it may denote. The first value
    /// that is not a plain alias is the actual one; further ones are
    /// ambiguous. Returns `true` if any value on the way has escaped.
    fn visit_all_aliasing(&self, value: SsaVarId, state: &EscapeState, reached: &mut Reached) -> bool {
        let mut seen = FxHashSet::default();
        seen.insert(value);
        let mut worklist = VecDeque::from([value]);
        let mut seen_escaped = false;

        while let Some(next) = worklist.pop_front() {
            seen_escaped |= state.is_escaped(next);
            let definitions = state.definitions_of(next);
            for &definition in &definitions {
                if seen.insert(definition) {
                    worklist.push_back(definition);
                }
            }
            if definitions.len() != 1 || self.index.is_phi_def(next) {
                if reached.actual.is_none() {
                    reached.actual = Some(next);
                } else {
                    reached.others.push(next);
                }
            }
        }
        seen_escaped
    }

    /// Walks from `value` to the values derived from it; merges reached this
    /// way are ambiguous. Returns `true` if any of them has escaped.
    fn visit_all_aliases(
        &self,
        value: SsaVarId,
        state: &EscapeState,
        others: &mut Vec<SsaVarId>,
    ) -> bool {
        let mut seen = FxHashSet::default();
        let mut worklist: VecDeque<SsaVarId> = state.aliases_of(value).into();
        let mut seen_escaped = false;

        while let Some(next) = worklist.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            seen_escaped |= state.is_escaped(next);
            if self.index.is_phi_def(next) {
                others.push(next);
            }
            worklist.extend(state.aliases_of(next));
        }
        seen_escaped
    }

    fn push_actual(&mut self, local: &mut BlockGraph, actual: Option<SsaVarId>, node: OpNodeId) {
        if let Some(value) = actual {
            self.push(local, value, node);
        }
    }

    /// Appends a marker node unless it repeats what the tail already says.
    fn push_marker(&mut self, local: &mut BlockGraph, value: SsaVarId, kind: OpNodeKind) {
        if let Some(&tail) = local.tails.get(&value) {
            let redundant = match self.graph.kind(tail) {
                OpNodeKind::Mutate { .. } => {
                    matches!(kind, OpNodeKind::Mutate { .. } | OpNodeKind::Inspect { .. })
                }
                OpNodeKind::Inspect { .. } => matches!(kind, OpNodeKind::Inspect { .. }),
                OpNodeKind::Escape => matches!(kind, OpNodeKind::Escape),
                _ => false,
            };
            if redundant {
                return;
            }
        }
        let node = self.graph.add(kind);
        self.push(local, value, node);
    }

    fn push(&mut self, local: &mut BlockGraph, value: SsaVarId, node: OpNodeId) {
        match local.tails.get(&value) {
            Some(&tail) => {
                if tail != node {
                    self.graph.link(tail, node);
                    local.tails.insert(value, node);
                }
            }
            None => {
                local.roots.insert(value, node);
                local.tails.insert(value, node);
            }
        }
    }

    /// Links the runs of `block` to those of its successors.
    fn join(&mut self, block: usize, status: &[Status], states: &mut [Option<BlockGraph>]) {
        let node = NodeId::new(block);
        let successors: Vec<usize> = self
            .cfg
            .successors(node)
            .map(NodeId::index)
            .filter(|succ| *succ < states.len())
            .collect();
        let normal_targets: FxHashSet<usize> = self
            .cfg
            .outgoing_edges(node)
            .iter()
            .filter(|edge| !edge.kind().is_exceptional())
            .map(|edge| edge.target())
            .collect();

        let mut forward = Vec::with_capacity(successors.len());
        let mut handlers = Vec::new();
        for succ in successors {
            if status[succ] == Status::Active {
                if let Some(header) = states[succ].as_mut() {
                    header.part_of_loop = true;
                }
            } else if normal_targets.contains(&succ) {
                forward.push(succ);
            } else {
                handlers.push(succ);
            }
        }

        let Some(mut state) = states[block].take() else {
            return;
        };

        let mut counts: BTreeMap<SsaVarId, usize> = BTreeMap::new();
        for &child in &forward {
            let child_roots: Vec<(SsaVarId, OpNodeId)> = states[child]
                .as_ref()
                .map(|s| s.roots.iter().map(|(v, n)| (*v, *n)).collect())
                .unwrap_or_default();
            for (value, child_root) in child_roots {
                *counts.entry(value).or_default() += 1;
                let tail = match state.tails.get(&value) {
                    Some(&tail) => tail,
                    None if forward.len() == 1 => {
                        state.roots.insert(value, child_root);
                        state.tails.insert(value, child_root);
                        continue;
                    }
                    None => {
                        let split = self.graph.add(OpNodeKind::SplitReference);
                        state.roots.insert(value, split);
                        state.tails.insert(value, split);
                        split
                    }
                };
                self.graph.link(tail, child_root);
            }
        }

        for (value, count) in counts {
            if count < forward.len() {
                if let Some(&tail) = state.tails.get(&value) {
                    let split = self.graph.add(OpNodeKind::SplitReference);
                    self.graph.link(tail, split);
                }
            }
        }

        for &handler in &handlers {
            let handler_roots: Vec<(SsaVarId, OpNodeId)> = states[handler]
                .as_ref()
                .map(|s| s.roots.iter().map(|(v, n)| (*v, *n)).collect())
                .unwrap_or_default();
            for (value, handler_root) in handler_roots {
                self.link_handler(&mut state, value, handler_root);
            }
        }

        if state.part_of_loop {
            let roots: Vec<(SsaVarId, OpNodeId)> =
                state.roots.iter().map(|(v, n)| (*v, *n)).collect();
            for (value, root) in roots {
                if matches!(self.graph.kind(root), OpNodeKind::Loop) {
                    continue;
                }
                let loop_node = self.graph.add(OpNodeKind::Loop);
                self.graph.link(loop_node, root);
                state.roots.insert(value, loop_node);
            }
        }

        states[block] = Some(state);
    }

    /// Links the run of `value` in a protected block to a handler root.
    fn link_handler(&mut self, state: &mut BlockGraph, value: SsaVarId, handler_root: OpNodeId) {
        let points = state.throw_points.get(&value).cloned().unwrap_or_default();
        if points.is_empty() {
            let tail = match state.tails.get(&value) {
                Some(&tail) => tail,
                None => {
                    let split = self.graph.add(OpNodeKind::SplitReference);
                    state.roots.insert(value, split);
                    state.tails.insert(value, split);
                    split
                }
            };
            self.graph.link(tail, handler_root);
            return;
        }

        for point in points {
            let from = match point {
                Some(node) => node,
                None => self.entry_split(state, value),
            };
            self.graph.link(from, handler_root);
        }
    }

    /// Returns the split at the head of the run of `value`, adding it if the
    /// run starts with anything else.
    fn entry_split(&mut self, state: &mut BlockGraph, value: SsaVarId) -> OpNodeId {
        let root = state.roots.get(&value).copied();
        match root {
            Some(root) if matches!(self.graph.kind(root), OpNodeKind::SplitReference) => root,
            Some(root) => {
                let split = self.graph.add(OpNodeKind::SplitReference);
                self.graph.link(split, root);
                state.roots.insert(value, split);
                split
            }
            None => {
                let split = self.graph.add(OpNodeKind::SplitReference);
                state.roots.insert(value, split);
                state.tails.insert(value, split);
                split
            }
        }
    }
}
