//! Peephole munching over the operation graphs.
//!
//! Each round walks every graph from its root and tries a fixed list of small
//! patterns on each node, in order:
//!
//! 1. **Fold appends**: `append("a") -> append("b")` becomes `append("ab")`,
//!    and likewise into a preceding init.
//! 2. **Materialize constant**: `construct -> init("ab") -> toString()` makes
//!    the `toString` result the constant `"ab"`.
//! 3. **Materialize concat**: up to two known non-null pieces before a
//!    `toString` become `a.concat(b)` (or just `a`).
//! 4. **Drop dead operations**: appends nobody can observe, unused inits and
//!    allocations, and redundant split nodes are removed.
//!
//! Patterns edit the graph in place and record the corresponding IR change in
//! an [`ActionMap`]. Rounds repeat until nothing changes or the round budget
//! is exhausted.

use std::collections::{BTreeMap, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{DefUseIndex, SsaFunction, SsaOp, SsaVarId},
    compiler::passes::builders::{
        action::{ActionMap, BuilderAction, ConcatOperand},
        graph::{aliased_value, BuilderGraphs},
        node::{InitOrAppend, InstrSite, OpGraph, OpNodeId, OpNodeKind},
        oracle::BuilderOracle,
    },
};

/// Result of munching: the actions to apply and the fresh string values they
/// introduce.
#[derive(Debug, Clone, Default)]
pub struct MunchResult {
    /// Rewrites to perform.
    pub actions: ActionMap,
    /// Values allocated for concatenation results, not yet registered in the function.
    pub fresh_values: Vec<SsaVarId>,
    /// Rounds that ran.
    pub rounds: usize,
}

/// Graph state shared by the munching patterns.
pub struct MunchingState<'a> {
    oracle: &'a dyn BuilderOracle,
    ssa: &'a SsaFunction,
    index: &'a DefUseIndex,
    graph: OpGraph,
    roots: BTreeMap<SsaVarId, OpNodeId>,
    actions: ActionMap,

    // Facts about each root, computed once from the initial graphs.
    escaping: FxHashSet<OpNodeId>,
    inspecting: FxHashSet<OpNodeId>,
    looping: FxHashSet<OpNodeId>,
    loop_mutated: FxHashSet<OpNodeId>,
    materializing: FxHashMap<OpNodeId, FxHashSet<OpNodeId>>,
    new_instances: FxHashMap<OpNodeId, OpNodeId>,
    node_to_root: FxHashMap<OpNodeId, OpNodeId>,
    dependencies: FxHashMap<OpNodeId, Vec<OpNodeId>>,

    optimized_strings: FxHashMap<SsaVarId, String>,
    fresh_values: Vec<SsaVarId>,
}

impl<'a> MunchingState<'a> {
    /// Collects the per-root facts of `graphs`.
    #[must_use]
    pub fn new(
        oracle: &'a dyn BuilderOracle,
        ssa: &'a SsaFunction,
        index: &'a DefUseIndex,
        graphs: BuilderGraphs,
    ) -> Self {
        let BuilderGraphs { graph, roots } = graphs;
        let mut state = Self {
            oracle,
            ssa,
            index,
            graph,
            roots,
            actions: ActionMap::new(),
            escaping: FxHashSet::default(),
            inspecting: FxHashSet::default(),
            looping: FxHashSet::default(),
            loop_mutated: FxHashSet::default(),
            materializing: FxHashMap::default(),
            new_instances: FxHashMap::default(),
            node_to_root: FxHashMap::default(),
            dependencies: FxHashMap::default(),
            optimized_strings: FxHashMap::default(),
            fresh_values: Vec::new(),
        };

        let roots: Vec<OpNodeId> = state.roots.values().copied().collect();
        for root in roots {
            state.materializing.entry(root).or_default();
            for node in state.graph.reachable_from(root) {
                state.node_to_root.insert(node, root);
                match &state.graph.kind(node) {
                    OpNodeKind::Construct { .. } => {
                        state.new_instances.entry(root).or_insert(node);
                    }
                    OpNodeKind::Init(payload) | OpNodeKind::Append(payload) => {
                        if let Some(implicit) = payload.implicit_materialize {
                            state.dependencies.entry(root).or_default().push(implicit);
                        }
                    }
                    OpNodeKind::Loop => {
                        state.looping.insert(root);
                    }
                    OpNodeKind::Escape => {
                        state.escaping.insert(root);
                        state.inspecting.insert(root);
                    }
                    OpNodeKind::Materialize { .. } | OpNodeKind::ImplicitMaterialize { .. } => {
                        state.materializing.entry(root).or_default().insert(node);
                    }
                    OpNodeKind::Inspect { .. } => {
                        state.inspecting.insert(root);
                    }
                    OpNodeKind::Mutate { .. } | OpNodeKind::SplitReference => {}
                }
            }
        }
        state
    }

    /// Builder values that are materialized and allocated in this function,
    /// with the site of their allocation. Only these can profit from the
    /// loop mutation check.
    #[must_use]
    pub fn loop_check_candidates(&self) -> Vec<(SsaVarId, InstrSite)> {
        self.roots
            .iter()
            .filter(|(_, root)| {
                self.materializing
                    .get(root)
                    .is_some_and(|nodes| !nodes.is_empty())
            })
            .filter_map(|(value, root)| {
                let construct = self.new_instances.get(root)?;
                self.graph.kind(*construct).site().map(|site| (*value, site))
            })
            .collect()
    }

    /// Marks the builder `value` as appended to more than once per allocation.
    pub fn mark_loop_mutated(&mut self, value: SsaVarId) {
        if let Some(root) = self.roots.get(&value) {
            self.loop_mutated.insert(*root);
        }
    }

    /// Runs up to `rounds` munching rounds.
    pub fn munch(&mut self, rounds: usize) -> usize {
        let order = self.processing_order();
        let mut performed = 0;
        for _ in 0..rounds {
            performed += 1;
            let mut changed = false;
            for &root in &order {
                let mut seen = FxHashSet::default();
                let mut stack = vec![root];
                while let Some(node) = stack.pop() {
                    if !seen.insert(node) {
                        continue;
                    }
                    changed |= self.optimize(root, node);
                    for &succ in self.graph.successors(node).iter().rev() {
                        if !seen.contains(&succ) {
                            stack.push(succ);
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        performed
    }

    /// Consumes the state, returning the recorded actions.
    #[must_use]
    pub fn finish(self, rounds: usize) -> MunchResult {
        MunchResult {
            actions: self.actions,
            fresh_values: self.fresh_values,
            rounds,
        }
    }

    /// Returns the graph as currently munched.
    #[must_use]
    pub fn graph(&self) -> &OpGraph {
        &self.graph
    }

    /// Roots ordered so that a builder embedded into another is processed
    /// before the one embedding it.
    fn processing_order(&self) -> Vec<OpNodeId> {
        let mut order = Vec::new();
        let mut seen = FxHashSet::default();
        for &root in self.roots.values() {
            if !seen.insert(root) {
                continue;
            }
            // Iterative postorder over the dependency edges
            let mut stack = vec![(root, false)];
            while let Some((node, expanded)) = stack.pop() {
                if expanded {
                    order.push(node);
                    continue;
                }
                stack.push((node, true));
                for implicit in self.dependencies.get(&node).into_iter().flatten() {
                    if let Some(&dependency) = self.node_to_root.get(implicit) {
                        if seen.insert(dependency) {
                            stack.push((dependency, false));
                        }
                    }
                }
            }
        }
        order
    }

    fn optimize(&mut self, root: OpNodeId, node: OpNodeId) -> bool {
        if self.graph.node(node).is_dead() {
            return false;
        }
        self.munch_appends(root, node)
            || self.munch_to_constant(root, node)
            || self.munch_to_concat(root, node)
            || self.munch_non_materializing(root, node)
    }

    fn op_at(&self, site: InstrSite) -> Option<&'a SsaOp> {
        let ssa = self.ssa;
        ssa.block(site.block)
            .and_then(|block| block.instruction(site.index))
            .map(|instr| instr.op())
    }

    fn payload(&self, node: OpNodeId) -> Option<&InitOrAppend> {
        self.graph.kind(node).init_or_append()
    }

    /// Content an init/append adds, if known: its own constant, or a string
    /// an earlier munch already turned into a constant.
    fn constant_for(&self, node: OpNodeId) -> Option<String> {
        let payload = self.payload(node)?;
        if let Some(constant) = &payload.constant {
            return Some(constant.clone());
        }
        let argument = aliased_value(payload.argument?, self.index);
        self.optimized_strings.get(&argument).cloned()
    }

    fn has_known_argument(&self, node: OpNodeId) -> bool {
        self.payload(node)
            .is_some_and(|p| p.constant.is_some() || p.non_constant.is_some())
    }

    /// `append -> append` or `init -> append` with constant arguments.
    fn munch_appends(&mut self, root: OpNodeId, current: OpNodeId) -> bool {
        let Some(current_site) = (match self.graph.kind(current) {
            OpNodeKind::Append(payload) => Some(payload.site),
            _ => None,
        }) else {
            return false;
        };
        let Some(previous) = self.graph.single_predecessor(current) else {
            return false;
        };
        let previous_is_init = match self.graph.kind(previous) {
            OpNodeKind::Init(_) => true,
            OpNodeKind::Append(_) => false,
            _ => return false,
        };
        if self.graph.single_successor(previous) != Some(current) {
            return false;
        }
        // The initial capacity depends on the constructor argument
        if previous_is_init
            && (self.inspecting.contains(&root) || self.loop_mutated.contains(&root))
        {
            return false;
        }
        if self.escaping.contains(&root)
            && self
                .graph
                .any_predecessor(current, |kind| matches!(kind, OpNodeKind::Escape))
        {
            return false;
        }
        let Some(current_constant) = self.constant_for(current) else {
            return false;
        };
        let Some(previous_constant) = self.constant_for(previous) else {
            return false;
        };

        let folded = previous_constant + &current_constant;
        let Some(payload) = self.graph.node_mut(previous).kind.init_or_append_mut() else {
            return false;
        };
        payload.constant = Some(folded.clone());
        payload.non_constant = None;
        let previous_site = payload.site;

        log::trace!("folded append at {current_site} into {previous_site}");
        self.actions
            .record(previous_site, BuilderAction::ReplaceArgument(folded));
        self.actions.record(current_site, BuilderAction::Delete);
        self.graph.remove_node(current);
        true
    }

    /// Guards shared by the materialization patterns.
    fn can_materialize(&self, root: OpNodeId, current: OpNodeId) -> bool {
        if self.escaping.contains(&root)
            || self.inspecting.contains(&root)
            || self.loop_mutated.contains(&root)
        {
            return false;
        }
        match self.graph.kind(current) {
            OpNodeKind::Materialize {
                identity_sensitive, ..
            } => !identity_sensitive,
            OpNodeKind::ImplicitMaterialize { consumer } => {
                !self.graph.node(*consumer).is_dead()
                    && self
                        .dependencies
                        .get(&root)
                        .is_none_or(|deps| deps.is_empty())
            }
            _ => false,
        }
    }

    /// The init following the allocation of `root`, if it is the only thing
    /// following it.
    fn leading_init(&self, root: OpNodeId) -> Option<OpNodeId> {
        let construct = *self.new_instances.get(&root)?;
        let init = self.graph.single_successor(construct)?;
        matches!(self.graph.kind(init), OpNodeKind::Init(_)).then_some(init)
    }

    fn materialized(&mut self, root: OpNodeId, current: OpNodeId) {
        if let Some(nodes) = self.materializing.get_mut(&root) {
            nodes.remove(&current);
        }
        self.graph.remove_node(current);
    }

    /// `construct -> init("c") -> toString()` becomes the constant `"c"`.
    fn munch_to_constant(&mut self, root: OpNodeId, current: OpNodeId) -> bool {
        if !self.can_materialize(root, current) {
            return false;
        }
        let Some(init) = self.leading_init(root) else {
            return false;
        };
        if self.graph.single_successor(init).is_none()
            || self.graph.single_predecessor(current) != Some(init)
        {
            return false;
        }
        let Some(constant) = self.constant_for(init) else {
            return false;
        };

        match self.graph.kind(current).clone() {
            OpNodeKind::Materialize { site, dest, .. } => {
                log::trace!("materialization at {site} is the constant {constant:?}");
                self.actions
                    .record(site, BuilderAction::ReplaceWithConstant(constant.clone()));
                if let Some(dest) = dest {
                    self.optimized_strings.insert(dest, constant);
                }
            }
            OpNodeKind::ImplicitMaterialize { consumer } => {
                let Some(payload) = self.graph.node_mut(consumer).kind.init_or_append_mut() else {
                    return false;
                };
                payload.constant = Some(constant.clone());
                payload.non_constant = None;
                let site = payload.site;
                self.actions
                    .record(site, BuilderAction::ReplaceArgument(constant));
            }
            _ => return false,
        }
        self.materialized(root, current);
        true
    }

    /// Up to two known non-null pieces before a materialization become a
    /// `String.concat` (or the single piece itself).
    fn munch_to_concat(&mut self, root: OpNodeId, current: OpNodeId) -> bool {
        if !self.can_materialize(root, current) {
            return false;
        }
        let Some(before) = self.graph.single_predecessor(current) else {
            return false;
        };
        let Some(init) = self.leading_init(root) else {
            return false;
        };
        if self.graph.single_successor(init).is_none() {
            return false;
        }

        let mut first = init;
        let init_is_empty = self
            .payload(init)
            .is_some_and(|p| p.constant.as_deref() == Some(""));
        let init_side_effect_free = self
            .payload(init)
            .and_then(|p| self.op_at(p.site))
            .is_some_and(|op| {
                self.oracle
                    .is_constructor_side_effect_free(op, self.ssa, self.index)
            });
        if init_side_effect_free && init_is_empty {
            let Some(next) = self.graph.single_successor(init) else {
                return false;
            };
            if !matches!(self.graph.kind(next), OpNodeKind::Append(_))
                || self.graph.single_predecessor(next).is_none()
                || self.graph.single_successor(next).is_none()
            {
                return false;
            }
            first = next;
        }
        if !self.has_known_argument(first) {
            return false;
        }

        let mut pieces = vec![first];
        if before != first {
            let Some(second) = self.graph.single_successor(first) else {
                return false;
            };
            if second != before
                || !matches!(self.graph.kind(second), OpNodeKind::Append(_))
                || !self.has_known_argument(second)
            {
                return false;
            }
            pieces.push(second);
        }
        // All constant is the job of the constant patterns
        if pieces
            .iter()
            .all(|piece| self.payload(*piece).is_some_and(InitOrAppend::has_constant))
        {
            return false;
        }

        let operands: Vec<ConcatOperand> = pieces
            .iter()
            .filter_map(|piece| {
                let payload = self.payload(*piece)?;
                match (&payload.constant, payload.non_constant) {
                    (Some(constant), _) => Some(ConcatOperand::Constant(constant.clone())),
                    (None, Some(value)) => Some(ConcatOperand::Value(value)),
                    (None, None) => None,
                }
            })
            .collect();
        if operands.len() != pieces.len() {
            return false;
        }

        match self.graph.kind(current).clone() {
            OpNodeKind::Materialize { site, .. } => {
                let action = match operands.as_slice() {
                    [ConcatOperand::Value(value)] => BuilderAction::ReplaceWithExisting(*value),
                    [first, second] => BuilderAction::ReplaceWithConcat {
                        first: first.clone(),
                        second: second.clone(),
                    },
                    _ => return false,
                };
                log::trace!("materialization at {site} rewritten to {action:?}");
                self.actions.record(site, action);
            }
            OpNodeKind::ImplicitMaterialize { consumer } => {
                let (action, value) = match operands.as_slice() {
                    [ConcatOperand::Value(value)] => {
                        (BuilderAction::ReplaceArgumentWithExisting(*value), *value)
                    }
                    [first, second] => {
                        let out = self.fresh_value();
                        (
                            BuilderAction::ReplaceArgumentWithConcat {
                                first: first.clone(),
                                second: second.clone(),
                                out,
                                remove_instruction: false,
                            },
                            out,
                        )
                    }
                    _ => return false,
                };
                let Some(payload) = self.graph.node_mut(consumer).kind.init_or_append_mut() else {
                    return false;
                };
                payload.non_constant = Some(value);
                let site = payload.site;
                self.actions.record(site, action);
            }
            _ => return false,
        }
        self.materialized(root, current);
        true
    }

    fn fresh_value(&mut self) -> SsaVarId {
        let value = SsaVarId::new(self.ssa.variable_count() + self.fresh_values.len());
        self.fresh_values.push(value);
        value
    }

    /// Removes operations whose effect can no longer be observed, walking
    /// backwards from `current` for as long as nodes keep being removable.
    fn munch_non_materializing(&mut self, root: OpNodeId, current: OpNodeId) -> bool {
        let escaping = self.escaping.contains(&root);
        let mut removed_any = false;
        let mut cursor = Some(current);

        while let Some(node) = cursor {
            let remove = match self.graph.kind(node) {
                OpNodeKind::SplitReference if !self.looping.contains(&root) => {
                    let successors = self.graph.successors(node).len();
                    successors == 0
                        || (successors == 1 && self.graph.single_predecessor(node).is_some())
                }
                OpNodeKind::Append(payload) if !escaping => {
                    let unobserved = !self.inspecting.contains(&root)
                        && self
                            .materializing
                            .get(&root)
                            .is_none_or(FxHashSet::is_empty);
                    let last_outside_loop = !self.loop_mutated.contains(&root)
                        && !self.is_looping_on_path(root, node)
                        && self.graph.successors(node).is_empty();
                    let harmless = payload.constant.is_some()
                        || payload.non_constant.is_some()
                        || self.op_at(payload.site).is_some_and(|op| {
                            !self.oracle.can_observe_call(op, self.ssa, self.index)
                        });
                    unobserved && last_outside_loop && harmless
                }
                OpNodeKind::Init(payload) if !escaping => {
                    self.graph.successors(node).is_empty()
                        && self
                            .graph
                            .single_predecessor(node)
                            .is_some_and(|pred| {
                                matches!(self.graph.kind(pred), OpNodeKind::Construct { .. })
                            })
                        && self.op_at(payload.site).is_some_and(|op| {
                            !self.oracle.can_observe_call(op, self.ssa, self.index)
                        })
                }
                OpNodeKind::Construct { .. } if !escaping => {
                    self.graph.successors(node).is_empty()
                }
                _ => false,
            };
            if !remove {
                return removed_any;
            }

            removed_any = true;
            let site = match self.graph.kind(node) {
                OpNodeKind::Construct { site } => Some(*site),
                OpNodeKind::Init(payload) | OpNodeKind::Append(payload) => Some(payload.site),
                _ => None,
            };
            cursor = self.graph.single_predecessor(node);
            self.graph.remove_node(node);
            if let Some(site) = site {
                log::trace!("dropping unobservable builder operation at {site}");
                self.actions.record(site, BuilderAction::Delete);
            }
        }
        removed_any
    }

    /// Returns `true` if a loop encloses `node` without also enclosing the
    /// allocation of its builder.
    fn is_looping_on_path(&self, root: OpNodeId, node: OpNodeId) -> bool {
        if !self.looping.contains(&root) {
            return false;
        }
        let mut seen = FxHashSet::default();
        seen.insert(node);
        let mut worklist = VecDeque::from([node]);
        let mut seen_construct = false;
        while let Some(next) = worklist.pop_front() {
            match self.graph.kind(next) {
                OpNodeKind::Construct { .. } => seen_construct = true,
                OpNodeKind::Loop => {
                    // A loop with a single successor above the allocation
                    // means the allocation happens inside the body
                    return !seen_construct || self.graph.single_successor(next).is_none();
                }
                _ => {}
            }
            for &pred in self.graph.predecessors(next) {
                if seen.insert(pred) {
                    worklist.push_back(pred);
                }
            }
        }
        false
    }
}
