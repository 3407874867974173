//! Escape and alias analysis for builder values.
//!
//! A forward "may" analysis over the CFG. At every program point it knows
//!
//! - which values denote a tracked builder (the *live* set),
//! - which of them may be observed by code the pass does not model (the
//!   *escaped* set),
//! - which values are second names for the same object (the alias maps, in
//!   both directions).
//!
//! All four components only grow, and the join is their pairwise union, so
//! the solver terminates. The sets are `imbl` persistent collections: the
//! per-instruction update and the join at merge points share structure with
//! their inputs instead of copying them.
//!
//! # Escape closure
//!
//! When a value escapes, every definition it may denote and every alias of
//! those definitions escapes with it:
//!
//! ```text
//! v1 = new StringBuilder
//! v2 = assume v1          // v2 aliases v1
//! v3 = phi(v1, v4)        // v3 aliases v1 and v4
//! return v3               // escapes v3, v1, v4 and v2
//! ```

use crate::{
    analysis::{
        dataflow::{DataFlowAnalysis, JoinSemiLattice, Transfer},
        PhiNode, SsaFunction, SsaInstruction, SsaOp, SsaVarId,
    },
    compiler::passes::builders::oracle::BuilderOracle,
};

type ValueSet = imbl::HashSet<SsaVarId>;
type ValueMap = imbl::HashMap<SsaVarId, ValueSet>;

/// Abstract state of the escape analysis at one program point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EscapeState {
    live: ValueSet,
    escaped: ValueSet,
    aliases_to_definitions: ValueMap,
    definitions_to_aliases: ValueMap,
}

impl JoinSemiLattice for EscapeState {
    fn join(&self, other: &Self) -> Self {
        Self {
            live: self.live.join(&other.live),
            escaped: self.escaped.join(&other.escaped),
            aliases_to_definitions: self.aliases_to_definitions.join(&other.aliases_to_definitions),
            definitions_to_aliases: self.definitions_to_aliases.join(&other.definitions_to_aliases),
        }
    }
}

impl EscapeState {
    /// Returns `true` if `value` denotes a tracked builder.
    #[must_use]
    pub fn is_live(&self, value: SsaVarId) -> bool {
        self.live.contains(&value)
    }

    /// Returns `true` if `value` may be observed outside the analysis.
    #[must_use]
    pub fn is_escaped(&self, value: SsaVarId) -> bool {
        self.escaped.contains(&value)
    }

    /// Number of tracked values.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Escaped values in ascending order.
    #[must_use]
    pub fn escaped_values(&self) -> Vec<SsaVarId> {
        let mut values: Vec<_> = self.escaped.iter().copied().collect();
        values.sort_unstable();
        values
    }

    /// Live values in ascending order.
    #[must_use]
    pub fn live_values(&self) -> Vec<SsaVarId> {
        let mut values: Vec<_> = self.live.iter().copied().collect();
        values.sort_unstable();
        values
    }

    /// Values `value` was derived from, in ascending order.
    ///
    /// A direct alias has exactly one definition; a merge value has one per
    /// live operand.
    #[must_use]
    pub fn definitions_of(&self, value: SsaVarId) -> Vec<SsaVarId> {
        Self::sorted(self.aliases_to_definitions.get(&value))
    }

    /// Values derived from `value`, in ascending order.
    #[must_use]
    pub fn aliases_of(&self, value: SsaVarId) -> Vec<SsaVarId> {
        Self::sorted(self.definitions_to_aliases.get(&value))
    }

    /// Returns `value` together with every alias derived from it, transitively.
    #[must_use]
    pub fn alias_closure(&self, value: SsaVarId) -> Vec<SsaVarId> {
        let mut seen = vec![value];
        let mut worklist = vec![value];
        while let Some(next) = worklist.pop() {
            for alias in self.aliases_of(next) {
                if !seen.contains(&alias) {
                    seen.push(alias);
                    worklist.push(alias);
                }
            }
        }
        seen.sort_unstable();
        seen
    }

    fn sorted(set: Option<&ValueSet>) -> Vec<SsaVarId> {
        let mut values: Vec<_> = set.map(|s| s.iter().copied().collect()).unwrap_or_default();
        values.sort_unstable();
        values
    }

    fn add_live(&mut self, value: SsaVarId) {
        self.live.insert(value);
    }

    fn add_alias(&mut self, alias: SsaVarId, definition: SsaVarId) {
        let mut definitions = self
            .aliases_to_definitions
            .get(&alias)
            .cloned()
            .unwrap_or_default();
        definitions.insert(definition);
        self.aliases_to_definitions.insert(alias, definitions);

        let mut aliases = self
            .definitions_to_aliases
            .get(&definition)
            .cloned()
            .unwrap_or_default();
        aliases.insert(alias);
        self.definitions_to_aliases.insert(definition, aliases);
    }

    /// Marks `value` escaped, closed over definitions and their aliases.
    fn escape(&mut self, value: SsaVarId) {
        let mut definitions = vec![value];
        let mut index = 0;
        while index < definitions.len() {
            if let Some(defs) = self.aliases_to_definitions.get(&definitions[index]) {
                for def in defs {
                    if !definitions.contains(def) {
                        definitions.push(*def);
                    }
                }
            }
            index += 1;
        }

        let mut worklist = definitions;
        while let Some(next) = worklist.pop() {
            if self.escaped.insert(next).is_some() {
                continue;
            }
            self.live.insert(next);
            if let Some(aliases) = self.definitions_to_aliases.get(&next) {
                worklist.extend(aliases.iter().copied());
            }
        }
    }
}

/// Transfer function of the escape analysis.
pub struct EscapeAnalysis<'a> {
    oracle: &'a dyn BuilderOracle,
}

impl<'a> EscapeAnalysis<'a> {
    /// Creates the analysis over `oracle`'s builder model.
    #[must_use]
    pub fn new(oracle: &'a dyn BuilderOracle) -> Self {
        Self { oracle }
    }

    /// Applies the phi nodes at the top of a block.
    ///
    /// A merge value is live iff any operand is live, and aliases every live
    /// operand. It escapes if any of them has escaped.
    #[must_use]
    pub fn apply_phis(&self, phis: &[PhiNode], mut state: EscapeState) -> EscapeState {
        for phi in phis {
            let result = phi.result();
            let mut any_escaped = false;
            for operand in phi.operands() {
                let value = operand.value();
                if state.is_live(value) {
                    state.add_live(result);
                    state.add_alias(result, value);
                    any_escaped |= state.is_escaped(value);
                }
            }
            if any_escaped {
                state.escape(result);
            }
        }
        state
    }

    /// Applies one operation.
    #[must_use]
    pub fn apply(&self, op: &SsaOp, mut state: EscapeState, ssa: &SsaFunction) -> EscapeState {
        let escaping = self.escaping_values(op, &state, ssa);

        match op {
            SsaOp::NewObj { dest, .. } if self.oracle.is_construct(op) => state.add_live(*dest),
            SsaOp::Assume { dest, value } | SsaOp::CastClass { dest, object: value, .. }
                if state.is_live(*value) =>
            {
                state.add_live(*dest);
                state.add_alias(*dest, *value);
                if state.is_escaped(*value) {
                    state.escape(*dest);
                }
            }
            _ => {
                if let Some(receiver) = self.returned_receiver(op, &state, ssa) {
                    if let Some(dest) = op.dest() {
                        state.add_live(dest);
                        state.add_alias(dest, receiver);
                        if state.is_escaped(receiver) {
                            state.escape(dest);
                        }
                    }
                }
            }
        }

        for value in escaping {
            state.escape(value);
        }
        state
    }

    /// Returns the values `op` makes observable, given the state before it.
    ///
    /// Besides live operands used by unmodelled instructions this includes a
    /// builder-typed result that does not come from a tracked allocation
    /// (parameter, load, generic call, cast of an untracked value).
    #[must_use]
    pub fn escaping_values(
        &self,
        op: &SsaOp,
        state: &EscapeState,
        ssa: &SsaFunction,
    ) -> Vec<SsaVarId> {
        let is_builder_result =
            |dest: SsaVarId| self.oracle.is_builder_type(ssa.var_type(dest));

        match op {
            SsaOp::NewObj { .. }
            | SsaOp::Const { .. }
            | SsaOp::Assume { .. }
            | SsaOp::Jump { .. }
            | SsaOp::Branch { .. }
            | SsaOp::Nop => Vec::new(),
            SsaOp::CastClass { dest, object, .. } => {
                if !state.is_live(*object) && is_builder_result(*dest) {
                    vec![*dest]
                } else {
                    Vec::new()
                }
            }
            SsaOp::Argument { dest, .. } | SsaOp::LoadStaticField { dest, .. } => {
                if is_builder_result(*dest) {
                    vec![*dest]
                } else {
                    Vec::new()
                }
            }
            SsaOp::Call { dest, args, .. } | SsaOp::CallVirt { dest, args, .. } => {
                let live = |v: SsaVarId| state.is_live(v);
                let modeled = self.oracle.is_modeled_instruction(op, &live);
                let mut escaping: Vec<SsaVarId> = args
                    .iter()
                    .enumerate()
                    .filter(|&(position, arg)| {
                        state.is_live(*arg) && !(modeled && self.is_tracked_operand(op, position))
                    })
                    .map(|(_, arg)| *arg)
                    .collect();
                if let Some(dest) = dest {
                    if is_builder_result(*dest)
                        && self.returned_receiver(op, state, ssa).is_none()
                    {
                        escaping.push(*dest);
                    }
                }
                escaping.dedup();
                escaping
            }
            _ => {
                let mut escaping: Vec<SsaVarId> = op
                    .uses()
                    .into_iter()
                    .filter(|v| state.is_live(*v))
                    .collect();
                if let Some(dest) = op.dest() {
                    if is_builder_result(dest) {
                        escaping.push(dest);
                    }
                }
                escaping
            }
        }
    }

    /// Returns `true` if operand `position` of a modeled call stays tracked:
    /// the receiver of a builder method, the builder read by an init/append,
    /// or the operand of a static materialize.
    fn is_tracked_operand(&self, op: &SsaOp, position: usize) -> bool {
        let Some((method, _)) = op.as_invoke() else {
            return false;
        };
        match position {
            0 => true,
            1 => !method.is_static && (self.oracle.is_init(op) || self.oracle.is_append(op)),
            _ => false,
        }
    }

    /// Returns the receiver when `op` is a modeled builder method returning it.
    fn returned_receiver(
        &self,
        op: &SsaOp,
        state: &EscapeState,
        ssa: &SsaFunction,
    ) -> Option<SsaVarId> {
        let dest = op.dest()?;
        let (method, args) = op.as_invoke()?;
        let receiver = *args.first()?;
        let live = |v: SsaVarId| state.is_live(v);
        (!method.is_static
            && self.oracle.is_modeled_instruction(op, &live)
            && self.oracle.is_builder_type(ssa.var_type(dest)))
        .then_some(receiver)
    }
}

impl DataFlowAnalysis for EscapeAnalysis<'_> {
    type Lattice = EscapeState;

    fn boundary(&self, _ssa: &SsaFunction) -> Self::Lattice {
        EscapeState::default()
    }

    fn initial(&self, _ssa: &SsaFunction) -> Self::Lattice {
        EscapeState::default()
    }

    fn transfer_phis(
        &self,
        _block_id: usize,
        phis: &[PhiNode],
        state: Self::Lattice,
        _ssa: &SsaFunction,
    ) -> Transfer<Self::Lattice> {
        Transfer::Continue(self.apply_phis(phis, state))
    }

    fn transfer_instruction(
        &self,
        _block_id: usize,
        _index: usize,
        instr: &SsaInstruction,
        state: Self::Lattice,
        ssa: &SsaFunction,
    ) -> Transfer<Self::Lattice> {
        Transfer::Continue(self.apply(instr.op(), state, ssa))
    }
}
