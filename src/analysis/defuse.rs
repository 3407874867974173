//! Def-Use Index for efficient SSA variable lookup.
//!
//! [`DefUseIndex`] answers the questions optimization passes ask over and over:
//!
//! - **Definition**: Where is `v` defined, and by which operation?
//! - **Uses**: Which instructions and phi operands read `v`?
//! - **Phi results**: Is `v` the result of a phi node?
//!
//! The index is a snapshot. Passes that rewrite the function rebuild it before
//! the next round of queries.
//!
//! # Basic Usage
//!
//! ```rust
//! use builderfold::analysis::{ssa::SsaFunctionBuilder, DefUseIndex};
//!
//! let mut value = None;
//! let ssa = SsaFunctionBuilder::new(0).build_with(|f| {
//!     f.block(0, |b| {
//!         let v = b.const_i32(7);
//!         value = Some(v);
//!         b.ret_val(v);
//!     });
//! });
//!
//! let index = DefUseIndex::build(&ssa);
//! let v = value.unwrap();
//! assert_eq!(index.use_count(v), 1);
//! assert!(index.def_op(v).is_some());
//! ```

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::ssa::{DefSite, SsaFunction, SsaOp, SsaVarId, UseSite};

/// Index for def-use queries on an SSA function.
#[derive(Debug, Clone, Default)]
pub struct DefUseIndex {
    /// Map from variable ID to its definition site.
    definitions: FxHashMap<SsaVarId, DefSite>,

    /// Map from variable ID to its use sites, in program order.
    uses: FxHashMap<SsaVarId, Vec<UseSite>>,

    /// Defining operation of every instruction-defined variable.
    def_ops: FxHashMap<SsaVarId, SsaOp>,

    /// Variables defined by phi nodes.
    phi_defs: FxHashSet<SsaVarId>,
}

impl DefUseIndex {
    /// Builds a def-use index from an SSA function.
    ///
    /// This is an O(n) operation where n is the total number of instructions
    /// and phi nodes in the function.
    #[must_use]
    pub fn build(ssa: &SsaFunction) -> Self {
        let mut index = Self::default();

        for (block_idx, block) in ssa.blocks().iter().enumerate() {
            for (phi_idx, phi) in block.phi_nodes().iter().enumerate() {
                index
                    .definitions
                    .insert(phi.result(), DefSite::phi(block_idx));
                index.phi_defs.insert(phi.result());
                for value in phi.used_variables() {
                    index
                        .uses
                        .entry(value)
                        .or_default()
                        .push(UseSite::phi_operand(block_idx, phi_idx));
                }
            }

            for (instr_idx, instr) in block.instructions().iter().enumerate() {
                let op = instr.op();
                if let Some(dest) = op.dest() {
                    index
                        .definitions
                        .insert(dest, DefSite::instruction(block_idx, instr_idx));
                    index.def_ops.insert(dest, op.clone());
                }
                for var in op.uses() {
                    let sites = index.uses.entry(var).or_default();
                    let site = UseSite::instruction(block_idx, instr_idx);
                    // An instruction reading the same value twice is one use site
                    if sites.last() != Some(&site) {
                        sites.push(site);
                    }
                }
            }
        }

        index
    }

    /// Returns the defining operation for a variable.
    ///
    /// Returns `None` for unknown variables and phi results.
    #[must_use]
    pub fn def_op(&self, var: SsaVarId) -> Option<&SsaOp> {
        self.def_ops.get(&var)
    }

    /// Returns `(block, instruction, operation)` for an instruction-defined variable.
    #[must_use]
    pub fn full_definition(&self, var: SsaVarId) -> Option<(usize, usize, &SsaOp)> {
        let site = self.def_site(var)?;
        let instr = site.instruction?;
        let op = self.def_op(var)?;
        Some((site.block, instr, op))
    }

    /// Returns the definition site for a variable.
    #[must_use]
    pub fn def_site(&self, var: SsaVarId) -> Option<DefSite> {
        self.definitions.get(&var).copied()
    }

    /// Returns all use sites of a variable.
    #[must_use]
    pub fn uses_of(&self, var: SsaVarId) -> &[UseSite] {
        self.uses.get(&var).map_or(&[], Vec::as_slice)
    }

    /// Returns the number of distinct use sites.
    #[must_use]
    pub fn use_count(&self, var: SsaVarId) -> usize {
        self.uses_of(var).len()
    }

    /// Returns `true` if the variable is read anywhere.
    #[must_use]
    pub fn has_uses(&self, var: SsaVarId) -> bool {
        !self.uses_of(var).is_empty()
    }

    /// Returns `true` if the variable is the result of a phi node.
    #[must_use]
    pub fn is_phi_def(&self, var: SsaVarId) -> bool {
        self.phi_defs.contains(&var)
    }

    /// Returns `true` if every use of the variable is a phi operand.
    #[must_use]
    pub fn only_used_in_phis(&self, var: SsaVarId) -> bool {
        let uses = self.uses_of(var);
        !uses.is_empty() && uses.iter().all(|u| u.is_phi_operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ssa::{SsaFunctionBuilder, SsaType};

    #[test]
    fn test_defs_and_uses() {
        let (mut c, mut eq, mut merged) = (SsaVarId::new(0), SsaVarId::new(0), SsaVarId::new(0));
        let ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
            let cond = f.arg(0);
            f.block(0, |b| {
                c = b.const_i32(1);
                eq = b.ceq(c, c);
                b.branch(cond, 1, 2);
            });
            f.block(1, |b| b.jump(2));
            f.block(2, |b| {
                merged = b.phi(&[(0, c), (1, eq)]);
                b.ret_val(merged);
            });
        });

        let index = DefUseIndex::build(&ssa);

        // ceq(c, c) counts once; the phi operand is the second use
        assert_eq!(index.use_count(c), 2);
        assert!(index.uses_of(c)[1].is_phi_operand);
        assert!(index.only_used_in_phis(eq));
        assert!(index.is_phi_def(merged));
        assert!(index.def_op(merged).is_none());
        assert_eq!(index.def_site(merged), Some(DefSite::phi(2)));

        let (block, instr, op) = index.full_definition(eq).expect("ceq definition");
        assert_eq!((block, instr), (0, 2));
        assert!(matches!(op, SsaOp::Ceq { .. }));
    }

    #[test]
    fn test_unknown_variable() {
        let ssa = SsaFunctionBuilder::new(0).build_with(|f| f.block(0, |b| b.ret()));
        let index = DefUseIndex::build(&ssa);
        assert!(!index.has_uses(SsaVarId::new(99)));
        assert!(index.def_site(SsaVarId::new(99)).is_none());
    }
}
