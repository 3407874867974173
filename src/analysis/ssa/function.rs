//! SSA function representation - a complete method in SSA form.
//!
//! An `SsaFunction` is the top-level container for a method's SSA representation.
//! It holds all SSA blocks and the variable table.
//!
//! # Structure
//!
//! ```text
//! SsaFunction
//! ├── blocks: Vec<SsaBlock>       // Block 0 is the entry
//! ├── variables: Vec<SsaVariable> // Indexed by SsaVarId
//! └── num_args: usize             // Number of method arguments
//! ```
//!
//! Functions are produced by a front end (or by
//! [`SsaFunctionBuilder`](crate::analysis::ssa::SsaFunctionBuilder) in tests)
//! and rewritten in place by optimization passes.

use std::{collections::HashSet, fmt};

use crate::{
    analysis::ssa::{
        PhiNode, SsaBlock, SsaInstruction, SsaType, SsaVarId, SsaVariable, VariableOrigin,
    },
    Result,
};

/// A method in SSA form.
///
/// # Examples
///
/// ```rust
/// use builderfold::analysis::ssa::{SsaBlock, SsaFunction, SsaType, VariableOrigin};
///
/// let mut func = SsaFunction::new(1);
/// func.add_block(SsaBlock::new(0));
/// let var = func.new_variable(VariableOrigin::Stack(0), SsaType::I32);
/// assert_eq!(func.var_type(var), &SsaType::I32);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SsaFunction {
    blocks: Vec<SsaBlock>,
    variables: Vec<SsaVariable>,
    num_args: usize,
}

impl SsaFunction {
    /// Creates a new empty SSA function.
    ///
    /// # Arguments
    ///
    /// * `num_args` - Number of method arguments (including the receiver for instance methods)
    #[must_use]
    pub fn new(num_args: usize) -> Self {
        Self {
            blocks: Vec::new(),
            variables: Vec::new(),
            num_args,
        }
    }

    /// Returns the SSA blocks.
    #[must_use]
    pub fn blocks(&self) -> &[SsaBlock] {
        &self.blocks
    }

    /// Returns a mutable reference to the blocks.
    pub fn blocks_mut(&mut self) -> &mut Vec<SsaBlock> {
        &mut self.blocks
    }

    /// Returns the SSA variables.
    #[must_use]
    pub fn variables(&self) -> &[SsaVariable] {
        &self.variables
    }

    /// Returns the number of method arguments.
    #[must_use]
    pub const fn num_args(&self) -> usize {
        self.num_args
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the number of variables.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if this function has no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Gets a block by index.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&SsaBlock> {
        self.blocks.get(index)
    }

    /// Gets a mutable block by index.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut SsaBlock> {
        self.blocks.get_mut(index)
    }

    /// Gets a variable by ID.
    #[must_use]
    pub fn variable(&self, id: SsaVarId) -> Option<&SsaVariable> {
        self.variables.get(id.index())
    }

    /// Gets a mutable variable by ID.
    pub fn variable_mut(&mut self, id: SsaVarId) -> Option<&mut SsaVariable> {
        self.variables.get_mut(id.index())
    }

    /// Returns the type of `id`, or [`SsaType::Unknown`] for unregistered ids.
    #[must_use]
    pub fn var_type(&self, id: SsaVarId) -> &SsaType {
        const UNKNOWN: &SsaType = &SsaType::Unknown;
        self.variable(id).map_or(UNKNOWN, SsaVariable::var_type)
    }

    /// Adds a block to this function.
    pub fn add_block(&mut self, block: SsaBlock) {
        self.blocks.push(block);
    }

    /// Allocates a fresh variable and returns its ID.
    pub fn new_variable(&mut self, origin: VariableOrigin, var_type: SsaType) -> SsaVarId {
        let id = SsaVarId::new(self.variables.len());
        self.variables.push(SsaVariable::new(id, origin, var_type));
        id
    }

    /// Registers metadata for a variable whose ID was chosen elsewhere.
    ///
    /// Grows the variable table as needed; gaps are filled with untyped stack
    /// temporaries. Existing entries are overwritten.
    pub fn register_variable(&mut self, id: SsaVarId, origin: VariableOrigin, var_type: SsaType) {
        while self.variables.len() <= id.index() {
            let filler = SsaVarId::new(self.variables.len());
            #[allow(clippy::cast_possible_truncation)]
            let slot = filler.index() as u32;
            self.variables.push(SsaVariable::new(
                filler,
                VariableOrigin::Stack(slot),
                SsaType::Unknown,
            ));
        }
        self.variables[id.index()] = SsaVariable::new(id, origin, var_type);
    }

    /// Iterates over all instructions as `(block, index, instruction)`.
    pub fn iter_instructions(&self) -> impl Iterator<Item = (usize, usize, &SsaInstruction)> {
        self.blocks.iter().enumerate().flat_map(|(b, block)| {
            block
                .instructions()
                .iter()
                .enumerate()
                .map(move |(i, instr)| (b, i, instr))
        })
    }

    /// Iterates over all phi nodes as `(block, phi)`.
    pub fn iter_phis(&self) -> impl Iterator<Item = (usize, &PhiNode)> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(b, block)| block.phi_nodes().iter().map(move |phi| (b, phi)))
    }

    /// Returns the total number of phi nodes.
    #[must_use]
    pub fn total_phi_count(&self) -> usize {
        self.blocks.iter().map(|b| b.phi_nodes().len()).sum()
    }

    /// Returns the total number of non-`nop` instructions.
    #[must_use]
    pub fn total_instruction_count(&self) -> usize {
        self.iter_instructions()
            .filter(|(_, _, instr)| !instr.is_nop())
            .count()
    }

    /// Replaces every use of `old` with `new` in instructions and phi operands.
    ///
    /// Returns the number of operands rewritten.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        if old == new {
            return 0;
        }
        let mut count = 0;
        for block in &mut self.blocks {
            for phi in block.phi_nodes_mut() {
                count += phi.replace_uses(old, new);
            }
            for instr in block.instructions_mut() {
                count += instr.op_mut().replace_uses(old, new);
            }
        }
        count
    }

    /// Removes phi nodes that are unused or trivial, until none remain.
    ///
    /// A phi is unused when nothing besides itself reads its result. A phi is
    /// trivial when it merges a single distinct value; its uses are redirected
    /// to that value before it is removed.
    ///
    /// Returns the number of phi nodes removed.
    pub fn remove_unused_phis(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let mut changed = false;

            let trivial: Vec<(SsaVarId, SsaVarId)> = self
                .iter_phis()
                .filter_map(|(_, phi)| phi.trivial_value().map(|v| (phi.result(), v)))
                .collect();
            if let Some(&(result, value)) = trivial.first() {
                self.replace_uses(result, value);
                for block in &mut self.blocks {
                    let before = block.phi_nodes().len();
                    block.phi_nodes_mut().retain(|phi| phi.result() != result);
                    removed += before - block.phi_nodes().len();
                }
                continue;
            }

            let used = self.used_outside_self();
            for block in &mut self.blocks {
                let before = block.phi_nodes().len();
                block
                    .phi_nodes_mut()
                    .retain(|phi| used.contains(&phi.result()));
                let delta = before - block.phi_nodes().len();
                if delta > 0 {
                    removed += delta;
                    changed = true;
                }
            }

            if !changed {
                return removed;
            }
        }
    }

    fn used_outside_self(&self) -> HashSet<SsaVarId> {
        let mut used = HashSet::new();
        for (_, phi) in self.iter_phis() {
            used.extend(phi.used_variables().filter(|v| *v != phi.result()));
        }
        for (_, _, instr) in self.iter_instructions() {
            used.extend(instr.uses());
        }
        used
    }

    /// Removes `nop` instructions from every block.
    ///
    /// Returns the number of instructions removed.
    pub fn compact(&mut self) -> usize {
        self.blocks.iter_mut().map(SsaBlock::compact).sum()
    }

    /// Checks the structural invariants of this function.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a block id does not match its
    /// position, a branch or handler names a missing block, a variable is
    /// defined twice, a phi operand names a block that is not a predecessor,
    /// or a used variable has no definition.
    pub fn verify(&self) -> Result<()> {
        let count = self.blocks.len();
        let mut predecessors: Vec<HashSet<usize>> = vec![HashSet::new(); count];

        for (index, block) in self.blocks.iter().enumerate() {
            if block.id() != index {
                return Err(malformed_error!(
                    "Block at position {} has id {}",
                    index,
                    block.id()
                ));
            }
            let mut targets = block.successors();
            if block.has_catch_handlers() {
                targets.extend_from_slice(block.handlers());
            }
            for target in targets {
                if target >= count {
                    return Err(malformed_error!(
                        "Block {} targets missing block {}",
                        index,
                        target
                    ));
                }
                predecessors[target].insert(index);
            }
        }

        let mut defined = HashSet::new();
        for block in &self.blocks {
            for var in block.defined_variables() {
                if !defined.insert(var) {
                    return Err(malformed_error!("Variable {} is defined twice", var));
                }
            }
        }

        for (index, phi) in self.iter_phis() {
            for operand in phi.operands() {
                if !predecessors[index].contains(&operand.predecessor()) {
                    return Err(malformed_error!(
                        "Phi {} in block {} names non-predecessor block {}",
                        phi.result(),
                        index,
                        operand.predecessor()
                    ));
                }
            }
        }

        let phi_uses = self.iter_phis().flat_map(|(_, phi)| phi.used_variables());
        let instr_uses = self
            .iter_instructions()
            .flat_map(|(_, _, instr)| instr.uses());
        for var in phi_uses.chain(instr_uses) {
            if !defined.contains(&var) {
                return Err(malformed_error!("Variable {} is used but never defined", var));
            }
        }

        Ok(())
    }
}

impl fmt::Display for SsaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "SSA Function ({} args, {} blocks, {} variables)",
            self.num_args,
            self.blocks.len(),
            self.variables.len()
        )?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ssa::{ConstValue, PhiOperand, SsaOp};

    fn straight_line() -> (SsaFunction, SsaVarId, SsaVarId) {
        let mut func = SsaFunction::new(0);
        let a = func.new_variable(VariableOrigin::Stack(0), SsaType::I32);
        let b = func.new_variable(VariableOrigin::Stack(1), SsaType::I32);
        let mut block = SsaBlock::new(0);
        block.add_instruction(SsaInstruction::new(SsaOp::Const {
            dest: a,
            value: ConstValue::I32(1),
        }));
        block.add_instruction(SsaInstruction::new(SsaOp::Const {
            dest: b,
            value: ConstValue::I32(2),
        }));
        block.add_instruction(SsaInstruction::new(SsaOp::Return { value: Some(a) }));
        func.add_block(block);
        (func, a, b)
    }

    #[test]
    fn test_replace_uses() {
        let (mut func, a, b) = straight_line();
        assert_eq!(func.replace_uses(a, b), 1);
        let ret = func.block(0).and_then(|blk| blk.instruction(2)).map(SsaInstruction::uses);
        assert_eq!(ret, Some(vec![b]));
    }

    #[test]
    fn test_verify_ok() {
        let (func, _, _) = straight_line();
        assert!(func.verify().is_ok());
    }

    #[test]
    fn test_verify_double_definition() {
        let (mut func, a, _) = straight_line();
        if let Some(block) = func.block_mut(0) {
            block.instructions_mut().insert(
                0,
                SsaInstruction::new(SsaOp::Const {
                    dest: a,
                    value: ConstValue::I32(3),
                }),
            );
        }
        assert!(matches!(func.verify(), Err(crate::Error::Malformed { .. })));
    }

    #[test]
    fn test_verify_missing_target() {
        let mut func = SsaFunction::new(0);
        let mut block = SsaBlock::new(0);
        block.add_instruction(SsaInstruction::new(SsaOp::Jump { target: 4 }));
        func.add_block(block);
        assert!(func.verify().is_err());
    }

    #[test]
    fn test_remove_unused_phis_cascade() {
        // B0 -> B1, B1 -> B1 | B2; phi p1 merges a with itself, p2 is unused.
        let mut func = SsaFunction::new(0);
        let a = func.new_variable(VariableOrigin::Stack(0), SsaType::I32);
        let c = func.new_variable(VariableOrigin::Stack(1), SsaType::Bool);
        let p1 = func.new_variable(VariableOrigin::Phi, SsaType::I32);
        let p2 = func.new_variable(VariableOrigin::Phi, SsaType::I32);

        let mut b0 = SsaBlock::new(0);
        b0.add_instruction(SsaInstruction::new(SsaOp::Const {
            dest: a,
            value: ConstValue::I32(1),
        }));
        b0.add_instruction(SsaInstruction::new(SsaOp::Const {
            dest: c,
            value: ConstValue::Bool(false),
        }));
        b0.add_instruction(SsaInstruction::new(SsaOp::Jump { target: 1 }));

        let mut b1 = SsaBlock::new(1);
        let mut phi1 = PhiNode::new(p1);
        phi1.add_operand(PhiOperand::new(a, 0));
        phi1.add_operand(PhiOperand::new(p1, 1));
        let mut phi2 = PhiNode::new(p2);
        phi2.add_operand(PhiOperand::new(a, 0));
        phi2.add_operand(PhiOperand::new(p1, 1));
        b1.add_phi(phi1);
        b1.add_phi(phi2);
        b1.add_instruction(SsaInstruction::new(SsaOp::Branch {
            condition: c,
            true_target: 1,
            false_target: 2,
        }));

        let mut b2 = SsaBlock::new(2);
        b2.add_instruction(SsaInstruction::new(SsaOp::Return { value: Some(p1) }));

        func.add_block(b0);
        func.add_block(b1);
        func.add_block(b2);

        assert_eq!(func.remove_unused_phis(), 2);
        assert_eq!(func.total_phi_count(), 0);
        let ret = func.block(2).and_then(|blk| blk.instruction(0)).map(SsaInstruction::uses);
        assert_eq!(ret, Some(vec![a]));
        assert!(func.verify().is_ok());
    }
}
