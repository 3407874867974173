//! SSA basic block representation.
//!
//! A block holds its phi nodes, its instructions (the last of which is the
//! terminator) and the indices of the exception handler blocks that protect
//! it. Any throwing instruction in a protected block may transfer control to
//! each listed handler.

use std::fmt;

use crate::analysis::ssa::{PhiNode, SsaInstruction, SsaVarId};

/// A basic block in SSA form.
#[derive(Debug, Clone, Default)]
pub struct SsaBlock {
    id: usize,
    phi_nodes: Vec<PhiNode>,
    instructions: Vec<SsaInstruction>,
    handlers: Vec<usize>,
}

impl SsaBlock {
    /// Creates an empty block.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Returns the block index.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Returns the phi nodes at the top of this block.
    #[must_use]
    pub fn phi_nodes(&self) -> &[PhiNode] {
        &self.phi_nodes
    }

    /// Returns the phi nodes for modification.
    pub fn phi_nodes_mut(&mut self) -> &mut Vec<PhiNode> {
        &mut self.phi_nodes
    }

    /// Returns the instructions of this block.
    #[must_use]
    pub fn instructions(&self) -> &[SsaInstruction] {
        &self.instructions
    }

    /// Returns the instructions for modification.
    pub fn instructions_mut(&mut self) -> &mut Vec<SsaInstruction> {
        &mut self.instructions
    }

    /// Returns the instruction at `index`.
    #[must_use]
    pub fn instruction(&self, index: usize) -> Option<&SsaInstruction> {
        self.instructions.get(index)
    }

    /// Returns the instruction at `index` for modification.
    pub fn instruction_mut(&mut self, index: usize) -> Option<&mut SsaInstruction> {
        self.instructions.get_mut(index)
    }

    /// Appends a phi node.
    pub fn add_phi(&mut self, phi: PhiNode) {
        self.phi_nodes.push(phi);
    }

    /// Appends an instruction.
    pub fn add_instruction(&mut self, instr: SsaInstruction) {
        self.instructions.push(instr);
    }

    /// Returns the handler blocks protecting this block.
    #[must_use]
    pub fn handlers(&self) -> &[usize] {
        &self.handlers
    }

    /// Registers `handler` as an exception handler for this block.
    pub fn add_handler(&mut self, handler: usize) {
        if !self.handlers.contains(&handler) {
            self.handlers.push(handler);
        }
    }

    /// Returns `true` if any exception handler protects this block.
    #[must_use]
    pub fn has_catch_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// Returns the terminator instruction, if the block has one.
    #[must_use]
    pub fn terminator(&self) -> Option<&SsaInstruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// Returns the normal control flow successors of this block.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        self.terminator()
            .map(|t| t.op().successors())
            .unwrap_or_default()
    }

    /// Returns the phi node defining `var`, if any.
    #[must_use]
    pub fn find_phi_defining(&self, var: SsaVarId) -> Option<&PhiNode> {
        self.phi_nodes.iter().find(|phi| phi.result() == var)
    }

    /// Iterates over all variables defined in this block.
    pub fn defined_variables(&self) -> impl Iterator<Item = SsaVarId> + '_ {
        self.phi_nodes
            .iter()
            .map(PhiNode::result)
            .chain(self.instructions.iter().filter_map(SsaInstruction::def))
    }

    /// Removes all `nop` instructions. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        let before = self.instructions.len();
        self.instructions.retain(|i| !i.is_nop());
        before - self.instructions.len()
    }
}

impl fmt::Display for SsaBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}:", self.id)?;
        if !self.handlers.is_empty() {
            write!(f, " handlers{:?}", self.handlers)?;
        }
        writeln!(f)?;
        for phi in &self.phi_nodes {
            writeln!(f, "  {phi}")?;
        }
        for instr in &self.instructions {
            writeln!(f, "  {instr}")?;
        }
        Ok(())
    }
}
