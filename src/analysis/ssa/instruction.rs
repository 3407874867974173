//! SSA-form instructions with explicit def/use information.
//!
//! An [`SsaInstruction`] wraps a single [`SsaOp`]. Uses and the definition are
//! always derived from the operation, so rewriting the operation keeps the
//! def/use view consistent without separate bookkeeping.

use std::fmt;

use crate::analysis::ssa::{SsaOp, SsaVarId};

/// An instruction in SSA form.
///
/// # Examples
///
/// ```rust
/// use builderfold::analysis::ssa::{ConstValue, SsaInstruction, SsaOp, SsaVarId};
///
/// let instr = SsaInstruction::new(SsaOp::Const {
///     dest: SsaVarId::new(0),
///     value: ConstValue::I32(1),
/// });
/// assert_eq!(instr.def(), Some(SsaVarId::new(0)));
/// assert!(instr.uses().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SsaInstruction {
    op: SsaOp,
}

impl SsaInstruction {
    /// Creates a new SSA instruction.
    #[must_use]
    pub const fn new(op: SsaOp) -> Self {
        Self { op }
    }

    /// Returns the decomposed operation.
    #[must_use]
    pub const fn op(&self) -> &SsaOp {
        &self.op
    }

    /// Returns the decomposed operation for in-place rewriting.
    pub fn op_mut(&mut self) -> &mut SsaOp {
        &mut self.op
    }

    /// Replaces the operation.
    pub fn set_op(&mut self, op: SsaOp) {
        self.op = op;
    }

    /// Turns this instruction into a `nop`.
    pub fn clear(&mut self) {
        self.op = SsaOp::Nop;
    }

    /// Returns `true` if this instruction ends its block.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }

    /// Returns `true` if this instruction may throw.
    #[must_use]
    pub const fn may_throw(&self) -> bool {
        self.op.may_throw()
    }

    /// Returns `true` for `nop`.
    #[must_use]
    pub const fn is_nop(&self) -> bool {
        matches!(self.op, SsaOp::Nop)
    }

    /// Variables read by this instruction.
    #[must_use]
    pub fn uses(&self) -> Vec<SsaVarId> {
        self.op.uses()
    }

    /// Variable defined by this instruction.
    #[must_use]
    pub fn def(&self) -> Option<SsaVarId> {
        self.op.dest()
    }
}

impl From<SsaOp> for SsaInstruction {
    fn from(op: SsaOp) -> Self {
        Self::new(op)
    }
}

impl fmt::Display for SsaInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)
    }
}
