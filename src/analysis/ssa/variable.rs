//! SSA variable representation and identifiers.
//!
//! Each SSA variable has a unique identifier and is assigned exactly once. The
//! identifier is a plain index into the owning function's variable table; all
//! metadata lives in [`SsaVariable`].
//!
//! # Variable Origins
//!
//! Values enter SSA form from three sources:
//!
//! 1. **Arguments** - Method parameters passed by the caller
//! 2. **Stack temporaries** - Results of operations
//! 3. **Phi nodes** - Merges at control flow join points
//!
//! Optimization passes that create fresh values (for example when a folded
//! builder produces a new string constant) allocate them as stack temporaries.

use std::fmt;

use crate::analysis::ssa::SsaType;

/// Unique identifier for an SSA variable.
///
/// The identifier is unique within a single [`SsaFunction`](crate::analysis::ssa::SsaFunction)
/// but not across functions. Ordering follows allocation order, which makes
/// ordered maps keyed by `SsaVarId` deterministic.
///
/// # Examples
///
/// ```rust
/// use builderfold::analysis::ssa::SsaVarId;
///
/// let id = SsaVarId::new(42);
/// assert_eq!(id.index(), 42);
/// assert_eq!(id.to_string(), "v42");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsaVarId(usize);

impl SsaVarId {
    /// Creates a new SSA variable identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index into the variable table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SsaVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for SsaVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The origin of an SSA variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableOrigin {
    /// Method argument. For instance methods, argument 0 is the receiver.
    Argument(u16),

    /// Temporary produced by an operation.
    Stack(u32),

    /// Result of a phi node at a control flow merge.
    Phi,
}

impl VariableOrigin {
    /// Returns `true` if this is an argument origin.
    #[must_use]
    pub const fn is_argument(&self) -> bool {
        matches!(self, Self::Argument(_))
    }

    /// Returns `true` if this is a phi node result.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self, Self::Phi)
    }

    /// Returns the argument index if this is an argument origin.
    #[must_use]
    pub const fn argument_index(&self) -> Option<u16> {
        match self {
            Self::Argument(idx) => Some(*idx),
            _ => None,
        }
    }
}

impl fmt::Display for VariableOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument(idx) => write!(f, "arg{idx}"),
            Self::Stack(slot) => write!(f, "stk{slot}"),
            Self::Phi => write!(f, "phi"),
        }
    }
}

/// Definition site of an SSA variable.
///
/// Phi results and arguments have no instruction index; phis are defined at the
/// top of their block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefSite {
    /// The block where this variable is defined.
    pub block: usize,
    /// The instruction index within the block, or `None` for phi nodes.
    pub instruction: Option<usize>,
}

impl DefSite {
    /// Creates a definition site for a regular instruction.
    #[must_use]
    pub const fn instruction(block: usize, instr_idx: usize) -> Self {
        Self {
            block,
            instruction: Some(instr_idx),
        }
    }

    /// Creates a definition site for a phi node (at block entry).
    #[must_use]
    pub const fn phi(block: usize) -> Self {
        Self {
            block,
            instruction: None,
        }
    }

    /// Returns `true` if this is a phi node definition.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        self.instruction.is_none()
    }
}

/// Use site of an SSA variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseSite {
    /// The block where this variable is used.
    pub block: usize,
    /// The instruction index, or the phi index for phi operands.
    pub instruction: usize,
    /// Whether this use is a phi operand.
    pub is_phi_operand: bool,
}

impl UseSite {
    /// Creates a use site for a regular instruction.
    #[must_use]
    pub const fn instruction(block: usize, instr_idx: usize) -> Self {
        Self {
            block,
            instruction: instr_idx,
            is_phi_operand: false,
        }
    }

    /// Creates a use site for a phi node operand.
    #[must_use]
    pub const fn phi_operand(block: usize, phi_idx: usize) -> Self {
        Self {
            block,
            instruction: phi_idx,
            is_phi_operand: true,
        }
    }
}

/// Metadata for an SSA variable.
#[derive(Debug, Clone)]
pub struct SsaVariable {
    id: SsaVarId,
    origin: VariableOrigin,
    var_type: SsaType,
}

impl SsaVariable {
    /// Creates a new SSA variable.
    #[must_use]
    pub fn new(id: SsaVarId, origin: VariableOrigin, var_type: SsaType) -> Self {
        Self {
            id,
            origin,
            var_type,
        }
    }

    /// Returns the variable identifier.
    #[must_use]
    pub const fn id(&self) -> SsaVarId {
        self.id
    }

    /// Returns where the variable came from.
    #[must_use]
    pub const fn origin(&self) -> VariableOrigin {
        self.origin
    }

    /// Returns the variable's type.
    #[must_use]
    pub const fn var_type(&self) -> &SsaType {
        &self.var_type
    }

    /// Updates the variable's type.
    pub fn set_type(&mut self, var_type: SsaType) {
        self.var_type = var_type;
    }
}

impl fmt::Display for SsaVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.id, self.var_type, self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_id_ordering() {
        let mut ids = vec![SsaVarId::new(3), SsaVarId::new(1), SsaVarId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![SsaVarId::new(1), SsaVarId::new(2), SsaVarId::new(3)]);
        assert_eq!(format!("{:?}", SsaVarId::new(7)), "v7");
    }

    #[test]
    fn test_origin_queries() {
        assert!(VariableOrigin::Argument(0).is_argument());
        assert_eq!(VariableOrigin::Argument(2).argument_index(), Some(2));
        assert!(VariableOrigin::Phi.is_phi());
        assert_eq!(VariableOrigin::Stack(4).to_string(), "stk4");
    }

    #[test]
    fn test_def_site() {
        assert!(DefSite::phi(2).is_phi());
        assert!(!DefSite::instruction(0, 1).is_phi());
    }

    #[test]
    fn test_variable_display() {
        let var = SsaVariable::new(SsaVarId::new(0), VariableOrigin::Argument(0), SsaType::I32);
        assert_eq!(var.to_string(), "v0: i32 (arg0)");
    }
}
