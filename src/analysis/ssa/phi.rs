//! Phi node representation for SSA form.
//!
//! A phi node `v3 = phi(v1 from B1, v2 from B2)` selects `v1` when control
//! arrives from block B1 and `v2` when it arrives from B2. Phi nodes are
//! evaluated at the entry of their block, before any instruction executes.

use std::fmt;

use crate::analysis::ssa::SsaVarId;

/// An operand of a phi node: a value coming from a specific predecessor block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiOperand {
    value: SsaVarId,
    predecessor: usize,
}

impl PhiOperand {
    /// Creates a new phi operand.
    ///
    /// # Arguments
    ///
    /// * `value` - The SSA variable providing the value
    /// * `predecessor` - The block index from which this value comes
    #[must_use]
    pub const fn new(value: SsaVarId, predecessor: usize) -> Self {
        Self { value, predecessor }
    }

    /// Returns the SSA variable providing the value.
    #[must_use]
    pub const fn value(&self) -> SsaVarId {
        self.value
    }

    /// Returns the predecessor block index.
    #[must_use]
    pub const fn predecessor(&self) -> usize {
        self.predecessor
    }
}

impl fmt::Display for PhiOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from B{}", self.value, self.predecessor)
    }
}

/// A phi node that merges values at a control flow join point.
///
/// # Examples
///
/// ```rust
/// use builderfold::analysis::ssa::{PhiNode, PhiOperand, SsaVarId};
///
/// let mut phi = PhiNode::new(SsaVarId::new(3));
/// phi.add_operand(PhiOperand::new(SsaVarId::new(1), 1));
/// phi.add_operand(PhiOperand::new(SsaVarId::new(2), 2));
/// assert_eq!(phi.operand_count(), 2);
/// assert_eq!(phi.to_string(), "v3 = phi(v1 from B1, v2 from B2)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiNode {
    result: SsaVarId,
    operands: Vec<PhiOperand>,
}

impl PhiNode {
    /// Creates a new phi node with no operands.
    #[must_use]
    pub fn new(result: SsaVarId) -> Self {
        Self {
            result,
            operands: Vec::new(),
        }
    }

    /// Returns the variable defined by this phi.
    #[must_use]
    pub const fn result(&self) -> SsaVarId {
        self.result
    }

    /// Returns the operands.
    #[must_use]
    pub fn operands(&self) -> &[PhiOperand] {
        &self.operands
    }

    /// Adds an operand.
    pub fn add_operand(&mut self, operand: PhiOperand) {
        self.operands.push(operand);
    }

    /// Returns the number of operands.
    #[must_use]
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Returns the operand for the given predecessor, if any.
    #[must_use]
    pub fn operand_from(&self, predecessor: usize) -> Option<&PhiOperand> {
        self.operands.iter().find(|op| op.predecessor == predecessor)
    }

    /// Iterates over the variables this phi reads.
    pub fn used_variables(&self) -> impl Iterator<Item = SsaVarId> + '_ {
        self.operands.iter().map(PhiOperand::value)
    }

    /// Replaces every operand equal to `old` with `new`.
    ///
    /// Returns the number of operands rewritten.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        let mut count = 0;
        for operand in &mut self.operands {
            if operand.value == old {
                operand.value = new;
                count += 1;
            }
        }
        count
    }

    /// Returns the single distinct value this phi merges, ignoring self-references.
    ///
    /// A phi whose operands are all `v` or the phi's own result is equivalent
    /// to `v`. Returns `None` when two or more distinct values flow in, or when
    /// only self-references exist.
    #[must_use]
    pub fn trivial_value(&self) -> Option<SsaVarId> {
        let mut unique = None;
        for value in self.used_variables() {
            if value == self.result {
                continue;
            }
            match unique {
                None => unique = Some(value),
                Some(existing) if existing == value => {}
                Some(_) => return None,
            }
        }
        unique
    }
}

impl fmt::Display for PhiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = phi(", self.result)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{operand}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: usize) -> SsaVarId {
        SsaVarId::new(n)
    }

    #[test]
    fn test_operand_from() {
        let mut phi = PhiNode::new(v(4));
        phi.add_operand(PhiOperand::new(v(1), 0));
        phi.add_operand(PhiOperand::new(v(2), 3));
        assert_eq!(phi.operand_from(3).map(PhiOperand::value), Some(v(2)));
        assert!(phi.operand_from(7).is_none());
    }

    #[test]
    fn test_trivial_value() {
        let mut phi = PhiNode::new(v(4));
        phi.add_operand(PhiOperand::new(v(1), 0));
        phi.add_operand(PhiOperand::new(v(4), 2));
        assert_eq!(phi.trivial_value(), Some(v(1)));

        phi.add_operand(PhiOperand::new(v(2), 3));
        assert_eq!(phi.trivial_value(), None);
    }

    #[test]
    fn test_replace_uses() {
        let mut phi = PhiNode::new(v(4));
        phi.add_operand(PhiOperand::new(v(1), 0));
        phi.add_operand(PhiOperand::new(v(1), 1));
        assert_eq!(phi.replace_uses(v(1), v(9)), 2);
        assert_eq!(phi.trivial_value(), Some(v(9)));
    }
}
