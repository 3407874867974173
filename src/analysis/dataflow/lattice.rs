//! Lattice trait for data flow analysis.
//!
//! Abstract values of a forward "may" analysis form a join semi-lattice: the
//! state at a control flow merge is the least upper bound of the states
//! flowing in. Analyses start every block at bottom and only ever move up, so
//! a solver over a lattice of finite height terminates.
//!
//! The join must be:
//!
//! - **Idempotent**: `x.join(x) = x`
//! - **Commutative**: `x.join(y) = y.join(x)`
//! - **Associative**: `x.join(y.join(z)) = (x.join(y)).join(z)`

use std::{fmt::Debug, hash::Hash};

/// A join semi-lattice with a join (least upper bound) operation.
///
/// # Examples
///
/// ```rust
/// use builderfold::analysis::dataflow::JoinSemiLattice;
///
/// let a: imbl::HashSet<u32> = [1u32, 2].into_iter().collect();
/// let b: imbl::HashSet<u32> = [2u32, 3].into_iter().collect();
/// assert_eq!(a.join(&b).len(), 3);
/// ```
pub trait JoinSemiLattice: Clone + Debug + PartialEq {
    /// Computes the join (least upper bound) of two lattice elements.
    #[must_use]
    fn join(&self, other: &Self) -> Self;
}

impl<T> JoinSemiLattice for imbl::HashSet<T>
where
    T: Hash + Eq + Clone + Debug,
{
    /// Join is set union. Cloning an `imbl` set is O(1), so only the
    /// structure of the smaller side is copied into the result.
    fn join(&self, other: &Self) -> Self {
        if self.len() >= other.len() {
            self.clone().union(other.clone())
        } else {
            other.clone().union(self.clone())
        }
    }
}

impl<K, V> JoinSemiLattice for imbl::HashMap<K, imbl::HashSet<V>>
where
    K: Hash + Eq + Clone + Debug,
    V: Hash + Eq + Clone + Debug,
{
    /// Pointwise union of the value sets.
    fn join(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (key, values) in other {
            let merged = match result.get(key) {
                Some(existing) => existing.join(values),
                None => values.clone(),
            };
            result.insert(key.clone(), merged);
        }
        result
    }
}
