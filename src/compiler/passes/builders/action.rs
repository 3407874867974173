//! Rewrite actions recorded by the muncher.
//!
//! Munching only edits the operation graphs. Every change it wants to see in
//! the IR is recorded here as a [`BuilderAction`] keyed by the instruction it
//! applies to; the applier performs them all in one pass afterwards.

use std::collections::BTreeMap;

use crate::{analysis::SsaVarId, compiler::passes::builders::node::InstrSite};

/// One side of a `String.concat` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcatOperand {
    /// A string constant to materialize before the call.
    Constant(String),
    /// An existing non-null string value.
    Value(SsaVarId),
}

/// A rewrite of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderAction {
    /// Remove the instruction. An append's result is replaced by its receiver.
    Delete,

    /// Replace a materialization by the string constant.
    ReplaceWithConstant(String),

    /// Make an init/append add the given constant instead of its argument,
    /// switching to the `String` overload.
    ReplaceArgument(String),

    /// Replace a materialization by an existing string value.
    ReplaceWithExisting(SsaVarId),

    /// Replace a materialization by `first.concat(second)`.
    ReplaceWithConcat {
        /// Receiver of `concat`.
        first: ConcatOperand,
        /// Argument of `concat`.
        second: ConcatOperand,
    },

    /// Make an init/append add an existing string value.
    ReplaceArgumentWithExisting(SsaVarId),

    /// Compute `out = first.concat(second)` before an init/append and make it
    /// add `out`, or drop the init/append when `remove_instruction` is set.
    ReplaceArgumentWithConcat {
        /// Receiver of `concat`.
        first: ConcatOperand,
        /// Argument of `concat`.
        second: ConcatOperand,
        /// Fresh value holding the concatenation.
        out: SsaVarId,
        /// The init/append itself became dead after the concat was planned.
        remove_instruction: bool,
    },
}

impl BuilderAction {
    /// Returns `true` if a later [`BuilderAction::Delete`] may simply replace this one.
    #[must_use]
    pub const fn can_be_overwritten_by_delete(&self) -> bool {
        matches!(
            self,
            Self::Delete
                | Self::ReplaceArgument(_)
                | Self::ReplaceWithExisting(_)
                | Self::ReplaceArgumentWithExisting(_)
        )
    }
}

/// Actions keyed by instruction site, in program order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionMap(BTreeMap<InstrSite, BuilderAction>);

impl ActionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `action` for the instruction at `site`.
    ///
    /// A deletion of an instruction whose argument was already planned as a
    /// concatenation keeps the concatenation (its result may feed another
    /// rewrite) and only drops the instruction.
    pub fn record(&mut self, site: InstrSite, action: BuilderAction) {
        if action == BuilderAction::Delete {
            if let Some(BuilderAction::ReplaceArgumentWithConcat {
                remove_instruction, ..
            }) = self.0.get_mut(&site)
            {
                *remove_instruction = true;
                return;
            }
        }
        if let Some(previous) = self.0.get(&site) {
            debug_assert!(
                action != BuilderAction::Delete || previous.can_be_overwritten_by_delete(),
                "conflicting builder actions at {site}: {previous:?} then {action:?}"
            );
        }
        self.0.insert(site, action);
    }

    /// Returns the action recorded for `site`.
    #[must_use]
    pub fn get(&self, site: InstrSite) -> Option<&BuilderAction> {
        self.0.get(&site)
    }

    /// Number of recorded actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the actions in program order.
    pub fn iter(&self) -> impl Iterator<Item = (InstrSite, &BuilderAction)> {
        self.0.iter().map(|(site, action)| (*site, action))
    }

    /// Returns the actions of one block, by instruction index.
    #[must_use]
    pub fn for_block(&self, block: usize) -> BTreeMap<usize, &BuilderAction> {
        self.0
            .range(InstrSite::new(block, 0)..InstrSite::new(block + 1, 0))
            .map(|(site, action)| (site.index, action))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_marks_concat() {
        let site = InstrSite::new(0, 3);
        let mut actions = ActionMap::new();
        actions.record(
            site,
            BuilderAction::ReplaceArgumentWithConcat {
                first: ConcatOperand::Constant("a".to_string()),
                second: ConcatOperand::Value(SsaVarId::new(1)),
                out: SsaVarId::new(9),
                remove_instruction: false,
            },
        );
        actions.record(site, BuilderAction::Delete);

        assert!(matches!(
            actions.get(site),
            Some(BuilderAction::ReplaceArgumentWithConcat {
                remove_instruction: true,
                ..
            })
        ));
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_delete_overwrites_argument_rewrite() {
        let site = InstrSite::new(1, 0);
        let mut actions = ActionMap::new();
        actions.record(site, BuilderAction::ReplaceArgument("ab".to_string()));
        actions.record(site, BuilderAction::Delete);
        assert_eq!(actions.get(site), Some(&BuilderAction::Delete));
    }

    #[test]
    fn test_for_block_selects_one_block() {
        let mut actions = ActionMap::new();
        actions.record(InstrSite::new(0, 4), BuilderAction::Delete);
        actions.record(InstrSite::new(1, 2), BuilderAction::Delete);
        actions.record(InstrSite::new(1, 7), BuilderAction::ReplaceWithConstant("x".into()));
        actions.record(InstrSite::new(2, 0), BuilderAction::Delete);

        let block = actions.for_block(1);
        assert_eq!(block.keys().copied().collect::<Vec<_>>(), vec![2, 7]);
        assert!(actions.iter().next().is_some_and(|(site, _)| site.block == 0));
    }
}
