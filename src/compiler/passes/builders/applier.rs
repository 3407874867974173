//! Applies recorded builder actions to the SSA function.
//!
//! This is the only place the builder-chain optimization mutates the IR. Each
//! block's instruction list is rebuilt once with all of its actions applied;
//! value substitutions are collected along the way and performed together at
//! the end, followed by phi cleanup and removal of allocations whose builder
//! no longer has any use.
//!
//! String constants may throw when resolved. In a block covered by a catch
//! handler a new constant is therefore defined in the entry block, right after
//! the arguments, instead of next to the instruction that needs it.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{
        ssa::{SsaType, VariableOrigin},
        ConstValue, DefUseIndex, MethodRef, SsaFunction, SsaInstruction, SsaOp, SsaVarId,
        TypeRef,
    },
    compiler::{
        passes::builders::{
            action::{ActionMap, BuilderAction, ConcatOperand},
            node::InstrSite,
        },
        EventKind,
    },
};

/// One change made to the IR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    /// Event describing the change.
    pub kind: EventKind,
    /// Site of the instruction, as numbered before the change.
    pub site: InstrSite,
}

/// Summary of an application.
#[derive(Debug, Clone, Default)]
pub struct ApplySummary {
    /// Changes in program order.
    pub changes: Vec<AppliedChange>,
    /// Phi nodes removed afterwards.
    pub phis_removed: usize,
}

impl ApplySummary {
    /// Returns `true` if the IR was changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.changes.is_empty() || self.phis_removed > 0
    }

    /// Number of changes of `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }
}

/// Applies `actions` to `ssa`.
///
/// `fresh_values` are the values the actions introduced for concatenation
/// results; they are registered as strings before anything else is allocated.
pub fn apply_actions(
    ssa: &mut SsaFunction,
    actions: &ActionMap,
    fresh_values: &[SsaVarId],
) -> ApplySummary {
    let mut applier = Applier::new(ssa);
    if actions.is_empty() {
        return applier.summary;
    }
    for &value in fresh_values {
        applier.register_string(value);
    }
    for block in 0..applier.ssa.block_count() {
        applier.rewrite_block(block, actions);
    }
    applier.finish()
}

struct Applier<'a> {
    ssa: &'a mut SsaFunction,
    entry_constants: Vec<SsaInstruction>,
    substitutions: FxHashMap<SsaVarId, SsaVarId>,
    pending_constructs: Vec<(InstrSite, SsaVarId)>,
    summary: ApplySummary,
}

impl<'a> Applier<'a> {
    fn new(ssa: &'a mut SsaFunction) -> Self {
        Self {
            ssa,
            entry_constants: Vec::new(),
            substitutions: FxHashMap::default(),
            pending_constructs: Vec::new(),
            summary: ApplySummary::default(),
        }
    }

    fn register_string(&mut self, value: SsaVarId) {
        let slot = u32::try_from(value.index()).unwrap_or(u32::MAX);
        self.ssa
            .register_variable(value, VariableOrigin::Stack(slot), SsaType::string());
    }

    fn new_string(&mut self) -> SsaVarId {
        let slot = u32::try_from(self.ssa.variable_count()).unwrap_or(u32::MAX);
        self.ssa
            .new_variable(VariableOrigin::Stack(slot), SsaType::string())
    }

    fn changed(&mut self, kind: EventKind, site: InstrSite) {
        self.summary.changes.push(AppliedChange { kind, site });
    }

    /// Defines a new string constant, returning its value.
    fn constant(&mut self, value: &str, guarded: bool, out: &mut Vec<SsaInstruction>) -> SsaVarId {
        let dest = self.new_string();
        self.define_constant(dest, value, guarded, out);
        dest
    }

    fn define_constant(
        &mut self,
        dest: SsaVarId,
        value: &str,
        guarded: bool,
        out: &mut Vec<SsaInstruction>,
    ) {
        let instr = SsaInstruction::new(SsaOp::Const {
            dest,
            value: ConstValue::String(value.to_string()),
        });
        if guarded {
            self.entry_constants.push(instr);
        } else {
            out.push(instr);
        }
    }

    fn operand(
        &mut self,
        operand: &ConcatOperand,
        guarded: bool,
        out: &mut Vec<SsaInstruction>,
    ) -> SsaVarId {
        match operand {
            ConcatOperand::Constant(value) => self.constant(value, guarded, out),
            ConcatOperand::Value(value) => *value,
        }
    }

    fn concat(
        &mut self,
        dest: SsaVarId,
        first: &ConcatOperand,
        second: &ConcatOperand,
        guarded: bool,
        out: &mut Vec<SsaInstruction>,
    ) {
        let receiver = self.operand(first, guarded, out);
        let argument = self.operand(second, guarded, out);
        out.push(SsaInstruction::new(SsaOp::CallVirt {
            dest: Some(dest),
            method: string_concat(),
            args: vec![receiver, argument],
        }));
    }

    fn rewrite_block(&mut self, block: usize, actions: &ActionMap) {
        let actions = actions.for_block(block);
        if actions.is_empty() {
            return;
        }
        let Some(ssa_block) = self.ssa.block_mut(block) else {
            return;
        };
        let guarded = ssa_block.has_catch_handlers();
        let old = std::mem::take(ssa_block.instructions_mut());
        let mut out = Vec::with_capacity(old.len());

        for (index, mut instr) in old.into_iter().enumerate() {
            let site = InstrSite::new(block, index);
            let Some(action) = actions.get(&index) else {
                out.push(instr);
                continue;
            };
            match action {
                BuilderAction::Delete => {
                    if let SsaOp::NewObj { dest, .. } = instr.op() {
                        // Removed at the end, once it is known to be unused
                        self.pending_constructs.push((site, *dest));
                        out.push(instr);
                        continue;
                    }
                    self.forward_receiver(instr.op());
                    self.changed(EventKind::InstructionRemoved, site);
                }
                BuilderAction::ReplaceWithConstant(value) => {
                    if let Some(dest) = instr.op().dest() {
                        self.define_constant(dest, value, guarded, &mut out);
                    }
                    self.changed(EventKind::ConstantFolded, site);
                }
                BuilderAction::ReplaceArgument(value) => {
                    let constant = self.constant(value, guarded, &mut out);
                    rewrite_argument(instr.op_mut(), constant);
                    out.push(instr);
                    self.changed(EventKind::AppendsMerged, site);
                }
                BuilderAction::ReplaceWithExisting(value) => {
                    if let Some(dest) = instr.op().dest() {
                        self.substitutions.insert(dest, *value);
                    }
                    self.changed(EventKind::ConcatCreated, site);
                }
                BuilderAction::ReplaceWithConcat { first, second } => {
                    if let Some(dest) = instr.op().dest() {
                        self.concat(dest, first, second, guarded, &mut out);
                    }
                    self.changed(EventKind::ConcatCreated, site);
                }
                BuilderAction::ReplaceArgumentWithExisting(value) => {
                    rewrite_argument(instr.op_mut(), *value);
                    out.push(instr);
                    self.changed(EventKind::ConcatCreated, site);
                }
                BuilderAction::ReplaceArgumentWithConcat {
                    first,
                    second,
                    out: result,
                    remove_instruction,
                } => {
                    self.concat(*result, first, second, guarded, &mut out);
                    if *remove_instruction {
                        self.forward_receiver(instr.op());
                        self.changed(EventKind::InstructionRemoved, site);
                    } else {
                        rewrite_argument(instr.op_mut(), *result);
                        out.push(instr);
                    }
                    self.changed(EventKind::ConcatCreated, site);
                }
            }
        }

        if let Some(ssa_block) = self.ssa.block_mut(block) {
            *ssa_block.instructions_mut() = out;
        }
    }

    /// A removed append returns its receiver; uses of its result read the
    /// receiver instead.
    fn forward_receiver(&mut self, op: &SsaOp) {
        if let (Some(dest), Some((_, args))) = (op.dest(), op.as_invoke()) {
            if let Some(&receiver) = args.first() {
                self.substitutions.insert(dest, receiver);
            }
        }
    }

    fn resolve(&self, mut value: SsaVarId) -> SsaVarId {
        for _ in 0..=self.substitutions.len() {
            match self.substitutions.get(&value) {
                Some(&next) if next != value => value = next,
                _ => break,
            }
        }
        value
    }

    fn finish(mut self) -> ApplySummary {
        if !self.entry_constants.is_empty() {
            let constants = std::mem::take(&mut self.entry_constants);
            if let Some(entry) = self.ssa.block_mut(0) {
                let instructions = entry.instructions_mut();
                let position = instructions
                    .iter()
                    .take_while(|instr| matches!(instr.op(), SsaOp::Argument { .. }))
                    .count();
                instructions.splice(position..position, constants);
            }
        }

        let substitutions: Vec<(SsaVarId, SsaVarId)> = self
            .substitutions
            .keys()
            .map(|&old| (old, self.resolve(old)))
            .collect();
        for (old, new) in substitutions {
            self.ssa.replace_uses(old, new);
        }

        self.summary.phis_removed = self.ssa.remove_unused_phis();
        self.remove_unused_constructs();
        self.ssa.compact();
        self.summary
    }

    /// Drops allocations whose builder, including its `Assume`/`CastClass`
    /// aliases, is no longer read by anything else.
    fn remove_unused_constructs(&mut self) {
        if self.pending_constructs.is_empty() {
            return;
        }
        let index = DefUseIndex::build(&*self.ssa);
        let mut removable: FxHashSet<SsaVarId> = FxHashSet::default();
        let mut removed_sites = Vec::new();

        for &(site, dest) in &self.pending_constructs {
            let closure = alias_closure(dest, &index, &*self.ssa);
            let unused = closure.iter().all(|value| {
                index.uses_of(*value).iter().all(|use_site| {
                    !use_site.is_phi_operand
                        && self
                            .ssa
                            .block(use_site.block)
                            .and_then(|block| block.instruction(use_site.instruction))
                            .and_then(SsaInstruction::def)
                            .is_some_and(|def| closure.contains(&def))
                })
            });
            if unused {
                removable.extend(closure);
                removed_sites.push(site);
            } else {
                log::debug!("keeping builder allocation at {site}: still in use");
            }
        }

        for block in self.ssa.blocks_mut() {
            for instr in block.instructions_mut() {
                if instr.def().is_some_and(|def| removable.contains(&def)) {
                    instr.clear();
                }
            }
        }
        for site in removed_sites {
            self.changed(EventKind::BuilderRemoved, site);
        }
    }
}

/// `value` plus every value derived from it by `Assume` or `CastClass`.
fn alias_closure(value: SsaVarId, index: &DefUseIndex, ssa: &SsaFunction) -> FxHashSet<SsaVarId> {
    let mut closure = FxHashSet::default();
    let mut worklist = vec![value];
    while let Some(next) = worklist.pop() {
        if !closure.insert(next) {
            continue;
        }
        for use_site in index.uses_of(next) {
            if use_site.is_phi_operand {
                continue;
            }
            let Some(instr) = ssa
                .block(use_site.block)
                .and_then(|block| block.instruction(use_site.instruction))
            else {
                continue;
            };
            if let SsaOp::Assume { dest, .. } | SsaOp::CastClass { dest, .. } = instr.op() {
                worklist.push(*dest);
            }
        }
    }
    closure
}

fn string_concat() -> MethodRef {
    MethodRef::instance(
        TypeRef::string(),
        "concat",
        vec![SsaType::string()],
        SsaType::string(),
    )
}

/// Switches an init or append to its `String` overload with `value` as the
/// argument.
fn rewrite_argument(op: &mut SsaOp, value: SsaVarId) {
    if let SsaOp::Call { method, args, .. } | SsaOp::CallVirt { method, args, .. } = op {
        *method = MethodRef {
            params: vec![SsaType::string()],
            ..method.clone()
        };
        args.truncate(1);
        args.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SsaFunctionBuilder;

    fn sb() -> TypeRef {
        TypeRef::new("StringBuilder")
    }

    fn append() -> MethodRef {
        MethodRef::instance(sb(), "append", vec![SsaType::I32], SsaType::class("StringBuilder"))
    }

    #[test]
    fn test_replace_argument_switches_overload() {
        let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let v = b.new_obj(&sb());
                let x = b.const_i32(4);
                b.callvirt_void(append(), &[v, x]);
                b.ret();
            });
        });
        let mut actions = ActionMap::new();
        actions.record(InstrSite::new(0, 2), BuilderAction::ReplaceArgument("4".into()));

        let summary = apply_actions(&mut ssa, &actions, &[]);
        assert_eq!(summary.count(EventKind::AppendsMerged), 1);

        let block = ssa.block(0).expect("entry block");
        let SsaOp::CallVirt { method, args, .. } = block.instruction(3).expect("call").op() else {
            panic!("expected the rewritten append");
        };
        assert!(method.params[0].is_string());
        let SsaOp::Const { dest, value } = block.instruction(2).expect("constant").op() else {
            panic!("expected the new constant before the call");
        };
        assert_eq!(args[1], *dest);
        assert_eq!(value.as_str(), Some("4"));
    }

    #[test]
    fn test_guarded_constant_goes_to_entry() {
        let mut ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
            let _ = f.arg(0);
            f.block(0, |b| b.jump(1));
            f.block(1, |b| {
                b.handler(2);
                let v = b.new_obj(&sb());
                let x = b.const_i32(4);
                b.callvirt_void(append(), &[v, x]);
                b.ret();
            });
            f.block(2, |b| b.ret());
        });
        let mut actions = ActionMap::new();
        actions.record(InstrSite::new(1, 2), BuilderAction::ReplaceArgument("4".into()));
        apply_actions(&mut ssa, &actions, &[]);

        let entry = ssa.block(0).expect("entry block");
        assert!(matches!(
            entry.instruction(0).map(SsaInstruction::op),
            Some(SsaOp::Argument { .. })
        ));
        assert!(matches!(
            entry.instruction(1).map(SsaInstruction::op),
            Some(SsaOp::Const { .. })
        ));
        assert!(ssa.verify().is_ok());
    }

    #[test]
    fn test_deleted_append_forwards_receiver() {
        let mut result = SsaVarId::new(0);
        let mut builder = SsaVarId::new(0);
        let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                builder = b.new_obj(&sb());
                let x = b.const_i32(4);
                result = b.callvirt(append(), &[builder, x]);
                b.ret_val(result);
            });
        });
        let mut actions = ActionMap::new();
        actions.record(InstrSite::new(0, 2), BuilderAction::Delete);
        apply_actions(&mut ssa, &actions, &[]);

        let block = ssa.block(0).expect("entry block");
        assert_eq!(
            block.terminator().map(SsaInstruction::op),
            Some(&SsaOp::Return {
                value: Some(builder)
            })
        );
    }

    #[test]
    fn test_used_allocation_is_kept() {
        let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let v = b.new_obj(&sb());
                b.ret_val(v);
            });
        });
        let mut actions = ActionMap::new();
        actions.record(InstrSite::new(0, 0), BuilderAction::Delete);
        let summary = apply_actions(&mut ssa, &actions, &[]);

        assert_eq!(summary.count(EventKind::BuilderRemoved), 0);
        assert!(matches!(
            ssa.block(0).and_then(|b| b.instruction(0)).map(SsaInstruction::op),
            Some(SsaOp::NewObj { .. })
        ));
    }
}
