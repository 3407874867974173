//! Builder pattern for programmatic SSA construction.
//!
//! This module provides a fluent API for building SSA functions without the
//! boilerplate of manual block/variable ID management. It's useful for:
//!
//! - Writing unit tests for optimization passes
//! - Creating fixtures for benchmarks
//! - Constructing functions from a front end that already knows its blocks
//!
//! # Design
//!
//! The builder uses a closure-based API where all blocks are defined within
//! a single expression, making the CFG structure visually clear:
//!
//! ```rust
//! use builderfold::analysis::ssa::{SsaFunctionBuilder, SsaType};
//!
//! let ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
//!     let cond = f.arg(0);
//!
//!     f.block(0, |b| b.branch(cond, 1, 2));
//!     f.block(1, |b| b.jump(3));
//!     f.block(2, |b| b.jump(3));
//!     f.block(3, |b| b.ret());
//! });
//! assert_eq!(ssa.block_count(), 4);
//! ```
//!
//! # Variable Management
//!
//! Operations that produce values allocate their destination and return its
//! `SsaVarId`. Argument variables are allocated up front and defined by
//! `Argument` operations that the builder places at the top of block 0.
//!
//! Loop-carried phis need a result before the loop body exists; reserve one
//! with [`SsaFunctionContext::var`] and define it with [`SsaBlockBuilder::phi_to`].
//! Blocks may be defined in any order.

use std::collections::BTreeMap;

use crate::analysis::ssa::{
    ConstValue, FieldRef, MethodRef, PhiNode, PhiOperand, SsaBlock, SsaFunction, SsaInstruction,
    SsaOp, SsaType, SsaVarId, SsaVariable, TypeRef, VariableOrigin,
};

/// Builder for constructing SSA functions programmatically.
///
/// # Examples
///
/// ```rust
/// use builderfold::analysis::ssa::{SsaFunctionBuilder, SsaType};
///
/// let ssa = SsaFunctionBuilder::with_params(&[SsaType::string()]).build_with(|f| {
///     let s = f.arg(0);
///     f.block(0, |b| b.ret_val(s));
/// });
/// assert_eq!(ssa.num_args(), 1);
/// ```
#[derive(Debug)]
pub struct SsaFunctionBuilder {
    function: SsaFunction,
    next_stack_slot: u32,
    arg_vars: Vec<SsaVarId>,
    blocks: BTreeMap<usize, SsaBlock>,
}

impl SsaFunctionBuilder {
    /// Creates a new builder for a function with `num_args` untyped arguments.
    #[must_use]
    pub fn new(num_args: usize) -> Self {
        Self::with_params(&vec![SsaType::Unknown; num_args])
    }

    /// Creates a new builder for a function with typed arguments.
    #[must_use]
    pub fn with_params(params: &[SsaType]) -> Self {
        let mut builder = Self {
            function: SsaFunction::new(params.len()),
            next_stack_slot: 0,
            arg_vars: Vec::with_capacity(params.len()),
            blocks: BTreeMap::new(),
        };

        for (i, ty) in params.iter().enumerate() {
            // Argument indices are bounded by method signature limits
            #[allow(clippy::cast_possible_truncation)]
            let idx = i as u16;
            let id = builder
                .function
                .new_variable(VariableOrigin::Argument(idx), ty.clone());
            builder.arg_vars.push(id);
        }

        builder
    }

    fn alloc_stack_var(&mut self, var_type: SsaType) -> SsaVarId {
        let slot = self.next_stack_slot;
        self.next_stack_slot += 1;
        self.function
            .new_variable(VariableOrigin::Stack(slot), var_type)
    }

    /// Builds the SSA function using a closure that defines all blocks.
    ///
    /// Gaps in the block numbering are filled with empty blocks.
    pub fn build_with<F>(mut self, f: F) -> SsaFunction
    where
        F: FnOnce(&mut SsaFunctionContext<'_>),
    {
        let mut ctx = SsaFunctionContext { builder: &mut self };
        f(&mut ctx);
        self.build()
    }

    fn build(self) -> SsaFunction {
        let Self {
            mut function,
            arg_vars,
            mut blocks,
            ..
        } = self;

        let entry = blocks.entry(0).or_insert_with(|| SsaBlock::new(0));
        for (i, &dest) in arg_vars.iter().enumerate().rev() {
            #[allow(clippy::cast_possible_truncation)]
            let index = i as u16;
            entry
                .instructions_mut()
                .insert(0, SsaInstruction::new(SsaOp::Argument { dest, index }));
        }

        let max_block = blocks.keys().next_back().copied().unwrap_or(0);
        for id in 0..=max_block {
            function.add_block(blocks.remove(&id).unwrap_or_else(|| SsaBlock::new(id)));
        }

        function
    }
}

/// Context passed to the build closure for defining blocks.
pub struct SsaFunctionContext<'a> {
    builder: &'a mut SsaFunctionBuilder,
}

impl SsaFunctionContext<'_> {
    /// Gets the argument variable at the specified index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= num_args`.
    #[must_use]
    pub fn arg(&self, index: usize) -> SsaVarId {
        self.builder.arg_vars[index]
    }

    /// Reserves a fresh variable for later definition.
    #[must_use]
    pub fn var(&mut self, var_type: SsaType) -> SsaVarId {
        self.builder.alloc_stack_var(var_type)
    }

    /// Defines a block with the given ID using a closure.
    pub fn block<F>(&mut self, id: usize, f: F)
    where
        F: FnOnce(&mut SsaBlockBuilder<'_>),
    {
        let mut block = SsaBlock::new(id);
        let mut block_builder = SsaBlockBuilder {
            builder: self.builder,
            block: &mut block,
        };

        f(&mut block_builder);

        self.builder.blocks.insert(id, block);
    }
}

/// Builder for constructing individual SSA blocks.
///
/// Operations that produce values return the allocated `SsaVarId`.
pub struct SsaBlockBuilder<'a> {
    builder: &'a mut SsaFunctionBuilder,
    block: &'a mut SsaBlock,
}

impl SsaBlockBuilder<'_> {
    fn push(&mut self, op: SsaOp) {
        self.block.add_instruction(SsaInstruction::new(op));
    }

    /// Adds: dest = const value
    #[must_use]
    pub fn const_val(&mut self, value: ConstValue) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(value.ssa_type());
        self.push(SsaOp::Const { dest, value });
        dest
    }

    /// Adds: dest = "value"
    #[must_use]
    pub fn const_str(&mut self, value: &str) -> SsaVarId {
        self.const_val(ConstValue::String(value.to_string()))
    }

    /// Adds: dest = const i32
    #[must_use]
    pub fn const_i32(&mut self, value: i32) -> SsaVarId {
        self.const_val(ConstValue::I32(value))
    }

    /// Adds: dest = const char
    #[must_use]
    pub fn const_char(&mut self, value: char) -> SsaVarId {
        self.const_val(ConstValue::Char(value))
    }

    /// Adds: dest = const bool
    #[must_use]
    pub fn const_bool(&mut self, value: bool) -> SsaVarId {
        self.const_val(ConstValue::Bool(value))
    }

    /// Adds: dest = null
    #[must_use]
    pub fn const_null(&mut self) -> SsaVarId {
        self.const_val(ConstValue::Null)
    }

    /// Adds: dest = new class
    #[must_use]
    pub fn new_obj(&mut self, class: &TypeRef) -> SsaVarId {
        let dest = self
            .builder
            .alloc_stack_var(SsaType::Object(class.clone()));
        self.push(SsaOp::NewObj {
            dest,
            class: class.clone(),
        });
        dest
    }

    /// Adds: dest = assume value
    #[must_use]
    pub fn assume(&mut self, value: SsaVarId) -> SsaVarId {
        let ty = self.builder.function.var_type(value).clone();
        let dest = self.builder.alloc_stack_var(ty);
        self.push(SsaOp::Assume { dest, value });
        dest
    }

    /// Adds: dest = (class) object
    #[must_use]
    pub fn cast(&mut self, object: SsaVarId, class: &TypeRef) -> SsaVarId {
        let dest = self
            .builder
            .alloc_stack_var(SsaType::Object(class.clone()));
        self.push(SsaOp::CastClass {
            dest,
            object,
            class: class.clone(),
        });
        dest
    }

    /// Adds: call method with return value
    #[must_use]
    pub fn call(&mut self, method: MethodRef, args: &[SsaVarId]) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(method.returns.clone());
        self.push(SsaOp::Call {
            dest: Some(dest),
            method,
            args: args.to_vec(),
        });
        dest
    }

    /// Adds: call method without using its result
    pub fn call_void(&mut self, method: MethodRef, args: &[SsaVarId]) {
        self.push(SsaOp::Call {
            dest: None,
            method,
            args: args.to_vec(),
        });
    }

    /// Adds: callvirt method with return value
    #[must_use]
    pub fn callvirt(&mut self, method: MethodRef, args: &[SsaVarId]) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(method.returns.clone());
        self.push(SsaOp::CallVirt {
            dest: Some(dest),
            method,
            args: args.to_vec(),
        });
        dest
    }

    /// Adds: callvirt method without using its result
    pub fn callvirt_void(&mut self, method: MethodRef, args: &[SsaVarId]) {
        self.push(SsaOp::CallVirt {
            dest: None,
            method,
            args: args.to_vec(),
        });
    }

    /// Adds: dest = object.field
    #[must_use]
    pub fn load_field(&mut self, object: SsaVarId, field: FieldRef) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(field.field_type.clone());
        self.push(SsaOp::LoadField {
            dest,
            object,
            field,
        });
        dest
    }

    /// Adds: object.field = value
    pub fn store_field(&mut self, object: SsaVarId, field: FieldRef, value: SsaVarId) {
        self.push(SsaOp::StoreField {
            object,
            field,
            value,
        });
    }

    /// Adds: dest = static field
    #[must_use]
    pub fn load_static(&mut self, field: FieldRef) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(field.field_type.clone());
        self.push(SsaOp::LoadStaticField { dest, field });
        dest
    }

    /// Adds: static field = value
    pub fn store_static(&mut self, field: FieldRef, value: SsaVarId) {
        self.push(SsaOp::StoreStaticField { field, value });
    }

    /// Adds: dest = left == right
    #[must_use]
    pub fn ceq(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        let dest = self.builder.alloc_stack_var(SsaType::Bool);
        self.push(SsaOp::Ceq { dest, left, right });
        dest
    }

    /// Adds a phi node and returns the result variable.
    ///
    /// # Arguments
    ///
    /// * `operands` - Pairs of (predecessor_block_id, value) for each incoming edge
    #[must_use]
    pub fn phi(&mut self, operands: &[(usize, SsaVarId)]) -> SsaVarId {
        let ty = operands
            .first()
            .map(|&(_, v)| self.builder.function.var_type(v).clone())
            .unwrap_or_default();
        let result = self.builder.alloc_stack_var(ty);
        self.phi_to(result, operands);
        result
    }

    /// Adds a phi node defining a variable reserved with [`SsaFunctionContext::var`].
    pub fn phi_to(&mut self, result: SsaVarId, operands: &[(usize, SsaVarId)]) {
        let mut phi = PhiNode::new(result);
        for &(pred, val) in operands {
            phi.add_operand(PhiOperand::new(val, pred));
        }
        if let Some(var) = self.builder.function.variable_mut(result) {
            let ty = var.var_type().clone();
            *var = SsaVariable::new(result, VariableOrigin::Phi, ty);
        }
        self.block.add_phi(phi);
    }

    /// Registers `handler` as an exception handler protecting this block.
    pub fn handler(&mut self, handler: usize) {
        self.block.add_handler(handler);
    }

    /// Adds: goto target
    pub fn jump(&mut self, target: usize) {
        self.push(SsaOp::Jump { target });
    }

    /// Adds: if condition goto true_target else goto false_target
    pub fn branch(&mut self, condition: SsaVarId, true_target: usize, false_target: usize) {
        self.push(SsaOp::Branch {
            condition,
            true_target,
            false_target,
        });
    }

    /// Adds: return
    pub fn ret(&mut self) {
        self.push(SsaOp::Return { value: None });
    }

    /// Adds: return value
    pub fn ret_val(&mut self, value: SsaVarId) {
        self.push(SsaOp::Return { value: Some(value) });
    }

    /// Adds: throw exception
    pub fn throw(&mut self, exception: SsaVarId) {
        self.push(SsaOp::Throw { exception });
    }

    /// Adds a raw SsaOp (for cases not covered by helpers).
    pub fn op(&mut self, op: SsaOp) {
        self.push(op);
    }

    /// Adds a nop instruction.
    pub fn nop(&mut self) {
        self.push(SsaOp::Nop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_lead_entry_block() {
        let ssa = SsaFunctionBuilder::with_params(&[SsaType::I32, SsaType::string()])
            .build_with(|f| {
                let a = f.arg(1);
                f.block(0, |b| b.ret_val(a));
            });

        let block = ssa.block(0).expect("entry block");
        assert_eq!(block.instructions().len(), 3);
        assert!(matches!(
            block.instructions()[0].op(),
            SsaOp::Argument { index: 0, .. }
        ));
        assert!(matches!(
            block.instructions()[1].op(),
            SsaOp::Argument { index: 1, .. }
        ));
        assert!(ssa.var_type(ssa.variables()[1].id()).is_string());
        assert!(ssa.verify().is_ok());
    }

    #[test]
    fn test_diamond_control_flow() {
        let ssa = SsaFunctionBuilder::new(1).build_with(|f| {
            let cond = f.arg(0);
            let (mut v_then, mut v_else) = (SsaVarId::new(0), SsaVarId::new(0));

            f.block(0, |b| b.branch(cond, 1, 2));
            f.block(1, |b| {
                v_then = b.const_i32(1);
                b.jump(3);
            });
            f.block(2, |b| {
                v_else = b.const_i32(0);
                b.jump(3);
            });
            f.block(3, |b| {
                let result = b.phi(&[(1, v_then), (2, v_else)]);
                b.ret_val(result);
            });
        });

        assert_eq!(ssa.block_count(), 4);
        assert_eq!(ssa.total_phi_count(), 1);
        assert!(ssa.verify().is_ok());
    }

    #[test]
    fn test_loop_with_reserved_phi() {
        let ssa = SsaFunctionBuilder::new(1).build_with(|f| {
            let cond = f.arg(0);
            let counter = f.var(SsaType::I32);
            let mut init = SsaVarId::new(0);
            let mut next = SsaVarId::new(0);

            f.block(0, |b| {
                init = b.const_i32(0);
                b.jump(1);
            });
            f.block(2, |b| {
                next = b.const_i32(1);
                b.jump(1);
            });
            f.block(1, |b| {
                b.phi_to(counter, &[(0, init), (2, next)]);
                b.branch(cond, 2, 3);
            });
            f.block(3, |b| b.ret_val(counter));
        });

        assert_eq!(ssa.block_count(), 4);
        let phi_block = ssa.block(1).expect("loop header");
        assert_eq!(phi_block.phi_nodes()[0].result(), ssa.variables()[1].id());
        assert!(ssa.variables()[1].origin().is_phi());
        assert!(ssa.verify().is_ok());
    }

    #[test]
    fn test_gap_filled() {
        let ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| b.jump(2));
            f.block(2, |b| b.ret());
        });
        assert_eq!(ssa.block_count(), 3);
        assert!(ssa.block(1).is_some_and(|b| b.instructions().is_empty()));
    }
}
