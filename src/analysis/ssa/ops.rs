//! Decomposed SSA operations.
//!
//! This module defines `SsaOp`, the operation representation used by every
//! analysis and pass in the crate. Each operation has the form
//! `result = op(operands)` with all data dependencies explicit.
//!
//! # Operation Categories
//!
//! - **Values**: Arguments, constants, assumptions, casts
//! - **Objects**: Allocation (constructors are separate calls)
//! - **Calls**: Static and virtual method invocations
//! - **Memory**: Instance and static field access
//! - **Comparison**: Reference and value equality
//! - **Control flow**: Jumps, branches, returns, throws
//!
//! # Field Documentation
//!
//! - `dest`: The destination SSA variable for the operation result
//! - `object`: The object instance for field operations
//! - `value`: A value being stored, returned or assumed
//! - `args`: Call arguments; the receiver comes first for instance methods
//! - `target`, `true_target`, `false_target`: Branch targets (block indices)

#![allow(missing_docs)]

use std::fmt;

use super::types::{FieldRef, MethodRef, TypeRef};
use super::value::ConstValue;
use super::SsaVarId;

/// A decomposed SSA operation.
///
/// # Conventions
///
/// - For operations that produce a result, `dest` names it
/// - Optional results use `Option<SsaVarId>` (calls returning `void`)
/// - Allocation and initialization are separate: `NewObj` yields an
///   uninitialized instance that a later constructor call initializes
#[derive(Debug, Clone, PartialEq)]
pub enum SsaOp {
    // ========================================================================
    // Values
    // ========================================================================
    /// Method argument: `dest = arg[index]`.
    ///
    /// Emitted at the start of the entry block, one per parameter.
    Argument { dest: SsaVarId, index: u16 },

    /// Load a constant value: `dest = const value`.
    Const { dest: SsaVarId, value: ConstValue },

    /// Non-null assumption on a value: `dest = assume value`.
    ///
    /// The result is the same object as `value`.
    Assume { dest: SsaVarId, value: SsaVarId },

    /// Checked cast: `dest = (class) object`. The result aliases `object`.
    CastClass {
        dest: SsaVarId,
        object: SsaVarId,
        class: TypeRef,
    },

    // ========================================================================
    // Objects
    // ========================================================================
    /// Allocate an uninitialized instance: `dest = new class`.
    NewObj { dest: SsaVarId, class: TypeRef },

    // ========================================================================
    // Calls
    // ========================================================================
    /// Non-virtual call (static methods and constructors).
    Call {
        dest: Option<SsaVarId>,
        method: MethodRef,
        args: Vec<SsaVarId>,
    },

    /// Virtual call; `args[0]` is the receiver.
    CallVirt {
        dest: Option<SsaVarId>,
        method: MethodRef,
        args: Vec<SsaVarId>,
    },

    // ========================================================================
    // Memory
    // ========================================================================
    /// Load instance field: `dest = object.field`
    LoadField {
        dest: SsaVarId,
        object: SsaVarId,
        field: FieldRef,
    },

    /// Store instance field: `object.field = value`
    StoreField {
        object: SsaVarId,
        field: FieldRef,
        value: SsaVarId,
    },

    /// Load static field: `dest = field`
    LoadStaticField { dest: SsaVarId, field: FieldRef },

    /// Store static field: `field = value`
    StoreStaticField { field: FieldRef, value: SsaVarId },

    // ========================================================================
    // Comparison
    // ========================================================================
    /// Equality: `dest = left == right` (reference identity for objects)
    Ceq {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    // ========================================================================
    // Control Flow
    // ========================================================================
    /// Unconditional jump
    Jump { target: usize },

    /// Conditional branch: `if condition goto true_target else goto false_target`
    Branch {
        condition: SsaVarId,
        true_target: usize,
        false_target: usize,
    },

    /// Return from method
    Return { value: Option<SsaVarId> },

    /// Throw exception
    Throw { exception: SsaVarId },

    // ========================================================================
    // Misc
    // ========================================================================
    /// No operation
    Nop,
}

impl SsaOp {
    /// Returns the destination variable if this operation produces one.
    #[must_use]
    pub fn dest(&self) -> Option<SsaVarId> {
        match self {
            Self::Argument { dest, .. }
            | Self::Const { dest, .. }
            | Self::Assume { dest, .. }
            | Self::CastClass { dest, .. }
            | Self::NewObj { dest, .. }
            | Self::LoadField { dest, .. }
            | Self::LoadStaticField { dest, .. }
            | Self::Ceq { dest, .. } => Some(*dest),

            Self::Call { dest, .. } | Self::CallVirt { dest, .. } => *dest,

            Self::StoreField { .. }
            | Self::StoreStaticField { .. }
            | Self::Jump { .. }
            | Self::Branch { .. }
            | Self::Return { .. }
            | Self::Throw { .. }
            | Self::Nop => None,
        }
    }

    /// Sets the destination variable.
    ///
    /// Has no effect on operations that cannot produce a result. Setting `None`
    /// is only meaningful for calls, whose result may be dropped.
    pub fn set_dest(&mut self, new_dest: Option<SsaVarId>) {
        match self {
            Self::Call { dest, .. } | Self::CallVirt { dest, .. } => *dest = new_dest,
            Self::Argument { dest, .. }
            | Self::Const { dest, .. }
            | Self::Assume { dest, .. }
            | Self::CastClass { dest, .. }
            | Self::NewObj { dest, .. }
            | Self::LoadField { dest, .. }
            | Self::LoadStaticField { dest, .. }
            | Self::Ceq { dest, .. } => {
                if let Some(new_dest) = new_dest {
                    *dest = new_dest;
                }
            }
            _ => {}
        }
    }

    /// Returns all variables used by this operation, in operand order.
    #[must_use]
    pub fn uses(&self) -> Vec<SsaVarId> {
        match self {
            Self::Argument { .. }
            | Self::Const { .. }
            | Self::NewObj { .. }
            | Self::LoadStaticField { .. }
            | Self::Jump { .. }
            | Self::Nop => vec![],

            Self::Assume { value, .. } | Self::StoreStaticField { value, .. } => vec![*value],
            Self::CastClass { object, .. } | Self::LoadField { object, .. } => vec![*object],
            Self::StoreField { object, value, .. } => vec![*object, *value],

            Self::Call { args, .. } | Self::CallVirt { args, .. } => args.clone(),

            Self::Ceq { left, right, .. } => vec![*left, *right],

            Self::Branch { condition, .. } => vec![*condition],
            Self::Return { value } => value.iter().copied().collect(),
            Self::Throw { exception } => vec![*exception],
        }
    }

    /// Replaces every use of `old` with `new`.
    ///
    /// Returns the number of operands rewritten.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        let mut count = 0;
        let mut swap = |var: &mut SsaVarId| {
            if *var == old {
                *var = new;
                count += 1;
            }
        };

        match self {
            Self::Assume { value, .. } | Self::StoreStaticField { value, .. } => swap(value),
            Self::CastClass { object, .. } | Self::LoadField { object, .. } => swap(object),
            Self::StoreField { object, value, .. } => {
                swap(object);
                swap(value);
            }
            Self::Call { args, .. } | Self::CallVirt { args, .. } => {
                for arg in args.iter_mut() {
                    swap(arg);
                }
            }
            Self::Ceq { left, right, .. } => {
                swap(left);
                swap(right);
            }
            Self::Branch { condition, .. } => swap(condition),
            Self::Return { value: Some(value) } => swap(value),
            Self::Throw { exception } => swap(exception),
            Self::Argument { .. }
            | Self::Const { .. }
            | Self::NewObj { .. }
            | Self::LoadStaticField { .. }
            | Self::Jump { .. }
            | Self::Return { value: None }
            | Self::Nop => {}
        }

        count
    }

    /// Returns `true` if this operation is a terminator (ends a basic block).
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. } | Self::Branch { .. } | Self::Return { .. } | Self::Throw { .. }
        )
    }

    /// Returns `true` if this operation may throw an exception.
    ///
    /// String constants count as throwing: resolving a string literal can fail
    /// at runtime on some targets.
    #[must_use]
    pub const fn may_throw(&self) -> bool {
        matches!(
            self,
            Self::Const {
                value: ConstValue::String(_),
                ..
            } | Self::CastClass { .. }
                | Self::NewObj { .. }
                | Self::Call { .. }
                | Self::CallVirt { .. }
                | Self::LoadField { .. }
                | Self::StoreField { .. }
                | Self::LoadStaticField { .. }
                | Self::StoreStaticField { .. }
                | Self::Throw { .. }
        )
    }

    /// Returns `true` if this operation has no side effects.
    #[must_use]
    pub const fn is_pure(&self) -> bool {
        matches!(
            self,
            Self::Const { .. } | Self::Assume { .. } | Self::Ceq { .. } | Self::Nop
        )
    }

    /// Returns the control flow successors named by a terminator.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        match self {
            Self::Jump { target } => vec![*target],
            Self::Branch {
                true_target,
                false_target,
                ..
            } => {
                if true_target == false_target {
                    vec![*true_target]
                } else {
                    vec![*true_target, *false_target]
                }
            }
            _ => vec![],
        }
    }

    /// Returns the invoked method and arguments for call operations.
    #[must_use]
    pub fn as_invoke(&self) -> Option<(&MethodRef, &[SsaVarId])> {
        match self {
            Self::Call { method, args, .. } | Self::CallVirt { method, args, .. } => {
                Some((method, args))
            }
            _ => None,
        }
    }

    /// Returns `true` for call operations.
    #[must_use]
    pub const fn is_invoke(&self) -> bool {
        matches!(self, Self::Call { .. } | Self::CallVirt { .. })
    }
}

fn fmt_args(f: &mut fmt::Formatter<'_>, args: &[SsaVarId]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for SsaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument { dest, index } => write!(f, "{dest} = arg {index}"),
            Self::Const { dest, value } => write!(f, "{dest} = {value}"),
            Self::Assume { dest, value } => write!(f, "{dest} = assume {value}"),
            Self::CastClass {
                dest,
                object,
                class,
            } => write!(f, "{dest} = ({class}) {object}"),
            Self::NewObj { dest, class } => write!(f, "{dest} = new {class}"),
            Self::Call { dest, method, args } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "call {method}(")?;
                fmt_args(f, args)?;
                write!(f, ")")
            }
            Self::CallVirt { dest, method, args } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "callvirt {method}(")?;
                fmt_args(f, args)?;
                write!(f, ")")
            }
            Self::LoadField {
                dest,
                object,
                field,
            } => write!(f, "{dest} = {object}.{}", field.name),
            Self::StoreField {
                object,
                field,
                value,
            } => write!(f, "{object}.{} = {value}", field.name),
            Self::LoadStaticField { dest, field } => write!(f, "{dest} = {field}"),
            Self::StoreStaticField { field, value } => write!(f, "{field} = {value}"),
            Self::Ceq { dest, left, right } => write!(f, "{dest} = {left} == {right}"),
            Self::Jump { target } => write!(f, "goto B{target}"),
            Self::Branch {
                condition,
                true_target,
                false_target,
            } => write!(f, "if {condition} goto B{true_target} else B{false_target}"),
            Self::Return { value: Some(value) } => write!(f, "return {value}"),
            Self::Return { value: None } => write!(f, "return"),
            Self::Throw { exception } => write!(f, "throw {exception}"),
            Self::Nop => write!(f, "nop"),
        }
    }
}
