//! Classification of builder operations.
//!
//! Every piece of knowledge about the `StringBuilder`/`StringBuffer` API lives
//! here: which calls construct, initialize, append to, materialize or merely
//! inspect a builder, what content a constant argument renders to, and
//! whether a call could be told apart from the rewrite that replaces it.
//!
//! The rest of the pass only asks [`BuilderOracle`] questions, so a host with
//! a different library model can plug in its own classifier.

use rustc_hash::FxHashSet;

use crate::analysis::{
    ssa::{ConstValue, MethodRef, SsaType, TypeRef},
    DefUseIndex, SsaFunction, SsaOp, SsaVarId,
};

/// The two interchangeable builder classes. `StringBuffer` is the synchronized one.
pub const BUILDER_CLASSES: [&str; 2] = ["StringBuilder", "StringBuffer"];

/// Read-only builder queries. Calls to these never change content.
const INSPECTING_METHODS: &[&str] = &[
    "capacity",
    "length",
    "charAt",
    "codePointAt",
    "codePointBefore",
    "codePointCount",
    "indexOf",
    "lastIndexOf",
    "substring",
    "subSequence",
    "getChars",
    "hashCode",
    "equals",
    "compareTo",
];

/// Upper bound on `assume` chains followed when resolving a constant.
const MAX_ALIAS_DEPTH: usize = 16;

/// Predicates over builder operations.
///
/// Implementations must be stateless (or at least immutable): the oracle is
/// shared between methods optimized in parallel.
pub trait BuilderOracle: Send + Sync {
    /// Returns `true` if values of `ty` are builders.
    fn is_builder_type(&self, ty: &SsaType) -> bool;

    /// Returns `true` for an allocation of a builder class.
    fn is_construct(&self, op: &SsaOp) -> bool;

    /// Returns `true` for a builder constructor call.
    fn is_init(&self, op: &SsaOp) -> bool;

    /// Returns `true` for the builder constructor taking a `String`.
    fn is_string_constructor(&self, op: &SsaOp) -> bool;

    /// Returns `true` for a single-argument `append` on a builder.
    fn is_append(&self, op: &SsaOp) -> bool;

    /// Returns `true` for the `append(String)` overload.
    fn is_append_string(&self, op: &SsaOp) -> bool;

    /// Returns `true` if `op` materializes the content of `receiver` as a string.
    fn is_materialize(&self, op: &SsaOp, receiver: SsaVarId) -> bool;

    /// Returns `true` for capacity/length inspection and other read-only queries.
    fn is_capacity_inspection(&self, op: &SsaOp) -> bool;

    /// Returns `true` if the graph builder models `op` as a builder operation.
    ///
    /// `is_live` tells whether a value is a tracked builder at this point.
    fn is_modeled_instruction(&self, op: &SsaOp, is_live: &dyn Fn(SsaVarId) -> bool) -> bool;

    /// Returns `true` if `op` could mutate an escaped builder.
    fn can_mutate(&self, op: &SsaOp) -> bool {
        op.is_invoke()
    }

    /// Returns the content an init/append adds, if it is a compile-time constant.
    fn known_constant_argument(&self, op: &SsaOp, index: &DefUseIndex) -> Option<String>;

    /// Returns `true` if executing `op` could be distinguished from dropping it
    /// or replacing it by a constant, e.g. because it calls an arbitrary
    /// `toString` or may throw.
    fn can_observe_call(&self, op: &SsaOp, ssa: &SsaFunction, index: &DefUseIndex) -> bool;

    /// Returns `true` for a constructor call with no observable effect.
    fn is_constructor_side_effect_free(
        &self,
        op: &SsaOp,
        ssa: &SsaFunction,
        index: &DefUseIndex,
    ) -> bool {
        self.is_init(op) && !self.can_observe_call(op, ssa, index)
    }

    /// Returns `true` if `value` can never be `null`.
    fn is_never_null(&self, value: SsaVarId, index: &DefUseIndex) -> bool;

    /// Returns `true` if the identity of the string `value` is observed, by a
    /// reference comparison or by interning.
    fn is_identity_sensitive(&self, value: SsaVarId, ssa: &SsaFunction, index: &DefUseIndex)
        -> bool;
}

/// Classifier for the standard `StringBuilder`/`StringBuffer` API.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBuilderOracle;

impl DefaultBuilderOracle {
    /// Creates the default classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn is_builder_class(class: &TypeRef) -> bool {
        BUILDER_CLASSES.iter().any(|name| class.is(name))
    }

    /// Returns the method and arguments of an instance call on a builder class.
    fn builder_invoke(op: &SsaOp) -> Option<(&MethodRef, &[SsaVarId])> {
        let (method, args) = op.as_invoke()?;
        (!method.is_static && Self::is_builder_class(&method.holder) && !args.is_empty())
            .then_some((method, args))
    }

    fn is_value_of_object(method: &MethodRef) -> bool {
        method.is_static
            && method.is("String", "valueOf")
            && method.params.len() == 1
            && method.params[0].is_class("Object")
    }

    /// Follows `assume` chains to the constant defining `value`.
    fn constant_of(value: SsaVarId, index: &DefUseIndex) -> Option<&ConstValue> {
        let mut current = value;
        for _ in 0..MAX_ALIAS_DEPTH {
            match index.def_op(current)? {
                SsaOp::Const { value, .. } => return Some(value),
                SsaOp::Assume { value, .. } => current = *value,
                _ => return None,
            }
        }
        None
    }

    fn is_null_constant(value: SsaVarId, index: &DefUseIndex) -> bool {
        Self::constant_of(value, index).is_some_and(ConstValue::is_null)
    }

    /// Renders a constant the way the overload taking `param` would.
    fn render(param: &SsaType, value: &ConstValue) -> Option<String> {
        match (param, value) {
            (SsaType::Object(class), ConstValue::String(s))
                if class.is("String") || class.is("CharSequence") || class.is("Object") =>
            {
                Some(s.clone())
            }
            (SsaType::Object(class), ConstValue::Null)
                if class.is("String") || class.is("CharSequence") || class.is("Object") =>
            {
                Some("null".to_string())
            }
            (SsaType::Char, ConstValue::Char(c)) => Some(c.to_string()),
            (SsaType::Char, ConstValue::I32(v)) => u32::try_from(*v)
                .ok()
                .and_then(char::from_u32)
                .map(String::from),
            (SsaType::I32 | SsaType::I64, ConstValue::I32(_) | ConstValue::I64(_)) => {
                value.as_i64().map(|v| v.to_string())
            }
            (SsaType::Bool, ConstValue::Bool(b)) => Some(b.to_string()),
            (SsaType::Bool, ConstValue::I32(0)) => Some("false".to_string()),
            (SsaType::Bool, ConstValue::I32(1)) => Some("true".to_string()),
            _ => None,
        }
    }

    fn is_identity_sensitive_from(
        value: SsaVarId,
        ssa: &SsaFunction,
        index: &DefUseIndex,
        visited: &mut FxHashSet<SsaVarId>,
    ) -> bool {
        if !visited.insert(value) {
            return false;
        }
        for site in index.uses_of(value) {
            let Some(block) = ssa.block(site.block) else {
                continue;
            };
            if site.is_phi_operand {
                let Some(phi) = block.phi_nodes().get(site.instruction) else {
                    continue;
                };
                if Self::is_identity_sensitive_from(phi.result(), ssa, index, visited) {
                    return true;
                }
                continue;
            }
            let Some(instr) = block.instruction(site.instruction) else {
                continue;
            };
            match instr.op() {
                SsaOp::Ceq { .. } => return true,
                SsaOp::Call { method, .. } | SsaOp::CallVirt { method, .. }
                    if method.is("String", "intern") =>
                {
                    return true;
                }
                SsaOp::Assume { dest, .. } | SsaOp::CastClass { dest, .. } => {
                    if Self::is_identity_sensitive_from(*dest, ssa, index, visited) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }
}

impl BuilderOracle for DefaultBuilderOracle {
    fn is_builder_type(&self, ty: &SsaType) -> bool {
        ty.class_ref().is_some_and(Self::is_builder_class)
    }

    fn is_construct(&self, op: &SsaOp) -> bool {
        matches!(op, SsaOp::NewObj { class, .. } if Self::is_builder_class(class))
    }

    fn is_init(&self, op: &SsaOp) -> bool {
        matches!(op, SsaOp::Call { .. })
            && Self::builder_invoke(op).is_some_and(|(method, args)| {
                method.is_constructor() && method.params.len() <= 1 && args.len() == method.arity()
            })
    }

    fn is_string_constructor(&self, op: &SsaOp) -> bool {
        self.is_init(op)
            && Self::builder_invoke(op)
                .is_some_and(|(method, _)| method.params.len() == 1 && method.params[0].is_string())
    }

    fn is_append(&self, op: &SsaOp) -> bool {
        matches!(op, SsaOp::CallVirt { .. })
            && Self::builder_invoke(op).is_some_and(|(method, args)| {
                &*method.name == "append" && method.params.len() == 1 && args.len() == 2
            })
    }

    fn is_append_string(&self, op: &SsaOp) -> bool {
        self.is_append(op)
            && Self::builder_invoke(op).is_some_and(|(method, _)| method.params[0].is_string())
    }

    fn is_materialize(&self, op: &SsaOp, receiver: SsaVarId) -> bool {
        match op {
            SsaOp::CallVirt { method, args, .. } => {
                Self::is_builder_class(&method.holder)
                    && &*method.name == "toString"
                    && method.params.is_empty()
                    && args.first() == Some(&receiver)
            }
            SsaOp::Call { method, args, .. } => {
                Self::is_value_of_object(method) && args.first() == Some(&receiver)
            }
            _ => false,
        }
    }

    fn is_capacity_inspection(&self, op: &SsaOp) -> bool {
        Self::builder_invoke(op)
            .is_some_and(|(method, _)| INSPECTING_METHODS.contains(&&*method.name))
    }

    fn is_modeled_instruction(&self, op: &SsaOp, is_live: &dyn Fn(SsaVarId) -> bool) -> bool {
        match op {
            SsaOp::NewObj { class, .. } => Self::is_builder_class(class),
            SsaOp::Call { method, args, .. } | SsaOp::CallVirt { method, args, .. } => {
                if method.is_static {
                    Self::is_value_of_object(method) && args.len() == 1 && is_live(args[0])
                } else {
                    Self::is_builder_class(&method.holder)
                        && args.first().is_some_and(|receiver| is_live(*receiver))
                }
            }
            _ => false,
        }
    }

    fn known_constant_argument(&self, op: &SsaOp, index: &DefUseIndex) -> Option<String> {
        let (method, args) = Self::builder_invoke(op)?;
        if self.is_init(op) {
            return match method.params.first() {
                None => Some(String::new()),
                Some(SsaType::I32) => {
                    let capacity = Self::constant_of(*args.get(1)?, index)?.as_i64()?;
                    (capacity >= 0).then(String::new)
                }
                Some(param) if param.is_string() || param.is_class("CharSequence") => {
                    match Self::constant_of(*args.get(1)?, index)? {
                        ConstValue::String(s) => Some(s.clone()),
                        _ => None,
                    }
                }
                Some(_) => None,
            };
        }
        if self.is_append(op) {
            let value = Self::constant_of(args[1], index)?;
            return Self::render(&method.params[0], value);
        }
        None
    }

    fn can_observe_call(&self, op: &SsaOp, ssa: &SsaFunction, index: &DefUseIndex) -> bool {
        let Some((method, args)) = Self::builder_invoke(op) else {
            return true;
        };
        if self.is_append(op) {
            let param = &method.params[0];
            let arg = args[1];
            if param.is_string() || param.is_primitive() {
                return false;
            }
            if param.is_class("Object") || param.is_class("CharSequence") {
                let arg_type = ssa.var_type(arg);
                // Strings, null and builders have side-effect free `toString`
                return !(arg_type.is_string()
                    || Self::is_null_constant(arg, index)
                    || self.is_builder_type(arg_type));
            }
            return true;
        }
        if self.is_init(op) {
            return match method.params.first() {
                None => false,
                Some(SsaType::I32) => !args.get(1).is_some_and(|capacity| {
                    Self::constant_of(*capacity, index)
                        .and_then(ConstValue::as_i64)
                        .is_some_and(|v| v >= 0)
                }),
                Some(param) if param.is_string() => {
                    !args.get(1).is_some_and(|arg| self.is_never_null(*arg, index))
                }
                Some(param) if param.is_class("CharSequence") => {
                    !args.get(1).is_some_and(|arg| {
                        ssa.var_type(*arg).is_string() && self.is_never_null(*arg, index)
                    })
                }
                Some(_) => true,
            };
        }
        true
    }

    fn is_never_null(&self, value: SsaVarId, index: &DefUseIndex) -> bool {
        let Some(op) = index.def_op(value) else {
            return false;
        };
        match op {
            SsaOp::Const { value, .. } => matches!(value, ConstValue::String(_)),
            SsaOp::NewObj { .. } | SsaOp::Assume { .. } => true,
            _ => op.as_invoke().is_some_and(|(method, args)| {
                method.is("String", "concat")
                    || args.first().is_some_and(|receiver| self.is_materialize(op, *receiver))
            }),
        }
    }

    fn is_identity_sensitive(
        &self,
        value: SsaVarId,
        ssa: &SsaFunction,
        index: &DefUseIndex,
    ) -> bool {
        Self::is_identity_sensitive_from(value, ssa, index, &mut FxHashSet::default())
    }
}
