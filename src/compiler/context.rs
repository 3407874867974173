//! Compiler context shared by all passes.
//!
//! The [`CompilerContext`] owns the SSA form of every method being optimized
//! together with the event log and the configuration. All collections are
//! thread-safe (`DashMap`, `DashSet`, `boxcar`) so the scheduler can process
//! methods in parallel while passes only hold a shared reference.

use std::fmt;

use dashmap::{DashMap, DashSet};

use crate::{
    analysis::SsaFunction,
    compiler::{config::OptimizerConfig, events::EventLog},
    Error, Result,
};

/// Identifier of a method within a [`CompilerContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u32);

impl MethodId {
    /// Creates a new method identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{:04}", self.0)
    }
}

/// Compiler context for the SSA pipeline.
///
/// # Examples
///
/// ```rust
/// use builderfold::{
///     analysis::SsaFunctionBuilder,
///     compiler::{CompilerContext, MethodId},
/// };
///
/// let ctx = CompilerContext::new();
/// let ssa = SsaFunctionBuilder::new(0).build_with(|f| f.block(0, |b| b.ret()));
/// ctx.add_method(MethodId::new(1), ssa);
///
/// let blocks = ctx.with_method(MethodId::new(1), |ssa| ssa.block_count())?;
/// assert_eq!(blocks, 1);
/// # Ok::<(), builderfold::Error>(())
/// ```
pub struct CompilerContext {
    /// SSA form for each method (mutated in place by passes).
    pub methods: DashMap<MethodId, SsaFunction>,

    /// Methods changed by at least one pass.
    pub processed_methods: DashSet<MethodId>,

    /// Events recorded by passes.
    pub events: EventLog,

    /// Optimizer configuration.
    pub config: OptimizerConfig,
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerContext {
    /// Creates a new context with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(OptimizerConfig::default())
    }

    /// Creates a new context with custom configuration.
    #[must_use]
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self {
            methods: DashMap::new(),
            processed_methods: DashSet::new(),
            events: EventLog::new(),
            config,
        }
    }

    /// Registers the SSA form of a method, replacing any previous one.
    pub fn add_method(&self, method: MethodId, ssa: SsaFunction) {
        self.methods.insert(method, ssa);
    }

    /// Runs `f` with shared access to a method's SSA.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if the method was never registered.
    pub fn with_method<R, F>(&self, method: MethodId, f: F) -> Result<R>
    where
        F: FnOnce(&SsaFunction) -> R,
    {
        self.methods
            .get(&method)
            .map(|entry| f(entry.value()))
            .ok_or(Error::UnknownMethod(method))
    }

    /// Removes a method from the context and returns its SSA.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if the method was never registered.
    pub fn take_method(&self, method: MethodId) -> Result<SsaFunction> {
        self.methods
            .remove(&method)
            .map(|(_, ssa)| ssa)
            .ok_or(Error::UnknownMethod(method))
    }

    /// Returns all registered methods in ascending order.
    #[must_use]
    pub fn all_methods(&self) -> Vec<MethodId> {
        let mut methods: Vec<_> = self.methods.iter().map(|entry| *entry.key()).collect();
        methods.sort_unstable();
        methods
    }

    /// Returns the number of registered methods.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if any pass changed `method`.
    #[must_use]
    pub fn was_processed(&self, method: MethodId) -> bool {
        self.processed_methods.contains(&method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SsaFunctionBuilder;

    fn trivial() -> SsaFunction {
        SsaFunctionBuilder::new(0).build_with(|f| f.block(0, |b| b.ret()))
    }

    #[test]
    fn test_methods_sorted() {
        let ctx = CompilerContext::new();
        ctx.add_method(MethodId::new(3), trivial());
        ctx.add_method(MethodId::new(1), trivial());
        assert_eq!(ctx.all_methods(), vec![MethodId::new(1), MethodId::new(3)]);
        assert_eq!(ctx.method_count(), 2);
    }

    #[test]
    fn test_unknown_method() {
        let ctx = CompilerContext::new();
        let result = ctx.with_method(MethodId::new(9), SsaFunction::block_count);
        assert!(matches!(result, Err(Error::UnknownMethod(id)) if id == MethodId::new(9)));
        assert!(ctx.take_method(MethodId::new(9)).is_err());
    }

    #[test]
    fn test_take_method() {
        let ctx = CompilerContext::new();
        ctx.add_method(MethodId::new(2), trivial());
        assert!(ctx.take_method(MethodId::new(2)).is_ok());
        assert_eq!(ctx.method_count(), 0);
    }

    #[test]
    fn test_method_id_display() {
        assert_eq!(MethodId::new(12).to_string(), "M0012");
    }
}
