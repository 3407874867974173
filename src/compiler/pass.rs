//! Pass trait for the optimization pipeline.
//!
//! This module defines the `SsaPass` trait every optimization pass implements.

use crate::{
    analysis::SsaFunction,
    compiler::{context::CompilerContext, MethodId},
    Result,
};

/// An optimization pass that operates on SSA form.
///
/// All passes must be thread-safe (Send + Sync) to allow parallel execution.
/// Passes receive mutable access to the SSA function of one method and shared
/// access to the compiler context.
pub trait SsaPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run on a specific method?
    ///
    /// Called before `run_on_method`. Override to skip methods that
    /// don't need this pass (e.g., disabled by configuration, no candidates).
    fn should_run(&self, _method: MethodId, _ctx: &CompilerContext) -> bool {
        true
    }

    /// Run the pass on a single method's SSA.
    ///
    /// Returns `true` if any changes were made, `false` otherwise.
    /// Events should be recorded to `ctx.events`.
    ///
    /// # Arguments
    ///
    /// * `ssa` - The SSA function to transform.
    /// * `method` - The method being transformed.
    /// * `ctx` - The compiler context (thread-safe, uses shared reference).
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails to process the method.
    fn run_on_method(
        &self,
        ssa: &mut SsaFunction,
        method: MethodId,
        ctx: &CompilerContext,
    ) -> Result<bool>;

    /// Called once before the pass runs over the methods.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    fn initialize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Called once after the pass has run over all methods.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
