//! Pass scheduler for orchestrating SSA pass execution.
//!
//! The `PassScheduler` runs its passes over every method of a
//! [`CompilerContext`], in parallel per pass, and repeats the whole pipeline
//! until no pass changes anything for a configured number of iterations.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::{
    compiler::{config::OptimizerConfig, context::CompilerContext, pass::SsaPass, EventKind},
    Result,
};

/// Orchestrates SSA pass execution.
///
/// Passes run in registration order. Within a pass, methods are processed in
/// parallel: each method's SSA is removed from the context, transformed with
/// no lock held, and reinserted.
pub struct PassScheduler {
    /// Maximum iterations for the entire pipeline.
    max_iterations: usize,
    /// Number of stable iterations before stopping.
    stable_iterations: usize,
    /// Registered passes, in execution order.
    pub passes: Vec<Box<dyn SsaPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(5, 1)
    }
}

impl PassScheduler {
    /// Creates a new scheduler with the specified iteration limits.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum iterations for the entire pipeline before stopping.
    /// * `stable_iterations` - Stop early if no changes for this many iterations.
    #[must_use]
    pub fn new(max_iterations: usize, stable_iterations: usize) -> Self {
        Self {
            max_iterations,
            stable_iterations,
            passes: Vec::new(),
        }
    }

    /// Creates a scheduler using the iteration limits of `config`.
    #[must_use]
    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::new(config.max_iterations, config.stable_iterations)
    }

    /// Appends a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn SsaPass>) {
        self.passes.push(pass);
    }

    /// Returns the maximum number of pipeline iterations.
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Returns the number of stable iterations before stopping.
    #[must_use]
    pub const fn stable_iterations(&self) -> usize {
        self.stable_iterations
    }

    /// Runs all passes once over all methods.
    ///
    /// Returns `true` if any pass made changes, `false` otherwise.
    ///
    /// A pass failing on one method does not stop the pipeline: the method
    /// keeps whatever state the pass left it in, and the failure is logged and
    /// recorded as an [`EventKind::Error`] event.
    fn run_passes_once(ctx: &CompilerContext, passes: &mut [Box<dyn SsaPass>]) -> Result<bool> {
        let any_changed = AtomicBool::new(false);

        for pass in passes.iter_mut() {
            pass.initialize(ctx)?;
        }

        let methods = ctx.all_methods();

        for pass in passes.iter() {
            methods.par_iter().for_each(|&method| {
                if !pass.should_run(method, ctx) {
                    return;
                }

                // Remove SSA (brief lock, then released)
                let Some((_, mut ssa)) = ctx.methods.remove(&method) else {
                    return;
                };

                let result = pass.run_on_method(&mut ssa, method, ctx);

                ctx.methods.insert(method, ssa);

                match result {
                    Ok(true) => {
                        any_changed.store(true, Ordering::Relaxed);
                        ctx.processed_methods.insert(method);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        log::warn!("pass '{}' failed on {method}: {e}", pass.name());
                        ctx.events
                            .record(EventKind::Error)
                            .method(method)
                            .message(format!("{}: {e}", pass.name()));
                    }
                }
            });
        }

        for pass in passes.iter_mut() {
            pass.finalize(ctx)?;
        }

        Ok(any_changed.load(Ordering::Relaxed))
    }

    /// Runs the pipeline until it is stable or the iteration limit is hit.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The compiler context.
    ///
    /// # Returns
    ///
    /// The number of iterations completed. Events are accumulated in `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pass fails to initialize or finalize.
    pub fn run_pipeline(&mut self, ctx: &CompilerContext) -> Result<usize> {
        let mut stable_count = 0;
        let mut iterations = 0;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;

            let changed = Self::run_passes_once(ctx, &mut self.passes)?;
            log::debug!("pipeline iteration {iterations}: changed = {changed}");

            if changed {
                stable_count = 0;
            } else {
                stable_count += 1;
                if stable_count >= self.stable_iterations {
                    break;
                }
            }
        }

        Ok(iterations)
    }
}
