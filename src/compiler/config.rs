//! Configuration for the optimizer.
//!
//! This module provides [`OptimizerConfig`], which controls whether the
//! builder-chain pass runs, how hard the muncher works, and how long the
//! scheduler keeps iterating.

use rustc_hash::FxHashSet;

use crate::{compiler::MethodId, Error, Result};

/// Configuration for the optimizer.
///
/// # Examples
///
/// ```rust
/// use builderfold::compiler::{MethodId, OptimizerConfig};
///
/// let config = OptimizerConfig::default().with_debug_method(MethodId::new(7));
/// assert!(config.is_debug(MethodId::new(7)));
/// assert!(!config.is_debug(MethodId::new(8)));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Enable the builder-chain optimization (default: true).
    pub enable_builder_optimization: bool,

    /// Treat every method as compiled in debug mode (default: false).
    ///
    /// Debug-mode methods keep their builder operations so a debugger can
    /// still step through and inspect them.
    pub debug_mode: bool,

    /// Individual methods compiled in debug mode.
    pub debug_methods: FxHashSet<MethodId>,

    /// Maximum muncher rounds over all builder graphs (default: 3).
    pub munching_rounds: usize,

    /// Maximum iterations for the pass scheduler (default: 5).
    pub max_iterations: usize,

    /// Number of stable iterations before the scheduler stops (default: 1).
    pub stable_iterations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enable_builder_optimization: true,
            debug_mode: false,
            debug_methods: FxHashSet::default(),
            munching_rounds: 3,
            max_iterations: 5,
            stable_iterations: 1,
        }
    }
}

impl OptimizerConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with every optimization turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_builder_optimization: false,
            ..Self::default()
        }
    }

    /// Sets the number of muncher rounds.
    ///
    /// # Arguments
    ///
    /// * `rounds` - Maximum rounds; must be non-zero.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_munching_rounds(mut self, rounds: usize) -> Self {
        self.munching_rounds = rounds;
        self
    }

    /// Marks a single method as compiled in debug mode.
    #[must_use]
    pub fn with_debug_method(mut self, method: MethodId) -> Self {
        self.debug_methods.insert(method);
        self
    }

    /// Sets the scheduler iteration limits.
    #[must_use]
    pub fn with_iterations(mut self, max_iterations: usize, stable_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self.stable_iterations = stable_iterations;
        self
    }

    /// Returns `true` if `method` is compiled in debug mode.
    #[must_use]
    pub fn is_debug(&self, method: MethodId) -> bool {
        self.debug_mode || self.debug_methods.contains(&method)
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the muncher round count or either
    /// scheduler limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.munching_rounds == 0 {
            return Err(Error::InvalidConfig(
                "munching_rounds must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.stable_iterations == 0 || self.stable_iterations > self.max_iterations {
            return Err(Error::InvalidConfig(format!(
                "stable_iterations must be within 1..={}, got {}",
                self.max_iterations, self.stable_iterations
            )));
        }
        Ok(())
    }
}
