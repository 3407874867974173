use thiserror::Error;

use crate::compiler::MethodId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The builder-chain optimization itself never fails on unrecognized input: anything it
/// does not understand is treated as an escape and left alone. Errors therefore only come
/// from the surfaces around the pass: configuration validation, IR verification and the
/// host scheduler.
///
/// # Error Categories
///
/// ## IR Errors
/// - [`Error::Malformed`] - The SSA function violates a structural invariant
///
/// ## Host Errors
/// - [`Error::InvalidConfig`] - Optimizer configuration is unusable
/// - [`Error::UnknownMethod`] - A method was requested that the context does not hold
/// - [`Error::Error`] - Miscellaneous failures
///
/// # Examples
///
/// ```rust
/// use builderfold::{Error, compiler::OptimizerConfig};
///
/// let config = OptimizerConfig {
///     munching_rounds: 0,
///     ..OptimizerConfig::default()
/// };
///
/// match config.validate() {
///     Err(Error::InvalidConfig(reason)) => eprintln!("bad config: {reason}"),
///     Err(e) => eprintln!("other error: {e}"),
///     Ok(()) => {}
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The SSA function is structurally invalid.
    ///
    /// Raised by [`SsaFunction::verify`](crate::analysis::SsaFunction::verify) when an
    /// instruction names a block that does not exist, a phi operand names a block that
    /// is not a predecessor, or a variable is defined twice. The error includes the source
    /// location where the malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The optimizer configuration cannot be used.
    ///
    /// For example a munching round count of zero, which would disable every rewrite
    /// while still paying for both analyses.
    #[error("Invalid optimizer configuration - {0}")]
    InvalidConfig(String),

    /// The compiler context holds no SSA function for the requested method.
    #[error("No SSA function registered for method {0}")]
    UnknownMethod(MethodId),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
