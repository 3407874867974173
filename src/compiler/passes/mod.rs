//! Optimization passes.
//!
//! Each pass implements [`SsaPass`](crate::compiler::SsaPass) and runs under
//! the [`PassScheduler`](crate::compiler::PassScheduler).

pub mod builders;
