// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # builderfold
//!
//! Builder-chain folding for an SSA-based bytecode optimizer.
//!
//! Code compiled from string concatenation is full of `StringBuilder` and
//! `StringBuffer` chains: allocate a buffer, append a few pieces, call
//! `toString()`. When the pieces are known at compile time the whole chain can
//! be replaced by a single string constant, and when only one or two non-null
//! strings are involved it can be replaced by the string itself or a single
//! `String.concat`. `builderfold` performs that rewrite soundly: buffers that
//! escape, are inspected, or keep growing inside a loop are left alone.
//!
//! ## Features
//!
//! - **Escape and alias analysis** over persistent (`imbl`) sets, run on a
//!   generic forward dataflow engine
//! - **Operation graphs** per buffer value, acyclic even for looping code
//! - **Bounded peephole munching** that folds appends, materializes constants
//!   and concatenations, and prunes unobservable operations
//! - **Single-pass IR rewrite** with exception-aware constant placement
//! - **Parallel host**: a pass scheduler running methods concurrently with `rayon`
//!
//! ## Quick Start
//!
//! ```rust
//! use builderfold::prelude::*;
//!
//! let sb = TypeRef::new("StringBuilder");
//! let append = MethodRef::instance(sb.clone(), "append", vec![SsaType::I32], SsaType::Void);
//! let to_string = MethodRef::instance(sb.clone(), "toString", vec![], SsaType::string());
//!
//! let ssa = SsaFunctionBuilder::new(0).build_with(|f| {
//!     f.block(0, |b| {
//!         let v = b.new_obj(&sb);
//!         b.call_void(MethodRef::constructor(sb.clone(), vec![]), &[v]);
//!         let x = b.const_i32(42);
//!         b.callvirt_void(append.clone(), &[v, x]);
//!         let s = b.callvirt(to_string.clone(), &[v]);
//!         b.ret_val(s);
//!     });
//! });
//!
//! let ctx = CompilerContext::new();
//! ctx.add_method(MethodId::new(1), ssa);
//!
//! let mut scheduler = PassScheduler::from_config(&ctx.config);
//! scheduler.add_pass(Box::new(BuilderChainPass::new()));
//! scheduler.run_pipeline(&ctx)?;
//!
//! assert_eq!(ctx.events.count(EventKind::ConstantFolded), 1);
//! # Ok::<(), builderfold::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`analysis`] - SSA IR, control flow graph, dataflow engine and def-use index
//! - [`compiler`] - Pass trait, scheduler, events and the builder-chain pass
//! - [`utils`] - Generic graph traits and traversals
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Development
//!
//! ```bash
//! cargo test
//! cargo bench --bench builders
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use builderfold::prelude::*;
///
/// let optimizer = BuilderChainOptimizer::new().with_rounds(2);
/// assert_eq!(optimizer.rounds(), 2);
/// ```
pub mod prelude;

/// Program analysis: SSA IR, CFG, dataflow and def-use.
///
/// Everything the builder-chain pass consumes about the code it optimizes
/// lives here; see [`analysis::ssa::SsaFunctionBuilder`] for constructing
/// functions in tests and examples.
pub mod analysis;

/// Optimization passes and the infrastructure running them.
///
/// # Key Types
///
/// - [`compiler::BuilderChainOptimizer`] - The optimization on a single function
/// - [`compiler::BuilderChainPass`] - The same behind the [`compiler::SsaPass`] trait
/// - [`compiler::PassScheduler`] - Runs passes over all methods until stable
/// - [`compiler::CompilerContext`] - Methods, configuration and events of a run
pub mod compiler;

/// Generic graph utilities shared by the analyses.
pub mod utils;

/// `builderfold` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `builderfold` Error type
///
/// # Examples
///
/// ```rust
/// use builderfold::{compiler::OptimizerConfig, Error};
///
/// let config = OptimizerConfig::default().with_munching_rounds(0);
/// match config.validate() {
///     Ok(()) => println!("usable"),
///     Err(Error::InvalidConfig(reason)) => println!("rejected: {reason}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;
