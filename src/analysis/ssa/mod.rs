//! Static Single Assignment (SSA) form.
//!
//! This module provides the intermediate representation every analysis and
//! optimization pass in the crate works on. Each variable is assigned exactly
//! once; control flow merges are expressed with phi nodes.
//!
//! # Architecture
//!
//! - [`variable`] - SSA variable representation and identifiers
//! - [`phi`] - Phi node representation for control flow merges
//! - [`instruction`] - Instructions wrapping a single operation
//! - [`block`] - Basic blocks with phis, instructions and handler edges
//! - [`function`] - Complete SSA representation of a method
//! - [`builder`] - Closure-based construction API
//! - [`types`] - Types and symbolic method/field references
//! - [`value`] - Constant values
//! - [`ops`] - Decomposed SSA operations
//!
//! ## Variable Origins
//!
//! - **Arguments**: Method parameters, defined by `Argument` operations at entry
//! - **Stack slots**: Temporaries produced by operations
//! - **Phi nodes**: Merged values at control flow joins
//!
//! ## Object Construction
//!
//! Allocation and initialization are separate operations: `NewObj` yields an
//! uninitialized instance and a later constructor call (`<init>`) initializes it.
//! Passes that reason about object lifetimes rely on seeing both.
//!
//! # Usage
//!
//! ```rust
//! use builderfold::analysis::ssa::{SsaFunctionBuilder, SsaType};
//!
//! let ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
//!     let cond = f.arg(0);
//!     let (mut a, mut b) = (cond, cond);
//!     f.block(0, |blk| blk.branch(cond, 1, 2));
//!     f.block(1, |blk| {
//!         a = blk.const_str("yes");
//!         blk.jump(3);
//!     });
//!     f.block(2, |blk| {
//!         b = blk.const_str("no");
//!         blk.jump(3);
//!     });
//!     f.block(3, |blk| {
//!         let merged = blk.phi(&[(1, a), (2, b)]);
//!         blk.ret_val(merged);
//!     });
//! });
//!
//! for block in ssa.blocks() {
//!     for phi in block.phi_nodes() {
//!         println!("{phi}");
//!     }
//! }
//! ```

pub mod block;
pub mod builder;
pub mod function;
pub mod instruction;
pub mod ops;
pub mod phi;
pub mod types;
pub mod value;
pub mod variable;

pub use block::SsaBlock;
pub use builder::{SsaBlockBuilder, SsaFunctionBuilder, SsaFunctionContext};
pub use function::SsaFunction;
pub use instruction::SsaInstruction;
pub use ops::SsaOp;
pub use phi::{PhiNode, PhiOperand};
pub use types::{FieldRef, MethodRef, SsaType, TypeRef};
pub use value::ConstValue;
pub use variable::{DefSite, SsaVarId, SsaVariable, UseSite, VariableOrigin};
