//! Dynamic-specialization interpreter engine.
//!
//! Given an abstract syntax tree of a small imperative language, this crate
//! produces an executable native program by copying precompiled machine-code
//! fragments ("boilerplates") into a fresh code region and patching per-
//! fragment placeholder values. Build cost is `memcpy` plus a handful of
//! relocations; the resulting program's run-time cost approaches that of an
//! ahead-of-time compiled one.
//!
//! The crate is organized leaves-first, the same order an implementer should
//! read it in:
//!
//! - [`blueprint`] — the read-only catalog of precompiled fragments.
//! - [`cache`] — thread-safe lookup of materialized programs by small id.
//! - [`frame`] — stack-frame and spill-slot bookkeeping during composition.
//! - [`snippet`] — gluing sequential computations together.
//! - [`layout`] — assigning instances to offsets in the output code section.
//! - [`materializer`] / [`program`] — turning a layout into executable memory.
//! - [`abi`] — the internal and external calling conventions.
//! - [`exception`] — soft exception emulation for generated code.
//! - [`wrapper`] — host-callable function objects.
//! - [`composer`] — the public API an AST front-end drives to build a program.
//!
//! The AST type system, the front-end that selects blueprints per AST node,
//! and the offline builder that compiles boilerplate source into the
//! [`blueprint::Blueprint`] records consumed here are all external
//! collaborators and outside this crate's scope.

#![cfg_attr(not(test), allow(dead_code))]

pub mod abi;
pub mod blueprint;
pub mod cache;
pub mod composer;
pub mod error;
pub mod exception;
pub mod frame;
pub mod instance;
pub mod layout;
pub mod materializer;
pub mod meta;
pub mod program;
pub mod sizeclass;
pub mod snippet;
pub mod target;
pub mod wrapper;

pub use composer::Composer;
pub use error::{LayoutError, SelectError};
pub use program::GeneratedProgram;
