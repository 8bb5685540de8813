// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Lift x86-64 and AArch64 machine code to LLVM IR
//!
//! Starting from an entry address, the control-flow reconstructor (in the
//! `cfg` crate) discovers basic blocks by decoding instructions, splitting
//! blocks at interior branch targets and wiring successors. Each block gets a
//! register file that caches multiple typed views (*facets*) of every
//! architectural register and anchors φ-nodes on the canonical views at block
//! joins. Per-instruction lifters then emit IR through the shared operand and
//! flag engines.
//!
//! ```no_run
//! use inkwell::context::Context;
//! use native_to_llvm::{CodeSlice, LiftConfig, Lifter};
//!
//! let code = [0x48, 0x89, 0xf8, 0xc3]; // mov rax, rdi; ret
//! let context = Context::create();
//! let lifter = Lifter::new(&context, "example", LiftConfig::default());
//! let func = lifter
//!     .lift_x86_64(&CodeSlice::new(0x1000, &code), 0x1000)
//!     .unwrap();
//! println!("{}", lifter.module().print_to_string().to_string());
//! ```
//!
//! Lifted functions have type `void (ptr)`; the pointer addresses the CPU
//! state struct holding the architectural registers and flags.

pub mod a64;
pub mod config;
pub(crate) mod context;
pub mod decode;
pub mod error;
pub mod facet;
pub(crate) mod function;
pub mod inst;
mod lifter;
pub mod regfile;
pub mod x86_64;

pub use config::{GlobalBase, LiftConfig, VectorSize};
pub use decode::{CodeSlice, CodeSource};
pub use error::{LiftError, LiftResult};
pub use lifter::Lifter;

/// Target instruction set for the convenience entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsaKind {
    X86_64,
    AArch64,
}

/// Lift one function and render the resulting module as textual IR.
///
/// Convenience wrapper for tools that do not manage their own LLVM context.
pub fn lift_function_ir(
    isa: IsaKind,
    code: &dyn CodeSource,
    entry: u64,
) -> LiftResult<String> {
    let context = inkwell::context::Context::create();
    let lifter = Lifter::new(&context, "lifted", LiftConfig::default());
    match isa {
        IsaKind::X86_64 => lifter.lift_x86_64(code, entry)?,
        IsaKind::AArch64 => lifter.lift_aarch64(code, entry)?,
    };
    Ok(lifter.module().print_to_string().to_string())
}
