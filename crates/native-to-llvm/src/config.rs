// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Lifter configuration

use inkwell::values::{FunctionValue, PointerValue};

/// Width of the modeled vector registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorSize {
    /// XMM-sized state (SSE).
    #[default]
    Bits128,
    /// YMM-sized state (AVX).
    Bits256,
}

impl VectorSize {
    pub fn bits(self) -> u32 {
        match self {
            VectorSize::Bits128 => 128,
            VectorSize::Bits256 => 256,
        }
    }
}

/// Anchor for rendering known-constant addresses as offsets from a
/// caller-provided pointer instead of absolute `inttoptr` casts.
#[derive(Debug, Clone, Copy)]
pub struct GlobalBase<'ctx> {
    /// The pointer the offsets are relative to.
    pub ptr: PointerValue<'ctx>,
    /// The source virtual address `ptr` corresponds to.
    pub addr: u64,
}

/// Configuration for a [`Lifter`](crate::Lifter).
///
/// The config is per-lifter, not process-global; two lifters with different
/// global bases can coexist in one process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiftConfig<'ctx> {
    /// Attach fast-math function attributes to lifted functions.
    pub enable_fast_math: bool,
    /// Width of the vector register state.
    pub vector_size: VectorSize,
    /// Optional anchor for position-independent address rendering.
    pub global_base: Option<GlobalBase<'ctx>>,
    /// Helper invoked for CALL/BL after the return address and new IP are
    /// written. When `None`, an external `void @native_lift_call(ptr)` is
    /// declared lazily.
    pub call_function: Option<FunctionValue<'ctx>>,
    /// Lift unsupported instructions as `llvm.trap` instead of failing.
    pub unhandled_as_trap: bool,
}
