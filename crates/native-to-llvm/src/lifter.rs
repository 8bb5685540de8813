// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::FunctionValue;
use tracing::debug;

use crate::a64::{self, AArch64};
use crate::config::LiftConfig;
use crate::context::LlvmContext;
use crate::decode::CodeSource;
use crate::error::LiftResult;
use crate::function::FunctionLifter;
use crate::inst::Inst;
use crate::x86_64::{self, X86_64};

/// Top-level lifter: owns the LLVM module and builder for one lifting unit.
///
/// Functions lifted through the same `Lifter` share one module. A `Lifter`
/// must stay on a single thread; independent lifts can run in parallel with
/// one `Lifter` (and one `Context`) each.
pub struct Lifter<'ctx> {
    ctx: LlvmContext<'ctx>,
    config: LiftConfig<'ctx>,
}

impl<'ctx> Lifter<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str, config: LiftConfig<'ctx>) -> Self {
        Self {
            ctx: LlvmContext::new(context, module_name),
            config,
        }
    }

    /// The module receiving the lifted functions.
    pub fn module(&self) -> &Module<'ctx> {
        &self.ctx.module
    }

    /// Lift the x86-64 function at `entry`, reconstructing its CFG from
    /// `code`. On failure nothing useful was added to the module and the
    /// caller should discard it.
    pub fn lift_x86_64(
        &self,
        code: &dyn CodeSource,
        entry: u64,
    ) -> LiftResult<FunctionValue<'ctx>> {
        debug!(entry = format_args!("{entry:#x}"), "lifting x86-64 function");
        FunctionLifter::<X86_64>::lift_function(&self.ctx, &self.config, code, entry)
    }

    /// Lift the AArch64 function at `entry`.
    pub fn lift_aarch64(
        &self,
        code: &dyn CodeSource,
        entry: u64,
    ) -> LiftResult<FunctionValue<'ctx>> {
        debug!(entry = format_args!("{entry:#x}"), "lifting AArch64 function");
        FunctionLifter::<AArch64>::lift_function(&self.ctx, &self.config, code, entry)
    }

    /// Lift a pre-decoded x86-64 instruction sequence as one basic block.
    /// The sequence must not branch within itself.
    pub fn lift_block_x86_64(
        &self,
        insts: Vec<Inst<x86_64::Mnemonic>>,
    ) -> LiftResult<FunctionValue<'ctx>> {
        FunctionLifter::<X86_64>::lift_block(&self.ctx, &self.config, insts)
    }

    /// Lift a pre-decoded AArch64 instruction sequence as one basic block.
    pub fn lift_block_aarch64(
        &self,
        insts: Vec<Inst<a64::Mnemonic>>,
    ) -> LiftResult<FunctionValue<'ctx>> {
        FunctionLifter::<AArch64>::lift_block(&self.ctx, &self.config, insts)
    }
}
