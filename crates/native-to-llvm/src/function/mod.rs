// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-function lifting
//!
//! [`FunctionLifter`] drives one function through the block lifecycle:
//! blocks are created empty with φ-nodes, populated by the ISA lifter,
//! terminated, linked, and finally sealed by filling every φ from the
//! predecessors' end-of-block register files.
//!
//! The lifted function has type `void (ptr)`; its single argument points to
//! the CPU state struct described by the [`Isa`] implementation. A synthetic
//! init block loads the architectural state and branches to the block at the
//! entry address, so a branch back to the entry still finds φ-nodes.

pub(crate) mod flags;
pub(crate) mod operand;

use std::collections::HashMap;
use std::marker::PhantomData;

use cfg::{CfgInstruction, FunctionCfg};
use inkwell::attributes::AttributeLoc;
use inkwell::basic_block::BasicBlock;
use inkwell::intrinsics::Intrinsic;
use inkwell::module::Linkage;
use inkwell::types::{BasicTypeEnum, StructType};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValueEnum, FunctionValue, IntValue, PointerValue,
};
use tracing::trace;

use crate::config::LiftConfig;
use crate::context::LlvmContext;
use crate::decode::CodeSource;
use crate::error::{LiftError, LiftResult};
use crate::facet::Facet;
use crate::inst::Inst;
use crate::regfile::{ArchReg, PhiRecord, RegFile};

/// External helper declared when no call hook is configured.
const CALL_HELPER: &str = "native_lift_call";

/// Per-ISA description consumed by the generic function driver.
pub(crate) trait Isa: Sized {
    type Mnemonic: Copy + std::fmt::Debug;

    const NAME: &'static str;

    /// Decode the instruction at `addr`.
    fn decode(src: &dyn CodeSource, addr: u64) -> LiftResult<Inst<Self::Mnemonic>>;

    /// The architectural state registers with their canonical facets.
    fn state_regs(config: &LiftConfig<'_>) -> Vec<(ArchReg, Facet)>;

    /// The CPU state struct type the lifted function operates on.
    fn cpu_type<'ctx>(ctx: &LlvmContext<'ctx>, config: &LiftConfig<'ctx>) -> StructType<'ctx>;

    /// `(field, array index)` of a state register inside the CPU struct.
    fn cpu_slot(reg: ArchReg, facet: Facet) -> (u32, Option<u64>);

    /// Lift one instruction into the current block.
    fn lift<'a, 'ctx>(
        fl: &mut FunctionLifter<'a, 'ctx, Self>,
        inst: &Inst<Self::Mnemonic>,
    ) -> LiftResult<()>;
}

/// One basic block of the function under lifting.
///
/// Auxiliary blocks (REP loop bodies) are `ArchBlock`s too; they differ from
/// decoded blocks only in how control reaches them.
struct ArchBlock<'ctx> {
    llvm: BasicBlock<'ctx>,
    regs: RegFile<'ctx>,
    phis: Vec<PhiRecord<'ctx>>,
    /// Indices of blocks that branch here, recorded when the branch is
    /// emitted. φ-filling iterates exactly this list.
    preds: Vec<usize>,
    terminated: bool,
}

/// Per-function lifting state: the LLVM function, the CPU state pointer, and
/// the blocks with their register files.
pub(crate) struct FunctionLifter<'a, 'ctx, A: Isa> {
    pub(crate) ctx: &'a LlvmContext<'ctx>,
    pub(crate) config: &'a LiftConfig<'ctx>,
    pub(crate) func: FunctionValue<'ctx>,
    cpu_ty: StructType<'ctx>,
    cpu: PointerValue<'ctx>,
    state_regs: Vec<(ArchReg, Facet)>,
    blocks: Vec<ArchBlock<'ctx>>,
    /// Block start address → index into `blocks`.
    block_at: HashMap<u64, usize>,
    cur: usize,
    _isa: PhantomData<A>,
}

impl<'a, 'ctx, A: Isa> FunctionLifter<'a, 'ctx, A> {
    /// Reconstruct the CFG at `entry` and lift the whole function.
    pub fn lift_function(
        ctx: &'a LlvmContext<'ctx>,
        config: &'a LiftConfig<'ctx>,
        src: &dyn CodeSource,
        entry: u64,
    ) -> LiftResult<FunctionValue<'ctx>>
    where
        Inst<A::Mnemonic>: CfgInstruction,
    {
        let graph = cfg::reconstruct(entry, |addr| A::decode(src, addr))?;
        Self::lift_cfg(ctx, config, &graph, entry)
    }

    /// Lift a pre-decoded instruction sequence as a single block. Control
    /// transfers within the sequence are rejected; falling off the end (or a
    /// return) stores the state back and returns.
    pub fn lift_block(
        ctx: &'a LlvmContext<'ctx>,
        config: &'a LiftConfig<'ctx>,
        insts: Vec<Inst<A::Mnemonic>>,
    ) -> LiftResult<FunctionValue<'ctx>>
    where
        Inst<A::Mnemonic>: CfgInstruction,
    {
        if insts.is_empty() {
            return Err(LiftError::Cfg("empty instruction sequence".into()));
        }
        let entry = insts[0].addr;
        let graph = FunctionCfg::single_block(insts);
        Self::lift_cfg(ctx, config, &graph, entry)
    }

    fn lift_cfg(
        ctx: &'a LlvmContext<'ctx>,
        config: &'a LiftConfig<'ctx>,
        graph: &FunctionCfg<Inst<A::Mnemonic>>,
        entry: u64,
    ) -> LiftResult<FunctionValue<'ctx>>
    where
        Inst<A::Mnemonic>: CfgInstruction,
    {
        let fn_ty = ctx
            .context
            .void_type()
            .fn_type(&[ctx.ptr_type.into()], false);
        let func = ctx
            .module
            .add_function(&format!("lift_{entry:x}"), fn_ty, None);
        if config.enable_fast_math {
            for key in [
                "unsafe-fp-math",
                "no-nans-fp-math",
                "no-infs-fp-math",
                "no-signed-zeros-fp-math",
            ] {
                let attr = ctx.context.create_string_attribute(key, "true");
                func.add_attribute(AttributeLoc::Function, attr);
            }
        }

        let cpu = func.get_nth_param(0).unwrap().into_pointer_value();
        let mut fl = FunctionLifter {
            ctx,
            config,
            func,
            cpu_ty: A::cpu_type(ctx, config),
            cpu,
            state_regs: A::state_regs(config),
            blocks: Vec::new(),
            block_at: HashMap::new(),
            cur: 0,
            _isa: PhantomData,
        };

        // Init block: load the architectural state from the CPU struct.
        let init = ctx.context.append_basic_block(func, "init");
        ctx.builder.position_at_end(init);
        let mut init_regs = RegFile::new();
        for i in 0..fl.state_regs.len() {
            let (reg, facet) = fl.state_regs[i];
            let v = fl.load_slot(reg, facet);
            init_regs.set(reg, facet, v, false);
        }
        fl.blocks.push(ArchBlock {
            llvm: init,
            regs: init_regs,
            phis: Vec::new(),
            preds: Vec::new(),
            terminated: false,
        });

        // Create every decoded block up front, with φ-nodes for each
        // canonical facet, so branches always find their target.
        let mut block_of = HashMap::new();
        for node in graph.blocks() {
            let data = graph.block(node);
            let idx = fl.add_block(&format!("bb_{:x}", data.start));
            block_of.insert(node, idx);
            fl.block_at.insert(data.start, idx);
        }

        // Enter the function at the block covering the entry address.
        fl.seat(0);
        fl.branch_to_idx(block_of[&graph.entry()]);

        // Populate.
        for node in graph.blocks() {
            let data = graph.block(node);
            fl.seat(block_of[&node]);
            let mut last_end = data.start;
            for inst in &data.insts {
                trace!(
                    isa = A::NAME,
                    addr = format_args!("{:#x}", inst.addr),
                    mnemonic = ?inst.mnemonic,
                    "lifting instruction"
                );
                last_end = inst.end();
                match A::lift(&mut fl, inst) {
                    Err(LiftError::UnsupportedInstruction { addr, mnemonic })
                        if config.unhandled_as_trap =>
                    {
                        trace!(
                            addr = format_args!("{addr:#x}"),
                            mnemonic = %mnemonic,
                            "emitting trap for unhandled instruction"
                        );
                        fl.emit_trap();
                    }
                    other => other?,
                }
            }
            if !fl.blocks[fl.cur].terminated {
                match graph.successors(node).fall_through {
                    Some(next) => fl.branch_to_idx(block_of[&next]),
                    None => {
                        // Only possible for pre-decoded single blocks.
                        let ip = ctx.i64_type.const_int(last_end, false);
                        fl.set_reg(ArchReg::Ip, Facet::I64, ip.into(), true);
                        fl.emit_exit();
                    }
                }
            }
        }

        fl.fill_phis();
        Ok(func)
    }

    // ---- block plumbing ----------------------------------------------------

    /// Append a new block with φ-nodes for every canonical facet. The
    /// builder's insertion point is preserved.
    pub(crate) fn add_block(&mut self, name: &str) -> usize {
        let saved = self.ctx.builder.get_insert_block();
        let bb = self.ctx.context.append_basic_block(self.func, name);
        let mut regs = RegFile::new();
        let phis = regs.insert_phis(
            self.ctx,
            self.config.vector_size.bits(),
            bb,
            &self.state_regs,
        );
        if let Some(s) = saved {
            self.ctx.builder.position_at_end(s);
        }
        self.blocks.push(ArchBlock {
            llvm: bb,
            regs,
            phis,
            preds: Vec::new(),
            terminated: false,
        });
        self.blocks.len() - 1
    }

    /// Make `idx` the current block and position the builder at its end.
    pub(crate) fn seat(&mut self, idx: usize) {
        self.cur = idx;
        self.ctx.builder.position_at_end(self.blocks[idx].llvm);
    }

    fn block_idx(&self, addr: u64) -> LiftResult<usize> {
        self.block_at
            .get(&addr)
            .copied()
            .ok_or_else(|| LiftError::Cfg(format!("no block starts at target {addr:#x}")))
    }

    /// Terminate the current block with a branch to another block.
    pub(crate) fn branch_to_idx(&mut self, target: usize) {
        let bb = self.blocks[target].llvm;
        self.ctx.builder.build_unconditional_branch(bb).unwrap();
        let cur = self.cur;
        self.blocks[target].preds.push(cur);
        self.blocks[cur].terminated = true;
    }

    /// Terminate the current block with a conditional branch between two
    /// blocks given by index.
    pub(crate) fn cond_branch_idx(&mut self, cond: IntValue<'ctx>, then: usize, other: usize) {
        if then == other {
            self.branch_to_idx(then);
            return;
        }
        let tb = self.blocks[then].llvm;
        let ob = self.blocks[other].llvm;
        self.ctx
            .builder
            .build_conditional_branch(cond, tb, ob)
            .unwrap();
        let cur = self.cur;
        self.blocks[then].preds.push(cur);
        self.blocks[other].preds.push(cur);
        self.blocks[cur].terminated = true;
    }

    /// Branch to the decoded block starting at `addr`.
    pub(crate) fn branch_to(&mut self, addr: u64) -> LiftResult<()> {
        let t = self.block_idx(addr)?;
        self.branch_to_idx(t);
        Ok(())
    }

    /// Conditional branch between two decoded blocks.
    pub(crate) fn cond_branch(
        &mut self,
        cond: IntValue<'ctx>,
        target: u64,
        fall: u64,
    ) -> LiftResult<()> {
        let t = self.block_idx(target)?;
        let f = self.block_idx(fall)?;
        self.cond_branch_idx(cond, t, f);
        Ok(())
    }

    /// Fill every φ from the predecessors' end-of-block register files. Runs
    /// after all blocks are populated and linked; reads only cached values.
    fn fill_phis(&mut self) {
        for i in 0..self.blocks.len() {
            if self.blocks[i].phis.is_empty() {
                continue;
            }
            let preds = self.blocks[i].preds.clone();
            debug_assert!(!preds.is_empty(), "unreachable block survived discovery");
            let phis = self.blocks[i].phis.clone();
            for rec in phis {
                for &p in &preds {
                    let v = self.blocks[p]
                        .regs
                        .cached(rec.reg, rec.facet)
                        .expect("canonical facet missing at predecessor exit");
                    rec.phi.add_incoming(&[(&v, self.blocks[p].llvm)]);
                }
            }
        }
    }

    // ---- register access ---------------------------------------------------

    pub(crate) fn get_reg(&mut self, reg: ArchReg, facet: Facet) -> BasicValueEnum<'ctx> {
        let ivec = self.config.vector_size.bits();
        self.blocks[self.cur].regs.get(self.ctx, ivec, reg, facet)
    }

    pub(crate) fn set_reg(
        &mut self,
        reg: ArchReg,
        facet: Facet,
        value: BasicValueEnum<'ctx>,
        clear_others: bool,
    ) {
        self.blocks[self.cur].regs.set(reg, facet, value, clear_others);
    }

    pub(crate) fn get_int(&mut self, reg: ArchReg, facet: Facet) -> IntValue<'ctx> {
        self.get_reg(reg, facet).into_int_value()
    }

    pub(crate) fn get_flag(&mut self, facet: Facet) -> IntValue<'ctx> {
        self.get_reg(ArchReg::Flags, facet).into_int_value()
    }

    pub(crate) fn set_flag(&mut self, facet: Facet, value: IntValue<'ctx>) {
        self.set_reg(ArchReg::Flags, facet, value.into(), false);
    }

    pub(crate) fn set_flags_undef(&mut self, facets: &[Facet]) {
        let undef = self.ctx.bool_type.get_undef();
        for &facet in facets {
            self.set_flag(facet, undef);
        }
    }

    // ---- CPU state struct --------------------------------------------------

    /// In-memory type of a state slot (flags are stored as bytes).
    fn slot_ty(&self, facet: Facet) -> BasicTypeEnum<'ctx> {
        if facet.is_flag() {
            self.ctx.i8_type.into()
        } else {
            facet.ty(self.ctx, self.config.vector_size.bits())
        }
    }

    fn slot_ptr(&self, reg: ArchReg, facet: Facet) -> PointerValue<'ctx> {
        let (field, index) = A::cpu_slot(reg, facet);
        let name = reg.label(facet);
        match index {
            None => self
                .ctx
                .builder
                .build_struct_gep(self.cpu, field, &name)
                .unwrap(),
            Some(i) => unsafe {
                self.ctx
                    .builder
                    .build_in_bounds_gep(
                        self.cpu,
                        &[self.ctx.lane(0), self.ctx.lane(u64::from(field)), self.ctx.lane(i)],
                        &name,
                    )
                    .unwrap()
            },
        }
    }

    fn load_slot(&mut self, reg: ArchReg, facet: Facet) -> BasicValueEnum<'ctx> {
        let ptr = self.slot_ptr(reg, facet);
        let name = reg.label(facet);
        let raw = self
            .ctx
            .builder
            .build_load(ptr, &name)
            .unwrap();
        if facet.is_flag() {
            self.ctx
                .builder
                .build_int_truncate(raw.into_int_value(), self.ctx.bool_type, &name)
                .unwrap()
                .into()
        } else {
            raw
        }
    }

    fn store_slot(&mut self, reg: ArchReg, facet: Facet, value: BasicValueEnum<'ctx>) {
        let ptr = self.slot_ptr(reg, facet);
        let value = if facet.is_flag() {
            self.ctx
                .builder
                .build_int_z_extend(value.into_int_value(), self.ctx.i8_type, "flag8")
                .unwrap()
                .into()
        } else {
            value
        };
        self.ctx.builder.build_store(ptr, value).unwrap();
    }

    /// Write every canonical facet back to the CPU struct.
    pub(crate) fn sync_to_cpu(&mut self) {
        for i in 0..self.state_regs.len() {
            let (reg, facet) = self.state_regs[i];
            let v = self.get_reg(reg, facet);
            self.store_slot(reg, facet, v);
        }
    }

    /// Forget all cached facets and reload the canonical state, e.g. after a
    /// helper call that may have modified the CPU struct.
    pub(crate) fn reload_from_cpu(&mut self) {
        for i in 0..self.state_regs.len() {
            let (reg, facet) = self.state_regs[i];
            let v = self.load_slot(reg, facet);
            let cur = self.cur;
            self.blocks[cur].regs.set(reg, facet, v, true);
        }
    }

    // ---- function exits ----------------------------------------------------

    /// Leave the lifted function: store the state back and return. The caller
    /// must have set the IP facet to the continuation address.
    pub(crate) fn emit_exit(&mut self) {
        self.sync_to_cpu();
        self.ctx.builder.build_return(None).unwrap();
        self.blocks[self.cur].terminated = true;
    }

    /// Invoke the call hook around a CALL/BL: state is synced before and
    /// reloaded after, since the helper executes the callee against the CPU
    /// struct.
    pub(crate) fn emit_call_hook(&mut self) {
        let callee = match self.config.call_function {
            Some(f) => f,
            None => match self.ctx.module.get_function(CALL_HELPER) {
                Some(f) => f,
                None => {
                    let ty = self
                        .ctx
                        .context
                        .void_type()
                        .fn_type(&[self.ctx.ptr_type.into()], false);
                    self.ctx
                        .module
                        .add_function(CALL_HELPER, ty, Some(Linkage::External))
                }
            },
        };
        self.sync_to_cpu();
        self.ctx
            .builder
            .build_call(callee, &[self.cpu.into()], "")
            .unwrap();
        self.reload_from_cpu();
    }

    /// `llvm.trap` for an instruction lifted under `unhandled_as_trap`.
    /// Control flow continues, keeping the discovered CFG shape intact.
    pub(crate) fn emit_trap(&mut self) {
        let trap = Intrinsic::find("llvm.trap")
            .expect("llvm.trap intrinsic")
            .get_declaration(&self.ctx.module, &[])
            .expect("llvm.trap declaration");
        self.ctx.builder.build_call(trap, &[], "").unwrap();
    }

    /// Zero-extend or truncate to a target integer type; identity on equal
    /// widths (shift counts arrive as i8 or as the operation width).
    pub(crate) fn uint_to(
        &self,
        v: IntValue<'ctx>,
        ty: inkwell::types::IntType<'ctx>,
    ) -> IntValue<'ctx> {
        let from = v.get_type().get_bit_width();
        let to = ty.get_bit_width();
        if from < to {
            self.ctx.builder.build_int_z_extend(v, ty, "uext").unwrap()
        } else if from > to {
            self.ctx.builder.build_int_truncate(v, ty, "utrunc").unwrap()
        } else {
            v
        }
    }

    // ---- intrinsics --------------------------------------------------------

    /// Call an LLVM intrinsic overloaded on `tys`.
    pub(crate) fn call_intrinsic(
        &self,
        name: &str,
        tys: &[BasicTypeEnum<'ctx>],
        args: &[BasicMetadataValueEnum<'ctx>],
    ) -> BasicValueEnum<'ctx> {
        let f = Intrinsic::find(name)
            .unwrap_or_else(|| panic!("intrinsic {name} not found"))
            .get_declaration(&self.ctx.module, tys)
            .unwrap_or_else(|| panic!("no declaration for {name}"));
        LlvmContext::call_value(self.ctx.builder.build_call(f, args, "").unwrap())
    }

    /// Unary intrinsic overloaded on its operand type (bswap, sqrt, ...).
    pub(crate) fn unary_intrinsic(
        &self,
        name: &str,
        v: BasicValueEnum<'ctx>,
    ) -> BasicValueEnum<'ctx> {
        self.call_intrinsic(name, &[v.get_type()], &[v.into()])
    }
}
