// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! AArch64 instruction lifting
//!
//! Covers the integer core of the A64 ISA: data processing with shifted and
//! extended operands, bitfield moves, conditional selects and compares,
//! loads/stores including pairs and writeback addressing, and branches.
//! Register 31 resolves to the zero register here; the stack pointer is a
//! separate architectural register supplied by the decoder where an
//! instruction addresses SP instead.
//!
//! FP and SIMD instructions are reported as unsupported.

use inkwell::types::StructType;
use inkwell::values::IntValue;
use inkwell::IntPredicate;

use crate::config::LiftConfig;
use crate::context::LlvmContext;
use crate::decode::{self, CodeSource};
use crate::error::{LiftError, LiftResult};
use crate::facet::Facet;
use crate::function::operand::Align;
use crate::function::{FunctionLifter, Isa};
use crate::inst::{Inst, MemOp, Operand};
use crate::regfile::ArchReg;

/// AArch64 mnemonics understood by the lifter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Nop,
    Unsupported,
    // Data processing
    Add,
    Adds,
    Sub,
    Subs,
    And,
    Ands,
    Orr,
    Orn,
    Eor,
    Bic,
    Movz,
    Movn,
    /// MOVK keeps all bits outside the patched 16-bit field.
    Movk,
    Ubfm,
    Sbfm,
    Bfm,
    Extr,
    Lslv,
    Lsrv,
    Asrv,
    Rorv,
    Clz,
    Rbit,
    Rev,
    // Multiply and divide
    Madd,
    Msub,
    Smulh,
    Umulh,
    Sdiv,
    Udiv,
    // Conditional
    Csel,
    Csinc,
    Csinv,
    Csneg,
    Ccmp,
    Ccmn,
    // Memory
    Ldr,
    Ldrsb,
    Ldrsh,
    Ldrsw,
    Str,
    Ldp,
    Stp,
    Adr,
    Adrp,
    // Branches
    B,
    Bcc(u8),
    Cbz,
    Cbnz,
    Tbz,
    Tbnz,
    Bl,
    Blr,
    Br,
    Ret,
    Brk,
}

/// Marker type for the AArch64 ISA.
pub(crate) struct AArch64;

impl Isa for AArch64 {
    type Mnemonic = Mnemonic;

    const NAME: &'static str = "aarch64";

    fn decode(src: &dyn CodeSource, addr: u64) -> LiftResult<Inst<Mnemonic>> {
        decode::a64::decode(src, addr)
    }

    fn state_regs(config: &LiftConfig<'_>) -> Vec<(ArchReg, Facet)> {
        let _ = config;
        let mut regs = vec![(ArchReg::Ip, Facet::I64)];
        regs.extend((0..31).map(|i| (ArchReg::Gp(i), Facet::I64)));
        regs.push((ArchReg::Sp, Facet::I64));
        // NZCV maps onto the sign/zero/carry/overflow facets.
        regs.extend(
            [Facet::Sf, Facet::Zf, Facet::Cf, Facet::Of]
                .into_iter()
                .map(|f| (ArchReg::Flags, f)),
        );
        regs
    }

    fn cpu_type<'ctx>(ctx: &LlvmContext<'ctx>, config: &LiftConfig<'ctx>) -> StructType<'ctx> {
        let _ = config;
        ctx.context.struct_type(
            &[
                ctx.i64_type.into(),                // pc
                ctx.i64_type.array_type(31).into(), // x0..x30
                ctx.i64_type.into(),                // sp
                ctx.i8_type.array_type(4).into(),   // nzcv
            ],
            false,
        )
    }

    fn cpu_slot(reg: ArchReg, facet: Facet) -> (u32, Option<u64>) {
        match (reg, facet) {
            (ArchReg::Ip, _) => (0, None),
            (ArchReg::Gp(i), _) if i < 31 => (1, Some(u64::from(i))),
            (ArchReg::Sp, _) => (2, None),
            (ArchReg::Flags, Facet::Sf) => (3, Some(0)),
            (ArchReg::Flags, Facet::Zf) => (3, Some(1)),
            (ArchReg::Flags, Facet::Cf) => (3, Some(2)),
            (ArchReg::Flags, Facet::Of) => (3, Some(3)),
            other => unreachable!("no AArch64 state slot for {other:?}"),
        }
    }

    fn lift<'a, 'ctx>(
        fl: &mut FunctionLifter<'a, 'ctx, Self>,
        inst: &Inst<Mnemonic>,
    ) -> LiftResult<()> {
        lift_inst(fl, inst)
    }
}

type Fl<'a, 'b, 'ctx> = &'a mut FunctionLifter<'b, 'ctx, AArch64>;

/// The zero register: reads are zero, writes are discarded.
const ZR: ArchReg = ArchReg::Gp(31);

fn lift_inst(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    use Mnemonic::*;
    match inst.mnemonic {
        Nop => {}

        Add | Adds | Sub | Subs => lift_addsub(fl, inst)?,
        And | Ands | Orr | Orn | Eor | Bic => lift_logical(fl, inst)?,

        Movz => {
            let v = load_op(fl, inst.op(1))?;
            set_gp(fl, inst.op(0), v)?;
        }
        Movn => {
            let v = load_op(fl, inst.op(1))?;
            let n = fl.ctx.builder.build_not(v, "movn").unwrap();
            set_gp(fl, inst.op(0), n)?;
        }
        Movk => lift_movk(fl, inst)?,

        Ubfm | Sbfm | Bfm => lift_bitfield(fl, inst)?,
        Extr => {
            let hi = load_op(fl, inst.op(1))?;
            let lo = load_op(fl, inst.op(2))?;
            let lsb = imm_of(inst.op(3))? as u64;
            let ty = hi.get_type();
            let res = fl
                .call_intrinsic(
                    "llvm.fshr",
                    &[ty.into()],
                    &[hi.into(), lo.into(), ty.const_int(lsb, false).into()],
                )
                .into_int_value();
            set_gp(fl, inst.op(0), res)?;
        }

        Lslv | Lsrv | Asrv | Rorv => lift_shift_reg(fl, inst)?,

        Clz => {
            let v = load_op(fl, inst.op(1))?;
            let f = fl.ctx.bool_type.const_zero();
            let res = fl
                .call_intrinsic("llvm.ctlz", &[v.get_type().into()], &[v.into(), f.into()])
                .into_int_value();
            set_gp(fl, inst.op(0), res)?;
        }
        Rbit => {
            let v = load_op(fl, inst.op(1))?;
            let res = fl.unary_intrinsic("llvm.bitreverse", v.into()).into_int_value();
            set_gp(fl, inst.op(0), res)?;
        }
        Rev => {
            let v = load_op(fl, inst.op(1))?;
            let res = fl.unary_intrinsic("llvm.bswap", v.into()).into_int_value();
            set_gp(fl, inst.op(0), res)?;
        }

        Madd | Msub => {
            let rn = load_op(fl, inst.op(1))?;
            let rm = load_op(fl, inst.op(2))?;
            let ra = load_op(fl, inst.op(3))?;
            let b = &fl.ctx.builder;
            let prod = b.build_int_mul(rn, rm, "prod").unwrap();
            let res = if inst.mnemonic == Madd {
                b.build_int_add(ra, prod, "madd").unwrap()
            } else {
                b.build_int_sub(ra, prod, "msub").unwrap()
            };
            set_gp(fl, inst.op(0), res)?;
        }
        Smulh | Umulh => {
            let rn = load_op(fl, inst.op(1))?;
            let rm = load_op(fl, inst.op(2))?;
            let b = &fl.ctx.builder;
            let wide_ty = fl.ctx.i128_type;
            let (wn, wm) = if inst.mnemonic == Smulh {
                (
                    b.build_int_s_extend(rn, wide_ty, "wn").unwrap(),
                    b.build_int_s_extend(rm, wide_ty, "wm").unwrap(),
                )
            } else {
                (
                    b.build_int_z_extend(rn, wide_ty, "wn").unwrap(),
                    b.build_int_z_extend(rm, wide_ty, "wm").unwrap(),
                )
            };
            let prod = b.build_int_mul(wn, wm, "prod").unwrap();
            let hi = b
                .build_right_shift(prod, wide_ty.const_int(64, false), false, "hi")
                .unwrap();
            let res = b.build_int_truncate(hi, fl.ctx.i64_type, "mulh").unwrap();
            set_gp(fl, inst.op(0), res)?;
        }
        Sdiv | Udiv => lift_div(fl, inst)?,

        Csel | Csinc | Csinv | Csneg => lift_csel(fl, inst)?,
        Ccmp | Ccmn => lift_ccmp(fl, inst)?,

        Ldr | Ldrsb | Ldrsh | Ldrsw => lift_load(fl, inst)?,
        Str => lift_store(fl, inst)?,
        Ldp | Stp => lift_pair(fl, inst)?,
        Adr | Adrp => {
            let v = load_op(fl, inst.op(1))?;
            set_gp(fl, inst.op(0), v)?;
        }

        B => {
            let target = imm_of(inst.op(0))? as u64;
            fl.branch_to(target)?;
        }
        Bcc(cond) => {
            let c = is_true(fl, cond);
            let target = imm_of(inst.op(0))? as u64;
            fl.cond_branch(c, target, inst.end())?;
        }
        Cbz | Cbnz => {
            let v = load_op(fl, inst.op(0))?;
            let pred = if inst.mnemonic == Cbz {
                IntPredicate::EQ
            } else {
                IntPredicate::NE
            };
            let c = fl
                .ctx
                .builder
                .build_int_compare(pred, v, v.get_type().const_zero(), "cbz")
                .unwrap();
            let target = imm_of(last_op(inst)?)? as u64;
            fl.cond_branch(c, target, inst.end())?;
        }
        Tbz | Tbnz => {
            let v = load_op(fl, inst.op(0))?;
            let bit = imm_of(inst.op(1))? as u64;
            let b = &fl.ctx.builder;
            let shifted = b
                .build_right_shift(v, v.get_type().const_int(bit, false), false, "tb")
                .unwrap();
            let low = b
                .build_int_truncate(shifted, fl.ctx.bool_type, "tbit")
                .unwrap();
            let c = if inst.mnemonic == Tbz {
                b.build_not(low, "tbz").unwrap()
            } else {
                low
            };
            let target = imm_of(last_op(inst)?)? as u64;
            fl.cond_branch(c, target, inst.end())?;
        }
        Bl | Blr => {
            let ret = fl.ctx.i64_type.const_int(inst.end(), false);
            fl.set_reg(ArchReg::Gp(30), Facet::I64, ret.into(), true);
            let target = if inst.mnemonic == Bl {
                fl.ctx
                    .i64_type
                    .const_int(imm_of(inst.op(0))? as u64, false)
            } else {
                load_op(fl, inst.op(0))?
            };
            fl.set_reg(ArchReg::Ip, Facet::I64, target.into(), true);
            fl.emit_call_hook();
            fl.branch_to(inst.end())?;
        }
        Br => {
            let target = load_op(fl, inst.op(0))?;
            fl.set_reg(ArchReg::Ip, Facet::I64, target.into(), true);
            fl.emit_exit();
        }
        Ret => {
            let target = match inst.operands.first() {
                Some(op) => load_op(fl, op)?,
                None => fl.get_int(ArchReg::Gp(30), Facet::I64),
            };
            fl.set_reg(ArchReg::Ip, Facet::I64, target.into(), true);
            fl.emit_exit();
        }
        Brk => fl.emit_trap(),

        Unsupported => {
            return Err(LiftError::UnsupportedInstruction {
                addr: inst.addr,
                mnemonic: "unrecognized mnemonic".into(),
            })
        }
    }
    Ok(())
}

/// Load a source operand, resolving the zero register.
fn load_op<'ctx>(fl: Fl<'_, '_, 'ctx>, op: &Operand) -> LiftResult<IntValue<'ctx>> {
    match *op {
        Operand::Reg { reg: ZR, size, .. } | Operand::ShiftedReg { reg: ZR, size, .. } => {
            Ok(fl.ctx.int_type(u32::from(size) * 8).const_zero())
        }
        _ => fl.op_load_int(op, Align::None),
    }
}

/// Write a destination register: the zero register discards, W-register
/// writes zero-extend into the full 64 bits.
fn set_gp<'ctx>(fl: Fl<'_, '_, 'ctx>, op: &Operand, value: IntValue<'ctx>) -> LiftResult<()> {
    match *op {
        Operand::Reg { reg: ZR, .. } => Ok(()),
        Operand::Reg { reg, size, .. } => {
            fl.store_gp(reg, size, false, value);
            Ok(())
        }
        ref other => Err(LiftError::InvalidOperand(format!(
            "destination operand {other:?}"
        ))),
    }
}

fn last_op<M>(inst: &Inst<M>) -> LiftResult<&Operand> {
    inst.operands
        .last()
        .ok_or_else(|| LiftError::InvalidOperand("missing operand".into()))
}

fn imm_of(op: &Operand) -> LiftResult<i64> {
    match *op {
        Operand::Imm { value, .. } => Ok(value),
        ref other => Err(LiftError::InvalidOperand(format!(
            "expected immediate, got {other:?}"
        ))),
    }
}

/// N and Z from a result.
fn flags_nz<'ctx>(fl: Fl<'_, '_, 'ctx>, res: IntValue<'ctx>) {
    let zero = res.get_type().const_zero();
    let n = fl
        .ctx
        .builder
        .build_int_compare(IntPredicate::SLT, res, zero, "n")
        .unwrap();
    let z = fl
        .ctx
        .builder
        .build_int_compare(IntPredicate::EQ, res, zero, "z")
        .unwrap();
    fl.set_flag(Facet::Sf, n);
    fl.set_flag(Facet::Zf, z);
}

/// NZCV for an addition.
fn flags_add<'ctx>(
    fl: Fl<'_, '_, 'ctx>,
    res: IntValue<'ctx>,
    lhs: IntValue<'ctx>,
    rhs: IntValue<'ctx>,
) {
    flags_nz(fl, res);
    let c = fl
        .ctx
        .builder
        .build_int_compare(IntPredicate::ULT, res, lhs, "c")
        .unwrap();
    fl.set_flag(Facet::Cf, c);
    fl.flag_calc_o_add(res, lhs, rhs);
}

/// NZCV for a subtraction. AArch64 carry is "no borrow": `lhs >= rhs`.
fn flags_sub<'ctx>(
    fl: Fl<'_, '_, 'ctx>,
    res: IntValue<'ctx>,
    lhs: IntValue<'ctx>,
    rhs: IntValue<'ctx>,
) {
    flags_nz(fl, res);
    let c = fl
        .ctx
        .builder
        .build_int_compare(IntPredicate::UGE, lhs, rhs, "c")
        .unwrap();
    fl.set_flag(Facet::Cf, c);
    fl.flag_calc_o_sub(res, lhs, rhs);
}

fn lift_addsub(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    use Mnemonic::*;
    let lhs = load_op(fl, inst.op(1))?;
    let rhs = load_op(fl, inst.op(2))?;
    let b = &fl.ctx.builder;
    let sub = matches!(inst.mnemonic, Sub | Subs);
    let res = if sub {
        b.build_int_sub(lhs, rhs, "sub").unwrap()
    } else {
        b.build_int_add(lhs, rhs, "add").unwrap()
    };
    if matches!(inst.mnemonic, Adds | Subs) {
        if sub {
            flags_sub(fl, res, lhs, rhs);
        } else {
            flags_add(fl, res, lhs, rhs);
        }
    }
    set_gp(fl, inst.op(0), res)
}

fn lift_logical(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    use Mnemonic::*;
    let lhs = load_op(fl, inst.op(1))?;
    let rhs = load_op(fl, inst.op(2))?;
    let b = &fl.ctx.builder;
    let rhs = if matches!(inst.mnemonic, Orn | Bic) {
        b.build_not(rhs, "invop").unwrap()
    } else {
        rhs
    };
    let res = match inst.mnemonic {
        And | Ands | Bic => b.build_and(lhs, rhs, "and").unwrap(),
        Orr | Orn => b.build_or(lhs, rhs, "orr").unwrap(),
        Eor => b.build_xor(lhs, rhs, "eor").unwrap(),
        _ => unreachable!(),
    };
    if inst.mnemonic == Ands {
        flags_nz(fl, res);
        let f = fl.ctx.bool_type.const_zero();
        fl.set_flag(Facet::Cf, f);
        fl.set_flag(Facet::Of, f);
    }
    set_gp(fl, inst.op(0), res)
}

/// MOVK: patch a 16-bit field, keeping everything else.
fn lift_movk(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let field = imm_of(inst.op(1))? as u64;
    let shift = imm_of(inst.op(2))? as u64;
    let (reg, size) = match *inst.op(0) {
        Operand::Reg { reg, size, .. } => (reg, size),
        ref other => {
            return Err(LiftError::InvalidOperand(format!(
                "MOVK destination {other:?}"
            )))
        }
    };
    if reg == ZR {
        return Ok(());
    }
    let bits = u32::from(size) * 8;
    let ty = fl.ctx.int_type(bits);
    let cur = fl.get_int(reg, Facet::int(bits));
    let b = &fl.ctx.builder;
    let keep = b
        .build_and(cur, ty.const_int(!(0xffffu64 << shift), false), "keep")
        .unwrap();
    let res = b
        .build_or(keep, ty.const_int(field, false), "movk")
        .unwrap();
    fl.store_gp(reg, size, false, res);
    Ok(())
}

/// UBFM/SBFM/BFM with the architectural (immr, imms) semantics; the decoder
/// does not expand aliases.
fn lift_bitfield(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let src = load_op(fl, inst.op(1))?;
    let immr = imm_of(inst.op(2))? as u32;
    let imms = imm_of(inst.op(3))? as u32;
    let ty = src.get_type();
    let w = ty.get_bit_width();
    let b = &fl.ctx.builder;

    let mask = |len: u32| -> u64 {
        if len >= 64 {
            u64::MAX
        } else {
            (1u64 << len) - 1
        }
    };

    let res = match inst.mnemonic {
        Mnemonic::Ubfm => {
            if imms >= immr {
                let shifted = b
                    .build_right_shift(src, ty.const_int(u64::from(immr), false), false, "ubfx")
                    .unwrap();
                b.build_and(
                    shifted,
                    ty.const_int(mask(imms - immr + 1), false),
                    "ubfm",
                )
                .unwrap()
            } else {
                let field = b
                    .build_and(src, ty.const_int(mask(imms + 1), false), "field")
                    .unwrap();
                b.build_left_shift(field, ty.const_int(u64::from(w - immr), false), "ubfm")
                    .unwrap()
            }
        }
        Mnemonic::Sbfm => {
            // Position bit `imms` at the MSB, then shift back arithmetically:
            // the field lands at bit 0 (extract forms) or at `w - immr`
            // (insert forms), sign-filled above.
            let up = ty.const_int(u64::from(w - 1 - imms), false);
            let shl = b.build_left_shift(src, up, "sbfm_up").unwrap();
            let down = if imms >= immr {
                w - 1 - (imms - immr)
            } else {
                immr - imms - 1
            };
            b.build_right_shift(shl, ty.const_int(u64::from(down), false), true, "sbfm")
                .unwrap()
        }
        Mnemonic::Bfm => {
            let dst = load_op(fl, inst.op(0))?;
            let b = &fl.ctx.builder;
            if imms >= immr {
                let width_mask = mask(imms - immr + 1);
                let shifted = b
                    .build_right_shift(src, ty.const_int(u64::from(immr), false), false, "bfxil")
                    .unwrap();
                let field = b
                    .build_and(shifted, ty.const_int(width_mask, false), "field")
                    .unwrap();
                let keep = b
                    .build_and(dst, ty.const_int(!width_mask, false), "keep")
                    .unwrap();
                b.build_or(keep, field, "bfm").unwrap()
            } else {
                let shift = w - immr;
                let width_mask = mask(imms + 1);
                let field = b
                    .build_and(src, ty.const_int(width_mask, false), "field")
                    .unwrap();
                let placed = b
                    .build_left_shift(field, ty.const_int(u64::from(shift), false), "placed")
                    .unwrap();
                let keep = b
                    .build_and(
                        dst,
                        ty.const_int(!(width_mask << shift), false),
                        "keep",
                    )
                    .unwrap();
                b.build_or(keep, placed, "bfm").unwrap()
            }
        }
        _ => unreachable!(),
    };
    set_gp(fl, inst.op(0), res)
}

fn lift_shift_reg(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    use Mnemonic::*;
    let v = load_op(fl, inst.op(1))?;
    let amount = load_op(fl, inst.op(2))?;
    let ty = v.get_type();
    let b = &fl.ctx.builder;
    let amount = b
        .build_and(
            amount,
            ty.const_int(u64::from(ty.get_bit_width()) - 1, false),
            "shmask",
        )
        .unwrap();
    let res = match inst.mnemonic {
        Lslv => b.build_left_shift(v, amount, "lsl").unwrap(),
        Lsrv => b.build_right_shift(v, amount, false, "lsr").unwrap(),
        Asrv => b.build_right_shift(v, amount, true, "asr").unwrap(),
        Rorv => fl
            .call_intrinsic(
                "llvm.fshr",
                &[ty.into()],
                &[v.into(), v.into(), amount.into()],
            )
            .into_int_value(),
        _ => unreachable!(),
    };
    set_gp(fl, inst.op(0), res)
}

/// SDIV/UDIV with the architectural edge cases: division by zero yields
/// zero, INT_MIN / -1 yields INT_MIN.
fn lift_div(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let lhs = load_op(fl, inst.op(1))?;
    let rhs = load_op(fl, inst.op(2))?;
    let ty = lhs.get_type();
    let w = ty.get_bit_width();
    let b = &fl.ctx.builder;
    let zero = ty.const_zero();
    let div_zero = b
        .build_int_compare(IntPredicate::EQ, rhs, zero, "divzero")
        .unwrap();

    let res = if inst.mnemonic == Mnemonic::Sdiv {
        let int_min = ty.const_int(1u64 << (w - 1), false);
        let neg_one = ty.const_all_ones();
        let lhs_min = b
            .build_int_compare(IntPredicate::EQ, lhs, int_min, "lhsmin")
            .unwrap();
        let rhs_m1 = b
            .build_int_compare(IntPredicate::EQ, rhs, neg_one, "rhsm1")
            .unwrap();
        let overflow = b.build_and(lhs_min, rhs_m1, "divovf").unwrap();
        // Divide by a safe divisor, then patch the two special cases.
        let bad = b.build_or(div_zero, overflow, "divbad").unwrap();
        let safe_rhs = b
            .build_select(bad, ty.const_int(1, false), rhs, "saferhs")
            .unwrap()
            .into_int_value();
        let div = b.build_int_signed_div(lhs, safe_rhs, "sdiv").unwrap();
        let div = b
            .build_select(overflow, int_min, div, "ovfres")
            .unwrap()
            .into_int_value();
        b.build_select(div_zero, zero, div, "divres")
            .unwrap()
            .into_int_value()
    } else {
        let safe_rhs = b
            .build_select(div_zero, ty.const_int(1, false), rhs, "saferhs")
            .unwrap()
            .into_int_value();
        let div = b.build_int_unsigned_div(lhs, safe_rhs, "udiv").unwrap();
        b.build_select(div_zero, zero, div, "divres")
            .unwrap()
            .into_int_value()
    };
    set_gp(fl, inst.op(0), res)
}

fn lift_csel(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    use Mnemonic::*;
    let cond = match *inst.op(3) {
        Operand::Cond(c) => c,
        ref other => {
            return Err(LiftError::InvalidOperand(format!(
                "select condition {other:?}"
            )))
        }
    };
    let rn = load_op(fl, inst.op(1))?;
    let rm = load_op(fl, inst.op(2))?;
    let c = is_true(fl, cond);
    let b = &fl.ctx.builder;
    let alt = match inst.mnemonic {
        Csel => rm,
        Csinc => b
            .build_int_add(rm, rm.get_type().const_int(1, false), "csinc")
            .unwrap(),
        Csinv => b.build_not(rm, "csinv").unwrap(),
        Csneg => b
            .build_int_sub(rm.get_type().const_zero(), rm, "csneg")
            .unwrap(),
        _ => unreachable!(),
    };
    let res = b
        .build_select(c, rn, alt, "csel")
        .unwrap()
        .into_int_value();
    set_gp(fl, inst.op(0), res)
}

/// CCMP/CCMN: when the condition holds, compute flags from the comparison;
/// otherwise install the literal NZCV nibble.
fn lift_ccmp(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let cond = match *inst.op(3) {
        Operand::Cond(c) => c,
        ref other => {
            return Err(LiftError::InvalidOperand(format!(
                "ccmp condition {other:?}"
            )))
        }
    };
    let nzcv = imm_of(inst.op(2))? as u64;
    let lhs = load_op(fl, inst.op(0))?;
    let rhs = load_op(fl, inst.op(1))?;
    let c = is_true(fl, cond);

    let cmn = inst.mnemonic == Mnemonic::Ccmn;
    let b = &fl.ctx.builder;
    let res = if cmn {
        b.build_int_add(lhs, rhs, "cmn").unwrap()
    } else {
        b.build_int_sub(lhs, rhs, "cmp").unwrap()
    };
    if cmn {
        flags_add(fl, res, lhs, rhs);
    } else {
        flags_sub(fl, res, lhs, rhs);
    }

    // Literal flags for the not-taken case: N=bit3, Z=bit2, C=bit1, V=bit0.
    for (facet, bit) in [
        (Facet::Sf, 3),
        (Facet::Zf, 2),
        (Facet::Cf, 1),
        (Facet::Of, 0),
    ] {
        let computed = fl.get_flag(facet);
        let literal = fl
            .ctx
            .bool_type
            .const_int((nzcv >> bit) & 1, false);
        let sel = fl
            .ctx
            .builder
            .build_select(c, computed, literal, "ccmp")
            .unwrap()
            .into_int_value();
        fl.set_flag(facet, sel);
    }
    Ok(())
}

fn lift_load(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    use Mnemonic::*;
    let mem = mem_of(inst.op(1))?;
    let (reg, size) = reg_size(inst.op(0))?;
    let bits = u32::from(size) * 8;

    let raw = fl.op_load_int(inst.op(1), Align::None)?;
    let v = if raw.get_type().get_bit_width() < bits {
        let b = &fl.ctx.builder;
        let sign = matches!(inst.mnemonic, Ldrsb | Ldrsh | Ldrsw);
        if sign {
            b.build_int_s_extend(raw, fl.ctx.int_type(bits), "ldrs")
                .unwrap()
        } else {
            b.build_int_z_extend(raw, fl.ctx.int_type(bits), "ldr")
                .unwrap()
        }
    } else {
        raw
    };
    if reg != ZR {
        fl.store_gp(reg, size, false, v);
    }
    apply_writeback(fl, &mem)
}

fn lift_store(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let mem = mem_of(inst.op(1))?;
    let v = match *inst.op(0) {
        Operand::Reg { reg: ZR, .. } => fl
            .ctx
            .int_type(u32::from(mem.size) * 8)
            .const_zero(),
        ref op => {
            let full = fl.op_load_int(op, Align::None)?;
            let bits = u32::from(mem.size) * 8;
            if full.get_type().get_bit_width() > bits {
                fl.ctx
                    .builder
                    .build_int_truncate(full, fl.ctx.int_type(bits), "strn")
                    .unwrap()
            } else {
                full
            }
        }
    };
    fl.op_store_gp(inst.op(1), v, Align::None)?;
    apply_writeback(fl, &mem)
}

/// LDP/STP: two registers, two consecutive slots.
fn lift_pair(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let mem = mem_of(inst.op(2))?;
    let step = i64::from(mem.size);

    let mut second = mem;
    second.disp += step;
    second.writeback = None;
    let first_op = Operand::Mem(MemOp {
        writeback: None,
        ..mem
    });
    let second_op = Operand::Mem(second);

    if inst.mnemonic == Mnemonic::Ldp {
        let a = fl.op_load_int(&first_op, Align::None)?;
        let b = fl.op_load_int(&second_op, Align::None)?;
        set_gp(fl, inst.op(0), a)?;
        set_gp(fl, inst.op(1), b)?;
    } else {
        let a = load_op(fl, inst.op(0))?;
        let b = load_op(fl, inst.op(1))?;
        fl.op_store_gp(&first_op, a, Align::None)?;
        fl.op_store_gp(&second_op, b, Align::None)?;
    }
    apply_writeback(fl, &mem)
}

fn mem_of(op: &Operand) -> LiftResult<MemOp> {
    match *op {
        Operand::Mem(m) => Ok(m),
        ref other => Err(LiftError::InvalidOperand(format!(
            "expected memory operand, got {other:?}"
        ))),
    }
}

fn reg_size(op: &Operand) -> LiftResult<(ArchReg, u8)> {
    match *op {
        Operand::Reg { reg, size, .. } => Ok((reg, size)),
        ref other => Err(LiftError::InvalidOperand(format!(
            "expected register operand, got {other:?}"
        ))),
    }
}

/// Pre/post-index writeback: update the base register after the access.
fn apply_writeback(fl: Fl<'_, '_, '_>, mem: &MemOp) -> LiftResult<()> {
    let Some(wb) = mem.writeback else {
        return Ok(());
    };
    let base = mem
        .base
        .ok_or_else(|| LiftError::InvalidOperand("writeback without base".into()))?;
    let cur = fl.get_int(base, Facet::I64);
    let next = fl
        .ctx
        .builder
        .build_int_add(
            cur,
            fl.ctx.i64_type.const_int(wb.offset as u64, true),
            "wb",
        )
        .unwrap();
    fl.set_reg(base, Facet::I64, next.into(), true);
    Ok(())
}

/// Evaluate an A64 condition code over the NZCV facets.
fn is_true<'ctx>(fl: Fl<'_, '_, 'ctx>, cond: u8) -> IntValue<'ctx> {
    // AL and NV both evaluate to true.
    if cond >= 14 {
        return fl.ctx.bool_type.const_all_ones();
    }
    let base = match cond >> 1 {
        0 => fl.get_flag(Facet::Zf),
        1 => fl.get_flag(Facet::Cf),
        2 => fl.get_flag(Facet::Sf),
        3 => fl.get_flag(Facet::Of),
        4 => {
            // HI: C && !Z
            let c = fl.get_flag(Facet::Cf);
            let z = fl.get_flag(Facet::Zf);
            let nz = fl.ctx.builder.build_not(z, "nz").unwrap();
            fl.ctx.builder.build_and(c, nz, "hi").unwrap()
        }
        5 => {
            // GE: N == V
            let n = fl.get_flag(Facet::Sf);
            let v = fl.get_flag(Facet::Of);
            fl.ctx
                .builder
                .build_int_compare(IntPredicate::EQ, n, v, "ge")
                .unwrap()
        }
        6 => {
            // GT: !Z && N == V
            let n = fl.get_flag(Facet::Sf);
            let v = fl.get_flag(Facet::Of);
            let z = fl.get_flag(Facet::Zf);
            let ge = fl
                .ctx
                .builder
                .build_int_compare(IntPredicate::EQ, n, v, "ge")
                .unwrap();
            let nz = fl.ctx.builder.build_not(z, "nz").unwrap();
            fl.ctx.builder.build_and(ge, nz, "gt").unwrap()
        }
        _ => unreachable!(),
    };
    if cond & 1 == 1 {
        fl.ctx.builder.build_not(base, "inv").unwrap()
    } else {
        base
    }
}
