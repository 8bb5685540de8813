// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! SSE/SSE2 instruction lifting
//!
//! Packed operations work on the vector facets of the XMM registers; scalar
//! operations on the low-lane float facets. Legacy SSE stores merge into the
//! untouched upper bits, loads from memory zero them.

use inkwell::values::{BasicValueEnum, IntValue, VectorValue};
use inkwell::{FloatPredicate, IntPredicate};

use crate::context::LlvmContext;
use crate::error::{LiftError, LiftResult};
use crate::facet::{DataKind, Facet};
use crate::function::operand::{Align, UpperHandling};
use crate::inst::{Inst, Operand};
use crate::regfile::ArchReg;

use super::{Fl, Mnemonic};

pub(super) fn lift_sse(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, m: Mnemonic) -> LiftResult<()> {
    use Mnemonic::*;
    match m {
        Movd => lift_mov_gx(fl, inst, 32),
        Movq => lift_mov_gx(fl, inst, 64),
        Movss => lift_mov_scalar(fl, inst, DataKind::Sf32),
        Movsd => lift_mov_scalar(fl, inst, DataKind::Sf64),
        Movups => lift_mov_packed(fl, inst, DataKind::Vf32, Align::None),
        Movupd => lift_mov_packed(fl, inst, DataKind::Vf64, Align::None),
        Movaps => lift_mov_packed(fl, inst, DataKind::Vf32, Align::Max),
        Movapd => lift_mov_packed(fl, inst, DataKind::Vf64, Align::Max),
        Movdqu => lift_mov_packed(fl, inst, DataKind::Vi64, Align::None),
        Movdqa | Movnt => lift_mov_packed(fl, inst, DataKind::Vi64, Align::Max),
        Movlps => lift_mov_half(fl, inst, DataKind::Vf32, false),
        Movlpd => lift_mov_half(fl, inst, DataKind::Sf64, false),
        Movhps => lift_mov_half(fl, inst, DataKind::Vf32, true),
        Movhpd => lift_mov_half(fl, inst, DataKind::Sf64, true),

        Addss => lift_fp_binop(fl, inst, FpOp::Add, DataKind::Sf32),
        Addsd => lift_fp_binop(fl, inst, FpOp::Add, DataKind::Sf64),
        Addps => lift_fp_binop(fl, inst, FpOp::Add, DataKind::Vf32),
        Addpd => lift_fp_binop(fl, inst, FpOp::Add, DataKind::Vf64),
        Subss => lift_fp_binop(fl, inst, FpOp::Sub, DataKind::Sf32),
        Subsd => lift_fp_binop(fl, inst, FpOp::Sub, DataKind::Sf64),
        Subps => lift_fp_binop(fl, inst, FpOp::Sub, DataKind::Vf32),
        Subpd => lift_fp_binop(fl, inst, FpOp::Sub, DataKind::Vf64),
        Mulss => lift_fp_binop(fl, inst, FpOp::Mul, DataKind::Sf32),
        Mulsd => lift_fp_binop(fl, inst, FpOp::Mul, DataKind::Sf64),
        Mulps => lift_fp_binop(fl, inst, FpOp::Mul, DataKind::Vf32),
        Mulpd => lift_fp_binop(fl, inst, FpOp::Mul, DataKind::Vf64),
        Divss => lift_fp_binop(fl, inst, FpOp::Div, DataKind::Sf32),
        Divsd => lift_fp_binop(fl, inst, FpOp::Div, DataKind::Sf64),
        Divps => lift_fp_binop(fl, inst, FpOp::Div, DataKind::Vf32),
        Divpd => lift_fp_binop(fl, inst, FpOp::Div, DataKind::Vf64),

        Minss => lift_fp_minmax(fl, inst, FloatPredicate::OLT, DataKind::Sf32),
        Minsd => lift_fp_minmax(fl, inst, FloatPredicate::OLT, DataKind::Sf64),
        Minps => lift_fp_minmax(fl, inst, FloatPredicate::OLT, DataKind::Vf32),
        Minpd => lift_fp_minmax(fl, inst, FloatPredicate::OLT, DataKind::Vf64),
        Maxss => lift_fp_minmax(fl, inst, FloatPredicate::OGT, DataKind::Sf32),
        Maxsd => lift_fp_minmax(fl, inst, FloatPredicate::OGT, DataKind::Sf64),
        Maxps => lift_fp_minmax(fl, inst, FloatPredicate::OGT, DataKind::Vf32),
        Maxpd => lift_fp_minmax(fl, inst, FloatPredicate::OGT, DataKind::Vf64),

        Sqrtss => lift_sqrt(fl, inst, DataKind::Sf32),
        Sqrtsd => lift_sqrt(fl, inst, DataKind::Sf64),
        Sqrtps => lift_sqrt(fl, inst, DataKind::Vf32),
        Sqrtpd => lift_sqrt(fl, inst, DataKind::Vf64),

        Andps | Andpd | Pand => lift_int_logic(fl, inst, BitVecOp::And, false),
        Andnps | Andnpd | Pandn => lift_int_logic(fl, inst, BitVecOp::And, true),
        Orps | Orpd | Por => lift_int_logic(fl, inst, BitVecOp::Or, false),
        Xorps | Xorpd | Pxor => lift_int_logic(fl, inst, BitVecOp::Xor, false),

        Comiss => lift_comis(fl, inst, DataKind::Sf32),
        Comisd => lift_comis(fl, inst, DataKind::Sf64),
        Cmpss => lift_fp_cmp(fl, inst, DataKind::Sf32),
        Cmpsd => lift_fp_cmp(fl, inst, DataKind::Sf64),
        Cmpps => lift_fp_cmp(fl, inst, DataKind::Vf32),
        Cmppd => lift_fp_cmp(fl, inst, DataKind::Vf64),

        Cvtsi2ss => lift_cvt_int_fp(fl, inst, DataKind::Sf32),
        Cvtsi2sd => lift_cvt_int_fp(fl, inst, DataKind::Sf64),
        Cvttss2si => lift_cvt_fp_int(fl, inst, DataKind::Sf32),
        Cvttsd2si => lift_cvt_fp_int(fl, inst, DataKind::Sf64),
        Cvtss2sd => lift_cvt_scalar_fp(fl, inst, true),
        Cvtsd2ss => lift_cvt_scalar_fp(fl, inst, false),
        Cvtdq2ps => lift_cvt_packed(fl, inst, CvtPacked::Dq2Ps),
        Cvttps2dq => lift_cvt_packed(fl, inst, CvtPacked::Ps2Dq),
        Cvtps2pd => lift_cvt_packed(fl, inst, CvtPacked::Ps2Pd),
        Cvtpd2ps => lift_cvt_packed(fl, inst, CvtPacked::Pd2Ps),

        Unpcklps => lift_shuffle2(fl, inst, DataKind::Vf32, &[0, 4, 1, 5]),
        Unpckhps => lift_shuffle2(fl, inst, DataKind::Vf32, &[2, 6, 3, 7]),
        Unpcklpd => lift_shuffle2(fl, inst, DataKind::Vf64, &[0, 2]),
        Unpckhpd => lift_shuffle2(fl, inst, DataKind::Vf64, &[1, 3]),
        Punpcklbw => lift_shuffle2(
            fl,
            inst,
            DataKind::Vi8,
            &[0, 16, 1, 17, 2, 18, 3, 19, 4, 20, 5, 21, 6, 22, 7, 23],
        ),
        Punpckhbw => lift_shuffle2(
            fl,
            inst,
            DataKind::Vi8,
            &[8, 24, 9, 25, 10, 26, 11, 27, 12, 28, 13, 29, 14, 30, 15, 31],
        ),
        Punpcklwd => lift_shuffle2(fl, inst, DataKind::Vi16, &[0, 8, 1, 9, 2, 10, 3, 11]),
        Punpckhwd => lift_shuffle2(fl, inst, DataKind::Vi16, &[4, 12, 5, 13, 6, 14, 7, 15]),
        Punpckldq => lift_shuffle2(fl, inst, DataKind::Vi32, &[0, 4, 1, 5]),
        Punpckhdq => lift_shuffle2(fl, inst, DataKind::Vi32, &[2, 6, 3, 7]),
        Punpcklqdq => lift_shuffle2(fl, inst, DataKind::Vi64, &[0, 2]),
        Punpckhqdq => lift_shuffle2(fl, inst, DataKind::Vi64, &[1, 3]),

        Shufps => lift_shufps(fl, inst),
        Shufpd => lift_shufpd(fl, inst),
        Pshufd => lift_pshufd(fl, inst),
        Pshuflw => lift_pshufw(fl, inst, 0),
        Pshufhw => lift_pshufw(fl, inst, 4),

        Pinsrb => lift_pinsr(fl, inst, DataKind::Vi8),
        Pinsrw => lift_pinsr(fl, inst, DataKind::Vi16),
        Pinsrd => lift_pinsr(fl, inst, DataKind::Vi32),
        Pinsrq => lift_pinsr(fl, inst, DataKind::Vi64),
        Pextrb => lift_pextr(fl, inst, DataKind::Vi8),
        Pextrw => lift_pextr(fl, inst, DataKind::Vi16),
        Pextrd => lift_pextr(fl, inst, DataKind::Vi32),
        Pextrq => lift_pextr(fl, inst, DataKind::Vi64),

        Packsswb => lift_pack(fl, inst, DataKind::Vi16, true),
        Packuswb => lift_pack(fl, inst, DataKind::Vi16, false),
        Packssdw => lift_pack(fl, inst, DataKind::Vi32, true),

        Paddb => lift_int_binop(fl, inst, IntVecOp::Add, DataKind::Vi8),
        Paddw => lift_int_binop(fl, inst, IntVecOp::Add, DataKind::Vi16),
        Paddd => lift_int_binop(fl, inst, IntVecOp::Add, DataKind::Vi32),
        Paddq => lift_int_binop(fl, inst, IntVecOp::Add, DataKind::Vi64),
        Psubb => lift_int_binop(fl, inst, IntVecOp::Sub, DataKind::Vi8),
        Psubw => lift_int_binop(fl, inst, IntVecOp::Sub, DataKind::Vi16),
        Psubd => lift_int_binop(fl, inst, IntVecOp::Sub, DataKind::Vi32),
        Psubq => lift_int_binop(fl, inst, IntVecOp::Sub, DataKind::Vi64),
        Pmullw => lift_int_binop(fl, inst, IntVecOp::Mul, DataKind::Vi16),

        Paddsb => lift_saturating(fl, inst, "llvm.sadd.sat", DataKind::Vi8),
        Paddsw => lift_saturating(fl, inst, "llvm.sadd.sat", DataKind::Vi16),
        Paddusb => lift_saturating(fl, inst, "llvm.uadd.sat", DataKind::Vi8),
        Paddusw => lift_saturating(fl, inst, "llvm.uadd.sat", DataKind::Vi16),
        Psubsb => lift_saturating(fl, inst, "llvm.ssub.sat", DataKind::Vi8),
        Psubsw => lift_saturating(fl, inst, "llvm.ssub.sat", DataKind::Vi16),
        Psubusb => lift_saturating(fl, inst, "llvm.usub.sat", DataKind::Vi8),
        Psubusw => lift_saturating(fl, inst, "llvm.usub.sat", DataKind::Vi16),

        Pmulhw => lift_mulh(fl, inst, true),
        Pmulhuw => lift_mulh(fl, inst, false),
        Pavgb => lift_pavg(fl, inst, DataKind::Vi8),
        Pavgw => lift_pavg(fl, inst, DataKind::Vi16),

        Pcmpeqb => lift_int_cmp(fl, inst, IntPredicate::EQ, DataKind::Vi8),
        Pcmpeqw => lift_int_cmp(fl, inst, IntPredicate::EQ, DataKind::Vi16),
        Pcmpeqd => lift_int_cmp(fl, inst, IntPredicate::EQ, DataKind::Vi32),
        Pcmpgtb => lift_int_cmp(fl, inst, IntPredicate::SGT, DataKind::Vi8),
        Pcmpgtw => lift_int_cmp(fl, inst, IntPredicate::SGT, DataKind::Vi16),
        Pcmpgtd => lift_int_cmp(fl, inst, IntPredicate::SGT, DataKind::Vi32),

        Pminub => lift_int_minmax(fl, inst, IntPredicate::ULT, DataKind::Vi8),
        Pmaxub => lift_int_minmax(fl, inst, IntPredicate::UGT, DataKind::Vi8),
        Pminsw => lift_int_minmax(fl, inst, IntPredicate::SLT, DataKind::Vi16),
        Pmaxsw => lift_int_minmax(fl, inst, IntPredicate::SGT, DataKind::Vi16),

        Pmovmskb => lift_movmsk(fl, inst, DataKind::Vi8),
        Movmskps => lift_movmsk(fl, inst, DataKind::Vi32),
        Movmskpd => lift_movmsk(fl, inst, DataKind::Vi64),

        Psllw => lift_pshift(fl, inst, VecShift::Shl, DataKind::Vi16),
        Pslld => lift_pshift(fl, inst, VecShift::Shl, DataKind::Vi32),
        Psllq => lift_pshift(fl, inst, VecShift::Shl, DataKind::Vi64),
        Psrlw => lift_pshift(fl, inst, VecShift::Shr, DataKind::Vi16),
        Psrld => lift_pshift(fl, inst, VecShift::Shr, DataKind::Vi32),
        Psrlq => lift_pshift(fl, inst, VecShift::Shr, DataKind::Vi64),
        Psraw => lift_pshift(fl, inst, VecShift::Sar, DataKind::Vi16),
        Psrad => lift_pshift(fl, inst, VecShift::Sar, DataKind::Vi32),
        Pslldq => lift_pshift_bytes(fl, inst, true),
        Psrldq => lift_pshift_bytes(fl, inst, false),

        Prefetch => lift_prefetch(fl, inst),
        Fxsave => lift_fxsave(fl, inst),
        Fxrstor => Ok(()), // FPU/MXCSR state is not modeled
        Stmxcsr => lift_store_const(fl, inst, 0x1F80, 4),
        Fstcw => lift_store_const(fl, inst, 0x037F, 2),
        Fstsw => lift_store_const(fl, inst, 0, 2),

        other => Err(LiftError::UnsupportedInstruction {
            addr: inst.addr,
            mnemonic: format!("{other:?}"),
        }),
    }
}

/// Store handling for packed results that cover the full 128 bits.
const FULL: UpperHandling = UpperHandling::Default;

#[derive(Clone, Copy)]
enum FpOp {
    Add,
    Sub,
    Mul,
    Div,
}

fn lift_fp_binop(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    op: FpOp,
    kind: DataKind,
) -> LiftResult<()> {
    let dst = fl.op_load(inst.op(0), kind, Align::Imp)?;
    let src = fl.op_load(inst.op(1), kind, Align::Imp)?;
    let res: BasicValueEnum<'_> = match (dst, src) {
        (BasicValueEnum::FloatValue(a), BasicValueEnum::FloatValue(b)) => {
            let bld = &fl.ctx.builder;
            match op {
                FpOp::Add => bld.build_float_add(a, b, "fadd").unwrap().into(),
                FpOp::Sub => bld.build_float_sub(a, b, "fsub").unwrap().into(),
                FpOp::Mul => bld.build_float_mul(a, b, "fmul").unwrap().into(),
                FpOp::Div => bld.build_float_div(a, b, "fdiv").unwrap().into(),
            }
        }
        (BasicValueEnum::VectorValue(a), BasicValueEnum::VectorValue(b)) => {
            let bld = &fl.ctx.builder;
            match op {
                FpOp::Add => bld.build_float_add(a, b, "fadd").unwrap().into(),
                FpOp::Sub => bld.build_float_sub(a, b, "fsub").unwrap().into(),
                FpOp::Mul => bld.build_float_mul(a, b, "fmul").unwrap().into(),
                FpOp::Div => bld.build_float_div(a, b, "fdiv").unwrap().into(),
            }
        }
        _ => {
            return Err(LiftError::InvalidOperand(
                "mismatched SSE operand types".into(),
            ))
        }
    };
    fl.op_store_vec(inst.op(0), res, FULL, Align::Imp)
}

/// MIN/MAX with the x86 NaN rule: on unordered inputs the second operand
/// wins, which an ordered compare against the first operand encodes exactly.
fn lift_fp_minmax(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    pred: FloatPredicate,
    kind: DataKind,
) -> LiftResult<()> {
    let dst = fl.op_load(inst.op(0), kind, Align::Imp)?;
    let src = fl.op_load(inst.op(1), kind, Align::Imp)?;
    let bld = &fl.ctx.builder;
    let res = match (dst, src) {
        (BasicValueEnum::FloatValue(a), BasicValueEnum::FloatValue(b)) => {
            let cmp = bld.build_float_compare(pred, a, b, "minmax").unwrap();
            bld.build_select(cmp, dst, src, "sel").unwrap()
        }
        (BasicValueEnum::VectorValue(a), BasicValueEnum::VectorValue(b)) => {
            let cmp = bld.build_float_compare(pred, a, b, "minmax").unwrap();
            bld.build_select(cmp, dst, src, "sel").unwrap()
        }
        _ => {
            return Err(LiftError::InvalidOperand(
                "mismatched SSE operand types".into(),
            ))
        }
    };
    fl.op_store_vec(inst.op(0), res, FULL, Align::Imp)
}

fn lift_sqrt(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: DataKind) -> LiftResult<()> {
    let src = fl.op_load(inst.op(1), kind, Align::Imp)?;
    let res = fl.unary_intrinsic("llvm.sqrt", src);
    fl.op_store_vec(inst.op(0), res, FULL, Align::Imp)
}

#[derive(Clone, Copy)]
enum BitVecOp {
    And,
    Or,
    Xor,
}

/// Bitwise vector ops work on the integer view regardless of the mnemonic's
/// nominal element type.
fn lift_int_logic(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    op: BitVecOp,
    negate_first: bool,
) -> LiftResult<()> {
    let dst = fl
        .op_load(inst.op(0), DataKind::Vi64, Align::Imp)?
        .into_vector_value();
    let src = fl
        .op_load(inst.op(1), DataKind::Vi64, Align::Imp)?
        .into_vector_value();
    let bld = &fl.ctx.builder;
    let lhs = if negate_first {
        bld.build_not(dst, "nand").unwrap()
    } else {
        dst
    };
    let res = match op {
        BitVecOp::And => bld.build_and(lhs, src, "and").unwrap(),
        BitVecOp::Or => bld.build_or(lhs, src, "or").unwrap(),
        BitVecOp::Xor => bld.build_xor(lhs, src, "xor").unwrap(),
    };
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

/// (U)COMISS/(U)COMISD: ZF/PF/CF encode the comparison, unordered sets all
/// three; OF, SF and AF are cleared.
fn lift_comis(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: DataKind) -> LiftResult<()> {
    let a = fl.op_load(inst.op(0), kind, Align::Imp)?.into_float_value();
    let b = fl.op_load(inst.op(1), kind, Align::Imp)?.into_float_value();
    let bld = &fl.ctx.builder;
    let zf = bld
        .build_float_compare(FloatPredicate::UEQ, a, b, "zf")
        .unwrap();
    let cf = bld
        .build_float_compare(FloatPredicate::ULT, a, b, "cf")
        .unwrap();
    let pf = bld
        .build_float_compare(FloatPredicate::UNO, a, b, "pf")
        .unwrap();
    let zero = fl.ctx.bool_type.const_zero();
    fl.set_flag(Facet::Zf, zf);
    fl.set_flag(Facet::Cf, cf);
    fl.set_flag(Facet::Pf, pf);
    fl.set_flag(Facet::Of, zero);
    fl.set_flag(Facet::Sf, zero);
    fl.set_flag(Facet::Af, zero);
    Ok(())
}

/// CMPSS/CMPPS/CMPSD/CMPPD with the eight SSE predicates; the result is an
/// all-ones/all-zeros mask per lane.
fn lift_fp_cmp(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: DataKind) -> LiftResult<()> {
    let imm = match *inst.op(2) {
        Operand::Imm { value, .. } => value as u8 & 0x7,
        ref other => {
            return Err(LiftError::InvalidOperand(format!(
                "compare predicate {other:?}"
            )))
        }
    };
    let pred = [
        FloatPredicate::OEQ,
        FloatPredicate::OLT,
        FloatPredicate::OLE,
        FloatPredicate::UNO,
        FloatPredicate::UNE,
        FloatPredicate::UGE,
        FloatPredicate::UGT,
        FloatPredicate::ORD,
    ][usize::from(imm)];

    let a = fl.op_load(inst.op(0), kind, Align::Imp)?;
    let b = fl.op_load(inst.op(1), kind, Align::Imp)?;
    let bld = &fl.ctx.builder;
    match (a, b) {
        (BasicValueEnum::FloatValue(x), BasicValueEnum::FloatValue(y)) => {
            let c = bld.build_float_compare(pred, x, y, "cmp").unwrap();
            let bits = if kind == DataKind::Sf32 { 32 } else { 64 };
            let mask = bld
                .build_int_s_extend(c, fl.ctx.int_type(bits), "mask")
                .unwrap();
            fl.op_store_vec(inst.op(0), mask.into(), FULL, Align::Imp)
        }
        (BasicValueEnum::VectorValue(x), BasicValueEnum::VectorValue(y)) => {
            let c = bld.build_float_compare(pred, x, y, "cmp").unwrap();
            let elem_bits = if kind == DataKind::Vf32 { 32u32 } else { 64 };
            let n = x.get_type().get_size();
            let mask_ty = fl.ctx.int_type(elem_bits).vec_type(n);
            let mask = bld.build_int_s_extend(c, mask_ty, "mask").unwrap();
            fl.op_store_vec(inst.op(0), mask.into(), FULL, Align::Imp)
        }
        _ => Err(LiftError::InvalidOperand(
            "mismatched SSE operand types".into(),
        )),
    }
}

/// MOVD/MOVQ between GP/memory and vector registers. The moved width is
/// fixed by the mnemonic; vector register operands narrow to it.
fn lift_mov_gx(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, bits: u32) -> LiftResult<()> {
    let v = match *inst.op(1) {
        Operand::Reg { reg: ArchReg::Vec(_), .. } => {
            let src = reg_of(inst.op(1))?;
            fl.get_reg(src, Facet::int(bits)).into_int_value()
        }
        _ => fl.op_load_int(inst.op(1), Align::None)?,
    };
    match *inst.op(0) {
        Operand::Reg { reg: ArchReg::Vec(_), .. } => {
            let dst = reg_of(inst.op(0))?;
            fl.store_vec_reg(dst, v.into(), UpperHandling::ZeroUpperAvx);
            Ok(())
        }
        _ => fl.op_store_gp(inst.op(0), v, Align::None),
    }
}

/// MOVSS/MOVSD. Register-to-register merges the low lane; a memory source
/// zeroes the rest of the register; a memory destination is a plain scalar
/// store.
fn lift_mov_scalar(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: DataKind) -> LiftResult<()> {
    let v = fl.op_load(inst.op(1), kind, Align::None)?;
    let uh = if matches!(*inst.op(1), Operand::Mem(_)) {
        UpperHandling::ZeroUpperAvx
    } else {
        UpperHandling::Default
    };
    fl.op_store_vec(inst.op(0), v, uh, Align::None)
}

fn lift_mov_packed(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    kind: DataKind,
    align: Align,
) -> LiftResult<()> {
    let v = fl.op_load(inst.op(1), kind, align)?;
    fl.op_store_vec(inst.op(0), v, FULL, align)
}

/// MOVLPS/MOVLPD/MOVHPS/MOVHPD move 64 bits between memory and one half of
/// an XMM register.
fn lift_mov_half(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    kind: DataKind,
    high: bool,
) -> LiftResult<()> {
    let to_reg = matches!(*inst.op(0), Operand::Reg { .. });
    if to_reg {
        let v = fl.op_load(inst.op(1), kind, Align::None)?;
        if !high {
            // Low half: a 64-bit partial store merges over the upper lanes.
            return fl.op_store_vec(inst.op(0), v, UpperHandling::Default, Align::None);
        }
        // High half: widen and blend lanes [0,1] of the register with the
        // loaded value.
        let reg = reg_of(inst.op(0))?;
        match v {
            BasicValueEnum::VectorValue(x) => {
                let cur = fl.get_reg(reg, Facet::V4F32).into_vector_value();
                let bld = &fl.ctx.builder;
                let wide = bld
                    .build_shuffle_vector(
                        x,
                        x.get_type().const_zero(),
                        fl.ctx.shuffle_mask(&[0, 1, 2, 2]),
                        "wide",
                    )
                    .unwrap();
                let res = bld
                    .build_shuffle_vector(cur, wide, fl.ctx.shuffle_mask(&[0, 1, 4, 5]), "movhps")
                    .unwrap();
                fl.store_vec_reg(reg, res.into(), UpperHandling::Default);
            }
            BasicValueEnum::FloatValue(x) => {
                let cur = fl.get_reg(reg, Facet::V2F64).into_vector_value();
                let res = fl
                    .ctx
                    .builder
                    .build_insert_element(cur, x, fl.ctx.lane(1), "movhpd")
                    .unwrap();
                fl.store_vec_reg(reg, res.into(), UpperHandling::Default);
            }
            _ => {
                return Err(LiftError::InvalidOperand(
                    "unexpected MOVH source type".into(),
                ))
            }
        }
        Ok(())
    } else {
        // Register to memory: extract the requested half.
        let reg = reg_of(inst.op(1))?;
        let half = if high { 1 } else { 0 };
        let pair = fl.get_reg(reg, Facet::V2I64).into_vector_value();
        let v = fl
            .ctx
            .builder
            .build_extract_element(pair, fl.ctx.lane(half), "half")
            .unwrap();
        fl.op_store_vec(inst.op(0), v, UpperHandling::Default, Align::None)
    }
}

fn reg_of(op: &Operand) -> LiftResult<ArchReg> {
    match *op {
        Operand::Reg { reg, .. } => Ok(reg),
        ref other => Err(LiftError::InvalidOperand(format!(
            "expected register operand, got {other:?}"
        ))),
    }
}

#[derive(Clone, Copy)]
enum CvtPacked {
    Dq2Ps,
    Ps2Dq,
    Ps2Pd,
    Pd2Ps,
}

fn lift_cvt_int_fp(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: DataKind) -> LiftResult<()> {
    let v = fl.op_load_int(inst.op(1), Align::None)?;
    let ty = if kind == DataKind::Sf32 {
        fl.ctx.f32_type
    } else {
        fl.ctx.f64_type
    };
    let res = fl
        .ctx
        .builder
        .build_signed_int_to_float(v, ty, "cvt")
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), UpperHandling::Default, Align::None)
}

fn lift_cvt_fp_int(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: DataKind) -> LiftResult<()> {
    let v = fl.op_load(inst.op(1), kind, Align::None)?.into_float_value();
    let bits = u32::from(inst.op(0).size()) * 8;
    let res = fl
        .ctx
        .builder
        .build_float_to_signed_int(v, fl.ctx.int_type(bits), "cvtt")
        .unwrap();
    fl.op_store_gp(inst.op(0), res, Align::None)
}

fn lift_cvt_scalar_fp(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, widen: bool) -> LiftResult<()> {
    if widen {
        let v = fl
            .op_load(inst.op(1), DataKind::Sf32, Align::None)?
            .into_float_value();
        let res = fl
            .ctx
            .builder
            .build_float_ext(v, fl.ctx.f64_type, "cvt")
            .unwrap();
        fl.op_store_vec(inst.op(0), res.into(), UpperHandling::Default, Align::None)
    } else {
        let v = fl
            .op_load(inst.op(1), DataKind::Sf64, Align::None)?
            .into_float_value();
        let res = fl
            .ctx
            .builder
            .build_float_trunc(v, fl.ctx.f32_type, "cvt")
            .unwrap();
        fl.op_store_vec(inst.op(0), res.into(), UpperHandling::Default, Align::None)
    }
}

fn lift_cvt_packed(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, cvt: CvtPacked) -> LiftResult<()> {
    match cvt {
        CvtPacked::Dq2Ps => {
            let v = fl
                .op_load(inst.op(1), DataKind::Vi32, Align::Imp)?
                .into_vector_value();
            let ty = fl.ctx.f32_type.vec_type(v.get_type().get_size());
            let res = fl
                .ctx
                .builder
                .build_signed_int_to_float(v, ty, "cvt")
                .unwrap();
            fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
        }
        CvtPacked::Ps2Dq => {
            let v = fl
                .op_load(inst.op(1), DataKind::Vf32, Align::Imp)?
                .into_vector_value();
            let ty = fl.ctx.i32_type.vec_type(v.get_type().get_size());
            let res = fl
                .ctx
                .builder
                .build_float_to_signed_int(v, ty, "cvtt")
                .unwrap();
            fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
        }
        CvtPacked::Ps2Pd => {
            let v = fl
                .op_load(inst.op(1), DataKind::Vf32, Align::None)?
                .into_vector_value();
            let bld = &fl.ctx.builder;
            let low = bld
                .build_shuffle_vector(
                    v,
                    v.get_type().get_undef(),
                    fl.ctx.shuffle_mask(&[0, 1]),
                    "low",
                )
                .unwrap();
            let res = bld
                .build_float_ext(low, fl.ctx.f64_type.vec_type(2), "cvt")
                .unwrap();
            fl.op_store_vec(inst.op(0), res.into(), FULL, Align::None)
        }
        CvtPacked::Pd2Ps => {
            let v = fl
                .op_load(inst.op(1), DataKind::Vf64, Align::Imp)?
                .into_vector_value();
            let bld = &fl.ctx.builder;
            let low = bld
                .build_float_trunc(v, fl.ctx.f32_type.vec_type(2), "cvt")
                .unwrap();
            // The upper 64 bits of the destination are zeroed.
            let res = bld
                .build_shuffle_vector(
                    low,
                    low.get_type().const_zero(),
                    fl.ctx.shuffle_mask(&[0, 1, 2, 2]),
                    "padded",
                )
                .unwrap();
            fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
        }
    }
}

/// Two-source lane shuffle with a fixed mask (unpack family).
fn lift_shuffle2(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    kind: DataKind,
    mask: &[u32],
) -> LiftResult<()> {
    let a = fl.op_load(inst.op(0), kind, Align::Imp)?.into_vector_value();
    let b = fl.op_load(inst.op(1), kind, Align::Imp)?.into_vector_value();
    let res = fl
        .ctx
        .builder
        .build_shuffle_vector(a, b, fl.ctx.shuffle_mask(mask), "unpck")
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

fn shuffle_imm(inst: &Inst<Mnemonic>) -> LiftResult<u8> {
    match *inst.op(2) {
        Operand::Imm { value, .. } => Ok(value as u8),
        ref other => Err(LiftError::InvalidOperand(format!(
            "shuffle selector {other:?}"
        ))),
    }
}

fn lift_shufps(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let sel = shuffle_imm(inst)?;
    let a = fl
        .op_load(inst.op(0), DataKind::Vf32, Align::Imp)?
        .into_vector_value();
    let b = fl
        .op_load(inst.op(1), DataKind::Vf32, Align::Imp)?
        .into_vector_value();
    let mask = [
        u32::from(sel) & 3,
        (u32::from(sel) >> 2) & 3,
        4 + ((u32::from(sel) >> 4) & 3),
        4 + ((u32::from(sel) >> 6) & 3),
    ];
    let res = fl
        .ctx
        .builder
        .build_shuffle_vector(a, b, fl.ctx.shuffle_mask(&mask), "shufps")
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

fn lift_shufpd(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let sel = shuffle_imm(inst)?;
    let a = fl
        .op_load(inst.op(0), DataKind::Vf64, Align::Imp)?
        .into_vector_value();
    let b = fl
        .op_load(inst.op(1), DataKind::Vf64, Align::Imp)?
        .into_vector_value();
    let mask = [u32::from(sel) & 1, 2 + ((u32::from(sel) >> 1) & 1)];
    let res = fl
        .ctx
        .builder
        .build_shuffle_vector(a, b, fl.ctx.shuffle_mask(&mask), "shufpd")
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

fn lift_pshufd(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let sel = shuffle_imm(inst)?;
    let src = fl
        .op_load(inst.op(1), DataKind::Vi32, Align::Imp)?
        .into_vector_value();
    let mask: Vec<u32> = (0..4).map(|i| (u32::from(sel) >> (2 * i)) & 3).collect();
    let res = fl
        .ctx
        .builder
        .build_shuffle_vector(
            src,
            src.get_type().get_undef(),
            fl.ctx.shuffle_mask(&mask),
            "pshufd",
        )
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

/// PSHUFLW (off = 0) / PSHUFHW (off = 4): shuffle one half of the eight
/// words, keep the other.
fn lift_pshufw(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, off: u32) -> LiftResult<()> {
    let sel = shuffle_imm(inst)?;
    let src = fl
        .op_load(inst.op(1), DataKind::Vi16, Align::Imp)?
        .into_vector_value();
    let mut mask = [0u32; 8];
    for (i, m) in mask.iter_mut().enumerate() {
        let i = i as u32;
        *m = if (off == 0) == (i < 4) {
            off + ((u32::from(sel) >> (2 * (i & 3))) & 3)
        } else {
            i
        };
    }
    let res = fl
        .ctx
        .builder
        .build_shuffle_vector(
            src,
            src.get_type().get_undef(),
            fl.ctx.shuffle_mask(&mask),
            "pshufw",
        )
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

fn insert_imm(inst: &Inst<Mnemonic>) -> LiftResult<u64> {
    match *inst.op(2) {
        Operand::Imm { value, .. } => Ok(value as u64),
        ref other => Err(LiftError::InvalidOperand(format!(
            "lane selector {other:?}"
        ))),
    }
}

fn lift_pinsr(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: DataKind) -> LiftResult<()> {
    let reg = reg_of(inst.op(0))?;
    let facet = facet_of(kind);
    let dst = fl.get_reg(reg, facet).into_vector_value();
    let lanes = dst.get_type().get_size();
    let lane = insert_imm(inst)? & u64::from(lanes - 1);

    let elem_bits = dst.get_type().get_element_type().into_int_type();
    let v = fl.op_load_int(inst.op(1), Align::None)?;
    let bld = &fl.ctx.builder;
    let v = if v.get_type().get_bit_width() > elem_bits.get_bit_width() {
        bld.build_int_truncate(v, elem_bits, "elem").unwrap()
    } else {
        v
    };
    let res = bld
        .build_insert_element(dst, v, fl.ctx.lane(lane), "pinsr")
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::None)
}

fn lift_pextr(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: DataKind) -> LiftResult<()> {
    let reg = reg_of(inst.op(1))?;
    let facet = facet_of(kind);
    let src = fl.get_reg(reg, facet).into_vector_value();
    let lanes = src.get_type().get_size();
    let lane = insert_imm(inst)? & u64::from(lanes - 1);

    let bld = &fl.ctx.builder;
    let elem = bld
        .build_extract_element(src, fl.ctx.lane(lane), "pextr")
        .unwrap()
        .into_int_value();
    let dst_bits = u32::from(inst.op(0).size()) * 8;
    let v = if dst_bits > elem.get_type().get_bit_width() {
        bld.build_int_z_extend(elem, fl.ctx.int_type(dst_bits), "ext")
            .unwrap()
    } else {
        elem
    };
    fl.op_store_gp(inst.op(0), v, Align::None)
}

fn facet_of(kind: DataKind) -> Facet {
    match kind {
        DataKind::Vi8 => Facet::V16I8,
        DataKind::Vi16 => Facet::V8I16,
        DataKind::Vi32 => Facet::V4I32,
        DataKind::Vi64 => Facet::V2I64,
        DataKind::Vf32 => Facet::V4F32,
        DataKind::Vf64 => Facet::V2F64,
        _ => unreachable!("scalar kind has no vector facet"),
    }
}

#[derive(Clone, Copy)]
enum IntVecOp {
    Add,
    Sub,
    Mul,
}

fn lift_int_binop(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    op: IntVecOp,
    kind: DataKind,
) -> LiftResult<()> {
    let a = fl.op_load(inst.op(0), kind, Align::Imp)?.into_vector_value();
    let b = fl.op_load(inst.op(1), kind, Align::Imp)?.into_vector_value();
    let bld = &fl.ctx.builder;
    let res = match op {
        IntVecOp::Add => bld.build_int_add(a, b, "padd").unwrap(),
        IntVecOp::Sub => bld.build_int_sub(a, b, "psub").unwrap(),
        IntVecOp::Mul => bld.build_int_mul(a, b, "pmul").unwrap(),
    };
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

fn lift_saturating(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    intrinsic: &str,
    kind: DataKind,
) -> LiftResult<()> {
    let a = fl.op_load(inst.op(0), kind, Align::Imp)?;
    let b = fl.op_load(inst.op(1), kind, Align::Imp)?;
    let res = fl.call_intrinsic(intrinsic, &[a.get_type()], &[a.into(), b.into()]);
    fl.op_store_vec(inst.op(0), res, FULL, Align::Imp)
}

/// PMULHW/PMULHUW: the high 16 bits of the 32-bit products.
fn lift_mulh(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, signed: bool) -> LiftResult<()> {
    let a = fl
        .op_load(inst.op(0), DataKind::Vi16, Align::Imp)?
        .into_vector_value();
    let b = fl
        .op_load(inst.op(1), DataKind::Vi16, Align::Imp)?
        .into_vector_value();
    let bld = &fl.ctx.builder;
    let wide_ty = fl.ctx.i32_type.vec_type(8);
    let (wa, wb) = if signed {
        (
            bld.build_int_s_extend(a, wide_ty, "wa").unwrap(),
            bld.build_int_s_extend(b, wide_ty, "wb").unwrap(),
        )
    } else {
        (
            bld.build_int_z_extend(a, wide_ty, "wa").unwrap(),
            bld.build_int_z_extend(b, wide_ty, "wb").unwrap(),
        )
    };
    let prod = bld.build_int_mul(wa, wb, "prod").unwrap();
    let sixteen = fl.ctx.i32_type.const_int(16, false);
    let splat = splat_vec(fl.ctx, sixteen, 8);
    let hi = bld.build_right_shift(prod, splat, false, "hi").unwrap();
    let res = bld
        .build_int_truncate(hi, fl.ctx.i16_type.vec_type(8), "pmulh")
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

/// PAVGB/PAVGW: unsigned average with +1 rounding.
fn lift_pavg(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: DataKind) -> LiftResult<()> {
    let a = fl.op_load(inst.op(0), kind, Align::Imp)?.into_vector_value();
    let b = fl.op_load(inst.op(1), kind, Align::Imp)?.into_vector_value();
    let elem_bits = a.get_type().get_element_type().into_int_type().get_bit_width();
    let n = a.get_type().get_size();
    let wide_ty = fl.ctx.int_type(elem_bits * 2).vec_type(n);
    let bld = &fl.ctx.builder;
    let wa = bld.build_int_z_extend(a, wide_ty, "wa").unwrap();
    let wb = bld.build_int_z_extend(b, wide_ty, "wb").unwrap();
    let sum = bld.build_int_add(wa, wb, "sum").unwrap();
    let one = fl.ctx.int_type(elem_bits * 2).const_int(1, false);
    let rounded = bld
        .build_int_add(sum, splat_vec(fl.ctx, one, n), "round")
        .unwrap();
    let shifted = bld
        .build_right_shift(rounded, splat_vec(fl.ctx, one, n), false, "avg")
        .unwrap();
    let res = bld
        .build_int_truncate(shifted, a.get_type(), "pavg")
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

fn lift_int_cmp(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    pred: IntPredicate,
    kind: DataKind,
) -> LiftResult<()> {
    let a = fl.op_load(inst.op(0), kind, Align::Imp)?.into_vector_value();
    let b = fl.op_load(inst.op(1), kind, Align::Imp)?.into_vector_value();
    let bld = &fl.ctx.builder;
    let c = bld.build_int_compare(pred, a, b, "pcmp").unwrap();
    let res = bld.build_int_s_extend(c, a.get_type(), "mask").unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

fn lift_int_minmax(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    pred: IntPredicate,
    kind: DataKind,
) -> LiftResult<()> {
    let a = fl.op_load(inst.op(0), kind, Align::Imp)?.into_vector_value();
    let b = fl.op_load(inst.op(1), kind, Align::Imp)?.into_vector_value();
    let bld = &fl.ctx.builder;
    let c = bld.build_int_compare(pred, a, b, "pminmax").unwrap();
    let res = bld.build_select(c, a, b, "sel").unwrap();
    fl.op_store_vec(inst.op(0), res, FULL, Align::Imp)
}

/// MOVMSK: pack the sign bit of every lane into a GP register.
fn lift_movmsk(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: DataKind) -> LiftResult<()> {
    let src = fl.op_load(inst.op(1), kind, Align::Imp)?.into_vector_value();
    let n = src.get_type().get_size();
    let bld = &fl.ctx.builder;
    let signs = bld
        .build_int_compare(
            IntPredicate::SLT,
            src,
            src.get_type().const_zero(),
            "signs",
        )
        .unwrap();
    let packed = bld
        .build_bit_cast(signs, fl.ctx.int_type(n), "packed")
        .unwrap()
        .into_int_value();
    let dst_bits = u32::from(inst.op(0).size()) * 8;
    let res = bld
        .build_int_z_extend(packed, fl.ctx.int_type(dst_bits), "movmsk")
        .unwrap();
    fl.op_store_gp(inst.op(0), res, Align::None)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VecShift {
    Shl,
    Shr,
    Sar,
}

/// Element-wise vector shifts. Counts come from an immediate or the low
/// 64 bits of an XMM register; counts at or above the element width zero the
/// result (or replicate the sign for arithmetic shifts).
fn lift_pshift(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    op: VecShift,
    kind: DataKind,
) -> LiftResult<()> {
    let v = fl.op_load(inst.op(0), kind, Align::Imp)?.into_vector_value();
    let elem_ty = v.get_type().get_element_type().into_int_type();
    let elem_bits = elem_ty.get_bit_width();
    let n = v.get_type().get_size();

    let count64 = match *inst.op(1) {
        Operand::Imm { value, .. } => fl.ctx.i64_type.const_int(value as u64, false),
        Operand::Reg { reg: ArchReg::Vec(_), .. } => {
            let r = reg_of(inst.op(1))?;
            fl.get_int(r, Facet::I64)
        }
        ref other => {
            return Err(LiftError::InvalidOperand(format!(
                "vector shift count {other:?}"
            )))
        }
    };

    let bld = &fl.ctx.builder;
    let in_range = bld
        .build_int_compare(
            IntPredicate::ULT,
            count64,
            fl.ctx.i64_type.const_int(u64::from(elem_bits), false),
            "inrange",
        )
        .unwrap();
    // Clamp so the shift itself stays well-defined; out-of-range results are
    // replaced below.
    let clamped = bld
        .build_select(
            in_range,
            count64,
            fl.ctx.i64_type.const_int(u64::from(elem_bits) - 1, false),
            "clamped",
        )
        .unwrap()
        .into_int_value();
    let amt = bld.build_int_truncate(clamped, elem_ty, "amt").unwrap();
    let amt_vec = splat_vec(fl.ctx, amt, n);

    let shifted = match op {
        VecShift::Shl => bld.build_left_shift(v, amt_vec, "pshift").unwrap(),
        VecShift::Shr => bld.build_right_shift(v, amt_vec, false, "pshift").unwrap(),
        VecShift::Sar => bld.build_right_shift(v, amt_vec, true, "pshift").unwrap(),
    };
    let out_of_range: VectorValue<'_> = match op {
        VecShift::Sar => {
            let full = elem_ty.const_int(u64::from(elem_bits) - 1, false);
            let full_vec = splat_vec(fl.ctx, full, n);
            bld.build_right_shift(v, full_vec, true, "signfill").unwrap()
        }
        _ => v.get_type().const_zero(),
    };
    let res = bld
        .build_select(in_range, shifted, out_of_range, "psel")
        .unwrap();
    fl.op_store_vec(inst.op(0), res, FULL, Align::Imp)
}

/// PSLLDQ/PSRLDQ shift the whole register by bytes.
fn lift_pshift_bytes(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, left: bool) -> LiftResult<()> {
    let n = match *inst.op(1) {
        Operand::Imm { value, .. } => (value as u64).min(16) as u32,
        ref other => {
            return Err(LiftError::InvalidOperand(format!(
                "byte shift count {other:?}"
            )))
        }
    };
    let v = fl
        .op_load(inst.op(0), DataKind::Vi8, Align::Imp)?
        .into_vector_value();
    let mut mask = [0u32; 16];
    for (i, m) in mask.iter_mut().enumerate() {
        let i = i as u32;
        *m = if left {
            // Zero lanes come from the second (zero) vector.
            if i < n { 16 } else { i - n }
        } else if i + n < 16 {
            i + n
        } else {
            16
        };
    }
    let res = fl
        .ctx
        .builder
        .build_shuffle_vector(
            v,
            v.get_type().const_zero(),
            fl.ctx.shuffle_mask(&mask),
            "pshiftdq",
        )
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

/// PACKSSWB/PACKUSWB/PACKSSDW: saturating narrowing of the concatenated
/// operands.
fn lift_pack(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    kind: DataKind,
    signed: bool,
) -> LiftResult<()> {
    let a = fl.op_load(inst.op(0), kind, Align::Imp)?.into_vector_value();
    let b = fl.op_load(inst.op(1), kind, Align::Imp)?.into_vector_value();
    let n = a.get_type().get_size();
    let elem_ty = a.get_type().get_element_type().into_int_type();
    let elem_bits = elem_ty.get_bit_width();

    let bld = &fl.ctx.builder;
    let mask: Vec<u32> = (0..2 * n).collect();
    let joined = bld
        .build_shuffle_vector(a, b, fl.ctx.shuffle_mask(&mask), "joined")
        .unwrap();

    let (lo, hi) = if signed {
        let half = 1i64 << (elem_bits / 2 - 1);
        (-half, half - 1)
    } else {
        (0, (1i64 << (elem_bits / 2)) - 1)
    };
    let lo_splat = splat_vec(fl.ctx, elem_ty.const_int(lo as u64, true), 2 * n);
    let hi_splat = splat_vec(fl.ctx, elem_ty.const_int(hi as u64, true), 2 * n);

    let too_small = bld
        .build_int_compare(IntPredicate::SLT, joined, lo_splat, "toosmall")
        .unwrap();
    let clamped = bld
        .build_select(too_small, lo_splat, joined, "clamplo")
        .unwrap()
        .into_vector_value();
    let too_big = bld
        .build_int_compare(IntPredicate::SGT, clamped, hi_splat, "toobig")
        .unwrap();
    let clamped = bld
        .build_select(too_big, hi_splat, clamped, "clamphi")
        .unwrap()
        .into_vector_value();

    let narrow_ty = fl.ctx.int_type(elem_bits / 2).vec_type(2 * n);
    let res = bld
        .build_int_truncate(clamped, narrow_ty, "pack")
        .unwrap();
    fl.op_store_vec(inst.op(0), res.into(), FULL, Align::Imp)
}

fn lift_prefetch(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let mem = match *inst.op(0) {
        Operand::Mem(ref m) => *m,
        ref other => {
            return Err(LiftError::InvalidOperand(format!(
                "prefetch operand {other:?}"
            )))
        }
    };
    let addr = fl.op_addr(&mem, Facet::I8)?;
    let i32t = fl.ctx.i32_type;
    fl.call_intrinsic(
        "llvm.prefetch",
        &[fl.ctx.ptr_type.into()],
        &[
            addr.into(),
            i32t.const_zero().into(),           // read
            i32t.const_int(3, false).into(),    // high locality
            i32t.const_int(1, false).into(),    // data cache
        ],
    );
    Ok(())
}

/// FXSAVE: zero the 512-byte area, then store the architectural defaults for
/// the FPU control word and MXCSR.
fn lift_fxsave(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let mem = match *inst.op(0) {
        Operand::Mem(ref m) => *m,
        ref other => {
            return Err(LiftError::InvalidOperand(format!(
                "fxsave operand {other:?}"
            )))
        }
    };
    let base = fl.op_addr(&mem, Facet::I8)?;
    let bld = &fl.ctx.builder;
    bld.build_memset(
        base,
        16,
        fl.ctx.i8_type.const_zero(),
        fl.ctx.i64_type.const_int(512, false),
    )
    .unwrap();
    // FPU control word at offset 0x00.
    bld.build_store(base, fl.ctx.i16_type.const_int(0x037F, false))
        .unwrap();
    // MXCSR at offset 0x18.
    let mxcsr = unsafe {
        bld.build_gep(
            base,
            &[fl.ctx.i64_type.const_int(0x18, false)],
            "mxcsr",
        )
    }
    .unwrap();
    bld.build_store(mxcsr, fl.ctx.i32_type.const_int(0x1F80, false))
        .unwrap();
    Ok(())
}

/// STMXCSR/FSTCW/FSTSW store a fixed default; the control state is not
/// modeled.
fn lift_store_const(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    value: u64,
    size: u8,
) -> LiftResult<()> {
    let v = fl.ctx.int_type(u32::from(size) * 8).const_int(value, false);
    fl.op_store_gp(inst.op(0), v, Align::None)
}

/// Splat a scalar into an `n`-lane vector.
fn splat_vec<'ctx>(ctx: &LlvmContext<'ctx>, v: IntValue<'ctx>, n: u32) -> VectorValue<'ctx> {
    let ty = v.get_type().vec_type(n);
    let seed = ctx
        .builder
        .build_insert_element(ty.get_undef(), v, ctx.lane(0), "splat0")
        .unwrap();
    ctx.builder
        .build_shuffle_vector(
            seed,
            ty.get_undef(),
            ctx.shuffle_mask(&vec![0; n as usize]),
            "splat",
        )
        .unwrap()
}
