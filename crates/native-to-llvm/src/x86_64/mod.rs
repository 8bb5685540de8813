// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! x86-64 instruction lifting
//!
//! One clause per supported mnemonic, built on the shared operand and flag
//! engines. SSE/AVX families live in [`sse`], the REP string-loop driver in
//! [`string`].

mod sse;
mod string;

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
use crate::inst::{Inst, Operand};
use crate::regfile::ArchReg;

/// The sixteen x86 condition codes, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    O,
    No,
    C,
    Nc,
    Z,
    Nz,
    Be,
    A,
    S,
    Ns,
    P,
    Np,
    L,
    Ge,
    Le,
    G,
}

/// x86-64 mnemonics understood by the lifter.
///
/// Condition-code families carry their condition; the decoder folds the 16
/// encodings of each into one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Nop,
    /// Decoded successfully but not covered by any clause below.
    Unsupported,
    // Data movement
    Mov,
    Movzx,
    Movsx,
    Movbe,
    Bswap,
    Xchg,
    Cmpxchg,
    Lea,
    // Arithmetic
    Add,
    Adc,
    Sub,
    Sbb,
    Cmp,
    Neg,
    Inc,
    Dec,
    // Logic
    And,
    Or,
    Xor,
    Not,
    Test,
    // Shifts and rotates
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
    Rcl,
    Rcr,
    Shld,
    Shrd,
    // Multiply and divide
    Mul,
    Imul,
    Div,
    Idiv,
    // Conditional
    Cmovcc(Cond),
    Setcc(Cond),
    // Bit scan and test
    Bsf,
    Bsr,
    Bt,
    Bts,
    Btr,
    Btc,
    // Stack
    Push,
    Pop,
    Pushf,
    Popf,
    Leave,
    Lahf,
    Sahf,
    // Sign extension idioms
    Cbw,
    Cwde,
    Cdqe,
    Cwd,
    Cdq,
    Cqo,
    // Flag manipulation
    Clc,
    Stc,
    Cmc,
    Cld,
    Std,
    // String operations (REP handled via the prefix on the record)
    Lods,
    Stos,
    Movs,
    Scas,
    Cmps,
    // Control transfer
    Jmp,
    Jcc(Cond),
    Call,
    Ret,
    Loop,
    Jcxz,
    // SSE data movement
    Movd,
    Movq,
    Movss,
    Movsd,
    Movups,
    Movupd,
    Movaps,
    Movapd,
    Movdqu,
    Movdqa,
    Movnt,
    Movlps,
    Movlpd,
    Movhps,
    Movhpd,
    // SSE arithmetic
    Addss,
    Addsd,
    Addps,
    Addpd,
    Subss,
    Subsd,
    Subps,
    Subpd,
    Mulss,
    Mulsd,
    Mulps,
    Mulpd,
    Divss,
    Divsd,
    Divps,
    Divpd,
    Minss,
    Minsd,
    Minps,
    Minpd,
    Maxss,
    Maxsd,
    Maxps,
    Maxpd,
    Sqrtss,
    Sqrtsd,
    Sqrtps,
    Sqrtpd,
    // SSE logic
    Andps,
    Andpd,
    Andnps,
    Andnpd,
    Orps,
    Orpd,
    Xorps,
    Xorpd,
    Pand,
    Pandn,
    Por,
    Pxor,
    // SSE compare
    Comiss,
    Comisd,
    Cmpss,
    Cmpsd,
    Cmpps,
    Cmppd,
    // Conversions
    Cvtsi2ss,
    Cvtsi2sd,
    Cvttss2si,
    Cvttsd2si,
    Cvtss2sd,
    Cvtsd2ss,
    Cvtdq2ps,
    Cvttps2dq,
    Cvtps2pd,
    Cvtpd2ps,
    // Shuffles, packs, unpacks
    Unpcklps,
    Unpcklpd,
    Unpckhps,
    Unpckhpd,
    Punpcklbw,
    Punpcklwd,
    Punpckldq,
    Punpcklqdq,
    Punpckhbw,
    Punpckhwd,
    Punpckhdq,
    Punpckhqdq,
    Shufps,
    Shufpd,
    Pshufd,
    Pshuflw,
    Pshufhw,
    Pinsrb,
    Pinsrw,
    Pinsrd,
    Pinsrq,
    Pextrb,
    Pextrw,
    Pextrd,
    Pextrq,
    Packsswb,
    Packssdw,
    Packuswb,
    // Packed integer arithmetic
    Paddb,
    Paddw,
    Paddd,
    Paddq,
    Psubb,
    Psubw,
    Psubd,
    Psubq,
    Paddsb,
    Paddsw,
    Paddusb,
    Paddusw,
    Psubsb,
    Psubsw,
    Psubusb,
    Psubusw,
    Pmullw,
    Pmulhw,
    Pmulhuw,
    Pavgb,
    Pavgw,
    Pcmpeqb,
    Pcmpeqw,
    Pcmpeqd,
    Pcmpgtb,
    Pcmpgtw,
    Pcmpgtd,
    Pminub,
    Pmaxub,
    Pminsw,
    Pmaxsw,
    Pmovmskb,
    Movmskps,
    Movmskpd,
    Psllw,
    Pslld,
    Psllq,
    Psrlw,
    Psrld,
    Psrlq,
    Psraw,
    Psrad,
    Pslldq,
    Psrldq,
    // Fences, prefetch, state save
    Lfence,
    Mfence,
    Sfence,
    Prefetch,
    Fxsave,
    Fxrstor,
    Stmxcsr,
    Fstcw,
    Fstsw,
}

/// Marker type for the x86-64 ISA.
pub(crate) struct X86_64;

impl Isa for X86_64 {
    type Mnemonic = Mnemonic;

    const NAME: &'static str = "x86_64";

    fn decode(src: &dyn CodeSource, addr: u64) -> LiftResult<Inst<Mnemonic>> {
        decode::x86::decode(src, addr)
    }

    fn state_regs(config: &LiftConfig<'_>) -> Vec<(ArchReg, Facet)> {
        let _ = config;
        let mut regs = vec![(ArchReg::Ip, Facet::I64)];
        regs.extend((0..16).map(|i| (ArchReg::Gp(i), Facet::I64)));
        regs.extend((0..16).map(|i| (ArchReg::Vec(i), Facet::IVec)));
        regs.extend(
            [
                Facet::Zf,
                Facet::Sf,
                Facet::Pf,
                Facet::Af,
                Facet::Cf,
                Facet::Of,
                Facet::Df,
            ]
            .into_iter()
            .map(|f| (ArchReg::Flags, f)),
        );
        regs
    }

    fn cpu_type<'ctx>(ctx: &LlvmContext<'ctx>, config: &LiftConfig<'ctx>) -> StructType<'ctx> {
        let ivec = ctx.int_type(config.vector_size.bits());
        ctx.context.struct_type(
            &[
                ctx.i64_type.into(),               // rip
                ctx.i64_type.array_type(16).into(), // gp registers
                ivec.array_type(16).into(),         // vector registers
                ctx.i8_type.array_type(7).into(),   // flags: Z S P A C O D
            ],
            false,
        )
    }

    fn cpu_slot(reg: ArchReg, facet: Facet) -> (u32, Option<u64>) {
        match (reg, facet) {
            (ArchReg::Ip, _) => (0, None),
            (ArchReg::Gp(i), _) => (1, Some(u64::from(i))),
            (ArchReg::Vec(i), _) => (2, Some(u64::from(i))),
            (ArchReg::Flags, Facet::Zf) => (3, Some(0)),
            (ArchReg::Flags, Facet::Sf) => (3, Some(1)),
            (ArchReg::Flags, Facet::Pf) => (3, Some(2)),
            (ArchReg::Flags, Facet::Af) => (3, Some(3)),
            (ArchReg::Flags, Facet::Cf) => (3, Some(4)),
            (ArchReg::Flags, Facet::Of) => (3, Some(5)),
            (ArchReg::Flags, Facet::Df) => (3, Some(6)),
            other => unreachable!("no x86-64 state slot for {other:?}"),
        }
    }

    fn lift<'a, 'ctx>(
        fl: &mut FunctionLifter<'a, 'ctx, Self>,
        inst: &Inst<Mnemonic>,
    ) -> LiftResult<()> {
        lift_inst(fl, inst)
    }
}

type Fl<'a, 'b, 'ctx> = &'a mut FunctionLifter<'b, 'ctx, X86_64>;

fn lift_inst(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    use Mnemonic::*;
    match inst.mnemonic {
        Nop => {}

        Mov => {
            let v = fl.op_load_int(inst.op(1), Align::None)?;
            fl.op_store_gp(inst.op(0), v, Align::None)?;
        }
        Movzx => lift_mov_ext(fl, inst, false)?,
        Movsx => lift_mov_ext(fl, inst, true)?,
        Movbe => {
            let v = fl.op_load_int(inst.op(1), Align::None)?;
            let v = fl.unary_intrinsic("llvm.bswap", v.into()).into_int_value();
            fl.op_store_gp(inst.op(0), v, Align::None)?;
        }
        Bswap => {
            let v = fl.op_load_int(inst.op(0), Align::None)?;
            let v = fl.unary_intrinsic("llvm.bswap", v.into()).into_int_value();
            fl.op_store_gp(inst.op(0), v, Align::None)?;
        }
        Xchg => {
            let a = fl.op_load_int(inst.op(0), Align::None)?;
            let b = fl.op_load_int(inst.op(1), Align::None)?;
            fl.op_store_gp(inst.op(0), b, Align::None)?;
            fl.op_store_gp(inst.op(1), a, Align::None)?;
        }
        Cmpxchg => lift_cmpxchg(fl, inst)?,
        Lea => lift_lea(fl, inst)?,

        Add => lift_arith(fl, inst, ArithOp::Add)?,
        Adc => lift_arith(fl, inst, ArithOp::Adc)?,
        Sub => lift_arith(fl, inst, ArithOp::Sub)?,
        Sbb => lift_arith(fl, inst, ArithOp::Sbb)?,
        Cmp => lift_arith(fl, inst, ArithOp::Cmp)?,
        Neg => lift_neg(fl, inst)?,
        Inc => lift_inc_dec(fl, inst, true)?,
        Dec => lift_inc_dec(fl, inst, false)?,

        And => lift_logic(fl, inst, BitOp::And, true)?,
        Or => lift_logic(fl, inst, BitOp::Or, true)?,
        Xor => lift_logic(fl, inst, BitOp::Xor, true)?,
        Test => lift_logic(fl, inst, BitOp::And, false)?,
        Not => {
            let v = fl.op_load_int(inst.op(0), Align::None)?;
            let r = fl.ctx.builder.build_not(v, "not").unwrap();
            fl.op_store_gp(inst.op(0), r, Align::None)?;
        }

        Shl => lift_shift(fl, inst, ShiftKind::Shl)?,
        Shr => lift_shift(fl, inst, ShiftKind::Shr)?,
        Sar => lift_shift(fl, inst, ShiftKind::Sar)?,
        Rol => lift_rotate(fl, inst, true)?,
        Ror => lift_rotate(fl, inst, false)?,
        Rcl => lift_rotate_carry(fl, inst, true)?,
        Rcr => lift_rotate_carry(fl, inst, false)?,
        Shld => lift_shift_double(fl, inst, true)?,
        Shrd => lift_shift_double(fl, inst, false)?,

        Mul => lift_mul(fl, inst, false)?,
        Imul => lift_mul(fl, inst, true)?,
        Div => lift_div(fl, inst, false)?,
        Idiv => lift_div(fl, inst, true)?,

        Cmovcc(cond) => {
            let take = fl.flag_cond(cond);
            let src = fl.op_load_int(inst.op(1), Align::None)?;
            let cur = fl.op_load_int(inst.op(0), Align::None)?;
            let res = fl
                .ctx
                .builder
                .build_select(take, src, cur, "cmov")
                .unwrap()
                .into_int_value();
            fl.op_store_gp(inst.op(0), res, Align::None)?;
        }
        Setcc(cond) => {
            let c = fl.flag_cond(cond);
            let v = fl
                .ctx
                .builder
                .build_int_z_extend(c, fl.ctx.i8_type, "setcc")
                .unwrap();
            fl.op_store_gp(inst.op(0), v, Align::None)?;
        }

        Bsf => lift_bitscan(fl, inst, true)?,
        Bsr => lift_bitscan(fl, inst, false)?,
        Bt | Bts | Btr | Btc => lift_bittest(fl, inst)?,

        Push => {
            let v = fl.op_load_int(inst.op(0), Align::None)?;
            fl.stack_push(v);
        }
        Pop => {
            let v = fl.stack_pop();
            fl.op_store_gp(inst.op(0), v, Align::None)?;
        }
        Pushf => {
            let v = fl.flag_as_reg(u32::from(inst.opsize) * 8);
            fl.stack_push(v);
        }
        Popf => {
            let v = fl.stack_pop();
            fl.flag_from_reg(v);
        }
        Leave => {
            let v = fl.stack_pop_from(ArchReg::RBP);
            fl.store_gp(ArchReg::RBP, 8, false, v);
        }
        Lahf => {
            let v = fl.flag_as_reg(8);
            fl.store_gp(ArchReg::RAX, 1, true, v);
        }
        Sahf => {
            let v = fl.get_reg(ArchReg::RAX, Facet::I8H).into_int_value();
            fl.flag_from_reg(v);
        }

        Cbw => lift_cext(fl, 2)?,
        Cwde => lift_cext(fl, 4)?,
        Cdqe => lift_cext(fl, 8)?,
        Cwd => lift_csep(fl, 2)?,
        Cdq => lift_csep(fl, 4)?,
        Cqo => lift_csep(fl, 8)?,

        Clc => {
            let f = fl.ctx.bool_type.const_zero();
            fl.set_flag(Facet::Cf, f);
        }
        Stc => {
            let t = fl.ctx.bool_type.const_all_ones();
            fl.set_flag(Facet::Cf, t);
        }
        Cmc => {
            let c = fl.get_flag(Facet::Cf);
            let n = fl.ctx.builder.build_not(c, "cmc").unwrap();
            fl.set_flag(Facet::Cf, n);
        }
        Cld => {
            let f = fl.ctx.bool_type.const_zero();
            fl.set_flag(Facet::Df, f);
        }
        Std => {
            let t = fl.ctx.bool_type.const_all_ones();
            fl.set_flag(Facet::Df, t);
        }

        Lods | Stos | Movs | Scas | Cmps => string::lift_string(fl, inst)?,

        Jmp => lift_jmp(fl, inst)?,
        Jcc(cond) => {
            let c = fl.flag_cond(cond);
            let target = branch_target(inst)?;
            fl.cond_branch(c, target, inst.end())?;
        }
        Call => lift_call(fl, inst)?,
        Ret => {
            let ip = fl.stack_pop();
            fl.set_reg(ArchReg::Ip, Facet::I64, ip.into(), true);
            // `ret imm16` releases caller-pushed arguments.
            if let Some(&Operand::Imm { value, .. }) = inst.operands.first() {
                let rsp = fl.get_int(ArchReg::RSP, Facet::I64);
                let adj = fl
                    .ctx
                    .builder
                    .build_int_add(rsp, fl.ctx.i64_type.const_int(value as u64, false), "rsp")
                    .unwrap();
                fl.set_reg(ArchReg::RSP, Facet::I64, adj.into(), true);
            }
            fl.emit_exit();
        }
        Loop => {
            let rcx = fl.get_int(ArchReg::RCX, Facet::I64);
            let dec = fl
                .ctx
                .builder
                .build_int_sub(rcx, fl.ctx.i64_type.const_int(1, false), "loopctr")
                .unwrap();
            fl.set_reg(ArchReg::RCX, Facet::I64, dec.into(), true);
            let again = fl
                .ctx
                .builder
                .build_int_compare(
                    IntPredicate::NE,
                    dec,
                    fl.ctx.i64_type.const_zero(),
                    "again",
                )
                .unwrap();
            let target = branch_target(inst)?;
            fl.cond_branch(again, target, inst.end())?;
        }
        Jcxz => {
            let rcx = fl.get_int(ArchReg::RCX, Facet::I64);
            let zero = fl
                .ctx
                .builder
                .build_int_compare(
                    IntPredicate::EQ,
                    rcx,
                    fl.ctx.i64_type.const_zero(),
                    "cxz",
                )
                .unwrap();
            let target = branch_target(inst)?;
            fl.cond_branch(zero, target, inst.end())?;
        }

        Lfence | Mfence | Sfence => {
            fl.ctx
                .builder
                .build_fence(inkwell::AtomicOrdering::SequentiallyConsistent, 0, "")
                .unwrap();
        }

        Unsupported => {
            return Err(LiftError::UnsupportedInstruction {
                addr: inst.addr,
                mnemonic: "unrecognized mnemonic".into(),
            })
        }

        // Everything else is an SSE family.
        m => sse::lift_sse(fl, inst, m)?,
    }
    Ok(())
}

/// The direct target of a branch instruction (absolute, from the decoder).
fn branch_target(inst: &Inst<Mnemonic>) -> LiftResult<u64> {
    match *inst.op(0) {
        Operand::Imm { value, .. } => Ok(value as u64),
        ref other => Err(LiftError::InvalidOperand(format!(
            "direct branch with operand {other:?}"
        ))),
    }
}

fn lift_mov_ext(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, sign: bool) -> LiftResult<()> {
    let v = fl.op_load_int(inst.op(1), Align::None)?;
    let dst_bits = u32::from(inst.op(0).size()) * 8;
    let ty = fl.ctx.int_type(dst_bits);
    let b = &fl.ctx.builder;
    let ext = if sign {
        b.build_int_s_extend(v, ty, "movsx").unwrap()
    } else {
        b.build_int_z_extend(v, ty, "movzx").unwrap()
    };
    fl.op_store_gp(inst.op(0), ext, Align::None)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Adc,
    Sub,
    Sbb,
    Cmp,
}

fn lift_arith(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, op: ArithOp) -> LiftResult<()> {
    let lhs = fl.op_load_int(inst.op(0), Align::None)?;
    let rhs = fl.op_load_int(inst.op(1), Align::None)?;
    let ty = lhs.get_type();

    let res = match op {
        ArithOp::Add => {
            let res = fl.ctx.builder.build_int_add(lhs, rhs, "add").unwrap();
            fl.flag_calc_add(res, lhs, rhs);
            res
        }
        ArithOp::Sub | ArithOp::Cmp => {
            let res = fl.ctx.builder.build_int_sub(lhs, rhs, "sub").unwrap();
            fl.flag_calc_sub(res, lhs, rhs);
            res
        }
        ArithOp::Adc => {
            let cf = fl.get_flag(Facet::Cf);
            let b = &fl.ctx.builder;
            let cin = b.build_int_z_extend(cf, ty, "cin").unwrap();
            let sum = b.build_int_add(lhs, rhs, "sum").unwrap();
            let res = b.build_int_add(sum, cin, "adc").unwrap();
            let c1 = b
                .build_int_compare(IntPredicate::ULT, sum, lhs, "c1")
                .unwrap();
            let c2 = b
                .build_int_compare(IntPredicate::ULT, res, sum, "c2")
                .unwrap();
            let carry = b.build_or(c1, c2, "cf").unwrap();
            fl.flag_calc_z(res);
            fl.flag_calc_s(res);
            fl.flag_calc_p(res);
            fl.flag_calc_a(res, lhs, rhs);
            fl.flag_calc_o_add(res, lhs, rhs);
            fl.set_flag(Facet::Cf, carry);
            res
        }
        ArithOp::Sbb => {
            let cf = fl.get_flag(Facet::Cf);
            let b = &fl.ctx.builder;
            let cin = b.build_int_z_extend(cf, ty, "cin").unwrap();
            let diff = b.build_int_sub(lhs, rhs, "diff").unwrap();
            let res = b.build_int_sub(diff, cin, "sbb").unwrap();
            let c1 = b
                .build_int_compare(IntPredicate::ULT, lhs, rhs, "c1")
                .unwrap();
            let c2 = b
                .build_int_compare(IntPredicate::ULT, diff, cin, "c2")
                .unwrap();
            let borrow = b.build_or(c1, c2, "cf").unwrap();
            fl.flag_calc_z(res);
            fl.flag_calc_s(res);
            fl.flag_calc_p(res);
            fl.flag_calc_a(res, lhs, rhs);
            fl.flag_calc_o_sub(res, lhs, rhs);
            fl.set_flag(Facet::Cf, borrow);
            res
        }
    };

    if op != ArithOp::Cmp {
        fl.op_store_gp(inst.op(0), res, Align::None)?;
    }
    Ok(())
}

fn lift_neg(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let v = fl.op_load_int(inst.op(0), Align::None)?;
    let zero = v.get_type().const_zero();
    let res = fl.ctx.builder.build_int_sub(zero, v, "neg").unwrap();
    fl.flag_calc_sub(res, zero, v);
    fl.op_store_gp(inst.op(0), res, Align::None)
}

/// INC and DEC update all arithmetic flags except CF.
fn lift_inc_dec(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, inc: bool) -> LiftResult<()> {
    let v = fl.op_load_int(inst.op(0), Align::None)?;
    let one = v.get_type().const_int(1, false);
    let b = &fl.ctx.builder;
    let res = if inc {
        b.build_int_add(v, one, "inc").unwrap()
    } else {
        b.build_int_sub(v, one, "dec").unwrap()
    };
    fl.flag_calc_z(res);
    fl.flag_calc_s(res);
    fl.flag_calc_p(res);
    fl.flag_calc_a(res, v, one);
    if inc {
        fl.flag_calc_o_add(res, v, one);
    } else {
        fl.flag_calc_o_sub(res, v, one);
    }
    fl.op_store_gp(inst.op(0), res, Align::None)
}

#[derive(Clone, Copy)]
enum BitOp {
    And,
    Or,
    Xor,
}

fn lift_logic(
    fl: Fl<'_, '_, '_>,
    inst: &Inst<Mnemonic>,
    op: BitOp,
    writeback: bool,
) -> LiftResult<()> {
    let lhs = fl.op_load_int(inst.op(0), Align::None)?;
    let rhs = fl.op_load_int(inst.op(1), Align::None)?;
    let b = &fl.ctx.builder;
    let res = match op {
        BitOp::And => b.build_and(lhs, rhs, "and").unwrap(),
        BitOp::Or => b.build_or(lhs, rhs, "or").unwrap(),
        BitOp::Xor => b.build_xor(lhs, rhs, "xor").unwrap(),
    };
    fl.flag_calc_logic(res);
    if writeback {
        fl.op_store_gp(inst.op(0), res, Align::None)?;
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ShiftKind {
    Shl,
    Shr,
    Sar,
}

/// SHL/SHR/SAR. The count is masked to the operand width; a zero count
/// leaves C, O, Z, S and P unchanged (AF is untouched either way).
fn lift_shift(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, kind: ShiftKind) -> LiftResult<()> {
    let val = fl.op_load_int(inst.op(0), Align::None)?;
    let ty = val.get_type();
    let width = ty.get_bit_width();

    let raw = fl.op_load_int(inst.op(1), Align::None)?;
    let count = fl.uint_to(raw, ty);
    let b = &fl.ctx.builder;
    let count = b
        .build_and(count, ty.const_int(u64::from(width) - 1, false), "count")
        .unwrap();

    let res = match kind {
        ShiftKind::Shl => b.build_left_shift(val, count, "shl").unwrap(),
        ShiftKind::Shr => b.build_right_shift(val, count, false, "shr").unwrap(),
        ShiftKind::Sar => b.build_right_shift(val, count, true, "sar").unwrap(),
    };

    let is_zero = b
        .build_int_compare(IntPredicate::EQ, count, ty.const_zero(), "nozero")
        .unwrap();

    // Carry is the last bit shifted out.
    let carry = match kind {
        ShiftKind::Shl => {
            let inv = b
                .build_int_sub(ty.const_int(u64::from(width), false), count, "inv")
                .unwrap();
            b.build_right_shift(val, inv, false, "cbit").unwrap()
        }
        ShiftKind::Shr | ShiftKind::Sar => {
            let m1 = b
                .build_int_sub(count, ty.const_int(1, false), "m1")
                .unwrap();
            b.build_right_shift(val, m1, kind == ShiftKind::Sar, "cbit")
                .unwrap()
        }
    };
    let carry = b
        .build_int_truncate(carry, fl.ctx.bool_type, "cf")
        .unwrap();

    let overflow = match kind {
        ShiftKind::Shl => {
            let m = b
                .build_int_compare(IntPredicate::SLT, res, ty.const_zero(), "msb")
                .unwrap();
            b.build_xor(carry, m, "of").unwrap()
        }
        ShiftKind::Shr => b
            .build_int_compare(IntPredicate::SLT, val, ty.const_zero(), "msb")
            .unwrap(),
        ShiftKind::Sar => fl.ctx.bool_type.const_zero(),
    };

    select_flags_on_zero_count(fl, is_zero, res, carry, overflow)?;
    fl.op_store_gp(inst.op(0), res, Align::None)
}

/// Install shift-family flags, keeping the previous values when the masked
/// count was zero.
fn select_flags_on_zero_count<'ctx>(
    fl: Fl<'_, '_, 'ctx>,
    is_zero: IntValue<'ctx>,
    res: IntValue<'ctx>,
    carry: IntValue<'ctx>,
    overflow: IntValue<'ctx>,
) -> LiftResult<()> {
    let zero = res.get_type().const_zero();
    let z = fl
        .ctx
        .builder
        .build_int_compare(IntPredicate::EQ, res, zero, "zf")
        .unwrap();
    let s = fl
        .ctx
        .builder
        .build_int_compare(IntPredicate::SLT, res, zero, "sf")
        .unwrap();
    // Parity of the low byte, as in flag_calc_p.
    let low = if res.get_type().get_bit_width() > 8 {
        fl.ctx
            .builder
            .build_int_truncate(res, fl.ctx.i8_type, "low8")
            .unwrap()
    } else {
        res
    };
    let pop = fl
        .call_intrinsic("llvm.ctpop", &[fl.ctx.i8_type.into()], &[low.into()])
        .into_int_value();
    let pbit = fl
        .ctx
        .builder
        .build_and(pop, fl.ctx.i8_type.const_int(1, false), "popbit")
        .unwrap();
    let p = fl
        .ctx
        .builder
        .build_int_compare(IntPredicate::EQ, pbit, fl.ctx.i8_type.const_zero(), "pf")
        .unwrap();

    for (facet, new) in [
        (Facet::Zf, z),
        (Facet::Sf, s),
        (Facet::Pf, p),
        (Facet::Cf, carry),
        (Facet::Of, overflow),
    ] {
        let old = fl.get_flag(facet);
        let sel = fl
            .ctx
            .builder
            .build_select(is_zero, old, new, "flagsel")
            .unwrap()
            .into_int_value();
        fl.set_flag(facet, sel);
    }
    Ok(())
}

fn lift_rotate(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, left: bool) -> LiftResult<()> {
    let val = fl.op_load_int(inst.op(0), Align::None)?;
    let ty = val.get_type();
    let width = ty.get_bit_width();
    let raw = fl.op_load_int(inst.op(1), Align::None)?;
    let count = fl.uint_to(raw, ty);
    let count = fl
        .ctx
        .builder
        .build_and(count, ty.const_int(u64::from(width) - 1, false), "count")
        .unwrap();
    let intr = if left { "llvm.fshl" } else { "llvm.fshr" };
    let res = fl
        .call_intrinsic(
            intr,
            &[ty.into()],
            &[val.into(), val.into(), count.into()],
        )
        .into_int_value();

    let b = &fl.ctx.builder;
    let is_zero = b
        .build_int_compare(IntPredicate::EQ, count, ty.const_zero(), "nozero")
        .unwrap();
    // ROL: CF is the bit rotated into the LSB; ROR: the bit rotated into the
    // MSB.
    let carry = if left {
        b.build_int_truncate(res, fl.ctx.bool_type, "cf").unwrap()
    } else {
        b.build_int_compare(IntPredicate::SLT, res, ty.const_zero(), "cf")
            .unwrap()
    };
    let msb = b
        .build_int_compare(IntPredicate::SLT, res, ty.const_zero(), "msb")
        .unwrap();
    let overflow = if left {
        b.build_xor(msb, carry, "of").unwrap()
    } else {
        let next = b
            .build_right_shift(res, ty.const_int(u64::from(width) - 2, false), false, "m2")
            .unwrap();
        let next = b.build_int_truncate(next, fl.ctx.bool_type, "m2b").unwrap();
        b.build_xor(msb, next, "of").unwrap()
    };

    for (facet, new) in [(Facet::Cf, carry), (Facet::Of, overflow)] {
        let old = fl.get_flag(facet);
        let sel = fl
            .ctx
            .builder
            .build_select(is_zero, old, new, "flagsel")
            .unwrap()
            .into_int_value();
        fl.set_flag(facet, sel);
    }
    fl.op_store_gp(inst.op(0), res, Align::None)
}

/// RCL/RCR rotate through the carry flag, modeled as a rotate of the
/// `width + 1`-bit concatenation of CF and the operand.
fn lift_rotate_carry(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, left: bool) -> LiftResult<()> {
    let val = fl.op_load_int(inst.op(0), Align::None)?;
    let ty = val.get_type();
    let width = ty.get_bit_width();
    let wide_ty = fl.ctx.int_type(width + 1);

    let raw = fl.op_load_int(inst.op(1), Align::None)?;
    let cf = fl.get_flag(Facet::Cf);
    let count = fl.uint_to(raw, wide_ty);
    let b = &fl.ctx.builder;
    let count = b
        .build_and(count, wide_ty.const_int(u64::from(width) - 1, false), "count")
        .unwrap();

    let wide_val = b.build_int_z_extend(val, wide_ty, "wide").unwrap();
    let wide_cf = b.build_int_z_extend(cf, wide_ty, "widecf").unwrap();
    let carry_in = b
        .build_left_shift(wide_cf, wide_ty.const_int(u64::from(width), false), "cfpos")
        .unwrap();
    let wide = b.build_or(wide_val, carry_in, "concat").unwrap();

    let intr = if left { "llvm.fshl" } else { "llvm.fshr" };
    let rotated = fl
        .call_intrinsic(
            intr,
            &[wide_ty.into()],
            &[wide.into(), wide.into(), count.into()],
        )
        .into_int_value();

    let b = &fl.ctx.builder;
    let res = b.build_int_truncate(rotated, ty, "res").unwrap();
    let carry = b
        .build_right_shift(
            rotated,
            wide_ty.const_int(u64::from(width), false),
            false,
            "cbit",
        )
        .unwrap();
    let carry = b
        .build_int_truncate(carry, fl.ctx.bool_type, "cf")
        .unwrap();
    fl.set_flag(Facet::Cf, carry);
    fl.set_flags_undef(&[Facet::Of]);
    fl.op_store_gp(inst.op(0), res, Align::None)
}

/// SHLD/SHRD shift bits in from a second register: exactly a funnel shift.
fn lift_shift_double(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, left: bool) -> LiftResult<()> {
    let dst = fl.op_load_int(inst.op(0), Align::None)?;
    let src = fl.op_load_int(inst.op(1), Align::None)?;
    let ty = dst.get_type();
    let width = ty.get_bit_width();
    let raw = fl.op_load_int(inst.op(2), Align::None)?;
    let count = fl.uint_to(raw, ty);
    let count = fl
        .ctx
        .builder
        .build_and(count, ty.const_int(u64::from(width) - 1, false), "count")
        .unwrap();

    let (a, c, intr) = if left {
        (dst, src, "llvm.fshl")
    } else {
        (src, dst, "llvm.fshr")
    };
    let res = fl
        .call_intrinsic(intr, &[ty.into()], &[a.into(), c.into(), count.into()])
        .into_int_value();

    let b = &fl.ctx.builder;
    let is_zero = b
        .build_int_compare(IntPredicate::EQ, count, ty.const_zero(), "nozero")
        .unwrap();
    let carry = if left {
        let inv = b
            .build_int_sub(ty.const_int(u64::from(width), false), count, "inv")
            .unwrap();
        let cb = b.build_right_shift(dst, inv, false, "cbit").unwrap();
        b.build_int_truncate(cb, fl.ctx.bool_type, "cf").unwrap()
    } else {
        let m1 = b
            .build_int_sub(count, ty.const_int(1, false), "m1")
            .unwrap();
        let cb = b.build_right_shift(dst, m1, false, "cbit").unwrap();
        b.build_int_truncate(cb, fl.ctx.bool_type, "cf").unwrap()
    };
    let dmsb = b
        .build_int_compare(IntPredicate::SLT, dst, ty.const_zero(), "dmsb")
        .unwrap();
    let rmsb = b
        .build_int_compare(IntPredicate::SLT, res, ty.const_zero(), "rmsb")
        .unwrap();
    let overflow = b.build_xor(dmsb, rmsb, "of").unwrap();

    select_flags_on_zero_count(fl, is_zero, res, carry, overflow)?;
    fl.op_store_gp(inst.op(0), res, Align::None)
}

/// MUL/IMUL. The one-operand forms produce a double-width product in
/// RDX:RAX (AX for byte operands); the two/three-operand IMUL forms keep the
/// operand width. OF and CF are set when the upper half is significant.
fn lift_mul(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, signed: bool) -> LiftResult<()> {
    if inst.operands.len() >= 2 {
        // imul r, r/m[, imm]
        let (lhs, rhs) = if inst.operands.len() == 3 {
            (
                fl.op_load_int(inst.op(1), Align::None)?,
                fl.op_load_int(inst.op(2), Align::None)?,
            )
        } else {
            (
                fl.op_load_int(inst.op(0), Align::None)?,
                fl.op_load_int(inst.op(1), Align::None)?,
            )
        };
        let ty = lhs.get_type();
        let wide_ty = fl.ctx.int_type(ty.get_bit_width() * 2);
        let b = &fl.ctx.builder;
        let wl = b.build_int_s_extend(lhs, wide_ty, "wl").unwrap();
        let wr = b.build_int_s_extend(rhs, wide_ty, "wr").unwrap();
        let wide = b.build_int_mul(wl, wr, "prod").unwrap();
        let res = b.build_int_truncate(wide, ty, "imul").unwrap();
        let back = b.build_int_s_extend(res, wide_ty, "back").unwrap();
        let ovf = b
            .build_int_compare(IntPredicate::NE, wide, back, "ovf")
            .unwrap();
        fl.set_flag(Facet::Cf, ovf);
        fl.set_flag(Facet::Of, ovf);
        fl.set_flags_undef(&[Facet::Zf, Facet::Sf, Facet::Pf, Facet::Af]);
        return fl.op_store_gp(inst.op(0), res, Align::None);
    }

    // One-operand form.
    let src = fl.op_load_int(inst.op(0), Align::None)?;
    let ty = src.get_type();
    let bits = ty.get_bit_width();
    let acc = fl.get_int(ArchReg::RAX, Facet::int(bits));
    let wide_ty = fl.ctx.int_type(bits * 2);
    let b = &fl.ctx.builder;
    let (wl, wr) = if signed {
        (
            b.build_int_s_extend(acc, wide_ty, "wl").unwrap(),
            b.build_int_s_extend(src, wide_ty, "wr").unwrap(),
        )
    } else {
        (
            b.build_int_z_extend(acc, wide_ty, "wl").unwrap(),
            b.build_int_z_extend(src, wide_ty, "wr").unwrap(),
        )
    };
    let wide = b.build_int_mul(wl, wr, "prod").unwrap();
    let lo = b.build_int_truncate(wide, ty, "lo").unwrap();
    let hi = b
        .build_right_shift(wide, wide_ty.const_int(u64::from(bits), false), false, "hiw")
        .unwrap();
    let hi = b.build_int_truncate(hi, ty, "hi").unwrap();

    let ovf = if signed {
        let back = b.build_int_s_extend(lo, wide_ty, "back").unwrap();
        b.build_int_compare(IntPredicate::NE, wide, back, "ovf")
            .unwrap()
    } else {
        b.build_int_compare(IntPredicate::NE, hi, ty.const_zero(), "ovf")
            .unwrap()
    };

    if bits == 8 {
        // AX receives the full 16-bit product.
        let full = fl
            .ctx
            .builder
            .build_int_truncate(wide, fl.ctx.i16_type, "ax")
            .unwrap();
        fl.store_gp(ArchReg::RAX, 2, false, full);
    } else {
        fl.store_gp(ArchReg::RAX, (bits / 8) as u8, false, lo);
        fl.store_gp(ArchReg::RDX, (bits / 8) as u8, false, hi);
    }
    fl.set_flag(Facet::Cf, ovf);
    fl.set_flag(Facet::Of, ovf);
    fl.set_flags_undef(&[Facet::Zf, Facet::Sf, Facet::Pf, Facet::Af]);
    Ok(())
}

/// DIV/IDIV divide the RDX:RAX concatenation (AX for byte operands) by the
/// operand; quotient to RAX, remainder to RDX (AL/AH for bytes).
fn lift_div(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, signed: bool) -> LiftResult<()> {
    let divisor = fl.op_load_int(inst.op(0), Align::None)?;
    let ty = divisor.get_type();
    let bits = ty.get_bit_width();
    let wide_ty = fl.ctx.int_type(bits * 2);

    let dividend = if bits == 8 {
        fl.get_int(ArchReg::RAX, Facet::I16)
    } else {
        let lo = fl.get_int(ArchReg::RAX, Facet::int(bits));
        let hi = fl.get_int(ArchReg::RDX, Facet::int(bits));
        let b = &fl.ctx.builder;
        let wl = b.build_int_z_extend(lo, wide_ty, "lo").unwrap();
        let wh = b.build_int_z_extend(hi, wide_ty, "hi").unwrap();
        let wh = b
            .build_left_shift(wh, wide_ty.const_int(u64::from(bits), false), "hipos")
            .unwrap();
        b.build_or(wh, wl, "dividend").unwrap()
    };

    let b = &fl.ctx.builder;
    let wdiv = if signed {
        b.build_int_s_extend(divisor, wide_ty, "divisor").unwrap()
    } else {
        b.build_int_z_extend(divisor, wide_ty, "divisor").unwrap()
    };
    let (q, r) = if signed {
        (
            b.build_int_signed_div(dividend, wdiv, "quot").unwrap(),
            b.build_int_signed_rem(dividend, wdiv, "rem").unwrap(),
        )
    } else {
        (
            b.build_int_unsigned_div(dividend, wdiv, "quot").unwrap(),
            b.build_int_unsigned_rem(dividend, wdiv, "rem").unwrap(),
        )
    };
    let q = b.build_int_truncate(q, ty, "q").unwrap();
    let r = b.build_int_truncate(r, ty, "r").unwrap();

    if bits == 8 {
        fl.store_gp(ArchReg::RAX, 1, false, q);
        fl.store_gp(ArchReg::RAX, 1, true, r);
    } else {
        fl.store_gp(ArchReg::RAX, (bits / 8) as u8, false, q);
        fl.store_gp(ArchReg::RDX, (bits / 8) as u8, false, r);
    }
    fl.set_flags_undef(&[
        Facet::Zf,
        Facet::Sf,
        Facet::Pf,
        Facet::Af,
        Facet::Cf,
        Facet::Of,
    ]);
    Ok(())
}

fn lift_lea(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let mem = match inst.op(1) {
        Operand::Mem(m) => *m,
        other => {
            return Err(LiftError::InvalidOperand(format!(
                "LEA source {other:?}"
            )))
        }
    };
    let ea = fl.addr_as_int(&mem);
    let dst_bits = u32::from(inst.op(0).size()) * 8;
    let v = if dst_bits < 64 {
        fl.ctx
            .builder
            .build_int_truncate(ea, fl.ctx.int_type(dst_bits), "lea")
            .unwrap()
    } else {
        ea
    };
    fl.op_store_gp(inst.op(0), v, Align::None)
}

fn lift_bitscan(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>, trailing: bool) -> LiftResult<()> {
    let src = fl.op_load_int(inst.op(1), Align::None)?;
    let ty = src.get_type();
    let zero_src = fl
        .ctx
        .builder
        .build_int_compare(IntPredicate::EQ, src, ty.const_zero(), "zf")
        .unwrap();
    fl.set_flag(Facet::Zf, zero_src);
    fl.set_flags_undef(&[Facet::Sf, Facet::Pf, Facet::Af, Facet::Cf, Facet::Of]);

    let t = fl.ctx.bool_type.const_all_ones();
    let res = if trailing {
        fl.call_intrinsic("llvm.cttz", &[ty.into()], &[src.into(), t.into()])
            .into_int_value()
    } else {
        let lz = fl
            .call_intrinsic("llvm.ctlz", &[ty.into()], &[src.into(), t.into()])
            .into_int_value();
        fl.ctx
            .builder
            .build_int_sub(
                ty.const_int(u64::from(ty.get_bit_width()) - 1, false),
                lz,
                "bsr",
            )
            .unwrap()
    };
    fl.op_store_gp(inst.op(0), res, Align::None)
}

/// BT/BTS/BTR/BTC. For register destinations the bit index wraps at the
/// register width; for memory destinations it is a true bit offset into
/// memory.
fn lift_bittest(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let kind = inst.mnemonic;
    let idx = fl.op_load_int(inst.op(1), Align::None)?;

    match *inst.op(0) {
        Operand::Reg { reg, size, high } => {
            debug_assert!(!high);
            let bits = u32::from(size) * 8;
            let ty = fl.ctx.int_type(bits);
            let val = fl.get_int(reg, Facet::int(bits));
            let b = &fl.ctx.builder;
            let idx = if idx.get_type().get_bit_width() < bits {
                b.build_int_z_extend(idx, ty, "idx").unwrap()
            } else if idx.get_type().get_bit_width() > bits {
                b.build_int_truncate(idx, ty, "idx").unwrap()
            } else {
                idx
            };
            let idx = b
                .build_and(idx, ty.const_int(u64::from(bits) - 1, false), "idx")
                .unwrap();
            let bit = b.build_right_shift(val, idx, false, "bit").unwrap();
            let carry = b.build_int_truncate(bit, fl.ctx.bool_type, "cf").unwrap();
            let mask = b
                .build_left_shift(ty.const_int(1, false), idx, "mask")
                .unwrap();
            let new = match kind {
                Mnemonic::Bts => Some(b.build_or(val, mask, "bts").unwrap()),
                Mnemonic::Btr => {
                    let inv = b.build_not(mask, "invmask").unwrap();
                    Some(b.build_and(val, inv, "btr").unwrap())
                }
                Mnemonic::Btc => Some(b.build_xor(val, mask, "btc").unwrap()),
                _ => None,
            };
            fl.set_flag(Facet::Cf, carry);
            if let Some(new) = new {
                fl.store_gp(reg, size, false, new);
            }
        }
        Operand::Mem(ref mem) => {
            // Byte-granular addressing: idx may reach beyond the operand.
            let b = &fl.ctx.builder;
            let idx64 = if idx.get_type().get_bit_width() < 64 {
                b.build_int_s_extend(idx, fl.ctx.i64_type, "idx").unwrap()
            } else {
                idx
            };
            let byte_off = b
                .build_right_shift(idx64, fl.ctx.i64_type.const_int(3, false), true, "byteoff")
                .unwrap();
            let bit_in = b
                .build_and(idx64, fl.ctx.i64_type.const_int(7, false), "bitoff")
                .unwrap();
            let bit_in = b.build_int_truncate(bit_in, fl.ctx.i8_type, "bitoff").unwrap();

            let base = fl.op_addr(mem, Facet::I8)?;
            let b = &fl.ctx.builder;
            let addr = unsafe { b.build_gep(base, &[byte_off], "bitbyte") }.unwrap();
            let cur = b
                .build_load(addr, "cur")
                .unwrap()
                .into_int_value();
            let bit = b.build_right_shift(cur, bit_in, false, "bit").unwrap();
            let carry = b.build_int_truncate(bit, fl.ctx.bool_type, "cf").unwrap();
            let mask = b
                .build_left_shift(fl.ctx.i8_type.const_int(1, false), bit_in, "mask")
                .unwrap();
            let new = match kind {
                Mnemonic::Bts => Some(b.build_or(cur, mask, "bts").unwrap()),
                Mnemonic::Btr => {
                    let inv = b.build_not(mask, "invmask").unwrap();
                    Some(b.build_and(cur, inv, "btr").unwrap())
                }
                Mnemonic::Btc => Some(b.build_xor(cur, mask, "btc").unwrap()),
                _ => None,
            };
            if let Some(new) = new {
                b.build_store(addr, new).unwrap();
            }
            fl.set_flag(Facet::Cf, carry);
        }
        ref other => {
            return Err(LiftError::InvalidOperand(format!(
                "bit test on operand {other:?}"
            )))
        }
    }
    Ok(())
}

fn lift_cmpxchg(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let size = inst.op(0).size();
    let bits = u32::from(size) * 8;
    let acc = fl.get_int(ArchReg::RAX, Facet::int(bits));
    let cur = fl.op_load_int(inst.op(0), Align::None)?;
    let src = fl.op_load_int(inst.op(1), Align::None)?;

    let diff = fl.ctx.builder.build_int_sub(acc, cur, "cmp").unwrap();
    fl.flag_calc_sub(diff, acc, cur);
    let equal = fl
        .ctx
        .builder
        .build_int_compare(IntPredicate::EQ, acc, cur, "xchg")
        .unwrap();

    let new_dst = fl
        .ctx
        .builder
        .build_select(equal, src, cur, "newdst")
        .unwrap()
        .into_int_value();
    fl.op_store_gp(inst.op(0), new_dst, Align::None)?;

    let new_acc = fl
        .ctx
        .builder
        .build_select(equal, acc, cur, "newacc")
        .unwrap()
        .into_int_value();
    fl.store_gp(ArchReg::RAX, size, false, new_acc);
    Ok(())
}

/// CBW/CWDE/CDQE: sign-extend the low half of RAX in place.
fn lift_cext(fl: Fl<'_, '_, '_>, size: u8) -> LiftResult<()> {
    let half = Facet::int(u32::from(size) * 4);
    let v = fl.get_int(ArchReg::RAX, half);
    let wide = fl
        .ctx
        .builder
        .build_int_s_extend(v, fl.ctx.int_type(u32::from(size) * 8), "cext")
        .unwrap();
    fl.store_gp(ArchReg::RAX, size, false, wide);
    Ok(())
}

/// CWD/CDQ/CQO: fill RDX with the sign of RAX.
fn lift_csep(fl: Fl<'_, '_, '_>, size: u8) -> LiftResult<()> {
    let bits = u32::from(size) * 8;
    let v = fl.get_int(ArchReg::RAX, Facet::int(bits));
    let sign = fl
        .ctx
        .builder
        .build_right_shift(
            v,
            fl.ctx.int_type(bits).const_int(u64::from(bits) - 1, false),
            true,
            "sign",
        )
        .unwrap();
    fl.store_gp(ArchReg::RDX, size, false, sign);
    Ok(())
}

fn lift_jmp(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    match *inst.op(0) {
        Operand::Imm { value, .. } => fl.branch_to(value as u64),
        _ => {
            // Indirect: leave the function with the new IP.
            let target = fl.op_load_int(inst.op(0), Align::None)?;
            fl.set_reg(ArchReg::Ip, Facet::I64, target.into(), true);
            fl.emit_exit();
            Ok(())
        }
    }
}

/// CALL pushes the return address, sets the new IP, runs the call hook and
/// resumes at the fall-through. Call targets are not lifted into this
/// function.
fn lift_call(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let ret_addr = fl.ctx.i64_type.const_int(inst.end(), false);
    fl.stack_push(ret_addr);
    let target = match *inst.op(0) {
        Operand::Imm { value, .. } => fl.ctx.i64_type.const_int(value as u64, false),
        _ => fl.op_load_int(inst.op(0), Align::None)?,
    };
    fl.set_reg(ArchReg::Ip, Facet::I64, target.into(), true);
    fl.emit_call_hook();
    fl.branch_to(inst.end())
}
