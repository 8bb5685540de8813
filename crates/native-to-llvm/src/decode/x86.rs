// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! x86-64 decoding via yaxpeax-x86
//!
//! Decodes one instruction at a time and converts it into the crate's
//! instruction record: mnemonics fold the 16 condition codes into single
//! variants, branch displacements become absolute targets, RIP-relative
//! operands are resolved against the instruction end, and immediate widths
//! are normalized to the operation width.

use cfg::CfgInstruction;
use yaxpeax_arch::{AddressBase, Decoder, U8Reader};
use yaxpeax_x86::long_mode::{register_class, InstDecoder, Instruction, Opcode, Operand as XOp, RegSpec};

use crate::error::{LiftError, LiftResult};
use crate::inst::{IndexExt, Inst, MemOp, Operand, Rep, Seg};
use crate::regfile::ArchReg;
use crate::x86_64::{Cond, Mnemonic};

use super::CodeSource;

/// Decode the instruction at `addr`.
pub(crate) fn decode(src: &dyn CodeSource, addr: u64) -> LiftResult<Inst<Mnemonic>> {
    let mut buf = [0u8; 15];
    let n = src.read(addr, &mut buf);
    if n == 0 {
        return Err(LiftError::Decode {
            addr,
            message: "no code mapped at address".into(),
        });
    }

    let decoder = InstDecoder::default();
    let mut reader = U8Reader::new(&buf[..n]);
    let xi: Instruction = decoder.decode(&mut reader).map_err(|e| LiftError::Decode {
        addr,
        message: e.to_string(),
    })?;
    let len = 0u64.wrapping_offset(xi.len()) as u8;

    Ok(convert(addr, len, &xi))
}

fn convert(addr: u64, len: u8, xi: &Instruction) -> Inst<Mnemonic> {
    let end = addr + u64::from(len);
    let mnemonic = convert_mnemonic(xi.opcode());

    let rep = if xi.prefixes.rep() {
        match mnemonic {
            Mnemonic::Scas | Mnemonic::Cmps => Rep::Repz,
            _ => Rep::Rep,
        }
    } else if xi.prefixes.repnz() {
        Rep::Repnz
    } else {
        Rep::None
    };

    let seg = if xi.prefixes.fs() {
        Seg::Fs
    } else if xi.prefixes.gs() {
        Seg::Gs
    } else {
        Seg::None
    };

    let mem_size = xi.mem_size().and_then(|s| s.bytes_size()).unwrap_or(0);

    let mut operands = Vec::with_capacity(usize::from(xi.operand_count()));
    for i in 0..xi.operand_count() {
        match convert_operand(xi.operand(i), seg, mem_size, end) {
            Some(Ok(op)) => operands.push(op),
            Some(Err(())) => {
                // Operand shapes the lifter cannot express (x87, masks,
                // segment registers): keep the record, fail at lift time.
                return unsupported(addr, len, rep);
            }
            None => break,
        }
    }

    // Immediates carry the operation width, not the encoded width.
    if operands.len() >= 2 {
        let dst_size = operands[0].size();
        if let Operand::Imm { size, .. } = &mut operands[1] {
            *size = dst_size;
        }
        if let Some(Operand::Imm { size, .. }) = operands.get_mut(2) {
            // Keep selector immediates (shuffles, inserts) byte-sized.
            if matches!(
                mnemonic,
                Mnemonic::Imul | Mnemonic::Shld | Mnemonic::Shrd
            ) {
                *size = dst_size;
            } else {
                *size = 1;
            }
        }
    }
    if mnemonic == Mnemonic::Push {
        if let Some(Operand::Imm { size, .. }) = operands.first_mut() {
            *size = 8;
        }
    }

    // Branches: displacement to absolute target.
    if is_branch_mnemonic(mnemonic) {
        if let Some(Operand::Imm { value, size }) = operands.first_mut() {
            *value = end.wrapping_add(*value as u64) as i64;
            *size = 8;
        }
    }

    let opsize = operands
        .first()
        .map(|o| o.size())
        .filter(|&s| s != 0)
        .unwrap_or(if mem_size != 0 { mem_size } else { 8 });

    Inst {
        addr,
        len,
        mnemonic,
        operands,
        rep,
        opsize,
    }
}

fn unsupported(addr: u64, len: u8, rep: Rep) -> Inst<Mnemonic> {
    Inst {
        addr,
        len,
        mnemonic: Mnemonic::Unsupported,
        operands: Vec::new(),
        rep,
        opsize: 8,
    }
}

fn is_branch_mnemonic(m: Mnemonic) -> bool {
    matches!(
        m,
        Mnemonic::Jmp
            | Mnemonic::Jcc(_)
            | Mnemonic::Call
            | Mnemonic::Loop
            | Mnemonic::Jcxz
    )
}

/// Convert one yaxpeax operand. `None` ends the operand list; `Some(Err(()))`
/// marks an inexpressible operand.
#[allow(clippy::result_unit_err)]
fn convert_operand(
    op: XOp,
    seg: Seg,
    mem_size: u8,
    end: u64,
) -> Option<Result<Operand, ()>> {
    let mem = |base: Option<ArchReg>, index: Option<ArchReg>, scale: u8, disp: i64| {
        Some(Ok(Operand::Mem(MemOp {
            seg,
            base,
            index,
            scale,
            ext: IndexExt::Lsl,
            disp,
            size: mem_size,
            writeback: None,
        })))
    };

    match op {
        XOp::Nothing => None,
        XOp::Register(r) => Some(convert_reg(r)),
        XOp::ImmediateI8(v) => Some(Ok(Operand::Imm {
            value: i64::from(v),
            size: 1,
        })),
        XOp::ImmediateU8(v) => Some(Ok(Operand::Imm {
            value: i64::from(v),
            size: 1,
        })),
        XOp::ImmediateI16(v) => Some(Ok(Operand::Imm {
            value: i64::from(v),
            size: 2,
        })),
        XOp::ImmediateU16(v) => Some(Ok(Operand::Imm {
            value: i64::from(v),
            size: 2,
        })),
        XOp::ImmediateI32(v) => Some(Ok(Operand::Imm {
            value: i64::from(v),
            size: 4,
        })),
        XOp::ImmediateU32(v) => Some(Ok(Operand::Imm {
            value: i64::from(v),
            size: 4,
        })),
        XOp::ImmediateI64(v) => Some(Ok(Operand::Imm { value: v, size: 8 })),
        XOp::ImmediateU64(v) => Some(Ok(Operand::Imm {
            value: v as i64,
            size: 8,
        })),
        XOp::DisplacementU32(d) => mem(None, None, 0, i64::from(d)),
        XOp::DisplacementU64(d) => mem(None, None, 0, d as i64),
        XOp::RegDeref(r) => match base_reg(r, end, 0) {
            Ok((base, disp)) => mem(base, None, 0, disp),
            Err(()) => Some(Err(())),
        },
        XOp::RegDisp(r, d) => match base_reg(r, end, i64::from(d)) {
            Ok((base, disp)) => mem(base, None, 0, disp),
            Err(()) => Some(Err(())),
        },
        XOp::RegScale(r, s) => match gp(r) {
            Ok(idx) => mem(None, Some(idx), s, 0),
            Err(()) => Some(Err(())),
        },
        XOp::RegScaleDisp(r, s, d) => match gp(r) {
            Ok(idx) => mem(None, Some(idx), s, i64::from(d)),
            Err(()) => Some(Err(())),
        },
        XOp::RegIndexBase(b, i) => match (gp(b), gp(i)) {
            (Ok(base), Ok(idx)) => mem(Some(base), Some(idx), 1, 0),
            _ => Some(Err(())),
        },
        XOp::RegIndexBaseDisp(b, i, d) => match (gp(b), gp(i)) {
            (Ok(base), Ok(idx)) => mem(Some(base), Some(idx), 1, i64::from(d)),
            _ => Some(Err(())),
        },
        XOp::RegIndexBaseScale(b, i, s) => match (gp(b), gp(i)) {
            (Ok(base), Ok(idx)) => mem(Some(base), Some(idx), s, 0),
            _ => Some(Err(())),
        },
        XOp::RegIndexBaseScaleDisp(b, i, s, d) => match (gp(b), gp(i)) {
            (Ok(base), Ok(idx)) => mem(Some(base), Some(idx), s, i64::from(d)),
            _ => Some(Err(())),
        },
        _ => Some(Err(())),
    }
}

/// Memory base register: RIP-relative bases resolve to an absolute
/// displacement against the instruction end.
fn base_reg(r: RegSpec, end: u64, disp: i64) -> Result<(Option<ArchReg>, i64), ()> {
    if r.class() == register_class::RIP {
        return Ok((None, (end as i64).wrapping_add(disp)));
    }
    Ok((Some(gp(r)?), disp))
}

/// A 64-bit GP register used in addressing.
fn gp(r: RegSpec) -> Result<ArchReg, ()> {
    if r.class() == register_class::Q {
        Ok(ArchReg::Gp(r.num()))
    } else {
        Err(())
    }
}

fn convert_reg(r: RegSpec) -> Result<Operand, ()> {
    let c = r.class();
    let n = r.num();
    let (reg, size, high) = if c == register_class::Q {
        (ArchReg::Gp(n), 8, false)
    } else if c == register_class::D {
        (ArchReg::Gp(n), 4, false)
    } else if c == register_class::W {
        (ArchReg::Gp(n), 2, false)
    } else if c == register_class::B {
        // Without REX, encodings 4..=7 are the high-byte aliases.
        if n >= 4 {
            (ArchReg::Gp(n - 4), 1, true)
        } else {
            (ArchReg::Gp(n), 1, false)
        }
    } else if c == register_class::RB {
        (ArchReg::Gp(n), 1, false)
    } else if c == register_class::X {
        (ArchReg::Vec(n), 16, false)
    } else if c == register_class::Y {
        (ArchReg::Vec(n), 32, false)
    } else {
        return Err(());
    };
    Ok(Operand::Reg { reg, size, high })
}

fn convert_mnemonic(op: Opcode) -> Mnemonic {
    use Mnemonic as M;
    match op {
        Opcode::NOP => M::Nop,
        Opcode::MOV | Opcode::MOVNTI => M::Mov,
        Opcode::MOVZX => M::Movzx,
        Opcode::MOVSX | Opcode::MOVSXD => M::Movsx,
        Opcode::MOVBE => M::Movbe,
        Opcode::BSWAP => M::Bswap,
        Opcode::XCHG => M::Xchg,
        Opcode::CMPXCHG => M::Cmpxchg,
        Opcode::LEA => M::Lea,

        Opcode::ADD => M::Add,
        Opcode::ADC => M::Adc,
        Opcode::SUB => M::Sub,
        Opcode::SBB => M::Sbb,
        Opcode::CMP => M::Cmp,
        Opcode::NEG => M::Neg,
        Opcode::INC => M::Inc,
        Opcode::DEC => M::Dec,

        Opcode::AND => M::And,
        Opcode::OR => M::Or,
        Opcode::XOR => M::Xor,
        Opcode::NOT => M::Not,
        Opcode::TEST => M::Test,

        Opcode::SHL | Opcode::SAL => M::Shl,
        Opcode::SHR => M::Shr,
        Opcode::SAR => M::Sar,
        Opcode::ROL => M::Rol,
        Opcode::ROR => M::Ror,
        Opcode::RCL => M::Rcl,
        Opcode::RCR => M::Rcr,
        Opcode::SHLD => M::Shld,
        Opcode::SHRD => M::Shrd,

        Opcode::MUL => M::Mul,
        Opcode::IMUL => M::Imul,
        Opcode::DIV => M::Div,
        Opcode::IDIV => M::Idiv,

        Opcode::CMOVO => M::Cmovcc(Cond::O),
        Opcode::CMOVNO => M::Cmovcc(Cond::No),
        Opcode::CMOVB => M::Cmovcc(Cond::C),
        Opcode::CMOVNB => M::Cmovcc(Cond::Nc),
        Opcode::CMOVZ => M::Cmovcc(Cond::Z),
        Opcode::CMOVNZ => M::Cmovcc(Cond::Nz),
        Opcode::CMOVNA => M::Cmovcc(Cond::Be),
        Opcode::CMOVA => M::Cmovcc(Cond::A),
        Opcode::CMOVS => M::Cmovcc(Cond::S),
        Opcode::CMOVNS => M::Cmovcc(Cond::Ns),
        Opcode::CMOVP => M::Cmovcc(Cond::P),
        Opcode::CMOVNP => M::Cmovcc(Cond::Np),
        Opcode::CMOVL => M::Cmovcc(Cond::L),
        Opcode::CMOVGE => M::Cmovcc(Cond::Ge),
        Opcode::CMOVLE => M::Cmovcc(Cond::Le),
        Opcode::CMOVG => M::Cmovcc(Cond::G),

        Opcode::SETO => M::Setcc(Cond::O),
        Opcode::SETNO => M::Setcc(Cond::No),
        Opcode::SETB => M::Setcc(Cond::C),
        Opcode::SETAE => M::Setcc(Cond::Nc),
        Opcode::SETZ => M::Setcc(Cond::Z),
        Opcode::SETNZ => M::Setcc(Cond::Nz),
        Opcode::SETBE => M::Setcc(Cond::Be),
        Opcode::SETA => M::Setcc(Cond::A),
        Opcode::SETS => M::Setcc(Cond::S),
        Opcode::SETNS => M::Setcc(Cond::Ns),
        Opcode::SETP => M::Setcc(Cond::P),
        Opcode::SETNP => M::Setcc(Cond::Np),
        Opcode::SETL => M::Setcc(Cond::L),
        Opcode::SETGE => M::Setcc(Cond::Ge),
        Opcode::SETLE => M::Setcc(Cond::Le),
        Opcode::SETG => M::Setcc(Cond::G),

        Opcode::BSF => M::Bsf,
        Opcode::BSR => M::Bsr,
        Opcode::BT => M::Bt,
        Opcode::BTS => M::Bts,
        Opcode::BTR => M::Btr,
        Opcode::BTC => M::Btc,

        Opcode::PUSH => M::Push,
        Opcode::POP => M::Pop,
        Opcode::PUSHF => M::Pushf,
        Opcode::POPF => M::Popf,
        Opcode::LEAVE => M::Leave,
        Opcode::LAHF => M::Lahf,
        Opcode::SAHF => M::Sahf,

        Opcode::CBW => M::Cbw,
        Opcode::CWDE => M::Cwde,
        Opcode::CDQE => M::Cdqe,
        Opcode::CWD => M::Cwd,
        Opcode::CDQ => M::Cdq,
        Opcode::CQO => M::Cqo,

        Opcode::CLC => M::Clc,
        Opcode::STC => M::Stc,
        Opcode::CMC => M::Cmc,
        Opcode::CLD => M::Cld,
        Opcode::STD => M::Std,

        Opcode::LODS => M::Lods,
        Opcode::STOS => M::Stos,
        Opcode::MOVS => M::Movs,
        Opcode::SCAS => M::Scas,
        Opcode::CMPS => M::Cmps,

        Opcode::JMP => M::Jmp,
        Opcode::JO => M::Jcc(Cond::O),
        Opcode::JNO => M::Jcc(Cond::No),
        Opcode::JB => M::Jcc(Cond::C),
        Opcode::JNB => M::Jcc(Cond::Nc),
        Opcode::JZ => M::Jcc(Cond::Z),
        Opcode::JNZ => M::Jcc(Cond::Nz),
        Opcode::JNA => M::Jcc(Cond::Be),
        Opcode::JA => M::Jcc(Cond::A),
        Opcode::JS => M::Jcc(Cond::S),
        Opcode::JNS => M::Jcc(Cond::Ns),
        Opcode::JP => M::Jcc(Cond::P),
        Opcode::JNP => M::Jcc(Cond::Np),
        Opcode::JL => M::Jcc(Cond::L),
        Opcode::JGE => M::Jcc(Cond::Ge),
        Opcode::JLE => M::Jcc(Cond::Le),
        Opcode::JG => M::Jcc(Cond::G),
        Opcode::CALL => M::Call,
        Opcode::RETURN => M::Ret,
        Opcode::LOOP => M::Loop,
        Opcode::JRCXZ => M::Jcxz,

        Opcode::MOVD => M::Movd,
        Opcode::MOVQ => M::Movq,
        Opcode::MOVSS => M::Movss,
        Opcode::MOVSD => M::Movsd,
        Opcode::MOVUPS => M::Movups,
        Opcode::MOVUPD => M::Movupd,
        Opcode::MOVAPS => M::Movaps,
        Opcode::MOVAPD => M::Movapd,
        Opcode::MOVDQU => M::Movdqu,
        Opcode::MOVDQA => M::Movdqa,
        Opcode::MOVNTPS | Opcode::MOVNTPD | Opcode::MOVNTDQ => M::Movnt,
        Opcode::MOVLPS => M::Movlps,
        Opcode::MOVLPD => M::Movlpd,
        Opcode::MOVHPS => M::Movhps,
        Opcode::MOVHPD => M::Movhpd,

        Opcode::ADDSS => M::Addss,
        Opcode::ADDSD => M::Addsd,
        Opcode::ADDPS => M::Addps,
        Opcode::ADDPD => M::Addpd,
        Opcode::SUBSS => M::Subss,
        Opcode::SUBSD => M::Subsd,
        Opcode::SUBPS => M::Subps,
        Opcode::SUBPD => M::Subpd,
        Opcode::MULSS => M::Mulss,
        Opcode::MULSD => M::Mulsd,
        Opcode::MULPS => M::Mulps,
        Opcode::MULPD => M::Mulpd,
        Opcode::DIVSS => M::Divss,
        Opcode::DIVSD => M::Divsd,
        Opcode::DIVPS => M::Divps,
        Opcode::DIVPD => M::Divpd,
        Opcode::MINSS => M::Minss,
        Opcode::MINSD => M::Minsd,
        Opcode::MINPS => M::Minps,
        Opcode::MINPD => M::Minpd,
        Opcode::MAXSS => M::Maxss,
        Opcode::MAXSD => M::Maxsd,
        Opcode::MAXPS => M::Maxps,
        Opcode::MAXPD => M::Maxpd,
        Opcode::SQRTSS => M::Sqrtss,
        Opcode::SQRTSD => M::Sqrtsd,
        Opcode::SQRTPS => M::Sqrtps,
        Opcode::SQRTPD => M::Sqrtpd,

        Opcode::ANDPS => M::Andps,
        Opcode::ANDPD => M::Andpd,
        Opcode::ANDNPS => M::Andnps,
        Opcode::ANDNPD => M::Andnpd,
        Opcode::ORPS => M::Orps,
        Opcode::ORPD => M::Orpd,
        Opcode::XORPS => M::Xorps,
        Opcode::XORPD => M::Xorpd,
        Opcode::PAND => M::Pand,
        Opcode::PANDN => M::Pandn,
        Opcode::POR => M::Por,
        Opcode::PXOR => M::Pxor,

        Opcode::COMISS | Opcode::UCOMISS => M::Comiss,
        Opcode::COMISD | Opcode::UCOMISD => M::Comisd,
        Opcode::CMPSS => M::Cmpss,
        Opcode::CMPPS => M::Cmpps,
        Opcode::CMPPD => M::Cmppd,

        Opcode::CVTSI2SS => M::Cvtsi2ss,
        Opcode::CVTSI2SD => M::Cvtsi2sd,
        Opcode::CVTTSS2SI => M::Cvttss2si,
        Opcode::CVTTSD2SI => M::Cvttsd2si,
        Opcode::CVTSS2SD => M::Cvtss2sd,
        Opcode::CVTSD2SS => M::Cvtsd2ss,
        Opcode::CVTDQ2PS => M::Cvtdq2ps,
        Opcode::CVTTPS2DQ => M::Cvttps2dq,
        Opcode::CVTPS2PD => M::Cvtps2pd,
        Opcode::CVTPD2PS => M::Cvtpd2ps,

        Opcode::UNPCKLPS => M::Unpcklps,
        Opcode::UNPCKLPD => M::Unpcklpd,
        Opcode::UNPCKHPS => M::Unpckhps,
        Opcode::UNPCKHPD => M::Unpckhpd,
        Opcode::PUNPCKLBW => M::Punpcklbw,
        Opcode::PUNPCKLWD => M::Punpcklwd,
        Opcode::PUNPCKLDQ => M::Punpckldq,
        Opcode::PUNPCKLQDQ => M::Punpcklqdq,
        Opcode::PUNPCKHBW => M::Punpckhbw,
        Opcode::PUNPCKHWD => M::Punpckhwd,
        Opcode::PUNPCKHDQ => M::Punpckhdq,
        Opcode::PUNPCKHQDQ => M::Punpckhqdq,
        Opcode::SHUFPS => M::Shufps,
        Opcode::SHUFPD => M::Shufpd,
        Opcode::PSHUFD => M::Pshufd,
        Opcode::PSHUFLW => M::Pshuflw,
        Opcode::PSHUFHW => M::Pshufhw,

        Opcode::PINSRB => M::Pinsrb,
        Opcode::PINSRW => M::Pinsrw,
        Opcode::PINSRD => M::Pinsrd,
        Opcode::PINSRQ => M::Pinsrq,
        Opcode::PEXTRB => M::Pextrb,
        Opcode::PEXTRW => M::Pextrw,
        Opcode::PEXTRD => M::Pextrd,
        Opcode::PEXTRQ => M::Pextrq,

        Opcode::PACKSSWB => M::Packsswb,
        Opcode::PACKSSDW => M::Packssdw,
        Opcode::PACKUSWB => M::Packuswb,

        Opcode::PADDB => M::Paddb,
        Opcode::PADDW => M::Paddw,
        Opcode::PADDD => M::Paddd,
        Opcode::PADDQ => M::Paddq,
        Opcode::PSUBB => M::Psubb,
        Opcode::PSUBW => M::Psubw,
        Opcode::PSUBD => M::Psubd,
        Opcode::PSUBQ => M::Psubq,
        Opcode::PADDSB => M::Paddsb,
        Opcode::PADDSW => M::Paddsw,
        Opcode::PADDUSB => M::Paddusb,
        Opcode::PADDUSW => M::Paddusw,
        Opcode::PSUBSB => M::Psubsb,
        Opcode::PSUBSW => M::Psubsw,
        Opcode::PSUBUSB => M::Psubusb,
        Opcode::PSUBUSW => M::Psubusw,
        Opcode::PMULLW => M::Pmullw,
        Opcode::PMULHW => M::Pmulhw,
        Opcode::PMULHUW => M::Pmulhuw,
        Opcode::PAVGB => M::Pavgb,
        Opcode::PAVGW => M::Pavgw,

        Opcode::PCMPEQB => M::Pcmpeqb,
        Opcode::PCMPEQW => M::Pcmpeqw,
        Opcode::PCMPEQD => M::Pcmpeqd,
        Opcode::PCMPGTB => M::Pcmpgtb,
        Opcode::PCMPGTW => M::Pcmpgtw,
        Opcode::PCMPGTD => M::Pcmpgtd,
        Opcode::PMINUB => M::Pminub,
        Opcode::PMAXUB => M::Pmaxub,
        Opcode::PMINSW => M::Pminsw,
        Opcode::PMAXSW => M::Pmaxsw,

        Opcode::PMOVMSKB => M::Pmovmskb,
        Opcode::MOVMSKPS => M::Movmskps,
        Opcode::MOVMSKPD => M::Movmskpd,

        Opcode::PSLLW => M::Psllw,
        Opcode::PSLLD => M::Pslld,
        Opcode::PSLLQ => M::Psllq,
        Opcode::PSRLW => M::Psrlw,
        Opcode::PSRLD => M::Psrld,
        Opcode::PSRLQ => M::Psrlq,
        Opcode::PSRAW => M::Psraw,
        Opcode::PSRAD => M::Psrad,
        Opcode::PSLLDQ => M::Pslldq,
        Opcode::PSRLDQ => M::Psrldq,

        Opcode::LFENCE => M::Lfence,
        Opcode::MFENCE => M::Mfence,
        Opcode::SFENCE => M::Sfence,
        Opcode::PREFETCHNTA | Opcode::PREFETCH0 | Opcode::PREFETCH1 | Opcode::PREFETCH2 => {
            M::Prefetch
        }
        Opcode::FXSAVE => M::Fxsave,
        Opcode::FXRSTOR => M::Fxrstor,
        Opcode::STMXCSR => M::Stmxcsr,
        Opcode::FNSTCW => M::Fstcw,
        Opcode::FNSTSW => M::Fstsw,

        _ => M::Unsupported,
    }
}

impl CfgInstruction for Inst<Mnemonic> {
    fn address(&self) -> u64 {
        self.addr
    }

    fn len(&self) -> u64 {
        u64::from(self.len)
    }

    fn is_branch(&self) -> bool {
        is_branch_mnemonic(self.mnemonic)
    }

    fn is_conditional(&self) -> bool {
        matches!(
            self.mnemonic,
            Mnemonic::Jcc(_) | Mnemonic::Loop | Mnemonic::Jcxz
        )
    }

    fn is_call(&self) -> bool {
        self.mnemonic == Mnemonic::Call
    }

    fn is_return(&self) -> bool {
        self.mnemonic == Mnemonic::Ret
    }

    fn branch_target(&self) -> Option<u64> {
        if !self.is_branch() {
            return None;
        }
        match self.operands.first() {
            Some(&Operand::Imm { value, .. }) => Some(value as u64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::CodeSlice;

    fn decode_at(bytes: &[u8], addr: u64) -> Inst<Mnemonic> {
        let src = CodeSlice::new(addr, bytes);
        decode(&src, addr).expect("decode failed")
    }

    #[test]
    fn mov_reg_reg() {
        // mov rax, rdi
        let inst = decode_at(&[0x48, 0x89, 0xf8], 0x1000);
        assert_eq!(inst.mnemonic, Mnemonic::Mov);
        assert_eq!(inst.len, 3);
        assert_eq!(
            inst.operands,
            vec![
                Operand::reg(ArchReg::RAX, 8),
                Operand::reg(ArchReg::RDI, 8),
            ]
        );
    }

    #[test]
    fn conditional_branch_is_absolute() {
        // je +5 at 0x1000 (2 bytes): target 0x1007
        let inst = decode_at(&[0x74, 0x05], 0x1000);
        assert_eq!(inst.mnemonic, Mnemonic::Jcc(Cond::Z));
        assert_eq!(inst.branch_target(), Some(0x1007));
        assert!(inst.is_conditional());
    }

    #[test]
    fn high_byte_register() {
        // mov ah, 1
        let inst = decode_at(&[0xb4, 0x01], 0);
        assert_eq!(inst.mnemonic, Mnemonic::Mov);
        assert_eq!(
            inst.operands[0],
            Operand::Reg {
                reg: ArchReg::RAX,
                size: 1,
                high: true,
            }
        );
    }

    #[test]
    fn rep_prefix_classified() {
        // rep movsb
        let inst = decode_at(&[0xf3, 0xa4], 0);
        assert_eq!(inst.mnemonic, Mnemonic::Movs);
        assert_eq!(inst.rep, Rep::Rep);
        assert_eq!(inst.opsize, 1);

        // repne scasb
        let inst = decode_at(&[0xf2, 0xae], 0);
        assert_eq!(inst.mnemonic, Mnemonic::Scas);
        assert_eq!(inst.rep, Rep::Repnz);
    }

    #[test]
    fn ret_is_terminator() {
        let inst = decode_at(&[0xc3], 0);
        assert_eq!(inst.mnemonic, Mnemonic::Ret);
        assert!(inst.is_return());
        assert!(inst.is_terminator());
        assert_eq!(inst.branch_target(), None);
    }

    #[test]
    fn imm_width_follows_destination() {
        // add rax, 1 (imm8 sign-extended form)
        let inst = decode_at(&[0x48, 0x83, 0xc0, 0x01], 0);
        assert_eq!(inst.mnemonic, Mnemonic::Add);
        assert_eq!(inst.operands[1], Operand::Imm { value: 1, size: 8 });
    }

    #[test]
    fn rip_relative_resolves() {
        // lea rax, [rip + 0x10] -> absolute 7 + 0x10
        let inst = decode_at(&[0x48, 0x8d, 0x05, 0x10, 0x00, 0x00, 0x00], 0);
        assert_eq!(inst.mnemonic, Mnemonic::Lea);
        match inst.operands[1] {
            Operand::Mem(m) => {
                assert_eq!(m.base, None);
                assert_eq!(m.disp, 7 + 0x10);
            }
            ref other => panic!("expected memory operand, got {other:?}"),
        }
    }
}
