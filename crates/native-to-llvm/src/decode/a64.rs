// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! AArch64 decoding via yaxpeax-arm
//!
//! Converts A64 instruction words into the crate's record: PC-relative
//! offsets become absolute targets, pre/post-index addressing desugars into a
//! memory operand plus a writeback note, and register 31 is resolved into SP
//! or the zero register depending on the operand form.

use cfg::CfgInstruction;
use yaxpeax_arch::{Decoder, U8Reader};
use yaxpeax_arm::armv8::a64::{
    InstDecoder, Instruction, Opcode, Operand as AOp, ShiftStyle, SizeCode,
};

use crate::a64::Mnemonic;
use crate::error::{LiftError, LiftResult};
use crate::inst::{IndexExt, Inst, MemOp, Operand, Rep, ShiftOp, Writeback};
use crate::regfile::ArchReg;

use super::CodeSource;

/// Decode the 4-byte instruction word at `addr`.
pub(crate) fn decode(src: &dyn CodeSource, addr: u64) -> LiftResult<Inst<Mnemonic>> {
    let mut buf = [0u8; 4];
    let n = src.read(addr, &mut buf);
    if n < 4 {
        return Err(LiftError::Decode {
            addr,
            message: "no code mapped at address".into(),
        });
    }

    let decoder = InstDecoder::default();
    let mut reader = U8Reader::new(&buf);
    let ai: Instruction = decoder.decode(&mut reader).map_err(|e| LiftError::Decode {
        addr,
        message: format!("{e:?}"),
    })?;

    Ok(convert(addr, &ai))
}

fn convert(addr: u64, ai: &Instruction) -> Inst<Mnemonic> {
    let mnemonic = convert_mnemonic(ai.opcode);
    let access = access_size(ai.opcode);

    let mut operands = Vec::new();
    for op in ai.operands.iter() {
        if matches!(op, AOp::Nothing) {
            break;
        }
        match convert_operand(op, addr, access, mnemonic) {
            Some(converted) => operands.push(converted),
            None => return unsupported(addr),
        }
    }

    fixup(addr, mnemonic, &mut operands);

    Inst {
        addr,
        len: 4,
        mnemonic,
        operands,
        rep: Rep::None,
        opsize: access.max(1),
    }
}

fn unsupported(addr: u64) -> Inst<Mnemonic> {
    Inst {
        addr,
        len: 4,
        mnemonic: Mnemonic::Unsupported,
        operands: Vec::new(),
        rep: Rep::None,
        opsize: 8,
    }
}

/// Memory access width in bytes for load/store opcodes, 0 otherwise.
fn access_size(op: Opcode) -> u8 {
    match op {
        Opcode::LDRB | Opcode::STRB | Opcode::LDRSB | Opcode::LDURB | Opcode::STURB => 1,
        Opcode::LDRH | Opcode::STRH | Opcode::LDRSH | Opcode::LDURH | Opcode::STURH => 2,
        Opcode::LDRSW => 4,
        // LDR/STR/LDP/STP width comes from the register size and is patched
        // in `fixup`.
        Opcode::LDR | Opcode::STR | Opcode::LDUR | Opcode::STUR | Opcode::LDP | Opcode::STP => 8,
        _ => 0,
    }
}

fn reg_size(size: SizeCode) -> u8 {
    match size {
        SizeCode::W => 4,
        SizeCode::X => 8,
    }
}

/// General-purpose register; 31 is the zero register in this form.
fn gp(num: u16) -> ArchReg {
    ArchReg::Gp(num as u8)
}

/// Base register in addressing forms, where 31 means SP.
fn base(num: u16) -> ArchReg {
    if num == 31 {
        ArchReg::Sp
    } else {
        ArchReg::Gp(num as u8)
    }
}

fn shift_op(style: ShiftStyle) -> Option<ShiftOp> {
    match style {
        ShiftStyle::LSL => Some(ShiftOp::Lsl),
        ShiftStyle::LSR => Some(ShiftOp::Lsr),
        ShiftStyle::ASR => Some(ShiftOp::Asr),
        ShiftStyle::ROR => Some(ShiftOp::Ror),
        _ => None,
    }
}

fn index_ext(style: ShiftStyle) -> Option<IndexExt> {
    match style {
        ShiftStyle::LSL | ShiftStyle::UXTX => Some(IndexExt::Lsl),
        ShiftStyle::UXTW => Some(IndexExt::Uxtw),
        ShiftStyle::SXTW => Some(IndexExt::Sxtw),
        ShiftStyle::SXTX => Some(IndexExt::Sxtx),
        _ => None,
    }
}

fn convert_operand(
    op: &AOp,
    addr: u64,
    access: u8,
    mnemonic: Mnemonic,
) -> Option<Operand> {
    let mem = |base_reg, index, scale, ext, disp, writeback| {
        Some(Operand::Mem(MemOp {
            seg: Default::default(),
            base: Some(base_reg),
            index,
            scale,
            ext,
            disp,
            size: access,
            writeback,
        }))
    };

    match *op {
        AOp::Register(size, num) => Some(Operand::reg(gp(num), reg_size(size))),
        AOp::RegisterOrSP(size, num) => Some(Operand::reg(base(num), reg_size(size))),
        AOp::RegShift(style, amount, size, num) => {
            let shift = shift_op(style)?;
            Some(Operand::ShiftedReg {
                reg: gp(num),
                size: reg_size(size),
                shift,
                amount,
            })
        }
        AOp::Immediate(v) => Some(Operand::Imm {
            value: i64::from(v),
            size: 8,
        }),
        AOp::Imm16(v) => Some(Operand::Imm {
            value: i64::from(v),
            size: 8,
        }),
        AOp::Imm64(v) => Some(Operand::Imm {
            value: v as i64,
            size: 8,
        }),
        AOp::PCOffset(off) => {
            // ADRP is relative to the current page; everything else to the
            // instruction address.
            let value = if mnemonic == Mnemonic::Adrp {
                ((addr & !0xfff) as i64).wrapping_add(off)
            } else {
                (addr as i64).wrapping_add(off)
            };
            Some(Operand::Imm { value, size: 8 })
        }
        AOp::RegPreIndex(num, off, wback) => {
            let writeback = wback.then_some(Writeback {
                offset: i64::from(off),
                post: false,
            });
            mem(
                base(num),
                None,
                0,
                IndexExt::Lsl,
                i64::from(off),
                writeback,
            )
        }
        AOp::RegPostIndex(num, off) => mem(
            base(num),
            None,
            0,
            IndexExt::Lsl,
            0,
            Some(Writeback {
                offset: i64::from(off),
                post: true,
            }),
        ),
        AOp::RegRegOffset(num, idx, _size, style, amount) => {
            let ext = index_ext(style)?;
            let scale = if amount != 0 { access.max(1) } else { 1 };
            // An index of 31 is the zero register: no effective index.
            let index = (idx != 31).then(|| gp(idx));
            let scale = if index.is_some() { scale } else { 0 };
            mem(base(num), index, scale, ext, 0, None)
        }
        AOp::ConditionCode(c) => Some(Operand::Cond(c)),
        _ => None,
    }
}

/// Post-conversion adjustments that need the full operand list.
fn fixup(addr: u64, mnemonic: Mnemonic, operands: &mut Vec<Operand>) {
    let _ = addr;
    use Mnemonic::*;

    // LDR/STR/LDP/STP access width follows the register width.
    if matches!(mnemonic, Ldr | Str | Ldp | Stp) {
        let reg_bytes = operands.first().map(Operand::size).unwrap_or(8);
        for op in operands.iter_mut() {
            if let Operand::Mem(m) = op {
                if m.size == 8 && reg_bytes != 8 {
                    m.size = reg_bytes;
                }
            }
        }
    }

    // The MUL alias lacks the accumulator; supply the zero register.
    if mnemonic == Madd && operands.len() == 3 {
        let size = operands.first().map(Operand::size).unwrap_or(8);
        operands.push(Operand::reg(ArchReg::Gp(31), size));
    }

    // MOVK carries its field shift as a third operand for the lifter, derived
    // from the position of the (already shifted) field value.
    if mnemonic == Movk {
        if let Some(&Operand::Imm { value, .. }) = operands.get(1) {
            let shift = if value == 0 {
                0
            } else {
                i64::from(value.trailing_zeros() / 16 * 16)
            };
            operands.push(Operand::Imm {
                value: shift,
                size: 1,
            });
        }
    }

    // Data-processing immediates adopt the destination register width.
    if let Some(dst_size) = operands.first().and_then(|o| match o {
        Operand::Reg { size, .. } => Some(*size),
        _ => None,
    }) {
        if !matches!(mnemonic, Ldr | Str | Ldp | Stp | Tbz | Tbnz | Movk | Ccmp | Ccmn) {
            for op in operands.iter_mut().skip(1) {
                if let Operand::Imm { size, .. } = op {
                    *size = dst_size;
                }
            }
        }
    }
}

fn convert_mnemonic(op: Opcode) -> Mnemonic {
    use Mnemonic as M;
    match op {
        Opcode::HINT => M::Nop,

        Opcode::ADD => M::Add,
        Opcode::ADDS => M::Adds,
        Opcode::SUB => M::Sub,
        Opcode::SUBS => M::Subs,
        Opcode::AND => M::And,
        Opcode::ANDS => M::Ands,
        Opcode::ORR => M::Orr,
        Opcode::ORN => M::Orn,
        Opcode::EOR => M::Eor,
        Opcode::BIC => M::Bic,

        Opcode::MOVZ => M::Movz,
        Opcode::MOVN => M::Movn,
        Opcode::MOVK => M::Movk,

        Opcode::UBFM => M::Ubfm,
        Opcode::SBFM => M::Sbfm,
        Opcode::BFM => M::Bfm,
        Opcode::EXTR => M::Extr,
        Opcode::LSLV => M::Lslv,
        Opcode::LSRV => M::Lsrv,
        Opcode::ASRV => M::Asrv,
        Opcode::RORV => M::Rorv,
        Opcode::CLZ => M::Clz,
        Opcode::RBIT => M::Rbit,
        Opcode::REV => M::Rev,

        Opcode::MADD | Opcode::MUL => M::Madd,
        Opcode::MSUB => M::Msub,
        Opcode::SMULH => M::Smulh,
        Opcode::UMULH => M::Umulh,
        Opcode::SDIV => M::Sdiv,
        Opcode::UDIV => M::Udiv,

        Opcode::CSEL => M::Csel,
        Opcode::CSINC => M::Csinc,
        Opcode::CSINV => M::Csinv,
        Opcode::CSNEG => M::Csneg,
        Opcode::CCMP => M::Ccmp,
        Opcode::CCMN => M::Ccmn,

        Opcode::LDR | Opcode::LDRB | Opcode::LDRH | Opcode::LDUR | Opcode::LDURB
        | Opcode::LDURH => M::Ldr,
        Opcode::LDRSB => M::Ldrsb,
        Opcode::LDRSH => M::Ldrsh,
        Opcode::LDRSW => M::Ldrsw,
        Opcode::STR | Opcode::STRB | Opcode::STRH | Opcode::STUR | Opcode::STURB
        | Opcode::STURH => M::Str,
        Opcode::LDP => M::Ldp,
        Opcode::STP => M::Stp,
        Opcode::ADR => M::Adr,
        Opcode::ADRP => M::Adrp,

        Opcode::B => M::B,
        Opcode::Bcc(c) => M::Bcc(c),
        Opcode::CBZ => M::Cbz,
        Opcode::CBNZ => M::Cbnz,
        Opcode::TBZ => M::Tbz,
        Opcode::TBNZ => M::Tbnz,
        Opcode::BL => M::Bl,
        Opcode::BLR => M::Blr,
        Opcode::BR => M::Br,
        Opcode::RET => M::Ret,
        Opcode::BRK => M::Brk,

        _ => M::Unsupported,
    }
}

impl CfgInstruction for Inst<Mnemonic> {
    fn address(&self) -> u64 {
        self.addr
    }

    fn len(&self) -> u64 {
        4
    }

    fn is_branch(&self) -> bool {
        matches!(
            self.mnemonic,
            Mnemonic::B
                | Mnemonic::Bcc(_)
                | Mnemonic::Cbz
                | Mnemonic::Cbnz
                | Mnemonic::Tbz
                | Mnemonic::Tbnz
                | Mnemonic::Bl
                | Mnemonic::Blr
                | Mnemonic::Br
        )
    }

    fn is_conditional(&self) -> bool {
        matches!(
            self.mnemonic,
            Mnemonic::Bcc(_) | Mnemonic::Cbz | Mnemonic::Cbnz | Mnemonic::Tbz | Mnemonic::Tbnz
        )
    }

    fn is_call(&self) -> bool {
        matches!(self.mnemonic, Mnemonic::Bl | Mnemonic::Blr)
    }

    fn is_return(&self) -> bool {
        self.mnemonic == Mnemonic::Ret
    }

    fn branch_target(&self) -> Option<u64> {
        if !self.is_branch() {
            return None;
        }
        // The PC-relative target (already absolute) is the sole immediate
        // for B/BL, the last operand for CBZ/TBZ forms.
        let imm = match self.mnemonic {
            Mnemonic::B | Mnemonic::Bl | Mnemonic::Bcc(_) => self.operands.first(),
            Mnemonic::Cbz | Mnemonic::Cbnz | Mnemonic::Tbz | Mnemonic::Tbnz => {
                self.operands.last()
            }
            _ => None,
        };
        match imm {
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
    fn decode_ret() {
        // ret -> 0xd65f03c0
        let inst = decode_at(&[0xc0, 0x03, 0x5f, 0xd6], 0x4000);
        assert_eq!(inst.mnemonic, Mnemonic::Ret);
        assert!(inst.is_return());
        assert_eq!(inst.len, 4);
    }

    #[test]
    fn decode_branch_target_absolute() {
        // b #0x10 -> 0x14000004
        let inst = decode_at(&[0x04, 0x00, 0x00, 0x14], 0x4000);
        assert_eq!(inst.mnemonic, Mnemonic::B);
        assert_eq!(inst.branch_target(), Some(0x4010));
        assert!(inst.is_unconditional_jump());
    }

    #[test]
    fn decode_add_registers() {
        // add x0, x0, x1 -> 0x8b010000
        let inst = decode_at(&[0x00, 0x00, 0x01, 0x8b], 0);
        assert_eq!(inst.mnemonic, Mnemonic::Add);
        assert_eq!(inst.operands.len(), 3);
        assert_eq!(inst.operands[0], Operand::reg(ArchReg::Gp(0), 8));
    }

    #[test]
    fn decode_ccmp() {
        // ccmp x0, x1, #5, eq -> 0xfa410005
        let inst = decode_at(&[0x05, 0x00, 0x41, 0xfa], 0);
        assert_eq!(inst.mnemonic, Mnemonic::Ccmp);
    }

    #[test]
    fn decode_conditional_branch() {
        // b.lt #-8 -> 0x54ffff4b
        let inst = decode_at(&[0x4b, 0xff, 0xff, 0x54], 0x100);
        assert!(matches!(inst.mnemonic, Mnemonic::Bcc(_)));
        assert!(inst.is_conditional());
        assert_eq!(inst.branch_target(), Some(0xf8));
    }

    #[test]
    fn decode_indirect_branch_has_no_target() {
        // br x0 -> 0xd61f0000
        let inst = decode_at(&[0x00, 0x00, 0x1f, 0xd6], 0);
        assert_eq!(inst.mnemonic, Mnemonic::Br);
        assert!(inst.is_branch());
        assert_eq!(inst.branch_target(), None);
    }
}
