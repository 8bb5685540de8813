// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Operand access
//!
//! Materializes addresses and values for instruction operands: immediates
//! become typed constants, register operands go through the facet cache, and
//! memory operands compute `seg:[base + index * scale + disp]` as pointer
//! arithmetic. Stores into general-purpose registers implement the partial
//! register merge rules (including the AMD64 32-bit zero-extension and the
//! high-byte shift), stores into vector registers the upper-bits handling of
//! SSE and AVX forms.

use inkwell::types::{BasicTypeEnum, VectorType};
use inkwell::values::{BasicValue, BasicValueEnum, IntValue, PointerValue};

use crate::context::LlvmContext;
use crate::error::{LiftError, LiftResult};
use crate::facet::{resolve, DataKind, Facet};
use crate::inst::{IndexExt, MemOp, Operand, Seg, ShiftOp};
use crate::regfile::ArchReg;

use super::{FunctionLifter, Isa};

/// Alignment attached to memory accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Align {
    /// 1-byte alignment.
    None,
    /// Natural alignment (width / 8).
    Max,
    /// Natural alignment for ≥128-bit vector accesses, 1 byte otherwise.
    Imp,
}

impl Align {
    fn bytes(self, facet: Facet, ivec_bits: u32) -> u32 {
        match self {
            Align::None => 1,
            Align::Max => facet.bits(ivec_bits) / 8,
            Align::Imp => {
                if facet.is_vector() && facet.bits(ivec_bits) >= 128 {
                    facet.bits(ivec_bits) / 8
                } else {
                    1
                }
            }
        }
    }
}

/// What happens to the bits of a vector register the stored value does not
/// cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpperHandling {
    /// Preserve untouched bits (legacy SSE merge forms).
    Default,
    /// Zero everything above bit 128 (SSE semantics on AVX-sized state).
    ZeroUpperSse,
    /// Zero everything above the stored value (VEX-encoded forms).
    ZeroUpperAvx,
}

impl<'a, 'ctx, A: Isa> FunctionLifter<'a, 'ctx, A> {
    /// Load the value of an operand under the given interpretation.
    pub(crate) fn op_load(
        &mut self,
        op: &Operand,
        kind: DataKind,
        align: Align,
    ) -> LiftResult<BasicValueEnum<'ctx>> {
        let facet = resolve(kind, u32::from(op.size()) * 8);
        match *op {
            Operand::Imm { value, .. } => {
                let ty = facet.ty(self.ctx, self.config.vector_size.bits());
                match ty {
                    BasicTypeEnum::IntType(t) => Ok(t.const_int(value as u64, true).into()),
                    other => Err(LiftError::InvalidOperand(format!(
                        "immediate of non-integer type {other:?}"
                    ))),
                }
            }
            Operand::Reg { reg, high, .. } => {
                let facet = if high && facet == Facet::I8 {
                    Facet::I8H
                } else {
                    facet
                };
                Ok(self.get_reg(reg, facet))
            }
            Operand::ShiftedReg {
                reg,
                size,
                shift,
                amount,
            } => {
                let v = self.get_int(reg, Facet::int(u32::from(size) * 8));
                Ok(self.shifted(v, shift, amount).into())
            }
            Operand::Mem(ref mem) => {
                let addr = self.op_addr(mem, facet)?;
                let name = format!("load{}", facet.bits(self.config.vector_size.bits()));
                let v = self.ctx.builder.build_load(addr, &name).unwrap();
                self.set_alignment(v, align, facet);
                Ok(v)
            }
            Operand::Cond(_) => Err(LiftError::InvalidOperand(
                "condition code used as a value".into(),
            )),
        }
    }

    /// Load an operand as an integer (the common case for GP instructions).
    pub(crate) fn op_load_int(&mut self, op: &Operand, align: Align) -> LiftResult<IntValue<'ctx>> {
        Ok(self.op_load(op, DataKind::Si, align)?.into_int_value())
    }

    /// Store an integer into a register or memory operand, applying the
    /// partial-register rules for GP destinations.
    pub(crate) fn op_store_gp(
        &mut self,
        op: &Operand,
        value: IntValue<'ctx>,
        align: Align,
    ) -> LiftResult<()> {
        match *op {
            Operand::Reg { reg, size, high } => {
                self.store_gp(reg, size, high, value);
                Ok(())
            }
            Operand::Mem(ref mem) => {
                let facet = Facet::int(u32::from(mem.size) * 8);
                let addr = self.op_addr(mem, facet)?;
                let st = self.ctx.builder.build_store(addr, value).unwrap();
                st.set_alignment(align.bytes(facet, self.config.vector_size.bits()))
                    .unwrap();
                Ok(())
            }
            ref other => Err(LiftError::InvalidOperand(format!(
                "store into operand {other:?}"
            ))),
        }
    }

    /// Store into a GP register through the facet of the given width.
    ///
    /// Narrow writes read-modify-write the canonical I64 facet so that it is
    /// always derivable; 32-bit writes zero-extend per the AMD64 rule.
    pub(crate) fn store_gp(&mut self, reg: ArchReg, size: u8, high: bool, value: IntValue<'ctx>) {
        let b = &self.ctx.builder;
        let bits = u32::from(size) * 8;
        debug_assert_eq!(value.get_type().get_bit_width(), bits);
        debug_assert!(!high || size == 1);

        let value64 = if bits == 64 {
            value
        } else {
            b.build_int_z_extend(value, self.ctx.i64_type, "zext64")
                .unwrap()
        };

        let facet = if high { Facet::I8H } else { Facet::int(bits) };
        let result = match facet {
            Facet::I64 | Facet::I32 => value64,
            Facet::I16 | Facet::I8 | Facet::I8H => {
                let (mask, part) = if facet == Facet::I8H {
                    let shifted = b
                        .build_left_shift(value64, self.ctx.i64_type.const_int(8, false), "hi8")
                        .unwrap();
                    (0xff00u64, shifted)
                } else if facet == Facet::I16 {
                    (0xffffu64, value64)
                } else {
                    (0xffu64, value64)
                };
                let cur = self.get_int(reg, Facet::I64);
                let keep = self
                    .ctx
                    .builder
                    .build_and(cur, self.ctx.i64_type.const_int(!mask, false), "keep")
                    .unwrap();
                self.ctx.builder.build_or(keep, part, "merge").unwrap()
            }
            other => unreachable!("GP store through facet {other:?}"),
        };

        self.set_reg(reg, Facet::I64, result.into(), true);
        if facet != Facet::I64 {
            self.set_reg(reg, facet, value.into(), false);
        }
    }

    /// Store into a vector register or memory operand.
    pub(crate) fn op_store_vec(
        &mut self,
        op: &Operand,
        value: BasicValueEnum<'ctx>,
        uh: UpperHandling,
        align: Align,
    ) -> LiftResult<()> {
        match *op {
            Operand::Reg { reg, .. } => {
                self.store_vec_reg(reg, value, uh);
                Ok(())
            }
            Operand::Mem(ref mem) => {
                let width = LlvmContext::bit_width(value.get_type());
                let facet = match value.get_type() {
                    BasicTypeEnum::VectorType(_) | BasicTypeEnum::FloatType(_) => {
                        // Keep the value's own type for the access.
                        return self.store_vec_mem(mem, value, align, width);
                    }
                    _ => Facet::int(width),
                };
                let addr = self.op_addr(mem, facet)?;
                let st = self.ctx.builder.build_store(addr, value).unwrap();
                st.set_alignment(align.bytes(facet, self.config.vector_size.bits()))
                    .unwrap();
                Ok(())
            }
            ref other => Err(LiftError::InvalidOperand(format!(
                "vector store into operand {other:?}"
            ))),
        }
    }

    fn store_vec_mem(
        &mut self,
        mem: &MemOp,
        value: BasicValueEnum<'ctx>,
        align: Align,
        width: u32,
    ) -> LiftResult<()> {
        // Element type only matters for address-space and scale matching.
        let facet = Facet::int(width);
        let addr = self.op_addr(mem, facet)?;
        let st = self.ctx.builder.build_store(addr, value).unwrap();
        let is_vec = value.get_type().is_vector_type();
        let bytes = match align {
            Align::None => 1,
            Align::Max => width / 8,
            Align::Imp => {
                if is_vec && width >= 128 {
                    width / 8
                } else {
                    1
                }
            }
        };
        st.set_alignment(bytes).unwrap();
        Ok(())
    }

    /// Place `value` into the low bits of a vector register.
    ///
    /// A vector value replaces the low lanes, a scalar goes into lane 0; the
    /// rest follows `uh`. The canonical `IVec` facet is re-established via
    /// bitcast, invalidating all peers.
    pub(crate) fn store_vec_reg(
        &mut self,
        reg: ArchReg,
        value: BasicValueEnum<'ctx>,
        uh: UpperHandling,
    ) {
        let ivec_bits = self.config.vector_size.bits();
        let ivec_ty = self.ctx.int_type(ivec_bits);
        let width = LlvmContext::bit_width(value.get_type());
        debug_assert!(width <= ivec_bits);

        let current = self.get_int(reg, Facet::IVec);
        let b = &self.ctx.builder;
        let current = match uh {
            UpperHandling::ZeroUpperAvx => ivec_ty.const_zero(),
            UpperHandling::ZeroUpperSse => {
                if ivec_bits == 128 {
                    ivec_ty.const_zero()
                } else {
                    let low = b
                        .build_int_z_extend(
                            self.ctx.i128_type.const_all_ones(),
                            ivec_ty,
                            "low128",
                        )
                        .unwrap();
                    let mask = b.build_not(low, "himask").unwrap();
                    b.build_and(current, mask, "keep_hi").unwrap()
                }
            }
            UpperHandling::Default => current,
        };

        let result = if let BasicTypeEnum::VectorType(vty) = value.get_type() {
            let n = vty.get_size();
            let total = n * ivec_bits / width;
            if total == n {
                value.into_vector_value()
            } else {
                let wide_vty = vec_of(vty.get_element_type(), total);
                let cur_vec = b
                    .build_bit_cast(current, wide_vty, "cur_vec")
                    .unwrap()
                    .into_vector_value();
                // Widen the value with zero lanes, then take the upper lanes
                // from the current register contents.
                let mut mask: Vec<u32> = (0..total).collect();
                for m in mask.iter_mut().skip(n as usize) {
                    *m = n;
                }
                let widened = b
                    .build_shuffle_vector(
                        value.into_vector_value(),
                        vty.const_zero(),
                        self.ctx.shuffle_mask(&mask),
                        "widened",
                    )
                    .unwrap();
                let mut mask: Vec<u32> = (0..total).collect();
                for (i, m) in mask.iter_mut().enumerate().skip(n as usize) {
                    *m = total + i as u32;
                }
                b.build_shuffle_vector(widened, cur_vec, self.ctx.shuffle_mask(&mask), "merged")
                    .unwrap()
            }
        } else {
            let total = ivec_bits / width;
            let vty = vec_of(value.get_type(), total);
            let cur_vec = b
                .build_bit_cast(current, vty, "cur_vec")
                .unwrap()
                .into_vector_value();
            b.build_insert_element(cur_vec, value, self.ctx.lane(0), "lane0")
                .unwrap()
        };
        let as_int = b
            .build_bit_cast(result, ivec_ty, "ivec")
            .unwrap()
            .into_int_value();
        let sse = if value.get_type().is_vector_type() && width == 128 && ivec_bits > 128 {
            Some(b.build_bit_cast(value, self.ctx.i128_type, "sse").unwrap())
        } else {
            None
        };
        self.set_reg(reg, Facet::IVec, as_int.into(), true);
        if let Some(sse) = sse {
            self.set_reg(reg, Facet::I128, sse, false);
        }
    }

    // ---- addresses ---------------------------------------------------------

    /// Compute the pointer for a memory operand, typed for `facet` accesses.
    pub(crate) fn op_addr(&mut self, mem: &MemOp, facet: Facet) -> LiftResult<PointerValue<'ctx>> {
        let space: u16 = match mem.seg {
            Seg::Gs => 256,
            Seg::Fs => 257,
            Seg::None => 0,
        };
        if space != 0 {
            // Segment-relative: compute in the integer domain and tag the
            // resulting pointer with the segment's address space.
            let addr = self.addr_as_int(mem);
            let ptr_ty = self.ctx.ptr_type_in(space);
            return Ok(self
                .ctx
                .builder
                .build_int_to_ptr(addr, ptr_ty, "segptr")
                .unwrap());
        }

        let mut result: PointerValue<'ctx>;

        if let Some(base) = mem.base {
            let ptr = self.get_reg(base, Facet::Ptr).into_pointer_value();
            let base64 = self.get_int(base, Facet::I64);
            if let (true, Some(c)) = (ptr.is_const(), base64.get_zero_extended_constant()) {
                // Known-constant base folds together with the displacement.
                result = self.const_ptr(c.wrapping_add(mem.disp as u64));
            } else {
                result = ptr;
                if mem.disp != 0 {
                    let b = &self.ctx.builder;
                    let scale = u32::from(mem.scale);
                    result = if scale != 0 && mem.disp % i64::from(mem.scale) == 0 {
                        let off = self
                            .ctx
                            .i64_type
                            .const_int((mem.disp / i64::from(mem.scale)) as u64, true);
                        unsafe { b.build_in_bounds_gep(result, &[off], "disp") }.unwrap()
                    } else {
                        let off = self.ctx.i64_type.const_int(mem.disp as u64, true);
                        unsafe { b.build_gep(result, &[off], "disp") }.unwrap()
                    };
                }
            }
        } else {
            result = self.const_ptr(mem.disp as u64);
        }

        if let Some(index) = mem.index {
            debug_assert!(mem.scale != 0);
            let off = self.index_value(index, mem.ext);
            let b = &self.ctx.builder;
            if result.is_null() {
                // Definitely not a pointer: stay in the integer domain.
                let scaled = b
                    .build_int_mul(
                        off,
                        self.ctx.i64_type.const_int(u64::from(mem.scale), false),
                        "scaled",
                    )
                    .unwrap();
                result = b
                    .build_int_to_ptr(scaled, self.ctx.ptr_type, "addr")
                    .unwrap();
            } else {
                result = unsafe { b.build_in_bounds_gep(result, &[off], "idx") }.unwrap();
            }
        }

        Ok(result)
    }

    /// The index register value, extended per the operand's extension mode.
    fn index_value(&mut self, index: ArchReg, ext: IndexExt) -> IntValue<'ctx> {
        match ext {
            IndexExt::Lsl | IndexExt::Sxtx => self.get_int(index, Facet::I64),
            IndexExt::Uxtw => {
                let w = self.get_int(index, Facet::I32);
                self.ctx
                    .builder
                    .build_int_z_extend(w, self.ctx.i64_type, "uxtw")
                    .unwrap()
            }
            IndexExt::Sxtw => {
                let w = self.get_int(index, Facet::I32);
                self.ctx
                    .builder
                    .build_int_s_extend(w, self.ctx.i64_type, "sxtw")
                    .unwrap()
            }
        }
    }

    /// Effective address as a plain 64-bit integer (LEA, segment operands).
    pub(crate) fn addr_as_int(&mut self, mem: &MemOp) -> IntValue<'ctx> {
        let mut addr = self.ctx.i64_type.const_int(mem.disp as u64, true);
        if let Some(base) = mem.base {
            let base64 = self.get_int(base, Facet::I64);
            addr = self
                .ctx
                .builder
                .build_int_add(addr, base64, "base")
                .unwrap();
        }
        if let Some(index) = mem.index {
            let off = self.index_value(index, mem.ext);
            let scaled = self
                .ctx
                .builder
                .build_int_mul(
                    off,
                    self.ctx.i64_type.const_int(u64::from(mem.scale.max(1)), false),
                    "scaled",
                )
                .unwrap();
            addr = self.ctx.builder.build_int_add(addr, scaled, "ea").unwrap();
        }
        addr
    }

    /// Pointer for an address known at lift time: anchored on the global base
    /// when configured, an absolute `inttoptr` otherwise.
    pub(crate) fn const_ptr(&mut self, addr: u64) -> PointerValue<'ctx> {
        if addr == 0 {
            return self.ctx.ptr_type.const_null();
        }
        let b = &self.ctx.builder;
        match self.config.global_base {
            Some(gb) => {
                let off = self
                    .ctx
                    .i64_type
                    .const_int(addr.wrapping_sub(gb.addr), true);
                unsafe { b.build_gep(gb.ptr, &[off], "anchored") }.unwrap()
            }
            None => b
                .build_int_to_ptr(
                    self.ctx.i64_type.const_int(addr, false),
                    self.ctx.ptr_type,
                    "abs",
                )
                .unwrap(),
        }
    }

    // ---- stack -------------------------------------------------------------

    /// Push a value: decrement the stack pointer by the value's width and
    /// store through it.
    pub(crate) fn stack_push(&mut self, value: IntValue<'ctx>) {
        let bytes = u64::from(value.get_type().get_bit_width() / 8);
        let rsp = self.get_int(ArchReg::RSP, Facet::I64);
        let b = &self.ctx.builder;
        let new = b
            .build_int_sub(rsp, self.ctx.i64_type.const_int(bytes, false), "rsp")
            .unwrap();
        let slot = b.build_int_to_ptr(new, self.ctx.ptr_type, "slot").unwrap();
        b.build_store(slot, value).unwrap();
        self.set_reg(ArchReg::RSP, Facet::I64, new.into(), true);
    }

    /// Pop a 64-bit value from the stack.
    pub(crate) fn stack_pop(&mut self) -> IntValue<'ctx> {
        self.stack_pop_from(ArchReg::RSP)
    }

    /// Pop through an alternative stack-pointer source (LEAVE pops through
    /// RBP). The stack pointer register is updated to one slot above the
    /// source.
    pub(crate) fn stack_pop_from(&mut self, sp_src: ArchReg) -> IntValue<'ctx> {
        let sp = self.get_int(sp_src, Facet::I64);
        let b = &self.ctx.builder;
        let slot = b.build_int_to_ptr(sp, self.ctx.ptr_type, "slot").unwrap();
        let value = b
            .build_load(slot, "popped")
            .unwrap()
            .into_int_value();
        let new = b
            .build_int_add(sp, self.ctx.i64_type.const_int(8, false), "rsp")
            .unwrap();
        self.set_reg(ArchReg::RSP, Facet::I64, new.into(), true);
        value
    }

    // ---- small helpers -----------------------------------------------------

    /// Apply a constant-amount shift (AArch64 shifted-register operands).
    pub(crate) fn shifted(
        &mut self,
        v: IntValue<'ctx>,
        shift: ShiftOp,
        amount: u8,
    ) -> IntValue<'ctx> {
        if amount == 0 && shift == ShiftOp::Lsl {
            return v;
        }
        let b = &self.ctx.builder;
        let width = v.get_type().get_bit_width();
        let amt = v.get_type().const_int(u64::from(amount), false);
        match shift {
            ShiftOp::Lsl => b.build_left_shift(v, amt, "lsl").unwrap(),
            ShiftOp::Lsr => b.build_right_shift(v, amt, false, "lsr").unwrap(),
            ShiftOp::Asr => b.build_right_shift(v, amt, true, "asr").unwrap(),
            ShiftOp::Ror => {
                let hi = b.build_right_shift(v, amt, false, "ror_lo").unwrap();
                let inv = v
                    .get_type()
                    .const_int(u64::from(width) - u64::from(amount), false);
                let lo = b.build_left_shift(v, inv, "ror_hi").unwrap();
                b.build_or(hi, lo, "ror").unwrap()
            }
        }
    }

    fn set_alignment(&self, v: BasicValueEnum<'ctx>, align: Align, facet: Facet) {
        let bytes = align.bytes(facet, self.config.vector_size.bits());
        if let Some(inst) = v.as_instruction_value() {
            inst.set_alignment(bytes).unwrap();
        }
    }
}

/// Vector type of `n` elements of a scalar element type.
fn vec_of(elem: BasicTypeEnum<'_>, n: u32) -> VectorType<'_> {
    match elem {
        BasicTypeEnum::IntType(t) => t.vec_type(n),
        BasicTypeEnum::FloatType(t) => t.vec_type(n),
        other => panic!("no vector of {other:?}"),
    }
}
