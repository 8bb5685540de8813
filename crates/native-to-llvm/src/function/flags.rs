// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Flag computation and condition evaluation
//!
//! Each flag is a single-bit facet of the synthetic flags register, so
//! updating one flag never invalidates the others. The formulas are the
//! architectural definitions; parity uses a popcount of the low byte.

use inkwell::values::IntValue;
use inkwell::IntPredicate;

use crate::facet::Facet;
use crate::x86_64::Cond;

use super::{FunctionLifter, Isa};

/// Architectural RFLAGS bit positions.
const BIT_CF: u64 = 0;
const BIT_PF: u64 = 2;
const BIT_AF: u64 = 4;
const BIT_ZF: u64 = 6;
const BIT_SF: u64 = 7;
const BIT_DF: u64 = 10;
const BIT_OF: u64 = 11;

impl<'a, 'ctx, A: Isa> FunctionLifter<'a, 'ctx, A> {
    pub(crate) fn flag_calc_z(&mut self, res: IntValue<'ctx>) {
        let zero = res.get_type().const_zero();
        let z = self
            .ctx
            .builder
            .build_int_compare(IntPredicate::EQ, res, zero, "zf")
            .unwrap();
        self.set_flag(Facet::Zf, z);
    }

    pub(crate) fn flag_calc_s(&mut self, res: IntValue<'ctx>) {
        let zero = res.get_type().const_zero();
        let s = self
            .ctx
            .builder
            .build_int_compare(IntPredicate::SLT, res, zero, "sf")
            .unwrap();
        self.set_flag(Facet::Sf, s);
    }

    /// PF is even parity of the low 8 bits of the result.
    pub(crate) fn flag_calc_p(&mut self, res: IntValue<'ctx>) {
        let b = &self.ctx.builder;
        let low = if res.get_type().get_bit_width() > 8 {
            b.build_int_truncate(res, self.ctx.i8_type, "low8").unwrap()
        } else {
            res
        };
        let pop = self
            .call_intrinsic("llvm.ctpop", &[self.ctx.i8_type.into()], &[low.into()])
            .into_int_value();
        let p = self
            .ctx
            .builder
            .build_int_compare(
                IntPredicate::EQ,
                self.ctx
                    .builder
                    .build_and(pop, self.ctx.i8_type.const_int(1, false), "popbit")
                    .unwrap(),
                self.ctx.i8_type.const_zero(),
                "pf",
            )
            .unwrap();
        self.set_flag(Facet::Pf, p);
    }

    /// AF is the carry out of bit 3: `((lhs ^ rhs ^ res) >> 4) & 1`.
    pub(crate) fn flag_calc_a(
        &mut self,
        res: IntValue<'ctx>,
        lhs: IntValue<'ctx>,
        rhs: IntValue<'ctx>,
    ) {
        let b = &self.ctx.builder;
        let x = b.build_xor(b.build_xor(lhs, rhs, "ax").unwrap(), res, "ax").unwrap();
        let shifted = b
            .build_right_shift(x, x.get_type().const_int(4, false), false, "ash")
            .unwrap();
        let a = b
            .build_int_truncate(shifted, self.ctx.bool_type, "af")
            .unwrap();
        self.set_flag(Facet::Af, a);
    }

    pub(crate) fn flag_calc_c_add(&mut self, res: IntValue<'ctx>, lhs: IntValue<'ctx>) {
        let c = self
            .ctx
            .builder
            .build_int_compare(IntPredicate::ULT, res, lhs, "cf")
            .unwrap();
        self.set_flag(Facet::Cf, c);
    }

    pub(crate) fn flag_calc_c_sub(&mut self, lhs: IntValue<'ctx>, rhs: IntValue<'ctx>) {
        let c = self
            .ctx
            .builder
            .build_int_compare(IntPredicate::ULT, lhs, rhs, "cf")
            .unwrap();
        self.set_flag(Facet::Cf, c);
    }

    /// OF for addition: `((lhs ^ res) & (rhs ^ res)) < 0`.
    pub(crate) fn flag_calc_o_add(
        &mut self,
        res: IntValue<'ctx>,
        lhs: IntValue<'ctx>,
        rhs: IntValue<'ctx>,
    ) {
        let b = &self.ctx.builder;
        let x = b
            .build_and(
                b.build_xor(lhs, res, "ox").unwrap(),
                b.build_xor(rhs, res, "ox").unwrap(),
                "oa",
            )
            .unwrap();
        let o = b
            .build_int_compare(IntPredicate::SLT, x, x.get_type().const_zero(), "of")
            .unwrap();
        self.set_flag(Facet::Of, o);
    }

    /// OF for subtraction: `((lhs ^ rhs) & (lhs ^ res)) < 0`.
    pub(crate) fn flag_calc_o_sub(
        &mut self,
        res: IntValue<'ctx>,
        lhs: IntValue<'ctx>,
        rhs: IntValue<'ctx>,
    ) {
        let b = &self.ctx.builder;
        let x = b
            .build_and(
                b.build_xor(lhs, rhs, "ox").unwrap(),
                b.build_xor(lhs, res, "ox").unwrap(),
                "oa",
            )
            .unwrap();
        let o = b
            .build_int_compare(IntPredicate::SLT, x, x.get_type().const_zero(), "of")
            .unwrap();
        self.set_flag(Facet::Of, o);
    }

    /// All six flags for an addition result.
    pub(crate) fn flag_calc_add(
        &mut self,
        res: IntValue<'ctx>,
        lhs: IntValue<'ctx>,
        rhs: IntValue<'ctx>,
    ) {
        self.flag_calc_z(res);
        self.flag_calc_s(res);
        self.flag_calc_p(res);
        self.flag_calc_a(res, lhs, rhs);
        self.flag_calc_c_add(res, lhs);
        self.flag_calc_o_add(res, lhs, rhs);
    }

    /// All six flags for a subtraction result. ZF is computed as `lhs == rhs`
    /// so that compares of equal values fold trivially.
    pub(crate) fn flag_calc_sub(
        &mut self,
        res: IntValue<'ctx>,
        lhs: IntValue<'ctx>,
        rhs: IntValue<'ctx>,
    ) {
        let z = self
            .ctx
            .builder
            .build_int_compare(IntPredicate::EQ, lhs, rhs, "zf")
            .unwrap();
        self.set_flag(Facet::Zf, z);
        self.flag_calc_s(res);
        self.flag_calc_p(res);
        self.flag_calc_a(res, lhs, rhs);
        self.flag_calc_c_sub(lhs, rhs);
        self.flag_calc_o_sub(res, lhs, rhs);
    }

    /// Flags for bitwise results: CF and OF cleared, AF undefined.
    pub(crate) fn flag_calc_logic(&mut self, res: IntValue<'ctx>) {
        self.flag_calc_z(res);
        self.flag_calc_s(res);
        self.flag_calc_p(res);
        let f = self.ctx.bool_type.const_zero();
        self.set_flag(Facet::Cf, f);
        self.set_flag(Facet::Of, f);
        self.set_flags_undef(&[Facet::Af]);
    }

    /// Evaluate an x86 condition code over the flag facets.
    pub(crate) fn flag_cond(&mut self, cond: Cond) -> IntValue<'ctx> {
        use Cond::*;
        let base = match cond {
            O | No => self.get_flag(Facet::Of),
            C | Nc => self.get_flag(Facet::Cf),
            Z | Nz => self.get_flag(Facet::Zf),
            Be | A => {
                let c = self.get_flag(Facet::Cf);
                let z = self.get_flag(Facet::Zf);
                self.ctx.builder.build_or(c, z, "be").unwrap()
            }
            S | Ns => self.get_flag(Facet::Sf),
            P | Np => self.get_flag(Facet::Pf),
            L | Ge => {
                let s = self.get_flag(Facet::Sf);
                let o = self.get_flag(Facet::Of);
                self.ctx
                    .builder
                    .build_int_compare(IntPredicate::NE, s, o, "lt")
                    .unwrap()
            }
            Le | G => {
                let s = self.get_flag(Facet::Sf);
                let o = self.get_flag(Facet::Of);
                let z = self.get_flag(Facet::Zf);
                let lt = self
                    .ctx
                    .builder
                    .build_int_compare(IntPredicate::NE, s, o, "lt")
                    .unwrap();
                self.ctx.builder.build_or(lt, z, "le").unwrap()
            }
        };
        if matches!(cond, No | Nc | Nz | A | Ns | Np | Ge | G) {
            self.ctx.builder.build_not(base, "ncond").unwrap()
        } else {
            base
        }
    }

    /// Pack the flags into an integer in their architectural bit positions.
    /// Reserved bit 1 and IF are forced to 1.
    pub(crate) fn flag_as_reg(&mut self, bits: u32) -> IntValue<'ctx> {
        let ty = self.ctx.int_type(bits);
        let mut packed = ty.const_int(0x202, false);
        for (facet, pos) in [
            (Facet::Cf, BIT_CF),
            (Facet::Pf, BIT_PF),
            (Facet::Af, BIT_AF),
            (Facet::Zf, BIT_ZF),
            (Facet::Sf, BIT_SF),
            (Facet::Df, BIT_DF),
            (Facet::Of, BIT_OF),
        ] {
            let f = self.get_flag(facet);
            let b = &self.ctx.builder;
            let wide = b.build_int_z_extend(f, ty, "flag").unwrap();
            let placed = b
                .build_left_shift(wide, ty.const_int(pos, false), "flagpos")
                .unwrap();
            packed = b.build_or(packed, placed, "rflags").unwrap();
        }
        packed
    }

    /// Unpack an integer in RFLAGS layout into the flag facets. AF is marked
    /// undefined: a faithful value would be reconstructible only for PF.
    pub(crate) fn flag_from_reg(&mut self, value: IntValue<'ctx>) {
        let ty = value.get_type();
        for (facet, pos) in [
            (Facet::Cf, BIT_CF),
            (Facet::Pf, BIT_PF),
            (Facet::Zf, BIT_ZF),
            (Facet::Sf, BIT_SF),
            (Facet::Df, BIT_DF),
            (Facet::Of, BIT_OF),
        ] {
            let b = &self.ctx.builder;
            let shifted = b
                .build_right_shift(value, ty.const_int(pos, false), false, "flagbit")
                .unwrap();
            let bit = b
                .build_int_truncate(shifted, self.ctx.bool_type, "flag")
                .unwrap();
            self.set_flag(facet, bit);
        }
        self.set_flags_undef(&[Facet::Af]);
    }
}
