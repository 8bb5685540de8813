// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-block register file
//!
//! Maps `(architectural register, facet)` to the IR value currently holding
//! that view of the register. Reads of uncached facets synthesize the value
//! from the canonical facet (truncate, shift, bitcast) and cache it; writes
//! through a canonical facet invalidate the peers.
//!
//! Invariant: the canonical facet of every state register is always cached —
//! the entry block loads it from the CPU struct, non-entry blocks φ it, and
//! every write path re-establishes it. φ-filling at seal time relies on this
//! to read predecessor end states without emitting code.

use std::collections::BTreeMap;

use inkwell::basic_block::BasicBlock;
use inkwell::values::{BasicValueEnum, PhiValue};

use crate::context::LlvmContext;
use crate::facet::Facet;

/// An architectural register.
///
/// Narrow views (EAX, AX, AH, XMM0 as `<4 x float>`, single flags) are not
/// separate registers; they are facets of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArchReg {
    /// General-purpose register. x86-64: RAX..R15 in encoding order.
    /// AArch64: X0..X30.
    Gp(u8),
    /// Vector register (XMM/YMM).
    Vec(u8),
    /// AArch64 stack pointer (x86 keeps its stack pointer in `Gp(4)`).
    Sp,
    /// Instruction pointer.
    Ip,
    /// Synthetic flags register; its facets are the individual flags.
    Flags,
}

impl ArchReg {
    pub const RAX: ArchReg = ArchReg::Gp(0);
    pub const RCX: ArchReg = ArchReg::Gp(1);
    pub const RDX: ArchReg = ArchReg::Gp(2);
    pub const RBX: ArchReg = ArchReg::Gp(3);
    pub const RSP: ArchReg = ArchReg::Gp(4);
    pub const RBP: ArchReg = ArchReg::Gp(5);
    pub const RSI: ArchReg = ArchReg::Gp(6);
    pub const RDI: ArchReg = ArchReg::Gp(7);

    /// Short label used for IR value names.
    pub fn label(self, facet: Facet) -> String {
        match self {
            ArchReg::Gp(i) => format!("r{i}_{}", facet_label(facet)),
            ArchReg::Vec(i) => format!("v{i}_{}", facet_label(facet)),
            ArchReg::Sp => format!("sp_{}", facet_label(facet)),
            ArchReg::Ip => format!("ip_{}", facet_label(facet)),
            ArchReg::Flags => facet_label(facet).to_string(),
        }
    }
}

fn facet_label(facet: Facet) -> &'static str {
    match facet {
        Facet::I8 => "8",
        Facet::I8H => "8h",
        Facet::I16 => "16",
        Facet::I32 => "32",
        Facet::I64 => "64",
        Facet::I128 => "128",
        Facet::I256 => "256",
        Facet::Ptr => "ptr",
        Facet::F32 => "f32",
        Facet::F64 => "f64",
        Facet::IVec => "ivec",
        Facet::Vi { .. } => "vi",
        Facet::Vf { .. } => "vf",
        Facet::Zf => "zf",
        Facet::Sf => "sf",
        Facet::Pf => "pf",
        Facet::Af => "af",
        Facet::Cf => "cf",
        Facet::Of => "of",
        Facet::Df => "df",
    }
}

/// A φ-node pre-created at block entry for one canonical facet.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PhiRecord<'ctx> {
    pub reg: ArchReg,
    pub facet: Facet,
    pub phi: PhiValue<'ctx>,
}

/// The register file of one basic block.
#[derive(Default)]
pub(crate) struct RegFile<'ctx> {
    vals: BTreeMap<(ArchReg, Facet), BasicValueEnum<'ctx>>,
}

impl<'ctx> RegFile<'ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value of a facet, without synthesizing one.
    pub fn cached(&self, reg: ArchReg, facet: Facet) -> Option<BasicValueEnum<'ctx>> {
        self.vals.get(&(reg, facet)).copied()
    }

    /// Install `value` for `(reg, facet)`. With `clear_others`, all other
    /// facets of `reg` are invalidated first (a full overwrite); without it,
    /// peers stay valid (flag updates, derived-facet caching).
    pub fn set(
        &mut self,
        reg: ArchReg,
        facet: Facet,
        value: BasicValueEnum<'ctx>,
        clear_others: bool,
    ) {
        if clear_others {
            self.clear(reg);
        }
        self.vals.insert((reg, facet), value);
    }

    /// Drop all facets of `reg`.
    pub fn clear(&mut self, reg: ArchReg) {
        self.vals.retain(|&(r, _), _| r != reg);
    }

    /// Return the value of `(reg, facet)`, synthesizing and caching it from
    /// the canonical facet if it is not present.
    pub fn get(
        &mut self,
        ctx: &LlvmContext<'ctx>,
        ivec_bits: u32,
        reg: ArchReg,
        facet: Facet,
    ) -> BasicValueEnum<'ctx> {
        if let Some(v) = self.cached(reg, facet) {
            return v;
        }
        let v = match reg {
            ArchReg::Gp(_) | ArchReg::Sp | ArchReg::Ip => self.derive_gp(ctx, reg, facet),
            ArchReg::Vec(_) => self.derive_vec(ctx, ivec_bits, reg, facet),
            ArchReg::Flags => panic!("flag facet {facet:?} read before initialization"),
        };
        self.vals.insert((reg, facet), v);
        v
    }

    fn derive_gp(
        &self,
        ctx: &LlvmContext<'ctx>,
        reg: ArchReg,
        facet: Facet,
    ) -> BasicValueEnum<'ctx> {
        let wide = self
            .cached(reg, Facet::I64)
            .expect("canonical I64 facet missing")
            .into_int_value();
        let b = &ctx.builder;
        let name = reg.label(facet);
        match facet {
            Facet::I32 | Facet::I16 | Facet::I8 => {
                let ty = ctx.int_type(facet.bits(0));
                b.build_int_truncate(wide, ty, &name).unwrap().into()
            }
            Facet::I8H => {
                let shifted = b
                    .build_right_shift(wide, ctx.i64_type.const_int(8, false), false, "hi8")
                    .unwrap();
                b.build_int_truncate(shifted, ctx.i8_type, &name)
                    .unwrap()
                    .into()
            }
            Facet::Ptr => b
                .build_int_to_ptr(wide, ctx.ptr_type, &name)
                .unwrap()
                .into(),
            other => panic!("facet {other:?} not derivable from a GP register"),
        }
    }

    fn derive_vec(
        &self,
        ctx: &LlvmContext<'ctx>,
        ivec_bits: u32,
        reg: ArchReg,
        facet: Facet,
    ) -> BasicValueEnum<'ctx> {
        let wide = self
            .cached(reg, Facet::IVec)
            .expect("canonical IVec facet missing")
            .into_int_value();
        let b = &ctx.builder;
        let name = reg.label(facet);

        let total = facet.bits(ivec_bits);
        assert!(
            total <= ivec_bits,
            "facet {facet:?} wider than the vector register"
        );
        let narrowed = if total < ivec_bits {
            b.build_int_truncate(wide, ctx.int_type(total), "vnarrow")
                .unwrap()
        } else {
            wide
        };

        match facet {
            Facet::I8
            | Facet::I16
            | Facet::I32
            | Facet::I64
            | Facet::I128
            | Facet::I256
            | Facet::IVec => narrowed.into(),
            Facet::F32 | Facet::F64 | Facet::Vi { .. } | Facet::Vf { .. } => {
                let ty = facet.ty(ctx, ivec_bits);
                b.build_bit_cast(narrowed, ty, &name).unwrap()
            }
            other => panic!("facet {other:?} not derivable from a vector register"),
        }
    }

    /// Pre-create a φ-node for each given canonical facet at the start of
    /// `block`, install the φs as the block's incoming register state, and
    /// return them for later filling.
    pub fn insert_phis(
        &mut self,
        ctx: &LlvmContext<'ctx>,
        ivec_bits: u32,
        block: BasicBlock<'ctx>,
        regs: &[(ArchReg, Facet)],
    ) -> Vec<PhiRecord<'ctx>> {
        ctx.builder.position_at_end(block);
        regs.iter()
            .map(|&(reg, facet)| {
                let phi = ctx
                    .builder
                    .build_phi(facet.ty(ctx, ivec_bits), &reg.label(facet))
                    .unwrap();
                self.vals.insert((reg, facet), phi.as_basic_value());
                PhiRecord { reg, facet, phi }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;

    fn with_block<F: FnOnce(&LlvmContext<'_>)>(f: F) {
        let context = Context::create();
        let ctx = LlvmContext::new(&context, "regfile_test");
        let fn_ty = context.void_type().fn_type(&[], false);
        let func = ctx.module.add_function("t", fn_ty, None);
        let bb = context.append_basic_block(func, "entry");
        ctx.builder.position_at_end(bb);
        f(&ctx);
    }

    #[test]
    fn narrow_facets_derive_from_canonical() {
        with_block(|ctx| {
            let mut rf = RegFile::new();
            let wide = ctx.i64_type.const_int(0xAABB, false);
            rf.set(ArchReg::RAX, Facet::I64, wide.into(), true);

            let low = rf.get(ctx, 128, ArchReg::RAX, Facet::I8).into_int_value();
            assert_eq!(low.get_type().get_bit_width(), 8);

            let high = rf.get(ctx, 128, ArchReg::RAX, Facet::I8H).into_int_value();
            assert_eq!(high.get_type().get_bit_width(), 8);

            // Synthesized values are cached.
            assert!(rf.cached(ArchReg::RAX, Facet::I8).is_some());
            assert!(rf.cached(ArchReg::RAX, Facet::I8H).is_some());

            // Constant inputs fold to constants with the expected bits.
            assert_eq!(low.get_zero_extended_constant(), Some(0xBB));
            assert_eq!(high.get_zero_extended_constant(), Some(0xAA));
        });
    }

    #[test]
    fn canonical_write_clears_peers() {
        with_block(|ctx| {
            let mut rf = RegFile::new();
            rf.set(
                ArchReg::RAX,
                Facet::I64,
                ctx.i64_type.const_int(1, false).into(),
                true,
            );
            rf.get(ctx, 128, ArchReg::RAX, Facet::I32);
            assert!(rf.cached(ArchReg::RAX, Facet::I32).is_some());

            rf.set(
                ArchReg::RAX,
                Facet::I64,
                ctx.i64_type.const_int(2, false).into(),
                true,
            );
            assert!(rf.cached(ArchReg::RAX, Facet::I32).is_none());

            // A flag-style update keeps peers.
            rf.get(ctx, 128, ArchReg::RAX, Facet::I32);
            rf.set(
                ArchReg::RAX,
                Facet::I16,
                ctx.i16_type.const_int(3, false).into(),
                false,
            );
            assert!(rf.cached(ArchReg::RAX, Facet::I32).is_some());
        });
    }

    #[test]
    fn vector_facets_bitcast_from_ivec() {
        with_block(|ctx| {
            let mut rf = RegFile::new();
            rf.set(
                ArchReg::Vec(0),
                Facet::IVec,
                ctx.i128_type.const_zero().into(),
                true,
            );

            let v = rf.get(ctx, 128, ArchReg::Vec(0), Facet::V4F32);
            assert!(v.is_vector_value());
            let vty = v.into_vector_value().get_type();
            assert_eq!(vty.get_size(), 4);

            let q = rf.get(ctx, 128, ArchReg::Vec(0), Facet::I64).into_int_value();
            assert_eq!(q.get_type().get_bit_width(), 64);
        });
    }

    #[test]
    fn wider_state_truncates_for_sse_views() {
        with_block(|ctx| {
            let mut rf = RegFile::new();
            rf.set(
                ArchReg::Vec(1),
                Facet::IVec,
                ctx.i256_type.const_zero().into(),
                true,
            );
            let x = rf.get(ctx, 256, ArchReg::Vec(1), Facet::I128).into_int_value();
            assert_eq!(x.get_type().get_bit_width(), 128);
            let v = rf.get(ctx, 256, ArchReg::Vec(1), Facet::V2F64);
            assert_eq!(v.into_vector_value().get_type().get_size(), 2);
        });
    }
}
