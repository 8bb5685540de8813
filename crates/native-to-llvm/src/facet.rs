// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Typed register views (facets)
//!
//! A facet is one typed view of a register's bits. Several facets of the same
//! register can be cached at once, so e.g. a run of packed-float operations
//! keeps seeing the register as `<4 x float>` without re-bitcasting, while a
//! later integer read still finds the canonical integer view.

use inkwell::types::{BasicType, BasicTypeEnum};

use crate::context::LlvmContext;

/// A typed view of a register.
///
/// `I64` is the canonical facet of general-purpose registers, `IVec` (the
/// full vector-register-sized integer) of vector registers. Flag facets are
/// single-bit and each is its own canonical facet of the flags register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Facet {
    I8,
    /// High byte of the low word (AH/BH/CH/DH aliasing).
    I8H,
    I16,
    I32,
    I64,
    I128,
    I256,
    /// Pointer view; only valid when the register holds a pointer.
    Ptr,
    F32,
    F64,
    /// Canonical wide integer view of a vector register.
    IVec,
    /// Integer vector of `count` elements of `bits` bits each.
    Vi { bits: u8, count: u8 },
    /// Float vector of `count` elements of `bits` bits each.
    Vf { bits: u8, count: u8 },
    // One single-bit facet per flag.
    Zf,
    Sf,
    Pf,
    Af,
    Cf,
    Of,
    Df,
}

impl Facet {
    pub const V16I8: Facet = Facet::Vi { bits: 8, count: 16 };
    pub const V8I16: Facet = Facet::Vi { bits: 16, count: 8 };
    pub const V4I32: Facet = Facet::Vi { bits: 32, count: 4 };
    pub const V2I64: Facet = Facet::Vi { bits: 64, count: 2 };
    pub const V4F32: Facet = Facet::Vf { bits: 32, count: 4 };
    pub const V2F64: Facet = Facet::Vf { bits: 64, count: 2 };

    /// The integer facet of a given bit width.
    pub fn int(bits: u32) -> Facet {
        match bits {
            8 => Facet::I8,
            16 => Facet::I16,
            32 => Facet::I32,
            64 => Facet::I64,
            128 => Facet::I128,
            256 => Facet::I256,
            other => unreachable!("no integer facet of width {other}"),
        }
    }

    /// True for the single-bit flag facets.
    pub fn is_flag(self) -> bool {
        matches!(
            self,
            Facet::Zf | Facet::Sf | Facet::Pf | Facet::Af | Facet::Cf | Facet::Of | Facet::Df
        )
    }

    /// True for vector-typed facets (not the canonical `IVec`, which is an
    /// integer view).
    pub fn is_vector(self) -> bool {
        matches!(self, Facet::Vi { .. } | Facet::Vf { .. })
    }

    /// Total width in bits. `IVec` depends on the configured vector register
    /// size, which is passed in.
    pub fn bits(self, ivec_bits: u32) -> u32 {
        match self {
            Facet::I8 | Facet::I8H => 8,
            Facet::I16 => 16,
            Facet::I32 | Facet::F32 => 32,
            Facet::I64 | Facet::F64 | Facet::Ptr => 64,
            Facet::I128 => 128,
            Facet::I256 => 256,
            Facet::IVec => ivec_bits,
            Facet::Vi { bits, count } | Facet::Vf { bits, count } => {
                u32::from(bits) * u32::from(count)
            }
            f if f.is_flag() => 1,
            _ => unreachable!(),
        }
    }

    /// Construct the concrete IR type of this facet.
    pub(crate) fn ty<'ctx>(self, ctx: &LlvmContext<'ctx>, ivec_bits: u32) -> BasicTypeEnum<'ctx> {
        match self {
            Facet::I8 | Facet::I8H => ctx.i8_type.into(),
            Facet::I16 => ctx.i16_type.into(),
            Facet::I32 => ctx.i32_type.into(),
            Facet::I64 => ctx.i64_type.into(),
            Facet::I128 => ctx.i128_type.into(),
            Facet::I256 => ctx.i256_type.into(),
            Facet::Ptr => ctx.ptr_type.into(),
            Facet::F32 => ctx.f32_type.into(),
            Facet::F64 => ctx.f64_type.into(),
            Facet::IVec => ctx.int_type(ivec_bits).into(),
            Facet::Vi { bits, count } => ctx
                .int_type(u32::from(bits))
                .vec_type(u32::from(count))
                .into(),
            Facet::Vf { bits, count } => match bits {
                32 => ctx.f32_type.vec_type(u32::from(count)).into(),
                64 => ctx.f64_type.vec_type(u32::from(count)).into(),
                other => unreachable!("no float element of width {other}"),
            },
            f => {
                debug_assert!(f.is_flag());
                ctx.bool_type.as_basic_type_enum()
            }
        }
    }
}

/// Interpretation of an operand's bits, before the width is known.
///
/// `resolve` combines a kind with the operand width to pick the facet: a
/// 128-bit `Vf32` operand is `<4 x float>`, a 32-bit one is a scalar `float`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Scalar integer of the operand width.
    Si,
    Vi8,
    Vi16,
    Vi32,
    Vi64,
    Sf32,
    Sf64,
    Vf32,
    Vf64,
}

/// Resolve an operand interpretation and width to a facet.
pub fn resolve(kind: DataKind, bits: u32) -> Facet {
    match kind {
        DataKind::Si => Facet::int(bits),
        DataKind::Sf32 => Facet::F32,
        DataKind::Sf64 => Facet::F64,
        DataKind::Vi8 => Facet::Vi {
            bits: 8,
            count: (bits / 8) as u8,
        },
        DataKind::Vi16 => Facet::Vi {
            bits: 16,
            count: (bits / 16) as u8,
        },
        DataKind::Vi32 => Facet::Vi {
            bits: 32,
            count: (bits / 32) as u8,
        },
        DataKind::Vi64 => Facet::Vi {
            bits: 64,
            count: (bits / 64) as u8,
        },
        DataKind::Vf32 => {
            if bits == 32 {
                Facet::F32
            } else {
                Facet::Vf {
                    bits: 32,
                    count: (bits / 32) as u8,
                }
            }
        }
        DataKind::Vf64 => {
            if bits == 64 {
                Facet::F64
            } else {
                Facet::Vf {
                    bits: 64,
                    count: (bits / 64) as u8,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;

    #[test]
    fn resolve_scalars_and_vectors() {
        assert_eq!(resolve(DataKind::Si, 8), Facet::I8);
        assert_eq!(resolve(DataKind::Si, 64), Facet::I64);
        assert_eq!(resolve(DataKind::Sf64, 64), Facet::F64);
        assert_eq!(resolve(DataKind::Vf32, 128), Facet::V4F32);
        assert_eq!(resolve(DataKind::Vf32, 32), Facet::F32);
        assert_eq!(resolve(DataKind::Vf64, 64), Facet::F64);
        assert_eq!(resolve(DataKind::Vi8, 128), Facet::V16I8);
        assert_eq!(resolve(DataKind::Vi64, 128), Facet::V2I64);
        assert_eq!(resolve(DataKind::Vi16, 256), Facet::Vi { bits: 16, count: 16 });
    }

    #[test]
    fn facet_types_match_widths() {
        let context = Context::create();
        let ctx = crate::context::LlvmContext::new(&context, "facets");

        for (facet, bits) in [
            (Facet::I8, 8),
            (Facet::I8H, 8),
            (Facet::I16, 16),
            (Facet::I32, 32),
            (Facet::I64, 64),
            (Facet::I128, 128),
            (Facet::V4F32, 128),
            (Facet::V2F64, 128),
            (Facet::V16I8, 128),
            (Facet::IVec, 128),
            (Facet::Zf, 1),
            (Facet::Cf, 1),
        ] {
            assert_eq!(facet.bits(128), bits, "{facet:?}");
            let ty = facet.ty(&ctx, 128);
            if !matches!(facet, Facet::Ptr) {
                assert_eq!(LlvmContext::bit_width(ty), bits, "{facet:?}");
            }
        }

        // IVec follows the configured register size.
        assert_eq!(Facet::IVec.bits(256), 256);
        assert_eq!(
            LlvmContext::bit_width(Facet::IVec.ty(&ctx, 256)),
            256
        );
    }
}
